/// Graphics module: native backend traits, resource state tracking, transient memory,
/// descriptor management, binding signatures and command buffers.
pub mod gfx;

/// Context owning the device and the process wide pools and caches.
pub mod context;

/// Use bitmask for flags
#[macro_use]
extern crate bitflags;

/// Errors surfaced to the application layer. Misuse during recording is logged and
/// ignored instead, see `gfx::cmd::CommandBuffer`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A native object (resource, heap, page, view, pipeline) could not be created
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),
    /// A binding signature or pipeline description could not be serialised
    #[error("serialisation failed: {0}")]
    Serialization(String),
    /// The native device reported a failure (reset, close, execute)
    #[error("device error: {0}")]
    Device(String),
    /// An object was used in a lifecycle state which does not allow the operation
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Alignments passed to allocators must be a power of two
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Most commonly used types, import with `use hotline_gfx::prelude::*`
pub mod prelude {
    pub use crate::{
        Error,
        context::Context,
        context::ContextInfo,
        gfx,
        gfx::Barrier,
        gfx::PipelineKind,
        gfx::QueueType,
        gfx::ResourceState,
        gfx::cmd::CommandBuffer,
        gfx::queue::CommandQueue,
        gfx::queue::Fence,
        gfx::resource::Resource,
    };
}
