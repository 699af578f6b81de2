use super::BufferInfo;
use super::CpuDescriptor;
use super::Device;
use super::Format;
use super::GpuAddress;
use super::IndexBufferView;
use super::ResourceState;
use super::TextureInfo;
use super::VertexBufferView;
use super::ViewKind;
use super::descriptors::DescriptorAllocation;

use parking_lot::Mutex;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Describes what a resource is, used to validate bindings
#[derive(Debug, Clone)]
pub enum ResourceDesc {
    Buffer(BufferInfo),
    Texture(TextureInfo)
}

/// Views created for a resource at creation time
#[derive(Default)]
pub struct ResourceViews {
    pub srv: Option<DescriptorAllocation>,
    pub uav: Option<DescriptorAllocation>,
    pub cbv: Option<DescriptorAllocation>,
    pub rtv: Option<DescriptorAllocation>,
    pub dsv: Option<DescriptorAllocation>
}

impl ResourceViews {
    pub fn get(&self, kind: ViewKind) -> Option<CpuDescriptor> {
        let alloc = match kind {
            ViewKind::ShaderResource => &self.srv,
            ViewKind::UnorderedAccess => &self.uav,
            ViewKind::ConstantBuffer => &self.cbv,
            ViewKind::RenderTarget => &self.rtv,
            ViewKind::DepthStencil => &self.dsv
        };
        alloc.as_ref().map(|a| a.handle())
    }
}

struct ResourceInner<D: Device> {
    id: u64,
    native: D::Resource,
    desc: ResourceDesc,
    gpu_address: GpuAddress,
    views: ResourceViews,
    state: Mutex<ResourceState>
}

/// Shared handle to a native buffer or texture and its current usage state.
/// Clones refer to the same resource; the native resource is destroyed with the last handle,
/// command buffers hold handles until their submission has been retired.
pub struct Resource<D: Device> {
    inner: Arc<ResourceInner<D>>
}

impl<D> Clone for Resource<D> where D: Device {
    fn clone(&self) -> Self {
        Resource {
            inner: self.inner.clone()
        }
    }
}

impl<D> std::fmt::Debug for Resource<D> where D: Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.inner.id)
            .field("desc", &self.inner.desc)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl<D> Resource<D> where D: Device {
    pub fn new(
        native: D::Resource,
        desc: ResourceDesc,
        gpu_address: GpuAddress,
        views: ResourceViews,
        initial_state: ResourceState
    ) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
                native,
                desc,
                gpu_address,
                views,
                state: Mutex::new(initial_state)
            })
        }
    }

    /// Unique id for the lifetime of the process
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn native(&self) -> &D::Resource {
        &self.inner.native
    }

    pub fn desc(&self) -> &ResourceDesc {
        &self.inner.desc
    }

    pub fn gpu_address(&self) -> GpuAddress {
        self.inner.gpu_address
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.inner.desc, ResourceDesc::Buffer(_))
    }

    pub fn is_texture(&self) -> bool {
        matches!(self.inner.desc, ResourceDesc::Texture(_))
    }

    pub fn buffer_info(&self) -> Option<&BufferInfo> {
        match &self.inner.desc {
            ResourceDesc::Buffer(info) => Some(info),
            ResourceDesc::Texture(_) => None
        }
    }

    pub fn texture_info(&self) -> Option<&TextureInfo> {
        match &self.inner.desc {
            ResourceDesc::Texture(info) => Some(info),
            ResourceDesc::Buffer(_) => None
        }
    }

    /// Size in bytes of a buffer, 0 for textures
    pub fn size_bytes(&self) -> usize {
        self.buffer_info().map(|info| info.size_bytes()).unwrap_or(0)
    }

    /// The current usage state as understood by the tracker
    pub fn state(&self) -> ResourceState {
        *self.inner.state.lock()
    }

    /// Swaps in `state` returning the previous state, only the tracker mutates state
    pub(crate) fn exchange_state(&self, state: ResourceState) -> ResourceState {
        std::mem::replace(&mut *self.inner.state.lock(), state)
    }

    pub fn view(&self, kind: ViewKind) -> Option<CpuDescriptor> {
        self.inner.views.get(kind)
    }

    pub fn srv(&self) -> Option<CpuDescriptor> {
        self.view(ViewKind::ShaderResource)
    }

    pub fn uav(&self) -> Option<CpuDescriptor> {
        self.view(ViewKind::UnorderedAccess)
    }

    pub fn cbv(&self) -> Option<CpuDescriptor> {
        self.view(ViewKind::ConstantBuffer)
    }

    pub fn rtv(&self) -> Option<CpuDescriptor> {
        self.view(ViewKind::RenderTarget)
    }

    pub fn dsv(&self) -> Option<CpuDescriptor> {
        self.view(ViewKind::DepthStencil)
    }

    /// Vertex buffer view over the whole buffer, `None` for textures or buffers without a stride
    pub fn vertex_buffer_view(&self) -> Option<VertexBufferView> {
        let info = self.buffer_info()?;
        if info.stride == 0 {
            return None;
        }
        Some(VertexBufferView {
            location: self.inner.gpu_address,
            size_bytes: info.size_bytes() as u32,
            stride_bytes: info.stride as u32
        })
    }

    /// Index buffer view over the whole buffer, `None` unless the buffer has an index format
    pub fn index_buffer_view(&self) -> Option<IndexBufferView> {
        let info = self.buffer_info()?;
        if !info.format.is_index() {
            return None;
        }
        Some(IndexBufferView {
            location: self.inner.gpu_address,
            size_bytes: info.size_bytes() as u32,
            format: info.format
        })
    }

    /// Format of a texture or typed buffer
    pub fn format(&self) -> Format {
        match &self.inner.desc {
            ResourceDesc::Buffer(info) => info.format,
            ResourceDesc::Texture(info) => info.format
        }
    }

    /// Returns true if both handles refer to the same resource
    pub fn ptr_eq(&self, other: &Resource<D>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles, including those held by in flight command buffers
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
