/// Implements the native interfaces entirely in memory, used for headless runs and tests
pub mod null;

/// Shared resource handles with tracked usage state
pub mod resource;

/// Resource state tracking and barrier batching
pub mod tracker;

/// Transient upload memory for per draw constant, vertex and index data
pub mod upload;

/// Cpu descriptor allocation and pools of shader visible descriptor heaps
pub mod descriptors;

/// Staging and bulk upload of descriptor tables before draws and dispatches
pub mod dynamic_heap;

/// Binding signatures (root signatures) and the interning cache
pub mod signature;

/// Pipeline state objects with lazily resolved native objects
pub mod pipeline;

/// Command buffer lifecycle and recording api
pub mod cmd;

/// Command queues, fences and command buffer recycling
pub mod queue;

use crate::Error;

use resource::Resource;
use signature::SignatureDesc;
use pipeline::PipelineDesc;

use serde::{Deserialize, Serialize};

use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::time::Duration;

/// Gpu virtual address of a byte in a resource
pub type GpuAddress = u64;

/// The hardware queue a command buffer is recorded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    Copy,
    Compute,
    Graphics,
    Bundle
}

impl QueueType {
    /// Returns true if work for pipelines of `kind` can be recorded on this queue type
    pub fn supports(self, kind: PipelineKind) -> bool {
        match self {
            QueueType::Copy => false,
            QueueType::Compute => kind == PipelineKind::Compute,
            QueueType::Graphics | QueueType::Bundle => true
        }
    }
}

/// The binding point a signature, descriptor table or pipeline is used with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineKind {
    Compute,
    Graphics
}

impl PipelineKind {
    pub const COUNT: usize = 2;
    pub const ALL: [PipelineKind; 2] = [PipelineKind::Compute, PipelineKind::Graphics];

    pub fn index(self) -> usize {
        match self {
            PipelineKind::Compute => 0,
            PipelineKind::Graphics => 1
        }
    }
}

/// Types of native descriptor heaps, only `ShaderResource` and `Sampler` can be shader visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views
    ShaderResource,
    Sampler,
    RenderTarget,
    DepthStencil
}

impl DescriptorHeapType {
    pub const COUNT: usize = 4;
    pub const ALL: [DescriptorHeapType; 4] = [
        DescriptorHeapType::ShaderResource,
        DescriptorHeapType::Sampler,
        DescriptorHeapType::RenderTarget,
        DescriptorHeapType::DepthStencil
    ];
    pub const SHADER_VISIBLE: [DescriptorHeapType; 2] = [
        DescriptorHeapType::ShaderResource,
        DescriptorHeapType::Sampler
    ];

    pub fn index(self) -> usize {
        match self {
            DescriptorHeapType::ShaderResource => 0,
            DescriptorHeapType::Sampler => 1,
            DescriptorHeapType::RenderTarget => 2,
            DescriptorHeapType::DepthStencil => 3
        }
    }

    pub fn is_shader_visible(self) -> bool {
        matches!(self, DescriptorHeapType::ShaderResource | DescriptorHeapType::Sampler)
    }
}

/// Cpu handle to a descriptor living in a non shader visible heap, the default value is the null descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptor(pub usize);

impl CpuDescriptor {
    pub fn offset(self, index: u32, increment: usize) -> CpuDescriptor {
        CpuDescriptor(self.0 + index as usize * increment)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Gpu handle to a descriptor living in a shader visible heap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptor(pub u64);

impl GpuDescriptor {
    pub fn offset(self, index: u32, increment: usize) -> GpuDescriptor {
        GpuDescriptor(self.0 + index as u64 * increment as u64)
    }
}

bitflags! {
    /// Usage states of a resource. `COMMON` is the empty set, combined read states can be
    /// tested with `contains` and `intersects`.
    pub struct ResourceState: u32 {
        const COMMON = 0;
        const VERTEX_BUFFER = 1 << 0;
        const CONSTANT_BUFFER = 1 << 1;
        const INDEX_BUFFER = 1 << 2;
        const RENDER_TARGET = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
        const DEPTH_WRITE = 1 << 5;
        const DEPTH_READ = 1 << 6;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 7;
        const PIXEL_SHADER_RESOURCE = 1 << 8;
        const COPY_SOURCE = 1 << 9;
        const COPY_DEST = 1 << 10;
        const RESOLVE_SOURCE = 1 << 11;
        const RESOLVE_DEST = 1 << 12;
        const PRESENT = 1 << 13;
        const INDIRECT_ARGUMENT = 1 << 14;
        const PREDICATION = 1 << 15;

        const VERTEX_AND_CONSTANT_BUFFER = Self::VERTEX_BUFFER.bits | Self::CONSTANT_BUFFER.bits;
        const SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits | Self::PIXEL_SHADER_RESOURCE.bits;
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits
            | Self::INDEX_BUFFER.bits
            | Self::SHADER_RESOURCE.bits
            | Self::INDIRECT_ARGUMENT.bits
            | Self::COPY_SOURCE.bits;
    }
}

impl ResourceState {
    const WRITE_STATES: ResourceState = ResourceState::from_bits_truncate(
        ResourceState::RENDER_TARGET.bits
            | ResourceState::UNORDERED_ACCESS.bits
            | ResourceState::DEPTH_WRITE.bits
            | ResourceState::COPY_DEST.bits
            | ResourceState::RESOLVE_DEST.bits
    );

    /// Returns true if this state allows the gpu to write to the resource
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// Returns true if this state is made only of read states (or is `COMMON`)
    pub fn is_read_only(self) -> bool {
        !self.is_write()
    }

    /// Successive unordered access requires a hazard barrier even without a state change
    pub fn has_unordered_access(self) -> bool {
        self.contains(ResourceState::UNORDERED_ACCESS)
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        ResourceState::COMMON
    }
}

/// A barrier buffered in the tracker and handed to the native command list in batches
pub enum Barrier<D: Device> {
    /// Usage state change of a whole resource
    Transition {
        resource: Resource<D>,
        before: ResourceState,
        after: ResourceState
    },
    /// All unordered access writes to `resource` (or any resource if `None`) must complete
    Uav {
        resource: Option<Resource<D>>
    },
    /// Switches which of two placed resources sharing memory is active
    Aliasing {
        before: Option<Resource<D>>,
        after: Option<Resource<D>>
    }
}

impl<D> Clone for Barrier<D> where D: Device {
    fn clone(&self) -> Self {
        match self {
            Barrier::Transition { resource, before, after } => Barrier::Transition {
                resource: resource.clone(),
                before: *before,
                after: *after
            },
            Barrier::Uav { resource } => Barrier::Uav {
                resource: resource.clone()
            },
            Barrier::Aliasing { before, after } => Barrier::Aliasing {
                before: before.clone(),
                after: after.clone()
            }
        }
    }
}

impl<D> std::fmt::Debug for Barrier<D> where D: Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Barrier::Transition { resource, before, after } => write!(
                f, "Transition({} {:?} -> {:?})", resource.id(), before, after
            ),
            Barrier::Uav { resource } => write!(
                f, "Uav({:?})", resource.as_ref().map(|r| r.id())
            ),
            Barrier::Aliasing { before, after } => write!(
                f, "Aliasing({:?} -> {:?})", before.as_ref().map(|r| r.id()), after.as_ref().map(|r| r.id())
            )
        }
    }
}

/// Data formats for textures, typed buffers, index buffers and vertex elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Unknown,
    R16u,
    R32u,
    R32f,
    RG32f,
    RGB32f,
    RGBA32f,
    RGBA8u,
    RGBA8n,
    BGRA8n,
    RGBA16f,
    D32f,
    D24nS8u
}

impl Format {
    /// Size of a single element in bytes, 0 for `Unknown`
    pub fn size_bytes(self) -> usize {
        match self {
            Format::Unknown => 0,
            Format::R16u => 2,
            Format::R32u | Format::R32f | Format::RGBA8u | Format::RGBA8n | Format::BGRA8n => 4,
            Format::D32f | Format::D24nS8u => 4,
            Format::RG32f | Format::RGBA16f => 8,
            Format::RGB32f => 12,
            Format::RGBA32f => 16
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32f | Format::D24nS8u)
    }

    pub fn is_index(self) -> bool {
        matches!(self, Format::R16u | Format::R32u)
    }
}

bitflags! {
    /// Describes how a buffer will be bound, determines which views are created for it
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const SHADER_RESOURCE = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
        const INDIRECT_ARGUMENT = 1 << 5;
        const UPLOAD = 1 << 6;
        const READ_BACK = 1 << 7;
    }
}

bitflags! {
    /// Describes how a texture will be bound, determines which views are created for it
    pub struct TextureUsage: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const UNORDERED_ACCESS = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
    }
}

/// Information to create a buffer
#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub usage: BufferUsage,
    /// Element format for typed views and index buffers, `Format::Unknown` for structured data
    pub format: Format,
    pub stride: usize,
    pub num_elements: usize,
    pub initial_state: ResourceState
}

impl BufferInfo {
    pub fn size_bytes(&self) -> usize {
        self.stride * self.num_elements
    }
}

/// Dimension of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Texture1D,
    Texture2D,
    Texture3D
}

/// Information to create a texture
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub tex_type: TextureType,
    pub format: Format,
    pub width: u64,
    pub height: u64,
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub samples: u32,
    pub usage: TextureUsage,
    pub initial_state: ResourceState
}

/// The kind of view written into a cpu descriptor by `Device::create_view`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    ShaderResource,
    UnorderedAccess,
    ConstantBuffer,
    RenderTarget,
    DepthStencil
}

impl ViewKind {
    pub fn heap_type(self) -> DescriptorHeapType {
        match self {
            ViewKind::ShaderResource | ViewKind::UnorderedAccess | ViewKind::ConstantBuffer => {
                DescriptorHeapType::ShaderResource
            }
            ViewKind::RenderTarget => DescriptorHeapType::RenderTarget,
            ViewKind::DepthStencil => DescriptorHeapType::DepthStencil
        }
    }
}

/// Sampler filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplerFilter {
    Point,
    Linear,
    Anisotropic
}

/// Sampler texture coordinate addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplerAddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border
}

/// Comparison function for comparison samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always
}

/// Border colour used with `SamplerAddressMode::Border`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorderColour {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite
}

/// Information to create a sampler, either a descriptor or a static sampler inside a signature
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerInfo {
    pub filter: SamplerFilter,
    pub address_u: SamplerAddressMode,
    pub address_v: SamplerAddressMode,
    pub address_w: SamplerAddressMode,
    pub comparison: Option<ComparisonFunc>,
    pub border_colour: BorderColour,
    pub mip_lod_bias: f32,
    pub max_aniso: u32,
    pub min_lod: f32,
    pub max_lod: f32
}

impl Default for SamplerInfo {
    fn default() -> Self {
        SamplerInfo {
            filter: SamplerFilter::Linear,
            address_u: SamplerAddressMode::Wrap,
            address_v: SamplerAddressMode::Wrap,
            address_w: SamplerAddressMode::Wrap,
            comparison: None,
            border_colour: BorderColour::TransparentBlack,
            mip_lod_bias: 0.0,
            max_aniso: 0,
            min_lod: 0.0,
            max_lod: f32::MAX
        }
    }
}

// float members compare and hash by bit pattern so identical descriptions intern to one signature
impl PartialEq for SamplerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
            && self.address_u == other.address_u
            && self.address_v == other.address_v
            && self.address_w == other.address_w
            && self.comparison == other.comparison
            && self.border_colour == other.border_colour
            && self.mip_lod_bias.to_bits() == other.mip_lod_bias.to_bits()
            && self.max_aniso == other.max_aniso
            && self.min_lod.to_bits() == other.min_lod.to_bits()
            && self.max_lod.to_bits() == other.max_lod.to_bits()
    }
}

impl Eq for SamplerInfo {}

impl Hash for SamplerInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.hash(state);
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        self.comparison.hash(state);
        self.border_colour.hash(state);
        self.mip_lod_bias.to_bits().hash(state);
        self.max_aniso.hash(state);
        self.min_lod.to_bits().hash(state);
        self.max_lod.to_bits().hash(state);
    }
}

/// Structure to specify viewport coordinates on a `CmdList`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32
}

impl Viewport {
    pub fn create(width: f32, height: f32) -> Viewport {
        Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0
        }
    }
}

/// Structure to specify scissor rect coordinates on a `CmdList`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32
}

/// Colour for clearing render targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32
}

bitflags! {
    /// Selects which aspects of a depth stencil target are cleared
    pub struct ClearFlags: u8 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
    }
}

/// Primitive topology bound to the input assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip
}

/// View of a vertex buffer bound to a vertex buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    pub location: GpuAddress,
    pub size_bytes: u32,
    pub stride_bytes: u32
}

/// View of an index buffer bound to the input assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    pub location: GpuAddress,
    pub size_bytes: u32,
    pub format: Format
}

/// Type of a view bound directly to a signature slot without a descriptor table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootViewType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess
}

/// Arguments which make up a single command in an indirect argument buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectArgument {
    Draw,
    DrawIndexed,
    Dispatch,
    Constants {
        slot: u32,
        num_values: u32,
        dest_offset: u32
    },
    ConstantBuffer {
        slot: u32
    }
}

impl IndirectArgument {
    /// Size of this argument in the argument buffer
    pub fn size_bytes(self) -> usize {
        match self {
            IndirectArgument::Draw => 16,
            IndirectArgument::DrawIndexed => 20,
            IndirectArgument::Dispatch => 12,
            IndirectArgument::Constants { num_values, .. } => num_values as usize * 4,
            IndirectArgument::ConstantBuffer { .. } => 8
        }
    }
}

/// Information to create a command signature for `execute_indirect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSignatureInfo {
    pub arguments: Vec<IndirectArgument>,
    /// Stride between commands in the argument buffer, 0 to use the packed size of the arguments
    pub stride: usize
}

/// Persistently mapped memory returned by `Device::create_upload_page`
pub struct MappedMemory<D: Device> {
    pub resource: D::Resource,
    pub cpu: NonNull<u8>,
    pub gpu: GpuAddress,
    pub size: usize
}

/// A native graphics device, the factory for all native objects
pub trait Device: 'static + Send + Sync + Sized {
    type Resource: 'static + Send + Sync;
    type DescriptorHeap: DescriptorHeap<Self>;
    type Signature: 'static + Send + Sync;
    type Pipeline: 'static + Send + Sync;
    type CommandSignature: 'static + Send + Sync;
    type CmdList: CmdList<Self>;
    type Queue: Queue<Self>;

    /// Create a buffer with optional initial `data` which must not exceed the buffer size
    fn create_buffer(&self, info: &BufferInfo, data: Option<&[u8]>) -> Result<Self::Resource, Error>;
    fn create_texture(&self, info: &TextureInfo) -> Result<Self::Resource, Error>;
    /// Create cpu writable, gpu visible memory which stays mapped for the lifetime of the resource.
    /// The gpu address must be aligned to `upload::PAGE_ALIGNMENT`
    fn create_upload_page(&self, size: usize) -> Result<MappedMemory<Self>, Error>;
    fn gpu_address(&self, resource: &Self::Resource) -> GpuAddress;
    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool
    ) -> Result<Self::DescriptorHeap, Error>;
    fn descriptor_increment_size(&self, heap_type: DescriptorHeapType) -> usize;
    /// Write a view of `resource` into the cpu descriptor `dst`
    fn create_view(&self, resource: &Self::Resource, kind: ViewKind, dst: CpuDescriptor);
    fn create_sampler(&self, info: &SamplerInfo, dst: CpuDescriptor);
    /// Copy `src` descriptors into consecutive slots of a shader visible heap starting at `dst_offset`
    fn copy_descriptors(
        &self,
        heap_type: DescriptorHeapType,
        dst: &Self::DescriptorHeap,
        dst_offset: u32,
        src: &[CpuDescriptor]
    );
    /// Serialise a signature description into the native binary format
    fn serialize_signature(&self, desc: &SignatureDesc) -> Result<Vec<u8>, Error>;
    fn create_signature(&self, blob: &[u8]) -> Result<Self::Signature, Error>;
    fn create_pipeline(&self, desc: &PipelineDesc, signature: &Self::Signature) -> Result<Self::Pipeline, Error>;
    fn create_command_signature(
        &self,
        info: &CommandSignatureInfo,
        signature: Option<&Self::Signature>
    ) -> Result<Self::CommandSignature, Error>;
    fn create_cmd_list(&self, queue_type: QueueType) -> Result<Self::CmdList, Error>;
    fn create_queue(&self, queue_type: QueueType) -> Result<Self::Queue, Error>;
}

/// A shader visible native descriptor heap
pub trait DescriptorHeap<D: Device>: 'static + Send + Sync {
    fn heap_type(&self) -> DescriptorHeapType;
    fn capacity(&self) -> u32;
    fn cpu_start(&self) -> CpuDescriptor;
    fn gpu_start(&self) -> GpuDescriptor;
}

/// A native command list, the recording handle owned by a `cmd::CommandBuffer`
pub trait CmdList<D: Device>: 'static + Send {
    /// Reset the native allocator and reopen the list for recording
    fn reset(&mut self) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;
    fn resource_barriers(&mut self, barriers: &[Barrier<D>]);
    /// Bind a shader visible heap, heaps of the other type stay bound
    fn set_descriptor_heap(&mut self, heap_type: DescriptorHeapType, heap: &D::DescriptorHeap);
    fn set_signature(&mut self, kind: PipelineKind, signature: &D::Signature);
    fn set_pipeline(&mut self, pipeline: &D::Pipeline);
    fn set_descriptor_table(&mut self, kind: PipelineKind, slot: u32, base: GpuDescriptor);
    fn set_root_view(&mut self, kind: PipelineKind, slot: u32, view: RootViewType, address: GpuAddress);
    fn set_constants(&mut self, kind: PipelineKind, slot: u32, values: &[u32], dest_offset: u32);
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);
    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);
    fn set_index_buffer(&mut self, view: &IndexBufferView);
    fn set_viewports(&mut self, viewports: &[Viewport]);
    fn set_scissor_rects(&mut self, rects: &[ScissorRect]);
    fn set_render_targets(&mut self, rtvs: &[CpuDescriptor], dsv: Option<CpuDescriptor>);
    fn clear_render_target(&mut self, rtv: CpuDescriptor, colour: &ClearColour);
    fn clear_depth_stencil(&mut self, dsv: CpuDescriptor, flags: ClearFlags, depth: f32, stencil: u8);
    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32);
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn execute_indirect(
        &mut self,
        command_signature: &D::CommandSignature,
        max_count: u32,
        args: &D::Resource,
        args_offset: u64,
        count: Option<(&D::Resource, u64)>
    );
    fn copy_buffer_region(&mut self, dst: &D::Resource, dst_offset: u64, src: &D::Resource, src_offset: u64, size: u64);
    fn copy_resource(&mut self, dst: &D::Resource, src: &D::Resource);
    fn resolve_subresource(
        &mut self,
        dst: &D::Resource,
        dst_subresource: u32,
        src: &D::Resource,
        src_subresource: u32,
        format: Format
    );
}

/// A native hardware queue with an attached fence
pub trait Queue<D: Device>: 'static + Send + Sync {
    fn queue_type(&self) -> QueueType;
    /// Execute closed command lists in order
    fn execute(&self, lists: &[&D::CmdList]) -> Result<(), Error>;
    /// Signal the queue fence with the next value once all prior work completes, returns the value
    fn signal(&self) -> Result<u64, Error>;
    /// The last fence value the gpu has completed
    fn completed_value(&self) -> u64;
    /// Block until `value` completes or `timeout` elapses, returns true if `value` completed
    fn wait(&self, value: u64, timeout: Option<Duration>) -> bool;
}
