use crate::Error;

use super::Barrier;
use super::BufferInfo;
use super::ClearColour;
use super::ClearFlags;
use super::CommandSignatureInfo;
use super::CpuDescriptor;
use super::DescriptorHeapType;
use super::Format;
use super::GpuAddress;
use super::GpuDescriptor;
use super::IndexBufferView;
use super::MappedMemory;
use super::PipelineKind;
use super::PrimitiveTopology;
use super::QueueType;
use super::ResourceState;
use super::RootViewType;
use super::SamplerInfo;
use super::ScissorRect;
use super::TextureInfo;
use super::VertexBufferView;
use super::ViewKind;
use super::Viewport;
use super::pipeline::PipelineDesc;
use super::signature::SignatureDesc;
use super::upload::PAGE_ALIGNMENT;
use super::upload::align_up;

use parking_lot::{Condvar, Mutex};

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Size in bytes between consecutive descriptors of any heap type
pub const DESCRIPTOR_INCREMENT: usize = 32;

/// First gpu virtual address handed out
const BASE_GPU_ADDRESS: u64 = 0x1_0000_0000;

/// First cpu descriptor address handed out, 0 is the null descriptor
const BASE_CPU_DESCRIPTOR: usize = 0x1000;

/// First gpu descriptor address handed out
const BASE_GPU_DESCRIPTOR: u64 = 0x8000_0000;

/// Zeroed heap memory standing in for a gpu allocation, the pointer is stable for its lifetime
struct Memory {
    ptr: NonNull<u8>,
    layout: Layout,
    size: usize
}

// all access goes through raw pointer copies of disjoint or caller synchronised ranges
unsafe impl Send for Memory {}
unsafe impl Sync for Memory {}

impl Memory {
    fn new(size: usize) -> Result<Self, Error> {
        let layout = Layout::from_size_align(size.max(1), 256)
            .map_err(|err| Error::ResourceCreation(err.to_string()))?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            Error::ResourceCreation(format!("failed to allocate {} bytes", size))
        })?;
        Ok(Memory {
            ptr,
            layout,
            size
        })
    }

    fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let start = offset.min(self.size);
        let len = len.min(self.size - start);
        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(start), out.as_mut_ptr(), len);
        }
        out
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let start = offset.min(self.size);
        let len = data.len().min(self.size - start);
        unsafe {
            std::ptr::copy(data.as_ptr(), self.ptr.as_ptr().add(start), len);
        }
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        unsafe {
            std::alloc::dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

/// A buffer, texture or upload page. Buffers and pages are backed by cpu memory.
pub struct Resource {
    id: u64,
    gpu_address: GpuAddress,
    size: usize,
    memory: Option<Arc<Memory>>
}

impl Resource {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Reads `len` bytes at `offset`, clamped to the resource size. Empty for textures.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        self.memory.as_ref().map(|m| m.read(offset, len)).unwrap_or_default()
    }

    /// The whole contents of a buffer or page
    pub fn data(&self) -> Vec<u8> {
        self.read(0, self.size)
    }
}

/// A descriptor heap which stores the cpu handles copied into it
pub struct DescriptorHeap {
    id: u64,
    heap_type: DescriptorHeapType,
    capacity: u32,
    shader_visible: bool,
    cpu_start: CpuDescriptor,
    gpu_start: GpuDescriptor,
    contents: Mutex<Vec<CpuDescriptor>>
}

impl DescriptorHeap {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    /// Snapshot of every descriptor slot, unwritten slots hold the null descriptor
    pub fn contents(&self) -> Vec<CpuDescriptor> {
        self.contents.lock().clone()
    }

    /// Index of the slot a gpu handle from this heap refers to
    pub fn slot_of(&self, handle: GpuDescriptor) -> Option<u32> {
        let offset = handle.0.checked_sub(self.gpu_start.0)? as usize;
        let index = offset / DESCRIPTOR_INCREMENT;
        if offset % DESCRIPTOR_INCREMENT == 0 && index < self.capacity as usize {
            Some(index as u32)
        }
        else {
            None
        }
    }
}

impl super::DescriptorHeap<Device> for DescriptorHeap {
    fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn cpu_start(&self) -> CpuDescriptor {
        self.cpu_start
    }

    fn gpu_start(&self) -> GpuDescriptor {
        self.gpu_start
    }
}

/// A binding signature rebuilt from its serialised blob
pub struct Signature {
    id: u64,
    desc: SignatureDesc
}

impl Signature {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &SignatureDesc {
        &self.desc
    }
}

pub struct Pipeline {
    id: u64,
    kind: PipelineKind,
    signature: u64
}

impl Pipeline {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Id of the signature the pipeline was created with
    pub fn signature_id(&self) -> u64 {
        self.signature
    }
}

pub struct CommandSignature {
    id: u64,
    stride: usize
}

impl CommandSignature {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// A barrier as recorded in a command list, resources are identified by native id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierRecord {
    Transition {
        resource: u64,
        before: ResourceState,
        after: ResourceState
    },
    Uav {
        resource: Option<u64>
    },
    Aliasing {
        before: Option<u64>,
        after: Option<u64>
    }
}

impl BarrierRecord {
    fn from_barrier(barrier: &Barrier<Device>) -> Self {
        match barrier {
            Barrier::Transition { resource, before, after } => BarrierRecord::Transition {
                resource: resource.native().id,
                before: *before,
                after: *after
            },
            Barrier::Uav { resource } => BarrierRecord::Uav {
                resource: resource.as_ref().map(|r| r.native().id)
            },
            Barrier::Aliasing { before, after } => BarrierRecord::Aliasing {
                before: before.as_ref().map(|r| r.native().id),
                after: after.as_ref().map(|r| r.native().id)
            }
        }
    }
}

/// Every native call made on a null command list, objects are identified by native id
#[derive(Debug, Clone, PartialEq)]
pub enum NullCommand {
    Barriers(Vec<BarrierRecord>),
    SetDescriptorHeap {
        heap_type: DescriptorHeapType,
        heap: u64
    },
    SetSignature {
        kind: PipelineKind,
        signature: u64
    },
    SetPipeline {
        pipeline: u64
    },
    SetDescriptorTable {
        kind: PipelineKind,
        slot: u32,
        base: GpuDescriptor
    },
    SetRootView {
        kind: PipelineKind,
        slot: u32,
        view: RootViewType,
        address: GpuAddress
    },
    SetConstants {
        kind: PipelineKind,
        slot: u32,
        values: Vec<u32>,
        dest_offset: u32
    },
    SetPrimitiveTopology(PrimitiveTopology),
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>
    },
    SetIndexBuffer(IndexBufferView),
    SetViewports(Vec<Viewport>),
    SetScissorRects(Vec<ScissorRect>),
    SetRenderTargets {
        rtvs: Vec<CpuDescriptor>,
        dsv: Option<CpuDescriptor>
    },
    ClearRenderTarget {
        rtv: CpuDescriptor,
        colour: ClearColour
    },
    ClearDepthStencil {
        dsv: CpuDescriptor,
        flags: ClearFlags,
        depth: f32,
        stencil: u8
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32
    },
    ExecuteIndirect {
        command_signature: u64,
        max_count: u32,
        args: u64,
        args_offset: u64,
        count: Option<(u64, u64)>
    },
    CopyBufferRegion {
        dst: u64,
        dst_offset: u64,
        src: u64,
        src_offset: u64,
        size: u64
    },
    CopyResource {
        dst: u64,
        src: u64
    },
    ResolveSubresource {
        dst: u64,
        dst_subresource: u32,
        src: u64,
        src_subresource: u32,
        format: Format
    }
}

/// A byte copy replayed when the list executes
struct PendingCopy {
    dst: Arc<Memory>,
    dst_offset: usize,
    src: Arc<Memory>,
    src_offset: usize,
    size: usize
}

impl PendingCopy {
    fn replay(&self) {
        let data = self.src.read(self.src_offset, self.size);
        self.dst.write(self.dst_offset, &data);
    }
}

pub struct CmdList {
    queue_type: QueueType,
    commands: Vec<NullCommand>,
    copies: Vec<PendingCopy>,
    open: bool,
    resets: usize,
    fail_reset: Arc<AtomicBool>
}

impl CmdList {
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Commands recorded since the last reset
    pub fn commands(&self) -> &[NullCommand] {
        &self.commands
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn num_resets(&self) -> usize {
        self.resets
    }

    /// Each batched barrier call in recorded order
    pub fn barrier_batches(&self) -> Vec<&[BarrierRecord]> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                NullCommand::Barriers(batch) => Some(batch.as_slice()),
                _ => None
            })
            .collect()
    }

    /// Total barriers across all batches
    pub fn num_barriers(&self) -> usize {
        self.barrier_batches().iter().map(|b| b.len()).sum()
    }

    /// Descriptor table bindings in recorded order
    pub fn descriptor_tables(&self) -> Vec<(PipelineKind, u32, GpuDescriptor)> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                NullCommand::SetDescriptorTable { kind, slot, base } => Some((*kind, *slot, *base)),
                _ => None
            })
            .collect()
    }

    fn push(&mut self, cmd: NullCommand) {
        if !self.open {
            tracing::error!("hotline_gfx::null: {:?} recorded on a closed command list", cmd);
        }
        self.commands.push(cmd);
    }

    fn push_copy(&mut self, dst: &Resource, dst_offset: u64, src: &Resource, src_offset: u64, size: u64) {
        if let (Some(dst), Some(src)) = (&dst.memory, &src.memory) {
            self.copies.push(PendingCopy {
                dst: dst.clone(),
                dst_offset: dst_offset as usize,
                src: src.clone(),
                src_offset: src_offset as usize,
                size: size as usize
            });
        }
    }
}

impl super::CmdList<Device> for CmdList {
    fn reset(&mut self) -> Result<(), Error> {
        if self.fail_reset.load(Ordering::Relaxed) {
            return Err(Error::Device("null command list reset failed".to_string()));
        }
        self.commands.clear();
        self.copies.clear();
        self.open = true;
        self.resets += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if !self.open {
            return Err(Error::InvalidState("command list is already closed".to_string()));
        }
        self.open = false;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier<Device>]) {
        let records = barriers.iter().map(BarrierRecord::from_barrier).collect();
        self.push(NullCommand::Barriers(records));
    }

    fn set_descriptor_heap(&mut self, heap_type: DescriptorHeapType, heap: &DescriptorHeap) {
        self.push(NullCommand::SetDescriptorHeap {
            heap_type,
            heap: heap.id
        });
    }

    fn set_signature(&mut self, kind: PipelineKind, signature: &Signature) {
        self.push(NullCommand::SetSignature {
            kind,
            signature: signature.id
        });
    }

    fn set_pipeline(&mut self, pipeline: &Pipeline) {
        self.push(NullCommand::SetPipeline {
            pipeline: pipeline.id
        });
    }

    fn set_descriptor_table(&mut self, kind: PipelineKind, slot: u32, base: GpuDescriptor) {
        self.push(NullCommand::SetDescriptorTable { kind, slot, base });
    }

    fn set_root_view(&mut self, kind: PipelineKind, slot: u32, view: RootViewType, address: GpuAddress) {
        self.push(NullCommand::SetRootView { kind, slot, view, address });
    }

    fn set_constants(&mut self, kind: PipelineKind, slot: u32, values: &[u32], dest_offset: u32) {
        self.push(NullCommand::SetConstants {
            kind,
            slot,
            values: values.to_vec(),
            dest_offset
        });
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.push(NullCommand::SetPrimitiveTopology(topology));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.push(NullCommand::SetVertexBuffers {
            start_slot,
            views: views.to_vec()
        });
    }

    fn set_index_buffer(&mut self, view: &IndexBufferView) {
        self.push(NullCommand::SetIndexBuffer(*view));
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.push(NullCommand::SetViewports(viewports.to_vec()));
    }

    fn set_scissor_rects(&mut self, rects: &[ScissorRect]) {
        self.push(NullCommand::SetScissorRects(rects.to_vec()));
    }

    fn set_render_targets(&mut self, rtvs: &[CpuDescriptor], dsv: Option<CpuDescriptor>) {
        self.push(NullCommand::SetRenderTargets {
            rtvs: rtvs.to_vec(),
            dsv
        });
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptor, colour: &ClearColour) {
        self.push(NullCommand::ClearRenderTarget {
            rtv,
            colour: *colour
        });
    }

    fn clear_depth_stencil(&mut self, dsv: CpuDescriptor, flags: ClearFlags, depth: f32, stencil: u8) {
        self.push(NullCommand::ClearDepthStencil { dsv, flags, depth, stencil });
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32) {
        self.push(NullCommand::Draw {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32
    ) {
        self.push(NullCommand::DrawIndexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(NullCommand::Dispatch { x, y, z });
    }

    fn execute_indirect(
        &mut self,
        command_signature: &CommandSignature,
        max_count: u32,
        args: &Resource,
        args_offset: u64,
        count: Option<(&Resource, u64)>
    ) {
        self.push(NullCommand::ExecuteIndirect {
            command_signature: command_signature.id,
            max_count,
            args: args.id,
            args_offset,
            count: count.map(|(buffer, offset)| (buffer.id, offset))
        });
    }

    fn copy_buffer_region(&mut self, dst: &Resource, dst_offset: u64, src: &Resource, src_offset: u64, size: u64) {
        self.push_copy(dst, dst_offset, src, src_offset, size);
        self.push(NullCommand::CopyBufferRegion {
            dst: dst.id,
            dst_offset,
            src: src.id,
            src_offset,
            size
        });
    }

    fn copy_resource(&mut self, dst: &Resource, src: &Resource) {
        self.push_copy(dst, 0, src, 0, src.size.min(dst.size) as u64);
        self.push(NullCommand::CopyResource {
            dst: dst.id,
            src: src.id
        });
    }

    fn resolve_subresource(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        src: &Resource,
        src_subresource: u32,
        format: Format
    ) {
        self.push(NullCommand::ResolveSubresource {
            dst: dst.id,
            dst_subresource,
            src: src.id,
            src_subresource,
            format
        });
    }
}

/// A queue with a cpu side fence. With auto complete enabled every signal completes
/// immediately, otherwise `complete` models the gpu finishing work.
pub struct Queue {
    queue_type: QueueType,
    signaled: AtomicU64,
    completed: Mutex<u64>,
    completed_cond: Condvar,
    auto_complete: AtomicBool,
    executed: Mutex<Vec<Vec<NullCommand>>>
}

impl Queue {
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.auto_complete.store(auto_complete, Ordering::Relaxed);
    }

    /// Completes all work up to and including fence `value`
    pub fn complete(&self, value: u64) {
        let mut completed = self.completed.lock();
        *completed = (*completed).max(value.min(self.signaled.load(Ordering::Acquire)));
        self.completed_cond.notify_all();
    }

    /// Completes everything signaled so far
    pub fn complete_all(&self) {
        self.complete(self.signaled.load(Ordering::Acquire));
    }

    /// Last fence value handed out by `signal`
    pub fn last_signaled(&self) -> u64 {
        self.signaled.load(Ordering::Acquire)
    }

    /// Command streams of every executed list, in execution order
    pub fn executed(&self) -> Vec<Vec<NullCommand>> {
        self.executed.lock().clone()
    }

    pub fn num_executed(&self) -> usize {
        self.executed.lock().len()
    }
}

impl super::Queue<Device> for Queue {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn execute(&self, lists: &[&CmdList]) -> Result<(), Error> {
        if let Some(open) = lists.iter().find(|list| list.open) {
            return Err(Error::InvalidState(format!(
                "{:?} command list executed while open", open.queue_type
            )));
        }
        let mut executed = self.executed.lock();
        for list in lists {
            for copy in &list.copies {
                copy.replay();
            }
            executed.push(list.commands.clone());
        }
        Ok(())
    }

    fn signal(&self) -> Result<u64, Error> {
        let value = self.signaled.fetch_add(1, Ordering::AcqRel) + 1;
        if self.auto_complete.load(Ordering::Relaxed) {
            self.complete(value);
        }
        Ok(value)
    }

    fn completed_value(&self) -> u64 {
        *self.completed.lock()
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut completed = self.completed.lock();
        while *completed < value {
            match deadline {
                Some(deadline) => {
                    if self.completed_cond.wait_until(&mut completed, deadline).timed_out() {
                        return *completed >= value;
                    }
                }
                None => self.completed_cond.wait(&mut completed)
            }
        }
        true
    }
}

/// In memory device, every object it creates is inspectable
pub struct Device {
    next_id: AtomicU64,
    next_gpu_address: AtomicU64,
    next_cpu_descriptor: AtomicUsize,
    next_gpu_descriptor: AtomicU64,
    fail_signature_serialization: AtomicBool,
    fail_cmd_list_reset: Arc<AtomicBool>,
    auto_complete: AtomicBool,
    signatures_created: AtomicUsize,
    pipelines_created: AtomicUsize,
    heaps_created: AtomicUsize,
    upload_pages_created: AtomicUsize,
    views_created: AtomicUsize
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    pub fn new() -> Self {
        Device {
            next_id: AtomicU64::new(1),
            next_gpu_address: AtomicU64::new(BASE_GPU_ADDRESS),
            next_cpu_descriptor: AtomicUsize::new(BASE_CPU_DESCRIPTOR),
            next_gpu_descriptor: AtomicU64::new(BASE_GPU_DESCRIPTOR),
            fail_signature_serialization: AtomicBool::new(false),
            fail_cmd_list_reset: Arc::new(AtomicBool::new(false)),
            auto_complete: AtomicBool::new(true),
            signatures_created: AtomicUsize::new(0),
            pipelines_created: AtomicUsize::new(0),
            heaps_created: AtomicUsize::new(0),
            upload_pages_created: AtomicUsize::new(0),
            views_created: AtomicUsize::new(0)
        }
    }

    /// Makes `serialize_signature` fail until cleared
    pub fn set_fail_signature_serialization(&self, fail: bool) {
        self.fail_signature_serialization.store(fail, Ordering::Relaxed);
    }

    /// Makes `CmdList::reset` fail on every list created by this device until cleared
    pub fn set_fail_cmd_list_reset(&self, fail: bool) {
        self.fail_cmd_list_reset.store(fail, Ordering::Relaxed);
    }

    /// Auto complete setting of queues created from now on
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.auto_complete.store(auto_complete, Ordering::Relaxed);
    }

    pub fn num_signatures_created(&self) -> usize {
        self.signatures_created.load(Ordering::Relaxed)
    }

    pub fn num_pipelines_created(&self) -> usize {
        self.pipelines_created.load(Ordering::Relaxed)
    }

    /// Descriptor heaps created, shader visible or not
    pub fn num_heaps_created(&self) -> usize {
        self.heaps_created.load(Ordering::Relaxed)
    }

    pub fn num_upload_pages_created(&self) -> usize {
        self.upload_pages_created.load(Ordering::Relaxed)
    }

    /// Views and samplers written into cpu descriptors
    pub fn num_views_created(&self) -> usize {
        self.views_created.load(Ordering::Relaxed)
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn gpu_range(&self, size: usize) -> GpuAddress {
        let size = align_up(size.max(1) as u64, PAGE_ALIGNMENT as u64);
        self.next_gpu_address.fetch_add(size, Ordering::Relaxed)
    }

    fn buffer_resource(&self, size: usize) -> Result<Resource, Error> {
        Ok(Resource {
            id: self.id(),
            gpu_address: self.gpu_range(size),
            size,
            memory: Some(Arc::new(Memory::new(size)?))
        })
    }
}

impl super::Device for Device {
    type Resource = Resource;
    type DescriptorHeap = DescriptorHeap;
    type Signature = Signature;
    type Pipeline = Pipeline;
    type CommandSignature = CommandSignature;
    type CmdList = CmdList;
    type Queue = Queue;

    fn create_buffer(&self, info: &BufferInfo, data: Option<&[u8]>) -> Result<Resource, Error> {
        let size = info.size_bytes();
        if size == 0 {
            return Err(Error::ResourceCreation("buffer size is 0".to_string()));
        }
        if let Some(data) = data {
            if data.len() > size {
                return Err(Error::ResourceCreation(format!(
                    "{} bytes of initial data do not fit a {} byte buffer", data.len(), size
                )));
            }
        }
        let resource = self.buffer_resource(size)?;
        if let (Some(data), Some(memory)) = (data, &resource.memory) {
            memory.write(0, data);
        }
        Ok(resource)
    }

    fn create_texture(&self, info: &TextureInfo) -> Result<Resource, Error> {
        if info.width == 0 || info.height == 0 || info.depth == 0 {
            return Err(Error::ResourceCreation(format!(
                "texture dimensions {}x{}x{} are invalid", info.width, info.height, info.depth
            )));
        }
        Ok(Resource {
            id: self.id(),
            gpu_address: 0,
            size: 0,
            memory: None
        })
    }

    fn create_upload_page(&self, size: usize) -> Result<MappedMemory<Self>, Error> {
        let resource = self.buffer_resource(size)?;
        let cpu = resource.memory.as_ref().map(|m| m.ptr).ok_or_else(|| {
            Error::ResourceCreation("upload page has no memory".to_string())
        })?;
        self.upload_pages_created.fetch_add(1, Ordering::Relaxed);
        Ok(MappedMemory {
            gpu: resource.gpu_address,
            cpu,
            size,
            resource
        })
    }

    fn gpu_address(&self, resource: &Resource) -> GpuAddress {
        resource.gpu_address
    }

    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool
    ) -> Result<DescriptorHeap, Error> {
        if shader_visible && !heap_type.is_shader_visible() {
            return Err(Error::ResourceCreation(format!("{:?} heaps cannot be shader visible", heap_type)));
        }
        let bytes = capacity as usize * DESCRIPTOR_INCREMENT;
        let cpu_start = self.next_cpu_descriptor.fetch_add(bytes, Ordering::Relaxed);
        let gpu_start = if shader_visible {
            self.next_gpu_descriptor.fetch_add(bytes as u64, Ordering::Relaxed)
        }
        else {
            0
        };
        self.heaps_created.fetch_add(1, Ordering::Relaxed);
        Ok(DescriptorHeap {
            id: self.id(),
            heap_type,
            capacity,
            shader_visible,
            cpu_start: CpuDescriptor(cpu_start),
            gpu_start: GpuDescriptor(gpu_start),
            contents: Mutex::new(vec![CpuDescriptor::default(); capacity as usize])
        })
    }

    fn descriptor_increment_size(&self, _heap_type: DescriptorHeapType) -> usize {
        DESCRIPTOR_INCREMENT
    }

    fn create_view(&self, _resource: &Resource, _kind: ViewKind, _dst: CpuDescriptor) {
        self.views_created.fetch_add(1, Ordering::Relaxed);
    }

    fn create_sampler(&self, _info: &SamplerInfo, _dst: CpuDescriptor) {
        self.views_created.fetch_add(1, Ordering::Relaxed);
    }

    fn copy_descriptors(
        &self,
        heap_type: DescriptorHeapType,
        dst: &DescriptorHeap,
        dst_offset: u32,
        src: &[CpuDescriptor]
    ) {
        if heap_type != dst.heap_type {
            tracing::error!(
                "hotline_gfx::null: copying {:?} descriptors into a {:?} heap", heap_type, dst.heap_type
            );
            return;
        }
        let mut contents = dst.contents.lock();
        let start = dst_offset as usize;
        let end = (start + src.len()).min(contents.len());
        if end < start + src.len() {
            tracing::error!(
                "hotline_gfx::null: copy of {} descriptors at {} overflows heap of {}", src.len(), start, contents.len()
            );
        }
        if start < end {
            contents[start..end].copy_from_slice(&src[..end - start]);
        }
    }

    fn serialize_signature(&self, desc: &SignatureDesc) -> Result<Vec<u8>, Error> {
        if self.fail_signature_serialization.load(Ordering::Relaxed) {
            return Err(Error::Serialization("null device signature serialisation failure".to_string()));
        }
        serde_json::to_vec(desc).map_err(|err| Error::Serialization(err.to_string()))
    }

    fn create_signature(&self, blob: &[u8]) -> Result<Signature, Error> {
        let desc: SignatureDesc = serde_json::from_slice(blob)
            .map_err(|err| Error::Serialization(err.to_string()))?;
        self.signatures_created.fetch_add(1, Ordering::Relaxed);
        Ok(Signature {
            id: self.id(),
            desc
        })
    }

    fn create_pipeline(&self, desc: &PipelineDesc, signature: &Signature) -> Result<Pipeline, Error> {
        let has_shaders = match desc.kind {
            PipelineKind::Graphics => desc.vs.is_some(),
            PipelineKind::Compute => desc.cs.is_some()
        };
        if !has_shaders {
            return Err(Error::ResourceCreation(format!("{:?} pipeline is missing shader byte code", desc.kind)));
        }
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(Pipeline {
            id: self.id(),
            kind: desc.kind,
            signature: signature.id
        })
    }

    fn create_command_signature(
        &self,
        info: &CommandSignatureInfo,
        _signature: Option<&Signature>
    ) -> Result<CommandSignature, Error> {
        if info.arguments.is_empty() {
            return Err(Error::ResourceCreation("command signature has no arguments".to_string()));
        }
        let packed: usize = info.arguments.iter().map(|a| a.size_bytes()).sum();
        if info.stride != 0 && info.stride < packed {
            return Err(Error::ResourceCreation(format!(
                "command signature stride {} is smaller than its {} bytes of arguments", info.stride, packed
            )));
        }
        Ok(CommandSignature {
            id: self.id(),
            stride: if info.stride == 0 { packed } else { info.stride }
        })
    }

    fn create_cmd_list(&self, queue_type: QueueType) -> Result<CmdList, Error> {
        Ok(CmdList {
            queue_type,
            commands: Vec::new(),
            copies: Vec::new(),
            open: false,
            resets: 0,
            fail_reset: self.fail_cmd_list_reset.clone()
        })
    }

    fn create_queue(&self, queue_type: QueueType) -> Result<Queue, Error> {
        Ok(Queue {
            queue_type,
            signaled: AtomicU64::new(0),
            completed: Mutex::new(0),
            completed_cond: Condvar::new(),
            auto_complete: AtomicBool::new(self.auto_complete.load(Ordering::Relaxed)),
            executed: Mutex::new(Vec::new())
        })
    }
}
