use crate::Error;

use super::Barrier;
use super::ClearColour;
use super::ClearFlags;
use super::CmdList;
use super::CommandSignatureInfo;
use super::CpuDescriptor;
use super::DescriptorHeapType;
use super::Device;
use super::Format;
use super::IndexBufferView;
use super::PipelineKind;
use super::PrimitiveTopology;
use super::QueueType;
use super::ResourceState;
use super::RootViewType;
use super::ScissorRect;
use super::VertexBufferView;
use super::ViewKind;
use super::Viewport;
use super::descriptors::DescriptorHeapPool;
use super::descriptors::Sampler;
use super::dynamic_heap::DynamicDescriptorHeap;
use super::pipeline::PipelineState;
use super::resource::Resource;
use super::signature::BindingSignature;
use super::signature::DescriptorRangeType;
use super::signature::SlotType;
use super::tracker::ResourceStateTracker;
use super::upload::CONSTANT_BUFFER_ALIGNMENT;
use super::upload::PagePool;
use super::upload::TransientAllocator;

use std::any::Any;
use std::sync::Arc;

const SHADER_HEAP: usize = 0;
const SAMPLER_HEAP: usize = 1;

/// Alignment of dynamic vertex and index data and buffer updates in transient memory
const DYNAMIC_BUFFER_ALIGNMENT: usize = 16;

/// Lifecycle of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Created, `begin` has not been called yet
    Idle,
    /// Between `begin` and `end`, recording calls are accepted
    Recording,
    /// `end` closed the native list, ready to submit
    Closed,
    /// Executing on a queue, nothing may be reclaimed
    Submitted,
    /// The submission fence completed, the buffer can begin again
    Retired,
    /// The native list failed to reset or close, the buffer must not be reused
    Broken
}

/// Shared pools a command buffer draws transient memory and shader visible heaps from
pub struct TransientPools<D: Device> {
    pub device: Arc<D>,
    pub pages: Arc<PagePool<D>>,
    pub shader_heaps: Arc<DescriptorHeapPool<D>>,
    pub sampler_heaps: Arc<DescriptorHeapPool<D>>
}

impl<D> Clone for TransientPools<D> where D: Device {
    fn clone(&self) -> Self {
        TransientPools {
            device: self.device.clone(),
            pages: self.pages.clone(),
            shader_heaps: self.shader_heaps.clone(),
            sampler_heaps: self.sampler_heaps.clone()
        }
    }
}

/// Native command signature for `execute_indirect` and the layout of its argument buffer
pub struct CommandSignature<D: Device> {
    info: CommandSignatureInfo,
    native: Arc<D::CommandSignature>,
    signature: Option<Arc<BindingSignature<D>>>
}

impl<D> Clone for CommandSignature<D> where D: Device {
    fn clone(&self) -> Self {
        CommandSignature {
            info: self.info.clone(),
            native: self.native.clone(),
            signature: self.signature.clone()
        }
    }
}

impl<D> CommandSignature<D> where D: Device {
    pub fn new(info: CommandSignatureInfo, native: D::CommandSignature, signature: Option<Arc<BindingSignature<D>>>) -> Self {
        CommandSignature {
            info,
            native: Arc::new(native),
            signature
        }
    }

    pub fn info(&self) -> &CommandSignatureInfo {
        &self.info
    }

    pub fn native(&self) -> &D::CommandSignature {
        &self.native
    }

    /// Binding signature the arguments write into, required when arguments change bindings
    pub fn signature(&self) -> Option<&Arc<BindingSignature<D>>> {
        self.signature.as_ref()
    }

    /// Byte stride between commands in an argument buffer
    pub fn stride(&self) -> usize {
        if self.info.stride > 0 {
            self.info.stride
        }
        else {
            self.info.arguments.iter().map(|a| a.size_bytes()).sum()
        }
    }
}

/// Records work for one queue type on top of a native command list.
///
/// Owns the per buffer transient state: upload memory, shader visible descriptor heaps for
/// views and samplers, the pending barrier list and the resources referenced by recorded
/// commands. All of it is reclaimed by `begin`, which must only be called once the previous
/// submission has completed on the gpu (`CommandQueue` guarantees this for recycled buffers).
///
/// Misuse while recording (wrong resource kind, binding before a signature, calling outside
/// of `begin`/`end`) is logged and the call is ignored.
pub struct CommandBuffer<D: Device> {
    queue_type: QueueType,
    state: CommandBufferState,
    cmd_list: D::CmdList,
    tracker: ResourceStateTracker<D>,
    upload: TransientAllocator<D>,
    heaps: [DynamicDescriptorHeap<D>; 2],
    keep_alive: Vec<Resource<D>>,
    keep_alive_objects: Vec<Arc<dyn Any + Send + Sync>>,
    signatures: [Option<Arc<BindingSignature<D>>>; PipelineKind::COUNT],
    fence_value: u64
}

impl<D> CommandBuffer<D> where D: Device {
    pub fn new(pools: &TransientPools<D>, queue_type: QueueType) -> Result<Self, Error> {
        let cmd_list = pools.device.create_cmd_list(queue_type).map_err(|err| {
            tracing::error!("hotline_gfx::cmd: failed to create {:?} command list: {}", queue_type, err);
            err
        })?;
        Ok(CommandBuffer {
            queue_type,
            state: CommandBufferState::Idle,
            cmd_list,
            tracker: ResourceStateTracker::new(),
            upload: TransientAllocator::new(pools.pages.clone()),
            heaps: [
                DynamicDescriptorHeap::new(pools.device.clone(), pools.shader_heaps.clone()),
                DynamicDescriptorHeap::new(pools.device.clone(), pools.sampler_heaps.clone())
            ],
            keep_alive: Vec::new(),
            keep_alive_objects: Vec::new(),
            signatures: [None, None],
            fence_value: 0
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CommandBufferState::Recording
    }

    /// Fence value of the last submission, 0 if never submitted
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub fn native(&self) -> &D::CmdList {
        &self.cmd_list
    }

    pub fn native_mut(&mut self) -> &mut D::CmdList {
        &mut self.cmd_list
    }

    pub fn tracker(&self) -> &ResourceStateTracker<D> {
        &self.tracker
    }

    pub fn upload(&self) -> &TransientAllocator<D> {
        &self.upload
    }

    pub fn upload_mut(&mut self) -> &mut TransientAllocator<D> {
        &mut self.upload
    }

    /// The dynamic heap for a shader visible heap type
    pub fn dynamic_heap(&self, heap_type: DescriptorHeapType) -> Option<&DynamicDescriptorHeap<D>> {
        match heap_type {
            DescriptorHeapType::ShaderResource => Some(&self.heaps[SHADER_HEAP]),
            DescriptorHeapType::Sampler => Some(&self.heaps[SAMPLER_HEAP]),
            _ => None
        }
    }

    pub fn bound_signature(&self, kind: PipelineKind) -> Option<&Arc<BindingSignature<D>>> {
        self.signatures[kind.index()].as_ref()
    }

    /// Number of resources held alive until the next `begin`
    pub fn num_kept_alive(&self) -> usize {
        self.keep_alive.len() + self.keep_alive_objects.len()
    }

    /// Starts a new recording cycle, reclaiming everything from the previous one
    pub fn begin(&mut self) -> Result<(), Error> {
        match self.state {
            CommandBufferState::Idle | CommandBufferState::Retired | CommandBufferState::Closed => (),
            state => {
                tracing::error!("hotline_gfx::cmd: begin called on a {:?} command buffer", state);
                return Err(Error::InvalidState(format!("cannot begin a {:?} command buffer", state)));
            }
        }

        if let Err(err) = self.cmd_list.reset() {
            tracing::error!("hotline_gfx::cmd: failed to reset {:?} command list: {}", self.queue_type, err);
            self.state = CommandBufferState::Broken;
            return Err(err);
        }

        self.keep_alive.clear();
        self.keep_alive_objects.clear();
        self.upload.free();
        for heap in &mut self.heaps {
            heap.free();
        }
        self.signatures = [None, None];
        self.tracker.reset();
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Flushes remaining barriers and closes the native list
    pub fn end(&mut self) -> Result<(), Error> {
        if self.state != CommandBufferState::Recording {
            tracing::error!("hotline_gfx::cmd: end called on a {:?} command buffer", self.state);
            return Err(Error::InvalidState(format!("cannot end a {:?} command buffer", self.state)));
        }

        self.tracker.flush(&mut self.cmd_list);
        if let Err(err) = self.cmd_list.close() {
            tracing::error!("hotline_gfx::cmd: failed to close {:?} command list: {}", self.queue_type, err);
            self.state = CommandBufferState::Broken;
            return Err(err);
        }
        self.state = CommandBufferState::Closed;
        Ok(())
    }

    pub(crate) fn mark_submitted(&mut self, fence_value: u64) {
        self.fence_value = fence_value;
        self.state = CommandBufferState::Submitted;
    }

    pub(crate) fn mark_retired(&mut self) {
        if self.state == CommandBufferState::Submitted {
            self.state = CommandBufferState::Retired;
        }
    }

    fn check_recording(&self, op: &str) -> bool {
        if self.state != CommandBufferState::Recording {
            tracing::error!("hotline_gfx::cmd: {} called on a {:?} command buffer", op, self.state);
            return false;
        }
        true
    }

    fn check_queue(&self, kind: PipelineKind, op: &str) -> bool {
        if !self.queue_type.supports(kind) {
            tracing::error!("hotline_gfx::cmd: {} is not supported on a {:?} queue", op, self.queue_type);
            return false;
        }
        true
    }

    fn keep(&mut self, resource: &Resource<D>) {
        self.keep_alive.push(resource.clone());
    }

    fn keep_object(&mut self, object: Arc<dyn Any + Send + Sync>) {
        self.keep_alive_objects.push(object);
    }

    //
    // barriers
    //

    /// Requests `resource` to be in `state` for the following commands, `None` is a no-op
    pub fn transition_barrier(&mut self, resource: Option<&Resource<D>>, state: ResourceState, flush_now: bool) {
        if !self.check_recording("transition_barrier") {
            return;
        }
        if let Some(resource) = resource {
            self.tracker.transition(Some(resource), state);
            self.keep(resource);
        }
        if flush_now {
            self.flush_barriers();
        }
    }

    /// Waits for unordered access writes to `resource`, or to all resources if `None`
    pub fn uav_barrier(&mut self, resource: Option<&Resource<D>>, flush_now: bool) {
        if !self.check_recording("uav_barrier") {
            return;
        }
        if let Some(resource) = resource {
            self.keep(resource);
        }
        self.tracker.add_barrier(Barrier::Uav {
            resource: resource.cloned()
        });
        if flush_now {
            self.flush_barriers();
        }
    }

    /// Switches the active placed resource between two resources sharing memory
    pub fn aliasing_barrier(&mut self, before: Option<&Resource<D>>, after: Option<&Resource<D>>, flush_now: bool) {
        if !self.check_recording("aliasing_barrier") {
            return;
        }
        for resource in [before, after].into_iter().flatten() {
            self.keep(resource);
        }
        self.tracker.add_barrier(Barrier::Aliasing {
            before: before.cloned(),
            after: after.cloned()
        });
        if flush_now {
            self.flush_barriers();
        }
    }

    /// Applies all pending barriers in one native call, returns the number applied
    pub fn flush_barriers(&mut self) -> usize {
        if !self.check_recording("flush_barriers") {
            return 0;
        }
        self.tracker.flush(&mut self.cmd_list)
    }

    //
    // fixed function state
    //

    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.set_viewports(std::slice::from_ref(viewport));
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        if self.check_recording("set_viewports") && self.check_queue(PipelineKind::Graphics, "set_viewports") {
            self.cmd_list.set_viewports(viewports);
        }
    }

    pub fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.set_scissor_rects(std::slice::from_ref(rect));
    }

    pub fn set_scissor_rects(&mut self, rects: &[ScissorRect]) {
        if self.check_recording("set_scissor_rects") && self.check_queue(PipelineKind::Graphics, "set_scissor_rects") {
            self.cmd_list.set_scissor_rects(rects);
        }
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        if self.check_recording("set_primitive_topology")
            && self.check_queue(PipelineKind::Graphics, "set_primitive_topology") {
            self.cmd_list.set_primitive_topology(topology);
        }
    }

    /// Binds render targets and an optional depth stencil target, transitioning them to writable states
    pub fn set_render_targets(&mut self, targets: &[&Resource<D>], depth_stencil: Option<&Resource<D>>) {
        if !self.check_recording("set_render_targets")
            || !self.check_queue(PipelineKind::Graphics, "set_render_targets") {
            return;
        }

        let mut rtvs = Vec::with_capacity(targets.len());
        for target in targets {
            match target.rtv() {
                Some(rtv) => rtvs.push(rtv),
                None => {
                    tracing::error!("hotline_gfx::cmd: resource {} has no render target view", target.id());
                    return;
                }
            }
        }
        let dsv = match depth_stencil {
            Some(depth) => match depth.dsv() {
                Some(dsv) => Some(dsv),
                None => {
                    tracing::error!("hotline_gfx::cmd: resource {} has no depth stencil view", depth.id());
                    return;
                }
            },
            None => None
        };

        for target in targets.iter().copied() {
            self.tracker.transition(Some(target), ResourceState::RENDER_TARGET);
            self.keep(target);
        }
        if let Some(depth) = depth_stencil {
            self.tracker.transition(Some(depth), ResourceState::DEPTH_WRITE);
            self.keep(depth);
        }
        self.cmd_list.set_render_targets(&rtvs, dsv);
    }

    pub fn clear_render_target(&mut self, target: &Resource<D>, colour: &ClearColour) {
        if !self.check_recording("clear_render_target")
            || !self.check_queue(PipelineKind::Graphics, "clear_render_target") {
            return;
        }
        let rtv = match target.rtv() {
            Some(rtv) => rtv,
            None => {
                tracing::error!("hotline_gfx::cmd: cannot clear resource {} without a render target view", target.id());
                return;
            }
        };
        self.tracker.transition(Some(target), ResourceState::RENDER_TARGET);
        self.keep(target);
        self.tracker.flush(&mut self.cmd_list);
        self.cmd_list.clear_render_target(rtv, colour);
    }

    pub fn clear_depth_stencil(&mut self, target: &Resource<D>, flags: ClearFlags, depth: f32, stencil: u8) {
        if !self.check_recording("clear_depth_stencil")
            || !self.check_queue(PipelineKind::Graphics, "clear_depth_stencil") {
            return;
        }
        let dsv = match target.dsv() {
            Some(dsv) => dsv,
            None => {
                tracing::error!("hotline_gfx::cmd: cannot clear resource {} without a depth stencil view", target.id());
                return;
            }
        };
        self.tracker.transition(Some(target), ResourceState::DEPTH_WRITE);
        self.keep(target);
        self.tracker.flush(&mut self.cmd_list);
        self.cmd_list.clear_depth_stencil(dsv, flags, depth, stencil);
    }

    //
    // pipelines and signatures
    //

    /// Resolves and binds a pipeline state and its binding signature.
    /// Unusable pipeline states are logged and not bound.
    pub fn set_pipeline_state(&mut self, pipeline: &mut PipelineState<D>) {
        let kind = pipeline.kind();
        if !self.check_recording("set_pipeline_state") || !self.check_queue(kind, "set_pipeline_state") {
            return;
        }
        let resolved = match pipeline.resolve() {
            Some(resolved) => resolved,
            None => {
                tracing::error!("hotline_gfx::cmd: {:?} pipeline state is unusable and was not bound", kind);
                return;
            }
        };
        self.bind_signature(kind, &resolved.signature);
        self.cmd_list.set_pipeline(&resolved.pipeline);
        self.keep_object(resolved.pipeline);
    }

    /// Binds a signature for `kind`, staged descriptors and root bindings for `kind` are reset
    /// unless the same signature is already bound
    pub fn set_binding_signature(&mut self, kind: PipelineKind, signature: &Arc<BindingSignature<D>>) {
        if !self.check_recording("set_binding_signature") || !self.check_queue(kind, "set_binding_signature") {
            return;
        }
        self.bind_signature(kind, signature);
    }

    fn bind_signature(&mut self, kind: PipelineKind, signature: &Arc<BindingSignature<D>>) {
        if let Some(bound) = &self.signatures[kind.index()] {
            if Arc::ptr_eq(bound, signature) {
                return;
            }
        }
        self.cmd_list.set_signature(kind, signature.native());
        for heap in &mut self.heaps {
            heap.set_binding_signature(kind, signature.desc());
        }
        self.signatures[kind.index()] = Some(signature.clone());
        self.keep_object(signature.clone());
    }

    fn slot_type(&self, kind: PipelineKind, slot: u32, op: &str) -> Option<SlotType> {
        let signature = match &self.signatures[kind.index()] {
            Some(signature) => signature,
            None => {
                tracing::error!("hotline_gfx::cmd: {} called before a {:?} signature was bound", op, kind);
                return None;
            }
        };
        match signature.slot(slot) {
            Some(slot) => Some(slot.slot_type.clone()),
            None => {
                tracing::error!(
                    "hotline_gfx::cmd: {} slot {} is out of range for the bound {:?} signature", op, slot, kind
                );
                None
            }
        }
    }

    /// Writes 32 bit values into a constants slot
    pub fn set_constants(&mut self, kind: PipelineKind, slot: u32, values: &[u32], dest_offset: u32) {
        if !self.check_recording("set_constants") {
            return;
        }
        match self.slot_type(kind, slot, "set_constants") {
            Some(SlotType::Constants { num_values, .. }) => {
                if dest_offset as usize + values.len() > num_values as usize {
                    tracing::error!(
                        "hotline_gfx::cmd: {} constants at offset {} overflow slot {} with {} values",
                        values.len(), dest_offset, slot, num_values
                    );
                    return;
                }
                self.cmd_list.set_constants(kind, slot, values, dest_offset);
            }
            Some(other) => {
                tracing::error!("hotline_gfx::cmd: slot {} is {:?}, not constants", slot, other);
            }
            None => ()
        }
    }

    fn check_root_view(&self, kind: PipelineKind, slot: u32, view: RootViewType, op: &str) -> bool {
        let matches = match (self.slot_type(kind, slot, op), view) {
            (None, _) => return false,
            (Some(SlotType::ConstantBuffer { .. }), RootViewType::ConstantBuffer) => true,
            (Some(SlotType::ShaderResource { .. }), RootViewType::ShaderResource) => true,
            (Some(SlotType::UnorderedAccess { .. }), RootViewType::UnorderedAccess) => true,
            _ => false
        };
        if !matches {
            tracing::error!("hotline_gfx::cmd: {} slot {} is not a root {:?} slot", op, slot, view);
        }
        matches
    }

    /// Copies `data` into transient memory and binds it to a root constant buffer slot
    pub fn set_dynamic_constant_buffer<T: Copy>(&mut self, kind: PipelineKind, slot: u32, data: &[T]) {
        if !self.check_recording("set_dynamic_constant_buffer")
            || !self.check_root_view(kind, slot, RootViewType::ConstantBuffer, "set_dynamic_constant_buffer") {
            return;
        }
        let size = std::mem::size_of_val(data);
        let alloc = match self.upload.allocate(size, CONSTANT_BUFFER_ALIGNMENT) {
            Ok(alloc) => alloc,
            Err(err) => {
                tracing::error!("hotline_gfx::cmd: failed to allocate {} bytes of constant data: {}", size, err);
                return;
            }
        };
        alloc.write_slice(data);
        self.cmd_list.set_root_view(kind, slot, RootViewType::ConstantBuffer, alloc.gpu_address());
    }

    /// Binds a buffer to a root constant buffer slot
    pub fn set_constant_buffer_view(&mut self, kind: PipelineKind, slot: u32, buffer: &Resource<D>) {
        self.set_root_buffer(kind, slot, buffer, RootViewType::ConstantBuffer, "set_constant_buffer_view");
    }

    /// Binds a buffer to a root shader resource slot
    pub fn set_shader_resource_buffer(&mut self, kind: PipelineKind, slot: u32, buffer: &Resource<D>) {
        self.set_root_buffer(kind, slot, buffer, RootViewType::ShaderResource, "set_shader_resource_buffer");
    }

    /// Binds a buffer to a root unordered access slot
    pub fn set_unordered_access_buffer(&mut self, kind: PipelineKind, slot: u32, buffer: &Resource<D>) {
        self.set_root_buffer(kind, slot, buffer, RootViewType::UnorderedAccess, "set_unordered_access_buffer");
    }

    fn set_root_buffer(&mut self, kind: PipelineKind, slot: u32, buffer: &Resource<D>, view: RootViewType, op: &str) {
        if !self.check_recording(op) || !self.check_root_view(kind, slot, view, op) {
            return;
        }
        if !buffer.is_buffer() {
            tracing::error!("hotline_gfx::cmd: {} requires a buffer, resource {} is a texture", op, buffer.id());
            return;
        }
        let state = match view {
            RootViewType::ConstantBuffer => ResourceState::VERTEX_AND_CONSTANT_BUFFER,
            RootViewType::ShaderResource => shader_resource_state(kind),
            RootViewType::UnorderedAccess => ResourceState::UNORDERED_ACCESS
        };
        self.tracker.transition(Some(buffer), state);
        self.keep(buffer);
        self.cmd_list.set_root_view(kind, slot, view, buffer.gpu_address());
    }

    //
    // input assembler
    //

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Resource<D>) {
        if !self.check_recording("set_vertex_buffer") || !self.check_queue(PipelineKind::Graphics, "set_vertex_buffer") {
            return;
        }
        let view = match buffer.vertex_buffer_view() {
            Some(view) => view,
            None => {
                tracing::error!("hotline_gfx::cmd: resource {} cannot be bound as a vertex buffer", buffer.id());
                return;
            }
        };
        self.tracker.transition(Some(buffer), ResourceState::VERTEX_AND_CONSTANT_BUFFER);
        self.keep(buffer);
        self.cmd_list.set_vertex_buffers(slot, &[view]);
    }

    /// Copies `vertices` into transient memory and binds them to a vertex buffer slot
    pub fn set_dynamic_vertex_buffer<T: Copy>(&mut self, slot: u32, vertices: &[T]) {
        if !self.check_recording("set_dynamic_vertex_buffer")
            || !self.check_queue(PipelineKind::Graphics, "set_dynamic_vertex_buffer") {
            return;
        }
        let stride = std::mem::size_of::<T>();
        if stride == 0 {
            tracing::error!("hotline_gfx::cmd: dynamic vertex data must have a non zero stride");
            return;
        }
        let size = std::mem::size_of_val(vertices);
        let alloc = match self.upload.allocate(size, DYNAMIC_BUFFER_ALIGNMENT) {
            Ok(alloc) => alloc,
            Err(err) => {
                tracing::error!("hotline_gfx::cmd: failed to allocate {} bytes of vertex data: {}", size, err);
                return;
            }
        };
        alloc.write_slice(vertices);
        self.cmd_list.set_vertex_buffers(slot, &[VertexBufferView {
            location: alloc.gpu_address(),
            size_bytes: size as u32,
            stride_bytes: stride as u32
        }]);
    }

    pub fn set_index_buffer(&mut self, buffer: &Resource<D>) {
        if !self.check_recording("set_index_buffer") || !self.check_queue(PipelineKind::Graphics, "set_index_buffer") {
            return;
        }
        let view = match buffer.index_buffer_view() {
            Some(view) => view,
            None => {
                tracing::error!("hotline_gfx::cmd: resource {} cannot be bound as an index buffer", buffer.id());
                return;
            }
        };
        self.tracker.transition(Some(buffer), ResourceState::INDEX_BUFFER);
        self.keep(buffer);
        self.cmd_list.set_index_buffer(&view);
    }

    /// Copies `indices` into transient memory and binds them as the index buffer,
    /// `format` must be an index format matching the size of `T`
    pub fn set_dynamic_index_buffer<T: Copy>(&mut self, indices: &[T], format: Format) {
        if !self.check_recording("set_dynamic_index_buffer")
            || !self.check_queue(PipelineKind::Graphics, "set_dynamic_index_buffer") {
            return;
        }
        if !format.is_index() || format.size_bytes() != std::mem::size_of::<T>() {
            tracing::error!(
                "hotline_gfx::cmd: {:?} is not an index format for {} byte indices", format, std::mem::size_of::<T>()
            );
            return;
        }
        let size = std::mem::size_of_val(indices);
        let alloc = match self.upload.allocate(size, DYNAMIC_BUFFER_ALIGNMENT) {
            Ok(alloc) => alloc,
            Err(err) => {
                tracing::error!("hotline_gfx::cmd: failed to allocate {} bytes of index data: {}", size, err);
                return;
            }
        };
        alloc.write_slice(indices);
        self.cmd_list.set_index_buffer(&IndexBufferView {
            location: alloc.gpu_address(),
            size_bytes: size as u32,
            format
        });
    }

    //
    // descriptor tables
    //

    /// Stages the shader resource view of `resource` into a table slot at `offset`
    pub fn set_shader_resource_view(&mut self, kind: PipelineKind, slot: u32, offset: u32, resource: &Resource<D>) {
        self.stage_view(kind, slot, offset, resource, ViewKind::ShaderResource, shader_resource_state(kind));
    }

    /// Stages the unordered access view of `resource` into a table slot at `offset`
    pub fn set_unordered_access_view(&mut self, kind: PipelineKind, slot: u32, offset: u32, resource: &Resource<D>) {
        self.stage_view(kind, slot, offset, resource, ViewKind::UnorderedAccess, ResourceState::UNORDERED_ACCESS);
    }

    /// Stages the constant buffer view of `buffer` into a table slot at `offset`
    pub fn set_constant_buffer_table(&mut self, kind: PipelineKind, slot: u32, offset: u32, buffer: &Resource<D>) {
        self.stage_view(kind, slot, offset, buffer, ViewKind::ConstantBuffer, ResourceState::VERTEX_AND_CONSTANT_BUFFER);
    }

    fn stage_view(
        &mut self,
        kind: PipelineKind,
        slot: u32,
        offset: u32,
        resource: &Resource<D>,
        view: ViewKind,
        state: ResourceState
    ) {
        if !self.check_recording("stage_view") || !self.check_queue(kind, "stage_view") {
            return;
        }
        let handle = match resource.view(view) {
            Some(handle) => handle,
            None => {
                tracing::error!("hotline_gfx::cmd: resource {} has no {:?} view", resource.id(), view);
                return;
            }
        };
        let expected = match view {
            ViewKind::ShaderResource => DescriptorRangeType::ShaderResource,
            ViewKind::UnorderedAccess => DescriptorRangeType::UnorderedAccess,
            ViewKind::ConstantBuffer => DescriptorRangeType::ConstantBuffer,
            _ => {
                tracing::error!("hotline_gfx::cmd: {:?} views cannot be placed in descriptor tables", view);
                return;
            }
        };
        match self.heaps[SHADER_HEAP].table(kind).range_type_at(slot, offset) {
            Some(range_type) if range_type == expected => (),
            Some(range_type) => {
                tracing::error!(
                    "hotline_gfx::cmd: {:?} slot {} offset {} expects {:?}, got a {:?} view",
                    kind, slot, offset, range_type, view
                );
                return;
            }
            None => {
                tracing::error!(
                    "hotline_gfx::cmd: {:?} slot {} offset {} is not in a descriptor table of the bound signature",
                    kind, slot, offset
                );
                return;
            }
        }

        if self.heaps[SHADER_HEAP].stage(kind, slot, offset, &[handle]) {
            self.tracker.transition(Some(resource), state);
            self.keep(resource);
        }
    }

    /// Stages a sampler into a sampler table slot at `offset`
    pub fn set_sampler(&mut self, kind: PipelineKind, slot: u32, offset: u32, sampler: &Sampler) {
        if !self.check_recording("set_sampler") || !self.check_queue(kind, "set_sampler") {
            return;
        }
        if self.heaps[SAMPLER_HEAP].table(kind).range_type_at(slot, offset) != Some(DescriptorRangeType::Sampler) {
            tracing::error!(
                "hotline_gfx::cmd: {:?} slot {} offset {} is not in a sampler table of the bound signature",
                kind, slot, offset
            );
            return;
        }
        if self.heaps[SAMPLER_HEAP].stage(kind, slot, offset, &[sampler.handle()]) {
            self.keep_object(sampler.allocation().clone());
        }
    }

    /// Stages raw cpu descriptors into a table slot. The caller keeps the descriptors and
    /// the resources they refer to alive until the submission completes.
    pub fn set_descriptors(
        &mut self,
        kind: PipelineKind,
        heap_type: DescriptorHeapType,
        slot: u32,
        offset: u32,
        descriptors: &[CpuDescriptor]
    ) {
        if !self.check_recording("set_descriptors") || !self.check_queue(kind, "set_descriptors") {
            return;
        }
        let index = match heap_type {
            DescriptorHeapType::ShaderResource => SHADER_HEAP,
            DescriptorHeapType::Sampler => SAMPLER_HEAP,
            _ => {
                tracing::error!("hotline_gfx::cmd: {:?} descriptors cannot be placed in descriptor tables", heap_type);
                return;
            }
        };
        self.heaps[index].stage(kind, slot, offset, descriptors);
    }

    //
    // copies
    //

    /// Copies `data` into `buffer` at `offset` through transient memory
    pub fn update_buffer<T: Copy>(&mut self, buffer: &Resource<D>, offset: usize, data: &[T]) {
        if !self.check_recording("update_buffer") {
            return;
        }
        let size = std::mem::size_of_val(data);
        if !buffer.is_buffer() || !in_bounds(offset, size, buffer.size_bytes()) {
            tracing::error!(
                "hotline_gfx::cmd: cannot write {} bytes at offset {} into resource {} of {} bytes",
                size, offset, buffer.id(), buffer.size_bytes()
            );
            return;
        }
        if size == 0 {
            return;
        }
        let alloc = match self.upload.allocate(size, DYNAMIC_BUFFER_ALIGNMENT) {
            Ok(alloc) => alloc,
            Err(err) => {
                tracing::error!("hotline_gfx::cmd: failed to allocate {} bytes of buffer data: {}", size, err);
                return;
            }
        };
        alloc.write_slice(data);
        self.tracker.transition(Some(buffer), ResourceState::COPY_DEST);
        self.keep(buffer);
        self.tracker.flush(&mut self.cmd_list);
        self.cmd_list.copy_buffer_region(
            buffer.native(), offset as u64, alloc.page().native(), alloc.offset() as u64, size as u64
        );
    }

    pub fn copy_resource(&mut self, dst: &Resource<D>, src: &Resource<D>) {
        if !self.check_recording("copy_resource") {
            return;
        }
        if dst.is_buffer() != src.is_buffer() || dst.size_bytes() != src.size_bytes() {
            tracing::error!(
                "hotline_gfx::cmd: cannot copy resource {} into resource {} of a different kind or size", src.id(), dst.id()
            );
            return;
        }
        self.tracker.transition(Some(dst), ResourceState::COPY_DEST);
        self.tracker.transition(Some(src), ResourceState::COPY_SOURCE);
        self.keep(dst);
        self.keep(src);
        self.tracker.flush(&mut self.cmd_list);
        self.cmd_list.copy_resource(dst.native(), src.native());
    }

    pub fn copy_buffer_region(&mut self, dst: &Resource<D>, dst_offset: usize, src: &Resource<D>, src_offset: usize, size: usize) {
        if !self.check_recording("copy_buffer_region") {
            return;
        }
        if !dst.is_buffer() || !src.is_buffer() {
            tracing::error!("hotline_gfx::cmd: copy_buffer_region requires buffers");
            return;
        }
        if !in_bounds(dst_offset, size, dst.size_bytes()) || !in_bounds(src_offset, size, src.size_bytes()) {
            tracing::error!(
                "hotline_gfx::cmd: copy of {} bytes from {}+{} to {}+{} is out of bounds",
                size, src.id(), src_offset, dst.id(), dst_offset
            );
            return;
        }
        self.tracker.transition(Some(dst), ResourceState::COPY_DEST);
        self.tracker.transition(Some(src), ResourceState::COPY_SOURCE);
        self.keep(dst);
        self.keep(src);
        self.tracker.flush(&mut self.cmd_list);
        self.cmd_list.copy_buffer_region(dst.native(), dst_offset as u64, src.native(), src_offset as u64, size as u64);
    }

    /// Resolves a multisampled subresource of `src` into `dst`
    pub fn resolve_subresource(
        &mut self,
        dst: &Resource<D>,
        dst_subresource: u32,
        src: &Resource<D>,
        src_subresource: u32,
        format: Format
    ) {
        if !self.check_recording("resolve_subresource")
            || !self.check_queue(PipelineKind::Graphics, "resolve_subresource") {
            return;
        }
        if !dst.is_texture() || !src.is_texture() {
            tracing::error!("hotline_gfx::cmd: resolve_subresource requires textures");
            return;
        }
        self.tracker.transition(Some(dst), ResourceState::RESOLVE_DEST);
        self.tracker.transition(Some(src), ResourceState::RESOLVE_SOURCE);
        self.keep(dst);
        self.keep(src);
        self.tracker.flush(&mut self.cmd_list);
        self.cmd_list.resolve_subresource(dst.native(), dst_subresource, src.native(), src_subresource, format);
    }

    //
    // draws and dispatches
    //

    /// Checks that gpu work of `kind` can be recorded: recording, supported by the queue and with a bound signature
    fn can_execute(&self, kind: PipelineKind, op: &str) -> bool {
        if !self.check_recording(op) || !self.check_queue(kind, op) {
            return false;
        }
        if self.signatures[kind.index()].is_none() {
            tracing::error!("hotline_gfx::cmd: {} called without a bound {:?} signature", op, kind);
            return false;
        }
        true
    }

    /// Flushes barriers then copies and binds staged descriptor tables for `kind`.
    /// Returns false if the gpu work must be skipped.
    fn prepare(&mut self, kind: PipelineKind, op: &str) -> bool {
        if !self.can_execute(kind, op) {
            return false;
        }
        self.tracker.flush(&mut self.cmd_list);
        for heap in &mut self.heaps {
            if let Err(err) = heap.copy_and_bind_staged(kind, &mut self.cmd_list) {
                tracing::error!("hotline_gfx::cmd: {} skipped, failed to bind {:?} descriptors: {}", op, heap.heap_type(), err);
                return false;
            }
        }
        true
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32) {
        if self.prepare(PipelineKind::Graphics, "draw") {
            self.cmd_list.draw_instanced(vertex_count, instance_count, start_vertex, start_instance);
        }
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32
    ) {
        if self.prepare(PipelineKind::Graphics, "draw_indexed") {
            self.cmd_list.draw_indexed_instanced(index_count, instance_count, start_index, base_vertex, start_instance);
        }
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if self.prepare(PipelineKind::Compute, "dispatch") {
            self.cmd_list.dispatch(x, y, z);
        }
    }

    /// Executes up to `max_count` commands read from `args` at `args_offset`. If `count` is
    /// supplied the gpu reads the actual command count from that buffer and offset.
    pub fn execute_indirect(
        &mut self,
        kind: PipelineKind,
        command_signature: &CommandSignature<D>,
        max_count: u32,
        args: &Resource<D>,
        args_offset: usize,
        count: Option<(&Resource<D>, usize)>
    ) {
        if !self.can_execute(kind, "execute_indirect") {
            return;
        }
        if !args.is_buffer() || count.map(|(c, _)| !c.is_buffer()).unwrap_or(false) {
            tracing::error!("hotline_gfx::cmd: execute_indirect arguments must be buffers");
            return;
        }
        let required = command_signature.stride()
            .checked_mul(max_count as usize)
            .and_then(|bytes| bytes.checked_add(args_offset));
        if !required.map(|required| required <= args.size_bytes()).unwrap_or(false) {
            tracing::error!(
                "hotline_gfx::cmd: {} indirect commands at offset {} do not fit argument buffer {} of {} bytes",
                max_count, args_offset, args.id(), args.size_bytes()
            );
            return;
        }
        if let (Some(expected), Some(bound)) = (command_signature.signature(), &self.signatures[kind.index()]) {
            if !Arc::ptr_eq(expected, bound) {
                tracing::error!("hotline_gfx::cmd: command signature was created for a different binding signature");
                return;
            }
        }

        self.tracker.transition(Some(args), ResourceState::INDIRECT_ARGUMENT);
        self.keep(args);
        if let Some((count_buffer, _)) = count {
            self.tracker.transition(Some(count_buffer), ResourceState::INDIRECT_ARGUMENT);
            self.keep(count_buffer);
        }
        self.keep_object(command_signature.native.clone());

        if self.prepare(kind, "execute_indirect") {
            self.cmd_list.execute_indirect(
                command_signature.native(),
                max_count,
                args.native(),
                args_offset as u64,
                count.map(|(c, offset)| (c.native(), offset as u64))
            );
        }
    }
}

/// True if `size` bytes at `offset` fit within `capacity`
fn in_bounds(offset: usize, size: usize, capacity: usize) -> bool {
    offset.checked_add(size).map(|end| end <= capacity).unwrap_or(false)
}

/// Shader resource state for reads from pipelines of `kind`
fn shader_resource_state(kind: PipelineKind) -> ResourceState {
    match kind {
        PipelineKind::Compute => ResourceState::NON_PIXEL_SHADER_RESOURCE,
        PipelineKind::Graphics => ResourceState::SHADER_RESOURCE
    }
}
