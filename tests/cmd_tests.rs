use hotline_gfx::prelude::*;

use hotline_gfx::gfx::null;
use hotline_gfx::gfx::BufferInfo;
use hotline_gfx::gfx::BufferUsage;
use hotline_gfx::gfx::ClearColour;
use hotline_gfx::gfx::CommandSignatureInfo;
use hotline_gfx::gfx::CpuDescriptor;
use hotline_gfx::gfx::DescriptorHeap;
use hotline_gfx::gfx::DescriptorHeapType;
use hotline_gfx::gfx::Format;
use hotline_gfx::gfx::GpuDescriptor;
use hotline_gfx::gfx::IndirectArgument;
use hotline_gfx::gfx::RootViewType;
use hotline_gfx::gfx::SamplerInfo;
use hotline_gfx::gfx::TextureInfo;
use hotline_gfx::gfx::TextureType;
use hotline_gfx::gfx::TextureUsage;
use hotline_gfx::gfx::Viewport;
use hotline_gfx::gfx::cmd::CommandBufferState;
use hotline_gfx::gfx::null::BarrierRecord;
use hotline_gfx::gfx::null::NullCommand;
use hotline_gfx::gfx::pipeline::PipelineDesc;
use hotline_gfx::gfx::signature::BindingSignature;
use hotline_gfx::gfx::signature::DescriptorRange;
use hotline_gfx::gfx::signature::DescriptorRangeType;
use hotline_gfx::gfx::signature::ShaderVisibility;
use hotline_gfx::gfx::signature::SignatureDesc;
use hotline_gfx::gfx::signature::SignatureSlot;
use hotline_gfx::gfx::signature::SlotType;

use pretty_assertions::assert_eq;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const INCREMENT: usize = null::DESCRIPTOR_INCREMENT;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn create_context(info: ContextInfo) -> Context<null::Device> {
    init_logging();
    Context::create(null::Device::new(), info).unwrap()
}

fn buffer_info(usage: BufferUsage, format: Format, stride: usize, num_elements: usize) -> BufferInfo {
    BufferInfo {
        usage,
        format,
        stride,
        num_elements,
        initial_state: ResourceState::COMMON
    }
}

fn srv_buffer(ctx: &Context<null::Device>) -> Resource<null::Device> {
    ctx.create_buffer(&buffer_info(BufferUsage::SHADER_RESOURCE, Format::Unknown, 16, 4), None).unwrap()
}

fn texture(ctx: &Context<null::Device>, usage: TextureUsage, format: Format) -> Resource<null::Device> {
    ctx.create_texture(&TextureInfo {
        tex_type: TextureType::Texture2D,
        format,
        width: 64,
        height: 64,
        depth: 1,
        array_layers: 1,
        mip_levels: 1,
        samples: 1,
        usage,
        initial_state: ResourceState::COMMON
    }).unwrap()
}

fn slot(slot_type: SlotType) -> SignatureSlot {
    SignatureSlot {
        slot_type,
        visibility: ShaderVisibility::All
    }
}

fn table(range_type: DescriptorRangeType, count: u32, register: u32) -> SignatureSlot {
    slot(SlotType::Table(vec![DescriptorRange::new(range_type, count, register, 0)]))
}

/// Two shader resource tables of 4 and 2 descriptors
fn two_tables(ctx: &Context<null::Device>) -> Arc<BindingSignature<null::Device>> {
    ctx.get_or_create_signature(&SignatureDesc {
        slots: vec![
            table(DescriptorRangeType::ShaderResource, 4, 0),
            table(DescriptorRangeType::ShaderResource, 2, 4)
        ],
        ..Default::default()
    }).unwrap()
}

fn srv_handles(buffers: &[Resource<null::Device>]) -> Vec<CpuDescriptor> {
    buffers.iter().map(|b| b.srv().unwrap()).collect()
}

#[test]
fn command_buffer_lifecycle() {
    let ctx = create_context(ContextInfo::default());
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Recording);
    assert!(cmd.native().is_open());

    cmd.end().unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Closed);
    assert!(!cmd.native().is_open());
    assert!(cmd.end().is_err());

    let fence = queue.submit(cmd).unwrap();
    assert_eq!(fence.value(), 1);
    assert!(fence.is_complete());
    assert_eq!(queue.num_in_flight(), 1);

    let cmd = queue.command_buffer().unwrap();
    assert_eq!(queue.num_created(), 1);
    assert_eq!(queue.num_in_flight(), 0);
    assert_eq!(cmd.state(), CommandBufferState::Recording);
    assert_eq!(cmd.native().num_resets(), 2);
}

#[test]
fn begin_requires_idle_or_retired() {
    let ctx = create_context(ContextInfo::default());
    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Idle);
    cmd.begin().unwrap();
    assert!(matches!(cmd.begin(), Err(Error::InvalidState(_))));
    assert_eq!(cmd.state(), CommandBufferState::Recording);
}

#[test]
fn unfinished_command_buffer_cannot_be_submitted() {
    let ctx = create_context(ContextInfo::default());
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();
    let cmd = queue.command_buffer().unwrap();
    assert!(matches!(queue.submit(cmd), Err(Error::InvalidState(_))));
    assert_eq!(queue.native().num_executed(), 0);

    let mut compute = ctx.create_command_buffer(QueueType::Compute).unwrap();
    compute.begin().unwrap();
    compute.end().unwrap();
    assert!(matches!(queue.submit(compute), Err(Error::InvalidState(_))));
}

#[test]
fn in_flight_buffers_are_not_recycled() {
    let ctx = create_context(ContextInfo::default());
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();
    queue.native().set_auto_complete(false);

    let mut cmd = queue.command_buffer().unwrap();
    cmd.end().unwrap();
    let fence = queue.submit(cmd).unwrap();
    assert!(!fence.is_complete());
    assert!(!fence.wait(Some(Duration::from_millis(1))));

    let mut second = queue.command_buffer().unwrap();
    assert_eq!(queue.num_created(), 2);
    second.end().unwrap();
    let second_fence = queue.submit(second).unwrap();

    queue.native().complete(fence.value());
    assert!(fence.wait(None));
    assert!(!second_fence.is_complete());
    assert_eq!(queue.retire_completed(), 1);
    assert_eq!(queue.num_in_flight(), 1);

    let _recycled = queue.command_buffer().unwrap();
    assert_eq!(queue.num_created(), 2);

    queue.native().complete_all();
    assert!(second_fence.is_complete());
}

#[test]
fn flush_retires_all_work() {
    let ctx = create_context(ContextInfo::default());
    let mut queue = ctx.create_command_queue(QueueType::Compute).unwrap();
    for _ in 0..3 {
        let mut cmd = queue.command_buffer().unwrap();
        cmd.end().unwrap();
        queue.submit(cmd).unwrap();
    }
    assert_eq!(queue.num_created(), 1);

    let mut a = queue.command_buffer().unwrap();
    let mut b = queue.command_buffer().unwrap();
    a.end().unwrap();
    b.end().unwrap();
    queue.submit(a).unwrap();
    queue.submit(b).unwrap();
    assert_eq!(queue.num_in_flight(), 2);

    queue.flush().unwrap();
    assert_eq!(queue.num_in_flight(), 0);
    assert_eq!(queue.num_available(), 2);
}

#[test]
fn failed_reset_breaks_command_buffer() {
    let ctx = create_context(ContextInfo::default());
    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    ctx.device().set_fail_cmd_list_reset(true);
    assert!(matches!(cmd.begin(), Err(Error::Device(_))));
    assert_eq!(cmd.state(), CommandBufferState::Broken);

    ctx.device().set_fail_cmd_list_reset(false);
    assert!(matches!(cmd.begin(), Err(Error::InvalidState(_))));

    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();
    ctx.device().set_fail_cmd_list_reset(true);
    assert!(queue.command_buffer().is_err());
}

#[test]
fn staged_descriptors_are_copied_contiguously() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let buffers: Vec<_> = (0..6).map(|_| srv_buffer(&ctx)).collect();

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    for (i, buffer) in buffers[..4].iter().enumerate() {
        cmd.set_shader_resource_view(PipelineKind::Graphics, 0, i as u32, buffer);
    }
    for (i, buffer) in buffers[4..].iter().enumerate() {
        cmd.set_shader_resource_view(PipelineKind::Graphics, 1, i as u32, buffer);
    }
    cmd.draw(3, 1, 0, 0);

    let heap = cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap().current_heap().unwrap().clone();
    let base = heap.native().gpu_start();
    assert_eq!(heap.native().contents()[..6], srv_handles(&buffers)[..]);
    assert_eq!(cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap().cursor(), 6);

    let transitions = buffers
        .iter()
        .map(|b| BarrierRecord::Transition {
            resource: b.native().id(),
            before: ResourceState::COMMON,
            after: ResourceState::SHADER_RESOURCE
        })
        .collect();
    assert_eq!(cmd.native().commands(), &[
        NullCommand::SetSignature { kind: PipelineKind::Graphics, signature: signature.native().id() },
        NullCommand::Barriers(transitions),
        NullCommand::SetDescriptorHeap { heap_type: DescriptorHeapType::ShaderResource, heap: heap.native().id() },
        NullCommand::SetDescriptorTable { kind: PipelineKind::Graphics, slot: 0, base },
        NullCommand::SetDescriptorTable { kind: PipelineKind::Graphics, slot: 1, base: base.offset(4, INCREMENT) },
        NullCommand::Draw { vertex_count: 3, instance_count: 1, start_vertex: 0, start_instance: 0 }
    ]);
}

#[test]
fn only_stale_tables_are_copied() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let buffers: Vec<_> = (0..4).map(|_| srv_buffer(&ctx)).collect();

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);

    // staging the same position twice overwrites
    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 0, &buffers[0]);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 0, &buffers[1]);
    cmd.draw(3, 1, 0, 0);
    assert_eq!(cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap().cursor(), 1);

    // nothing restaged, nothing copied
    cmd.draw(3, 1, 0, 0);
    assert_eq!(cmd.native().descriptor_tables().len(), 1);

    cmd.set_shader_resource_view(PipelineKind::Graphics, 1, 0, &buffers[2]);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 1, 1, &buffers[3]);
    cmd.draw(3, 1, 0, 0);

    let dynamic_heap = cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap();
    let heap = dynamic_heap.current_heap().unwrap();
    let base = heap.native().gpu_start();
    assert_eq!(dynamic_heap.cursor(), 3);
    assert_eq!(heap.native().contents()[..3], srv_handles(&buffers[1..])[..]);
    assert_eq!(cmd.native().descriptor_tables(), vec![
        (PipelineKind::Graphics, 0, base),
        (PipelineKind::Graphics, 1, base.offset(1, INCREMENT))
    ]);
}

#[test]
fn full_heap_rolls_over_and_rebinds() {
    let ctx = create_context(ContextInfo {
        shader_heap_size: 8,
        ..Default::default()
    });
    let signature = two_tables(&ctx);
    let buffers: Vec<_> = (0..7).map(|_| srv_buffer(&ctx)).collect();

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    for i in 0..4 {
        cmd.set_shader_resource_view(PipelineKind::Graphics, 0, i, &buffers[i as usize]);
    }
    cmd.set_shader_resource_view(PipelineKind::Graphics, 1, 0, &buffers[4]);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 1, 1, &buffers[5]);
    cmd.draw(3, 1, 0, 0);

    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 2, &buffers[6]);
    cmd.draw(3, 1, 0, 0);

    let dynamic_heap = cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap();
    assert_eq!(dynamic_heap.used_heaps().len(), 2);
    assert_eq!(dynamic_heap.cursor(), 6);
    assert_eq!(ctx.heap_pool(DescriptorHeapType::ShaderResource).unwrap().num_heaps(), 2);

    let heap_binds = cmd.native().commands().iter().filter(|c| matches!(c, NullCommand::SetDescriptorHeap { .. })).count();
    assert_eq!(heap_binds, 2);

    let expected = srv_handles(&[
        buffers[0].clone(), buffers[1].clone(), buffers[6].clone(), buffers[3].clone(), buffers[4].clone(), buffers[5].clone()
    ]);
    assert_eq!(dynamic_heap.current_heap().unwrap().native().contents()[..6], expected[..]);
}

#[test]
fn heaps_return_to_pool_on_begin() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let buffer = srv_buffer(&ctx);
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 0, &buffer);
    cmd.draw(3, 1, 0, 0);
    cmd.end().unwrap();
    queue.submit(cmd).unwrap();

    let pool = ctx.heap_pool(DescriptorHeapType::ShaderResource).unwrap();
    assert_eq!(pool.num_available(), 0);

    let cmd = queue.command_buffer().unwrap();
    assert_eq!(pool.num_available(), 1);
    assert!(cmd.bound_signature(PipelineKind::Graphics).is_none());
    assert_eq!(pool.num_heaps(), 1);
}

#[test]
fn sparse_staging_after_begin_copies_null_descriptors() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let buffers: Vec<_> = (0..5).map(|_| srv_buffer(&ctx)).collect();
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    for (i, buffer) in buffers[..4].iter().enumerate() {
        cmd.set_shader_resource_view(PipelineKind::Graphics, 0, i as u32, buffer);
    }
    cmd.draw(3, 1, 0, 0);
    cmd.end().unwrap();
    queue.submit(cmd).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    assert_eq!(queue.num_created(), 1);
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 3, &buffers[4]);
    cmd.draw(3, 1, 0, 0);

    let dynamic_heap = cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap();
    assert_eq!(dynamic_heap.cursor(), 4);
    assert_eq!(dynamic_heap.current_heap().unwrap().native().contents()[..4], [
        CpuDescriptor::default(),
        CpuDescriptor::default(),
        CpuDescriptor::default(),
        buffers[4].srv().unwrap()
    ]);
}

#[test]
fn samplers_stage_into_sampler_heap() {
    let ctx = create_context(ContextInfo::default());
    let signature = ctx.get_or_create_signature(&SignatureDesc {
        slots: vec![table(DescriptorRangeType::Sampler, 2, 0)],
        ..Default::default()
    }).unwrap();
    let sampler = ctx.create_sampler(&SamplerInfo::default()).unwrap();

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    cmd.set_sampler(PipelineKind::Graphics, 0, 1, &sampler);
    cmd.draw(3, 1, 0, 0);

    let heap = cmd.dynamic_heap(DescriptorHeapType::Sampler).unwrap().current_heap().unwrap();
    assert_eq!(heap.native().contents()[..2], [CpuDescriptor::default(), sampler.handle()]);
    assert!(cmd.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap().current_heap().is_none());
    assert_eq!(cmd.native().descriptor_tables(), vec![(PipelineKind::Graphics, 0, heap.native().gpu_start())]);
}

#[test]
fn draw_flushes_barriers_before_binding() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let buffer = srv_buffer(&ctx);
    let target = texture(&ctx, TextureUsage::RENDER_TARGET, Format::RGBA8n);

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_render_targets(&[&target], None);
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 0, &buffer);
    assert_eq!(cmd.tracker().num_pending(), 2);
    cmd.draw(3, 1, 0, 0);
    assert_eq!(cmd.tracker().num_pending(), 0);

    let commands = cmd.native().commands();
    let position = |f: &dyn Fn(&NullCommand) -> bool| commands.iter().position(|c| f(c)).unwrap();
    let barriers = position(&|c: &NullCommand| matches!(c, NullCommand::Barriers(_)));
    let table = position(&|c: &NullCommand| matches!(c, NullCommand::SetDescriptorTable { .. }));
    let draw = position(&|c: &NullCommand| matches!(c, NullCommand::Draw { .. }));
    assert!(barriers < table);
    assert!(table < draw);
    assert_eq!(target.state(), ResourceState::RENDER_TARGET);
}

#[test]
fn redundant_render_target_transitions_are_elided() {
    let ctx = create_context(ContextInfo::default());
    let target = texture(&ctx, TextureUsage::RENDER_TARGET, Format::RGBA8n);
    let colour = ClearColour { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.transition_barrier(Some(&target), ResourceState::RENDER_TARGET, true);
    cmd.transition_barrier(Some(&target), ResourceState::RENDER_TARGET, true);
    cmd.clear_render_target(&target, &colour);
    cmd.set_render_targets(&[&target], None);
    cmd.end().unwrap();

    assert_eq!(cmd.native().num_barriers(), 1);
    assert_eq!(cmd.native().commands()[1], NullCommand::ClearRenderTarget {
        rtv: target.rtv().unwrap(),
        colour
    });
}

#[test]
fn end_flushes_pending_barriers() {
    let ctx = create_context(ContextInfo::default());
    let target = texture(&ctx, TextureUsage::RENDER_TARGET, Format::RGBA8n);

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.transition_barrier(Some(&target), ResourceState::PRESENT, false);
    cmd.transition_barrier(None, ResourceState::RENDER_TARGET, false);
    assert_eq!(cmd.native().num_barriers(), 0);
    cmd.end().unwrap();

    assert_eq!(cmd.tracker().num_pending(), 0);
    assert_eq!(cmd.native().barrier_batches(), vec![&[BarrierRecord::Transition {
        resource: target.native().id(),
        before: ResourceState::COMMON,
        after: ResourceState::PRESENT
    }][..]]);
}

#[test]
fn misuse_is_ignored() {
    let ctx = create_context(ContextInfo::default());
    let buffer = srv_buffer(&ctx);
    let target = texture(&ctx, TextureUsage::SHADER_RESOURCE, Format::RGBA8n);

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();

    // not recording
    cmd.set_viewport(&Viewport::create(64.0, 64.0));
    cmd.begin().unwrap();

    // no signature bound
    cmd.set_shader_resource_view(PipelineKind::Graphics, 0, 0, &buffer);
    cmd.draw(3, 1, 0, 0);

    // texture as a vertex buffer, buffer without a stride or index format
    cmd.set_vertex_buffer(0, &target);
    cmd.set_index_buffer(&buffer);

    // no render target view
    cmd.set_render_targets(&[&target], None);

    let signature = two_tables(&ctx);
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);

    // out of range slot and offset, wrong view kind
    cmd.set_shader_resource_view(PipelineKind::Graphics, 2, 0, &buffer);
    cmd.set_shader_resource_view(PipelineKind::Graphics, 1, 2, &buffer);
    cmd.set_unordered_access_view(PipelineKind::Graphics, 0, 0, &buffer);
    cmd.set_constants(PipelineKind::Graphics, 0, &[1, 2, 3], 0);

    assert_eq!(cmd.tracker().num_pending(), 0);
    assert_eq!(cmd.num_kept_alive(), 1);
    assert_eq!(buffer.state(), ResourceState::COMMON);
    assert_eq!(cmd.native().commands(), &[
        NullCommand::SetSignature { kind: PipelineKind::Graphics, signature: signature.native().id() }
    ]);
}

#[test]
fn queue_capabilities_are_checked() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);

    let mut copy = ctx.create_command_buffer(QueueType::Copy).unwrap();
    copy.begin().unwrap();
    copy.set_binding_signature(PipelineKind::Graphics, &signature);
    copy.draw(3, 1, 0, 0);
    copy.dispatch(1, 1, 1);
    assert!(copy.native().commands().is_empty());

    let mut compute = ctx.create_command_buffer(QueueType::Compute).unwrap();
    compute.begin().unwrap();
    compute.set_binding_signature(PipelineKind::Compute, &signature);
    compute.draw(3, 1, 0, 0);
    compute.dispatch(8, 8, 1);
    assert_eq!(compute.native().commands().last(), Some(&NullCommand::Dispatch { x: 8, y: 8, z: 1 }));
    assert!(!compute.native().commands().iter().any(|c| matches!(c, NullCommand::Draw { .. })));
}

#[test]
fn constants_and_root_views() {
    let ctx = create_context(ContextInfo::default());
    let signature = ctx.get_or_create_signature(&SignatureDesc {
        slots: vec![
            slot(SlotType::Constants { num_values: 4, register: 0, space: 0 }),
            slot(SlotType::ConstantBuffer { register: 1, space: 0 }),
            slot(SlotType::UnorderedAccess { register: 0, space: 0 })
        ],
        ..Default::default()
    }).unwrap();
    let rw = ctx.create_buffer(&buffer_info(BufferUsage::UNORDERED_ACCESS, Format::Unknown, 4, 256), None).unwrap();

    let mut cmd = ctx.create_command_buffer(QueueType::Compute).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Compute, &signature);
    cmd.set_constants(PipelineKind::Compute, 0, &[7, 8], 2);
    cmd.set_constants(PipelineKind::Compute, 0, &[1, 2, 3], 2);
    cmd.set_dynamic_constant_buffer(PipelineKind::Compute, 1, &[1.0f32, 2.0, 3.0, 4.0]);
    cmd.set_dynamic_constant_buffer(PipelineKind::Compute, 1, &[5.0f32; 4]);
    cmd.set_unordered_access_buffer(PipelineKind::Compute, 2, &rw);
    cmd.set_unordered_access_buffer(PipelineKind::Compute, 1, &rw);
    cmd.dispatch(1, 1, 1);

    let commands = cmd.native().commands();
    assert_eq!(commands[1], NullCommand::SetConstants {
        kind: PipelineKind::Compute,
        slot: 0,
        values: vec![7, 8],
        dest_offset: 2
    });

    let root_views: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            NullCommand::SetRootView { slot, view, address, .. } => Some((*slot, *view, *address)),
            _ => None
        })
        .collect();
    assert_eq!(root_views.len(), 3);
    assert_eq!(root_views[0].1, RootViewType::ConstantBuffer);
    assert_eq!(root_views[0].2 % 256, 0);
    assert_eq!(root_views[1].2 - root_views[0].2, 256);
    assert_eq!(root_views[2], (2, RootViewType::UnorderedAccess, rw.gpu_address()));
    assert_eq!(rw.state(), ResourceState::UNORDERED_ACCESS);

    let page = &cmd.upload().used_pages()[0];
    let expected: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
    assert_eq!(page.native().read(0, 16), expected);
}

#[test]
fn dynamic_vertex_and_index_buffers() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    cmd.set_dynamic_vertex_buffer(0, &[[0.0f32; 3]; 3]);
    cmd.set_dynamic_index_buffer(&[0u16, 1, 2], Format::R16u);
    cmd.set_dynamic_index_buffer(&[0u16, 1, 2], Format::R32u);
    cmd.draw_indexed(3, 1, 0, 0, 0);

    let commands = cmd.native().commands();
    let vb = commands.iter().find_map(|c| match c {
        NullCommand::SetVertexBuffers { views, .. } => Some(views[0]),
        _ => None
    }).unwrap();
    assert_eq!(vb.size_bytes, 36);
    assert_eq!(vb.stride_bytes, 12);

    let index_buffers: Vec<_> = commands.iter().filter_map(|c| match c {
        NullCommand::SetIndexBuffer(view) => Some(*view),
        _ => None
    }).collect();
    assert_eq!(index_buffers.len(), 1);
    assert_eq!(index_buffers[0].format, Format::R16u);
    assert_eq!(index_buffers[0].size_bytes, 6);
    assert!(index_buffers[0].location >= vb.location + 36);
}

#[test]
fn update_buffer_copies_through_transient_memory() {
    let ctx = create_context(ContextInfo::default());
    let buffer = ctx.create_buffer(&buffer_info(BufferUsage::empty(), Format::Unknown, 4, 8), None).unwrap();
    let mut queue = ctx.create_command_queue(QueueType::Copy).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    cmd.update_buffer(&buffer, 4, &[1u32, 2, 3, 4]);
    cmd.update_buffer(&buffer, 24, &[5u32, 6, 7]);
    cmd.end().unwrap();
    assert_eq!(buffer.state(), ResourceState::COPY_DEST);
    queue.submit(cmd).unwrap();

    let expected: Vec<u8> = [0u32, 1, 2, 3, 4, 0, 0, 0].iter().flat_map(|v| v.to_ne_bytes()).collect();
    assert_eq!(buffer.native().data(), expected);
}

#[test]
fn copy_resource_transitions_both_sides() {
    let ctx = create_context(ContextInfo::default());
    let data: Vec<u8> = (0..32).collect();
    let src = ctx.create_buffer(&buffer_info(BufferUsage::empty(), Format::Unknown, 4, 8), Some(&data)).unwrap();
    let dst = ctx.create_buffer(&buffer_info(BufferUsage::empty(), Format::Unknown, 4, 8), None).unwrap();
    let small = ctx.create_buffer(&buffer_info(BufferUsage::empty(), Format::Unknown, 4, 2), None).unwrap();
    let mut queue = ctx.create_command_queue(QueueType::Copy).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    cmd.copy_resource(&small, &src);
    cmd.copy_buffer_region(&small, 4, &src, 0, 8);
    cmd.copy_resource(&dst, &src);
    cmd.end().unwrap();
    assert_eq!(src.state(), ResourceState::COPY_SOURCE);
    assert_eq!(dst.state(), ResourceState::COPY_DEST);
    queue.submit(cmd).unwrap();

    assert_eq!(dst.native().data(), data);
    assert_eq!(small.native().data(), vec![0; 8]);
}

#[test]
fn keep_alive_holds_resources_until_next_begin() {
    let ctx = create_context(ContextInfo::default());
    let vertices = ctx.create_buffer(&buffer_info(BufferUsage::VERTEX, Format::Unknown, 12, 3), None).unwrap();
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();

    let mut cmd = queue.command_buffer().unwrap();
    cmd.set_vertex_buffer(0, &vertices);
    cmd.end().unwrap();
    assert_eq!(vertices.ref_count(), 2);
    queue.submit(cmd).unwrap();
    assert_eq!(vertices.ref_count(), 2);

    let _cmd = queue.command_buffer().unwrap();
    assert_eq!(vertices.ref_count(), 1);
}

#[test]
fn transient_memory_is_reused_across_cycles() {
    let ctx = create_context(ContextInfo::default());
    let mut queue = ctx.create_command_queue(QueueType::Graphics).unwrap();

    let record = |queue: &mut CommandQueue<null::Device>| -> Vec<u64> {
        let mut cmd = queue.command_buffer().unwrap();
        let addresses = (0..5).map(|_| cmd.upload_mut().allocate(1024 * 1024, 256).unwrap().gpu_address()).collect();
        cmd.end().unwrap();
        queue.submit(cmd).unwrap();
        addresses
    };
    let first = record(&mut queue);
    let second = record(&mut queue);
    assert_eq!(first, second);
    assert_eq!(ctx.page_pool().num_pages_created(), 3);
}

#[test]
fn pipeline_state_binds_signature_and_pipeline() {
    let ctx = create_context(ContextInfo::default());
    let signature_desc = SignatureDesc {
        slots: vec![table(DescriptorRangeType::UnorderedAccess, 1, 0)],
        ..Default::default()
    };
    let mut pso = ctx.create_pipeline_state(PipelineDesc::compute(vec![0; 32]), signature_desc.clone());
    let mut broken = ctx.create_pipeline_state(PipelineDesc::compute(vec![0; 32]), signature_desc);
    broken.desc_mut().cs = None;

    let mut cmd = ctx.create_command_buffer(QueueType::Compute).unwrap();
    cmd.begin().unwrap();
    cmd.set_pipeline_state(&mut broken);
    assert!(cmd.bound_signature(PipelineKind::Compute).is_none());

    cmd.set_pipeline_state(&mut pso);
    cmd.set_pipeline_state(&mut pso);
    let resolved = pso.resolve().unwrap();
    assert!(Arc::ptr_eq(cmd.bound_signature(PipelineKind::Compute).unwrap(), &resolved.signature));

    let set_signatures = cmd.native().commands().iter().filter(|c| matches!(c, NullCommand::SetSignature { .. })).count();
    assert_eq!(set_signatures, 1);
    assert_eq!(cmd.native().commands()[1], NullCommand::SetPipeline { pipeline: resolved.pipeline.id() });
}

#[test]
fn execute_indirect_validates_arguments() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let command_signature = ctx.create_command_signature(&CommandSignatureInfo {
        arguments: vec![IndirectArgument::Draw],
        stride: 0
    }, None).unwrap();
    assert_eq!(command_signature.stride(), 16);

    let args = ctx.create_buffer(&buffer_info(BufferUsage::INDIRECT_ARGUMENT, Format::Unknown, 16, 4), None).unwrap();

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
    cmd.execute_indirect(PipelineKind::Graphics, &command_signature, 5, &args, 0, None);
    cmd.execute_indirect(PipelineKind::Graphics, &command_signature, 4, &args, 0, None);

    assert_eq!(args.state(), ResourceState::INDIRECT_ARGUMENT);
    assert_eq!(cmd.native().commands().last(), Some(&NullCommand::ExecuteIndirect {
        command_signature: command_signature.native().id(),
        max_count: 4,
        args: args.native().id(),
        args_offset: 0,
        count: None
    }));
    let executes = cmd.native().commands().iter().filter(|c| matches!(c, NullCommand::ExecuteIndirect { .. })).count();
    assert_eq!(executes, 1);
}

#[test]
fn depth_targets_clear_and_bind() {
    let ctx = create_context(ContextInfo::default());
    let colour = texture(&ctx, TextureUsage::RENDER_TARGET, Format::RGBA8n);
    let depth = texture(&ctx, TextureUsage::DEPTH_STENCIL, Format::D32f);

    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
    cmd.begin().unwrap();
    cmd.clear_depth_stencil(&depth, hotline_gfx::gfx::ClearFlags::DEPTH, 1.0, 0);
    cmd.set_render_targets(&[&colour], Some(&depth));
    cmd.end().unwrap();

    assert_eq!(depth.state(), ResourceState::DEPTH_WRITE);
    assert_eq!(colour.state(), ResourceState::RENDER_TARGET);
    assert!(cmd.native().commands().contains(&NullCommand::SetRenderTargets {
        rtvs: vec![colour.rtv().unwrap()],
        dsv: depth.dsv()
    }));
}

#[test]
fn descriptor_handles_offset_by_increment() {
    let base = GpuDescriptor(0x1000);
    assert_eq!(base.offset(3, INCREMENT), GpuDescriptor(0x1000 + 3 * INCREMENT as u64));
}

#[test]
fn rejected_execute_indirect_changes_nothing() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let command_signature = ctx.create_command_signature(&CommandSignatureInfo {
        arguments: vec![IndirectArgument::Dispatch],
        stride: 0
    }, None).unwrap();
    let args = ctx.create_buffer(&buffer_info(BufferUsage::INDIRECT_ARGUMENT, Format::Unknown, 16, 4), None).unwrap();
    let count = ctx.create_buffer(&buffer_info(BufferUsage::INDIRECT_ARGUMENT, Format::Unknown, 4, 1), None).unwrap();

    // compute work on a copy queue
    let mut copy = ctx.create_command_buffer(QueueType::Copy).unwrap();
    copy.begin().unwrap();
    copy.set_binding_signature(PipelineKind::Compute, &signature);
    copy.execute_indirect(PipelineKind::Compute, &command_signature, 1, &args, 0, Some((&count, 0)));
    assert_eq!(copy.tracker().num_pending(), 0);
    assert_eq!(copy.num_kept_alive(), 0);
    copy.end().unwrap();
    assert!(copy.native().commands().is_empty());

    // no bound signature
    let mut compute = ctx.create_command_buffer(QueueType::Compute).unwrap();
    compute.begin().unwrap();
    compute.execute_indirect(PipelineKind::Compute, &command_signature, 1, &args, 0, None);
    assert_eq!(compute.tracker().num_pending(), 0);

    // argument range overflows
    compute.set_binding_signature(PipelineKind::Compute, &signature);
    compute.execute_indirect(PipelineKind::Compute, &command_signature, 1, &args, usize::MAX, None);
    compute.execute_indirect(PipelineKind::Compute, &command_signature, u32::MAX, &args, 0, None);
    assert_eq!(compute.tracker().num_pending(), 0);

    assert_eq!(args.state(), ResourceState::COMMON);
    assert_eq!(count.state(), ResourceState::COMMON);
}

#[test]
fn overflowing_copy_ranges_are_ignored() {
    let ctx = create_context(ContextInfo::default());
    let src = ctx.create_buffer(&buffer_info(BufferUsage::empty(), Format::Unknown, 4, 8), None).unwrap();
    let dst = ctx.create_buffer(&buffer_info(BufferUsage::empty(), Format::Unknown, 4, 8), None).unwrap();

    let mut cmd = ctx.create_command_buffer(QueueType::Copy).unwrap();
    cmd.begin().unwrap();
    cmd.update_buffer(&dst, usize::MAX, &[1u32]);
    cmd.copy_buffer_region(&dst, usize::MAX, &src, 0, 8);
    cmd.copy_buffer_region(&dst, 0, &src, 8, usize::MAX);

    assert_eq!(cmd.tracker().num_pending(), 0);
    assert_eq!(cmd.num_kept_alive(), 0);
    assert!(cmd.native().commands().is_empty());
    assert_eq!(dst.state(), ResourceState::COMMON);
}

#[test]
fn set_descriptors_checks_queue_capabilities() {
    let ctx = create_context(ContextInfo::default());
    let signature = two_tables(&ctx);
    let buffer = srv_buffer(&ctx);

    let mut copy = ctx.create_command_buffer(QueueType::Copy).unwrap();
    copy.begin().unwrap();
    copy.set_binding_signature(PipelineKind::Graphics, &signature);
    copy.set_descriptors(
        PipelineKind::Graphics, DescriptorHeapType::ShaderResource, 0, 0, &[buffer.srv().unwrap()]
    );
    assert_eq!(copy.dynamic_heap(DescriptorHeapType::ShaderResource).unwrap().table(PipelineKind::Graphics).stale_count(), 0);
}

#[test]
fn command_buffers_record_concurrently_from_one_context() {
    const THREADS: usize = 4;
    let ctx = create_context(ContextInfo::default());
    let desc = SignatureDesc {
        slots: vec![table(DescriptorRangeType::ShaderResource, 4, 0)],
        ..Default::default()
    };
    let recorded = std::sync::Barrier::new(THREADS);

    let results: Vec<(Vec<usize>, Vec<usize>, usize)> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    let signature = ctx.get_or_create_signature(&desc).unwrap();
                    let buffers: Vec<_> = (0..4).map(|_| srv_buffer(&ctx)).collect();

                    let mut cmd = ctx.create_command_buffer(QueueType::Graphics).unwrap();
                    cmd.begin().unwrap();
                    cmd.set_binding_signature(PipelineKind::Graphics, &signature);
                    for (i, buffer) in buffers.iter().enumerate() {
                        cmd.set_shader_resource_view(PipelineKind::Graphics, 0, i as u32, buffer);
                    }
                    cmd.draw(3, 1, 0, 0);
                    for _ in 0..3 {
                        cmd.upload_mut().allocate(1024 * 1024, 256).unwrap();
                    }

                    // every command buffer is alive while the others read their pages and heaps
                    recorded.wait();
                    let pages = cmd.upload().used_pages().iter().map(|page| page.id()).collect();
                    let heaps = cmd.dynamic_heap(DescriptorHeapType::ShaderResource)
                        .unwrap()
                        .used_heaps()
                        .iter()
                        .map(|heap| heap.id())
                        .collect();
                    recorded.wait();
                    (pages, heaps, Arc::as_ptr(&signature) as usize)
                })
            })
            .collect();
        workers.into_iter().map(|worker| worker.join().unwrap()).collect()
    });

    let pages: HashSet<usize> = results.iter().flat_map(|(pages, _, _)| pages.iter().copied()).collect();
    let heaps: HashSet<usize> = results.iter().flat_map(|(_, heaps, _)| heaps.iter().copied()).collect();
    let signatures: HashSet<usize> = results.iter().map(|(_, _, signature)| *signature).collect();

    assert!(results.iter().all(|(pages, heaps, _)| pages.len() == 2 && heaps.len() == 1));
    assert_eq!(pages.len(), THREADS * 2);
    assert_eq!(heaps.len(), THREADS);
    assert_eq!(ctx.page_pool().num_pages_created(), THREADS * 2);
    assert_eq!(ctx.heap_pool(DescriptorHeapType::ShaderResource).unwrap().num_heaps(), THREADS);

    assert_eq!(signatures.len(), 1);
    assert_eq!(ctx.signature_cache().len(), 1);
    assert_eq!(ctx.signature_cache().misses(), 1);
    assert_eq!(ctx.signature_cache().hits(), THREADS - 1);
}
