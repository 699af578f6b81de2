use crate::Error;

use crate::gfx::BufferInfo;
use crate::gfx::BufferUsage;
use crate::gfx::CommandSignatureInfo;
use crate::gfx::DescriptorHeapType;
use crate::gfx::Device;
use crate::gfx::QueueType;
use crate::gfx::SamplerInfo;
use crate::gfx::TextureInfo;
use crate::gfx::TextureUsage;
use crate::gfx::ViewKind;
use crate::gfx::cmd::CommandBuffer;
use crate::gfx::cmd::CommandSignature;
use crate::gfx::cmd::TransientPools;
use crate::gfx::descriptors::CpuDescriptorAllocator;
use crate::gfx::descriptors::DescriptorAllocation;
use crate::gfx::descriptors::DescriptorHeapPool;
use crate::gfx::descriptors::Sampler;
use crate::gfx::pipeline::PipelineDesc;
use crate::gfx::pipeline::PipelineState;
use crate::gfx::queue::CommandQueue;
use crate::gfx::resource::Resource;
use crate::gfx::resource::ResourceDesc;
use crate::gfx::resource::ResourceViews;
use crate::gfx::signature::BindingSignature;
use crate::gfx::signature::BindingSignatureCache;
use crate::gfx::signature::SignatureDesc;
use crate::gfx::upload::DEFAULT_PAGE_SIZE;
use crate::gfx::upload::PagePool;

use serde::{Deserialize, Serialize};

use std::path::Path;
use std::sync::Arc;

/// Sizes of the pools owned by a `Context`, missing fields in a config file take the default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextInfo {
    /// Size of a transient upload page in bytes
    pub upload_page_size: usize,
    /// Descriptors in each shader visible heap of constant buffer, shader resource and unordered access views
    pub shader_heap_size: u32,
    /// Descriptors in each shader visible sampler heap
    pub sampler_heap_size: u32,
    pub cpu_shader_heap_size: u32,
    pub cpu_sampler_heap_size: u32,
    pub render_target_heap_size: u32,
    pub depth_stencil_heap_size: u32
}

impl Default for ContextInfo {
    fn default() -> Self {
        ContextInfo {
            upload_page_size: DEFAULT_PAGE_SIZE,
            shader_heap_size: 4096,
            sampler_heap_size: 1024,
            cpu_shader_heap_size: 1024,
            cpu_sampler_heap_size: 256,
            render_target_heap_size: 256,
            depth_stencil_heap_size: 64
        }
    }
}

impl ContextInfo {
    /// Loads context info from a json file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes context info to a json file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn cpu_heap_size(&self, heap_type: DescriptorHeapType) -> u32 {
        match heap_type {
            DescriptorHeapType::ShaderResource => self.cpu_shader_heap_size,
            DescriptorHeapType::Sampler => self.cpu_sampler_heap_size,
            DescriptorHeapType::RenderTarget => self.render_target_heap_size,
            DescriptorHeapType::DepthStencil => self.depth_stencil_heap_size
        }
    }
}

/// Owns a device and the process wide pools and caches shared by every command buffer:
/// transient pages, shader visible heaps, cpu descriptor heaps and binding signatures.
/// Pools are created with the context and torn down when it drops.
pub struct Context<D: Device> {
    info: ContextInfo,
    pools: TransientPools<D>,
    cpu_descriptors: Vec<Arc<CpuDescriptorAllocator<D>>>,
    signatures: Arc<BindingSignatureCache<D>>
}

impl<D> Context<D> where D: Device {
    pub fn create(device: D, info: ContextInfo) -> Result<Self, Error> {
        let device = Arc::new(device);
        let pools = TransientPools {
            device: device.clone(),
            pages: Arc::new(PagePool::new(device.clone(), info.upload_page_size)),
            shader_heaps: Arc::new(DescriptorHeapPool::new(
                device.clone(), DescriptorHeapType::ShaderResource, info.shader_heap_size
            )),
            sampler_heaps: Arc::new(DescriptorHeapPool::new(
                device.clone(), DescriptorHeapType::Sampler, info.sampler_heap_size
            ))
        };
        let cpu_descriptors = DescriptorHeapType::ALL
            .iter()
            .map(|heap_type| {
                Arc::new(CpuDescriptorAllocator::new(device.clone(), *heap_type, info.cpu_heap_size(*heap_type)))
            })
            .collect();
        tracing::debug!("hotline_gfx::context: created context {:?}", info);
        Ok(Context {
            info,
            cpu_descriptors,
            signatures: Arc::new(BindingSignatureCache::new(device)),
            pools
        })
    }

    pub fn info(&self) -> &ContextInfo {
        &self.info
    }

    pub fn device(&self) -> &Arc<D> {
        &self.pools.device
    }

    pub fn pools(&self) -> &TransientPools<D> {
        &self.pools
    }

    pub fn page_pool(&self) -> &Arc<PagePool<D>> {
        &self.pools.pages
    }

    /// Pool of shader visible heaps for `heap_type`, `None` for heap types which cannot be shader visible
    pub fn heap_pool(&self, heap_type: DescriptorHeapType) -> Option<&Arc<DescriptorHeapPool<D>>> {
        match heap_type {
            DescriptorHeapType::ShaderResource => Some(&self.pools.shader_heaps),
            DescriptorHeapType::Sampler => Some(&self.pools.sampler_heaps),
            _ => None
        }
    }

    pub fn cpu_descriptors(&self, heap_type: DescriptorHeapType) -> &Arc<CpuDescriptorAllocator<D>> {
        &self.cpu_descriptors[heap_type.index()]
    }

    pub fn signature_cache(&self) -> &Arc<BindingSignatureCache<D>> {
        &self.signatures
    }

    fn create_view(&self, native: &D::Resource, kind: ViewKind) -> Result<DescriptorAllocation, Error> {
        let alloc = self.cpu_descriptors[kind.heap_type().index()].allocate()?;
        self.pools.device.create_view(native, kind, alloc.handle());
        Ok(alloc)
    }

    /// Creates a buffer with views for each bindable usage, optionally filled with `data`
    pub fn create_buffer(&self, info: &BufferInfo, data: Option<&[u8]>) -> Result<Resource<D>, Error> {
        let native = self.pools.device.create_buffer(info, data).map_err(|err| {
            tracing::error!("hotline_gfx::context: failed to create buffer of {} bytes: {}", info.size_bytes(), err);
            err
        })?;

        let mut views = ResourceViews::default();
        if info.usage.contains(BufferUsage::SHADER_RESOURCE) {
            views.srv = Some(self.create_view(&native, ViewKind::ShaderResource)?);
        }
        if info.usage.contains(BufferUsage::UNORDERED_ACCESS) {
            views.uav = Some(self.create_view(&native, ViewKind::UnorderedAccess)?);
        }
        if info.usage.contains(BufferUsage::CONSTANT_BUFFER) {
            views.cbv = Some(self.create_view(&native, ViewKind::ConstantBuffer)?);
        }

        let gpu_address = self.pools.device.gpu_address(&native);
        Ok(Resource::new(native, ResourceDesc::Buffer(info.clone()), gpu_address, views, info.initial_state))
    }

    /// Creates a texture with views for each bindable usage
    pub fn create_texture(&self, info: &TextureInfo) -> Result<Resource<D>, Error> {
        let native = self.pools.device.create_texture(info).map_err(|err| {
            tracing::error!(
                "hotline_gfx::context: failed to create {}x{} {:?} texture: {}", info.width, info.height, info.format, err
            );
            err
        })?;

        let mut views = ResourceViews::default();
        if info.usage.contains(TextureUsage::SHADER_RESOURCE) {
            views.srv = Some(self.create_view(&native, ViewKind::ShaderResource)?);
        }
        if info.usage.contains(TextureUsage::UNORDERED_ACCESS) {
            views.uav = Some(self.create_view(&native, ViewKind::UnorderedAccess)?);
        }
        if info.usage.contains(TextureUsage::RENDER_TARGET) {
            views.rtv = Some(self.create_view(&native, ViewKind::RenderTarget)?);
        }
        if info.usage.contains(TextureUsage::DEPTH_STENCIL) {
            views.dsv = Some(self.create_view(&native, ViewKind::DepthStencil)?);
        }

        let gpu_address = self.pools.device.gpu_address(&native);
        Ok(Resource::new(native, ResourceDesc::Texture(info.clone()), gpu_address, views, info.initial_state))
    }

    pub fn create_sampler(&self, info: &SamplerInfo) -> Result<Sampler, Error> {
        let alloc = self.cpu_descriptors[DescriptorHeapType::Sampler.index()].allocate()?;
        self.pools.device.create_sampler(info, alloc.handle());
        Ok(Sampler::new(*info, alloc))
    }

    pub fn create_command_queue(&self, queue_type: QueueType) -> Result<CommandQueue<D>, Error> {
        CommandQueue::new(self.pools.clone(), queue_type)
    }

    /// Creates a standalone command buffer in the `Idle` state, the caller calls `begin`
    pub fn create_command_buffer(&self, queue_type: QueueType) -> Result<CommandBuffer<D>, Error> {
        CommandBuffer::new(&self.pools, queue_type)
    }

    pub fn create_command_signature(
        &self,
        info: &CommandSignatureInfo,
        signature: Option<&Arc<BindingSignature<D>>>
    ) -> Result<CommandSignature<D>, Error> {
        let native = self.pools.device
            .create_command_signature(info, signature.map(|s| s.native()))
            .map_err(|err| {
                tracing::error!("hotline_gfx::context: failed to create command signature: {}", err);
                err
            })?;
        Ok(CommandSignature::new(info.clone(), native, signature.cloned()))
    }

    /// Returns the interned signature for `desc`, `None` if it cannot be built
    pub fn get_or_create_signature(&self, desc: &SignatureDesc) -> Option<Arc<BindingSignature<D>>> {
        self.signatures.get_or_create(desc)
    }

    /// Creates a pipeline state, native objects are built on first use
    pub fn create_pipeline_state(&self, desc: PipelineDesc, signature: SignatureDesc) -> PipelineState<D> {
        PipelineState::new(self.pools.device.clone(), self.signatures.clone(), desc, signature)
    }
}

impl<D> Drop for Context<D> where D: Device {
    fn drop(&mut self) {
        tracing::debug!(
            "hotline_gfx::context: dropping context with {} signatures, {} pages, {} shader heaps",
            self.signatures.len(), self.pools.pages.num_pages_created(), self.pools.shader_heaps.num_heaps()
        );
        self.signatures.clear();
    }
}
