use super::Device;
use super::Format;
use super::PipelineKind;
use super::signature::BindingSignature;
use super::signature::BindingSignatureCache;
use super::signature::SignatureBuilder;
use super::signature::SignatureDesc;

use serde::{Deserialize, Serialize};

use std::sync::Arc;

/// Per vertex or per instance step rate of an input element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSlotClass {
    PerVertex,
    PerInstance
}

/// Describes a single element of a vertex layout
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputElementInfo {
    pub semantic: String,
    pub index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub input_slot_class: InputSlotClass,
    pub step_rate: u32
}

/// Class of primitive topology a graphics pipeline rasterises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyType {
    Point,
    Line,
    Triangle,
    Patch
}

/// Everything needed to build a native pipeline except the binding signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineDesc {
    pub kind: PipelineKind,
    pub vs: Option<Vec<u8>>,
    pub ps: Option<Vec<u8>>,
    pub cs: Option<Vec<u8>>,
    pub input_layout: Vec<InputElementInfo>,
    pub topology: TopologyType,
    pub render_target_formats: Vec<Format>,
    pub depth_stencil_format: Option<Format>,
    pub sample_count: u32
}

impl PipelineDesc {
    /// Graphics pipeline with vertex and pixel shader byte code, everything else defaulted
    pub fn graphics(vs: Vec<u8>, ps: Option<Vec<u8>>) -> Self {
        PipelineDesc {
            kind: PipelineKind::Graphics,
            vs: Some(vs),
            ps,
            cs: None,
            input_layout: Vec::new(),
            topology: TopologyType::Triangle,
            render_target_formats: vec![Format::RGBA8n],
            depth_stencil_format: None,
            sample_count: 1
        }
    }

    /// Compute pipeline with compute shader byte code
    pub fn compute(cs: Vec<u8>) -> Self {
        PipelineDesc {
            kind: PipelineKind::Compute,
            vs: None,
            ps: None,
            cs: Some(cs),
            input_layout: Vec::new(),
            topology: TopologyType::Triangle,
            render_target_formats: Vec::new(),
            depth_stencil_format: None,
            sample_count: 1
        }
    }
}

/// A native pipeline and the binding signature it was built against
pub struct ResolvedPipeline<D: Device> {
    pub signature: Arc<BindingSignature<D>>,
    pub pipeline: Arc<D::Pipeline>
}

impl<D> Clone for ResolvedPipeline<D> where D: Device {
    fn clone(&self) -> Self {
        ResolvedPipeline {
            signature: self.signature.clone(),
            pipeline: self.pipeline.clone()
        }
    }
}

/// A pipeline description plus its binding signature builder. Native objects are only built
/// by `resolve` on first use after a mutation.
pub struct PipelineState<D: Device> {
    device: Arc<D>,
    cache: Arc<BindingSignatureCache<D>>,
    desc: PipelineDesc,
    signature: SignatureBuilder<D>,
    built_for: Option<Arc<BindingSignature<D>>>,
    pipeline: Option<Arc<D::Pipeline>>,
    dirty: bool
}

impl<D> PipelineState<D> where D: Device {
    pub fn new(
        device: Arc<D>,
        cache: Arc<BindingSignatureCache<D>>,
        desc: PipelineDesc,
        signature: SignatureDesc
    ) -> Self {
        PipelineState {
            device,
            cache,
            desc,
            signature: SignatureBuilder::new(signature),
            built_for: None,
            pipeline: None,
            dirty: true
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.desc.kind
    }

    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    /// Mutable access to the pipeline description, the native pipeline is rebuilt on next use
    pub fn desc_mut(&mut self) -> &mut PipelineDesc {
        self.dirty = true;
        &mut self.desc
    }

    pub fn signature(&self) -> &SignatureBuilder<D> {
        &self.signature
    }

    /// Mutable access to the signature builder, which tracks its own dirty state
    pub fn signature_mut(&mut self) -> &mut SignatureBuilder<D> {
        &mut self.signature
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.signature.is_dirty()
    }

    /// Returns the native pipeline and signature, building them if anything changed.
    /// `None` means the pipeline state is currently unusable and must not be bound.
    pub fn resolve(&mut self) -> Option<ResolvedPipeline<D>> {
        let signature = self.signature.resolve(&self.cache);
        let signature = match signature {
            Some(signature) => signature,
            None => {
                self.pipeline = None;
                self.built_for = None;
                return None;
            }
        };

        let same_signature = self.built_for.as_ref().map(|s| Arc::ptr_eq(s, &signature)).unwrap_or(false);
        if self.dirty || !same_signature {
            self.pipeline = match self.device.create_pipeline(&self.desc, signature.native()) {
                Ok(pipeline) => Some(Arc::new(pipeline)),
                Err(err) => {
                    tracing::error!(
                        "hotline_gfx::pipeline: failed to create {:?} pipeline: {}", self.desc.kind, err
                    );
                    None
                }
            };
            self.built_for = Some(signature.clone());
            self.dirty = false;
        }

        self.pipeline.as_ref().map(|pipeline| ResolvedPipeline {
            signature,
            pipeline: pipeline.clone()
        })
    }
}
