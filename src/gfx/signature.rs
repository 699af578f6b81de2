use super::DescriptorHeapType;
use super::Device;
use super::SamplerInfo;
use super::dynamic_heap::MAX_SLOTS;
use super::dynamic_heap::MAX_RANGES_PER_SLOT;

use parking_lot::Mutex;

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Range offset which places a range directly after the previous range in the same table
pub const APPEND: u32 = u32::MAX;

/// Shader stages which can see a signature slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderVisibility {
    All,
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel
}

/// Type of descriptors in a descriptor range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorRangeType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    Sampler
}

impl DescriptorRangeType {
    /// The heap descriptors of this range type are copied into
    pub fn heap_type(self) -> DescriptorHeapType {
        match self {
            DescriptorRangeType::Sampler => DescriptorHeapType::Sampler,
            _ => DescriptorHeapType::ShaderResource
        }
    }
}

/// A range of descriptors bound to consecutive shader registers, part of a descriptor table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorRange {
    pub range_type: DescriptorRangeType,
    pub count: u32,
    pub register: u32,
    pub space: u32,
    /// Offset in descriptors from the start of the table, or `APPEND`
    pub offset: u32
}

impl DescriptorRange {
    pub fn new(range_type: DescriptorRangeType, count: u32, register: u32, space: u32) -> Self {
        DescriptorRange {
            range_type,
            count,
            register,
            space,
            offset: APPEND
        }
    }
}

/// What is bound to a signature slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    /// A table of descriptors living in a shader visible heap
    Table(Vec<DescriptorRange>),
    /// 32 bit values written directly into the signature
    Constants {
        num_values: u32,
        register: u32,
        space: u32
    },
    /// Gpu address of a constant buffer
    ConstantBuffer {
        register: u32,
        space: u32
    },
    /// Gpu address of a read only buffer
    ShaderResource {
        register: u32,
        space: u32
    },
    /// Gpu address of a read write buffer
    UnorderedAccess {
        register: u32,
        space: u32
    }
}

/// A single slot (root parameter) of a binding signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureSlot {
    pub slot_type: SlotType,
    pub visibility: ShaderVisibility
}

impl SignatureSlot {
    /// The heap type of a table slot, `None` for other slots or empty tables
    pub fn table_heap_type(&self) -> Option<DescriptorHeapType> {
        match &self.slot_type {
            SlotType::Table(ranges) => ranges.first().map(|r| r.range_type.heap_type()),
            _ => None
        }
    }
}

/// A sampler baked into the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticSampler {
    pub sampler: SamplerInfo,
    pub register: u32,
    pub space: u32,
    pub visibility: ShaderVisibility
}

bitflags! {
    /// Flags passed through to the native signature
    pub struct SignatureFlags: u32 {
        const ALLOW_INPUT_LAYOUT = 1 << 0;
        const DENY_VERTEX_ACCESS = 1 << 1;
        const DENY_PIXEL_ACCESS = 1 << 2;
        const DENY_GEOMETRY_ACCESS = 1 << 3;
        const DENY_HULL_ACCESS = 1 << 4;
        const DENY_DOMAIN_ACCESS = 1 << 5;
    }
}

impl Default for SignatureFlags {
    fn default() -> Self {
        SignatureFlags::empty()
    }
}

mod flags_bits {
    use super::SignatureFlags;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flags: &SignatureFlags, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SignatureFlags, D::Error> {
        Ok(SignatureFlags::from_bits_truncate(u32::deserialize(d)?))
    }
}

/// Ordered slot list and static samplers which make up a binding signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureDesc {
    pub slots: Vec<SignatureSlot>,
    pub static_samplers: Vec<StaticSampler>,
    #[serde(with = "flags_bits")]
    pub flags: SignatureFlags
}

impl SignatureDesc {
    /// Returns a copy with every `APPEND` range offset resolved, so descriptions that produce
    /// the same native layout compare and hash equal
    pub fn canonical(&self) -> SignatureDesc {
        let mut desc = self.clone();
        for slot in &mut desc.slots {
            if let SlotType::Table(ranges) = &mut slot.slot_type {
                let mut next = 0;
                for range in ranges.iter_mut() {
                    if range.offset == APPEND {
                        range.offset = next;
                    }
                    next = range.offset.saturating_add(range.count);
                }
            }
        }
        desc
    }

    /// Hash of the canonical description
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.canonical().hash(&mut hasher);
        hasher.finish()
    }

    /// Checks the limits the command buffer relies on, returns a description of the first problem
    pub fn validate(&self) -> Result<(), String> {
        if self.slots.len() > MAX_SLOTS {
            return Err(format!("{} slots exceeds the maximum of {}", self.slots.len(), MAX_SLOTS));
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if let SlotType::Table(ranges) = &slot.slot_type {
                if ranges.is_empty() {
                    return Err(format!("table at slot {} has no ranges", i));
                }
                if ranges.len() > MAX_RANGES_PER_SLOT {
                    return Err(format!(
                        "table at slot {} has {} ranges, the maximum is {}", i, ranges.len(), MAX_RANGES_PER_SLOT
                    ));
                }
                let heap_type = ranges[0].range_type.heap_type();
                if ranges.iter().any(|r| r.range_type.heap_type() != heap_type) {
                    return Err(format!("table at slot {} mixes samplers with other descriptors", i));
                }
                if ranges.iter().any(|r| r.count == 0 || r.count == u32::MAX) {
                    return Err(format!("table at slot {} has an empty or unbounded range", i));
                }
            }
        }
        Ok(())
    }
}

/// An interned native signature together with the canonical description it was built from
pub struct BindingSignature<D: Device> {
    desc: SignatureDesc,
    hash: u64,
    native: D::Signature
}

impl<D> BindingSignature<D> where D: Device {
    pub fn desc(&self) -> &SignatureDesc {
        &self.desc
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn native(&self) -> &D::Signature {
        &self.native
    }

    pub fn slot(&self, slot: u32) -> Option<&SignatureSlot> {
        self.desc.slots.get(slot as usize)
    }
}

/// Process wide cache of native binding signatures keyed by content hash.
/// Two descriptions with identical canonical content always yield the same `Arc`.
pub struct BindingSignatureCache<D: Device> {
    device: Arc<D>,
    signatures: Mutex<HashMap<u64, Vec<Arc<BindingSignature<D>>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize
}

impl<D> BindingSignatureCache<D> where D: Device {
    pub fn new(device: Arc<D>) -> Self {
        BindingSignatureCache {
            device,
            signatures: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0)
        }
    }

    /// Returns the interned signature for `desc`, building it on a miss.
    /// Returns `None` if the description cannot be serialised or created, such a signature must not be bound.
    pub fn get_or_create(&self, desc: &SignatureDesc) -> Option<Arc<BindingSignature<D>>> {
        let canonical = desc.canonical();
        let hash = desc.content_hash();

        let mut signatures = self.signatures.lock();
        if let Some(existing) = signatures.get(&hash).and_then(|bucket| bucket.iter().find(|s| s.desc == canonical)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(existing.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        if let Err(msg) = canonical.validate() {
            tracing::error!("hotline_gfx::signature: invalid signature {:016x}: {}", hash, msg);
            return None;
        }

        let blob = match self.device.serialize_signature(&canonical) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::error!("hotline_gfx::signature: failed to serialise signature {:016x}: {}", hash, err);
                return None;
            }
        };

        let native = match self.device.create_signature(&blob) {
            Ok(native) => native,
            Err(err) => {
                tracing::error!("hotline_gfx::signature: failed to create signature {:016x}: {}", hash, err);
                return None;
            }
        };

        let signature = Arc::new(BindingSignature {
            desc: canonical,
            hash,
            native
        });
        signatures.entry(hash).or_default().push(signature.clone());
        tracing::debug!(
            "hotline_gfx::signature: created signature {:016x} ({} slots, {} bytes)",
            hash, signature.desc.slots.len(), blob.len()
        );
        Some(signature)
    }

    /// Number of unique signatures in the cache
    pub fn len(&self) -> usize {
        self.signatures.lock().values().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drops the cache's references, signatures stay alive while pipelines or command buffers hold them
    pub fn clear(&self) {
        self.signatures.lock().clear();
    }
}

/// Mutable signature description owned by a pipeline state. Every mutation marks the builder
/// dirty, the native signature is looked up or built by `resolve` on first use after that.
pub struct SignatureBuilder<D: Device> {
    desc: SignatureDesc,
    resolved: Option<Arc<BindingSignature<D>>>,
    dirty: bool
}

impl<D> Default for SignatureBuilder<D> where D: Device {
    fn default() -> Self {
        Self::new(SignatureDesc::default())
    }
}

impl<D> SignatureBuilder<D> where D: Device {
    pub fn new(desc: SignatureDesc) -> Self {
        SignatureBuilder {
            desc,
            resolved: None,
            dirty: true
        }
    }

    pub fn desc(&self) -> &SignatureDesc {
        &self.desc
    }

    /// Mutable access to the whole description, marks the builder dirty
    pub fn desc_mut(&mut self) -> &mut SignatureDesc {
        self.dirty = true;
        &mut self.desc
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn push_slot(&mut self, slot_type: SlotType, visibility: ShaderVisibility) -> u32 {
        self.dirty = true;
        self.desc.slots.push(SignatureSlot {
            slot_type,
            visibility
        });
        (self.desc.slots.len() - 1) as u32
    }

    /// Adds a descriptor table, returns its slot index
    pub fn add_table(&mut self, ranges: Vec<DescriptorRange>, visibility: ShaderVisibility) -> u32 {
        self.push_slot(SlotType::Table(ranges), visibility)
    }

    pub fn add_constants(&mut self, num_values: u32, register: u32, space: u32, visibility: ShaderVisibility) -> u32 {
        self.push_slot(SlotType::Constants { num_values, register, space }, visibility)
    }

    pub fn add_constant_buffer(&mut self, register: u32, space: u32, visibility: ShaderVisibility) -> u32 {
        self.push_slot(SlotType::ConstantBuffer { register, space }, visibility)
    }

    pub fn add_shader_resource(&mut self, register: u32, space: u32, visibility: ShaderVisibility) -> u32 {
        self.push_slot(SlotType::ShaderResource { register, space }, visibility)
    }

    pub fn add_unordered_access(&mut self, register: u32, space: u32, visibility: ShaderVisibility) -> u32 {
        self.push_slot(SlotType::UnorderedAccess { register, space }, visibility)
    }

    pub fn add_static_sampler(&mut self, sampler: StaticSampler) {
        self.dirty = true;
        self.desc.static_samplers.push(sampler);
    }

    pub fn set_flags(&mut self, flags: SignatureFlags) {
        self.dirty = true;
        self.desc.flags = flags;
    }

    /// Returns the native signature for the current description, rebuilding only if dirty.
    /// A failed build is remembered until the next mutation.
    pub fn resolve(&mut self, cache: &BindingSignatureCache<D>) -> Option<Arc<BindingSignature<D>>> {
        if self.dirty {
            self.resolved = cache.get_or_create(&self.desc);
            self.dirty = false;
        }
        self.resolved.clone()
    }
}
