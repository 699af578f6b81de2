use crate::Error;

use super::CmdList;
use super::CpuDescriptor;
use super::DescriptorHeap;
use super::DescriptorHeapType;
use super::Device;
use super::PipelineKind;
use super::descriptors::DescriptorHeapPool;
use super::descriptors::PooledHeap;
use super::signature::APPEND;
use super::signature::DescriptorRangeType;
use super::signature::SignatureDesc;
use super::signature::SlotType;

use std::sync::Arc;

/// Maximum number of slots in a binding signature
pub const MAX_SLOTS: usize = 32;

/// Maximum number of descriptor ranges in a single table slot
pub const MAX_RANGES_PER_SLOT: usize = 8;

/// Maximum number of descriptors which can be staged per pipeline kind and heap type
pub const MAX_DESCRIPTORS_PER_SIGNATURE: usize = 1024;

/// Shape of one range of a table slot, offsets are relative to the start of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedRange {
    pub range_type: DescriptorRangeType,
    pub offset: u32,
    pub count: u32
}

#[derive(Debug, Clone, Default)]
struct SlotCache {
    /// Index of the first handle of this slot in the flat handle cache
    base: usize,
    capacity: u32,
    ranges: Vec<StagedRange>,
    /// Number of handles from the start of the table that have been written since the last reset
    extent: u32,
    stale: bool
}

/// Cpu descriptor handles staged for the table slots of one pipeline kind and heap type.
///
/// Each table slot owns a contiguous region of a flat handle cache sized from the ranges of the
/// bound signature. Staging overwrites handles in place and marks the slot stale until the next
/// copy into a shader visible heap.
pub struct DescriptorStagingTable {
    heap_type: DescriptorHeapType,
    kind: PipelineKind,
    handles: Vec<CpuDescriptor>,
    slots: Vec<Option<SlotCache>>,
    used: usize
}

impl DescriptorStagingTable {
    pub fn new(heap_type: DescriptorHeapType, kind: PipelineKind) -> Self {
        DescriptorStagingTable {
            heap_type,
            kind,
            handles: vec![CpuDescriptor::default(); MAX_DESCRIPTORS_PER_SIGNATURE],
            slots: vec![None; MAX_SLOTS],
            used: 0
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Derives the table layout of this heap type from `desc`, dropping anything staged before
    pub fn parse_signature(&mut self, desc: &SignatureDesc) {
        self.reset();
        let mut base = 0;
        for (i, slot) in desc.slots.iter().enumerate() {
            let ranges = match &slot.slot_type {
                SlotType::Table(ranges) => ranges,
                _ => continue
            };
            if ranges.is_empty() || ranges[0].range_type.heap_type() != self.heap_type {
                continue;
            }
            if i >= MAX_SLOTS {
                tracing::error!(
                    "hotline_gfx::dynamic_heap: slot {} is beyond the maximum of {} slots", i, MAX_SLOTS
                );
                break;
            }
            if ranges.len() > MAX_RANGES_PER_SLOT {
                tracing::error!(
                    "hotline_gfx::dynamic_heap: slot {} has {} ranges, only the first {} are staged",
                    i, ranges.len(), MAX_RANGES_PER_SLOT
                );
            }

            let mut staged_ranges = Vec::new();
            let mut next = 0u32;
            for range in ranges.iter().take(MAX_RANGES_PER_SLOT) {
                let offset = if range.offset == APPEND { next } else { range.offset };
                staged_ranges.push(StagedRange {
                    range_type: range.range_type,
                    offset,
                    count: range.count
                });
                next = offset.saturating_add(range.count);
            }
            let capacity = staged_ranges.iter().map(|r| r.offset.saturating_add(r.count)).max().unwrap_or(0);

            if base + capacity as usize > MAX_DESCRIPTORS_PER_SIGNATURE {
                tracing::error!(
                    "hotline_gfx::dynamic_heap: table at slot {} needs {} descriptors, {} of {} already used",
                    i, capacity, base, MAX_DESCRIPTORS_PER_SIGNATURE
                );
                continue;
            }

            self.slots[i] = Some(SlotCache {
                base,
                capacity,
                ranges: staged_ranges,
                extent: 0,
                stale: false
            });
            base += capacity as usize;
        }
        self.used = base;
    }

    /// Writes `descriptors` into the table at `slot` starting `offset` descriptors from the start
    /// of the table. Earlier content at the same positions is overwritten.
    /// Returns false and stages nothing on misuse.
    pub fn stage(&mut self, slot: u32, offset: u32, descriptors: &[CpuDescriptor]) -> bool {
        let cache = match self.slots.get_mut(slot as usize).and_then(|s| s.as_mut()) {
            Some(cache) => cache,
            None => {
                tracing::error!(
                    "hotline_gfx::dynamic_heap: {:?} slot {} is not a {:?} table in the bound signature",
                    self.kind, slot, self.heap_type
                );
                return false;
            }
        };

        let end = offset as usize + descriptors.len();
        if end > cache.capacity as usize {
            tracing::error!(
                "hotline_gfx::dynamic_heap: staging {} descriptors at offset {} overflows {:?} slot {} with {} descriptors",
                descriptors.len(), offset, self.kind, slot, cache.capacity
            );
            return false;
        }
        if descriptors.is_empty() {
            return true;
        }

        let start = cache.base + offset as usize;
        self.handles[start..start + descriptors.len()].copy_from_slice(descriptors);
        cache.extent = cache.extent.max(end as u32);
        cache.stale = true;
        true
    }

    /// Returns true if `slot` is a table of this heap type in the parsed signature
    pub fn is_table(&self, slot: u32) -> bool {
        matches!(self.slots.get(slot as usize), Some(Some(_)))
    }

    /// Number of descriptors in the table at `slot`
    pub fn slot_capacity(&self, slot: u32) -> Option<u32> {
        self.slots.get(slot as usize)?.as_ref().map(|s| s.capacity)
    }

    pub fn slot_ranges(&self, slot: u32) -> Option<&[StagedRange]> {
        self.slots.get(slot as usize)?.as_ref().map(|s| s.ranges.as_slice())
    }

    /// Type of the range covering descriptor `offset` of the table at `slot`
    pub fn range_type_at(&self, slot: u32, offset: u32) -> Option<DescriptorRangeType> {
        self.slot_ranges(slot)?
            .iter()
            .find(|r| offset >= r.offset && offset - r.offset < r.count)
            .map(|r| r.range_type)
    }

    /// Handles staged at `slot` from the start of the table up to the staged extent
    pub fn staged(&self, slot: u32) -> Option<&[CpuDescriptor]> {
        let cache = self.slots.get(slot as usize)?.as_ref()?;
        Some(&self.handles[cache.base..cache.base + cache.extent as usize])
    }

    pub fn is_stale(&self, slot: u32) -> bool {
        matches!(self.slots.get(slot as usize), Some(Some(cache)) if cache.stale)
    }

    /// Total descriptors that the next copy must write
    pub fn stale_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.stale)
            .map(|s| s.extent as usize)
            .sum()
    }

    /// Number of handles of the flat cache reserved by the parsed signature
    pub fn num_reserved(&self) -> usize {
        self.used
    }

    /// Stale slots in slot order as `(slot, handles)`
    pub fn stale_slots(&self) -> impl Iterator<Item = (u32, &[CpuDescriptor])> {
        self.slots.iter().enumerate().filter_map(move |(i, s)| match s {
            Some(cache) if cache.stale && cache.extent > 0 => {
                Some((i as u32, &self.handles[cache.base..cache.base + cache.extent as usize]))
            }
            _ => None
        })
    }

    /// Marks every slot which has staged content stale, used when the tables must move to a new heap
    pub fn mark_staged_stale(&mut self) {
        for cache in self.slots.iter_mut().flatten() {
            if cache.extent > 0 {
                cache.stale = true;
            }
        }
    }

    pub fn clear_stale(&mut self) {
        for cache in self.slots.iter_mut().flatten() {
            cache.stale = false;
        }
    }

    /// Forgets the parsed layout and everything staged. Handles outside the reserved region are
    /// always null, so gaps in a later table copy as null descriptors.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.handles[..self.used].fill(CpuDescriptor::default());
        self.used = 0;
    }
}

/// Copies staged descriptors of one shader visible heap type into heaps drawn from a shared
/// `DescriptorHeapPool` and binds the resulting tables before each draw or dispatch.
///
/// Heaps used during a recording cycle are kept in a list so they stay alive until `free`,
/// which hands them back to the pool once the gpu is done with them.
pub struct DynamicDescriptorHeap<D: Device> {
    heap_type: DescriptorHeapType,
    device: Arc<D>,
    pool: Arc<DescriptorHeapPool<D>>,
    increment: usize,
    tables: [DescriptorStagingTable; PipelineKind::COUNT],
    current: Option<Arc<PooledHeap<D>>>,
    cursor: u32,
    used: Vec<Arc<PooledHeap<D>>>
}

impl<D> DynamicDescriptorHeap<D> where D: Device {
    pub fn new(device: Arc<D>, pool: Arc<DescriptorHeapPool<D>>) -> Self {
        let heap_type = pool.heap_type();
        let increment = device.descriptor_increment_size(heap_type);
        DynamicDescriptorHeap {
            heap_type,
            device,
            pool,
            increment,
            tables: [
                DescriptorStagingTable::new(heap_type, PipelineKind::Compute),
                DescriptorStagingTable::new(heap_type, PipelineKind::Graphics)
            ],
            current: None,
            cursor: 0,
            used: Vec::new()
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn table(&self, kind: PipelineKind) -> &DescriptorStagingTable {
        &self.tables[kind.index()]
    }

    /// Re-derives the tables for `kind`, prior staged state for `kind` is invalidated
    pub fn set_binding_signature(&mut self, kind: PipelineKind, desc: &SignatureDesc) {
        self.tables[kind.index()].parse_signature(desc);
    }

    pub fn stage(&mut self, kind: PipelineKind, slot: u32, offset: u32, descriptors: &[CpuDescriptor]) -> bool {
        self.tables[kind.index()].stage(slot, offset, descriptors)
    }

    /// Copies every stale table of `kind` contiguously into the current heap and binds the table
    /// base handles on `cmd_list`. Returns the number of descriptors copied.
    pub fn copy_and_bind_staged(&mut self, kind: PipelineKind, cmd_list: &mut D::CmdList) -> Result<usize, Error> {
        let mut total = self.tables[kind.index()].stale_count();
        if total == 0 {
            return Ok(0);
        }

        let has_room = match &self.current {
            Some(heap) => self.cursor as usize + total <= heap.capacity() as usize,
            None => false
        };

        if !has_room {
            let heap = self.pool.request()?;
            cmd_list.set_descriptor_heap(self.heap_type, heap.native());
            tracing::trace!(
                "hotline_gfx::dynamic_heap: bound {:?} heap {} after {} descriptors", self.heap_type, heap.id(), self.cursor
            );
            self.used.push(heap.clone());
            self.current = Some(heap);
            self.cursor = 0;

            // tables in the previous heap are no longer reachable for either pipeline kind
            for table in &mut self.tables {
                table.mark_staged_stale();
            }
            total = self.tables[kind.index()].stale_count();
        }

        let heap = match &self.current {
            Some(heap) => heap.clone(),
            None => return Ok(0)
        };
        if total > heap.capacity() as usize {
            tracing::error!(
                "hotline_gfx::dynamic_heap: {} descriptors do not fit in a {:?} heap of {}",
                total, self.heap_type, heap.capacity()
            );
            return Err(Error::InvalidState(format!(
                "{} staged descriptors exceed the heap capacity of {}", total, heap.capacity()
            )));
        }

        let gpu_start = heap.native().gpu_start();
        let table = &mut self.tables[kind.index()];
        for (slot, handles) in table.stale_slots() {
            self.device.copy_descriptors(self.heap_type, heap.native(), self.cursor, handles);
            cmd_list.set_descriptor_table(kind, slot, gpu_start.offset(self.cursor, self.increment));
            self.cursor += handles.len() as u32;
        }
        table.clear_stale();
        Ok(total)
    }

    /// Returns every heap used this cycle to the pool and drops all staged state
    pub fn free(&mut self) {
        self.current = None;
        self.cursor = 0;
        self.pool.release(self.used.drain(..));
        for table in &mut self.tables {
            table.reset();
        }
    }

    /// Write cursor within the current heap
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn current_heap(&self) -> Option<&Arc<PooledHeap<D>>> {
        self.current.as_ref()
    }

    /// Heaps used since the last `free`
    pub fn used_heaps(&self) -> &[Arc<PooledHeap<D>>] {
        &self.used
    }
}

impl<D> Drop for DynamicDescriptorHeap<D> where D: Device {
    fn drop(&mut self) {
        self.current = None;
        self.pool.release(self.used.drain(..));
    }
}
