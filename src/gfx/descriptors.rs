use crate::Error;

use super::CpuDescriptor;
use super::DescriptorHeap;
use super::DescriptorHeapType;
use super::Device;
use super::SamplerInfo;

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::sync::Arc;

/// A single descriptor allocated from a `CpuDescriptorAllocator`, the slot is recycled on drop
pub struct DescriptorAllocation {
    handle: CpuDescriptor,
    heap_type: DescriptorHeapType,
    free_list: Arc<Mutex<Vec<CpuDescriptor>>>
}

impl DescriptorAllocation {
    pub fn handle(&self) -> CpuDescriptor {
        self.handle
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }
}

impl Drop for DescriptorAllocation {
    fn drop(&mut self) {
        self.free_list.lock().push(self.handle);
    }
}

impl std::fmt::Debug for DescriptorAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DescriptorAllocation({:?}, {:?})", self.heap_type, self.handle)
    }
}

/// A sampler descriptor written into a cpu heap, staged into sampler tables by command buffers
#[derive(Clone)]
pub struct Sampler {
    info: SamplerInfo,
    allocation: Arc<DescriptorAllocation>
}

impl Sampler {
    pub fn new(info: SamplerInfo, allocation: DescriptorAllocation) -> Self {
        Sampler {
            info,
            allocation: Arc::new(allocation)
        }
    }

    pub fn info(&self) -> &SamplerInfo {
        &self.info
    }

    pub fn handle(&self) -> CpuDescriptor {
        self.allocation.handle()
    }

    /// Shared ownership of the descriptor slot, held by command buffers until retirement
    pub fn allocation(&self) -> &Arc<DescriptorAllocation> {
        &self.allocation
    }
}

/// Allocates single descriptors from non shader visible heaps. Views of resources and samplers
/// are written here and later copied into shader visible heaps by `DynamicDescriptorHeap`.
/// When every slot is in use another heap of `heap_size` descriptors is created.
pub struct CpuDescriptorAllocator<D: Device> {
    device: Arc<D>,
    heap_type: DescriptorHeapType,
    heap_size: u32,
    heaps: Mutex<Vec<D::DescriptorHeap>>,
    free_list: Arc<Mutex<Vec<CpuDescriptor>>>
}

impl<D> CpuDescriptorAllocator<D> where D: Device {
    pub fn new(device: Arc<D>, heap_type: DescriptorHeapType, heap_size: u32) -> Self {
        CpuDescriptorAllocator {
            device,
            heap_type,
            heap_size: heap_size.max(1),
            heaps: Mutex::new(Vec::new()),
            free_list: Arc::new(Mutex::new(Vec::new()))
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn allocate(&self) -> Result<DescriptorAllocation, Error> {
        if let Some(handle) = self.free_list.lock().pop() {
            return Ok(self.make_allocation(handle));
        }

        // grow by a whole heap, hand out the first slot and keep the rest for later
        let heap = self.device.create_descriptor_heap(self.heap_type, self.heap_size, false)?;
        let increment = self.device.descriptor_increment_size(self.heap_type);
        let start = heap.cpu_start();
        {
            let mut free_list = self.free_list.lock();
            for i in (1..self.heap_size).rev() {
                free_list.push(start.offset(i, increment));
            }
        }
        self.heaps.lock().push(heap);
        tracing::debug!(
            "hotline_gfx::descriptors: created cpu heap {:?} with {} descriptors", self.heap_type, self.heap_size
        );
        Ok(self.make_allocation(start))
    }

    fn make_allocation(&self, handle: CpuDescriptor) -> DescriptorAllocation {
        DescriptorAllocation {
            handle,
            heap_type: self.heap_type,
            free_list: self.free_list.clone()
        }
    }

    pub fn num_heaps(&self) -> usize {
        self.heaps.lock().len()
    }

    pub fn num_free(&self) -> usize {
        self.free_list.lock().len()
    }
}

/// A shader visible heap owned by a `DescriptorHeapPool`
pub struct PooledHeap<D: Device> {
    id: usize,
    heap: D::DescriptorHeap
}

impl<D> PooledHeap<D> where D: Device {
    /// Index of the heap within its pool, stable for the lifetime of the pool
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn native(&self) -> &D::DescriptorHeap {
        &self.heap
    }

    pub fn capacity(&self) -> u32 {
        self.heap.capacity()
    }
}

struct HeapPoolInner<D: Device> {
    heaps: Vec<Arc<PooledHeap<D>>>,
    available: VecDeque<Arc<PooledHeap<D>>>
}

/// Process wide pool of shader visible heaps of one type. The pool only grows; heaps are
/// recycled once the command buffers which wrote into them have been retired.
pub struct DescriptorHeapPool<D: Device> {
    device: Arc<D>,
    heap_type: DescriptorHeapType,
    capacity: u32,
    inner: Mutex<HeapPoolInner<D>>
}

impl<D> DescriptorHeapPool<D> where D: Device {
    pub fn new(device: Arc<D>, heap_type: DescriptorHeapType, capacity: u32) -> Self {
        DescriptorHeapPool {
            device,
            heap_type,
            capacity: capacity.max(1),
            inner: Mutex::new(HeapPoolInner {
                heaps: Vec::new(),
                available: VecDeque::new()
            })
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    /// Number of descriptors in each heap of the pool
    pub fn heap_capacity(&self) -> u32 {
        self.capacity
    }

    /// Pops an available heap or creates a new one
    pub fn request(&self) -> Result<Arc<PooledHeap<D>>, Error> {
        let mut inner = self.inner.lock();
        if let Some(heap) = inner.available.pop_front() {
            return Ok(heap);
        }

        let heap = self.device.create_descriptor_heap(self.heap_type, self.capacity, true)
            .map_err(|err| {
                tracing::error!("hotline_gfx::descriptors: failed to create shader visible heap: {}", err);
                err
            })?;
        let pooled = Arc::new(PooledHeap {
            id: inner.heaps.len(),
            heap
        });
        inner.heaps.push(pooled.clone());
        tracing::debug!(
            "hotline_gfx::descriptors: shader visible {:?} pool grew to {} heaps", self.heap_type, inner.heaps.len()
        );
        Ok(pooled)
    }

    /// Returns heaps to the pool, the caller guarantees the gpu no longer references them
    pub fn release<I: IntoIterator<Item = Arc<PooledHeap<D>>>>(&self, heaps: I) {
        let mut inner = self.inner.lock();
        inner.available.extend(heaps);
    }

    pub fn num_heaps(&self) -> usize {
        self.inner.lock().heaps.len()
    }

    pub fn num_available(&self) -> usize {
        self.inner.lock().available.len()
    }
}
