use crate::Error;

use super::Device;
use super::GpuAddress;

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::Arc;

/// Default size of a transient page
pub const DEFAULT_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Gpu addresses of pages are aligned to this, oversized pages are rounded up to it
pub const PAGE_ALIGNMENT: usize = 64 * 1024;

/// Alignment required for constant buffer views
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Round `value` up to the nearest multiple of `alignment` which must be a power of two
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    match value.checked_add(mask) {
        Some(v) => v & !mask,
        None => u64::MAX & !mask
    }
}

/// A block of gpu visible, cpu writable memory which stays mapped for its whole lifetime
pub struct TransientPage<D: Device> {
    id: usize,
    resource: D::Resource,
    cpu: NonNull<u8>,
    gpu: GpuAddress,
    size: usize
}

// the mapped pointer is only written through `UploadAllocation` ranges which never overlap
unsafe impl<D: Device> Send for TransientPage<D> {}
unsafe impl<D: Device> Sync for TransientPage<D> {}

impl<D> TransientPage<D> where D: Device {
    /// Index of the page within the pool which created it
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn native(&self) -> &D::Resource {
        &self.resource
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn gpu_address(&self) -> GpuAddress {
        self.gpu
    }

    /// Offset of the first byte at or after `offset` that fits `size` bytes aligned to `alignment`
    fn fit(&self, offset: usize, size: usize, alignment: usize) -> Option<usize> {
        let aligned = align_up(self.gpu + offset as u64, alignment as u64) - self.gpu;
        let end = aligned.checked_add(size as u64)?;
        if end <= self.size as u64 {
            Some(aligned as usize)
        }
        else {
            None
        }
    }
}

struct PagePoolInner<D: Device> {
    released: Vec<Arc<TransientPage<D>>>,
    created: usize
}

/// Process wide source of transient pages shared by every `TransientAllocator`.
/// Pages are never freed while the pool lives, allocators hand them back when they drop.
pub struct PagePool<D: Device> {
    device: Arc<D>,
    page_size: usize,
    inner: Mutex<PagePoolInner<D>>
}

impl<D> PagePool<D> where D: Device {
    pub fn new(device: Arc<D>, page_size: usize) -> Self {
        PagePool {
            device,
            page_size: (align_up(page_size.max(1) as u64, PAGE_ALIGNMENT as u64)) as usize,
            inner: Mutex::new(PagePoolInner {
                released: Vec::new(),
                created: 0
            })
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns a page with at least `min_size` bytes, reusing a released page where possible
    pub fn acquire(&self, min_size: usize) -> Result<Arc<TransientPage<D>>, Error> {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.released.iter().position(|page| page.size >= min_size) {
            return Ok(inner.released.swap_remove(pos));
        }

        let size = self.page_size.max(align_up(min_size as u64, PAGE_ALIGNMENT as u64) as usize);
        let mem = self.device.create_upload_page(size).map_err(|err| {
            tracing::error!("hotline_gfx::upload: failed to create {} byte page: {}", size, err);
            err
        })?;
        let page = Arc::new(TransientPage {
            id: inner.created,
            resource: mem.resource,
            cpu: mem.cpu,
            gpu: mem.gpu,
            size: mem.size
        });
        inner.created += 1;
        tracing::debug!("hotline_gfx::upload: created page {} ({} bytes)", page.id, page.size);
        Ok(page)
    }

    /// Returns pages to the pool for use by other allocators
    pub fn release<I: IntoIterator<Item = Arc<TransientPage<D>>>>(&self, pages: I) {
        self.inner.lock().released.extend(pages);
    }

    /// Total number of pages created by the device for this pool
    pub fn num_pages_created(&self) -> usize {
        self.inner.lock().created
    }

    pub fn num_pages_released(&self) -> usize {
        self.inner.lock().released.len()
    }
}

/// A range of transient memory returned by `TransientAllocator::allocate`, valid until the
/// allocator is freed at the start of the next recording cycle.
pub struct UploadAllocation<D: Device> {
    page: Arc<TransientPage<D>>,
    offset: usize,
    size: usize
}

impl<D> UploadAllocation<D> where D: Device {
    pub fn cpu_ptr(&self) -> NonNull<u8> {
        // in bounds: offset + size <= page size
        unsafe { NonNull::new_unchecked(self.page.cpu.as_ptr().add(self.offset)) }
    }

    pub fn gpu_address(&self) -> GpuAddress {
        self.page.gpu + self.offset as u64
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of the allocation within its page
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page(&self) -> &Arc<TransientPage<D>> {
        &self.page
    }

    /// Copies `data` to the start of the allocation, truncated to the allocation size.
    /// Returns the number of bytes written.
    pub fn write(&self, data: &[u8]) -> usize {
        let len = data.len().min(self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.cpu_ptr().as_ptr(), len);
        }
        len
    }

    /// Copies a slice of plain data to the start of the allocation
    pub fn write_slice<T: Copy>(&self, data: &[T]) -> usize {
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        self.write(bytes)
    }
}

/// Linear allocator over transient pages owned by a single command buffer.
///
/// Allocations inside a page never overlap and are aligned against the page gpu address.
/// When the current page is exhausted a page is taken from the available queue, or from the
/// shared pool. `free` must only be called once the gpu has consumed the previous cycle.
pub struct TransientAllocator<D: Device> {
    pool: Arc<PagePool<D>>,
    current: Option<Arc<TransientPage<D>>>,
    offset: usize,
    used: Vec<Arc<TransientPage<D>>>,
    available: VecDeque<Arc<TransientPage<D>>>,
    pages: Vec<Arc<TransientPage<D>>>
}

impl<D> TransientAllocator<D> where D: Device {
    pub fn new(pool: Arc<PagePool<D>>) -> Self {
        TransientAllocator {
            pool,
            current: None,
            offset: 0,
            used: Vec::new(),
            available: VecDeque::new(),
            pages: Vec::new()
        }
    }

    /// Allocates `size` bytes aligned to `alignment`, which must be a power of two.
    /// A size of 0 is valid and returns a range with no usable bytes.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<UploadAllocation<D>, Error> {
        if !alignment.is_power_of_two() {
            return Err(Error::InvalidAlignment(alignment));
        }

        if let Some(page) = &self.current {
            if let Some(offset) = page.fit(self.offset, size, alignment) {
                self.offset = offset + size;
                return Ok(UploadAllocation {
                    page: page.clone(),
                    offset,
                    size
                });
            }
        }

        // pages are aligned to PAGE_ALIGNMENT so larger alignments need slack
        let min_size = if alignment > PAGE_ALIGNMENT {
            size + alignment
        }
        else {
            size
        };

        let page = self.request_page(min_size)?;
        let offset = page.fit(0, size, alignment).ok_or_else(|| {
            Error::ResourceCreation(format!("transient page of {} bytes cannot fit {} bytes", page.size, size))
        })?;

        self.used.push(page.clone());
        self.current = Some(page.clone());
        self.offset = offset + size;
        Ok(UploadAllocation {
            page,
            offset,
            size
        })
    }

    /// Takes the first available page with at least `min_size` bytes, or acquires one from the pool
    pub fn request_page(&mut self, min_size: usize) -> Result<Arc<TransientPage<D>>, Error> {
        if let Some(pos) = self.available.iter().position(|page| page.size >= min_size) {
            if let Some(page) = self.available.remove(pos) {
                return Ok(page);
            }
        }

        let page = self.pool.acquire(min_size)?;
        self.pages.push(page.clone());
        Ok(page)
    }

    /// Makes every page used this cycle available again and resets the cursor.
    /// Pages keep their order so the next cycle reuses the same memory.
    pub fn free(&mut self) {
        let leftover = std::mem::take(&mut self.available);
        self.available = self.used.drain(..).collect();
        self.available.extend(leftover);
        self.current = None;
        self.offset = 0;
    }

    /// Offset of the next allocation within the current page
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn current_page(&self) -> Option<&Arc<TransientPage<D>>> {
        self.current.as_ref()
    }

    /// Pages used since the last `free`, in the order they were taken
    pub fn used_pages(&self) -> &[Arc<TransientPage<D>>] {
        &self.used
    }

    pub fn num_available_pages(&self) -> usize {
        self.available.len()
    }

    /// Number of pages this allocator has taken from the shared pool
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn page_size(&self) -> usize {
        self.pool.page_size()
    }
}

impl<D> Drop for TransientAllocator<D> where D: Device {
    fn drop(&mut self) {
        self.current = None;
        self.used.clear();
        self.available.clear();
        self.pool.release(self.pages.drain(..));
    }
}
