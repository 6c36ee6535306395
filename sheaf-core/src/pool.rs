use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::errors::Result;
use crate::general_error;

/// All pool allocations are aligned on 64 bytes so that buffers can be cast
/// to any primitive slice and stay SIMD-friendly.
pub const ALIGNMENT: usize = 64;

/// Tracks current and peak bytes handed out by a pool. Allocation itself goes
/// through the global allocator with an explicit 64-byte aligned layout.
#[derive(Debug, Default)]
pub struct MemoryPool {
    bytes_allocated: AtomicI64,
    max_memory: AtomicI64,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_allocated(&self) -> i64 {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    pub fn max_memory(&self) -> i64 {
        self.max_memory.load(Ordering::Relaxed)
    }

    pub(crate) fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Ok(NonNull::<u8>::dangling());
        }
        let layout = Layout::from_size_align(size, ALIGNMENT)
            .map_err(|e| general_error!("invalid allocation layout", e))?;
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| general_error!(format!("allocation of {} bytes failed", size)))?;
        self.update(size as i64);
        Ok(ptr)
    }

    pub(crate) fn reallocate(
        &self,
        old_size: usize,
        new_size: usize,
        ptr: NonNull<u8>,
    ) -> Result<NonNull<u8>> {
        // The global allocator's realloc does not guarantee alignment, so
        // allocate-copy-free instead.
        let out = self.allocate(new_size)?;
        if old_size > 0 && new_size > 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    ptr.as_ptr(),
                    out.as_ptr(),
                    old_size.min(new_size),
                );
            }
        }
        self.free(ptr, old_size);
        Ok(out)
    }

    pub(crate) fn free(&self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }
        let layout = Layout::from_size_align(size, ALIGNMENT).expect("layout was valid at alloc");
        unsafe { dealloc(ptr.as_ptr(), layout) };
        self.update(-(size as i64));
    }

    fn update(&self, diff: i64) {
        let current = self.bytes_allocated.fetch_add(diff, Ordering::Relaxed) + diff;
        self.max_memory.fetch_max(current, Ordering::Relaxed);
    }
}

lazy_static! {
    static ref DEFAULT_POOL: Arc<MemoryPool> = Arc::new(MemoryPool::new());
}

/// The process-wide default pool. Lazily initialized, lives until process
/// termination.
pub fn default_memory_pool() -> Arc<MemoryPool> {
    Arc::clone(&DEFAULT_POOL)
}
