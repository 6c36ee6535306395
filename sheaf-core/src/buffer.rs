use std::ptr::NonNull;
use std::sync::Arc;

use crate::errors::Result;
use crate::pool::{default_memory_pool, MemoryPool, ALIGNMENT};
use crate::util::bit_util;

/// A resizable, 64-byte aligned byte buffer that distinguishes `capacity`
/// (allocation size) from `len` (bytes in use). Growth rounds the requested
/// capacity up to the next power of two; shrinking the length keeps the
/// allocation.
///
/// The buffer exclusively owns its allocation. Freeze into a [`Buffer`] to
/// share a read-only view via reference counting.
pub struct ResizableBuffer {
    pool: Arc<MemoryPool>,
    ptr: NonNull<u8>,
    capacity: usize,
    len: usize,
}

// The raw pointer is exclusively owned, so moving across threads is fine.
unsafe impl Send for ResizableBuffer {}
unsafe impl Sync for ResizableBuffer {}

impl ResizableBuffer {
    pub fn new(pool: Arc<MemoryPool>) -> Self {
        Self {
            pool,
            ptr: NonNull::dangling(),
            capacity: 0,
            len: 0,
        }
    }

    pub fn with_capacity(pool: Arc<MemoryPool>, capacity: usize) -> Result<Self> {
        let mut buf = Self::new(pool);
        buf.reserve_capacity(capacity)?;
        Ok(buf)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut buf = Self::with_capacity(default_memory_pool(), data.len())?;
        buf.append(data)?;
        Ok(buf)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// View the used bytes as a primitive slice. The length must be an exact
    /// multiple of the primitive size.
    pub fn typed<T: bytemuck::Pod>(&self) -> &[T] {
        bytemuck::cast_slice(self.as_slice())
    }

    pub fn typed_mut<T: bytemuck::Pod>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }

    /// Grow the allocation to hold at least `capacity` bytes. Newly acquired
    /// capacity beyond `len` is zero-filled on use, not here.
    pub fn reserve_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }
        let new_capacity = bit_util::round_up_to_multiple(
            bit_util::next_power_of_two(capacity as u64) as usize,
            ALIGNMENT,
        );
        let ptr = if self.capacity == 0 {
            self.pool.allocate(new_capacity)?
        } else {
            self.pool.reallocate(self.capacity, new_capacity, self.ptr)?
        };
        self.ptr = ptr;
        self.capacity = new_capacity;
        Ok(())
    }

    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.reserve_capacity(self.len + additional)
    }

    /// Set the length to `new_len`, growing the allocation if needed and
    /// zero-filling any newly exposed suffix. Shrinks keep capacity.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.capacity {
            self.reserve_capacity(new_len)?;
        }
        if new_len > self.len {
            unsafe {
                std::ptr::write_bytes(self.ptr.as_ptr().add(self.len), 0, new_len - self.len);
            }
        }
        self.len = new_len;
        Ok(())
    }

    /// Unsafe fast path: set the length without bounds checks or zero-fill.
    /// The caller must have written `new_len` bytes and `new_len` must not
    /// exceed `capacity`.
    pub unsafe fn set_len(&mut self, new_len: usize) {
        debug_assert!(new_len <= self.capacity);
        self.len = new_len;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Zero-fill the unused region between `len` and `capacity`.
    pub fn zero_padding(&mut self) {
        if self.capacity > self.len {
            unsafe {
                std::ptr::write_bytes(
                    self.ptr.as_ptr().add(self.len),
                    0,
                    self.capacity - self.len,
                );
            }
        }
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(self.len),
                data.len(),
            );
            self.len += data.len();
        }
        Ok(())
    }

    pub fn append_n(&mut self, n: usize, value: u8) -> Result<()> {
        self.reserve(n)?;
        unsafe {
            std::ptr::write_bytes(self.ptr.as_ptr().add(self.len), value, n);
            self.len += n;
        }
        Ok(())
    }

    /// Replace the contents with `data` without shrinking capacity.
    pub fn assign(&mut self, data: &[u8]) -> Result<()> {
        self.clear();
        self.append(data)
    }

    /// Freeze into an immutable, reference-counted view.
    pub fn freeze(self) -> Buffer {
        Buffer {
            inner: Arc::new(self),
        }
    }
}

impl Drop for ResizableBuffer {
    fn drop(&mut self) {
        if self.capacity > 0 {
            self.pool.free(self.ptr, self.capacity);
        }
    }
}

impl std::fmt::Debug for ResizableBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizableBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Immutable shared view over a frozen [`ResizableBuffer`]. Clones share the
/// underlying allocation.
#[derive(Clone, Debug)]
pub struct Buffer {
    inner: Arc<ResizableBuffer>,
}

impl Buffer {
    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn typed<T: bytemuck::Pod>(&self) -> &[T] {
        self.inner.typed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::default_memory_pool;

    #[test]
    fn test_append_and_grow() {
        let mut buf = ResizableBuffer::new(default_memory_pool());
        buf.append(&[1, 2, 3]).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        let cap = buf.capacity();
        assert_eq!(cap % ALIGNMENT, 0);
        buf.append_n(cap, 7).unwrap();
        assert!(buf.capacity() >= cap + 3);
        assert_eq!(buf.len(), cap + 3);
    }

    #[test]
    fn test_resize_zero_fills() {
        let mut buf = ResizableBuffer::new(default_memory_pool());
        buf.append(&[0xff; 16]).unwrap();
        buf.resize(8).unwrap();
        buf.resize(32).unwrap();
        assert_eq!(&buf.as_slice()[..8], &[0xff; 8]);
        assert_eq!(&buf.as_slice()[8..], &[0; 24]);
    }

    #[test]
    fn test_shrink_keeps_capacity() {
        let mut buf = ResizableBuffer::with_capacity(default_memory_pool(), 1024).unwrap();
        buf.append_n(1024, 1).unwrap();
        let cap = buf.capacity();
        buf.resize(10).unwrap();
        assert_eq!(buf.capacity(), cap);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_typed_views() {
        let mut buf = ResizableBuffer::new(default_memory_pool());
        buf.append(&42u32.to_le_bytes()).unwrap();
        buf.append(&7u32.to_le_bytes()).unwrap();
        assert_eq!(buf.typed::<u32>(), &[42, 7]);
        buf.typed_mut::<u32>()[0] = 1;
        assert_eq!(buf.typed::<u32>(), &[1, 7]);
    }

    #[test]
    fn test_freeze_shares() {
        let mut buf = ResizableBuffer::new(default_memory_pool());
        buf.append(b"shared").unwrap();
        let a = buf.freeze();
        let b = a.clone();
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
