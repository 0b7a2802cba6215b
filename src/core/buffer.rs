//! Purpose: Wire Buffer memory shared across the C ABI and its ownership rules.
//! Exports: `RustBuffer`, `ForeignBytes`, `BufferAllocator`, `LocalAllocator`.
//! Role: Foundation for every value that does not fit in one machine word.
//! Invariants: `len <= capacity`; `data` is null only for zero-capacity buffers.
//! Invariants: Memory is allocated and freed by the native side only; the host
//! routes frees through `BufferAllocator::free`, never through its own allocator.
//! Invariants: Lengths above `i32::MAX` are rejected before any read or allocation.
use crate::core::error::{Error, protocol};
use std::ptr;

/// Largest buffer length accepted by either side of the boundary.
pub const MAX_BUFFER_LEN: u64 = i32::MAX as u64;

#[repr(C)]
#[derive(Debug)]
pub struct RustBuffer {
    capacity: u64,
    len: u64,
    data: *mut u8,
}

// Ownership of the allocation moves with the value; there is no aliasing.
unsafe impl Send for RustBuffer {}
unsafe impl Sync for RustBuffer {}

impl Default for RustBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RustBuffer {
    pub const fn new() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: ptr::null_mut(),
        }
    }

    /// Rebuilds a buffer from raw parts received over the ABI.
    ///
    /// # Safety
    ///
    /// The parts must describe an allocation produced by `RustBuffer::from_vec`
    /// in the native library that will later free it.
    pub unsafe fn from_raw_parts(data: *mut u8, len: u64, capacity: u64) -> Self {
        Self {
            capacity,
            len,
            data,
        }
    }

    /// Takes ownership of `vec`'s allocation (native side only).
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let mut vec = std::mem::ManuallyDrop::new(vec);
        let capacity = vec.capacity() as u64;
        let len = vec.len() as u64;
        let data = if capacity == 0 {
            ptr::null_mut()
        } else {
            vec.as_mut_ptr()
        };
        Self {
            capacity,
            len,
            data,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn data_ptr(&self) -> *const u8 {
        self.data
    }

    /// Checks the layout invariants without touching the data.
    pub fn validate(&self) -> Result<(), Error> {
        if self.len > self.capacity {
            return Err(protocol("buffer length exceeds capacity"));
        }
        if self.len > MAX_BUFFER_LEN {
            return Err(protocol(format!(
                "cannot handle buffer longer than {MAX_BUFFER_LEN} bytes: length is {}",
                self.len
            )));
        }
        if self.data.is_null() && self.capacity != 0 {
            return Err(protocol("buffer has capacity but null data"));
        }
        Ok(())
    }

    /// Borrows the used bytes; empty and null buffers read as an empty slice.
    pub fn as_slice(&self) -> Result<&[u8], Error> {
        self.validate()?;
        if self.data.is_null() || self.len == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(self.data, self.len as usize) })
    }

    /// Returns the allocation to a `Vec` (native side only).
    pub fn destroy_into_vec(self) -> Vec<u8> {
        let buf = std::mem::ManuallyDrop::new(self);
        if buf.data.is_null() {
            return Vec::new();
        }
        let capacity = buf.capacity as usize;
        let len = (buf.len as usize).min(capacity);
        unsafe { Vec::from_raw_parts(buf.data, len, capacity) }
    }

    pub fn destroy(self) {
        drop(self.destroy_into_vec());
    }

    /// Grows the allocation by at least `additional` bytes (native side only).
    pub fn reserve(self, additional: u64) -> Result<Self, Error> {
        self.validate()?;
        let needed = self.len.saturating_add(additional);
        if needed > MAX_BUFFER_LEN {
            return Err(protocol(format!(
                "reserve would exceed {MAX_BUFFER_LEN} bytes (requested {needed})"
            )));
        }
        let mut vec = self.destroy_into_vec();
        vec.reserve(additional as usize);
        Ok(Self::from_vec(vec))
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ForeignBytes {
    len: i32,
    data: *const u8,
}

impl ForeignBytes {
    /// Views `bytes` for the duration of a single native call.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let len = i32::try_from(bytes.len())
            .map_err(|_| protocol(format!("byte run of {} bytes is too long", bytes.len())))?;
        Ok(Self {
            len,
            data: bytes.as_ptr(),
        })
    }

    pub fn len(&self) -> i32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> Result<&[u8], Error> {
        if self.len < 0 {
            return Err(protocol(format!("negative foreign byte length {}", self.len)));
        }
        if self.len == 0 {
            return Ok(&[]);
        }
        if self.data.is_null() {
            return Err(protocol("foreign bytes with length but null data"));
        }
        Ok(unsafe { std::slice::from_raw_parts(self.data, self.len as usize) })
    }
}

/// Owner of buffer memory for one side of the boundary.
pub trait BufferAllocator {
    /// Allocates a buffer holding a copy of `bytes`.
    fn alloc_from_bytes(&self, bytes: &[u8]) -> Result<RustBuffer, Error>;

    /// Releases a buffer previously produced by this allocator's library.
    fn free(&self, buf: RustBuffer) -> Result<(), Error>;

    /// Copies the contents out and frees the buffer.
    fn take_bytes(&self, buf: RustBuffer) -> Result<Vec<u8>, Error> {
        let bytes = match buf.as_slice() {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                // The data is unusable, but an in-range allocation can still be released.
                if buf.len() <= buf.capacity() {
                    if let Err(free_err) = self.free(buf) {
                        tracing::warn!(error = %free_err, "failed to free unreadable buffer");
                    }
                }
                return Err(err);
            }
        };
        self.free(buf)?;
        Ok(bytes)
    }
}

/// Allocator for code running inside the native library itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalAllocator;

impl BufferAllocator for LocalAllocator {
    fn alloc_from_bytes(&self, bytes: &[u8]) -> Result<RustBuffer, Error> {
        if bytes.len() as u64 > MAX_BUFFER_LEN {
            return Err(protocol(format!(
                "cannot allocate buffer of {} bytes",
                bytes.len()
            )));
        }
        Ok(RustBuffer::from_vec(bytes.to_vec()))
    }

    fn free(&self, buf: RustBuffer) -> Result<(), Error> {
        buf.destroy();
        Ok(())
    }

    fn take_bytes(&self, buf: RustBuffer) -> Result<Vec<u8>, Error> {
        buf.validate()?;
        Ok(buf.destroy_into_vec())
    }
}
