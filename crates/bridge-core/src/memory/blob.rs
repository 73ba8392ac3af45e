use std::ops::Range;

use crate::error::{Access, MemoryError};
use crate::memory::MemoryInterface;

/// Fixed memory window backed by a host buffer.
///
/// Addresses are translated by subtracting `base`. An access is legal only
/// when `base <= addr` and `addr - base + len <= size`; anything else fails
/// before a single byte is copied.
///
/// `B` may own its storage (`Vec<u8>`, `Box<[u8]>`) or borrow it
/// (`&mut [u8]`), in which case the caller keeps ownership of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMemory<B> {
    blob: B,
    base: u64,
}

impl<B: AsRef<[u8]>> BlobMemory<B> {
    /// Creates a window mapping `blob` at target address `base`.
    #[must_use]
    pub const fn new(blob: B, base: u64) -> Self {
        Self { blob, base }
    }

    /// Target address of the first byte of the window.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Window size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.blob.as_ref().len()
    }

    /// Current window contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.blob.as_ref()
    }

    /// Releases the backing buffer.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.blob
    }

    fn window(&self, access: Access, addr: u64, len: usize) -> Result<Range<usize>, MemoryError> {
        let base = self.base;
        if addr < base {
            return Err(MemoryError::Underflow { access, addr, base });
        }

        let size = self.size();
        let overflow = || MemoryError::Overflow {
            access,
            addr,
            len,
            base,
            size,
        };
        let start = usize::try_from(addr - base).map_err(|_| overflow())?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= size)
            .ok_or_else(overflow)?;
        Ok(start..end)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> MemoryInterface for BlobMemory<B> {
    fn read(&mut self, addr: u64, bytes: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.window(Access::Read, addr, bytes.len())?;
        bytes.copy_from_slice(&self.blob.as_ref()[range]);
        Ok(())
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        let range = self.window(Access::Write, addr, bytes.len())?;
        self.blob.as_mut()[range].copy_from_slice(bytes);
        Ok(())
    }
}
