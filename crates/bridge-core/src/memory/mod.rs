//! Byte-range access to the target address space.
//!
//! [`MemoryInterface`] is the contract shared by every variant: raw
//! [`read`](MemoryInterface::read)/[`write`](MemoryInterface::write) plus
//! fixed-width typed accessors that reinterpret bytes in host byte order.

/// Bounds-checked in-process memory window.
pub mod blob;
/// Memory access split into aligned transfers over a chunk transport.
pub mod chunked;

pub use blob::BlobMemory;
pub use chunked::{ChunkTransport, ChunkedMemory};

use crate::error::MemoryError;

/// Read/write access to target memory.
///
/// Implementations report failures before copying anything, so a failed call
/// leaves both the caller's buffer and target memory untouched. The default
/// typed accessors wider than one byte additionally reject addresses that are
/// not a multiple of their width with [`MemoryError::Misaligned`].
#[allow(clippy::missing_errors_doc)]
pub trait MemoryInterface {
    /// Copies `bytes.len()` bytes starting at `addr` into `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the variant-specific [`MemoryError`] when the range cannot be
    /// read.
    fn read(&mut self, addr: u64, bytes: &mut [u8]) -> Result<(), MemoryError>;

    /// Copies `bytes` into target memory starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns the variant-specific [`MemoryError`] when the range cannot be
    /// written.
    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Reads an unsigned byte.
    fn read_u8(&mut self, addr: u64) -> Result<u8, MemoryError> {
        read_array(self, addr).map(u8::from_ne_bytes)
    }

    /// Reads a signed byte.
    fn read_i8(&mut self, addr: u64) -> Result<i8, MemoryError> {
        read_array(self, addr).map(i8::from_ne_bytes)
    }

    /// Reads an unsigned 16-bit value.
    fn read_u16(&mut self, addr: u64) -> Result<u16, MemoryError> {
        read_array(self, addr).map(u16::from_ne_bytes)
    }

    /// Reads a signed 16-bit value.
    fn read_i16(&mut self, addr: u64) -> Result<i16, MemoryError> {
        read_array(self, addr).map(i16::from_ne_bytes)
    }

    /// Reads an unsigned 32-bit value.
    fn read_u32(&mut self, addr: u64) -> Result<u32, MemoryError> {
        read_array(self, addr).map(u32::from_ne_bytes)
    }

    /// Reads a signed 32-bit value.
    fn read_i32(&mut self, addr: u64) -> Result<i32, MemoryError> {
        read_array(self, addr).map(i32::from_ne_bytes)
    }

    /// Reads an unsigned 64-bit value.
    fn read_u64(&mut self, addr: u64) -> Result<u64, MemoryError> {
        read_array(self, addr).map(u64::from_ne_bytes)
    }

    /// Reads a signed 64-bit value.
    fn read_i64(&mut self, addr: u64) -> Result<i64, MemoryError> {
        read_array(self, addr).map(i64::from_ne_bytes)
    }

    /// Writes an unsigned byte.
    fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes a signed byte.
    fn write_i8(&mut self, addr: u64, value: i8) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes an unsigned 16-bit value.
    fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes a signed 16-bit value.
    fn write_i16(&mut self, addr: u64, value: i16) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes an unsigned 32-bit value.
    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes a signed 32-bit value.
    fn write_i32(&mut self, addr: u64, value: i32) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes an unsigned 64-bit value.
    fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }

    /// Writes a signed 64-bit value.
    fn write_i64(&mut self, addr: u64, value: i64) -> Result<(), MemoryError> {
        write_array(self, addr, value.to_ne_bytes())
    }
}

/// Memory interface that moves no data and never fails.
///
/// Used where a consumer requires an interface but memory access is known to
/// be unnecessary. Reads leave the destination buffer unchanged, and typed
/// reads return zero at any address, aligned or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullMemory;

impl MemoryInterface for NullMemory {
    fn read(&mut self, _addr: u64, _bytes: &mut [u8]) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write(&mut self, _addr: u64, _bytes: &[u8]) -> Result<(), MemoryError> {
        Ok(())
    }

    fn read_u8(&mut self, _addr: u64) -> Result<u8, MemoryError> {
        Ok(0)
    }

    fn read_i8(&mut self, _addr: u64) -> Result<i8, MemoryError> {
        Ok(0)
    }

    fn read_u16(&mut self, _addr: u64) -> Result<u16, MemoryError> {
        Ok(0)
    }

    fn read_i16(&mut self, _addr: u64) -> Result<i16, MemoryError> {
        Ok(0)
    }

    fn read_u32(&mut self, _addr: u64) -> Result<u32, MemoryError> {
        Ok(0)
    }

    fn read_i32(&mut self, _addr: u64) -> Result<i32, MemoryError> {
        Ok(0)
    }

    fn read_u64(&mut self, _addr: u64) -> Result<u64, MemoryError> {
        Ok(0)
    }

    fn read_i64(&mut self, _addr: u64) -> Result<i64, MemoryError> {
        Ok(0)
    }

    fn write_u8(&mut self, _addr: u64, _value: u8) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_i8(&mut self, _addr: u64, _value: i8) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_u16(&mut self, _addr: u64, _value: u16) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_i16(&mut self, _addr: u64, _value: i16) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_u32(&mut self, _addr: u64, _value: u32) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_i32(&mut self, _addr: u64, _value: i32) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_u64(&mut self, _addr: u64, _value: u64) -> Result<(), MemoryError> {
        Ok(())
    }

    fn write_i64(&mut self, _addr: u64, _value: i64) -> Result<(), MemoryError> {
        Ok(())
    }
}

fn check_alignment(addr: u64, width: usize) -> Result<(), MemoryError> {
    if width > 1 && addr % (width as u64) != 0 {
        Err(MemoryError::Misaligned { addr, width })
    } else {
        Ok(())
    }
}

fn read_array<M, const N: usize>(memory: &mut M, addr: u64) -> Result<[u8; N], MemoryError>
where
    M: MemoryInterface + ?Sized,
{
    check_alignment(addr, N)?;
    let mut bytes = [0; N];
    memory.read(addr, &mut bytes)?;
    Ok(bytes)
}

fn write_array<M, const N: usize>(
    memory: &mut M,
    addr: u64,
    bytes: [u8; N],
) -> Result<(), MemoryError>
where
    M: MemoryInterface + ?Sized,
{
    check_alignment(addr, N)?;
    memory.write(addr, &bytes)
}
