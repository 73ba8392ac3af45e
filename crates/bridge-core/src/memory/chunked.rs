use crate::error::{Access, MemoryError, TransportError};
use crate::memory::MemoryInterface;

/// External primitive that moves aligned chunks of target memory.
///
/// Every chunk handed to the transport starts at a multiple of
/// [`chunk_align`](Self::chunk_align), has a length that is a non-zero
/// multiple of it, and is no longer than [`chunk_max_size`](Self::chunk_max_size).
pub trait ChunkTransport {
    /// Required chunk alignment in bytes (a power of two).
    fn chunk_align(&self) -> usize;

    /// Largest chunk the transport accepts in one transfer.
    fn chunk_max_size(&self) -> usize;

    /// Reads `bytes.len()` bytes of target memory at `addr`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the transfer fails.
    fn read_chunk(&mut self, addr: u64, bytes: &mut [u8]) -> Result<(), TransportError>;

    /// Writes `bytes` to target memory at `addr`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the transfer fails.
    fn write_chunk(&mut self, addr: u64, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Memory interface that maps arbitrary byte ranges onto aligned chunk
/// transfers.
///
/// A range is split into an unaligned head, an aligned body sent in
/// transport-sized pieces, and an unaligned tail. Head and tail reads fetch
/// the enclosing aligned chunk; head and tail writes read-modify-write it.
#[derive(Debug)]
pub struct ChunkedMemory<T> {
    transport: T,
}

impl<T: ChunkTransport> ChunkedMemory<T> {
    /// Wraps `transport`.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the wrapped transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Releases the wrapped transport.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn align(&self) -> usize {
        self.transport.chunk_align().max(1)
    }

    fn max_piece(&self, align: usize) -> usize {
        let max = self.transport.chunk_max_size().max(align);
        max - max % align
    }

    fn read_aligned(&mut self, addr: u64, align: usize) -> Result<Vec<u8>, MemoryError> {
        let mut chunk = vec![0; align];
        self.transport.read_chunk(addr, &mut chunk)?;
        Ok(chunk)
    }
}

/// Rejects ranges whose last byte lies past `u64::MAX`.
fn check_range(access: Access, addr: u64, len: usize) -> Result<(), MemoryError> {
    if len == 0 {
        return Ok(());
    }
    u64::try_from(len - 1)
        .ok()
        .and_then(|extra| addr.checked_add(extra))
        .map(|_| ())
        .ok_or(MemoryError::Wraps { access, addr, len })
}

/// Splits `len` bytes at `addr` into `(head, head_end, body_end)`.
///
/// `head` is the offset of `addr` inside its aligned chunk. `[0, head_end)` is
/// the unaligned head, `[head_end, body_end)` the aligned body and
/// `[body_end, len)` the unaligned tail.
#[allow(clippy::cast_possible_truncation)]
const fn split(addr: u64, len: usize, align: usize) -> (usize, usize, usize) {
    let head = (addr % align as u64) as usize;
    let head_end = if head == 0 {
        0
    } else if align - head < len {
        align - head
    } else {
        len
    };
    let tail = (len - head_end) % align;
    (head, head_end, len - tail)
}

impl<T: ChunkTransport> MemoryInterface for ChunkedMemory<T> {
    fn read(&mut self, addr: u64, bytes: &mut [u8]) -> Result<(), MemoryError> {
        let align = self.align();
        let len = bytes.len();
        check_range(Access::Read, addr, len)?;
        let (head, head_end, body_end) = split(addr, len, align);

        if head_end > 0 {
            let chunk = self.read_aligned(addr - head as u64, align)?;
            bytes[..head_end].copy_from_slice(&chunk[head..head + head_end]);
        }

        if body_end < len {
            let chunk = self.read_aligned(addr + body_end as u64, align)?;
            bytes[body_end..].copy_from_slice(&chunk[..len - body_end]);
        }

        let max = self.max_piece(align);
        let body_addr = addr + head_end as u64;
        for (index, piece) in bytes[head_end..body_end].chunks_mut(max).enumerate() {
            let offset = (index * max) as u64;
            self.transport.read_chunk(body_addr + offset, piece)?;
        }
        Ok(())
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        let align = self.align();
        let len = bytes.len();
        check_range(Access::Write, addr, len)?;
        let (head, head_end, body_end) = split(addr, len, align);

        if head_end > 0 {
            let chunk_addr = addr - head as u64;
            let mut chunk = self.read_aligned(chunk_addr, align)?;
            chunk[head..head + head_end].copy_from_slice(&bytes[..head_end]);
            self.transport.write_chunk(chunk_addr, &chunk)?;
        }

        if body_end < len {
            let chunk_addr = addr + body_end as u64;
            let mut chunk = self.read_aligned(chunk_addr, align)?;
            chunk[..len - body_end].copy_from_slice(&bytes[body_end..]);
            self.transport.write_chunk(chunk_addr, &chunk)?;
        }

        let max = self.max_piece(align);
        let body_addr = addr + head_end as u64;
        for (index, piece) in bytes[head_end..body_end].chunks(max).enumerate() {
            let offset = (index * max) as u64;
            self.transport.write_chunk(body_addr + offset, piece)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkTransport, ChunkedMemory};
    use crate::error::{Access, MemoryError, TransportError};
    use crate::memory::MemoryInterface;
    use proptest::prelude::*;

    struct FakeTarget {
        memory: Vec<u8>,
        align: usize,
        max: usize,
        transfers: Vec<(Access, u64, usize)>,
        fail_writes: bool,
    }

    impl FakeTarget {
        fn new(size: usize, align: usize, max: usize) -> Self {
            Self {
                memory: (0..size).map(|i| (i % 251) as u8).collect(),
                align,
                max,
                transfers: Vec::new(),
                fail_writes: false,
            }
        }

        fn check(&mut self, access: Access, addr: u64, len: usize) {
            assert_eq!(addr % self.align as u64, 0, "unaligned chunk address");
            assert!(len > 0 && len % self.align == 0, "bad chunk length {len}");
            assert!(len <= self.max, "chunk larger than transport maximum");
            self.transfers.push((access, addr, len));
        }
    }

    impl ChunkTransport for FakeTarget {
        fn chunk_align(&self) -> usize {
            self.align
        }

        fn chunk_max_size(&self) -> usize {
            self.max
        }

        fn read_chunk(&mut self, addr: u64, bytes: &mut [u8]) -> Result<(), TransportError> {
            self.check(Access::Read, addr, bytes.len());
            let start = addr as usize;
            bytes.copy_from_slice(&self.memory[start..start + bytes.len()]);
            Ok(())
        }

        fn write_chunk(&mut self, addr: u64, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail_writes {
                return Err(TransportError {
                    access: Access::Write,
                    addr,
                    len: bytes.len(),
                    reason: "target not responding".to_string(),
                });
            }
            self.check(Access::Write, addr, bytes.len());
            let start = addr as usize;
            self.memory[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn aligned_read_is_split_by_max_chunk_size() {
        let mut memory = ChunkedMemory::new(FakeTarget::new(256, 8, 32));
        let mut bytes = [0; 80];

        memory.read(0x10, &mut bytes).unwrap();

        let expected: Vec<u8> = (0x10..0x60).map(|i| (i % 251) as u8).collect();
        assert_eq!(bytes.as_slice(), expected.as_slice());
        assert_eq!(
            memory.transport().transfers,
            vec![
                (Access::Read, 0x10, 32),
                (Access::Read, 0x30, 32),
                (Access::Read, 0x50, 16),
            ]
        );
    }

    #[test]
    fn unaligned_write_preserves_neighbouring_bytes() {
        let mut memory = ChunkedMemory::new(FakeTarget::new(64, 8, 16));
        let before = memory.transport().memory.clone();

        memory.write(0x05, &[0xEE; 13]).unwrap();

        let after = &memory.transport().memory;
        assert_eq!(&after[..0x05], &before[..0x05]);
        assert!(after[0x05..0x12].iter().all(|byte| *byte == 0xEE));
        assert_eq!(&after[0x12..], &before[0x12..]);
    }

    #[test]
    fn small_access_inside_one_chunk_touches_only_that_chunk() {
        let mut memory = ChunkedMemory::new(FakeTarget::new(64, 8, 64));
        memory.write_u16(0x0A, 0xBEEF).unwrap();

        assert_eq!(memory.read_u16(0x0A), Ok(0xBEEF));
        assert!(memory
            .transport()
            .transfers
            .iter()
            .all(|(_, addr, len)| *addr == 0x08 && *len == 8));
    }

    #[test]
    fn transport_failure_surfaces_as_memory_error() {
        let mut target = FakeTarget::new(64, 8, 64);
        target.fail_writes = true;
        let mut memory = ChunkedMemory::new(target);

        let result = memory.write(0, &[1; 16]);

        assert!(matches!(result, Err(MemoryError::Transport(_))));
    }

    #[test]
    fn ranges_wrapping_the_address_space_are_rejected_before_transfer() {
        let mut memory = ChunkedMemory::new(FakeTarget::new(64, 8, 64));
        let addr = u64::MAX - 2;

        let mut bytes = [0; 8];
        assert_eq!(
            memory.read(addr, &mut bytes),
            Err(MemoryError::Wraps {
                access: Access::Read,
                addr,
                len: 8
            })
        );
        assert_eq!(
            memory.write(addr, &[0xFF; 4]),
            Err(MemoryError::Wraps {
                access: Access::Write,
                addr,
                len: 4
            })
        );
        assert!(memory.transport().transfers.is_empty());
    }

    proptest! {
        #[test]
        fn arbitrary_ranges_round_trip(
            addr in 0_u64..96,
            data in proptest::collection::vec(any::<u8>(), 0..64),
            align_shift in 0_u32..4,
        ) {
            let align = 1_usize << align_shift;
            let mut memory = ChunkedMemory::new(FakeTarget::new(192, align, 16));
            let before = memory.transport().memory.clone();

            memory.write(addr, &data).unwrap();
            let mut back = vec![0; data.len()];
            memory.read(addr, &mut back).unwrap();
            prop_assert_eq!(&back, &data);

            let start = addr as usize;
            let after = &memory.into_inner().memory;
            prop_assert_eq!(&after[..start], &before[..start]);
            prop_assert_eq!(&after[start + data.len()..], &before[start + data.len()..]);
        }
    }
}
