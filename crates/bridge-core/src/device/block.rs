//! Block-storage devices.
//!
//! Both commands take the target address of a 32-byte [`BlockRequest`] as
//! their payload. *read* copies `size` bytes from the backing store at
//! `offset` into target memory at `addr`; *write* copies the other way. The
//! response payload carries a [`BlockStatus`] in bits 47..40 and the low 40
//! bits of the request tag below it.
//!
//! [`DiskDevice`] works directly on the backing file. [`RamDiskDevice`] loads
//! the file once and works on a private copy, leaving the file untouched.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

use crate::command::Command;
use crate::device::{CommandTable, Device};
use crate::error::{Access, DeviceError, MemoryError};
use crate::memory::MemoryInterface;

/// Block read command index.
pub const BLOCK_READ: u8 = 0;

/// Block write command index.
pub const BLOCK_WRITE: u8 = 1;

/// Size in bytes of a request record in target memory.
pub const REQUEST_BYTES: usize = 32;

/// Width in bits of the tag echoed in a response.
pub const TAG_BITS: u32 = 40;

const TAG_MASK: u64 = (1 << TAG_BITS) - 1;

/// Transfer request read from target memory.
///
/// Four host-order `u64` fields in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlockRequest {
    /// Target memory address of the transfer buffer.
    pub addr: u64,
    /// Byte offset into the backing store.
    pub offset: u64,
    /// Transfer length in bytes.
    pub size: u64,
    /// Opaque correlation tag echoed in the response.
    ///
    /// Only the low [`TAG_BITS`] bits come back, so hosts that correlate
    /// responses by tag must keep tags below `2^40`.
    pub tag: u64,
}

impl BlockRequest {
    /// Reads a request record from target memory at `addr`.
    ///
    /// # Errors
    ///
    /// Returns the [`MemoryError`] raised while reading the record.
    pub fn load(memory: &mut dyn MemoryInterface, addr: u64) -> Result<Self, MemoryError> {
        let mut raw = [0; REQUEST_BYTES];
        memory.read(addr, &mut raw)?;
        Ok(Self::from_bytes(raw))
    }

    /// Decodes a request record.
    #[must_use]
    pub fn from_bytes(raw: [u8; REQUEST_BYTES]) -> Self {
        let field = |index: usize| {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&raw[index * 8..index * 8 + 8]);
            u64::from_ne_bytes(bytes)
        };
        Self {
            addr: field(0),
            offset: field(1),
            size: field(2),
            tag: field(3),
        }
    }

    /// Encodes the request record as placed in target memory.
    #[must_use]
    pub fn to_bytes(self) -> [u8; REQUEST_BYTES] {
        let mut raw = [0; REQUEST_BYTES];
        for (slot, value) in raw
            .chunks_exact_mut(8)
            .zip([self.addr, self.offset, self.size, self.tag])
        {
            slot.copy_from_slice(&value.to_ne_bytes());
        }
        raw
    }
}

/// Completion status reported in bits 47..40 of a block response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum BlockStatus {
    /// Transfer completed.
    Ok = 0,
    /// The request record could not be read from target memory.
    BadRequest = 1,
    /// The byte range lies outside the backing store.
    OutOfRange = 2,
    /// Target memory rejected the transfer buffer.
    Memory = 3,
    /// The backing store reported an I/O error.
    Io = 4,
}

impl BlockStatus {
    /// Stable wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a wire value back into a status.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::BadRequest),
            2 => Some(Self::OutOfRange),
            3 => Some(Self::Memory),
            4 => Some(Self::Io),
            _ => None,
        }
    }
}

/// Packs a block response payload.
#[must_use]
pub const fn block_response(status: BlockStatus, tag: u64) -> u64 {
    ((status as u64) << TAG_BITS) | (tag & TAG_MASK)
}

/// Splits a block response payload into its status and tag.
#[must_use]
pub fn split_block_response(payload: u64) -> (Option<BlockStatus>, u64) {
    let status = BlockStatus::from_u8(payload.to_be_bytes()[2]);
    (status, payload & TAG_MASK)
}

/// Random-access byte store behind a block device.
pub trait BackingStore {
    /// Store size in bytes.
    fn size(&self) -> u64;

    /// Fills `bytes` from the store starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn read_at(&mut self, offset: u64, bytes: &mut [u8]) -> io::Result<()>;

    /// Writes `bytes` into the store starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;
}

/// Backing store operating on an open read/write file.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    size: u64,
}

impl BackingStore for FileStore {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, bytes: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(bytes)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)
    }
}

/// Backing store holding a private in-memory copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamStore {
    data: Vec<u8>,
}

impl RamStore {
    /// Current contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, offset: u64, len: usize) -> io::Result<std::ops::Range<usize>> {
        usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .filter(|range| range.end <= self.data.len())
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }
}

impl BackingStore for RamStore {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, bytes: &mut [u8]) -> io::Result<()> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let range = self.range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }
}

#[derive(Debug, Error)]
enum TransferError {
    #[error("range {offset:#x}+{size:#x} outside {capacity}-byte store")]
    OutOfRange { offset: u64, size: u64, capacity: u64 },
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransferError {
    const fn status(&self) -> BlockStatus {
        match self {
            Self::OutOfRange { .. } => BlockStatus::OutOfRange,
            Self::Memory(_) => BlockStatus::Memory,
            Self::Io(_) => BlockStatus::Io,
        }
    }
}

/// Block device generic over its backing store.
#[derive(Debug)]
pub struct BlockDevice<S> {
    commands: CommandTable<Self>,
    store: S,
    id: String,
}

/// Block device whose writes reach the backing file.
pub type DiskDevice = BlockDevice<FileStore>;

/// Block device working on a private copy of the backing file.
pub type RamDiskDevice = BlockDevice<RamStore>;

impl BlockDevice<FileStore> {
    /// Opens `path` read/write as a disk.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Open`] or [`DeviceError::Metadata`] when the file
    /// cannot be opened or sized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| DeviceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let size = file
            .metadata()
            .map_err(|source| DeviceError::Metadata {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        Ok(Self::with_store("disk", path, FileStore { file, size }))
    }
}

impl BlockDevice<RamStore> {
    /// Loads `path` into memory as a ramdisk.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Open`] or [`DeviceError::Load`] when the file
    /// cannot be opened or read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|source| DeviceError::Load {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::with_store("ramdisk", path, RamStore { data }))
    }

    /// Creates a ramdisk named `name` over `data`, with no backing file.
    #[must_use]
    pub fn from_bytes(name: &str, data: Vec<u8>) -> Self {
        Self::with_store("ramdisk", Path::new(name), RamStore { data })
    }
}

impl<S: BackingStore> BlockDevice<S> {
    fn with_store(kind: &str, path: &Path, store: S) -> Self {
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        let id = format!("{kind} {name} size={}", store.size());
        log::info!("{id}: attached {}", path.display());

        let mut commands = CommandTable::new();
        commands.register(BLOCK_READ, Self::handle_read, "read");
        commands.register(BLOCK_WRITE, Self::handle_write, "write");
        Self {
            commands,
            store,
            id,
        }
    }

    /// Backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    fn handle_read(&mut self, cmd: Command, memory: &mut dyn MemoryInterface) {
        self.serve(Access::Read, cmd, memory);
    }

    fn handle_write(&mut self, cmd: Command, memory: &mut dyn MemoryInterface) {
        self.serve(Access::Write, cmd, memory);
    }

    fn serve(&mut self, access: Access, cmd: Command, memory: &mut dyn MemoryInterface) {
        let request = match BlockRequest::load(memory, cmd.payload()) {
            Ok(request) => request,
            Err(err) => {
                log::warn!(
                    "{}: unreadable {access} request at {:#x}: {err}",
                    self.id,
                    cmd.payload()
                );
                cmd.respond(block_response(BlockStatus::BadRequest, 0));
                return;
            }
        };

        let status = match self.transfer(access, request, memory) {
            Ok(()) => BlockStatus::Ok,
            Err(err) => {
                log::warn!("{}: {access} tag {:#x} failed: {err}", self.id, request.tag);
                err.status()
            }
        };
        cmd.respond(block_response(status, request.tag));
    }

    fn transfer(
        &mut self,
        access: Access,
        request: BlockRequest,
        memory: &mut dyn MemoryInterface,
    ) -> Result<(), TransferError> {
        let capacity = self.store.size();
        let out_of_range = || TransferError::OutOfRange {
            offset: request.offset,
            size: request.size,
            capacity,
        };
        let in_range = request
            .offset
            .checked_add(request.size)
            .is_some_and(|end| end <= capacity);
        if !in_range {
            return Err(out_of_range());
        }
        let len = usize::try_from(request.size).map_err(|_| out_of_range())?;

        let mut buffer = vec![0; len];
        match access {
            Access::Read => {
                self.store.read_at(request.offset, &mut buffer)?;
                memory.write(request.addr, &buffer)?;
            }
            Access::Write => {
                memory.read(request.addr, &mut buffer)?;
                self.store.write_at(request.offset, &buffer)?;
            }
        }
        Ok(())
    }
}

impl<S: BackingStore> Device for BlockDevice<S> {
    fn identity(&self) -> &str {
        &self.id
    }

    fn command_name(&self, index: u8) -> Option<&str> {
        self.commands.name(index)
    }

    fn handle_command(&mut self, cmd: Command, memory: &mut dyn MemoryInterface) {
        let handler = self.commands.handler(cmd.cmd());
        handler(self, cmd, memory);
    }
}
