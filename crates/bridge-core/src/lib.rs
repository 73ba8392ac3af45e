//! Device layer for a host-target bridge.
//!
//! The host receives 64-bit control words from a target, routes each one to a
//! device by its device field, and answers with a response word that keeps the
//! device and command fields and carries a new payload. Devices reach target
//! memory only through a [`MemoryInterface`].

/// Control-word codec and per-word command handles.
pub mod command;
pub use command::{
    Command, ControlWord, Responder, COMMAND_SHIFT, DEVICE_SHIFT, HEADER_MASK, MAX_COMMANDS,
    MAX_DEVICES, PAYLOAD_BITS, PAYLOAD_MASK,
};

/// Error taxonomy for memory access, device creation and registration.
pub mod error;
pub use error::{Access, BuildError, DeviceError, MemoryError, RegistryError, TransportError};

/// Target memory interface and its blob, chunked and null variants.
pub mod memory;
pub use memory::{BlobMemory, ChunkTransport, ChunkedMemory, MemoryInterface, NullMemory};

/// Device trait, command tables and the built-in devices.
pub mod device;
pub use device::{
    identify_payload, null_command, pack_identity_chunk, unpack_identity_chunk, BackingStore,
    BlockDevice, BlockRequest, BlockStatus, CommandTable, ConsoleDevice, Device, DiskDevice,
    FileStore, Handler, InputSource, NullDevice, RamDiskDevice, RamStore, IDENTIFY_CHUNK_BYTES,
    IDENTIFY_COMMAND, IDENTIFY_SELF,
};
pub use device::block::{
    block_response, split_block_response, BLOCK_READ, BLOCK_WRITE, REQUEST_BYTES, TAG_BITS,
};
pub use device::console::{CONSOLE_IDENTITY, CONSOLE_READ, CONSOLE_WRITE, WRITE_ACK};

/// Declarative description of a registry's device set.
pub mod config;
pub use config::RegistryConfig;

/// Device registry routing commands by device id.
pub mod registry;
pub use registry::{DeviceRegistry, CONSOLE_DEVICE_ID, NULL_DEVICE_ID};

/// Single-threaded host loop glue with a response queue.
pub mod host;
pub use host::{HostBridge, MAX_IDENTIFY_CHUNKS};
