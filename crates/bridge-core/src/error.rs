use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::command::MAX_DEVICES;

/// Direction of a memory transfer, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Access {
    /// Target memory to host.
    Read,
    /// Host to target memory.
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Failure reported by an external chunk transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{access} of {len} bytes at {addr:#x} failed: {reason}")]
pub struct TransportError {
    /// Transfer direction.
    pub access: Access,
    /// Chunk start address.
    pub addr: u64,
    /// Chunk length in bytes.
    pub len: usize,
    /// Transport-specific description.
    pub reason: String,
}

/// Memory-interface access failures.
///
/// Every variant is reported before any byte is copied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum MemoryError {
    /// Address lies below the interface base address.
    #[error("{access} underflow: address {addr:#x} is below base {base:#x}")]
    Underflow {
        /// Transfer direction.
        access: Access,
        /// Requested start address.
        addr: u64,
        /// Base address of the window.
        base: u64,
    },
    /// Range extends past the end of the backing buffer.
    #[error("{access} overflow: {len} bytes at {addr:#x} exceed {size}-byte window at {base:#x}")]
    Overflow {
        /// Transfer direction.
        access: Access,
        /// Requested start address.
        addr: u64,
        /// Requested length in bytes.
        len: usize,
        /// Base address of the window.
        base: u64,
        /// Window size in bytes.
        size: usize,
    },
    /// Range runs past the top of the 64-bit address space.
    #[error("{access} of {len} bytes at {addr:#x} wraps the address space")]
    Wraps {
        /// Transfer direction.
        access: Access,
        /// Requested start address.
        addr: u64,
        /// Requested length in bytes.
        len: usize,
    },
    /// Typed access whose address is not a multiple of its width.
    #[error("misaligned {width}-byte access at {addr:#x}")]
    Misaligned {
        /// Requested address.
        addr: u64,
        /// Access width in bytes.
        width: usize,
    },
    /// The underlying chunk transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure to create a device's backing resource.
///
/// A device cannot exist without its backing store, so callers treat these as
/// fatal.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The backing file could not be opened.
    #[error("could not open {}", path.display())]
    Open {
        /// Backing file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The backing file size could not be determined.
    #[error("could not stat {}", path.display())]
    Metadata {
        /// Backing file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The backing file could not be loaded into memory.
    #[error("could not load {}", path.display())]
    Load {
        /// Backing file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Device registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RegistryError {
    /// Every device id is already assigned.
    #[error("device registry is full ({} devices)", MAX_DEVICES)]
    Full,
}

/// Failure to build a registry from a [`RegistryConfig`](crate::config::RegistryConfig).
#[derive(Debug, Error)]
pub enum BuildError {
    /// A configured device could not be created.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The configuration names more devices than the registry holds.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
