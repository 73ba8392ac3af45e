//! Device abstraction and per-device command tables.
//!
//! A device owns a [`CommandTable`] of up to 256 named handlers indexed by
//! command id. Empty slots run the null handler, which acknowledges the
//! command with payload `0`, so an unknown command never faults a device.
//! Every table starts with the identify handler at [`IDENTIFY_COMMAND`].
//!
//! # Identify protocol
//!
//! The request payload carries a selector in bits 47..40 and a chunk index in
//! bits 39..0. Selector [`IDENTIFY_SELF`] selects the device identity; any
//! other selector `n` selects the registered name of command `n`. The response
//! payload packs bytes `[6k, 6k + 6)` of the selected string for chunk `k`,
//! first byte in the least significant position. Bytes past the end of the
//! string are NUL, and the host stops at the first chunk containing a NUL.

use std::borrow::Cow;
use std::fmt;

use crate::command::{Command, MAX_COMMANDS};
use crate::memory::MemoryInterface;

/// Block-storage devices backed by a file or an in-memory copy of one.
pub mod block;
/// Character console device.
pub mod console;
/// Placeholder device bound to id 0.
pub mod null;

pub use block::{
    BackingStore, BlockDevice, BlockRequest, BlockStatus, DiskDevice, FileStore, RamDiskDevice,
    RamStore,
};
pub use console::{ConsoleDevice, InputSource};
pub use null::NullDevice;

/// Command index of the built-in identify handler.
pub const IDENTIFY_COMMAND: u8 = 0xFF;

/// Identify selector naming the device itself rather than one of its commands.
pub const IDENTIFY_SELF: u8 = 0xFF;

/// Identity bytes carried by one identify response.
pub const IDENTIFY_CHUNK_BYTES: usize = 6;

const IDENTIFY_SELECTOR_SHIFT: u32 = 40;
const IDENTIFY_CHUNK_MASK: u64 = (1 << IDENTIFY_SELECTOR_SHIFT) - 1;

/// Command handler bound to a concrete device type.
pub type Handler<D> = fn(&mut D, Command, &mut dyn MemoryInterface);

/// Addressable endpoint driven by the device registry.
pub trait Device {
    /// Short display name, returned by the identify command.
    fn identity(&self) -> &str;

    /// Registered name of command `index`, if any.
    fn command_name(&self, index: u8) -> Option<&str>;

    /// Runs the handler registered for `cmd.cmd()`.
    fn handle_command(&mut self, cmd: Command, memory: &mut dyn MemoryInterface);

    /// Advances time-dependent device state by one step.
    fn tick(&mut self) {}

    /// Delivers one byte of host input.
    fn feed_input(&mut self, _byte: u8) {}

    /// Returns true while the device has requests parked on host input.
    fn waiting_for_input(&self) -> bool {
        false
    }

    /// Returns this device as a console, if it is one.
    fn as_console(&self) -> Option<&ConsoleDevice> {
        None
    }

    /// Returns this device as a mutable console, if it is one.
    fn as_console_mut(&mut self) -> Option<&mut ConsoleDevice> {
        None
    }
}

struct Entry<D> {
    handler: Handler<D>,
    name: Cow<'static, str>,
}

/// Handler table indexed by command id.
pub struct CommandTable<D> {
    entries: Vec<Option<Entry<D>>>,
}

impl<D: Device> Default for CommandTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Device> CommandTable<D> {
    /// Creates a table holding only the identify handler.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            entries: Vec::with_capacity(MAX_COMMANDS),
        };
        table.register(IDENTIFY_COMMAND, identify::<D>, "identify");
        table
    }

    /// Installs `handler` at `index`, replacing any previous handler there.
    pub fn register(&mut self, index: u8, handler: Handler<D>, name: impl Into<Cow<'static, str>>) {
        let slot = usize::from(index);
        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        let name = name.into();
        if let Some(previous) = &self.entries[slot] {
            log::debug!(
                "command {index:#04x}: '{}' replaced by '{name}'",
                previous.name
            );
        }
        self.entries[slot] = Some(Entry { handler, name });
    }

    /// Handler for `index`, or the null handler when the slot is empty.
    #[must_use]
    pub fn handler(&self, index: u8) -> Handler<D> {
        self.entry(index)
            .map_or(null_command::<D> as Handler<D>, |entry| entry.handler)
    }

    /// Registered name for `index`.
    #[must_use]
    pub fn name(&self, index: u8) -> Option<&str> {
        self.entry(index).map(|entry| entry.name.as_ref())
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    fn entry(&self, index: u8) -> Option<&Entry<D>> {
        self.entries.get(usize::from(index)).and_then(Option::as_ref)
    }
}

impl<D> fmt::Debug for CommandTable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().enumerate().filter_map(|(index, entry)| {
                entry.as_ref().map(|entry| (index, entry.name.as_ref()))
            }))
            .finish()
    }
}

/// Default handler for empty slots: acknowledges with payload `0`.
pub fn null_command<D: Device>(device: &mut D, cmd: Command, _memory: &mut dyn MemoryInterface) {
    log::debug!(
        "device {:?}: no handler for command {:#04x}, acknowledging",
        device.identity(),
        cmd.cmd()
    );
    cmd.respond(0);
}

fn identify<D: Device>(device: &mut D, cmd: Command, _memory: &mut dyn MemoryInterface) {
    let payload = cmd.payload();
    let selector = payload.to_be_bytes()[2];
    let chunk = payload & IDENTIFY_CHUNK_MASK;
    let text = if selector == IDENTIFY_SELF {
        device.identity()
    } else {
        device.command_name(selector).unwrap_or("")
    };
    let value = pack_identity_chunk(text.as_bytes(), chunk);
    cmd.respond(value);
}

/// Builds the identify request payload for `selector` and chunk `chunk`.
#[must_use]
pub const fn identify_payload(selector: u8, chunk: u64) -> u64 {
    ((selector as u64) << IDENTIFY_SELECTOR_SHIFT) | (chunk & IDENTIFY_CHUNK_MASK)
}

/// Packs chunk `chunk` of `text` into a response payload.
#[must_use]
pub fn pack_identity_chunk(text: &[u8], chunk: u64) -> u64 {
    let mut packed = [0_u8; 8];
    let start = usize::try_from(chunk)
        .ok()
        .and_then(|chunk| chunk.checked_mul(IDENTIFY_CHUNK_BYTES));
    if let Some(rest) = start.and_then(|start| text.get(start..)) {
        let len = rest.len().min(IDENTIFY_CHUNK_BYTES);
        packed[..len].copy_from_slice(&rest[..len]);
    }
    u64::from_le_bytes(packed)
}

/// Unpacks an identify response payload.
///
/// Returns the text bytes it carries and whether the string ended in this
/// chunk.
#[must_use]
pub fn unpack_identity_chunk(payload: u64) -> (Vec<u8>, bool) {
    let bytes = payload.to_le_bytes();
    let chunk = &bytes[..IDENTIFY_CHUNK_BYTES];
    chunk.iter().position(|byte| *byte == 0).map_or_else(
        || (chunk.to_vec(), false),
        |end| (chunk[..end].to_vec(), true),
    )
}
