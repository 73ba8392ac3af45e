use crate::command::Command;
use crate::device::{CommandTable, Device};
use crate::memory::MemoryInterface;

/// Placeholder answering every command with the default handlers.
///
/// The registry binds it to device id 0 and routes commands for unregistered
/// ids to it.
#[derive(Debug, Default)]
pub struct NullDevice {
    commands: CommandTable<Self>,
}

impl NullDevice {
    /// Creates the placeholder device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for NullDevice {
    fn identity(&self) -> &str {
        ""
    }

    fn command_name(&self, index: u8) -> Option<&str> {
        self.commands.name(index)
    }

    fn handle_command(&mut self, cmd: Command, memory: &mut dyn MemoryInterface) {
        let handler = self.commands.handler(cmd.cmd());
        handler(self, cmd, memory);
    }
}
