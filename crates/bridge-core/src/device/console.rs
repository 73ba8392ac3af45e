use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};

use crate::command::Command;
use crate::device::{CommandTable, Device};
use crate::memory::MemoryInterface;

/// Console read command index.
pub const CONSOLE_READ: u8 = 0;

/// Console write command index.
pub const CONSOLE_WRITE: u8 = 1;

/// Console identity string.
pub const CONSOLE_IDENTITY: &str = "bcd";

/// Flag set in every write acknowledgement, above the echoed byte.
pub const WRITE_ACK: u64 = 0x100;

/// Polled source of host input bytes, consulted on [`Device::tick`].
pub trait InputSource {
    /// Returns the next available byte without blocking.
    fn poll_byte(&mut self) -> Option<u8>;
}

/// Character console bridging target reads and writes to the host.
///
/// Reads that arrive before any input are parked in FIFO order and completed,
/// each exactly once, as bytes arrive through [`Device::feed_input`] or the
/// optional [`InputSource`]. Input that arrives with no read pending is
/// buffered for later reads.
pub struct ConsoleDevice {
    commands: CommandTable<Self>,
    pending_reads: VecDeque<Command>,
    input: VecDeque<u8>,
    output: Box<dyn Write>,
    output_enabled: bool,
    source: Option<Box<dyn InputSource>>,
}

impl Default for ConsoleDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleDevice {
    /// Creates a console writing to the process's standard output.
    #[must_use]
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Creates a console writing to `output`.
    #[must_use]
    pub fn with_output(output: impl Write + 'static) -> Self {
        let mut commands = CommandTable::new();
        commands.register(CONSOLE_READ, Self::handle_read, "read");
        commands.register(CONSOLE_WRITE, Self::handle_write, "write");
        Self {
            commands,
            pending_reads: VecDeque::new(),
            input: VecDeque::new(),
            output: Box::new(output),
            output_enabled: true,
            source: None,
        }
    }

    /// Attaches a polled input source.
    #[must_use]
    pub fn with_input_source(mut self, source: impl InputSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Enables or disables forwarding of written bytes to the output.
    pub fn set_output_enabled(&mut self, enabled: bool) {
        self.output_enabled = enabled;
    }

    /// Returns true when written bytes reach the output.
    #[must_use]
    pub const fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    /// Number of reads waiting for input.
    #[must_use]
    pub fn pending_reads(&self) -> usize {
        self.pending_reads.len()
    }

    /// Number of input bytes buffered for future reads.
    #[must_use]
    pub fn buffered_input(&self) -> usize {
        self.input.len()
    }

    fn handle_read(&mut self, cmd: Command, _memory: &mut dyn MemoryInterface) {
        match self.input.pop_front() {
            Some(byte) => cmd.respond(u64::from(byte)),
            None => self.pending_reads.push_back(cmd),
        }
    }

    fn handle_write(&mut self, cmd: Command, _memory: &mut dyn MemoryInterface) {
        let byte = cmd.payload().to_le_bytes()[0];
        if self.output_enabled {
            let written = self
                .output
                .write_all(&[byte])
                .and_then(|()| self.output.flush());
            if let Err(err) = written {
                log::warn!("console output failed: {err}");
            }
        }
        cmd.respond(WRITE_ACK | u64::from(byte));
    }
}

impl Device for ConsoleDevice {
    fn identity(&self) -> &str {
        CONSOLE_IDENTITY
    }

    fn command_name(&self, index: u8) -> Option<&str> {
        self.commands.name(index)
    }

    fn handle_command(&mut self, cmd: Command, memory: &mut dyn MemoryInterface) {
        let handler = self.commands.handler(cmd.cmd());
        handler(self, cmd, memory);
    }

    fn tick(&mut self) {
        if !self.waiting_for_input() {
            return;
        }
        if let Some(byte) = self.source.as_mut().and_then(|source| source.poll_byte()) {
            self.feed_input(byte);
        }
    }

    fn feed_input(&mut self, byte: u8) {
        match self.pending_reads.pop_front() {
            Some(cmd) => cmd.respond(u64::from(byte)),
            None => self.input.push_back(byte),
        }
    }

    fn waiting_for_input(&self) -> bool {
        !self.pending_reads.is_empty()
    }

    fn as_console(&self) -> Option<&ConsoleDevice> {
        Some(self)
    }

    fn as_console_mut(&mut self) -> Option<&mut ConsoleDevice> {
        Some(self)
    }
}

impl fmt::Debug for ConsoleDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleDevice")
            .field("commands", &self.commands)
            .field("pending_reads", &self.pending_reads)
            .field("input", &self.input)
            .field("output_enabled", &self.output_enabled)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsoleDevice, InputSource, CONSOLE_READ, CONSOLE_WRITE, WRITE_ACK};
    use crate::command::{Command, ControlWord};
    use crate::device::Device;
    use crate::memory::NullMemory;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{self, Write};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedOutput(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ScriptedInput(VecDeque<u8>);

    impl InputSource for ScriptedInput {
        fn poll_byte(&mut self) -> Option<u8> {
            self.0.pop_front()
        }
    }

    type Responses = Rc<RefCell<Vec<(u64, u64)>>>;

    fn send(console: &mut ConsoleDevice, responses: &Responses, tag: u64, cmd: u8, payload: u64) {
        let sink = Rc::clone(responses);
        let word = ControlWord::encode(1, cmd, payload);
        console.handle_command(
            Command::new(word, move |response| {
                sink.borrow_mut()
                    .push((tag, ControlWord::new(response).payload()));
            }),
            &mut NullMemory,
        );
    }

    #[test]
    fn write_forwards_byte_and_acknowledges() {
        let output = SharedOutput::default();
        let mut console = ConsoleDevice::with_output(output.clone());
        let responses = Responses::default();

        send(&mut console, &responses, 0, CONSOLE_WRITE, u64::from(b'h'));
        send(&mut console, &responses, 1, CONSOLE_WRITE, 0xFF00 | u64::from(b'i'));

        assert_eq!(output.0.borrow().as_slice(), b"hi");
        assert_eq!(
            *responses.borrow(),
            vec![
                (0, WRITE_ACK | u64::from(b'h')),
                (1, WRITE_ACK | u64::from(b'i'))
            ]
        );
    }

    #[test]
    fn disabled_output_still_acknowledges() {
        let output = SharedOutput::default();
        let mut console = ConsoleDevice::with_output(output.clone());
        console.set_output_enabled(false);
        let responses = Responses::default();

        send(&mut console, &responses, 0, CONSOLE_WRITE, u64::from(b'x'));

        assert!(output.0.borrow().is_empty());
        assert_eq!(responses.borrow().len(), 1);
    }

    #[test]
    fn read_parks_until_input_arrives() {
        let mut console = ConsoleDevice::with_output(io::sink());
        let responses = Responses::default();

        send(&mut console, &responses, 0, CONSOLE_READ, 0);
        assert!(console.waiting_for_input());
        assert!(responses.borrow().is_empty());

        console.feed_input(b'q');

        assert_eq!(*responses.borrow(), vec![(0, u64::from(b'q'))]);
        assert!(!console.waiting_for_input());
    }

    #[test]
    fn parked_reads_complete_in_fifo_order() {
        let mut console = ConsoleDevice::with_output(io::sink());
        let responses = Responses::default();

        for tag in 0..3 {
            send(&mut console, &responses, tag, CONSOLE_READ, 0);
        }
        assert_eq!(console.pending_reads(), 3);

        for byte in [b'a', b'b', b'c'] {
            console.feed_input(byte);
        }

        assert_eq!(
            *responses.borrow(),
            vec![
                (0, u64::from(b'a')),
                (1, u64::from(b'b')),
                (2, u64::from(b'c'))
            ]
        );
        assert_eq!(console.pending_reads(), 0);
    }

    #[test]
    fn buffered_input_answers_read_immediately() {
        let mut console = ConsoleDevice::with_output(io::sink());
        let responses = Responses::default();

        console.feed_input(b'z');
        assert_eq!(console.buffered_input(), 1);
        assert!(!console.waiting_for_input());

        send(&mut console, &responses, 7, CONSOLE_READ, 0);

        assert_eq!(*responses.borrow(), vec![(7, u64::from(b'z'))]);
        assert_eq!(console.buffered_input(), 0);
    }

    #[test]
    fn tick_polls_source_only_while_reads_are_pending() {
        let source = ScriptedInput(VecDeque::from(vec![b'1', b'2']));
        let mut console = ConsoleDevice::with_output(io::sink()).with_input_source(source);
        let responses = Responses::default();

        console.tick();
        assert_eq!(console.buffered_input(), 0);

        send(&mut console, &responses, 0, CONSOLE_READ, 0);
        console.tick();
        console.tick();

        assert_eq!(*responses.borrow(), vec![(0, u64::from(b'1'))]);
        assert!(!console.waiting_for_input());
    }

    #[test]
    fn console_exposes_itself_through_device_trait() {
        let mut console = ConsoleDevice::with_output(io::sink());
        assert!(console.as_console().is_some());
        assert!(console.as_console_mut().is_some());
        assert_eq!(console.command_name(CONSOLE_READ), Some("read"));
        assert_eq!(console.command_name(CONSOLE_WRITE), Some("write"));
    }
}
