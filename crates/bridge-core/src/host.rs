//! Host side of the bridge: turns incoming control words into commands and
//! collects response words for the transport.
//!
//! Everything runs on one thread. Responses are queued in completion order,
//! which is not necessarily delivery order because console reads may park.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::command::{Command, ControlWord};
use crate::device::{identify_payload, unpack_identity_chunk, IDENTIFY_COMMAND};
use crate::memory::MemoryInterface;
use crate::registry::DeviceRegistry;

/// Most identify chunks [`HostBridge::identify`] requests before giving up on
/// a string that never terminates.
pub const MAX_IDENTIFY_CHUNKS: u64 = 64;

/// Registry, target memory and response queue driven as one unit.
#[derive(Debug)]
pub struct HostBridge<M> {
    registry: DeviceRegistry,
    memory: M,
    responses: Rc<RefCell<VecDeque<u64>>>,
}

impl<M: MemoryInterface> HostBridge<M> {
    /// Binds `registry` to the target memory reachable through `memory`.
    #[must_use]
    pub fn new(registry: DeviceRegistry, memory: M) -> Self {
        Self {
            registry,
            memory,
            responses: Rc::default(),
        }
    }

    /// Dispatches one incoming control word.
    ///
    /// The response word is queued once the device completes the command,
    /// which may happen during a later [`tick`](Self::tick) or
    /// [`feed_input`](Self::feed_input).
    pub fn deliver(&mut self, word: u64) {
        let queue = Rc::clone(&self.responses);
        let cmd = Command::new(word, move |response| queue.borrow_mut().push_back(response));
        self.registry.dispatch(cmd, &mut self.memory);
    }

    /// Ticks every device.
    pub fn tick(&mut self) {
        self.registry.tick();
    }

    /// Oldest queued response word.
    #[must_use]
    pub fn pop_response(&self) -> Option<u64> {
        self.responses.borrow_mut().pop_front()
    }

    /// Drains every queued response word in completion order.
    #[must_use]
    pub fn take_responses(&self) -> Vec<u64> {
        self.responses.borrow_mut().drain(..).collect()
    }

    /// Number of queued response words.
    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.responses.borrow().len()
    }

    /// Delivers one byte of host input to the console.
    pub fn feed_input(&mut self, byte: u8) {
        self.registry.feed_input(byte);
    }

    /// Returns true while the console has reads parked on host input.
    #[must_use]
    pub fn waiting_for_input(&self) -> bool {
        self.registry.waiting_for_input()
    }

    /// Reads the string behind identify `selector` of `device` chunk by
    /// chunk, as a remote host would.
    ///
    /// Responses to these requests bypass the response queue. A string still
    /// unterminated after [`MAX_IDENTIFY_CHUNKS`] chunks is cut off there.
    #[must_use]
    pub fn identify(&mut self, device: u8, selector: u8) -> String {
        let mut text = Vec::new();
        let mut finished = false;
        for chunk in 0..MAX_IDENTIFY_CHUNKS {
            let slot = Rc::new(Cell::new(None));
            let sink = Rc::clone(&slot);
            let word =
                ControlWord::encode(device, IDENTIFY_COMMAND, identify_payload(selector, chunk));
            self.registry.dispatch(
                Command::new(word, move |response| sink.set(Some(response))),
                &mut self.memory,
            );
            let Some(response) = slot.take() else {
                log::warn!("device {device:#04x}: identify chunk {chunk} was not answered");
                finished = true;
                break;
            };
            let (bytes, done) = unpack_identity_chunk(ControlWord::new(response).payload());
            text.extend_from_slice(&bytes);
            if done {
                finished = true;
                break;
            }
        }
        if !finished {
            log::warn!(
                "device {device:#04x}: identify selector {selector:#04x} truncated after {} bytes",
                text.len()
            );
        }
        String::from_utf8_lossy(&text).into_owned()
    }

    /// Device registry.
    #[must_use]
    pub const fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Mutable device registry.
    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    /// Target memory interface.
    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable target memory interface.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Releases the registry and memory interface.
    ///
    /// Responses still queued are dropped.
    #[must_use]
    pub fn into_parts(self) -> (DeviceRegistry, M) {
        (self.registry, self.memory)
    }
}
