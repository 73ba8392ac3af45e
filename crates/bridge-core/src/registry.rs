//! Device registry routing control words to devices by id.
//!
//! The registry owns every device. A device's id is its registration index,
//! so ids are dense and never reused. Id 0 always holds the [`NullDevice`],
//! which also absorbs commands addressed to ids nobody registered.

use std::fmt;
use std::io;

use crate::command::{Command, MAX_DEVICES};
use crate::config::RegistryConfig;
use crate::device::{ConsoleDevice, Device, DiskDevice, NullDevice, RamDiskDevice};
use crate::error::{BuildError, RegistryError};
use crate::memory::MemoryInterface;

/// Id the null device is registered under.
pub const NULL_DEVICE_ID: u8 = 0;

/// Well-known id of the console device.
pub const CONSOLE_DEVICE_ID: u8 = 1;

/// Ordered set of devices addressed by the device field of a control word.
pub struct DeviceRegistry {
    devices: Vec<Box<dyn Device>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Creates a registry holding only the null device.
    #[must_use]
    pub fn new() -> Self {
        let null: Box<dyn Device> = Box::new(NullDevice::new());
        Self {
            devices: vec![null],
        }
    }

    /// Builds the device set described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Device`] when a backing file cannot be opened or
    /// loaded, and [`BuildError::Registry`] when the configuration names more
    /// devices than the registry holds.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, BuildError> {
        let mut registry = Self::new();

        let mut console = if config.console_output {
            ConsoleDevice::new()
        } else {
            ConsoleDevice::with_output(io::sink())
        };
        console.set_output_enabled(config.console_output);
        registry.register(Box::new(console))?;

        for path in &config.disks {
            registry.register(Box::new(DiskDevice::open(path)?))?;
        }
        for path in &config.ramdisks {
            registry.register(Box::new(RamDiskDevice::load(path)?))?;
        }

        log::info!("registry built with {} devices", registry.len());
        Ok(registry)
    }

    /// Appends `device` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Full`] when every id is taken.
    pub fn register(&mut self, device: Box<dyn Device>) -> Result<u8, RegistryError> {
        let id = u8::try_from(self.devices.len()).map_err(|_| RegistryError::Full)?;
        log::debug!("device {id:#04x}: registered {:?}", device.identity());
        self.devices.push(device);
        Ok(id)
    }

    /// Routes `cmd` to the device named by its device field.
    ///
    /// Commands for unregistered ids go to the null device.
    pub fn dispatch(&mut self, cmd: Command, memory: &mut dyn MemoryInterface) {
        let id = cmd.device();
        log::trace!("dispatch {}", cmd.word());
        let slot = if usize::from(id) < self.devices.len() {
            usize::from(id)
        } else {
            log::debug!("device {id:#04x}: not registered, routing to null device");
            usize::from(NULL_DEVICE_ID)
        };
        self.devices[slot].handle_command(cmd, memory);
    }

    /// Ticks every device in registration order.
    pub fn tick(&mut self) {
        for device in &mut self.devices {
            device.tick();
        }
    }

    /// Device registered under `id`.
    #[must_use]
    pub fn device(&self, id: u8) -> Option<&(dyn Device + 'static)> {
        self.devices.get(usize::from(id)).map(AsRef::as_ref)
    }

    /// Mutable device registered under `id`.
    #[must_use]
    pub fn device_mut(&mut self, id: u8) -> Option<&mut (dyn Device + 'static)> {
        self.devices.get_mut(usize::from(id)).map(AsMut::as_mut)
    }

    /// Console at [`CONSOLE_DEVICE_ID`], if one is registered there.
    #[must_use]
    pub fn console(&self) -> Option<&ConsoleDevice> {
        self.device(CONSOLE_DEVICE_ID)
            .and_then(|device| device.as_console())
    }

    /// Mutable console at [`CONSOLE_DEVICE_ID`], if one is registered there.
    #[must_use]
    pub fn console_mut(&mut self) -> Option<&mut ConsoleDevice> {
        self.device_mut(CONSOLE_DEVICE_ID)
            .and_then(|device| device.as_console_mut())
    }

    /// Returns true while the console has reads parked on host input.
    #[must_use]
    pub fn waiting_for_input(&self) -> bool {
        self.console().is_some_and(Device::waiting_for_input)
    }

    /// Delivers one byte of host input to the console.
    ///
    /// The byte is dropped when no console is registered.
    pub fn feed_input(&mut self, byte: u8) {
        match self.console_mut() {
            Some(console) => console.feed_input(byte),
            None => log::debug!("no console registered, dropping input byte {byte:#04x}"),
        }
    }

    /// Number of registered devices, the null device included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Always false: the null device is registered on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Remaining free device ids.
    #[must_use]
    pub fn capacity_left(&self) -> usize {
        MAX_DEVICES - self.devices.len()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.devices.iter().map(|device| device.identity()))
            .finish()
    }
}
