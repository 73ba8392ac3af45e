use std::path::PathBuf;

/// Device set assembled by [`DeviceRegistry::from_config`](crate::registry::DeviceRegistry::from_config).
///
/// Devices are registered in a fixed order: the null device at id 0, the
/// console at id 1, then one disk per entry of [`disks`](Self::disks) and one
/// ramdisk per entry of [`ramdisks`](Self::ramdisks).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryConfig {
    /// Forwards console writes to standard output.
    pub console_output: bool,
    /// Backing files opened read/write as disks.
    pub disks: Vec<PathBuf>,
    /// Backing files loaded once as ramdisks.
    pub ramdisks: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            console_output: true,
            disks: Vec::new(),
            ramdisks: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Adds a disk backed by `path`.
    #[must_use]
    pub fn with_disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.disks.push(path.into());
        self
    }

    /// Adds a ramdisk loaded from `path`.
    #[must_use]
    pub fn with_ramdisk(mut self, path: impl Into<PathBuf>) -> Self {
        self.ramdisks.push(path.into());
        self
    }

    /// Number of devices the configuration produces, null device included.
    #[must_use]
    pub fn device_count(&self) -> usize {
        2 + self.disks.len() + self.ramdisks.len()
    }
}
