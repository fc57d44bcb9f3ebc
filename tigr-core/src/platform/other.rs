use crate::device::Device;
use anyhow::{Result, bail};

/// Device discovery is not available on this OS.
///
/// Pass the device path explicitly instead (on macOS, the raw `/dev/rdiskN`
/// node reported by `diskutil list`).
pub fn get_removable_devices() -> Result<Vec<Device>> {
    bail!("Device discovery is not supported on this platform. Pass --device explicitly.")
}
