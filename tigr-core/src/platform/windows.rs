use crate::device::Device;
use crate::source::device_capacity;
use anyhow::Result;
use std::fs::OpenOptions;
use std::os::windows::fs::OpenOptionsExt;
use std::path::PathBuf;
use windows_sys::Win32::Storage::FileSystem::{FILE_SHARE_READ, FILE_SHARE_WRITE};

/// Physical drive numbers probed during discovery.
const MAX_PHYSICAL_DRIVES: u32 = 16;

/// Scans for physical drives on a Windows system.
///
/// Probes `\\.\PhysicalDrive0` through `\\.\PhysicalDrive15` and keeps every
/// drive that can be opened and reports a non-zero length. Opening physical
/// drives requires Administrator rights, so without them the list is empty.
///
/// Drive 0 is almost always the system disk and is skipped. Card readers are
/// enumerated after fixed disks, so the card is usually the last entry.
pub fn get_removable_devices() -> Result<Vec<Device>> {
    let mut devices = Vec::new();

    for index in 1..MAX_PHYSICAL_DRIVES {
        let name = format!("PhysicalDrive{index}");
        let path = PathBuf::from(format!(r"\\.\{name}"));

        let file = match OpenOptions::new()
            .read(true)
            .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) => {
                log::debug!("skipping {}: {e}", path.display());
                continue;
            }
        };

        let Some(size_bytes) = device_capacity(&file) else {
            continue;
        };

        devices.push(Device {
            path,
            name,
            size_bytes,
            mount_point: String::new(),
        });
    }

    log::debug!("found {} physical drive(s)", devices.len());
    Ok(devices)
}
