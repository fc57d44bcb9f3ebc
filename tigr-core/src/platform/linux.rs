use crate::device::Device;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Helper to read a specific file from the /sys/block filesystem.
fn read_sys_file(device_name: &str, file: &str) -> io::Result<String> {
    let path = PathBuf::from("/sys/block").join(device_name).join(file);
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Strips the partition suffix from a kernel device name
/// (`sda1` -> `sda`, `mmcblk0p1` -> `mmcblk0`, `nvme0n1p2` -> `nvme0n1`).
fn parent_device_name(name: &str) -> &str {
    if name.starts_with("mmcblk") || name.starts_with("nvme") {
        if let Some(index) = name.rfind('p') {
            let (base, suffix) = (&name[..index], &name[index + 1..]);
            let is_partition = !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_digit())
                && base.ends_with(|c: char| c.is_ascii_digit());
            if is_partition {
                return base;
            }
        }
        return name;
    }

    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// Kernel name of a disk reported by `sysinfo` (`/dev/sda1` -> `sda1`).
fn kernel_name(disk: &sysinfo::Disk) -> String {
    Path::new(disk.name())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Scans for removable block devices on a Linux system.
///
/// Devices are discovered by iterating `/sys/block`. SD cards show up there
/// as `mmcblkN` (built-in readers) or `sdX` (USB readers). The filtering is:
/// 1.  Skip the disk holding the root filesystem, when it can be found.
/// 2.  Skip loop devices.
/// 3.  Keep only devices whose `/sys/block/<device>/removable` flag is set.
///     Built-in `mmcblk` readers often report 0 here, so those are kept as
///     well.
/// 4.  Skip devices reporting a size of zero, which usually means an empty
///     card reader.
///
/// # Errors
///
/// Returns an error if `/sys/block` cannot be read.
pub fn get_removable_devices() -> Result<Vec<Device>> {
    let disks = sysinfo::Disks::new_with_refreshed_list();

    let system_disk = disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .map(|disk| parent_device_name(&kernel_name(disk)).to_string());
    if system_disk.is_none() {
        log::warn!("could not determine the system drive; it will not be excluded");
    }

    let mut devices = Vec::new();
    let block_dir = fs::read_dir("/sys/block").context("Could not read /sys/block")?;

    for entry in block_dir.filter_map(|entry| entry.ok()) {
        let device_name = entry.file_name().to_string_lossy().to_string();

        if device_name.starts_with("loop") || system_disk.as_deref() == Some(device_name.as_str()) {
            continue;
        }

        let is_removable = read_sys_file(&device_name, "removable")
            .map(|s| s == "1")
            .unwrap_or(false);

        if !is_removable && !device_name.starts_with("mmcblk") {
            continue;
        }

        // sysfs always reports the size in 512-byte units.
        let size_sectors = read_sys_file(&device_name, "size")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        if size_sectors == 0 {
            continue;
        }

        let mount_point = disks
            .iter()
            .filter(|disk| parent_device_name(&kernel_name(disk)) == device_name)
            .map(|disk| disk.mount_point().to_string_lossy().to_string())
            .find(|mp| !mp.is_empty())
            .unwrap_or_default();

        devices.push(Device {
            path: PathBuf::from("/dev/").join(&device_name),
            name: device_name,
            size_bytes: size_sectors * 512,
            mount_point,
        });
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    log::debug!("found {} removable device(s)", devices.len());
    Ok(devices)
}
