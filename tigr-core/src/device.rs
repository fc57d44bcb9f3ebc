use std::fmt;
use std::path::PathBuf;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// A storage device that may hold a detector card.
///
/// Populated by the discovery functions in [`crate::platform`]. The core
/// never reads from a `Device` directly; callers hand its `path` to
/// [`crate::read::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    /// The system path to the device (e.g., `/dev/mmcblk0` or `\\.\PhysicalDrive1`).
    pub path: PathBuf,
    /// The kernel-provided name of the device (e.g., "mmcblk0").
    pub name: String,
    /// Total size of the device in bytes.
    pub size_bytes: u64,
    /// The primary mount point of the device, if any. Empty when unmounted.
    pub mount_point: String,
}

impl Device {
    /// Human-readable size: gigabytes for cards of 1 GB and up, whole
    /// megabytes below that.
    pub fn size_display(&self) -> String {
        let bytes = self.size_bytes as f64;
        if bytes >= GIB {
            format!("{:.1} GB", bytes / GIB)
        } else {
            format!("{:.0} MB", bytes / MIB)
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mount_info = if !self.mount_point.is_empty() {
            format!("[Mounted at {}]", self.mount_point)
        } else {
            "[Not mounted]".to_string()
        };

        write!(
            f,
            "{:<22} {:>9} {}",
            self.path.display(),
            self.size_display(),
            mount_info
        )
    }
}
