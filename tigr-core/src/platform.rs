//! Provides platform-specific device discovery.
//!
//! Each submodule exposes the same `get_removable_devices` function, so front
//! ends can offer a device picker without caring which OS they run on. The
//! extraction pipeline itself never calls into this module.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::*;

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod other;
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub use self::other::*;

/// Whether the current process can be expected to open raw devices.
///
/// On Unix this means an effective uid of root. On Windows there is no cheap
/// check, so this returns `true` and the read itself reports `AccessDenied`.
pub fn has_raw_access() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::Uid::effective().is_root()
    }
    #[cfg(not(unix))]
    {
        true
    }
}
