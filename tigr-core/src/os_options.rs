//! Per-OS flags for opening a raw device without the page cache.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Granularity of unbuffered reads. Both the buffer address and the transfer
/// length are rounded to it, which suits 512-byte and 4K-native cards alike.
pub(crate) const DIRECT_IO_ALIGNMENT: usize = 4096;

#[cfg(target_os = "linux")]
fn set_unbuffered(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.custom_flags(libc::O_DIRECT);
}

#[cfg(windows)]
fn set_unbuffered(options: &mut OpenOptions) {
    use std::os::windows::fs::OpenOptionsExt;
    use windows_sys::Win32::Storage::FileSystem::{
        FILE_FLAG_NO_BUFFERING, FILE_SHARE_READ, FILE_SHARE_WRITE,
    };
    options
        .custom_flags(FILE_FLAG_NO_BUFFERING)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE);
}

#[cfg(not(any(target_os = "linux", windows)))]
fn set_unbuffered(_options: &mut OpenOptions) {}

/// Opens `path` read-only, bypassing the page cache where the OS allows it.
///
/// Returns the file and whether unbuffered I/O is actually in effect. If the
/// OS or filesystem rejects the flag (`EINVAL` on tmpfs, for example) the
/// file is reopened with a plain buffered handle.
pub(crate) fn open_unbuffered(path: &Path) -> io::Result<(File, bool)> {
    if cfg!(not(any(target_os = "linux", windows))) {
        return File::open(path).map(|f| (f, false));
    }

    let mut options = OpenOptions::new();
    options.read(true);
    set_unbuffered(&mut options);

    match options.open(path) {
        Ok(file) => Ok((file, true)),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            log::debug!("unbuffered open of {} rejected ({e}), falling back", path.display());
            File::open(path).map(|f| (f, false))
        }
        Err(e) => Err(e),
    }
}
