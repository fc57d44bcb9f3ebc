//! Byte sources the Block Reader can pull sectors from.
//!
//! [`BlockSource`] is the seam between the extraction pipeline and the
//! operating system. The pipeline only ever asks for "up to N bytes starting
//! at offset X"; how the path was discovered, or how the process obtained the
//! privilege to open it, is the caller's business.
//!
//! Three implementations ship with the crate:
//! - [`DeviceSource`] for raw block devices and uncompressed card dumps.
//! - [`ImageSource`] for card dumps compressed with gzip, xz or zstd.
//! - `std::io::Cursor` over any byte buffer, for tests and embedders that
//!   already hold the sectors in memory.
use crate::error::ReadError;
use crate::os_options::{self, DIRECT_IO_ALIGNMENT};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

#[cfg(target_os = "linux")]
nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// A readable, byte-addressable source of raw sectors.
pub trait BlockSource {
    /// The path (or a descriptive label) used in logs and error messages.
    fn path(&self) -> &Path;

    /// Total size of the source in bytes, if it can be determined cheaply.
    fn capacity(&self) -> Option<u64> {
        None
    }

    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Implementations keep reading until the buffer is full or the source is
    /// exhausted, so a short count always means end of source.
    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// Reads from `reader` until `buf` is full or the reader reports EOF.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads into `buf` through a bounce buffer whose address and length are both
/// multiples of [`DIRECT_IO_ALIGNMENT`].
///
/// Unbuffered handles reject transfers that are not a whole number of logical
/// blocks, and cards with 4 KiB logical blocks exist. Rounding to 4 KiB covers
/// both those and 512-byte cards; the surplus is read and thrown away.
fn read_aligned<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let len = buf.len().div_ceil(DIRECT_IO_ALIGNMENT) * DIRECT_IO_ALIGNMENT;
    let mut raw = vec![0u8; len + DIRECT_IO_ALIGNMENT];
    let offset = raw.as_ptr().align_offset(DIRECT_IO_ALIGNMENT);
    let aligned = &mut raw[offset..offset + len];

    let n = fill(reader, aligned)?.min(buf.len());
    buf[..n].copy_from_slice(&aligned[..n]);
    Ok(n)
}

#[cfg(unix)]
fn is_raw_device(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::FileTypeExt;
    let file_type = std::fs::metadata(path)?.file_type();
    Ok(file_type.is_block_device() || file_type.is_char_device())
}

#[cfg(windows)]
fn is_raw_device(path: &Path) -> io::Result<bool> {
    Ok(path.as_os_str().to_string_lossy().starts_with(r"\\.\"))
}

#[cfg(not(any(unix, windows)))]
fn is_raw_device(_path: &Path) -> io::Result<bool> {
    Ok(false)
}

#[cfg(target_os = "linux")]
fn device_capacity(file: &File) -> Option<u64> {
    use std::os::unix::io::AsRawFd;
    let mut size_bytes: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer.
    unsafe { blkgetsize64(file.as_raw_fd(), &mut size_bytes) }.ok()?;
    (size_bytes > 0).then_some(size_bytes)
}

#[cfg(windows)]
pub(crate) fn device_capacity(file: &File) -> Option<u64> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::System::IO::DeviceIoControl;
    use windows_sys::Win32::System::Ioctl::{GET_LENGTH_INFORMATION, IOCTL_DISK_GET_LENGTH_INFO};

    let mut info = GET_LENGTH_INFORMATION { Length: 0 };
    let mut returned: u32 = 0;
    // SAFETY: the output buffer is a properly sized GET_LENGTH_INFORMATION and
    // the handle stays open for the duration of the call.
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            IOCTL_DISK_GET_LENGTH_INFO,
            std::ptr::null(),
            0,
            &mut info as *mut GET_LENGTH_INFORMATION as *mut _,
            std::mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    (ok != 0 && info.Length > 0).then_some(info.Length as u64)
}

#[cfg(not(any(target_os = "linux", windows)))]
fn device_capacity(_file: &File) -> Option<u64> {
    None
}

/// A raw block device, or an uncompressed dump of one.
///
/// Devices are opened unbuffered where the OS supports it, so the sectors
/// returned are what is on the card rather than what the page cache
/// remembers from an earlier read.
#[derive(Debug)]
pub struct DeviceSource {
    path: PathBuf,
    file: File,
    direct: bool,
    is_device: bool,
    capacity: Option<u64>,
}

impl DeviceSource {
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        let is_device = is_raw_device(path).map_err(|e| ReadError::from_io(path, e))?;

        let (file, direct) = if is_device {
            os_options::open_unbuffered(path)
        } else {
            File::open(path).map(|f| (f, false))
        }
        .map_err(|e| ReadError::from_io(path, e))?;

        let capacity = if is_device {
            device_capacity(&file)
        } else {
            file.metadata().ok().map(|m| m.len())
        };

        log::debug!(
            "opened {} (device: {is_device}, unbuffered: {direct}, capacity: {capacity:?})",
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            direct,
            is_device,
            capacity,
        })
    }

    /// `true` when the path is a block or character device rather than a file.
    pub fn is_device(&self) -> bool {
        self.is_device
    }

}

impl BlockSource for DeviceSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if self.direct && offset % DIRECT_IO_ALIGNMENT as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unbuffered reads must start on a 4 KiB boundary",
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        if self.direct {
            read_aligned(&mut self.file, buf)
        } else {
            fill(&mut self.file, buf)
        }
    }
}

/// Compression formats recognised for card dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// Picks a decoder from the file extension, if it names one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "gz" | "gzip" => Some(Compression::Gzip),
            "xz" => Some(Compression::Xz),
            "zst" | "zstd" => Some(Compression::Zstd),
            _ => None,
        }
    }
}

/// A compressed dump of a card, decoded on the fly.
///
/// Decoders can only move forward, so reads must not go back before the
/// current position.
pub struct ImageSource {
    path: PathBuf,
    compression: Compression,
    reader: Box<dyn Read>,
    position: u64,
}

impl ImageSource {
    pub fn open(path: &Path, compression: Compression) -> Result<Self, ReadError> {
        let input = File::open(path).map_err(|e| ReadError::from_io(path, e))?;
        let input = BufReader::new(input);

        let reader: Box<dyn Read> = match compression {
            Compression::Gzip => Box::new(GzDecoder::new(input)),
            Compression::Xz => Box::new(XzDecoder::new(input)),
            Compression::Zstd => {
                Box::new(ZstdDecoder::with_buffer(input).map_err(|e| ReadError::from_io(path, e))?)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            compression,
            reader,
            position: 0,
        })
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

impl BlockSource for ImageSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset < self.position {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "compressed images can only be read forward",
            ));
        }

        let skip = offset - self.position;
        if skip > 0 {
            let skipped = io::copy(&mut (&mut self.reader).take(skip), &mut io::sink())?;
            self.position += skipped;
            if skipped < skip {
                return Ok(0);
            }
        }

        let n = fill(&mut self.reader, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<T: AsRef<[u8]>> BlockSource for io::Cursor<T> {
    fn path(&self) -> &Path {
        Path::new("<memory>")
    }

    fn capacity(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        fill(self, buf)
    }
}

/// Opens `path` with the source type that fits it: a decoder for compressed
/// dumps, a [`DeviceSource`] for everything else.
pub fn open(path: &Path) -> Result<Box<dyn BlockSource>, ReadError> {
    match Compression::from_path(path) {
        Some(compression) => {
            log::debug!("{} looks like a {compression:?} image", path.display());
            Ok(Box::new(ImageSource::open(path, compression)?))
        }
        None => Ok(Box::new(DeviceSource::open(path)?)),
    }
}
