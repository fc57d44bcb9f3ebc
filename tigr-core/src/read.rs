//! Contains the Block Reader: one bounded read from the start of a source.
use crate::error::ReadError;
use crate::source::{self, BlockSource};
use std::io;
use std::num::NonZeroU32;
use std::path::Path;

/// Size of one raw sector on the card.
pub const SECTOR_SIZE: usize = 512;

/// The detector only ever writes into the first ~512 KB of the card.
pub const DEFAULT_MAX_SECTORS: NonZeroU32 = match NonZeroU32::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// The bytes returned by a single read.
///
/// Its length is `max_sectors * SECTOR_SIZE`, or less when the source ended
/// early. Nothing about its structure is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    bytes: Vec<u8>,
    requested: usize,
}

impl RawBlock {
    /// Wraps bytes that were obtained some other way (a test fixture, a
    /// buffer handed over by an embedding application).
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let requested = bytes.len();
        Self { bytes, requested }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes that were asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// `true` if the source yielded fewer bytes than requested.
    pub fn is_truncated(&self) -> bool {
        self.bytes.len() < self.requested
    }
}

/// Byte length of a capture window of `max_sectors` sectors.
pub fn window_len(max_sectors: NonZeroU32) -> u64 {
    u64::from(max_sectors.get()) * SECTOR_SIZE as u64
}

/// Reads up to `max_sectors` sectors from the start of `source`.
///
/// A source shorter than the window is not an error; the returned block is
/// simply shorter. There are no retries: a failed read fails the run.
///
/// # Errors
///
/// Returns [`ReadError::AccessDenied`], [`ReadError::SourceNotFound`] or
/// [`ReadError::IoFailure`] depending on what the OS reported.
pub fn read_blocks<S>(source: &mut S, max_sectors: NonZeroU32) -> Result<RawBlock, ReadError>
where
    S: BlockSource + ?Sized,
{
    let window = window_len(max_sectors);
    let requested = usize::try_from(window).map_err(|_| {
        ReadError::from_io(
            source.path(),
            io::Error::new(io::ErrorKind::InvalidInput, "capture window does not fit in memory"),
        )
    })?;

    if let Some(capacity) = source.capacity() {
        if capacity < window {
            log::warn!(
                "{} holds {capacity} bytes, less than the {window} byte capture window",
                source.path().display()
            );
        }
    }

    let mut bytes = vec![0u8; requested];
    let n = source
        .read_range(0, &mut bytes)
        .map_err(|e| ReadError::from_io(source.path(), e))?;
    bytes.truncate(n);

    log::info!("read {n} of {requested} bytes from {}", source.path().display());

    Ok(RawBlock { bytes, requested })
}

/// Opens `source_path` and reads the capture window from it.
///
/// `on_read_start` is called once the source is open, with the number of
/// bytes about to be requested, so a front end can show what is happening
/// while the (blocking) read runs.
pub fn run(
    source_path: &Path,
    max_sectors: NonZeroU32,
    on_read_start: impl FnOnce(u64),
) -> Result<RawBlock, ReadError> {
    let mut source = source::open(source_path)?;
    on_read_start(window_len(max_sectors));
    read_blocks(source.as_mut(), max_sectors)
}
