//! The core, UI-agnostic library for the TIGR data extractor.
//!
//! A TIGR muon detector logs its readings as CSV text written straight into
//! the first sectors of its SD card, with no filesystem. `tigr-core` reads
//! those raw sectors and recovers the dataset from them. It can be driven by
//! any front end, whether the `tigr` command-line tool or a GUI.
//!
//! The library is structured into several modules:
//! - [`source`]: The [`source::BlockSource`] trait and its implementations for
//!   raw devices, card dumps and in-memory buffers.
//! - [`mod@read`]: The Block Reader, one bounded read from the start of a source.
//! - [`extract`]: The Record Extractor, which turns raw bytes into a
//!   [`extract::Dataset`].
//! - [`save`]: Writes a dataset to a CSV file, with optional verification.
//! - [`device`] and [`platform`]: Removable device discovery for device
//!   pickers.
//! - [`error`]: The error taxonomy shared by all of the above.
//!
//! Reading and extracting are deliberately separate steps. A read either
//! returns bytes or fails with a transport error; extraction is a pure
//! function of those bytes that fails only when no dataset is present.
//!
//! ## Example: Extracting a Dataset from a Card
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tigr_core::extract::ExtractOptions;
//! use tigr_core::read::DEFAULT_MAX_SECTORS;
//! use tigr_core::{read, extract, save};
//!
//! fn main() -> Result<(), tigr_core::error::Error> {
//!     let raw = read::run(Path::new("/dev/mmcblk0"), DEFAULT_MAX_SECTORS, |len| {
//!         println!("Reading {len} bytes...");
//!     })?;
//!
//!     let dataset = extract::extract_with(&raw, &ExtractOptions::default())?;
//!     println!("Extracted {} readings", dataset.reading_count());
//!
//!     save::run(&dataset, Path::new("tigr_data.csv"), true)?;
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod extract;
mod os_options;
pub mod platform;
pub mod read;
pub mod save;
pub mod source;

use std::num::NonZeroU32;
use std::path::Path;

/// Reads `source_path` and extracts the dataset from it in one call.
///
/// `on_read_start` receives the number of bytes about to be read, as in
/// [`read::run`].
pub fn extract_from(
    source_path: &Path,
    max_sectors: NonZeroU32,
    options: &extract::ExtractOptions,
    on_read_start: impl FnOnce(u64),
) -> error::Result<extract::Dataset> {
    let raw = read::run(source_path, max_sectors, on_read_start)?;
    Ok(extract::extract_with(&raw, options)?)
}
