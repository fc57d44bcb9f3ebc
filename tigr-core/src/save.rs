//! Contains the logic for persisting an extracted dataset to a CSV file.
//!
//! The file is written to a temporary file next to the destination and then
//! renamed into place, so an interrupted run never leaves a half-written CSV
//! behind. It can optionally be verified by reading it back and comparing
//! SHA-256 digests.
use crate::error::SaveError;
use crate::extract::Dataset;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Default output file name, as the analyzer expects it.
pub const DEFAULT_OUTPUT: &str = "tigr_data.csv";

/// What was written by [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
    pub verified: bool,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SaveError + '_ {
    move |cause| SaveError::Io {
        path: path.to_path_buf(),
        cause,
    }
}

/// Hashes the contents of `path`.
fn hash_file(path: &Path) -> Result<String, SaveError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer).map_err(io_error(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes `dataset` as CSV to `output_path`, replacing any existing file.
///
/// # Arguments
///
/// * `dataset` - The records to write.
/// * `output_path` - Destination file. Its parent directory must exist.
/// * `verify` - If `true`, the file is read back after the rename and its
///   digest compared with the digest of the data that was written.
///
/// # Errors
///
/// Returns [`SaveError::Io`] if the file cannot be written, or
/// [`SaveError::VerificationFailed`] if the read-back digest differs.
pub fn run(dataset: &Dataset, output_path: &Path, verify: bool) -> Result<SaveReport, SaveError> {
    let csv = dataset.to_csv();
    let expected = format!("{:x}", Sha256::digest(csv.as_bytes()));

    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(dir).map_err(io_error(output_path))?;
    {
        let mut writer = BufWriter::new(&mut temp_file);
        writer.write_all(csv.as_bytes()).map_err(io_error(output_path))?;
        writer.flush().map_err(io_error(output_path))?;
    }
    temp_file
        .as_file()
        .sync_all()
        .map_err(io_error(output_path))?;
    temp_file
        .persist(output_path)
        .map_err(|e| io_error(output_path)(e.error))?;

    log::info!("wrote {} bytes to {}", csv.len(), output_path.display());

    if verify {
        let actual = hash_file(output_path)?;
        if actual != expected {
            return Err(SaveError::VerificationFailed {
                path: output_path.to_path_buf(),
            });
        }
        log::debug!("verified {} ({expected})", output_path.display());
    }

    Ok(SaveReport {
        path: output_path.to_path_buf(),
        bytes_written: csv.len() as u64,
        sha256: expected,
        verified: verify,
    })
}
