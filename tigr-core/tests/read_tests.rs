mod common;

use common::{HEADER, card_image, init_logging};
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use std::io::{self, Cursor, Write};
use std::num::NonZeroU32;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};
use tigr_core::error::{Error, ExtractError, ReadError, Tier};
use tigr_core::extract::{ExtractOptions, extract};
use tigr_core::read::{self, DEFAULT_MAX_SECTORS, SECTOR_SIZE, read_blocks};
use tigr_core::source::{self, BlockSource, Compression, DeviceSource, ImageSource};

fn sectors(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

fn temp_file_with(bytes: &[u8]) -> NamedTempFile {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(bytes).unwrap();
    temp.flush().unwrap();
    temp
}

/// A source that refuses every read, like a device opened without privilege.
struct DeniedSource;

impl BlockSource for DeniedSource {
    fn path(&self) -> &Path {
        Path::new("/dev/mmcblk0")
    }

    fn read_range(&mut self, _offset: u64, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }
}

#[test]
fn test_default_window_is_1000_sectors() {
    assert_eq!(DEFAULT_MAX_SECTORS.get(), 1000);
    assert_eq!(read::window_len(DEFAULT_MAX_SECTORS), 512_000);
}

#[test]
fn test_read_stops_at_window() {
    let temp = temp_file_with(&vec![0xAB; SECTOR_SIZE * 3]);
    let mut source = DeviceSource::open(temp.path()).unwrap();

    let block = read_blocks(&mut source, sectors(2)).unwrap();
    assert_eq!(block.len(), SECTOR_SIZE * 2);
    assert_eq!(block.requested(), SECTOR_SIZE * 2);
    assert!(!block.is_truncated());
    assert!(!source.is_device());
    assert_eq!(source.capacity(), Some((SECTOR_SIZE * 3) as u64));
}

#[test]
fn test_short_source_is_not_an_error() {
    init_logging();
    let mut bytes = format!("{HEADER}\n").into_bytes();
    bytes.resize(100, 0);
    let temp = temp_file_with(&bytes);

    let block = read::run(temp.path(), DEFAULT_MAX_SECTORS, |_| {}).unwrap();
    assert_eq!(block.len(), 100);
    assert!(block.is_truncated());

    let dataset = extract(&block).unwrap();
    assert_eq!(dataset.to_csv(), HEADER);
    assert_eq!(dataset.reading_count(), 0);
}

#[test]
fn test_empty_source_reads_empty_block() {
    let temp = temp_file_with(b"");
    let block = read::run(temp.path(), sectors(4), |_| {}).unwrap();

    assert!(block.is_empty());
    assert_eq!(extract(&block), Err(ExtractError::NoDataFound));
}

#[test]
fn test_on_read_start_receives_window_length() {
    let temp = temp_file_with(&[0u8; 10]);
    let mut announced = None;
    read::run(temp.path(), sectors(8), |len| announced = Some(len)).unwrap();
    assert_eq!(announced, Some(8 * SECTOR_SIZE as u64));
}

#[test]
fn test_missing_source_is_source_not_found() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no-such-card");

    let err = read::run(&missing, DEFAULT_MAX_SECTORS, |_| {}).unwrap_err();
    assert!(matches!(err, ReadError::SourceNotFound { .. }), "got {err:?}");
    assert_eq!(err.source_path(), &missing);
}

#[test]
fn test_denied_read_is_access_denied_not_no_data() {
    let err = read_blocks(&mut DeniedSource, DEFAULT_MAX_SECTORS).unwrap_err();
    assert!(matches!(err, ReadError::AccessDenied { .. }), "got {err:?}");

    let err = Error::from(err);
    assert_eq!(err.tier(), Tier::Transport);
    assert!(!matches!(err, Error::Extract(ExtractError::NoDataFound)));
    assert!(!err.is_recoverable());
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_access_denied() {
    use std::os::unix::fs::PermissionsExt;

    // root ignores file permissions
    if nix::unistd::Uid::effective().is_root() {
        return;
    }

    let temp = temp_file_with(HEADER.as_bytes());
    std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o000)).unwrap();

    let err = read::run(temp.path(), DEFAULT_MAX_SECTORS, |_| {}).unwrap_err();
    assert!(matches!(err, ReadError::AccessDenied { .. }), "got {err:?}");
}

#[cfg(unix)]
#[test]
fn test_directory_source_is_io_failure() {
    let dir = TempDir::new().unwrap();
    let err = read::run(dir.path(), DEFAULT_MAX_SECTORS, |_| {}).unwrap_err();
    assert!(matches!(err, ReadError::IoFailure { .. }), "got {err:?}");
}

#[test]
fn test_memory_source() {
    let image = card_image(b"", format!("{HEADER}\n1,Red,0.5,3,OK\n").as_bytes(), 2);
    let mut source = Cursor::new(image);

    let block = read_blocks(&mut source, sectors(1)).unwrap();
    assert_eq!(block.len(), SECTOR_SIZE);
    assert_eq!(extract(&block).unwrap().reading_count(), 1);
}

#[test]
fn test_gzip_card_dump() {
    init_logging();
    let payload = format!("{HEADER}\n1,Red,0.5,3,OK\n2,Blue,0.7,1,OK\n");
    let image = card_image(b"\xeb\x58\x90MSDOS5.0", payload.as_bytes(), 16);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("card.img.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), GzLevel::default());
    encoder.write_all(&image).unwrap();
    encoder.finish().unwrap();

    let block = read::run(&path, sectors(4), |_| {}).unwrap();
    assert_eq!(block.len(), 4 * SECTOR_SIZE);
    assert_eq!(block.as_bytes(), &image[..4 * SECTOR_SIZE]);
    assert_eq!(extract(&block).unwrap().reading_count(), 2);
}

#[test]
fn test_zstd_card_dump_shorter_than_window() {
    let payload = format!("{HEADER}\n1,Red,0.5,3,OK\n");
    let image = card_image(b"", payload.as_bytes(), 2);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("card.img.zst");
    std::fs::write(&path, zstd::encode_all(image.as_slice(), 3).unwrap()).unwrap();

    let mut source = ImageSource::open(&path, Compression::Zstd).unwrap();
    assert_eq!(source.compression(), Compression::Zstd);

    let block = read_blocks(&mut source, DEFAULT_MAX_SECTORS).unwrap();
    assert_eq!(block.len(), image.len());
    assert!(block.is_truncated());
}

#[test]
fn test_compressed_source_reads_forward_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("card.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), GzLevel::fast());
    encoder.write_all(&[1u8; 2048]).unwrap();
    encoder.finish().unwrap();

    let mut source = source::open(&path).unwrap();
    let mut buf = [0u8; 512];
    assert_eq!(source.read_range(1024, &mut buf).unwrap(), 512);
    let err = source.read_range(0, &mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn test_corrupt_compressed_dump_is_io_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("card.img.xz");
    std::fs::write(&path, b"this is not xz data at all").unwrap();

    let err = read::run(&path, DEFAULT_MAX_SECTORS, |_| {}).unwrap_err();
    assert!(matches!(err, ReadError::IoFailure { .. }), "got {err:?}");
}

#[test]
fn test_extract_from_path_end_to_end() {
    let noise = b"1,2,3,4,5\nstale data from a previous run\n";
    let payload = format!("{HEADER}\n1,Red,0.5,3,OK\n2,Blue,0.7,1,OK\n");
    let temp = temp_file_with(&card_image(noise, payload.as_bytes(), 8));

    let dataset = tigr_core::extract_from(
        temp.path(),
        DEFAULT_MAX_SECTORS,
        &ExtractOptions::default(),
        |_| {},
    )
    .unwrap();

    assert_eq!(dataset.reading_count(), 2);
    assert_eq!(dataset.records()[0].as_str(), HEADER);
}

#[test]
fn test_extract_from_blank_card_is_content_error() {
    let temp = temp_file_with(&vec![0u8; SECTOR_SIZE * 4]);

    let err = tigr_core::extract_from(
        temp.path(),
        DEFAULT_MAX_SECTORS,
        &ExtractOptions::default(),
        |_| {},
    )
    .unwrap_err();

    assert!(matches!(err, Error::Extract(ExtractError::NoDataFound)));
    assert_eq!(err.tier(), Tier::Content);
    assert!(err.is_recoverable());
}
