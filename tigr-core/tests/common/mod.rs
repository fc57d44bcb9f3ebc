#![allow(dead_code)]
use std::sync::Once;
use tigr_core::read::SECTOR_SIZE;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub const HEADER: &str = "Muon#,Band,Freq,Val,Flag";

/// Lays `payload` out the way the detector does: a few sectors of noise from
/// the card's previous life, then the dataset, then zero padding up to a
/// whole number of sectors.
pub fn card_image(noise: &[u8], payload: &[u8], total_sectors: usize) -> Vec<u8> {
    let mut image = Vec::with_capacity(total_sectors * SECTOR_SIZE);
    image.extend_from_slice(noise);
    image.extend_from_slice(payload);
    assert!(image.len() <= total_sectors * SECTOR_SIZE, "fixture too large");
    image.resize(total_sectors * SECTOR_SIZE, 0);
    image
}
