//! Test fixture creation for the database and uploads

use super::constants::*;
use anyhow::Result;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use moodify_server::user::{SqliteUserStore, UserManager};
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

/// Creates a temporary database with the two test users registered.
/// Returns (temp_dir, db_path)
pub fn create_test_db_with_users() -> Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("moodify.db");

    let store = SqliteUserStore::new(&db_path)?;
    let user_manager = UserManager::new(Box::new(store));
    user_manager.register(TEST_USER, TEST_PASS, TEST_EMAIL)?;
    user_manager.register(OTHER_USER, OTHER_PASS, OTHER_EMAIL)?;

    Ok((dir, db_path))
}

/// A mono 16-bit PCM WAV file holding a sine tone.
pub fn sine_wav_bytes(sample_rate: u32, seconds: f32, frequency: f32) -> Vec<u8> {
    let n_samples = (sample_rate as f32 * seconds) as u32;
    let data_len = n_samples * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for i in 0..n_samples {
        let t = i as f32 / sample_rate as f32;
        let value = (t * frequency * std::f32::consts::TAU).sin() * 0.5;
        bytes.extend_from_slice(&((value * i16::MAX as f32) as i16).to_le_bytes());
    }
    bytes
}

/// A small grayscale PNG, good enough for the face preprocessing.
pub fn face_png_bytes() -> Vec<u8> {
    let image = GrayImage::from_fn(96, 96, |x, y| Luma([((x + y) % 256) as u8]));
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}
