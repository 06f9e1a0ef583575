//! Firmware and cartridge image loading.
//!
//! Adventure Vision images are loose binary files: a 1 KiB firmware ROM
//! and cartridges of up to 4 KiB. Wrong-sized files are not fatal -- short
//! loads pad, long loads truncate, and both are warned about so a corrupted
//! dump is at least visible.

use std::path::{Path, PathBuf};

use log::warn;

use crate::adventure_vision::{CARTRIDGE_SIZE, FIRMWARE_SIZE};

/// Errors that can occur when loading a ROM image.
#[derive(Debug)]
pub enum RomLoadError {
    /// Underlying I/O error (file not found, permission denied, etc.)
    Io(std::io::Error),

    /// The file exists but contains no data.
    Empty(PathBuf),
}

impl std::fmt::Display for RomLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Empty(path) => write!(f, "empty ROM image: {}", path.display()),
        }
    }
}

impl std::error::Error for RomLoadError {}

impl From<std::io::Error> for RomLoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Read an image file, truncating to `max_size` with a warning.
fn load_image(path: &Path, max_size: usize) -> Result<Vec<u8>, RomLoadError> {
    let mut data = std::fs::read(path)?;
    if data.is_empty() {
        return Err(RomLoadError::Empty(path.to_path_buf()));
    }
    if data.len() > max_size {
        warn!(
            "{} is {} bytes, truncating to {max_size}",
            path.display(),
            data.len()
        );
        data.truncate(max_size);
    }
    Ok(data)
}

/// Load a firmware image. Exactly 1024 bytes expected; anything else is
/// warned about when the machine ingests it.
pub fn load_firmware_file(path: &Path) -> Result<Vec<u8>, RomLoadError> {
    load_image(path, FIRMWARE_SIZE)
}

/// Load a cartridge image of up to 4096 bytes.
pub fn load_cartridge_file(path: &Path) -> Result<Vec<u8>, RomLoadError> {
    load_image(path, CARTRIDGE_SIZE)
}

/// Derive a per-game savestate filename from a cartridge path:
/// `advision_<slug>.sav`, where the slug keeps lowercase alphanumerics and
/// collapses spaces to underscores.
pub fn savestate_name_for(cartridge_path: &Path) -> String {
    let stem = cartridge_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut slug = String::with_capacity(stem.len());
    for ch in stem.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if ch == ' ' && !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    if slug.is_empty() {
        slug.push_str("game");
    }
    format!("advision_{slug}.sav")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savestate_name_slugs_cartridge_stem() {
        assert_eq!(
            savestate_name_for(Path::new("/roms/Defender V1.bin")),
            "advision_defender_v1.sav"
        );
        assert_eq!(savestate_name_for(Path::new("---.bin")), "advision_game.sav");
    }

    #[test]
    fn oversized_image_truncates() {
        let dir = std::env::temp_dir().join("advision_romload_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("big.bin");
        std::fs::write(&path, vec![0xAAu8; CARTRIDGE_SIZE + 100]).unwrap();
        let data = load_cartridge_file(&path).unwrap();
        assert_eq!(data.len(), CARTRIDGE_SIZE);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_image_is_rejected() {
        let dir = std::env::temp_dir().join("advision_romload_empty_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.bin");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            load_firmware_file(&path),
            Err(RomLoadError::Empty(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
