use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write an RGB24 buffer as a PNG.
pub fn save_png(path: &Path, rgb: &[u8], width: u32, height: u32) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    writer
        .write_image_data(rgb)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(())
}

/// Timestamped screenshot filename in the working directory.
pub fn screenshot_name() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("advision_{secs}.png")
}
