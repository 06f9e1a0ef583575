//! WAV capture.
//!
//! The audio callback tees its output into a bounded channel; the main
//! loop drains that channel to disk once per frame so the file write never
//! happens on the audio thread. A 44-byte placeholder header is written up
//! front and the RIFF/data sizes are patched on close.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use log::warn;

pub struct WavWriter {
    file: BufWriter<File>,
    path: PathBuf,
    samples_written: u32,
    sample_rate: u32,
}

impl WavWriter {
    /// Create the file and write the placeholder header.
    pub fn create(path: &Path, sample_rate: u32) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut w = Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            samples_written: 0,
            sample_rate,
        };
        w.write_header(0)?;
        Ok(w)
    }

    fn write_header(&mut self, data_size: u32) -> std::io::Result<()> {
        let byte_rate = self.sample_rate * 2;
        self.file.write_all(b"RIFF")?;
        self.file.write_all(&(data_size + 36).to_le_bytes())?;
        self.file.write_all(b"WAVEfmt ")?;
        self.file.write_all(&16u32.to_le_bytes())?; // fmt chunk size
        self.file.write_all(&1u16.to_le_bytes())?; // PCM
        self.file.write_all(&1u16.to_le_bytes())?; // mono
        self.file.write_all(&self.sample_rate.to_le_bytes())?;
        self.file.write_all(&byte_rate.to_le_bytes())?;
        self.file.write_all(&2u16.to_le_bytes())?; // block align
        self.file.write_all(&16u16.to_le_bytes())?; // bits per sample
        self.file.write_all(b"data")?;
        self.file.write_all(&data_size.to_le_bytes())?;
        Ok(())
    }

    /// Drain everything currently queued by the audio callback.
    pub fn drain(&mut self, rx: &Receiver<i16>) {
        for sample in rx.try_iter() {
            if let Err(e) = self.file.write_all(&sample.to_le_bytes()) {
                warn!("wav: write failed: {e}");
                return;
            }
            self.samples_written += 1;
        }
    }

    /// Patch the header sizes and close the file.
    pub fn finish(mut self, rx: &Receiver<i16>) {
        self.drain(rx);
        let data_size = self.samples_written * 2;
        let result = self
            .file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.write_header(data_size))
            .and_then(|_| self.file.flush());
        if let Err(e) = result {
            warn!("wav: finalize {} failed: {e}", self.path.display());
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
