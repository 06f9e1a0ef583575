//! `advision.ini` configuration.
//!
//! The file is a single `[advision]` table of key = value pairs, which TOML
//! parses directly. Every value is range-checked on load; out-of-range
//! entries revert to their defaults with a warning rather than failing the
//! launch, and an inverted T1 pulse window restores both defaults (an
//! inverted pulse would wedge the firmware's sync poll).

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "advision.ini";

/// Audio output profiles: 0 = raw, 1 = speaker, 2 = headphone.
pub const PROFILE_SPEAKER: u8 = 1;
pub const PROFILE_COUNT: u8 = 3;

pub const PROFILE_NAMES: [&str; PROFILE_COUNT as usize] = ["Raw", "Speaker", "Headphone"];

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Output gain, 0-10.
    pub volume: i32,
    pub fullscreen: bool,
    /// Window multiplier, 0 = auto.
    pub scale: u32,
    pub audio_profile: u8,
    /// LED gamma, 0.2-3.0.
    pub gamma: f32,
    /// Phosphor decay per frame, 0.0-1.0.
    pub phosphor: f32,
    pub scanlines: bool,
    pub integer_scale: bool,
    /// T1 sensor pulse window in frame cycles.
    pub t1_pulse_start: u32,
    pub t1_pulse_end: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume: 7,
            fullscreen: false,
            scale: 0,
            audio_profile: PROFILE_SPEAKER,
            gamma: 1.0,
            phosphor: 0.45,
            scanlines: false,
            integer_scale: false,
            t1_pulse_start: 200,
            t1_pulse_end: 400,
        }
    }
}

// On-disk representation: integers for switches, matching the original
// key set exactly.
#[derive(Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    advision: Section,
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
struct Section {
    volume: i64,
    fullscreen: i64,
    scale: i64,
    audio_profile: i64,
    gamma: f64,
    phosphor: f64,
    scanlines: i64,
    integer_scale: i64,
    t1_pulse_start: i64,
    t1_pulse_end: i64,
}

impl Default for Section {
    fn default() -> Self {
        Section::from(&Config::default())
    }
}

impl From<&Config> for Section {
    fn from(cfg: &Config) -> Self {
        Self {
            volume: cfg.volume as i64,
            fullscreen: cfg.fullscreen as i64,
            scale: cfg.scale as i64,
            audio_profile: cfg.audio_profile as i64,
            gamma: cfg.gamma as f64,
            phosphor: cfg.phosphor as f64,
            scanlines: cfg.scanlines as i64,
            integer_scale: cfg.integer_scale as i64,
            t1_pulse_start: cfg.t1_pulse_start as i64,
            t1_pulse_end: cfg.t1_pulse_end as i64,
        }
    }
}

/// Validate one value against a range, reverting to the default with a
/// warning when it is out of bounds.
fn check<T: PartialOrd + Copy + std::fmt::Display>(key: &str, value: T, lo: T, hi: T, def: T) -> T {
    if value < lo || value > hi {
        warn!("config: {key} = {value} out of range [{lo}, {hi}], using {def}");
        def
    } else {
        value
    }
}

impl Config {
    /// Build a validated config from the raw file values.
    fn from_section(s: &Section) -> Self {
        let def = Config::default();
        let mut cfg = Config {
            volume: check("volume", s.volume, 0, 10, def.volume as i64) as i32,
            fullscreen: s.fullscreen != 0,
            scale: check("scale", s.scale, 0, 10, def.scale as i64) as u32,
            audio_profile: check(
                "audio_profile",
                s.audio_profile,
                0,
                (PROFILE_COUNT - 1) as i64,
                def.audio_profile as i64,
            ) as u8,
            gamma: {
                let g = if s.gamma.is_finite() { s.gamma } else { -1.0 };
                check("gamma", g, 0.2, 3.0, def.gamma as f64) as f32
            },
            phosphor: {
                let p = if s.phosphor.is_finite() { s.phosphor } else { -1.0 };
                check("phosphor", p, 0.0, 1.0, def.phosphor as f64) as f32
            },
            scanlines: s.scanlines != 0,
            integer_scale: s.integer_scale != 0,
            t1_pulse_start: check("t1_pulse_start", s.t1_pulse_start, 0, 999, 200) as u32,
            t1_pulse_end: check("t1_pulse_end", s.t1_pulse_end, 0, 1999, 400) as u32,
        };
        if cfg.t1_pulse_start >= cfg.t1_pulse_end {
            warn!("config: t1_pulse_start >= t1_pulse_end, using defaults");
            cfg.t1_pulse_start = def.t1_pulse_start;
            cfg.t1_pulse_end = def.t1_pulse_end;
        }
        cfg
    }

    /// Load from `path`; a missing or unparseable file yields the defaults.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Config::default();
        };
        match toml::from_str::<ConfigFile>(&text) {
            Ok(file) => Config::from_section(&file.advision),
            Err(e) => {
                warn!("config: cannot parse {}: {e}", path.display());
                Config::default()
            }
        }
    }

    /// Persist to `path`.
    pub fn save(&self, path: &Path) {
        let file = ConfigFile {
            advision: Section::from(self),
        };
        match toml::to_string(&file) {
            Ok(text) => {
                if let Err(e) = std::fs::write(path, text) {
                    warn!("config: cannot write {}: {e}", path.display());
                }
            }
            Err(e) => warn!("config: serialize failed: {e}"),
        }
    }
}

/// Resolve the config file location: a file in the working directory wins
/// (portable installs), otherwise the per-user config directory.
pub fn config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        let dir = dir.join("advision");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir.join(CONFIG_FILE);
        }
    }
    local
}
