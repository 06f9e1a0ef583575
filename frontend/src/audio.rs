//! SDL audio output.
//!
//! The callback pulls samples straight from the machine's sound engine
//! under its mutex (the same lock the frame driver takes for command
//! delivery and savestate restore), applies the selected output profile
//! and user gain, and tees the result into the WAV capture channel while
//! recording. Gain/profile/recording are plain atomics: they are mixer
//! settings, not engine state.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use advision_core::core::machine::AudioSource;
use crossbeam_channel::{Receiver, Sender, bounded};
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

use crate::config::{PROFILE_COUNT, PROFILE_SPEAKER};

pub const SAMPLE_RATE: u32 = 44_100;
const BUFFER_SAMPLES: u16 = 512; // ~11.6 ms at 44.1 kHz

/// WAV tee capacity: ~0.75 s of audio; overflow drops samples rather than
/// blocking the callback.
const WAV_CHANNEL_CAPACITY: usize = 32_768;

/// Per-profile single-pole low-pass coefficients (1.0 = no filtering).
const PROFILE_LP_ALPHA: [f32; PROFILE_COUNT as usize] = [1.0, 0.45, 0.7];

/// Shared knobs the UI thread adjusts while the callback runs.
pub struct AudioControls {
    pub volume: Arc<AtomicI32>,
    pub profile: Arc<AtomicU8>,
    pub recording: Arc<AtomicBool>,
    /// Drain side of the WAV tee; the main loop empties it to disk.
    pub wav_rx: Receiver<i16>,
}

pub struct AudioPlayer {
    source: Arc<Mutex<dyn AudioSource>>,
    volume: Arc<AtomicI32>,
    profile: Arc<AtomicU8>,
    recording: Arc<AtomicBool>,
    wav_tx: Sender<i16>,
    lp_prev: f32,
}

impl AudioCallback for AudioPlayer {
    type Channel = i16;

    fn callback(&mut self, out: &mut [i16]) {
        let mut source = self.source.lock().unwrap();
        let vol = self.volume.load(Ordering::Relaxed).clamp(0, 10);
        let amplitude = (300 * vol) as f32; // 3000 peak at volume 10
        let profile = self
            .profile
            .load(Ordering::Relaxed)
            .min(PROFILE_COUNT - 1);
        let alpha = PROFILE_LP_ALPHA[profile as usize];
        let recording = self.recording.load(Ordering::Relaxed);

        for sample in out.iter_mut() {
            let s = source.next_sample();
            self.lp_prev += alpha * (s - self.lp_prev);
            let mut f = self.lp_prev;
            // Small-speaker distortion: soften everything past +/-0.8
            if profile == PROFILE_SPEAKER && f.abs() > 0.8 {
                f = if f > 0.0 {
                    0.8 + 0.2 * ((f - 0.8) * 5.0).tanh()
                } else {
                    -0.8 + 0.2 * ((f + 0.8) * 5.0).tanh()
                };
            }
            let v = (f * amplitude) as i16;
            *sample = v;
            if recording {
                // Never block the callback; a full channel loses samples
                let _ = self.wav_tx.try_send(v);
            }
        }
    }
}

/// Open the SDL playback device wired to the machine's sound engine.
/// Returns the device (keep it alive; it starts paused) and the control
/// handles. `None` if the machine has no audio source.
pub fn init(
    sdl_audio: &sdl2::AudioSubsystem,
    source: Option<Arc<Mutex<dyn AudioSource>>>,
    volume: i32,
    profile: u8,
) -> Option<(AudioDevice<AudioPlayer>, AudioControls)> {
    let source = source?;

    let volume = Arc::new(AtomicI32::new(volume));
    let profile = Arc::new(AtomicU8::new(profile));
    let recording = Arc::new(AtomicBool::new(false));
    let (wav_tx, wav_rx) = bounded(WAV_CHANNEL_CAPACITY);

    let desired_spec = AudioSpecDesired {
        freq: Some(SAMPLE_RATE as i32),
        channels: Some(1),
        samples: Some(BUFFER_SAMPLES),
    };

    let device = sdl_audio
        .open_playback(None, &desired_spec, |_spec| AudioPlayer {
            source,
            volume: Arc::clone(&volume),
            profile: Arc::clone(&profile),
            recording: Arc::clone(&recording),
            wav_tx,
            lp_prev: 0.0,
        })
        .ok()?;

    Some((
        device,
        AudioControls {
            volume,
            profile,
            recording,
            wav_rx,
        },
    ))
}
