use std::sync::{Arc, Mutex};

/// Describes a single input button that a machine accepts.
pub struct InputButton {
    /// Machine-defined button identifier, passed to `set_input()`.
    pub id: u8,
    /// Human-readable name for display/configuration (e.g., "Up", "Button 1").
    pub name: &'static str,
}

/// A pull-model mono sample source shared with the host audio thread.
///
/// The host locks the source once per audio callback and pulls one sample
/// per call; every other mutation of the underlying state (command delivery,
/// reset, savestate restore) must happen under the same lock.
pub trait AudioSource: Send {
    /// Produce the next sample in [-1.0, 1.0].
    fn next_sample(&mut self) -> f32;
}

/// Machine-agnostic interface for emulated systems.
///
/// The frontend is a pure rendering/input/audio engine that does not know
/// about specific hardware (port wiring, LED registers, sound protocols).
pub trait Machine {
    /// Native display resolution as (width, height) in pixels.
    fn display_size(&self) -> (u32, u32);

    /// Run one frame of emulation (advance the clock by one frame's worth of cycles).
    fn run_frame(&mut self);

    /// Render the current video state into an RGB24 pixel buffer.
    ///
    /// The buffer must be at least `width * height * 3` bytes (from
    /// `display_size()`), left-to-right, top-to-bottom, 3 bytes per pixel.
    fn render_frame(&self, buffer: &mut [u8]);

    /// Handle an input event. `button` is a machine-defined ID from `input_map()`.
    /// `pressed` is true for key-down, false for key-up.
    fn set_input(&mut self, button: u8, pressed: bool);

    /// Get the list of input buttons this machine accepts.
    fn input_map(&self) -> &[InputButton];

    /// Soft reset. ROM contents and battery-like state survive; see the
    /// machine's own documentation for what exactly persists.
    fn reset(&mut self);

    /// Shared handle to the machine's audio sample source, if it has sound.
    /// The frontend's audio callback pulls samples from it under its lock.
    fn audio_source(&self) -> Option<Arc<Mutex<dyn AudioSource>>> {
        None
    }

    /// Nominal frame rate in Hz, for host-side pacing.
    fn frame_rate_hz(&self) -> f64;
}
