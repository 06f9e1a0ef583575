//! COP411L sound co-processor — behavioral emulation.
//!
//! The COP411L is a 4-bit microcontroller with a 512x8 mask ROM holding
//! Entex's sound firmware and 32x4 of RAM. The ROM has never been dumped,
//! so the documented sound behaviors are reproduced behaviorally: the
//! command protocol, the control register, the scripted effects, and the
//! 16 pure tones with their hardware-measured frequencies.
//!
//! Command set:
//!   $0x = control register (fast, volume pair, loop); silences
//!   $1x = continuous noise
//!   $2x = high->low square slide (shooting)
//!   $3x = 5-pitch noise explosion, chains to cmd 2 when looping
//!   $4x = low->high square slide (reward)
//!   $5x = low->high noise slide (thrusters), loops last pitch only
//!   $6x = high->low noise slide (explosion/landing), never loops
//!   $7x = medium->low square slide (enemy shooting)
//!   $8x = very fast low->high square
//!   $9x = quick low->high square (jump/alarm)
//!   $Ax-$Dx = undocumented, minimal placeholder
//!   $Ex,$Fx = pure tones (16 notes, ~A#3 to ~C#5)
//!
//! Commands arrive as a two-nibble handshake over port 2: $C0 resets the
//! protocol, the next two writes carry the command nibbles in P2[7:4]
//! (P2[3:0] carries ROM bank address, not sound data), and $00 closes the
//! sequence.

use crate::core::machine::AudioSource;

/// Maximum steps in an effect script.
pub const MAX_STEPS: usize = 16;

/// Pure-tone frequency table, hardware-measured at the 52.6 kHz RC clock.
/// These are the actual COP411L output frequencies, not equal-temperament
/// approximations.
pub const NOTE_FREQ: [f32; 16] = [
    239.23, // 0: ~A#3
    253.03, // 1: ~B3
    268.53, // 2: ~C4
    286.04, // 3: ~C#4
    302.48, // 4: ~D4
    320.92, // 5: ~D#4
    337.38, // 6: ~E4
    360.49, // 7: ~F4
    381.38, // 8: ~F#4
    404.85, // 9: ~G4
    424.44, // 10: ~G#4
    453.72, // 11: ~A4
    478.46, // 12: ~A#4
    506.07, // 13: ~B4
    537.05, // 14: ~C5
    572.08, // 15: ~C#5
];

/// One entry of an effect script: a pitch, a waveform selector, a duration,
/// and a relative volume.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EffectStep {
    /// Hz (0 = silence).
    pub freq: f32,
    /// true = LFSR noise, false = square wave.
    pub noise: bool,
    /// Step duration in milliseconds (before the fast-bit scaling applied
    /// at build time).
    pub dur_ms: i32,
    /// Relative volume 0.0-1.0.
    pub volume: f32,
}

/// Protocol states for the two-nibble command handshake.
pub const PROTO_IDLE: u8 = 0;
pub const PROTO_RESET: u8 = 1;
pub const PROTO_GOT_HI: u8 = 2;
pub const PROTO_DISPATCHED: u8 = 3;

/// Behavioral COP411L sound engine.
///
/// Shared between the frame-driver thread (command delivery, reset,
/// savestate restore) and the audio thread (sample pulls); every access
/// goes through the one mutex the owner wraps this in.
pub struct Cop411 {
    // Control register. Lives in COP411L RAM, which the MCS-48 reset line
    // does not touch, so it survives soft reset.
    pub ctrl_loop: u8,
    pub ctrl_vol: u8,
    pub ctrl_fast: u8,

    // Command protocol state
    pub proto_state: u8,
    pub proto_hi: u8,

    // Current playback
    pub active: bool,
    pub is_noise: bool,
    /// cmd 1 always loops; cmd 6 never loops.
    pub force_loop: bool,
    pub force_no_loop: bool,
    pub command: u8,

    // Step sequencer for scripted effects
    pub steps: [EffectStep; MAX_STEPS],
    pub step_count: i32,
    pub cur_step: i32,
    pub step_samples_left: i32,

    // Waveform state
    pub cur_freq: f32,
    pub phase_acc: u32,
    pub phase_inc: u32,

    // 15-bit noise LFSR, never zero
    pub lfsr: u16,

    // Volume
    pub seg1_vol: f32,
    pub seg2_vol: f32,
    pub cur_vol: f32,

    // Pure-tone two-segment timing
    pub segment: i32,
    pub seg_samples_total: i32,
    pub seg_samples_left: i32,

    /// Command to build when the current effect runs out (cmd 3 -> cmd 2).
    pub chain_cmd: u8,

    sample_rate: u32,
}

impl Cop411 {
    pub fn new(sample_rate: u32) -> Self {
        let mut snd = Self {
            ctrl_loop: 0,
            ctrl_vol: 0,
            ctrl_fast: 0,
            proto_state: PROTO_IDLE,
            proto_hi: 0,
            active: false,
            is_noise: false,
            force_loop: false,
            force_no_loop: false,
            command: 0,
            steps: [EffectStep::default(); MAX_STEPS],
            step_count: 0,
            cur_step: 0,
            step_samples_left: 0,
            cur_freq: 0.0,
            phase_acc: 0,
            phase_inc: 0,
            lfsr: 0x7FFF,
            seg1_vol: 1.0,
            seg2_vol: 0.5,
            cur_vol: 0.0,
            segment: 0,
            seg_samples_total: 0,
            seg_samples_left: 0,
            chain_cmd: 0,
            sample_rate,
        };
        // Keep the segment volume pair derived from ctrl_vol from the
        // start, so a saved state always re-serializes identically after a
        // load (sanitize re-derives the pair).
        snd.update_ctrl_vol();
        snd
    }

    /// Soft reset. COP411L RAM is not wired to the MCS-48 reset line, so
    /// the control register survives; everything else clears.
    pub fn soft_reset(&mut self) {
        let (l, v, f) = (self.ctrl_loop, self.ctrl_vol, self.ctrl_fast);
        *self = Self::new(self.sample_rate);
        self.ctrl_loop = l;
        self.ctrl_vol = v;
        self.ctrl_fast = f;
        self.update_ctrl_vol();
    }

    /// Derive the tone segment volume pair from ctrl_vol:
    /// 0 = low/low, 1 = high/low, 2-3 = high/high.
    pub fn update_ctrl_vol(&mut self) {
        match self.ctrl_vol {
            0 => {
                self.seg1_vol = 0.4;
                self.seg2_vol = 0.4;
            }
            1 => {
                self.seg1_vol = 1.0;
                self.seg2_vol = 0.4;
            }
            _ => {
                self.seg1_vol = 1.0;
                self.seg2_vol = 1.0;
            }
        }
    }

    /// Duration multiplier from the control-register fast bit.
    fn speed(&self) -> f32 {
        if self.ctrl_fast != 0 { 0.5 } else { 1.0 }
    }

    /// Phase increment for a frequency at the output sample rate.
    fn phase_inc_for(&self, freq: f32) -> u32 {
        if freq <= 0.0 {
            return 0;
        }
        ((freq / self.sample_rate as f32) * 4294967296.0) as u32
    }

    fn ms_to_samples(&self, ms: i32) -> i32 {
        ((ms as i64 * self.sample_rate as i64) / 1000).max(1) as i32
    }

    /// Clock the 15-bit LFSR (taps at bits 0 and 1).
    fn lfsr_clock(&mut self) {
        let bit = (self.lfsr ^ (self.lfsr >> 1)) & 1;
        self.lfsr = (self.lfsr >> 1) | (bit << 14);
    }

    // ===== Command protocol =====

    /// Observe a port-2 write and run the two-nibble handshake:
    /// $C0 -> reset, then the command high and low nibbles arrive in
    /// P2[7:4], and $00 closes the sequence. A $00 in place of the low
    /// nibble dispatches the high nibble alone.
    pub fn port2_write(&mut self, val: u8) {
        match self.proto_state {
            PROTO_IDLE if val == 0xC0 => {
                self.proto_state = PROTO_RESET;
                self.proto_hi = 0;
            }
            PROTO_RESET => {
                self.proto_hi = (val >> 4) & 0x0F;
                self.proto_state = PROTO_GOT_HI;
            }
            PROTO_GOT_HI => {
                if val == 0x00 {
                    let cmd = self.proto_hi << 4;
                    self.command_byte(cmd);
                    self.proto_state = PROTO_IDLE;
                } else {
                    let lo = (val >> 4) & 0x0F;
                    let cmd = (self.proto_hi << 4) | lo;
                    self.command_byte(cmd);
                    self.proto_state = PROTO_DISPATCHED;
                }
            }
            PROTO_DISPATCHED if val == 0x00 => self.proto_state = PROTO_IDLE,
            _ => {}
        }
    }

    /// Dispatch a reassembled command byte.
    pub fn command_byte(&mut self, cmd_byte: u8) {
        let cmd = (cmd_byte >> 4) & 0x0F;
        let data = cmd_byte & 0x0F;

        match cmd {
            0x0 => {
                // Control register: bit 0 = fast, bits 1-2 = volume pair,
                // bit 3 = loop. Silences the current sound.
                self.ctrl_fast = data & 0x01;
                self.ctrl_vol = (data >> 1) & 0x03;
                self.ctrl_loop = (data >> 3) & 0x01;
                self.update_ctrl_vol();
                self.active = false;
            }
            0xE | 0xF => self.start_tone(data),
            _ => self.build_effect(cmd, data),
        }
    }

    // ===== Effect scripts =====

    /// Build the step table for a scripted effect and start its first step.
    pub fn build_effect(&mut self, cmd: u8, _data: u8) {
        self.command = cmd;
        self.active = true;
        self.cur_step = 0;
        self.step_count = 0;
        self.chain_cmd = 0;
        self.force_loop = false;
        self.force_no_loop = false;
        self.segment = 0;
        self.phase_acc = 0;

        let spd = self.speed();
        let ms = |base: f32| (base * spd) as i32;

        match cmd {
            0x1 => {
                // Continuous noise; loops regardless of the control register
                self.force_loop = true;
                self.step_count = 1;
                self.steps[0] = EffectStep {
                    freq: 800.0,
                    noise: true,
                    dur_ms: ms(200.0),
                    volume: 0.8,
                };
            }
            0x2 => {
                // High->low square slide ("pew")
                let n = 8;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 1200.0 - i as f32 * (900.0 / n as f32),
                        noise: false,
                        dur_ms: ms(25.0),
                        volume: 1.0 - i as f32 * 0.08,
                    };
                }
            }
            0x3 => {
                // 5-pitch noise explosion; chains into cmd 2 when looping
                let pitches = [1000.0, 800.0, 600.0, 400.0, 250.0];
                self.step_count = pitches.len() as i32;
                for (i, &freq) in pitches.iter().enumerate() {
                    self.steps[i] = EffectStep {
                        freq,
                        noise: true,
                        dur_ms: ms(60.0),
                        volume: 1.0 - i as f32 * 0.12,
                    };
                }
                if self.ctrl_loop != 0 {
                    self.chain_cmd = 0x02;
                }
            }
            0x4 => {
                // Low->high square slide (reward)
                let n = 8;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 300.0 + i as f32 * (900.0 / n as f32),
                        noise: false,
                        dur_ms: ms(30.0),
                        volume: 0.7 + i as f32 * 0.04,
                    };
                }
            }
            0x5 => {
                // Low->high noise slide (thrusters); loops from the last
                // pitch so the engine keeps running
                let n = 10;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 200.0 + i as f32 * (600.0 / n as f32),
                        noise: true,
                        dur_ms: ((40 + i as i32 * 8) as f32 * spd) as i32,
                        volume: 0.6 + i as f32 * 0.04,
                    };
                }
                self.force_loop = self.ctrl_loop != 0;
            }
            0x6 => {
                // High->low noise slide (explosion/landing); never loops
                self.force_no_loop = true;
                let n = 12;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 1200.0 - i as f32 * (900.0 / n as f32),
                        noise: true,
                        dur_ms: ((30 + i as i32 * 10) as f32 * spd) as i32,
                        volume: 1.0 - i as f32 * 0.06,
                    };
                }
            }
            0x7 => {
                // Medium->low square slide (enemy shooting)
                let n = 6;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 800.0 - i as f32 * (500.0 / n as f32),
                        noise: false,
                        dur_ms: ms(30.0),
                        volume: 0.9 - i as f32 * 0.1,
                    };
                }
            }
            0x8 => {
                // Very fast low->high square (phone ring when looped)
                let n = 6;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 400.0 + i as f32 * (800.0 / n as f32),
                        noise: false,
                        dur_ms: ms(12.0),
                        volume: 0.8,
                    };
                }
            }
            0x9 => {
                // Quick low->high square (jump / alarm when looped)
                let n = 8;
                self.step_count = n as i32;
                for i in 0..n {
                    self.steps[i] = EffectStep {
                        freq: 300.0 + i as f32 * (600.0 / n as f32),
                        noise: false,
                        dur_ms: ms(18.0),
                        volume: 0.85,
                    };
                }
            }
            0xA..=0xD => {
                // Mask ROM undumped; approximate as a brief pitch blip
                self.step_count = 1;
                self.steps[0] = EffectStep {
                    freq: 300.0 + (cmd - 0xA) as f32 * 100.0,
                    noise: false,
                    dur_ms: ms(50.0),
                    volume: 0.5,
                };
            }
            _ => {
                self.active = false;
                return;
            }
        }

        if self.step_count > 0 {
            self.load_step(0);
        }
    }

    fn load_step(&mut self, index: usize) {
        let s = self.steps[index];
        self.cur_freq = s.freq;
        self.is_noise = s.noise;
        self.cur_vol = s.volume;
        self.phase_inc = self.phase_inc_for(s.freq);
        self.step_samples_left = self.ms_to_samples(s.dur_ms);
    }

    // ===== Pure tones =====

    /// Start pure tone `note` (commands $E/$F). Tones play in two segments
    /// with per-segment volumes from the control register: 117 ms then
    /// 240 ms (46/104 ms with the fast bit), restarting from segment 1
    /// while the loop bit is set.
    pub fn start_tone(&mut self, note: u8) {
        self.active = true;
        self.is_noise = false;
        self.command = 0x0E;
        self.cur_step = 0;
        self.step_count = 0;
        self.chain_cmd = 0;
        self.force_loop = false;
        self.force_no_loop = false;

        let freq = NOTE_FREQ[(note & 0x0F) as usize];
        self.cur_freq = freq;
        self.phase_inc = self.phase_inc_for(freq);

        self.segment = 0;
        self.update_ctrl_vol();
        self.cur_vol = self.seg1_vol;

        let seg1_ms = if self.ctrl_fast != 0 { 46 } else { 117 };
        self.seg_samples_total = self.ms_to_samples(seg1_ms);
        self.seg_samples_left = self.seg_samples_total;
    }

    // ===== Synthesis =====

    /// Generate one output sample and advance the sequencer.
    pub fn sample(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }

        self.phase_acc = self.phase_acc.wrapping_add(self.phase_inc);
        let out = if self.is_noise {
            // Re-clock the LFSR whenever the accumulator wraps, i.e. at
            // roughly the programmed frequency.
            if self.phase_acc < self.phase_inc {
                self.lfsr_clock();
            }
            if self.lfsr & 1 != 0 { 1.0 } else { -1.0 }
        } else if self.phase_acc & 0x8000_0000 != 0 {
            1.0
        } else {
            -1.0
        };
        let out = out * self.cur_vol;

        if self.step_count > 0 {
            // Scripted effect: count down the step budget
            self.step_samples_left -= 1;
            if self.step_samples_left <= 0 {
                self.cur_step += 1;
                if self.cur_step >= self.step_count {
                    if self.chain_cmd != 0 {
                        let chain = self.chain_cmd;
                        self.build_effect(chain, 0);
                        return out;
                    }
                    let should_loop = if self.force_no_loop {
                        false
                    } else {
                        self.force_loop || self.ctrl_loop != 0
                    };
                    if should_loop {
                        // Command 5 holds its final pitch when looping
                        self.cur_step = if self.command == 0x05 {
                            self.step_count - 1
                        } else {
                            0
                        };
                    } else {
                        self.active = false;
                        return out;
                    }
                }
                // Cursor corruption deactivates rather than reads out of range
                if self.cur_step < 0 || self.cur_step >= MAX_STEPS as i32 {
                    self.active = false;
                    return out;
                }
                self.load_step(self.cur_step as usize);
            }
        } else {
            // Pure tone: two-segment envelope
            self.seg_samples_left -= 1;
            if self.seg_samples_left <= 0 {
                if self.segment == 0 {
                    self.segment = 1;
                    self.cur_vol = self.seg2_vol;
                    let seg2_ms = if self.ctrl_fast != 0 { 104 } else { 240 };
                    self.seg_samples_left = self.ms_to_samples(seg2_ms);
                } else if self.ctrl_loop != 0 {
                    self.segment = 0;
                    self.cur_vol = self.seg1_vol;
                    self.seg_samples_left = self.seg_samples_total;
                } else {
                    self.active = false;
                }
            }
        }

        out
    }

    /// Repair state loaded from an untrusted snapshot: clamp cursors into
    /// range, replace non-finite floats, and unstick a zero LFSR.
    pub fn sanitize(&mut self) {
        if self.lfsr == 0 {
            self.lfsr = 0x7FFF;
        }
        self.ctrl_loop &= 1;
        self.ctrl_vol &= 3;
        self.ctrl_fast &= 1;
        if self.proto_state > PROTO_DISPATCHED {
            self.proto_state = PROTO_IDLE;
        }
        self.proto_hi &= 0x0F;
        if self.step_count < 0 || self.step_count > MAX_STEPS as i32 {
            self.step_count = 0;
        }
        if self.cur_step < 0 || self.cur_step >= self.step_count {
            self.cur_step = 0;
        }
        if self.segment < 0 || self.segment > 1 {
            self.segment = 0;
        }
        self.step_samples_left = self.step_samples_left.max(0);
        self.seg_samples_left = self.seg_samples_left.max(0);
        self.seg_samples_total = self.seg_samples_total.max(0);
        if !self.cur_freq.is_finite() || self.cur_freq < 0.0 {
            self.cur_freq = 0.0;
        }
        if !self.cur_vol.is_finite() || self.cur_vol < 0.0 {
            self.cur_vol = 0.0;
        }
        if self.cur_vol > 2.0 {
            self.cur_vol = 1.0;
        }
        if !self.seg1_vol.is_finite() {
            self.seg1_vol = 1.0;
        }
        if !self.seg2_vol.is_finite() {
            self.seg2_vol = 0.5;
        }
        for i in 0..self.step_count.max(0) as usize {
            let st = &mut self.steps[i];
            if !st.freq.is_finite() || st.freq < 0.0 {
                st.freq = 0.0;
            }
            if !st.volume.is_finite() || st.volume < 0.0 {
                st.volume = 0.0;
            }
            if st.volume > 2.0 {
                st.volume = 1.0;
            }
            if st.dur_ms < 0 {
                st.dur_ms = 1;
            }
        }
        self.update_ctrl_vol();
    }
}

impl AudioSource for Cop411 {
    fn next_sample(&mut self) -> f32 {
        self.sample()
    }
}
