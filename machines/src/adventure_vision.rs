use std::sync::{Arc, Mutex};

use advision_core::core::bus::{Bus, PORT_BUS, PORT_P1, PORT_P2, PORT_T0, PORT_T1};
use advision_core::core::machine::{AudioSource, InputButton, Machine};
use advision_core::cpu::{I8048, I8048State};
use advision_core::device::cop411::Cop411;
use advision_core::device::led_display::{LedDisplay, SCREEN_HEIGHT, SCREEN_WIDTH};
use log::warn;

use crate::rewind::{REWIND_FRAMES, RewindRing, RewindSnapshot};

// ---------------------------------------------------------------------------
// Input button IDs
// ---------------------------------------------------------------------------
pub const INPUT_UP: u8 = 0;
pub const INPUT_DOWN: u8 = 1;
pub const INPUT_LEFT: u8 = 2;
pub const INPUT_RIGHT: u8 = 3;
pub const INPUT_BUTTON_1: u8 = 4;
pub const INPUT_BUTTON_2: u8 = 5;
pub const INPUT_BUTTON_3: u8 = 6;
pub const INPUT_BUTTON_4: u8 = 7;

const AV_INPUT_MAP: &[InputButton] = &[
    InputButton {
        id: INPUT_UP,
        name: "Up",
    },
    InputButton {
        id: INPUT_DOWN,
        name: "Down",
    },
    InputButton {
        id: INPUT_LEFT,
        name: "Left",
    },
    InputButton {
        id: INPUT_RIGHT,
        name: "Right",
    },
    InputButton {
        id: INPUT_BUTTON_1,
        name: "Button 1",
    },
    InputButton {
        id: INPUT_BUTTON_2,
        name: "Button 2",
    },
    InputButton {
        id: INPUT_BUTTON_3,
        name: "Button 3",
    },
    InputButton {
        id: INPUT_BUTTON_4,
        name: "Button 4",
    },
];

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------
// Crystal: 11 MHz, 15 clocks per machine cycle -> 733.3 kHz.
// Mirror: 15 revolutions per second, one frame per revolution.
// Frame: 733333 / 15 = 48889 machine cycles.

pub const CPU_CLOCK_HZ: u32 = 733_333;
pub const FRAME_RATE: u32 = 15;
pub const CYCLES_PER_FRAME: u32 = 48_889;

/// Default T1 mirror-sensor pulse window, in frame cycles. T1 is LOW inside
/// [start, end) and HIGH otherwise; the LOW->HIGH edge is the display sync.
pub const DEFAULT_T1_PULSE: (u32, u32) = (200, 400);

/// Estimated length of the firmware's column-output burst after sync:
/// per column, P2 setup + five MOVX reads + the P2.4 strobe is about 17
/// cycles, so 150 columns take roughly 2550. Drives the fallback column
/// mapping only.
const DISPLAY_WINDOW_CYCLES: u32 = 2_550;

pub const FIRMWARE_SIZE: usize = 1024;
pub const CARTRIDGE_SIZE: usize = 4096;
pub const XRAM_SIZE: usize = 1024;

pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Default, Clone, Copy)]
struct InputState {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    b1: bool,
    b2: bool,
    b3: bool,
    b4: bool,
}

/// Everything the CPU reaches over the bus: ROMs, banked external RAM, the
/// display, the sound co-processor, the button matrix, and the test pins.
///
/// The board shadows the CPU's P1/P2 output latches (updated on every port
/// write) so that ROM gating, RAM banking, and the LED latch can be resolved
/// during CPU bus cycles without reaching back into the CPU.
pub(crate) struct Board {
    pub(crate) irom: [u8; FIRMWARE_SIZE],
    pub(crate) erom: [u8; CARTRIDGE_SIZE],
    pub(crate) xram: [u8; XRAM_SIZE],
    pub(crate) disp: LedDisplay,
    pub(crate) snd: Arc<Mutex<Cop411>>,
    input: InputState,

    /// Port shadows, kept in lockstep with the CPU latches.
    pub(crate) p1: u8,
    pub(crate) p2: u8,
    /// Previous P2 value for P2.4 edge detection.
    pub(crate) prev_p2: u8,

    /// T0 is tied high (the expansion port is absent).
    t0: bool,
    /// T1 mirror sensor level, driven by the frame step.
    pub(crate) t1: bool,
}

impl Board {
    fn new(snd: Arc<Mutex<Cop411>>) -> Self {
        let mut board = Self {
            irom: [0; FIRMWARE_SIZE],
            erom: [0; CARTRIDGE_SIZE],
            xram: [0; XRAM_SIZE],
            disp: LedDisplay::new(),
            snd,
            input: InputState::default(),
            p1: advision_core::cpu::i8048::RESET_P1,
            p2: advision_core::cpu::i8048::RESET_P2,
            prev_p2: 0,
            t0: true,
            t1: false,
        };
        board.seed_xram();
        board
    }

    /// Power-up / reset RAM pattern: bank 0 clears, banks 1-3 read 0xFF
    /// (all LEDs dark in video RAM terms).
    fn seed_xram(&mut self) {
        self.xram[..0x100].fill(0x00);
        self.xram[0x100..].fill(0xFF);
    }

    /// External pull state of the P1 pins: all lines high until a button
    /// grounds its AND-mask.
    fn button_mask(&self) -> u8 {
        let mut ext = 0xFFu8;
        if self.input.b1 {
            ext &= !0x30;
        }
        if self.input.b2 {
            ext &= !0x50;
        }
        if self.input.b3 {
            ext &= !0x08;
        }
        if self.input.b4 {
            ext &= !0x90;
        }
        if self.input.up {
            ext &= !0x20;
        }
        if self.input.down {
            ext &= !0x10;
        }
        if self.input.right {
            ext &= !0x40;
        }
        if self.input.left {
            ext &= !0x80;
        }
        ext
    }

    /// Full external-RAM index: P1[1:0] selects the 256-byte bank.
    #[inline]
    fn xram_index(&self, addr: u16) -> usize {
        ((((self.p1 & 0x03) as usize) << 8) | (addr as usize & 0xFF)) & (XRAM_SIZE - 1)
    }
}

impl Bus for Board {
    /// Program fetch. Addresses below 0x400 come from the internal firmware
    /// ROM while P1.2 is low; everything else reads the cartridge. The full
    /// 12-bit address indexes the cartridge directly (the firmware keeps
    /// P2[3:0] synchronized with PC around external jumps).
    fn read(&mut self, addr: u16) -> u8 {
        let addr = (addr & 0xFFF) as usize;
        if addr < FIRMWARE_SIZE && self.p1 & 0x04 == 0 {
            self.irom[addr]
        } else {
            self.erom[addr & (CARTRIDGE_SIZE - 1)]
        }
    }

    fn io_read(&mut self, addr: u16) -> u8 {
        match addr {
            // External RAM window. The read data is simultaneously latched
            // into the LED register selected by P2 -- the hardware wires the
            // LED registers to the data lines, which is how the firmware
            // fills a column at full bus speed.
            0x000..=0x0FF => {
                let val = self.xram[self.xram_index(addr)];
                self.disp.latch_data(self.p2, val);
                val
            }
            PORT_BUS => 0xFF, // pulled high, nothing drives it
            PORT_P1 => self.button_mask(),
            PORT_P2 => self.p2,
            PORT_T0 => self.t0 as u8,
            PORT_T1 => self.t1 as u8,
            _ => 0xFF,
        }
    }

    fn io_write(&mut self, addr: u16, data: u8) {
        match addr {
            0x000..=0x0FF => {
                let index = self.xram_index(addr);
                self.xram[index] = data;
            }
            PORT_BUS => {}
            PORT_P1 => self.p1 = data,
            PORT_P2 => {
                // P2.4 rising edge strobes the LED registers into the
                // current display column.
                if data & 0x10 != 0 && self.prev_p2 & 0x10 == 0 {
                    self.disp.latch_column();
                }
                self.prev_p2 = data;
                self.p2 = data;

                // Sound command protocol rides the same port; the engine
                // mutates only under the audio lock.
                self.snd.lock().unwrap().port2_write(data);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// Entex Adventure Vision (1982).
///
/// Hardware: Intel 8048 @ 733 kHz, 1 KiB firmware ROM, 4 KiB cartridge,
/// 1 KiB external RAM in four banks, a 40-LED column display scanned by a
/// spinning mirror (150 columns per frame at 15 Hz), and a COP411L sound
/// co-processor commanded over port 2.
pub struct AdventureVision {
    pub(crate) cpu: I8048,
    pub(crate) board: Board,
    pub(crate) snd: Arc<Mutex<Cop411>>,

    frame_count: u64,

    // Display configuration
    phosphor_decay: f32,
    led_gamma: f32,
    midframe_scan: bool,
    t1_pulse: (u32, u32),

    // Per-frame sync bookkeeping
    sync_seen: bool,
    sync_cycle: u32,

    rewind: RewindRing,
}

impl Default for AdventureVision {
    fn default() -> Self {
        Self::new()
    }
}

impl AdventureVision {
    pub fn new() -> Self {
        let snd = Arc::new(Mutex::new(Cop411::new(AUDIO_SAMPLE_RATE)));
        Self {
            cpu: I8048::new(),
            board: Board::new(Arc::clone(&snd)),
            snd,
            frame_count: 0,
            phosphor_decay: advision_core::device::led_display::DEFAULT_PHOSPHOR_DECAY,
            led_gamma: 1.0,
            midframe_scan: true,
            t1_pulse: DEFAULT_T1_PULSE,
            sync_seen: false,
            sync_cycle: 0,
            rewind: RewindRing::new(REWIND_FRAMES),
        }
    }

    /// Load the 1 KiB system firmware. Short images pad with zero bytes,
    /// long ones truncate; both are warned about.
    pub fn load_firmware(&mut self, data: &[u8]) {
        if data.len() != FIRMWARE_SIZE {
            warn!(
                "firmware image is {} bytes, expected {FIRMWARE_SIZE}",
                data.len()
            );
        }
        let n = data.len().min(FIRMWARE_SIZE);
        self.board.irom[..n].copy_from_slice(&data[..n]);
        self.board.irom[n..].fill(0);
    }

    /// Load a cartridge image of up to 4 KiB. Oversized images truncate.
    pub fn load_cartridge(&mut self, data: &[u8]) {
        if data.len() > CARTRIDGE_SIZE {
            warn!(
                "cartridge image is {} bytes, truncating to {CARTRIDGE_SIZE}",
                data.len()
            );
        }
        let n = data.len().min(CARTRIDGE_SIZE);
        self.board.erom[..n].copy_from_slice(&data[..n]);
        self.board.erom[n..].fill(0);
    }

    /// Per-frame phosphor decay factor (0.0-1.0).
    pub fn set_phosphor_decay(&mut self, decay: f32) {
        self.phosphor_decay = decay.clamp(0.0, 1.0);
    }

    /// LED gamma applied by `render_frame` (0.2-3.0, 1.0 = linear).
    pub fn set_led_gamma(&mut self, gamma: f32) {
        self.led_gamma = gamma.clamp(0.2, 3.0);
    }

    /// Enable/disable the mid-frame fallback column capture.
    pub fn set_midframe_scan(&mut self, on: bool) {
        self.midframe_scan = on;
    }

    pub fn midframe_scan(&self) -> bool {
        self.midframe_scan
    }

    /// Configure the T1 sensor pulse window in frame cycles. An inverted
    /// window would park the firmware's sync poll forever, so it falls back
    /// to the defaults.
    pub fn set_t1_pulse(&mut self, start: u32, end: u32) {
        if start >= end {
            warn!("t1 pulse window {start}..{end} is inverted, using defaults");
            self.t1_pulse = DEFAULT_T1_PULSE;
        } else {
            self.t1_pulse = (start, end);
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Concrete handle to the sound engine (command injection in tests,
    /// tools that inspect playback state). Lock it for every access.
    pub fn sound_engine(&self) -> Arc<Mutex<Cop411>> {
        Arc::clone(&self.snd)
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// CPU register snapshot for the debug dump.
    pub fn cpu_state(&self) -> I8048State {
        self.cpu.snapshot()
    }

    /// The 150x40 phosphor buffer, row-major.
    pub fn phosphor(&self) -> &[f32] {
        self.board.disp.phosphor()
    }

    /// ASCII rendering of the phosphor buffer for the headless dump.
    pub fn dump_phosphor_ascii(&self) -> String {
        let mut out = String::with_capacity((SCREEN_WIDTH + 1) * SCREEN_HEIGHT);
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                let v = self.board.disp.pixel(x, y);
                out.push(if v > 0.7 {
                    '#'
                } else if v > 0.3 {
                    '*'
                } else if v > 0.05 {
                    '.'
                } else {
                    ' '
                });
            }
            out.push('\n');
        }
        out
    }

    /// Count of pixels above an intensity threshold (statistics overlay).
    pub fn lit_pixels(&self, threshold: f32) -> usize {
        self.board
            .disp
            .phosphor()
            .iter()
            .filter(|&&p| p > threshold)
            .count()
    }

    /// Step back up to `frames` snapshots from the rewind ring. Returns how
    /// many were actually popped.
    pub fn rewind(&mut self, frames: usize) -> usize {
        let mut popped = 0;
        for _ in 0..frames {
            let Some(snap) = self.rewind.pop() else { break };
            let mut snd = self.snd.lock().unwrap();
            snap.restore(&mut self.cpu, &mut self.board, &mut snd);
            popped += 1;
        }
        popped
    }

    /// T1 level for a given in-frame cycle count: LOW inside the pulse
    /// window, HIGH elsewhere.
    #[inline]
    fn t1_level(&self, elapsed: u32) -> bool {
        !(elapsed >= self.t1_pulse.0 && elapsed < self.t1_pulse.1)
    }
}

impl Machine for AdventureVision {
    fn display_size(&self) -> (u32, u32) {
        (SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32)
    }

    /// One mirror revolution: run the CPU for the frame's cycle budget,
    /// generating the T1 sync pulse and watching the display output path,
    /// then commit the captured columns to the phosphor buffer.
    fn run_frame(&mut self) {
        self.sync_seen = false;
        self.sync_cycle = 0;
        self.board.disp.begin_frame();

        let mut elapsed: u32 = 0;
        while elapsed < CYCLES_PER_FRAME {
            let prev_t1 = self.board.t1;
            let cy = self.cpu.step(&mut self.board);
            elapsed += cy;
            let new_t1 = self.t1_level(elapsed);

            // T1 rising edge = mirror back at start position. First one of
            // the frame becomes the display sync and rewinds the column
            // counter.
            if !prev_t1 && new_t1 && !self.sync_seen {
                self.sync_cycle = elapsed;
                self.sync_seen = true;
                self.board.disp.reset_column_counter();
            }

            // Fallback path for code that never strobes P2.4: sample video
            // RAM over the estimated column-output window after sync.
            if self.midframe_scan && !self.board.disp.led_active() && self.sync_seen {
                let offset = elapsed - self.sync_cycle;
                if offset <= DISPLAY_WINDOW_CYCLES {
                    let col = (offset as usize * SCREEN_WIDTH) / DISPLAY_WINDOW_CYCLES as usize;
                    self.board.disp.capture_column(&self.board.xram, col);
                }
            }

            // Counter mode counts T1 falling edges between instructions.
            if self.cpu.counter_en && prev_t1 && !new_t1 {
                self.cpu.clock_timer();
            }
            self.board.t1 = new_t1;
        }

        // Homebrew without the firmware display routine and with mid-frame
        // scan off: snapshot all of video RAM at frame end.
        if !self.board.disp.led_active() && !self.midframe_scan {
            for col in 0..SCREEN_WIDTH {
                self.board.disp.capture_column(&self.board.xram, col);
            }
        }

        self.board.disp.update(self.phosphor_decay);
        self.frame_count += 1;

        // Rewind snapshot; the sound fields are read under the audio lock.
        let snap = {
            let snd = self.snd.lock().unwrap();
            RewindSnapshot::capture(&self.cpu, &self.board, &snd)
        };
        self.rewind.push(snap);
    }

    /// Red LED rendition of the phosphor buffer: warm red at full
    /// intensity, deep crimson as it fades.
    fn render_frame(&self, buffer: &mut [u8]) {
        let phosphor = self.board.disp.phosphor();
        for (i, &intensity) in phosphor.iter().enumerate() {
            let off = i * 3;
            if off + 2 >= buffer.len() {
                break;
            }
            if intensity < 0.01 {
                buffer[off] = 0;
                buffer[off + 1] = 0;
                buffer[off + 2] = 0;
                continue;
            }
            let ig = if self.led_gamma != 1.0 {
                intensity.powf(self.led_gamma)
            } else {
                intensity
            };
            buffer[off] = (ig * 255.0) as u8;
            buffer[off + 1] = (ig * ig * 25.0) as u8;
            buffer[off + 2] = (ig * ig * ig * 6.0) as u8;
        }
    }

    fn set_input(&mut self, button: u8, pressed: bool) {
        let input = &mut self.board.input;
        match button {
            INPUT_UP => input.up = pressed,
            INPUT_DOWN => input.down = pressed,
            INPUT_LEFT => input.left = pressed,
            INPUT_RIGHT => input.right = pressed,
            INPUT_BUTTON_1 => input.b1 = pressed,
            INPUT_BUTTON_2 => input.b2 = pressed,
            INPUT_BUTTON_3 => input.b3 = pressed,
            INPUT_BUTTON_4 => input.b4 = pressed,
            _ => {}
        }
    }

    fn input_map(&self) -> &[InputButton] {
        AV_INPUT_MAP
    }

    /// Soft reset: registers and RAM clear and the ROMs survive. The
    /// COP411L control register also survives -- it lives in COP411L RAM,
    /// which the 8048 reset line does not touch.
    fn reset(&mut self) {
        self.cpu = I8048::new();
        self.board.seed_xram();
        self.board.input = InputState::default();
        self.board.p1 = advision_core::cpu::i8048::RESET_P1;
        self.board.p2 = advision_core::cpu::i8048::RESET_P2;
        self.board.prev_p2 = 0;
        self.board.t0 = true;
        self.board.t1 = false;
        self.board.disp.clear_phosphor();
        self.board.disp.begin_frame();
        self.snd.lock().unwrap().soft_reset();
        self.frame_count = 0;
        self.sync_seen = false;
        self.sync_cycle = 0;
    }

    fn audio_source(&self) -> Option<Arc<Mutex<dyn AudioSource>>> {
        Some(Arc::clone(&self.snd) as Arc<Mutex<dyn AudioSource>>)
    }

    fn frame_rate_hz(&self) -> f64 {
        FRAME_RATE as f64
    }
}
