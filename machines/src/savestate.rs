//! `AV13` savestate format, version 18.
//!
//! Fixed-width little-endian layout so snapshots travel between platforms:
//!
//! ```text
//! u32 magic "AV13"    u32 version
//! u8  A               u16 PC          u8 PSW          u8 SP
//! u8  flags           u8 flags2       u8 timer
//! u8  P1              u8 P2           u8 BUS
//! [u8; 64]  IRAM      [u8; 1024] XRAM
//! u32 prescaler       u64 cycles
//! u8  ctrl_loop/ctrl_vol/ctrl_fast/proto_state/proto_hi
//! u16 lfsr            u8 active       u8 is_noise     u8 command
//! f32 cur_freq        f32 cur_vol     u32 phase_acc   u32 phase_inc
//! i32 cur_step/step_count/step_samples_left/segment/
//!     seg_samples_left/seg_samples_total
//! f32 seg1_vol        f32 seg2_vol
//! 16x { f32 freq, u8 noise + 3 pad, i32 dur_ms, f32 volume }
//! ```
//!
//! flags: MB=0, C=1, AC=2, F0=3, F1=4, BS=5, timer_en=6, counter_en=7.
//! flags2: timer_ovf=0, tcnti_en=1, irq_en=2, irq_pend=3, in_irq=4.
//!
//! Loads are parse-then-apply: the whole blob is decoded and validated
//! before any machine state changes, so a rejected snapshot leaves the
//! running state untouched. Out-of-range playback fields are repaired
//! rather than rejected.

use advision_core::device::cop411::{EffectStep, MAX_STEPS};
use log::warn;

use crate::adventure_vision::{AdventureVision, XRAM_SIZE};

pub const SAVE_MAGIC: u32 = 0x4156_3133; // "AV13"
pub const SAVE_VERSION: u32 = 18;

/// Reasons a snapshot is rejected outright.
#[derive(Debug, PartialEq)]
pub enum SavestateError {
    /// Blob ends before the fixed layout does.
    Truncated,

    /// First word is not "AV13".
    BadMagic(u32),

    /// Version field does not match this build's format.
    BadVersion(u32),
}

impl std::fmt::Display for SavestateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "savestate truncated"),
            Self::BadMagic(m) => write!(f, "bad savestate magic 0x{m:08X}"),
            Self::BadVersion(v) => write!(f, "savestate version {v}, need {SAVE_VERSION}"),
        }
    }
}

impl std::error::Error for SavestateError {}

// ---------------------------------------------------------------------------
// Little-endian cursor helpers
// ---------------------------------------------------------------------------

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(1500),
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SavestateError> {
        if self.pos + n > self.data.len() {
            return Err(SavestateError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SavestateError> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16, SavestateError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32, SavestateError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn u64(&mut self) -> Result<u64, SavestateError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn i32(&mut self) -> Result<i32, SavestateError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn f32(&mut self) -> Result<f32, SavestateError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
}

// ---------------------------------------------------------------------------
// Serialize
// ---------------------------------------------------------------------------

/// Serialize the machine into an `AV13` blob. The sound engine is read
/// under the audio lock.
pub fn save_state(machine: &AdventureVision) -> Vec<u8> {
    let cpu = &machine.cpu;
    let mut w = Writer::new();

    w.u32(SAVE_MAGIC);
    w.u32(SAVE_VERSION);

    w.u8(cpu.a);
    w.u16(cpu.pc);
    let psw = ((cpu.c as u8) << 7)
        | ((cpu.ac as u8) << 6)
        | ((cpu.f0 as u8) << 5)
        | ((cpu.bs as u8) << 4)
        | (cpu.sp & 7);
    w.u8(psw);
    w.u8(cpu.sp);
    let flags = (cpu.mb as u8)
        | ((cpu.c as u8) << 1)
        | ((cpu.ac as u8) << 2)
        | ((cpu.f0 as u8) << 3)
        | ((cpu.f1 as u8) << 4)
        | ((cpu.bs as u8) << 5)
        | ((cpu.timer_en as u8) << 6)
        | ((cpu.counter_en as u8) << 7);
    w.u8(flags);
    let flags2 = (cpu.timer_ovf as u8)
        | ((cpu.tcnti_en as u8) << 1)
        | ((cpu.irq_en as u8) << 2)
        | ((cpu.irq_pend as u8) << 3)
        | ((cpu.in_irq as u8) << 4);
    w.u8(flags2);
    w.u8(cpu.timer);
    w.u8(cpu.p1);
    w.u8(cpu.p2);
    w.u8(cpu.bus_latch);
    w.bytes(&cpu.iram);
    w.bytes(&machine.board.xram);
    w.u32(cpu.prescaler);
    w.u64(cpu.cycles);

    let snd = machine.snd.lock().unwrap();
    w.u8(snd.ctrl_loop);
    w.u8(snd.ctrl_vol);
    w.u8(snd.ctrl_fast);
    w.u8(snd.proto_state);
    w.u8(snd.proto_hi);
    w.u16(snd.lfsr);
    w.u8(snd.active as u8);
    w.u8(snd.is_noise as u8);
    w.u8(snd.command);
    w.f32(snd.cur_freq);
    w.f32(snd.cur_vol);
    w.u32(snd.phase_acc);
    w.u32(snd.phase_inc);
    w.i32(snd.cur_step);
    w.i32(snd.step_count);
    w.i32(snd.step_samples_left);
    w.i32(snd.segment);
    w.i32(snd.seg_samples_left);
    w.i32(snd.seg_samples_total);
    w.f32(snd.seg1_vol);
    w.f32(snd.seg2_vol);
    for step in &snd.steps {
        w.f32(step.freq);
        w.u8(step.noise as u8);
        w.bytes(&[0, 0, 0]); // pad to the fixed 16-byte record
        w.i32(step.dur_ms);
        w.f32(step.volume);
    }

    w.buf
}

// ---------------------------------------------------------------------------
// Deserialize
// ---------------------------------------------------------------------------

/// Restore the machine from an `AV13` blob.
///
/// On any rejection (magic, version, truncation) the machine is untouched.
/// ROM contents are never part of a snapshot and always survive.
pub fn load_state(machine: &mut AdventureVision, data: &[u8]) -> Result<(), SavestateError> {
    let mut r = Reader::new(data);

    let magic = r.u32()?;
    if magic != SAVE_MAGIC {
        warn!("savestate rejected: bad magic 0x{magic:08X}");
        return Err(SavestateError::BadMagic(magic));
    }
    let version = r.u32()?;
    if version != SAVE_VERSION {
        warn!("savestate rejected: version {version}, need {SAVE_VERSION}");
        return Err(SavestateError::BadVersion(version));
    }

    // Parse everything before touching the machine.
    let a = r.u8()?;
    let pc = r.u16()?;
    let psw = r.u8()?;
    let sp = r.u8()?;
    let flags = r.u8()?;
    let flags2 = r.u8()?;
    let timer = r.u8()?;
    let p1 = r.u8()?;
    let p2 = r.u8()?;
    let bus_latch = r.u8()?;
    let iram: [u8; 64] = r.take(64)?.try_into().unwrap();
    let xram: [u8; XRAM_SIZE] = r.take(XRAM_SIZE)?.try_into().unwrap();
    let prescaler = r.u32()?;
    let cycles = r.u64()?;

    let ctrl_loop = r.u8()?;
    let ctrl_vol = r.u8()?;
    let ctrl_fast = r.u8()?;
    let proto_state = r.u8()?;
    let proto_hi = r.u8()?;
    let lfsr = r.u16()?;
    let active = r.u8()? != 0;
    let is_noise = r.u8()? != 0;
    let command = r.u8()?;
    let cur_freq = r.f32()?;
    let cur_vol = r.f32()?;
    let phase_acc = r.u32()?;
    let phase_inc = r.u32()?;
    let cur_step = r.i32()?;
    let step_count = r.i32()?;
    let step_samples_left = r.i32()?;
    let segment = r.i32()?;
    let seg_samples_left = r.i32()?;
    let seg_samples_total = r.i32()?;
    let seg1_vol = r.f32()?;
    let seg2_vol = r.f32()?;
    let mut steps = [EffectStep::default(); MAX_STEPS];
    for step in steps.iter_mut() {
        step.freq = r.f32()?;
        step.noise = r.u8()? != 0;
        r.take(3)?; // pad
        step.dur_ms = r.i32()?;
        step.volume = r.f32()?;
    }

    // Apply: CPU first.
    let cpu = &mut machine.cpu;
    cpu.a = a;
    cpu.pc = pc & 0xFFF;
    cpu.psw = psw;
    cpu.sp = sp & 7;
    cpu.mb = flags & 0x01 != 0;
    cpu.c = flags & 0x02 != 0;
    cpu.ac = flags & 0x04 != 0;
    cpu.f0 = flags & 0x08 != 0;
    cpu.f1 = flags & 0x10 != 0;
    cpu.bs = flags & 0x20 != 0;
    cpu.timer_en = flags & 0x40 != 0;
    cpu.counter_en = flags & 0x80 != 0;
    cpu.timer_ovf = flags2 & 0x01 != 0;
    cpu.tcnti_en = flags2 & 0x02 != 0;
    cpu.irq_en = flags2 & 0x04 != 0;
    cpu.irq_pend = flags2 & 0x08 != 0;
    cpu.in_irq = flags2 & 0x10 != 0;
    cpu.timer = timer;
    cpu.p1 = p1;
    cpu.p2 = p2;
    cpu.bus_latch = bus_latch;
    cpu.iram = iram;
    cpu.prescaler = prescaler;
    cpu.cycles = cycles;
    cpu.ei_delay = 0;

    // Board shadows follow the restored latches.
    machine.board.xram = xram;
    machine.board.p1 = p1;
    machine.board.p2 = p2;
    machine.board.prev_p2 = p2;

    // Sound under the audio lock, then repair any out-of-range values.
    {
        let mut snd = machine.snd.lock().unwrap();
        snd.ctrl_loop = ctrl_loop;
        snd.ctrl_vol = ctrl_vol;
        snd.ctrl_fast = ctrl_fast;
        snd.proto_state = proto_state;
        snd.proto_hi = proto_hi;
        snd.lfsr = lfsr;
        snd.active = active;
        snd.is_noise = is_noise;
        snd.command = command;
        snd.cur_freq = cur_freq;
        snd.cur_vol = cur_vol;
        snd.phase_acc = phase_acc;
        snd.phase_inc = phase_inc;
        snd.cur_step = cur_step;
        snd.step_count = step_count;
        snd.step_samples_left = step_samples_left;
        snd.segment = segment;
        snd.seg_samples_left = seg_samples_left;
        snd.seg_samples_total = seg_samples_total;
        snd.seg1_vol = seg1_vol;
        snd.seg2_vol = seg2_vol;
        snd.steps = steps;
        snd.sanitize();
    }

    Ok(())
}
