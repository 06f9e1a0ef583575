//! Frame-granular rewind ring.
//!
//! One compact snapshot per frame: CPU core, both RAMs, the phosphor
//! buffer, and the handful of sound fields that must survive a step back
//! (control register, protocol state, LFSR). The ring is owned by the
//! frame-driver thread; the audio thread never sees it.

use advision_core::cpu::I8048;
use advision_core::device::cop411::Cop411;

use crate::adventure_vision::Board;

/// 8 seconds of history at 15 fps.
pub const REWIND_FRAMES: usize = 120;

/// State captured once per frame.
pub struct RewindSnapshot {
    // CPU
    a: u8,
    pc: u16,
    sp: u8,
    psw: u8,
    mb: bool,
    c: bool,
    ac: bool,
    f0: bool,
    f1: bool,
    bs: bool,
    timer: u8,
    timer_en: bool,
    counter_en: bool,
    timer_ovf: bool,
    tcnti_en: bool,
    irq_en: bool,
    irq_pend: bool,
    in_irq: bool,
    prescaler: u32,
    p1: u8,
    p2: u8,
    bus_latch: u8,
    iram: [u8; 64],

    // Board
    xram: Vec<u8>,
    phosphor: Vec<f32>,

    // Sound (persistent subset only)
    snd_ctrl_loop: u8,
    snd_ctrl_vol: u8,
    snd_ctrl_fast: u8,
    snd_proto_state: u8,
    snd_proto_hi: u8,
    snd_lfsr: u16,
}

impl RewindSnapshot {
    pub(crate) fn capture(cpu: &I8048, board: &Board, snd: &Cop411) -> Self {
        Self {
            a: cpu.a,
            pc: cpu.pc,
            sp: cpu.sp,
            psw: cpu.psw,
            mb: cpu.mb,
            c: cpu.c,
            ac: cpu.ac,
            f0: cpu.f0,
            f1: cpu.f1,
            bs: cpu.bs,
            timer: cpu.timer,
            timer_en: cpu.timer_en,
            counter_en: cpu.counter_en,
            timer_ovf: cpu.timer_ovf,
            tcnti_en: cpu.tcnti_en,
            irq_en: cpu.irq_en,
            irq_pend: cpu.irq_pend,
            in_irq: cpu.in_irq,
            prescaler: cpu.prescaler,
            p1: cpu.p1,
            p2: cpu.p2,
            bus_latch: cpu.bus_latch,
            iram: cpu.iram,
            xram: board.xram.to_vec(),
            phosphor: board.disp.phosphor().to_vec(),
            snd_ctrl_loop: snd.ctrl_loop,
            snd_ctrl_vol: snd.ctrl_vol,
            snd_ctrl_fast: snd.ctrl_fast,
            snd_proto_state: snd.proto_state,
            snd_proto_hi: snd.proto_hi,
            snd_lfsr: snd.lfsr,
        }
    }

    /// Restore into the machine. The active sound is cut rather than
    /// resynthesized mid-effect, and the post-EI delay clears.
    pub(crate) fn restore(&self, cpu: &mut I8048, board: &mut Board, snd: &mut Cop411) {
        cpu.a = self.a;
        cpu.pc = self.pc;
        cpu.sp = self.sp;
        cpu.psw = self.psw;
        cpu.mb = self.mb;
        cpu.c = self.c;
        cpu.ac = self.ac;
        cpu.f0 = self.f0;
        cpu.f1 = self.f1;
        cpu.bs = self.bs;
        cpu.timer = self.timer;
        cpu.timer_en = self.timer_en;
        cpu.counter_en = self.counter_en;
        cpu.timer_ovf = self.timer_ovf;
        cpu.tcnti_en = self.tcnti_en;
        cpu.irq_en = self.irq_en;
        cpu.irq_pend = self.irq_pend;
        cpu.in_irq = self.in_irq;
        cpu.prescaler = self.prescaler;
        cpu.p1 = self.p1;
        cpu.p2 = self.p2;
        cpu.bus_latch = self.bus_latch;
        cpu.ei_delay = 0;
        cpu.iram = self.iram;

        board.xram.copy_from_slice(&self.xram);
        board.p1 = self.p1;
        board.p2 = self.p2;
        board.prev_p2 = self.p2;
        board.disp.set_phosphor(&self.phosphor);

        snd.ctrl_loop = self.snd_ctrl_loop;
        snd.ctrl_vol = self.snd_ctrl_vol;
        snd.ctrl_fast = self.snd_ctrl_fast;
        snd.proto_state = self.snd_proto_state;
        snd.proto_hi = self.snd_proto_hi;
        snd.lfsr = self.snd_lfsr;
        snd.active = false;
        snd.update_ctrl_vol();
    }
}

/// Fixed-capacity ring of per-frame snapshots.
pub struct RewindRing {
    buf: Vec<RewindSnapshot>,
    head: usize,
    count: usize,
    capacity: usize,
}

impl RewindRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            head: 0,
            count: 0,
            capacity,
        }
    }

    pub fn push(&mut self, snap: RewindSnapshot) {
        if self.buf.len() < self.capacity {
            self.buf.push(snap);
        } else {
            self.buf[self.head] = snap;
        }
        self.head = (self.head + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    pub fn pop(&mut self) -> Option<RewindSnapshot> {
        if self.count == 0 {
            return None;
        }
        self.head = (self.head + self.capacity - 1) % self.capacity;
        self.count -= 1;
        // Swap out rather than clone; the slot is dead until overwritten.
        Some(std::mem::replace(
            &mut self.buf[self.head],
            RewindSnapshot::placeholder(),
        ))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl RewindSnapshot {
    fn placeholder() -> Self {
        Self {
            a: 0,
            pc: 0,
            sp: 0,
            psw: 0,
            mb: false,
            c: false,
            ac: false,
            f0: false,
            f1: false,
            bs: false,
            timer: 0,
            timer_en: false,
            counter_en: false,
            timer_ovf: false,
            tcnti_en: false,
            irq_en: false,
            irq_pend: false,
            in_irq: false,
            prescaler: 0,
            p1: 0,
            p2: 0,
            bus_latch: 0,
            iram: [0; 64],
            xram: Vec::new(),
            phosphor: Vec::new(),
            snd_ctrl_loop: 0,
            snd_ctrl_vol: 0,
            snd_ctrl_fast: 0,
            snd_proto_state: 0,
            snd_proto_hi: 0,
            snd_lfsr: 0x7FFF,
        }
    }
}
