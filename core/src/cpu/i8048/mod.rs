mod alu;
mod branch;
mod load_store;

use log::warn;

use crate::core::bus::{Bus, PORT_T0, PORT_T1};
use crate::cpu::state::I8048State;

/// Internal data RAM size (8048: 64 bytes).
pub const IRAM_SIZE: usize = 64;

/// Port latch values presented at power-up / reset.
pub const RESET_P1: u8 = 0xFB;
pub const RESET_P2: u8 = 0xFF;

/// Timer interrupt vector.
const TIMER_VECTOR: u16 = 0x007;

/// Intel 8048 interpreter.
///
/// Executes one instruction per [`step`](Self::step) call and returns its
/// machine-cycle cost (1 or 2). Program memory and the I/O space are reached
/// through the [`Bus`] passed into `step`, so board-level side effects (ROM
/// bank gating, external-RAM banking, the LED latch wired to MOVX reads)
/// happen inside the same operation that triggers them.
pub struct I8048 {
    // Registers
    pub a: u8,
    pub pc: u16,
    pub sp: u8,
    /// PSW image; rebuilt from the discrete flags before it is observed
    /// (MOV A,PSW, stack push) and decomposed on writes.
    pub psw: u8,

    // Flags
    pub mb: bool,
    pub c: bool,
    pub ac: bool,
    pub f0: bool,
    pub f1: bool,
    pub bs: bool,

    // Timer/counter
    pub timer: u8,
    pub timer_en: bool,
    pub counter_en: bool,
    pub timer_ovf: bool,
    /// Cycle accumulator feeding the divide-by-32 timer prescaler.
    pub prescaler: u32,

    // Interrupt state (timer/counter only; INT pin is not wired on this board)
    pub tcnti_en: bool,
    pub irq_en: bool,
    pub irq_pend: bool,
    pub in_irq: bool,
    /// Post-EI delay: dispatch is held off until one more instruction retires.
    pub ei_delay: u8,

    // Port output latches
    pub p1: u8,
    pub p2: u8,
    pub bus_latch: u8,

    // Internal RAM (registers, stack, scratch)
    pub iram: [u8; IRAM_SIZE],

    /// Total machine cycles executed.
    pub cycles: u64,

    // One warning per unknown opcode value
    unknown_logged: [u64; 4],
}

impl Default for I8048 {
    fn default() -> Self {
        Self::new()
    }
}

impl I8048 {
    pub fn new() -> Self {
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
            prescaler: 0,
            tcnti_en: false,
            irq_en: false,
            irq_pend: false,
            in_irq: false,
            ei_delay: 0,
            p1: RESET_P1,
            p2: RESET_P2,
            bus_latch: 0,
            iram: [0; IRAM_SIZE],
            cycles: 0,
            unknown_logged: [0; 4],
        }
    }

    // --- Register access ---

    /// RAM base of the active register bank: 0x00 (BS=0) or 0x18 (BS=1).
    #[inline]
    fn reg_bank_offset(&self) -> u8 {
        if self.bs { 0x18 } else { 0x00 }
    }

    #[inline]
    pub(crate) fn reg(&self, n: u8) -> u8 {
        self.iram[(self.reg_bank_offset() + (n & 7)) as usize]
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, n: u8, val: u8) {
        self.iram[(self.reg_bank_offset() + (n & 7)) as usize] = val;
    }

    /// Indirect internal-RAM address via R0/R1, masked to the 64-byte array.
    #[inline]
    pub(crate) fn ind_addr(&self, ri: u8) -> usize {
        (self.reg(ri) as usize) & (IRAM_SIZE - 1)
    }

    // --- PSW ---

    /// Rebuild the PSW image from the discrete flags and SP.
    #[inline]
    pub fn build_psw(&mut self) {
        self.psw = ((self.c as u8) << 7)
            | ((self.ac as u8) << 6)
            | ((self.f0 as u8) << 5)
            | ((self.bs as u8) << 4)
            | (self.sp & 7);
    }

    /// Decompose a full PSW write (MOV PSW,A).
    fn write_psw(&mut self, val: u8) {
        self.psw = val;
        self.c = val & 0x80 != 0;
        self.ac = val & 0x40 != 0;
        self.f0 = val & 0x20 != 0;
        self.bs = val & 0x10 != 0;
        self.sp = val & 7;
    }

    // --- Stack ---

    /// Push PC and the PSW upper nibble onto the internal stack.
    /// Entry format: byte0 = PC[7:0], byte1 = PSW[7:4] | PC[11:8].
    pub(crate) fn push_pc_psw(&mut self) {
        self.build_psw();
        let addr = 8 + self.sp * 2;
        self.iram[(addr & 0x3F) as usize] = self.pc as u8;
        self.iram[((addr + 1) & 0x3F) as usize] = ((self.pc >> 8) as u8 & 0x0F) | (self.psw & 0xF0);
        self.sp = (self.sp + 1) & 7;
    }

    /// Pop PC (RET).
    pub(crate) fn pop_pc(&mut self) {
        self.sp = self.sp.wrapping_sub(1) & 7;
        let addr = 8 + self.sp * 2;
        let lo = self.iram[(addr & 0x3F) as usize];
        let hi = self.iram[((addr + 1) & 0x3F) as usize];
        self.pc = ((hi & 0x0F) as u16) << 8 | lo as u16;
    }

    /// Pop PC and restore the PSW flag nibble (RETR).
    pub(crate) fn pop_pc_psw(&mut self) {
        self.sp = self.sp.wrapping_sub(1) & 7;
        let addr = 8 + self.sp * 2;
        let lo = self.iram[(addr & 0x3F) as usize];
        let hi = self.iram[((addr + 1) & 0x3F) as usize];
        self.pc = ((hi & 0x0F) as u16) << 8 | lo as u16;
        self.psw = (hi & 0xF0) | (self.psw & 0x0F);
        self.c = self.psw & 0x80 != 0;
        self.ac = self.psw & 0x40 != 0;
        self.f0 = self.psw & 0x20 != 0;
        self.bs = self.psw & 0x10 != 0;
    }

    // --- Fetch ---

    /// Fetch one byte at PC and advance. The PC is a plain 12-bit counter:
    /// sequential fetch increments all 12 bits; the MB flag only gates
    /// JMP/CALL destinations.
    #[inline]
    pub(crate) fn fetch<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let v = bus.read(self.pc);
        self.pc = (self.pc + 1) & 0xFFF;
        v
    }

    // --- Timer/counter ---

    /// Advance the timer register by one count; on 0xFF -> 0x00 wrap the
    /// overflow latch sets, and an interrupt is posted if armed.
    ///
    /// Driven by the prescaler in timer mode; the frame driver calls this
    /// directly on each T1 falling edge in counter mode.
    pub fn clock_timer(&mut self) {
        self.timer = self.timer.wrapping_add(1);
        if self.timer == 0 {
            self.timer_ovf = true;
            if self.tcnti_en && self.irq_en && !self.in_irq {
                self.irq_pend = true;
            }
        }
    }

    // --- Execution ---

    /// Execute one instruction; returns its cost in machine cycles (1 or 2).
    pub fn step<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u32 {
        let op_pc = self.pc;
        let op = self.fetch(bus);
        let mut cy: u32 = 1;

        match op {
            0x00 => {} // NOP
            0x75 => {} // ENT0 CLK -- test-0 clock output is not wired

            // ===== MOV =====
            0xF8..=0xFF => self.a = self.reg(op & 7),
            0xA8..=0xAF => self.set_reg(op & 7, self.a),
            0x23 => {
                self.a = self.fetch(bus);
                cy = 2;
            }
            0xB8..=0xBF => {
                let data = self.fetch(bus);
                self.set_reg(op & 7, data);
                cy = 2;
            }
            0xF0 | 0xF1 => self.a = self.iram[self.ind_addr(op & 1)],
            0xA0 | 0xA1 => {
                let addr = self.ind_addr(op & 1);
                self.iram[addr] = self.a;
            }
            0xB0 | 0xB1 => {
                let addr = self.ind_addr(op & 1);
                let data = self.fetch(bus);
                self.iram[addr] = data;
                cy = 2;
            }

            // ===== XCH / XCHD =====
            0x28..=0x2F => {
                let n = op & 7;
                let t = self.reg(n);
                self.set_reg(n, self.a);
                self.a = t;
            }
            0x20 | 0x21 => {
                let addr = self.ind_addr(op & 1);
                let t = self.iram[addr];
                self.iram[addr] = self.a;
                self.a = t;
            }
            0x30 | 0x31 => {
                let addr = self.ind_addr(op & 1);
                let t = self.a & 0x0F;
                self.a = (self.a & 0xF0) | (self.iram[addr] & 0x0F);
                self.iram[addr] = (self.iram[addr] & 0xF0) | t;
            }

            // ===== ADD / ADDC =====
            0x68..=0x6F => self.perform_add(self.reg(op & 7)),
            0x03 => {
                let data = self.fetch(bus);
                self.perform_add(data);
                cy = 2;
            }
            0x60 | 0x61 => self.perform_add(self.iram[self.ind_addr(op & 1)]),
            0x78..=0x7F => self.perform_addc(self.reg(op & 7)),
            0x13 => {
                let data = self.fetch(bus);
                self.perform_addc(data);
                cy = 2;
            }
            0x70 | 0x71 => self.perform_addc(self.iram[self.ind_addr(op & 1)]),

            // ===== Logic: ANL / ORL / XRL =====
            0x58..=0x5F => self.a &= self.reg(op & 7),
            0x53 => {
                let data = self.fetch(bus);
                self.a &= data;
                cy = 2;
            }
            0x50 | 0x51 => self.a &= self.iram[self.ind_addr(op & 1)],
            0x48..=0x4F => self.a |= self.reg(op & 7),
            0x43 => {
                let data = self.fetch(bus);
                self.a |= data;
                cy = 2;
            }
            0x40 | 0x41 => self.a |= self.iram[self.ind_addr(op & 1)],
            0xD8..=0xDF => self.a ^= self.reg(op & 7),
            0xD3 => {
                let data = self.fetch(bus);
                self.a ^= data;
                cy = 2;
            }
            0xD0 | 0xD1 => self.a ^= self.iram[self.ind_addr(op & 1)],

            // ===== INC / DEC / CLR / CPL =====
            0x17 => self.a = self.a.wrapping_add(1),
            0x18..=0x1F => {
                let n = op & 7;
                self.set_reg(n, self.reg(n).wrapping_add(1));
            }
            0x10 | 0x11 => {
                let addr = self.ind_addr(op & 1);
                self.iram[addr] = self.iram[addr].wrapping_add(1);
            }
            0x07 => self.a = self.a.wrapping_sub(1),
            0xC8..=0xCF => {
                let n = op & 7;
                self.set_reg(n, self.reg(n).wrapping_sub(1));
            }
            0x27 => self.a = 0,
            0x37 => self.a = !self.a,

            // ===== DA / SWAP / Rotate =====
            0x57 => self.perform_da(),
            0x47 => self.a = self.a.rotate_left(4),
            0xE7 => self.perform_rl(),
            0xF7 => self.perform_rlc(),
            0x77 => self.perform_rr(),
            0x67 => self.perform_rrc(),

            // ===== Flags =====
            0x97 => self.c = false,
            0xA7 => self.c = !self.c,
            0x85 => self.f0 = false,
            0x95 => self.f0 = !self.f0,
            0xA5 => self.f1 = false,
            0xB5 => self.f1 = !self.f1,
            0xC5 => self.bs = false,
            0xD5 => self.bs = true,
            0xE5 => self.mb = false,
            0xF5 => self.mb = true,

            // ===== Jumps =====
            0x04 | 0x24 | 0x44 | 0x64 | 0x84 | 0xA4 | 0xC4 | 0xE4 => {
                self.op_jmp(op, bus);
                cy = 2;
            }
            0xB3 => {
                self.op_jmpp(bus);
                cy = 2;
            }
            0xE8..=0xEF => {
                self.op_djnz(op & 7, bus);
                cy = 2;
            }

            // ===== Conditional jumps =====
            0xF6 => {
                let taken = self.c;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0xE6 => {
                let taken = !self.c;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0xC6 => {
                let taken = self.a == 0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x96 => {
                let taken = self.a != 0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x26 => {
                let taken = bus.io_read(PORT_T0) == 0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x36 => {
                let taken = bus.io_read(PORT_T0) != 0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x46 => {
                let taken = bus.io_read(PORT_T1) == 0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x56 => {
                let taken = bus.io_read(PORT_T1) != 0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0xB6 => {
                let taken = self.f0;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x76 => {
                let taken = self.f1;
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x16 => {
                // JTF: the overflow latch clears only on a taken branch
                let taken = self.timer_ovf;
                if taken {
                    self.timer_ovf = false;
                }
                self.branch_if(taken, bus);
                cy = 2;
            }
            0x86 => {
                // JNI: INT pin is not connected on this board
                self.branch_if(false, bus);
                cy = 2;
            }
            0x12 | 0x32 | 0x52 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
                let taken = self.a & (1 << ((op >> 5) & 7)) != 0;
                self.branch_if(taken, bus);
                cy = 2;
            }

            // ===== CALL / RET =====
            0x14 | 0x34 | 0x54 | 0x74 | 0x94 | 0xB4 | 0xD4 | 0xF4 => {
                self.op_call(op, bus);
                cy = 2;
            }
            0x83 => {
                self.pop_pc();
                cy = 2;
            }
            0x93 => {
                self.pop_pc_psw();
                self.irq_en = true;
                self.in_irq = false;
                cy = 2;
            }

            // ===== Interrupts & timer control =====
            0x05 => {
                self.irq_en = true;
                self.ei_delay = 1;
            }
            0x15 => self.irq_en = false,
            0x25 => self.tcnti_en = true,
            0x35 => self.tcnti_en = false,
            0x55 => {
                self.timer_en = true;
                self.counter_en = false;
                self.prescaler = 0;
            }
            0x45 => {
                self.counter_en = true;
                self.timer_en = false;
                self.prescaler = 0;
            }
            0x65 => {
                self.timer_en = false;
                self.counter_en = false;
                self.prescaler = 0;
            }
            0x42 => self.a = self.timer,
            0x62 => {
                self.timer = self.a;
                self.prescaler = 0;
            }

            // ===== PSW =====
            0xC7 => {
                self.build_psw();
                self.a = self.psw;
            }
            0xD7 => self.write_psw(self.a),

            // ===== I/O ports =====
            0x08 => {
                self.op_ins_bus(bus);
                cy = 2;
            }
            0x02 => {
                self.op_outl_bus(bus);
                cy = 2;
            }
            0x88 => {
                self.op_orl_bus_imm(bus);
                cy = 2;
            }
            0x98 => {
                self.op_anl_bus_imm(bus);
                cy = 2;
            }
            0x09 => {
                self.op_in_p1(bus);
                cy = 2;
            }
            0x0A => {
                self.a = self.p2;
                cy = 2;
            }
            0x39 => {
                self.op_outl_p1(bus);
                cy = 2;
            }
            0x3A => {
                self.op_outl_p2(bus);
                cy = 2;
            }
            0x99 => {
                self.op_anl_p1_imm(bus);
                cy = 2;
            }
            0x9A => {
                self.op_anl_p2_imm(bus);
                cy = 2;
            }
            0x89 => {
                self.op_orl_p1_imm(bus);
                cy = 2;
            }
            0x8A => {
                self.op_orl_p2_imm(bus);
                cy = 2;
            }

            // ===== External / program memory =====
            0x80 | 0x81 => {
                self.op_movx_read(op & 1, bus);
                cy = 2;
            }
            0x90 | 0x91 => {
                self.op_movx_write(op & 1, bus);
                cy = 2;
            }
            0xA3 => {
                self.op_movp(bus);
                cy = 2;
            }
            0xE3 => {
                self.op_movp3(bus);
                cy = 2;
            }

            // ===== MOVD (8243 expander -- absent on this board) =====
            0x0C..=0x0F => {
                self.a = 0x0F;
                cy = 2;
            }
            0x3C..=0x3F | 0x8C..=0x8F | 0x9C..=0x9F => cy = 2,

            _ => {
                let word = (op >> 6) as usize;
                let bit = 1u64 << (op & 0x3F);
                if self.unknown_logged[word] & bit == 0 {
                    self.unknown_logged[word] |= bit;
                    warn!("i8048: unknown opcode ${op:02X} at ${op_pc:03X}, treated as NOP");
                }
            }
        }

        self.cycles += cy as u64;

        // Timer mode: the prescaler accumulates executed cycles and laps
        // every 32, advancing the timer register.
        if self.timer_en {
            self.prescaler += cy;
            while self.prescaler >= 32 {
                self.prescaler -= 32;
                self.clock_timer();
            }
        }

        // IRQ dispatch at the instruction boundary. A freshly executed EI
        // holds dispatch off until the next instruction retires.
        let dispatch = self.irq_pend && self.irq_en && !self.in_irq && self.ei_delay == 0;
        if self.ei_delay > 0 {
            self.ei_delay -= 1;
        }
        if dispatch {
            self.irq_pend = false;
            self.in_irq = true;
            self.irq_en = false;
            self.push_pc_psw();
            self.pc = TIMER_VECTOR;
        }

        cy
    }

    /// Register snapshot for debugging and tests.
    pub fn snapshot(&self) -> I8048State {
        let psw = ((self.c as u8) << 7)
            | ((self.ac as u8) << 6)
            | ((self.f0 as u8) << 5)
            | ((self.bs as u8) << 4)
            | (self.sp & 7);
        I8048State {
            a: self.a,
            pc: self.pc,
            psw,
            sp: self.sp,
            timer: self.timer,
            p1: self.p1,
            p2: self.p2,
            bus: self.bus_latch,
            mb: self.mb,
            c: self.c,
            f0: self.f0,
            f1: self.f1,
            bs: self.bs,
        }
    }
}
