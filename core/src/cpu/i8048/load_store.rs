use super::I8048;
use crate::core::bus::{Bus, PORT_BUS, PORT_P1, PORT_P2};

impl I8048 {
    // ===== External RAM =====

    /// MOVX A,@Ri: external-RAM read. The CPU puts R(i) on the low address
    /// lines; the board supplies the bank bits from P1 and latches the data
    /// byte into the LED register selected by P2 as part of the same read.
    pub(crate) fn op_movx_read<B: Bus + ?Sized>(&mut self, ri: u8, bus: &mut B) {
        let addr = self.reg(ri) as u16;
        self.a = bus.io_read(addr);
    }

    /// MOVX @Ri,A: external-RAM write. No display side effect.
    pub(crate) fn op_movx_write<B: Bus + ?Sized>(&mut self, ri: u8, bus: &mut B) {
        let addr = self.reg(ri) as u16;
        bus.io_write(addr, self.a);
    }

    // ===== Program memory reads =====

    /// MOVP A,@A: A <- program_memory[(PC & 0xF00) | A].
    pub(crate) fn op_movp<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let addr = (self.pc & 0xF00) | self.a as u16;
        self.a = bus.read(addr);
    }

    /// MOVP3 A,@A: A <- program_memory[0x300 | A].
    pub(crate) fn op_movp3<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let addr = 0x300 | self.a as u16;
        self.a = bus.read(addr);
    }

    // ===== Port I/O =====

    /// INS A,BUS: read the BUS port pins (pulled high on this board).
    pub(crate) fn op_ins_bus<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        self.a = bus.io_read(PORT_BUS);
    }

    /// OUTL BUS,A.
    pub(crate) fn op_outl_bus<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        self.bus_latch = self.a;
        bus.io_write(PORT_BUS, self.a);
    }

    /// ORL BUS,#data.
    pub(crate) fn op_orl_bus_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let data = self.fetch(bus);
        self.bus_latch |= data;
        bus.io_write(PORT_BUS, self.bus_latch);
    }

    /// ANL BUS,#data.
    pub(crate) fn op_anl_bus_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let data = self.fetch(bus);
        self.bus_latch &= data;
        bus.io_write(PORT_BUS, self.bus_latch);
    }

    /// IN A,P1: the quasi-bidirectional port reads as latch AND pins.
    /// The board returns the external pull state (the button matrix).
    pub(crate) fn op_in_p1<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        self.a = self.p1 & bus.io_read(PORT_P1);
    }

    /// OUTL P1,A.
    pub(crate) fn op_outl_p1<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        self.p1 = self.a;
        bus.io_write(PORT_P1, self.a);
    }

    /// OUTL P2,A.
    pub(crate) fn op_outl_p2<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        self.p2 = self.a;
        bus.io_write(PORT_P2, self.a);
    }

    /// ANL P1,#data: read-modify-write on the latch, pins notified.
    pub(crate) fn op_anl_p1_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let data = self.fetch(bus);
        self.p1 &= data;
        bus.io_write(PORT_P1, self.p1);
    }

    /// ORL P1,#data.
    pub(crate) fn op_orl_p1_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let data = self.fetch(bus);
        self.p1 |= data;
        bus.io_write(PORT_P1, self.p1);
    }

    /// ANL P2,#data.
    pub(crate) fn op_anl_p2_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let data = self.fetch(bus);
        self.p2 &= data;
        bus.io_write(PORT_P2, self.p2);
    }

    /// ORL P2,#data.
    pub(crate) fn op_orl_p2_imm<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let data = self.fetch(bus);
        self.p2 |= data;
        bus.io_write(PORT_P2, self.p2);
    }
}
