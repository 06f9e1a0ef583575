/// Generic bus interface for an MCS-48 based board.
///
/// Program memory and the I/O space are separate on this family: opcode
/// fetches and MOVP/JMPP table reads go through [`read`](Bus::read), while
/// MOVX external-RAM cycles and port/test-pin accesses go through
/// [`io_read`](Bus::io_read) / [`io_write`](Bus::io_write).
///
/// The I/O address space reuses 0x000-0x0FF for the external-RAM window
/// (the CPU puts the low 8 address bits on the bus; the board supplies the
/// bank bits) and places ports above the 8-bit range.
pub trait Bus {
    /// Program memory read.
    fn read(&mut self, addr: u16) -> u8;

    /// Read from the I/O address space (external RAM window, ports, test pins).
    fn io_read(&mut self, addr: u16) -> u8;

    /// Write to the I/O address space.
    fn io_write(&mut self, addr: u16, data: u8);
}

/// BUS (port 0) latch address.
pub const PORT_BUS: u16 = 0x100;
/// Port 1 pins. Reads return the external pull state (button matrix);
/// the CPU ANDs this with its output latch.
pub const PORT_P1: u16 = 0x101;
/// Port 2 pins.
pub const PORT_P2: u16 = 0x102;
/// T0 test pin.
pub const PORT_T0: u16 = 0x110;
/// T1 test pin (mirror position sensor).
pub const PORT_T1: u16 = 0x111;
