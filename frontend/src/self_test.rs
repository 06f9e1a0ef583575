//! Built-in smoke test (`--test`).
//!
//! A quick scripted pass over the emulation core using only public API:
//! CPU arithmetic and branching, the timer prescaler, sound commands,
//! phosphor decay, and a savestate round trip. Useful as a first check on
//! a new build or platform without cargo around.

use advision_core::core::Bus;
use advision_core::core::machine::Machine;
use advision_core::cpu::I8048;
use advision_core::device::cop411::Cop411;
use advision_core::device::led_display::{LedDisplay, SCREEN_HEIGHT, SCREEN_WIDTH};
use advision_machines::AdventureVision;
use advision_machines::savestate::{load_state, save_state};

/// Flat program memory, no ports.
struct FlatBus {
    rom: [u8; 0x1000],
}

impl FlatBus {
    fn with_program(program: &[u8]) -> Self {
        let mut rom = [0u8; 0x1000];
        rom[..program.len()].copy_from_slice(program);
        Self { rom }
    }
}

impl Bus for FlatBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.rom[(addr & 0xFFF) as usize]
    }
    fn io_read(&mut self, _addr: u16) -> u8 {
        0xFF
    }
    fn io_write(&mut self, _addr: u16, _data: u8) {}
}

struct Tally {
    pass: u32,
    fail: u32,
}

impl Tally {
    fn check(&mut self, name: &str, ok: bool) {
        if ok {
            self.pass += 1;
        } else {
            self.fail += 1;
            println!("FAIL: {name}");
        }
    }
}

/// Run the suite; returns the process exit code.
pub fn run() -> i32 {
    println!("=== Adventure Vision Self-Test Suite ===");
    let mut t = Tally { pass: 0, fail: 0 };

    // CPU: MOV + ADD, no carry
    {
        let mut cpu = I8048::new();
        let mut bus = FlatBus::with_program(&[0x23, 0x42, 0x03, 0x10, 0x00]);
        cpu.step(&mut bus);
        t.check("MOV A,#42h", cpu.a == 0x42);
        cpu.step(&mut bus);
        t.check("ADD A,#10h", cpu.a == 0x52);
        t.check("carry clear", !cpu.c);
    }

    // CPU: ADD with carry out
    {
        let mut cpu = I8048::new();
        let mut bus = FlatBus::with_program(&[0x23, 0xF0, 0x03, 0x20]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        t.check("F0h+20h wraps with carry", cpu.a == 0x10 && cpu.c);
    }

    // CPU: JMP
    {
        let mut cpu = I8048::new();
        let mut bus = FlatBus::with_program(&[0x04, 0x10]);
        cpu.step(&mut bus);
        t.check("JMP $010", cpu.pc == 0x010);
    }

    // CPU: DJNZ loop
    {
        let mut cpu = I8048::new();
        let mut bus = FlatBus::with_program(&[0xB8, 0x03, 0xE8, 0x02]);
        for _ in 0..4 {
            cpu.step(&mut bus);
        }
        t.check("DJNZ counts down", cpu.pc == 0x004 && cpu.iram[0] == 0);
    }

    // CPU: DA A
    {
        let mut cpu = I8048::new();
        cpu.a = 0x39;
        let mut bus = FlatBus::with_program(&[0x03, 0x28, 0x57]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        t.check("DA A BCD adjust", cpu.a == 0x67);
    }

    // CPU: timer prescaler, 64 cycles = 2 increments
    {
        let mut cpu = I8048::new();
        cpu.timer = 0xFE;
        cpu.timer_en = true;
        let mut bus = FlatBus::with_program(&[0x00; 0x100]);
        for _ in 0..64 {
            cpu.step(&mut bus);
        }
        t.check(
            "timer prescaler wrap",
            cpu.timer == 0x00 && cpu.timer_ovf,
        );
    }

    // Sound: power-on state
    {
        let snd = Cop411::new(44_100);
        t.check("COP411L init", snd.lfsr == 0x7FFF && !snd.active);
    }

    // Sound: pure tone E5
    {
        let mut snd = Cop411::new(44_100);
        snd.command_byte(0xE5);
        t.check(
            "tone E5",
            snd.active && !snd.is_noise && snd.cur_freq > 319.0 && snd.cur_freq < 322.0,
        );
    }

    // Sound: continuous noise
    {
        let mut snd = Cop411::new(44_100);
        snd.command_byte(0x10);
        t.check("noise command", snd.active && snd.is_noise && snd.force_loop);
    }

    // Display: phosphor decay step
    {
        let mut disp = LedDisplay::new();
        let mut buf = vec![0.0f32; SCREEN_WIDTH * SCREEN_HEIGHT];
        buf[0] = 1.0;
        disp.set_phosphor(&buf);
        disp.update(0.45);
        let px = disp.pixel(0, 0);
        t.check("phosphor decay", (px - 0.45).abs() < 0.01);
    }

    // Savestate round trip through the full machine
    {
        let mut src = AdventureVision::new();
        src.load_firmware(&[0x17, 0x04, 0x00]); // INC A; JMP 0
        src.run_frame();
        src.sound_engine().lock().unwrap().command_byte(0xE5);
        let blob = save_state(&src);
        let mut dst = AdventureVision::new();
        let loaded = load_state(&mut dst, &blob).is_ok();
        t.check("savestate loads", loaded);
        t.check("savestate round trip", save_state(&dst) == blob);
        t.check(
            "savestate restores registers",
            dst.cpu_state() == src.cpu_state(),
        );
    }

    println!("\n{} passed, {} failed ({} total)", t.pass, t.fail, t.pass + t.fail);
    if t.fail > 0 { 1 } else { 0 }
}
