use advision_core::core::machine::Machine;
use advision_machines::AdventureVision;
use advision_machines::adventure_vision::{
    CYCLES_PER_FRAME, INPUT_BUTTON_1, INPUT_BUTTON_3, INPUT_UP,
};

/// Build a machine with the given firmware bytes (zero-padded to 1 KiB)
/// and an empty cartridge.
fn machine_with_firmware(program: &[u8]) -> AdventureVision {
    let mut firmware = vec![0u8; 1024];
    firmware[..program.len()].copy_from_slice(program);
    let mut machine = AdventureVision::new();
    machine.load_firmware(&firmware);
    machine
}

// =================================================================
// Machine trait surface
// =================================================================

#[test]
fn test_display_size() {
    let machine = AdventureVision::new();
    assert_eq!(machine.display_size(), (150, 40));
}

#[test]
fn test_input_map_has_all_buttons() {
    let machine = AdventureVision::new();
    let map = machine.input_map();
    assert_eq!(map.len(), 8); // 4 directions + 4 buttons
    for button in map {
        assert!(!button.name.is_empty());
    }
}

#[test]
fn test_render_frame_correct_size() {
    let machine = AdventureVision::new();
    let (w, h) = machine.display_size();
    let mut buffer = vec![0u8; (w * h * 3) as usize];
    machine.render_frame(&mut buffer); // must not panic
}

#[test]
fn test_frame_rate() {
    let machine = AdventureVision::new();
    assert_eq!(machine.frame_rate_hz(), 15.0);
}

// =================================================================
// CPU-through-board scenarios
// =================================================================

#[test]
fn test_arithmetic_program() {
    // MOV A,#42h; ADD A,#10h; NOP... -> A = 52h, carry clear
    let mut machine = machine_with_firmware(&[0x23, 0x42, 0x03, 0x10, 0x00]);
    machine.run_frame();
    let state = machine.cpu_state();
    assert_eq!(state.a, 0x52);
    assert!(!state.c);
    assert_eq!(machine.cycles() as u32, CYCLES_PER_FRAME);
}

#[test]
fn test_djnz_loop_program() {
    // MOV R0,#3; loop: DJNZ R0,loop; rest NOPs
    let mut machine = machine_with_firmware(&[0xB8, 0x03, 0xE8, 0x02]);
    machine.run_frame();
    let state = machine.cpu_state();
    // R0 counted down to zero and execution moved on
    assert_eq!(state.a, 0);
    assert!(machine.cycles() >= CYCLES_PER_FRAME as u64);
}

#[test]
fn test_frame_step_runs_exact_budget_per_frame() {
    let mut machine = machine_with_firmware(&[0x00]);
    machine.run_frame();
    machine.run_frame();
    // NOPs are 1 cycle, so the budget is hit exactly
    assert_eq!(machine.cycles(), 2 * CYCLES_PER_FRAME as u64);
    assert_eq!(machine.frame_count(), 2);
}

// =================================================================
// Button matrix
// =================================================================

/// Firmware that samples P1 into A forever: IN A,P1; JMP 0.
const READ_P1_LOOP: &[u8] = &[0x09, 0x04, 0x00];

#[test]
fn test_button_masks_on_p1() {
    let mut machine = machine_with_firmware(READ_P1_LOOP);
    machine.set_input(INPUT_BUTTON_1, true);
    machine.run_frame();
    // P1 reset latch is 0xFB; button 1 clears 0x30
    assert_eq!(machine.cpu_state().a, 0xFB & !0x30);

    machine.set_input(INPUT_BUTTON_1, false);
    machine.set_input(INPUT_UP, true);
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0xFB & !0x20);

    machine.set_input(INPUT_UP, false);
    machine.set_input(INPUT_BUTTON_3, true);
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0xFB & !0x08);
}

#[test]
fn test_released_buttons_read_idle() {
    let mut machine = machine_with_firmware(READ_P1_LOOP);
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0xFB);
}

// =================================================================
// External RAM banking
// =================================================================

#[test]
fn test_xram_bank_addressing() {
    // Select bank 3 via P1[1:0], write A to offset 0x55, read it back:
    //   ANL P1,#FCh ; ORL P1,#03h  (bank 3, keep ROM gate low)
    //   MOV R0,#55h ; MOV A,#77h ; MOVX @R0,A
    //   CLR A ; MOVX A,@R0
    let mut machine = machine_with_firmware(&[
        0x99, 0xFC, // ANL P1,#FCh
        0x89, 0x03, // ORL P1,#03h
        0xB8, 0x55, // MOV R0,#55h
        0x23, 0x77, // MOV A,#77h
        0x90, // MOVX @R0,A
        0x27, // CLR A
        0x80, // MOVX A,@R0
    ]);
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0x77);
}

// =================================================================
// Sound command delivery over P2
// =================================================================

/// OUTL P2 sequence delivering one sound command byte the way the system
/// firmware does: reset, command byte, swapped command byte, clear.
fn p2_command_firmware(cmd: u8) -> Vec<u8> {
    vec![
        0x23, 0xC0, // MOV A,#C0h
        0x3A, // OUTL P2,A
        0x23, cmd, // MOV A,#cmd
        0x3A, // OUTL P2,A
        0x47, // SWAP A
        0x3A, // OUTL P2,A
        0x23, 0x00, // MOV A,#00h
        0x3A, // OUTL P2,A
    ]
}

#[test]
fn test_tone_command_through_port2() {
    // C0, E5, 00 -> tone index 5, 320.92 Hz
    let mut machine = machine_with_firmware(&p2_command_firmware(0xE5));
    machine.run_frame();
    let snd = machine.sound_engine();
    let snd = snd.lock().unwrap();
    assert!(snd.active);
    assert!(!snd.is_noise);
    assert!(snd.cur_freq > 319.0 && snd.cur_freq < 322.0);
}

#[test]
fn test_noise_command_through_port2() {
    // C0, 10, 00 -> continuous noise, forced loop
    let mut machine = machine_with_firmware(&p2_command_firmware(0x10));
    machine.run_frame();
    let snd = machine.sound_engine();
    let snd = snd.lock().unwrap();
    assert!(snd.active);
    assert!(snd.is_noise);
    assert!(snd.force_loop);
}

// =================================================================
// Display paths
// =================================================================

#[test]
fn test_hardware_column_path_lights_pixels() {
    // Bank 1 (P1[1:0]=01), write 00h at offset 06h (column 0 data),
    // select LED register 0 (P2=100xxxxx), MOVX-read to latch it,
    // then strobe P2.4. Column 0 rows 32-39 light up.
    let mut machine = machine_with_firmware(&[
        0x99, 0xFC, // ANL P1,#FCh
        0x89, 0x01, // ORL P1,#01h  (bank 1)
        0xB8, 0x06, // MOV R0,#06h
        0x23, 0x00, // MOV A,#00h
        0x90, // MOVX @R0,A   (all-lit byte into video RAM)
        0x23, 0x80, // MOV A,#80h  (register select 100, P2.4 low)
        0x3A, // OUTL P2,A
        0x80, // MOVX A,@R0  (latches 00h into LED register 0)
        0x23, 0x90, // MOV A,#90h  (P2.4 high: strobe)
        0x3A, // OUTL P2,A
    ]);
    machine.run_frame();
    // Register 0 is column byte 0: rows 32-39 of the strobed column
    let phosphor = machine.phosphor();
    let lit = (32..40).filter(|&y| phosphor[y * 150] == 1.0).count();
    assert_eq!(lit, 8);
}

#[test]
fn test_fallback_path_without_strobes() {
    // No P2.4 strobes at all: mid-frame scan samples video RAM directly.
    // Clear the whole column 0 slot in bank 1 (offsets 06h-0Ah).
    let mut machine = machine_with_firmware(&[
        0x99, 0xFC, // ANL P1,#FCh
        0x89, 0x01, // ORL P1,#01h
        0xB8, 0x06, // MOV R0,#06h
        0x23, 0x00, // MOV A,#00h
        0x90, // MOVX @R0,A
        0xB8, 0x07, 0x90, // offset 07h
        0xB8, 0x08, 0x90, // offset 08h
        0xB8, 0x09, 0x90, // offset 09h
        0xB8, 0x0A, 0x90, // offset 0Ah
    ]);
    machine.run_frame();
    let phosphor = machine.phosphor();
    let lit_col0 = (0..40).filter(|&y| phosphor[y * 150] == 1.0).count();
    assert_eq!(lit_col0, 40);
}

#[test]
fn test_idle_machine_stays_dark() {
    let mut machine = machine_with_firmware(&[0x00]);
    machine.run_frame();
    assert_eq!(machine.lit_pixels(0.05), 0);
}

#[test]
fn test_two_idle_frames_identical_phosphor() {
    // With no input and no lit columns, consecutive decayed frames match
    let mut machine = machine_with_firmware(&[0x00]);
    machine.run_frame();
    machine.run_frame();
    let first: Vec<f32> = machine.phosphor().to_vec();
    machine.run_frame();
    machine.run_frame();
    assert_eq!(machine.phosphor(), &first[..]);
}

// =================================================================
// Rewind
// =================================================================

#[test]
fn test_rewind_restores_earlier_state() {
    // A advances a fixed amount per frame, so it fingerprints the frame.
    // Snapshots are taken at end-of-frame; popping N lands N-1 frames back.
    let mut machine = machine_with_firmware(&[0x17, 0x04, 0x00]); // INC A; JMP 0
    for _ in 0..5 {
        machine.run_frame();
    }
    let a_at_5 = machine.cpu_state().a;
    machine.run_frame();
    machine.run_frame();
    assert_eq!(machine.rewind(3), 3);
    assert_eq!(machine.cpu_state().a, a_at_5);
}

#[test]
fn test_rewind_empty_ring() {
    let mut machine = AdventureVision::new();
    assert_eq!(machine.rewind(4), 0);
}

// =================================================================
// Firmware/cartridge loading edges
// =================================================================

#[test]
fn test_short_firmware_pads() {
    let mut machine = AdventureVision::new();
    machine.load_firmware(&[0x23, 0x07]); // MOV A,#7 then zeros
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0x07);
}

#[test]
fn test_oversized_cartridge_truncates() {
    let mut machine = AdventureVision::new();
    machine.load_cartridge(&vec![0xFFu8; 8192]); // double the real limit
    machine.load_firmware(&[0x00; 1024]);
    machine.run_frame(); // must not panic
}

// =================================================================
// T1 pulse window configuration
// =================================================================

#[test]
fn test_inverted_t1_window_reverts_to_defaults() {
    // JNT1 self-loop: firmware waits for the sensor pulse. With a sane
    // window the loop exits during the frame; an inverted config must not
    // wedge it (defaults are restored).
    let mut machine = machine_with_firmware(&[
        0x46, 0x00, // wait: JNT1 wait  (spin while T1 high)
        0x56, 0x02, // hold: JT1 hold   (spin while T1 low)
        0x23, 0x5A, // MOV A,#5Ah
        0x04, 0x06, // JMP self
    ]);
    machine.set_t1_pulse(900, 100); // inverted: rejected
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0x5A);
}

#[test]
fn test_t1_pulse_reaches_firmware() {
    // Spin while T1 is high; only the LOW pulse window lets this through.
    let mut machine = machine_with_firmware(&[
        0x56, 0x00, // JT1 $00
        0x23, 0x99, // MOV A,#99h
        0x04, 0x04, // JMP self
    ]);
    machine.set_t1_pulse(200, 400);
    machine.run_frame();
    assert_eq!(machine.cpu_state().a, 0x99);
}
