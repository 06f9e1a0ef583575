use advision_core::device::cop411::{Cop411, MAX_STEPS, NOTE_FREQ, PROTO_IDLE};

const RATE: u32 = 44_100;

/// Drive the full four-write handshake for one command byte.
fn send_command(snd: &mut Cop411, cmd_byte: u8) {
    snd.port2_write(0xC0);
    snd.port2_write(cmd_byte & 0xF0);
    snd.port2_write(cmd_byte << 4);
    snd.port2_write(0x00);
}

// =============================================================================
// Protocol
// =============================================================================

#[test]
fn test_short_sequence_dispatches_high_nibble_alone() {
    // C0, E5, 00: the 00 terminator arrives in place of the low nibble,
    // so the command is E0 (tone 0) with zero data
    let mut snd = Cop411::new(RATE);
    snd.port2_write(0xC0);
    snd.port2_write(0xE5);
    snd.port2_write(0x00);
    assert!(snd.active);
    assert!(!snd.is_noise);
    assert!((snd.cur_freq - NOTE_FREQ[0]).abs() < 0.01);
    assert_eq!(snd.proto_state, PROTO_IDLE);
}

#[test]
fn test_tone_command_via_full_protocol() {
    // The firmware's real sequence: C0, cmd, SWAP(cmd), 00 -> tone 5
    let mut snd = Cop411::new(RATE);
    snd.port2_write(0xC0);
    snd.port2_write(0xE5);
    snd.port2_write(0x5E);
    snd.port2_write(0x00);
    assert!(snd.active);
    assert!(!snd.is_noise);
    assert!(snd.cur_freq > 319.0 && snd.cur_freq < 322.0);
    assert_eq!(snd.proto_state, PROTO_IDLE);
}

#[test]
fn test_full_four_write_handshake() {
    let mut snd = Cop411::new(RATE);
    send_command(&mut snd, 0x10); // continuous noise
    assert!(snd.active);
    assert!(snd.is_noise);
    assert!(snd.force_loop);
    assert_eq!(snd.proto_state, PROTO_IDLE);
}

#[test]
fn test_protocol_requires_reset_byte() {
    let mut snd = Cop411::new(RATE);
    snd.port2_write(0xE5); // no $C0 first: ignored
    snd.port2_write(0x00);
    assert!(!snd.active);
}

#[test]
fn test_low_nibble_carried_in_upper_bits() {
    // The low command nibble arrives in P2[7:4] of the third write
    let mut snd = Cop411::new(RATE);
    snd.port2_write(0xC0);
    snd.port2_write(0xE0);
    snd.port2_write(0x30); // note 3
    snd.port2_write(0x00);
    assert!(snd.active);
    let want = NOTE_FREQ[3];
    assert!((snd.cur_freq - want).abs() < 0.01);
}

// =============================================================================
// Control register
// =============================================================================

#[test]
fn test_control_register_silences_and_sets_bits() {
    let mut snd = Cop411::new(RATE);
    send_command(&mut snd, 0xE5);
    assert!(snd.active);
    // cmd 0 data $B = loop=1, vol=1, fast=1
    send_command(&mut snd, 0x0B);
    assert!(!snd.active);
    assert_eq!(snd.ctrl_fast, 1);
    assert_eq!(snd.ctrl_vol, 1);
    assert_eq!(snd.ctrl_loop, 1);
    assert_eq!(snd.seg1_vol, 1.0);
    assert_eq!(snd.seg2_vol, 0.4);
}

#[test]
fn test_volume_pairs() {
    let mut snd = Cop411::new(RATE);
    snd.ctrl_vol = 0;
    snd.update_ctrl_vol();
    assert_eq!((snd.seg1_vol, snd.seg2_vol), (0.4, 0.4));
    snd.ctrl_vol = 2;
    snd.update_ctrl_vol();
    assert_eq!((snd.seg1_vol, snd.seg2_vol), (1.0, 1.0));
}

// =============================================================================
// Effect scripts
// =============================================================================

#[test]
fn test_cmd1_continuous_noise_forces_loop() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0x10);
    assert!(snd.active);
    assert!(snd.is_noise);
    assert!(snd.force_loop);
    assert_eq!(snd.step_count, 1);
}

#[test]
fn test_cmd2_square_slide_down() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0x20);
    assert_eq!(snd.step_count, 8);
    assert!(!snd.steps[0].noise);
    assert_eq!(snd.steps[0].freq, 1200.0);
    assert!(snd.steps[7].freq < snd.steps[0].freq);
}

#[test]
fn test_cmd3_chains_to_cmd2_only_when_looping() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0x30);
    assert_eq!(snd.chain_cmd, 0);

    snd.ctrl_loop = 1;
    snd.command_byte(0x30);
    assert_eq!(snd.chain_cmd, 0x02);
    assert_eq!(snd.step_count, 5);
    assert!(snd.steps[0].noise);
}

#[test]
fn test_cmd6_never_loops() {
    let mut snd = Cop411::new(RATE);
    snd.ctrl_loop = 1;
    snd.command_byte(0x60);
    assert!(snd.force_no_loop);
    assert_eq!(snd.step_count, 12);
    // Play the whole thing out; it must stop even with ctrl_loop set
    let mut guard = 0u32;
    while snd.active {
        snd.sample();
        guard += 1;
        assert!(guard < 2_000_000, "cmd 6 failed to terminate");
    }
}

#[test]
fn test_cmd5_loops_on_last_step() {
    let mut snd = Cop411::new(RATE);
    snd.ctrl_loop = 1;
    snd.command_byte(0x50);
    assert_eq!(snd.step_count, 10);
    assert!(snd.force_loop);
    // Run past the whole script; the cursor must park on the final step
    for _ in 0..RATE * 2 {
        snd.sample();
    }
    assert!(snd.active);
    assert_eq!(snd.cur_step, snd.step_count - 1);
}

#[test]
fn test_fast_bit_halves_durations() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0x20);
    let slow = snd.steps[0].dur_ms;
    snd.ctrl_fast = 1;
    snd.command_byte(0x20);
    assert_eq!(snd.steps[0].dur_ms, slow / 2);
}

#[test]
fn test_effect_finishes_without_loop() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0x40);
    let mut samples = 0u32;
    while snd.active {
        snd.sample();
        samples += 1;
        assert!(samples < 1_000_000);
    }
    // 8 steps x 30 ms = 240 ms of audio
    let expect = (240 * RATE / 1000) as i64;
    assert!((samples as i64 - expect).abs() <= 8);
}

// =============================================================================
// Pure tones
// =============================================================================

#[test]
fn test_tone_two_segment_envelope() {
    let mut snd = Cop411::new(RATE);
    snd.ctrl_vol = 1; // high/low pair
    snd.command_byte(0xE0);
    assert_eq!(snd.cur_vol, 1.0);
    // Exhaust segment 1 (117 ms)
    let seg1 = (117 * RATE / 1000) as usize;
    for _ in 0..seg1 {
        snd.sample();
    }
    assert_eq!(snd.segment, 1);
    assert_eq!(snd.cur_vol, 0.4);
    // Exhaust segment 2 (240 ms); tone ends
    let seg2 = (240 * RATE / 1000) as usize;
    for _ in 0..seg2 {
        snd.sample();
    }
    assert!(!snd.active);
}

#[test]
fn test_tone_loops_back_to_segment_1() {
    let mut snd = Cop411::new(RATE);
    snd.ctrl_loop = 1;
    snd.command_byte(0xE0);
    let total = ((117 + 240 + 20) * RATE / 1000) as usize;
    for _ in 0..total {
        snd.sample();
    }
    assert!(snd.active);
    assert_eq!(snd.segment, 0);
}

#[test]
fn test_fast_tone_segments() {
    let mut snd = Cop411::new(RATE);
    snd.ctrl_fast = 1;
    snd.command_byte(0xE0);
    assert_eq!(snd.seg_samples_total, (46 * RATE / 1000) as i32);
}

#[test]
fn test_all_sixteen_notes() {
    for note in 0..16u8 {
        let mut snd = Cop411::new(RATE);
        snd.command_byte(0xE0 | note);
        assert!((snd.cur_freq - NOTE_FREQ[note as usize]).abs() < 0.01);
    }
}

// =============================================================================
// Synthesis
// =============================================================================

#[test]
fn test_square_output_is_bounded_by_volume() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0xE5);
    for _ in 0..10_000 {
        let s = snd.sample();
        assert!(s.abs() <= snd.cur_vol + f32::EPSILON);
    }
}

#[test]
fn test_square_frequency_roughly_matches() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0xE0); // 239.23 Hz
    snd.ctrl_loop = 1; // hold the tone for a full second
    let mut crossings = 0u32;
    let mut prev = snd.sample();
    for _ in 0..RATE {
        let s = snd.sample();
        if prev <= 0.0 && s > 0.0 {
            crossings += 1;
        }
        prev = s;
    }
    assert!((crossings as i32 - 239).abs() <= 2, "got {crossings} Hz");
}

#[test]
fn test_noise_uses_lfsr() {
    let mut snd = Cop411::new(RATE);
    snd.command_byte(0x10);
    let before = snd.lfsr;
    for _ in 0..RATE / 10 {
        snd.sample();
    }
    assert_ne!(snd.lfsr, before);
    assert_ne!(snd.lfsr, 0);
}

#[test]
fn test_inactive_engine_is_silent() {
    let mut snd = Cop411::new(RATE);
    assert_eq!(snd.sample(), 0.0);
}

// =============================================================================
// Reset persistence / sanitize
// =============================================================================

#[test]
fn test_soft_reset_preserves_control_register() {
    let mut snd = Cop411::new(RATE);
    send_command(&mut snd, 0x0F); // fast=1, vol=3, loop=1
    send_command(&mut snd, 0xE5);
    assert!(snd.active);
    snd.soft_reset();
    assert!(!snd.active);
    assert_eq!(snd.ctrl_fast, 1);
    assert_eq!(snd.ctrl_vol, 3);
    assert_eq!(snd.ctrl_loop, 1);
    assert_eq!(snd.lfsr, 0x7FFF);
}

#[test]
fn test_sanitize_repairs_corrupt_state() {
    let mut snd = Cop411::new(RATE);
    snd.lfsr = 0;
    snd.step_count = 99;
    snd.cur_step = 5;
    snd.cur_freq = f32::NAN;
    snd.cur_vol = f32::INFINITY;
    snd.segment = 7;
    snd.sanitize();
    assert_eq!(snd.lfsr, 0x7FFF);
    assert_eq!(snd.step_count, 0);
    assert_eq!(snd.cur_step, 0);
    assert_eq!(snd.cur_freq, 0.0);
    assert_eq!(snd.cur_vol, 0.0);
    assert_eq!(snd.segment, 0);
}

#[test]
fn test_sanitize_clamps_cursor_into_step_range() {
    let mut snd = Cop411::new(RATE);
    snd.step_count = 4;
    snd.cur_step = 4;
    snd.sanitize();
    assert!(snd.cur_step >= 0 && snd.cur_step < snd.step_count);
    assert!(snd.step_count >= 0 && snd.step_count <= MAX_STEPS as i32);
}
