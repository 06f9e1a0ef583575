use std::path::PathBuf;

use advision_core::core::machine::Machine;
use advision_machines::AdventureVision;
use advision_machines::adventure_vision::{
    INPUT_BUTTON_1, INPUT_BUTTON_2, INPUT_BUTTON_3, INPUT_BUTTON_4, INPUT_DOWN, INPUT_LEFT,
    INPUT_RIGHT, INPUT_UP,
};
use advision_machines::rom_loader;
use clap::Parser;

mod audio;
mod config;
mod emulator;
mod input;
mod overlay;
mod screenshot;
mod self_test;
mod video;
mod wav;

use config::Config;

/// Entex Adventure Vision emulator.
#[derive(Parser)]
#[command(name = "advision", version, about)]
struct Args {
    /// System firmware image (1 KiB)
    bios: Option<PathBuf>,

    /// Cartridge image (up to 4 KiB)
    game: Option<PathBuf>,

    /// Run N frames headless and exit
    #[arg(long)]
    frames: Option<u32>,

    /// Inputs held during a headless run (chars U/D/L/R/1/2/3/4)
    #[arg(long)]
    input: Option<String>,

    /// Print an ASCII phosphor dump after each headless frame
    #[arg(long)]
    dump: bool,

    /// Run the built-in self test and exit
    #[arg(long)]
    test: bool,

    /// Window scale factor (1-10)
    #[arg(long)]
    scale: Option<u32>,

    /// Start fullscreen
    #[arg(long)]
    fullscreen: bool,

    /// Disable audio output
    #[arg(long)]
    no_sound: bool,

    /// Output volume (0-10)
    #[arg(long)]
    volume: Option<i32>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if args.test {
        std::process::exit(self_test::run());
    }

    let (Some(bios_path), Some(game_path)) = (&args.bios, &args.game) else {
        eprintln!("Usage: advision [--test] [--frames N] [--input UDLR1234] [--dump] <bios.rom> <game.rom>");
        std::process::exit(1);
    };

    let config_path = config::config_path();
    let mut config = Config::load(&config_path);

    // CLI overrides
    if let Some(scale) = args.scale {
        if (1..=10).contains(&scale) {
            config.scale = scale;
        } else {
            eprintln!("Invalid --scale value, ignoring");
        }
    }
    if args.fullscreen {
        config.fullscreen = true;
    }
    if let Some(volume) = args.volume {
        if (0..=10).contains(&volume) {
            config.volume = volume;
        } else {
            eprintln!("Invalid --volume value, ignoring");
        }
    }

    let firmware = match rom_loader::load_firmware_file(bios_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Cannot load firmware {}: {e}", bios_path.display());
            std::process::exit(1);
        }
    };
    let cartridge = match rom_loader::load_cartridge_file(game_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Cannot load cartridge {}: {e}", game_path.display());
            std::process::exit(1);
        }
    };

    let mut machine = AdventureVision::new();
    machine.load_firmware(&firmware);
    machine.load_cartridge(&cartridge);
    machine.set_phosphor_decay(config.phosphor);
    machine.set_led_gamma(config.gamma);
    machine.set_t1_pulse(config.t1_pulse_start, config.t1_pulse_end);

    if args.frames.is_some() || args.dump {
        let frames = args.frames.unwrap_or(60);
        headless_run(&mut machine, frames, args.input.as_deref(), args.dump);
        return;
    }

    let game_name = game_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "game".into());
    let title = format!("Adventure Vision - {game_name}");
    let save_name = rom_loader::savestate_name_for(game_path);

    let key_map = input::default_key_map(machine.input_map());
    emulator::run(
        &mut machine,
        &key_map,
        &mut config,
        std::path::Path::new(&save_name),
        args.no_sound,
        &title,
    );

    config.save(&config_path);
}

/// Run without SDL: fixed frame count, optional held inputs, optional
/// per-frame phosphor dump, then a one-line summary.
fn headless_run(machine: &mut AdventureVision, frames: u32, input: Option<&str>, dump: bool) {
    if let Some(chars) = input {
        for ch in chars.chars() {
            let button = match ch.to_ascii_uppercase() {
                'U' => Some(INPUT_UP),
                'D' => Some(INPUT_DOWN),
                'L' => Some(INPUT_LEFT),
                'R' => Some(INPUT_RIGHT),
                '1' => Some(INPUT_BUTTON_1),
                '2' => Some(INPUT_BUTTON_2),
                '3' => Some(INPUT_BUTTON_3),
                '4' => Some(INPUT_BUTTON_4),
                _ => None,
            };
            if let Some(button) = button {
                machine.set_input(button, true);
            }
        }
    }

    for frame in 0..frames {
        machine.run_frame();
        if dump {
            println!("--- Frame {frame} ---");
            print!("{}", machine.dump_phosphor_ascii());
        }
    }

    let state = machine.cpu_state();
    println!(
        "PC={:03X} A={:02X} C={} F0={} F1={} BS={} SP={} MB={} T={:02X} P1={:02X} P2={:02X}",
        state.pc,
        state.a,
        state.c as u8,
        state.f0 as u8,
        state.f1 as u8,
        state.bs as u8,
        state.sp,
        state.mb as u8,
        state.timer,
        state.p1,
        state.p2
    );
    println!(
        "{} cycles, {} pixels lit, {frames} frames.",
        machine.cycles(),
        machine.lit_pixels(0.1)
    );
}
