//! Interactive SDL loop: event pump, frame pacing, hotkeys, OSD.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use advision_core::core::machine::Machine;
use advision_machines::AdventureVision;
use advision_machines::savestate;
use log::{info, warn};
use sdl2::event::Event;
use sdl2::keyboard::Scancode;

use crate::audio;
use crate::config::{Config, PROFILE_COUNT, PROFILE_NAMES};
use crate::input::KeyMap;
use crate::overlay;
use crate::screenshot;
use crate::video::Video;
use crate::wav::WavWriter;

/// OSD messages linger for two seconds.
const OSD_FRAMES: u32 = 30;

struct Osd {
    text: String,
    frames_left: u32,
}

impl Osd {
    fn show(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.frames_left = OSD_FRAMES;
    }
}

pub fn run(
    machine: &mut AdventureVision,
    key_map: &KeyMap,
    config: &mut Config,
    save_path: &Path,
    no_sound: bool,
    title: &str,
) {
    let sdl_context = sdl2::init().expect("Failed to initialize SDL2");
    let sdl_video = sdl_context.video().expect("Failed to init SDL video");

    let (width, height) = machine.display_size();
    let scale = if config.scale == 0 { 5 } else { config.scale };
    let mut video = Video::new(&sdl_video, title, width, height, scale, config.fullscreen);
    let mut event_pump = sdl_context.event_pump().expect("Failed to get event pump");

    // Audio: the callback shares the sound engine's mutex with the frame
    // driver. Absent audio (init failure or --no-sound) still leaves the
    // machine fully functional.
    let mut audio_out = if no_sound {
        None
    } else {
        let sdl_audio = sdl_context.audio().ok();
        sdl_audio.and_then(|a| {
            audio::init(
                &a,
                machine.audio_source(),
                config.volume,
                config.audio_profile,
            )
        })
    };
    if let Some((device, _)) = &audio_out {
        device.resume();
    }

    let mut framebuffer = vec![0u8; (width * height * 3) as usize];
    let mut osd = Osd {
        text: String::new(),
        frames_left: 0,
    };
    let mut paused = false;
    let mut show_stats = false;
    let mut wav: Option<WavWriter> = None;
    let mut fullscreen = config.fullscreen;

    let frame_duration = Duration::from_secs_f64(1.0 / machine.frame_rate_hz());
    let mut next_frame = Instant::now();
    let mut measured_fps = machine.frame_rate_hz();
    let mut last_frame_at = Instant::now();

    'main: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'main,

                Event::KeyDown {
                    scancode: Some(sc),
                    repeat: false,
                    ..
                } => match sc {
                    Scancode::Escape => break 'main,
                    Scancode::P => {
                        paused = !paused;
                        osd.show(if paused { "Paused" } else { "Resumed" });
                    }
                    Scancode::R => {
                        machine.reset();
                        osd.show("Reset");
                    }
                    Scancode::Equals | Scancode::KpPlus => {
                        if config.volume < 10 {
                            config.volume += 1;
                        }
                        if let Some((_, controls)) = &audio_out {
                            controls.volume.store(config.volume, Ordering::Relaxed);
                        }
                        osd.show(format!("Volume: {}", config.volume));
                    }
                    Scancode::Minus | Scancode::KpMinus => {
                        if config.volume > 0 {
                            config.volume -= 1;
                        }
                        if let Some((_, controls)) = &audio_out {
                            controls.volume.store(config.volume, Ordering::Relaxed);
                        }
                        osd.show(format!("Volume: {}", config.volume));
                    }
                    Scancode::Grave => {
                        show_stats = !show_stats;
                        osd.show(if show_stats { "Stats ON" } else { "Stats OFF" });
                    }
                    Scancode::F2 => {
                        if let Some((_, controls)) = &audio_out {
                            if let Some(writer) = wav.take() {
                                controls.recording.store(false, Ordering::Relaxed);
                                info!("WAV saved to {}", writer.path().display());
                                writer.finish(&controls.wav_rx);
                                osd.show("WAV saved");
                            } else {
                                let name = screenshot::screenshot_name().replace(".png", ".wav");
                                match WavWriter::create(Path::new(&name), audio::SAMPLE_RATE) {
                                    Ok(writer) => {
                                        wav = Some(writer);
                                        controls.recording.store(true, Ordering::Relaxed);
                                        osd.show("Recording WAV...");
                                    }
                                    Err(e) => {
                                        warn!("wav: cannot create {name}: {e}");
                                        osd.show("WAV failed");
                                    }
                                }
                            }
                        } else {
                            osd.show("No audio device");
                        }
                    }
                    Scancode::F3 => {
                        let on = !machine.midframe_scan();
                        machine.set_midframe_scan(on);
                        osd.show(if on {
                            "Mid-frame scan ON"
                        } else {
                            "Mid-frame scan OFF"
                        });
                    }
                    Scancode::F4 => {
                        config.audio_profile = (config.audio_profile + 1) % PROFILE_COUNT;
                        if let Some((_, controls)) = &audio_out {
                            controls
                                .profile
                                .store(config.audio_profile, Ordering::Relaxed);
                        }
                        osd.show(format!(
                            "Audio: {}",
                            PROFILE_NAMES[config.audio_profile as usize]
                        ));
                    }
                    Scancode::F5 => {
                        let blob = savestate::save_state(machine);
                        match std::fs::write(save_path, blob) {
                            Ok(()) => osd.show("State saved"),
                            Err(e) => {
                                warn!("cannot write {}: {e}", save_path.display());
                                osd.show("Save failed");
                            }
                        }
                    }
                    Scancode::F6 => {
                        config.integer_scale = !config.integer_scale;
                        osd.show(if config.integer_scale {
                            "Integer scale ON"
                        } else {
                            "Integer scale OFF"
                        });
                    }
                    Scancode::F7 => match std::fs::read(save_path) {
                        Ok(blob) => match savestate::load_state(machine, &blob) {
                            Ok(()) => osd.show("State loaded"),
                            Err(e) => {
                                warn!("savestate rejected: {e}");
                                osd.show("Load failed");
                            }
                        },
                        Err(_) => osd.show("No save found"),
                    },
                    Scancode::F8 => {
                        let popped = machine.rewind(4);
                        if popped > 0 {
                            osd.show(format!("Rewind -{popped}"));
                        } else {
                            osd.show("No rewind data");
                        }
                    }
                    Scancode::F9 => {
                        config.scanlines = !config.scanlines;
                        osd.show(if config.scanlines {
                            "Scanlines ON"
                        } else {
                            "Scanlines OFF"
                        });
                    }
                    Scancode::F11 => {
                        fullscreen = !fullscreen;
                        config.fullscreen = fullscreen;
                        video.set_fullscreen(fullscreen);
                    }
                    Scancode::F12 => {
                        let name = screenshot::screenshot_name();
                        match screenshot::save_png(Path::new(&name), &framebuffer, width, height) {
                            Ok(()) => {
                                info!("screenshot: {name}");
                                osd.show("Screenshot saved");
                            }
                            Err(e) => {
                                warn!("screenshot failed: {e}");
                                osd.show("Screenshot failed");
                            }
                        }
                    }
                    _ => {
                        if let Some(button_id) = key_map.get(sc) {
                            machine.set_input(button_id, true);
                        }
                    }
                },

                Event::KeyUp {
                    scancode: Some(sc), ..
                } => {
                    if let Some(button_id) = key_map.get(sc) {
                        machine.set_input(button_id, false);
                    }
                }

                _ => {}
            }
        }

        if !paused {
            machine.run_frame();
        }

        machine.render_frame(&mut framebuffer);

        // Overlays draw straight into the native framebuffer
        if show_stats {
            let line = format!(
                "FPS:{measured_fps:.1} CY:{} PX:{}",
                machine.cycles(),
                machine.lit_pixels(0.1)
            );
            overlay::draw_text(&mut framebuffer, width as usize, 2, 2, &line);
        }
        if osd.frames_left > 0 {
            osd.frames_left -= 1;
            let text = osd.text.clone();
            overlay::draw_text(&mut framebuffer, width as usize, 2, height as usize - 7, &text);
        }
        if paused {
            overlay::draw_text(&mut framebuffer, width as usize, 64, 17, "PAUSE");
        }

        video.present(&framebuffer, config.scanlines, config.integer_scale);

        // Drain WAV capture on the main thread
        if let (Some(writer), Some((_, controls))) = (&mut wav, &audio_out) {
            writer.drain(&controls.wav_rx);
        }

        // Pace to the machine's frame rate; measure what we actually get
        let dt = last_frame_at.elapsed().as_secs_f64();
        if dt > 0.0 && dt < 0.5 {
            measured_fps = measured_fps * 0.9 + (1.0 / dt) * 0.1;
        }
        last_frame_at = Instant::now();

        next_frame += frame_duration;
        let now = Instant::now();
        if next_frame > now {
            std::thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }

    // Finalize a recording cut short by quitting
    if let (Some(writer), Some((_, controls))) = (wav.take(), &audio_out) {
        controls.recording.store(false, Ordering::Relaxed);
        writer.finish(&controls.wav_rx);
    }
    if let Some((device, _)) = audio_out.take() {
        device.pause();
    }
}
