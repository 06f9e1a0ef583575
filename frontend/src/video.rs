use sdl2::pixels::PixelFormatEnum;
use sdl2::rect::Rect;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{FullscreenType, Window, WindowContext};

use advision_core::device::led_display::SCREEN_HEIGHT;

pub struct Video {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    width: u32,
    height: u32,
}

impl Video {
    /// Create an SDL window and renderer for the given native resolution.
    pub fn new(
        sdl_video: &sdl2::VideoSubsystem,
        title: &str,
        native_width: u32,
        native_height: u32,
        scale: u32,
        fullscreen: bool,
    ) -> Self {
        let mut builder = sdl_video.window(title, native_width * scale, native_height * scale);
        builder.position_centered();
        if fullscreen {
            builder.fullscreen_desktop();
        }
        let window = builder.build().expect("Failed to create window");

        let canvas = window
            .into_canvas()
            .accelerated()
            .build()
            .expect("Failed to create canvas");

        let texture_creator = canvas.texture_creator();

        Self {
            canvas,
            texture_creator,
            width: native_width,
            height: native_height,
        }
    }

    /// Upload an RGB24 framebuffer and present it, with the optional
    /// scanline darkening and integer-multiple letterboxing.
    pub fn present(&mut self, framebuffer: &[u8], scanlines: bool, integer_scale: bool) {
        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, self.width, self.height)
            .expect("Failed to create texture");

        texture
            .update(None, framebuffer, (self.width * 3) as usize)
            .expect("Failed to update texture");

        self.canvas.set_draw_color(sdl2::pixels::Color::RGB(0, 0, 0));
        self.canvas.clear();

        let (out_w, out_h) = self.canvas.output_size().unwrap_or((self.width, self.height));
        let dst = if integer_scale {
            let s = (out_w / self.width).min(out_h / self.height).max(1);
            let dw = self.width * s;
            let dh = self.height * s;
            Rect::new(
                ((out_w as i32) - (dw as i32)) / 2,
                ((out_h as i32) - (dh as i32)) / 2,
                dw,
                dh,
            )
        } else {
            Rect::new(0, 0, out_w, out_h)
        };

        self.canvas
            .copy(&texture, None, Some(dst))
            .expect("Failed to copy texture");

        // Darken every other LED row over the destination rect
        if scanlines {
            self.canvas
                .set_blend_mode(sdl2::render::BlendMode::Blend);
            self.canvas
                .set_draw_color(sdl2::pixels::Color::RGBA(0, 0, 0, 60));
            let row_h = (dst.height() as f32 / SCREEN_HEIGHT as f32).max(1.0);
            for row in (0..SCREEN_HEIGHT).step_by(2) {
                let y = dst.y() + (row as f32 * row_h) as i32;
                let _ = self.canvas.fill_rect(Rect::new(
                    dst.x(),
                    y,
                    dst.width(),
                    row_h.round().max(1.0) as u32,
                ));
            }
            self.canvas.set_blend_mode(sdl2::render::BlendMode::None);
        }

        self.canvas.present();
    }

    pub fn set_fullscreen(&mut self, on: bool) {
        let mode = if on {
            FullscreenType::Desktop
        } else {
            FullscreenType::Off
        };
        if let Err(e) = self.canvas.window_mut().set_fullscreen(mode) {
            log::warn!("fullscreen toggle failed: {e}");
        }
    }
}
