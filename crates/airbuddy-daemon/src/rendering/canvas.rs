//! Canvas for composing panel frames.

use airbuddy_hw::Framebuffer;
use anyhow::{anyhow, Result};
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use super::text::TextRenderer;

/// Luma above which a canvas pixel lights an OLED pixel.
const LIT_THRESHOLD: u8 = 96;

/// Black-and-white drawing surface the size of the panel.
pub struct Canvas {
    width: u32,
    height: u32,
    pixmap: Pixmap,
}

impl Canvas {
    /// Creates a new, cleared canvas.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("Invalid canvas size {}x{}", width, height))?;
        pixmap.fill(Color::BLACK);
        Ok(Self {
            width,
            height,
            pixmap,
        })
    }

    /// Returns the canvas dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Clears the canvas to black.
    pub fn clear(&mut self) {
        self.pixmap.fill(Color::BLACK);
    }

    /// Draws a filled rectangle, lit or dark.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, lit: bool) {
        let mut paint = Paint::default();
        paint.set_color(if lit { Color::WHITE } else { Color::BLACK });

        if let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) {
            self.pixmap
                .fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    /// Draws a one-pixel rectangle outline.
    pub fn draw_rect_outline(&mut self, x: i32, y: i32, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let right = x + width as i32 - 1;
        let bottom = y + height as i32 - 1;
        self.fill_rect(x, y, width, 1, true);
        self.fill_rect(x, bottom, width, 1, true);
        self.fill_rect(x, y, 1, height, true);
        self.fill_rect(right, y, 1, height, true);
    }

    /// Draws text with its top-left corner at (x, y).
    pub fn draw_text(&mut self, font: &TextRenderer, x: i32, y: i32, text: &str, size: f32) {
        font.draw_text(&mut self.pixmap, x, y, text, size);
    }

    /// Draws text horizontally centered on the canvas.
    pub fn draw_text_centered(&mut self, font: &TextRenderer, y: i32, text: &str, size: f32) {
        let x = (self.width as i32 - font.text_width(text, size)) / 2;
        self.draw_text(font, x.max(0), y, text, size);
    }

    /// Returns the raw RGBA pixels.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Thresholds the canvas into a panel framebuffer.
    pub fn render_to_framebuffer(&self, fb: &mut Framebuffer) -> Result<()> {
        fb.copy_from_rgba8(self.pixmap.data(), LIT_THRESHOLD)?;
        Ok(())
    }

    /// Encodes the canvas as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(self.pixmap.data())?;
        }
        Ok(png_data)
    }
}
