//! Text rendering using fontdue.

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;
use tiny_skia::Pixmap;

/// Text renderer using fontdue for rasterization.
pub struct TextRenderer {
    font: Font,
}

impl TextRenderer {
    /// Loads a TrueType font from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())
            .with_context(|| format!("Failed to read font {}", path.as_ref().display()))?;
        Self::from_bytes(&data)
    }

    /// Parses a TrueType font from memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font })
    }

    /// Draws white text onto a pixmap with its top-left corner at (x, y).
    ///
    /// Glyph coverage is blended against the existing pixels; the panel
    /// thresholds the result later.
    pub fn draw_text(&self, pixmap: &mut Pixmap, x: i32, y: i32, text: &str, size: f32) {
        let width = pixmap.width();
        let height = pixmap.height();
        let data = pixmap.data_mut();
        let mut cursor_x = x;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, size);

            for glyph_y in 0..metrics.height {
                for glyph_x in 0..metrics.width {
                    let coverage = bitmap[glyph_y * metrics.width + glyph_x];
                    if coverage == 0 {
                        continue;
                    }
                    let px = cursor_x + metrics.xmin + glyph_x as i32;
                    let py = y + (size as i32 - metrics.ymin - metrics.height as i32)
                        + glyph_y as i32;
                    if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                        continue;
                    }

                    let idx = (py as u32 * width + px as u32) as usize * 4;
                    let alpha = coverage as f32 / 255.0;
                    for channel in &mut data[idx..idx + 3] {
                        *channel = (255.0 * alpha + *channel as f32 * (1.0 - alpha)) as u8;
                    }
                    data[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width as i32;
        }
    }

    /// Returns the width of text when rendered at the specified size.
    pub fn text_width(&self, text: &str, size: f32) -> i32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, size).advance_width as i32)
            .sum()
    }

    /// Returns the line height for the specified font size.
    pub fn line_height(&self, size: f32) -> i32 {
        // fontdue doesn't provide line metrics directly, approximate
        (size * 1.2) as i32
    }
}
