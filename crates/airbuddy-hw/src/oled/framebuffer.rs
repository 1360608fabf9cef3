//! 1-bit page framebuffer for the OLED panel.
//!
//! The SSD1306 groups rows into pages of eight: byte `page * width + x`
//! holds column `x` of rows `page * 8 ..= page * 8 + 7`, least significant
//! bit on top.

use crate::{Error, Result, OLED_HEIGHT, OLED_WIDTH};

/// Bytes needed for the full 128x64 panel.
pub const BUFFER_LEN: usize = OLED_WIDTH as usize * OLED_HEIGHT as usize / 8;

/// Monochrome framebuffer in SSD1306 page layout.
#[derive(Clone)]
pub struct Framebuffer {
    data: Vec<u8>,
    width: u16,
    height: u16,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framebuffer {
    /// Creates a blank framebuffer for the 128x64 panel.
    pub fn new() -> Self {
        Self {
            data: vec![0; BUFFER_LEN],
            width: OLED_WIDTH,
            height: OLED_HEIGHT,
        }
    }

    /// Returns the width of the framebuffer.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Returns the height of the framebuffer.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the raw page data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of lit pixels.
    pub fn lit(&self) -> u32 {
        self.data.iter().map(|b| b.count_ones()).sum()
    }

    /// Blanks every pixel.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    fn locate(&self, x: u16, y: u16) -> Option<(usize, u8)> {
        if x < self.width && y < self.height {
            let idx = (y / 8) as usize * self.width as usize + x as usize;
            Some((idx, 1 << (y % 8)))
        } else {
            None
        }
    }

    /// Lights or blanks a pixel. Out-of-range coordinates are ignored.
    pub fn set_pixel(&mut self, x: u16, y: u16, on: bool) {
        if let Some((idx, mask)) = self.locate(x, y) {
            if on {
                self.data[idx] |= mask;
            } else {
                self.data[idx] &= !mask;
            }
        }
    }

    /// Gets a pixel at the given coordinates.
    pub fn get_pixel(&self, x: u16, y: u16) -> Option<bool> {
        self.locate(x, y)
            .map(|(idx, mask)| self.data[idx] & mask != 0)
    }

    /// Thresholds an RGBA8 image of the same dimensions into the buffer.
    pub fn copy_from_rgba8(&mut self, rgba: &[u8], threshold: u8) -> Result<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if rgba.len() != expected {
            return Err(Error::FramebufferSize {
                expected,
                actual: rgba.len(),
            });
        }

        self.clear();
        for (i, px) in rgba.chunks_exact(4).enumerate() {
            let luma = (px[0] as u16 * 3 + px[1] as u16 * 6 + px[2] as u16) / 10;
            if luma > threshold as u16 {
                let x = (i % self.width as usize) as u16;
                let y = (i / self.width as usize) as u16;
                self.set_pixel(x, y, true);
            }
        }
        Ok(())
    }
}
