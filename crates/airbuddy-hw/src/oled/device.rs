//! OLED panel driven through the `ssd1306` crate.

use crate::{Error, Result, OLED_HEIGHT, OLED_WIDTH};
use linux_embedded_hal::I2cdev;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};
use tracing::{debug, info};

use super::framebuffer::Framebuffer;

type Panel = Ssd1306<
    I2CInterface<I2cdev>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

fn display_err<E: std::fmt::Debug>(e: E) -> Error {
    Error::Display(format!("{:?}", e))
}

/// SSD1306 panel controller.
pub struct OledDevice {
    panel: Panel,
}

impl OledDevice {
    /// Opens the panel on `bus_path` and runs the power-on sequence.
    ///
    /// `flip` rotates the image 180 degrees for panels mounted upside down.
    pub fn open(bus_path: &str, address: u8, flip: bool) -> Result<Self> {
        let i2c = I2cdev::new(bus_path).map_err(|e| {
            debug!("Failed to open I2C bus {}: {}", bus_path, e);
            Error::BusNotFound(bus_path.to_string())
        })?;

        let rotation = if flip {
            DisplayRotation::Rotate180
        } else {
            DisplayRotation::Rotate0
        };
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut panel =
            Ssd1306::new(interface, DisplaySize128x64, rotation).into_buffered_graphics_mode();
        panel.init().map_err(display_err)?;

        info!(
            "OLED panel opened on {} at 0x{:02X}{}",
            bus_path,
            address,
            if flip { " (flipped)" } else { "" }
        );

        let mut device = Self { panel };
        device.clear()?;
        Ok(device)
    }

    /// Pushes a full frame to display RAM.
    pub fn flush(&mut self, framebuffer: &Framebuffer) -> Result<()> {
        self.panel.clear_buffer();
        for y in 0..OLED_HEIGHT {
            for x in 0..OLED_WIDTH {
                if framebuffer.get_pixel(x, y) == Some(true) {
                    self.panel.set_pixel(x as u32, y as u32, true);
                }
            }
        }
        self.panel.flush().map_err(display_err)?;
        debug!("OLED frame flushed ({} lit)", framebuffer.lit());
        Ok(())
    }

    /// Blanks the panel.
    pub fn clear(&mut self) -> Result<()> {
        self.flush(&Framebuffer::new())
    }

    /// Turns the panel on or off without touching RAM.
    pub fn set_power(&mut self, on: bool) -> Result<()> {
        self.panel.set_display_on(on).map_err(display_err)
    }
}
