//! OLED panel module.
//!
//! Provides control over the 128x64 monochrome SSD1306 panel via I2C.

mod device;

pub mod framebuffer;

pub use device::OledDevice;
pub use framebuffer::Framebuffer;
