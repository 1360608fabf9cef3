//! airBuddy Hardware Library
//!
//! Provides hardware abstraction for the airBuddy appliance: the AHT21 +
//! ENS160 environmental sensor pair, the SSD1306 OLED panel and the push
//! button, all attached to a Linux single-board computer.

pub mod button;
pub mod error;
pub mod oled;
pub mod sensor;

pub use button::{ButtonAction, GpioButton};
pub use error::{Error, Result};
pub use oled::{Framebuffer, OledDevice};
pub use sensor::{EnvironmentSensor, Measurement, SensorDevice, SimulatedSensor};

/// OLED panel dimensions
pub const OLED_WIDTH: u16 = 128;
pub const OLED_HEIGHT: u16 = 64;

/// Default I2C addresses
pub const AHT21_ADDRESS: u8 = 0x38;
pub const ENS160_ADDRESS: u8 = 0x53;
pub const SSD1306_ADDRESS: u8 = 0x3C;
