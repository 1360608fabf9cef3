//! Error types for the airBuddy hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with the hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// I2C adapter could not be opened.
    #[error("I2C bus not found at {0}")]
    BusNotFound(String),

    /// I2C transfer failure.
    #[error("I2C error: {0}")]
    I2c(String),

    /// SSD1306 interface failure.
    #[error("Display error: {0}")]
    Display(String),

    /// A sensor was used before it was initialized.
    #[error("Sensor not initialized")]
    NotInitialized,

    /// The device at the address reported an unexpected identity.
    #[error("Unexpected part id at 0x{address:02X}: 0x{part_id:04X}")]
    UnexpectedPartId { address: u8, part_id: u16 },

    /// Measurement CRC did not match.
    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Crc { expected: u8, actual: u8 },

    /// Sensor still busy after the conversion delay.
    #[error("Sensor busy")]
    Busy,

    /// Sensor flagged its output as invalid.
    #[error("Invalid sensor data: {0}")]
    InvalidData(String),

    /// GPIO sysfs access failure.
    #[error("GPIO {pin} error: {source}")]
    Gpio {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    /// Framebuffer size mismatch.
    #[error("Framebuffer size mismatch: expected {expected}, got {actual}")]
    FramebufferSize { expected: usize, actual: usize },
}

impl Error {
    /// Wraps any embedded-hal bus error.
    pub(crate) fn i2c<E: embedded_hal::i2c::Error>(e: E) -> Self {
        Error::I2c(format!("{:?}", e.kind()))
    }
}
