//! Environmental sensor module.
//!
//! The appliance pairs an AHT21 (temperature, relative humidity) with an
//! ENS160 (air-quality index, TVOC, eCO2) on the same I2C bus.

mod aht21;
mod ens160;
mod environment;
mod simulated;

pub use aht21::Aht21;
pub use ens160::Ens160;
pub use environment::EnvironmentSensor;
pub use simulated::SimulatedSensor;

use crate::Result;

/// One raw sample from the sensor pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Temperature in degrees Celsius
    pub temperature_c: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Equivalent CO2 in ppm
    pub eco2_ppm: u16,
    /// Total volatile organic compounds in ppb
    pub tvoc_ppb: u16,
    /// Device air-quality index (1 = excellent .. 5 = unhealthy)
    pub aqi: u8,
}

/// A physical sensor that can be (re)initialized and sampled.
///
/// `initialize` must be safe to call repeatedly and must leave the handle
/// uninitialized, never half-initialized, when it fails.
pub trait SensorDevice: Send {
    /// Returns the device name for log messages.
    fn name(&self) -> &str;

    /// Attempts to bring the device up.
    fn initialize(&mut self) -> Result<()>;

    /// Returns true once `initialize` has succeeded.
    fn is_initialized(&self) -> bool;

    /// Reads one sample. Fails if the device is not initialized or the bus
    /// transfer fails.
    fn read_one(&mut self) -> Result<Measurement>;
}

impl<T: SensorDevice + ?Sized> SensorDevice for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn read_one(&mut self) -> Result<Measurement> {
        (**self).read_one()
    }
}
