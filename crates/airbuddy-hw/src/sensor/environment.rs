//! AHT21 + ENS160 pair presented as a single sensor device.

use super::{Aht21, Ens160, Measurement, SensorDevice};
use crate::{Error, Result};
use linux_embedded_hal::{Delay, I2cdev};
use tracing::{debug, info};

/// Handles that only exist after a successful initialization.
struct Handles {
    aht: Aht21<I2cdev, Delay>,
    ens: Ens160<I2cdev, Delay>,
}

/// The appliance's environmental sensor.
pub struct EnvironmentSensor {
    bus_path: String,
    aht_address: u8,
    ens_address: u8,
    handles: Option<Handles>,
}

/// Opens one handle on the adapter. Each driver gets its own.
fn open_bus(path: &str) -> Result<I2cdev> {
    I2cdev::new(path).map_err(|e| {
        debug!("Failed to open I2C bus {}: {}", path, e);
        Error::BusNotFound(path.to_string())
    })
}

impl EnvironmentSensor {
    /// Creates an uninitialized sensor description. Nothing touches the bus
    /// until [`SensorDevice::initialize`] runs.
    pub fn new(bus_path: &str, aht_address: u8, ens_address: u8) -> Self {
        Self {
            bus_path: bus_path.to_string(),
            aht_address,
            ens_address,
            handles: None,
        }
    }

    fn open(&self) -> Result<Handles> {
        let mut aht = Aht21::new(open_bus(&self.bus_path)?, Delay, self.aht_address);
        let mut ens = Ens160::new(open_bus(&self.bus_path)?, Delay, self.ens_address);
        aht.init()?;
        ens.init()?;
        Ok(Handles { aht, ens })
    }
}

impl SensorDevice for EnvironmentSensor {
    fn name(&self) -> &str {
        "aht21+ens160"
    }

    fn initialize(&mut self) -> Result<()> {
        // Drop stale handles first so a failed attempt leaves nothing behind
        self.handles = None;
        let handles = self.open()?;
        self.handles = Some(handles);
        info!(
            "Sensor initialized on {} (AHT21 0x{:02X}, ENS160 0x{:02X})",
            self.bus_path, self.aht_address, self.ens_address
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.handles.is_some()
    }

    fn read_one(&mut self) -> Result<Measurement> {
        let handles = self.handles.as_mut().ok_or(Error::NotInitialized)?;

        let (temperature_c, humidity) = handles.aht.measure()?;

        if let Err(e) = handles.ens.set_compensation(temperature_c, humidity) {
            debug!("ENS160 compensation write failed: {}", e);
        }

        let air = handles.ens.read()?;
        debug!(
            "Sensor read: {:.2} C, {:.2} %, eCO2 {} ppm, TVOC {} ppb, AQI {}",
            temperature_c, humidity, air.eco2_ppm, air.tvoc_ppb, air.aqi
        );

        Ok(Measurement {
            temperature_c,
            humidity,
            eco2_ppm: air.eco2_ppm,
            tvoc_ppb: air.tvoc_ppb,
            aqi: air.aqi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_init_fails() {
        let mut sensor = EnvironmentSensor::new("/dev/i2c-does-not-exist", 0x38, 0x53);
        assert!(!sensor.is_initialized());
        assert!(matches!(sensor.read_one(), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_failed_init_leaves_sensor_uninitialized() {
        let mut sensor = EnvironmentSensor::new("/dev/i2c-does-not-exist", 0x38, 0x53);
        assert!(sensor.initialize().is_err());
        assert!(!sensor.is_initialized());
        // Retrying is harmless
        assert!(sensor.initialize().is_err());
        assert!(!sensor.is_initialized());
    }

    // Hardware tests are skipped by default
    #[test]
    #[ignore]
    fn test_sensor_read() {
        let mut sensor = EnvironmentSensor::new("/dev/i2c-1", 0x38, 0x53);
        sensor.initialize().unwrap();
        let measurement = sensor.read_one().unwrap();
        assert!((1..=5).contains(&measurement.aqi));
    }
}
