//! Simulated sensor for running without hardware.
//!
//! Produces slowly drifting, deterministic readings so the rest of the
//! appliance (scheduler, log, display) can be exercised on a desktop.

use super::{Measurement, SensorDevice};
use crate::{Error, Result};

/// Synthetic sensor device.
pub struct SimulatedSensor {
    initialized: bool,
    step: u64,
}

impl SimulatedSensor {
    /// Creates a simulated sensor.
    pub fn new() -> Self {
        Self {
            initialized: false,
            step: 0,
        }
    }

    fn sample_at(step: u64) -> Measurement {
        let phase = step as f64 / 12.0;
        let wave = phase.sin();
        let eco2_ppm = (650.0 + 250.0 * wave).round() as u16;
        let tvoc_ppb = (120.0 + 80.0 * (phase * 0.7).cos()).round() as u16;
        let aqi = match eco2_ppm {
            0..=600 => 1,
            601..=800 => 2,
            801..=1000 => 3,
            1001..=1500 => 4,
            _ => 5,
        };

        Measurement {
            temperature_c: 21.5 + 1.5 * wave,
            humidity: 45.0 + 5.0 * (phase * 0.5).cos(),
            eco2_ppm,
            tvoc_ppb,
            aqi,
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDevice for SimulatedSensor {
    fn name(&self) -> &str {
        "simulated"
    }

    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn read_one(&mut self) -> Result<Measurement> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        let measurement = Self::sample_at(self.step);
        self.step += 1;
        Ok(measurement)
    }
}
