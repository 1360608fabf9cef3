//! ENS160 digital metal-oxide air-quality sensor.
//!
//! Register map (all multi-byte values little-endian):
//! - 0x00 PART_ID (0x0160)
//! - 0x10 OPMODE (0x00 deep sleep, 0x01 idle, 0x02 standard, 0xF0 reset)
//! - 0x13 TEMP_IN, 0x15 RH_IN (compensation inputs)
//! - 0x20 DEVICE_STATUS, 0x21 DATA_AQI, 0x22 DATA_TVOC, 0x24 DATA_ECO2

use crate::{Error, Result};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use tracing::debug;

/// Expected PART_ID contents.
pub const PART_ID: u16 = 0x0160;

const REG_PART_ID: u8 = 0x00;
const REG_OPMODE: u8 = 0x10;
const REG_TEMP_IN: u8 = 0x13;
const REG_DEVICE_STATUS: u8 = 0x20;
const REG_DATA_AQI: u8 = 0x21;

/// Operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpMode {
    /// Lowest power, no measurements.
    DeepSleep = 0x00,
    /// Low power standby.
    Idle = 0x01,
    /// Continuous gas sensing.
    Standard = 0x02,
    /// Soft reset.
    Reset = 0xF0,
}

/// Validity flag reported in DEVICE_STATUS bits 3:2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Normal operation.
    Normal,
    /// Warm-up phase after power on (first 3 minutes).
    WarmUp,
    /// Initial start-up phase (first hour of operation).
    InitialStartUp,
    /// No valid output.
    Invalid,
}

impl Validity {
    /// Extracts the validity flag from a DEVICE_STATUS byte.
    pub fn from_status(status: u8) -> Self {
        match (status >> 2) & 0x03 {
            0 => Validity::Normal,
            1 => Validity::WarmUp,
            2 => Validity::InitialStartUp,
            _ => Validity::Invalid,
        }
    }
}

/// Decoded DATA_AQI..DATA_ECO2 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQuality {
    pub aqi: u8,
    pub tvoc_ppb: u16,
    pub eco2_ppm: u16,
}

/// ENS160 driver owning its bus handle.
pub struct Ens160<I, D> {
    i2c: I,
    delay: D,
    address: u8,
}

impl<I: I2c, D: DelayNs> Ens160<I, D> {
    /// Creates a driver for the sensor at `address`.
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Verifies the part id, resets the device and starts standard mode.
    pub fn init(&mut self) -> Result<()> {
        let mut id = [0u8; 2];
        self.i2c
            .write_read(self.address, &[REG_PART_ID], &mut id)
            .map_err(Error::i2c)?;
        let part_id = u16::from_le_bytes(id);
        if part_id != PART_ID {
            return Err(Error::UnexpectedPartId {
                address: self.address,
                part_id,
            });
        }

        self.set_mode(OpMode::Reset)?;
        self.delay.delay_ms(10);
        self.set_mode(OpMode::Idle)?;
        self.set_mode(OpMode::Standard)?;
        self.delay.delay_ms(50);

        debug!("ENS160 at 0x{:02X} in standard mode", self.address);
        Ok(())
    }

    /// Switches the operating mode.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<()> {
        self.i2c
            .write(self.address, &[REG_OPMODE, mode as u8])
            .map_err(Error::i2c)
    }

    /// Writes ambient temperature and humidity used for internal compensation.
    pub fn set_compensation(&mut self, temperature_c: f64, humidity: f64) -> Result<()> {
        let packet = build_compensation_packet(temperature_c, humidity);
        self.i2c.write(self.address, &packet).map_err(Error::i2c)
    }

    /// Reads the validity flag.
    pub fn validity(&mut self) -> Result<Validity> {
        let mut status = [0u8; 1];
        self.i2c
            .write_read(self.address, &[REG_DEVICE_STATUS], &mut status)
            .map_err(Error::i2c)?;
        Ok(Validity::from_status(status[0]))
    }

    /// Reads AQI, TVOC and eCO2 in one transfer.
    pub fn read(&mut self) -> Result<AirQuality> {
        if self.validity()? == Validity::Invalid {
            return Err(Error::InvalidData("ENS160 reports invalid output".into()));
        }

        let mut block = [0u8; 5];
        self.i2c
            .write_read(self.address, &[REG_DATA_AQI], &mut block)
            .map_err(Error::i2c)?;
        Ok(decode_air_quality(&block))
    }
}

/// Decodes the five bytes starting at DATA_AQI.
pub(crate) fn decode_air_quality(block: &[u8; 5]) -> AirQuality {
    AirQuality {
        aqi: block[0] & 0x07,
        tvoc_ppb: u16::from_le_bytes([block[1], block[2]]),
        eco2_ppm: u16::from_le_bytes([block[3], block[4]]),
    }
}

/// Builds the TEMP_IN/RH_IN write: temperature as Kelvin * 64, humidity as
/// percent * 512, both little-endian.
pub(crate) fn build_compensation_packet(temperature_c: f64, humidity: f64) -> [u8; 5] {
    let temperature = ((temperature_c + 273.15) * 64.0).round().clamp(0.0, 65535.0) as u16;
    let humidity = (humidity * 512.0).round().clamp(0.0, 65535.0) as u16;
    let t = temperature.to_le_bytes();
    let h = humidity.to_le_bytes();
    [REG_TEMP_IN, t[0], t[1], h[0], h[1]]
}
