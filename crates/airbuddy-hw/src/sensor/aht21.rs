//! AHT21 temperature and humidity sensor.

use crate::{Error, Result};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use tracing::debug;

/// Status register bit: conversion in progress.
const STATUS_BUSY: u8 = 0x80;

/// Status register bit: calibration coefficients loaded.
const STATUS_CALIBRATED: u8 = 0x08;

const CMD_STATUS: u8 = 0x71;
const CMD_CALIBRATE: [u8; 3] = [0xBE, 0x08, 0x00];
const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];

/// Conversion time after a trigger command, in milliseconds.
const MEASUREMENT_DELAY_MS: u32 = 80;

/// Full scale of the 20-bit raw fields.
const RAW_SCALE: f64 = (1u32 << 20) as f64;

/// AHT21 driver owning its bus handle.
pub struct Aht21<I, D> {
    i2c: I,
    delay: D,
    address: u8,
}

impl<I: I2c, D: DelayNs> Aht21<I, D> {
    /// Creates a driver for the sensor at `address`.
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Loads calibration if the sensor reports it missing.
    pub fn init(&mut self) -> Result<()> {
        let mut status = [0u8; 1];
        self.i2c
            .write_read(self.address, &[CMD_STATUS], &mut status)
            .map_err(Error::i2c)?;

        if status[0] & STATUS_CALIBRATED == 0 {
            debug!("AHT21 not calibrated (status 0x{:02X}), calibrating", status[0]);
            self.i2c
                .write(self.address, &CMD_CALIBRATE)
                .map_err(Error::i2c)?;
            self.delay.delay_ms(10);
        }
        Ok(())
    }

    /// Triggers a conversion and returns `(temperature_c, humidity)`.
    pub fn measure(&mut self) -> Result<(f64, f64)> {
        self.i2c
            .write(self.address, &CMD_TRIGGER)
            .map_err(Error::i2c)?;
        self.delay.delay_ms(MEASUREMENT_DELAY_MS);

        let mut frame = [0u8; 7];
        self.i2c
            .read(self.address, &mut frame)
            .map_err(Error::i2c)?;
        decode_measurement(&frame)
    }
}

/// CRC-8, polynomial 0x31, initial value 0xFF.
pub(crate) fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0xFFu8, |mut crc, &byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Decodes a 7-byte measurement frame (status, 5 data bytes, CRC).
pub(crate) fn decode_measurement(frame: &[u8; 7]) -> Result<(f64, f64)> {
    if frame[0] & STATUS_BUSY != 0 {
        return Err(Error::Busy);
    }

    let expected = crc8(&frame[..6]);
    if expected != frame[6] {
        return Err(Error::Crc {
            expected,
            actual: frame[6],
        });
    }

    let raw_humidity =
        ((frame[1] as u32) << 12) | ((frame[2] as u32) << 4) | ((frame[3] as u32) >> 4);
    let raw_temperature =
        (((frame[3] & 0x0F) as u32) << 16) | ((frame[4] as u32) << 8) | frame[5] as u32;

    let humidity = raw_humidity as f64 / RAW_SCALE * 100.0;
    let temperature = raw_temperature as f64 / RAW_SCALE * 200.0 - 50.0;
    Ok((temperature, humidity))
}
