//! Sensirion SHT3x humidity and temperature sensor (SHT30, SHT31, SHT35).
//!
//! Single-shot measurements without clock stretching: the trigger command is
//! written, the driver waits the datasheet maximum duration for the selected
//! repeatability, then both channels are read as one 6-byte frame
//! `[T msb, T lsb, crc, RH msb, RH lsb, crc]` in a single read transaction.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::sensirion::{clamp_humidity, fahrenheit, linear_humidity, linear_temperature};
use super::{RangeCheck, Sensor, SensorReadings, milli};
use crate::crc::{SHT3X_INIT, checked_word};
use crate::error::check_address;
use crate::{Error, Result};

const DEVICE: &str = "SHT3X";

/// ADDR pin tied low.
pub const DEFAULT_ADDRESS: u8 = 0x44;
/// ADDR pin tied high.
pub const ALTERNATE_ADDRESS: u8 = 0x45;

const SOFT_RESET_MS: u32 = 2;

const TEMPERATURE_RANGE: (f32, f32) = (-40.0, 125.0);

/// SHT3x 16-bit commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    SingleShotHigh = 0x2400,
    SingleShotMedium = 0x240B,
    SingleShotLow = 0x2416,
    SoftReset = 0x30A2,
    HeaterEnable = 0x306D,
    HeaterDisable = 0x3066,
    ReadStatus = 0xF32D,
    ClearStatus = 0x3041,
}

impl Command {
    fn bytes(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }
}

/// Measurement repeatability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Repeatability {
    High,
    #[default]
    Medium,
    Low,
}

impl Repeatability {
    fn command(self) -> Command {
        match self {
            Repeatability::High => Command::SingleShotHigh,
            Repeatability::Medium => Command::SingleShotMedium,
            Repeatability::Low => Command::SingleShotLow,
        }
    }

    /// Maximum measurement duration (15.5 / 6.5 / 4.5 ms) rounded up.
    pub fn delay_ms(self) -> u32 {
        match self {
            Repeatability::High => 16,
            Repeatability::Medium => 7,
            Repeatability::Low => 5,
        }
    }
}

/// Formula used to turn raw words into physical values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionFormula {
    /// T = -46.85 + 175.72 * raw / 2^16, RH = -6 + 125 * raw / 2^16,
    /// the same linear formula as the SHT2x family
    #[default]
    Linear,
    /// T = -45 + 175 * raw / (2^16 - 1), RH = 100 * raw / (2^16 - 1)
    Sensirion,
}

impl ConversionFormula {
    pub fn temperature(self, raw: u16) -> f32 {
        match self {
            ConversionFormula::Linear => linear_temperature(raw),
            ConversionFormula::Sensirion => -45.0 + 175.0 * raw as f32 / 65535.0,
        }
    }

    /// Relative humidity, clamped to 0..=100 %.
    pub fn humidity(self, raw: u16) -> f32 {
        let rh = match self {
            ConversionFormula::Linear => linear_humidity(raw),
            ConversionFormula::Sensirion => 100.0 * raw as f32 / 65535.0,
        };
        clamp_humidity(rh)
    }
}

/// Driver configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sht3xConfig {
    pub repeatability: Repeatability,
    pub formula: ConversionFormula,
    pub range_check: RangeCheck,
}

/// Typed readings from the SHT3x sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sht3xReadings {
    pub temperature_celsius: f32,
    /// Clamped to 0..=100 %
    pub humidity_percent: f32,
}

impl Sht3xReadings {
    pub fn temperature_fahrenheit(&self) -> f32 {
        fahrenheit(self.temperature_celsius)
    }
}

impl SensorReadings<2> for Sht3xReadings {
    fn to_array(self) -> [i32; 2] {
        [milli(self.temperature_celsius), milli(self.humidity_percent)]
    }
}

pub struct Sht3x<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    config: Sht3xConfig,
}

impl<I: I2c, D: DelayNs> Sht3x<I, D> {
    pub fn new(i2c: I, delay: D, address: u8, config: Sht3xConfig) -> Result<Self, I::Error> {
        check_address::<I::Error>(DEVICE, address, &[DEFAULT_ADDRESS, ALTERNATE_ADDRESS])?;
        Ok(Self {
            i2c,
            delay,
            address,
            config,
        })
    }

    /// Soft reset and clear the status register.
    pub fn init(&mut self) -> Result<(), I::Error> {
        self.soft_reset()?;
        self.clear_status()?;
        info!("{}: initialized at {:#04x}", DEVICE, self.address);
        Ok(())
    }

    pub fn soft_reset(&mut self) -> Result<(), I::Error> {
        self.command(Command::SoftReset)?;
        self.delay.delay_ms(SOFT_RESET_MS);
        Ok(())
    }

    /// Read the CRC-checked 16-bit status register.
    pub fn status(&mut self) -> Result<u16, I::Error> {
        let mut frame = [0u8; 3];
        self.i2c
            .write_read(self.address, &Command::ReadStatus.bytes(), &mut frame)
            .map_err(|e| self.transport("read status", e))?;
        checked_word(DEVICE, &frame, SHT3X_INIT)
    }

    pub fn clear_status(&mut self) -> Result<(), I::Error> {
        self.command(Command::ClearStatus)
    }

    /// Switch the internal heater on or off.
    pub fn set_heater(&mut self, on: bool) -> Result<(), I::Error> {
        if on {
            self.command(Command::HeaterEnable)
        } else {
            self.command(Command::HeaterDisable)
        }
    }

    pub fn config(&self) -> &Sht3xConfig {
        &self.config
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Trigger a single-shot measurement and return the raw `(temperature, humidity)` words.
    pub fn measure_raw(&mut self) -> Result<(u16, u16), I::Error> {
        let repeatability = self.config.repeatability;
        self.command(repeatability.command())?;
        self.delay.delay_ms(repeatability.delay_ms());

        let mut frame = [0u8; 6];
        self.i2c
            .read(self.address, &mut frame)
            .map_err(|e| self.transport("read measurement", e))?;
        debug!("{}: frame {:02x?}", DEVICE, frame);

        let [t0, t1, t_crc, h0, h1, h_crc] = frame;
        let temperature = checked_word::<I::Error>(DEVICE, &[t0, t1, t_crc], SHT3X_INIT)?;
        let humidity = checked_word::<I::Error>(DEVICE, &[h0, h1, h_crc], SHT3X_INIT)?;
        Ok((temperature, humidity))
    }

    fn command(&mut self, command: Command) -> Result<(), I::Error> {
        self.i2c
            .write(self.address, &command.bytes())
            .map_err(|e| self.transport("write command", e))
    }

    fn transport(&self, operation: &str, e: I::Error) -> Error<I::Error> {
        error!("{}: {} failed: {:?}", DEVICE, operation, e);
        Error::Transport(e)
    }
}

impl<I: I2c, D: DelayNs> Sensor<2> for Sht3x<I, D> {
    type Readings = Sht3xReadings;
    type Error = Error<I::Error>;

    fn measure(&mut self) -> Result<Sht3xReadings, I::Error> {
        let (raw_t, raw_rh) = self.measure_raw()?;
        let formula = self.config.formula;
        let (min, max) = TEMPERATURE_RANGE;
        let temperature_celsius = self.config.range_check.apply::<I::Error>(
            DEVICE,
            "temperature",
            formula.temperature(raw_t),
            min,
            max,
        )?;

        Ok(Sht3xReadings {
            temperature_celsius,
            humidity_percent: formula.humidity(raw_rh),
        })
    }
}
