//! Maxim MAX44009 ambient light sensor.
//!
//! The lux value is a 4-bit exponent and 8-bit mantissa split across two registers.
//! Both must come from the same conversion, which the chip only guarantees when
//! they are read with a repeated start in between, so the driver reads them in
//! one [`I2c::transaction`].

use embedded_hal::i2c::{I2c, Operation};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::{Sensor, SensorReadings, milli};
use crate::error::check_address;
use crate::{Error, Result};

const DEVICE: &str = "MAX44009";

/// A0 pin tied low.
pub const DEFAULT_ADDRESS: u8 = 0x4A;
/// A0 pin tied high.
pub const ALTERNATE_ADDRESS: u8 = 0x4B;

/// Lux per count of the full 12-bit reading.
pub const LUX_PER_COUNT: f32 = 0.045;
/// Lux per count when only the high byte (4-bit mantissa) is used.
pub const COARSE_LUX_PER_COUNT: f32 = 0.72;

/// Exponent value flagging an over-range condition.
const OVERRANGE_EXPONENT: u8 = 0x0F;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    InterruptStatus = 0x00,
    InterruptEnable = 0x01,
    Configuration = 0x02,
    LuxHigh = 0x03,
    LuxLow = 0x04,
    UpperThreshold = 0x05,
    LowerThreshold = 0x06,
    ThresholdTimer = 0x07,
}

const CONFIG_CONTINUOUS: u8 = 0x80;
const CONFIG_MANUAL: u8 = 0x40;
const CONFIG_CDR: u8 = 0x08;
const CONFIG_TIM_MASK: u8 = 0x07;

/// Measurement cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cycle {
    /// Back-to-back conversions
    #[default]
    Continuous,
    /// One conversion every 800 ms
    Every800Ms,
}

/// Integration time used in manual range mode (`TIM[2:0]`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntegrationTime {
    Ms800 = 0,
    Ms400 = 1,
    Ms200 = 2,
    Ms100 = 3,
    Ms50 = 4,
    Ms25 = 5,
    Ms12_5 = 6,
    Ms6_25 = 7,
}

/// How integration time and photodiode current are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Range {
    /// The chip's internal auto-ranging picks both
    #[default]
    Automatic,
    /// Fixed integration time; `current_division` routes 1/8 of the photodiode
    /// current to the ADC for very bright light
    Manual {
        integration_time: IntegrationTime,
        current_division: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Max44009Config {
    pub cycle: Cycle,
    pub range: Range,
}

impl Max44009Config {
    /// Merge this configuration into the current configuration register value.
    ///
    /// In automatic mode `CDR` and `TIM` are owned by the chip and left alone.
    pub fn apply(&self, register: u8) -> u8 {
        let mut value = register & !(CONFIG_CONTINUOUS | CONFIG_MANUAL);
        if self.cycle == Cycle::Continuous {
            value |= CONFIG_CONTINUOUS;
        }
        if let Range::Manual {
            integration_time,
            current_division,
        } = self.range
        {
            value &= !(CONFIG_CDR | CONFIG_TIM_MASK);
            value |= CONFIG_MANUAL | integration_time as u8;
            if current_division {
                value |= CONFIG_CDR;
            }
        }
        value
    }
}

/// Typed readings from the MAX44009 sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Max44009Readings {
    pub lux: f32,
}

impl SensorReadings<1> for Max44009Readings {
    fn to_array(self) -> [i32; 1] {
        [milli(self.lux)]
    }
}

/// Decode the lux high/low register pair. `None` on over-range.
pub fn lux_from_raw(high: u8, low: u8) -> Option<f32> {
    let exponent = high >> 4;
    if exponent == OVERRANGE_EXPONENT {
        return None;
    }
    let mantissa = (high & 0x0F) << 4 | (low & 0x0F);
    Some((1u32 << exponent) as f32 * mantissa as f32 * LUX_PER_COUNT)
}

/// Decode the lux high register alone. `None` on over-range.
pub fn coarse_lux_from_raw(high: u8) -> Option<f32> {
    let exponent = high >> 4;
    if exponent == OVERRANGE_EXPONENT {
        return None;
    }
    Some((1u32 << exponent) as f32 * (high & 0x0F) as f32 * COARSE_LUX_PER_COUNT)
}

pub struct Max44009<I> {
    i2c: I,
    address: u8,
    config: Max44009Config,
    configured: bool,
}

impl<I: I2c> Max44009<I> {
    pub fn new(i2c: I, address: u8, config: Max44009Config) -> Result<Self, I::Error> {
        check_address::<I::Error>(DEVICE, address, &[DEFAULT_ADDRESS, ALTERNATE_ADDRESS])?;
        Ok(Self {
            i2c,
            address,
            config,
            configured: false,
        })
    }

    /// Write the configuration register if it differs from what the chip holds.
    ///
    /// Called automatically before the first measurement.
    pub fn configure(&mut self) -> Result<(), I::Error> {
        let current = self.read_register(Register::Configuration)?;
        let wanted = self.config.apply(current);
        if current != wanted {
            self.write_register(Register::Configuration, wanted)?;
            info!("{}: configuration {:#04x} -> {:#04x}", DEVICE, current, wanted);
        }
        self.configured = true;
        Ok(())
    }

    pub fn config(&self) -> &Max44009Config {
        &self.config
    }

    /// Interrupt status register; reading it clears a pending interrupt.
    pub fn interrupt_status(&mut self) -> Result<bool, I::Error> {
        Ok(self.read_register(Register::InterruptStatus)? & 0x01 != 0)
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Read the raw `(high, low)` lux registers in one transaction.
    pub fn read_raw(&mut self) -> Result<(u8, u8), I::Error> {
        if !self.configured {
            self.configure()?;
        }

        let mut high = [0u8; 1];
        let mut low = [0u8; 1];
        self.i2c
            .transaction(
                self.address,
                &mut [
                    Operation::Write(&[Register::LuxHigh as u8]),
                    Operation::Read(&mut high),
                    Operation::Write(&[Register::LuxLow as u8]),
                    Operation::Read(&mut low),
                ],
            )
            .map_err(|e| {
                error!("{}: read lux failed: {:?}", DEVICE, e);
                Error::Transport(e)
            })?;
        debug!("{}: raw {:#04x} {:#04x}", DEVICE, high[0], low[0]);
        Ok((high[0], low[0]))
    }

    /// Lux from the high register only: one byte, 16× coarser.
    pub fn measure_coarse(&mut self) -> Result<Max44009Readings, I::Error> {
        if !self.configured {
            self.configure()?;
        }
        let high = self.read_register(Register::LuxHigh)?;
        let lux = coarse_lux_from_raw(high).ok_or_else(|| overrange::<I::Error>(high))?;
        Ok(Max44009Readings { lux })
    }

    fn read_register(&mut self, register: Register) -> Result<u8, I::Error> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register as u8], &mut value)
            .map_err(|e| {
                error!("{}: read {:?} failed: {:?}", DEVICE, register, e);
                Error::Transport(e)
            })?;
        Ok(value[0])
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), I::Error> {
        self.i2c
            .write(self.address, &[register as u8, value])
            .map_err(|e| {
                error!("{}: write {:?} failed: {:?}", DEVICE, register, e);
                Error::Transport(e)
            })
    }
}

fn overrange<E>(high: u8) -> Error<E> {
    error!("{}: over-range (lux high {:#04x})", DEVICE, high);
    Error::OutOfRange {
        device: DEVICE,
        quantity: "illuminance",
        value: f32::INFINITY,
    }
}

impl<I: I2c> Sensor<1> for Max44009<I> {
    type Readings = Max44009Readings;
    type Error = Error<I::Error>;

    fn measure(&mut self) -> Result<Max44009Readings, I::Error> {
        let (high, low) = self.read_raw()?;
        let lux = lux_from_raw(high, low).ok_or_else(|| overrange::<I::Error>(high))?;
        Ok(Max44009Readings { lux })
    }
}
