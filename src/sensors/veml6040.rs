//! Vishay VEML6040 red, green, blue and white light sensor.
//!
//! Every register is a 16-bit little-endian word addressed by a command code.
//! The sensor runs in auto mode (continuous conversions). Counts are only
//! meaningful together with the integration time they were taken with, so the
//! driver remembers the last configuration it wrote and scales with that.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::auto_range::{Direction, IntegrationStep, next_step};
use super::{Sensor, SensorReadings, milli};
use crate::error::check_address;
use crate::{Error, Result};

const DEVICE: &str = "VEML6040";

/// The only address the VEML6040 answers on.
pub const DEFAULT_ADDRESS: u8 = 0x10;

/// Green channel sensitivity in lux per count at 40 ms.
pub const GREEN_LUX_PER_COUNT_40MS: f32 = 0.25168;

const CONF_SHUTDOWN: u16 = 0x0001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Conf = 0x00,
    Red = 0x08,
    Green = 0x09,
    Blue = 0x0A,
    White = 0x0B,
}

/// Integration time (`IT[2:0]` in the conf register). Each step doubles the
/// sensitivity and halves the maximum detectable illuminance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntegrationTime {
    #[default]
    Ms40 = 0,
    Ms80 = 1,
    Ms160 = 2,
    Ms320 = 3,
    Ms640 = 4,
    Ms1280 = 5,
}

impl IntegrationTime {
    const ALL: [IntegrationTime; 6] = [
        IntegrationTime::Ms40,
        IntegrationTime::Ms80,
        IntegrationTime::Ms160,
        IntegrationTime::Ms320,
        IntegrationTime::Ms640,
        IntegrationTime::Ms1280,
    ];

    pub fn millis(self) -> u32 {
        40 << self as u32
    }

    /// Lux per green count at this integration time.
    pub fn lux_per_count(self) -> f32 {
        GREEN_LUX_PER_COUNT_40MS / (1u32 << self as u32) as f32
    }
}

impl IntegrationStep for IntegrationTime {
    fn shorter(self) -> Option<Self> {
        (self as usize).checked_sub(1).map(|i| Self::ALL[i])
    }

    fn longer(self) -> Option<Self> {
        Self::ALL.get(self as usize + 1).copied()
    }
}

/// Lighting the colour correlation matrix was derived for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    #[default]
    Indoor,
    Outdoor,
}

impl Location {
    fn rgb_to_xyz(self) -> [[f32; 3]; 3] {
        match self {
            Location::Indoor => [
                [-0.023249, 0.291014, -0.364880],
                [-0.042799, 0.272148, -0.279591],
                [-0.155901, 0.251534, -0.076240],
            ],
            Location::Outdoor => [
                [0.048403, 0.183633, -0.253589],
                [0.022916, 0.176388, -0.183205],
                [-0.077436, 0.124541, 0.032081],
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Veml6040Config {
    /// Integration time written before the first measurement
    pub integration_time: IntegrationTime,
}

/// Typed readings from the VEML6040 sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Veml6040Readings {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub white: u16,
    /// Integration time the counts were taken with
    pub integration_time: IntegrationTime,
    pub lux: f32,
}

impl Veml6040Readings {
    pub fn from_counts(counts: [u16; 4], integration_time: IntegrationTime) -> Self {
        let [red, green, blue, white] = counts;
        Self {
            red,
            green,
            blue,
            white,
            integration_time,
            lux: green as f32 * integration_time.lux_per_count(),
        }
    }

    /// Correlated colour temperature in kelvin (McCamy), clamped to 500..=10000 K.
    ///
    /// Returns 6500 K when the chromaticity is undefined (no light).
    pub fn color_temperature(&self, location: Location) -> f32 {
        const UNDEFINED: f32 = 6500.0;
        let rgb = [self.red as f32, self.green as f32, self.blue as f32];
        let xyz = location
            .rgb_to_xyz()
            .map(|row| row.iter().zip(rgb).map(|(m, c)| m * c).sum::<f32>());

        let sum: f32 = xyz.iter().sum();
        if sum == 0.0 {
            return UNDEFINED;
        }
        let x = xyz[0] / sum;
        let y = xyz[1] / sum;
        let n = (x - 0.3320) / (y - 0.1858);
        let cct = ((-449.0 * n + 3525.0) * n - 6823.3) * n + 5520.33;
        if !cct.is_finite() {
            return UNDEFINED;
        }
        cct.clamp(500.0, 10_000.0)
    }
}

impl SensorReadings<5> for Veml6040Readings {
    /// Raw red, green, blue and white counts followed by milli-lux.
    fn to_array(self) -> [i32; 5] {
        [
            self.red as i32,
            self.green as i32,
            self.blue as i32,
            self.white as i32,
            milli(self.lux),
        ]
    }
}

pub struct Veml6040<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    config: Veml6040Config,
    active: Option<IntegrationTime>,
}

impl<I: I2c, D: DelayNs> Veml6040<I, D> {
    pub fn new(i2c: I, delay: D, address: u8, config: Veml6040Config) -> Result<Self, I::Error> {
        check_address::<I::Error>(DEVICE, address, &[DEFAULT_ADDRESS])?;
        Ok(Self {
            i2c,
            delay,
            address,
            config,
            active: None,
        })
    }

    /// Integration time last written to the chip, if any.
    pub fn active_integration_time(&self) -> Option<IntegrationTime> {
        self.active
    }

    /// Switch to auto mode with `integration_time` and wait for the first
    /// conversion to complete.
    pub fn set_integration_time(
        &mut self,
        integration_time: IntegrationTime,
    ) -> Result<(), I::Error> {
        self.write_word(Register::Conf, (integration_time as u16) << 4)?;
        self.active = Some(integration_time);
        self.delay.delay_ms(integration_time.millis() * 5 / 4);
        info!("{}: integration time {} ms", DEVICE, integration_time.millis());
        Ok(())
    }

    /// Put the sensor into shutdown. The next measurement reconfigures it.
    pub fn shutdown(&mut self) -> Result<(), I::Error> {
        let it = self.active.unwrap_or(self.config.integration_time);
        self.write_word(Register::Conf, (it as u16) << 4 | CONF_SHUTDOWN)?;
        self.active = None;
        Ok(())
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Read the R, G, B, W counts.
    pub fn read_counts(&mut self) -> Result<[u16; 4], I::Error> {
        let counts = [
            self.read_word(Register::Red)?,
            self.read_word(Register::Green)?,
            self.read_word(Register::Blue)?,
            self.read_word(Register::White)?,
        ];
        debug!("{}: rgbw {:?}", DEVICE, counts);
        Ok(counts)
    }

    /// Measure, lengthening or shortening the integration time until no channel
    /// saturates and the brightest channel uses at least 80% of half scale, or a
    /// limit is reached.
    pub fn measure_auto_ranging(&mut self) -> Result<Veml6040Readings, I::Error> {
        let mut current = self.ensure_configured()?;
        let mut direction: Option<Direction> = None;
        loop {
            let counts = self.read_counts()?;
            match next_step(current, &counts, direction) {
                Some((next, step)) => {
                    warn!(
                        "{}: {:?}, integration time {} -> {} ms",
                        DEVICE,
                        step,
                        current.millis(),
                        next.millis()
                    );
                    self.set_integration_time(next)?;
                    current = next;
                    direction = Some(step);
                }
                None => return Ok(Veml6040Readings::from_counts(counts, current)),
            }
        }
    }

    fn ensure_configured(&mut self) -> Result<IntegrationTime, I::Error> {
        match self.active {
            Some(it) => Ok(it),
            None => {
                let it = self.config.integration_time;
                self.set_integration_time(it)?;
                Ok(it)
            }
        }
    }

    fn read_word(&mut self, register: Register) -> Result<u16, I::Error> {
        let mut word = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register as u8], &mut word)
            .map_err(|e| {
                error!("{}: read {:?} failed: {:?}", DEVICE, register, e);
                Error::Transport(e)
            })?;
        Ok(u16::from_le_bytes(word))
    }

    fn write_word(&mut self, register: Register, value: u16) -> Result<(), I::Error> {
        let [lo, hi] = value.to_le_bytes();
        self.i2c
            .write(self.address, &[register as u8, lo, hi])
            .map_err(|e| {
                error!("{}: write {:?} failed: {:?}", DEVICE, register, e);
                Error::Transport(e)
            })
    }
}

impl<I: I2c, D: DelayNs> Sensor<5> for Veml6040<I, D> {
    type Readings = Veml6040Readings;
    type Error = Error<I::Error>;

    /// One reading at the active integration time, no ranging.
    fn measure(&mut self) -> Result<Veml6040Readings, I::Error> {
        let it = self.ensure_configured()?;
        let counts = self.read_counts()?;
        Ok(Veml6040Readings::from_counts(counts, it))
    }
}
