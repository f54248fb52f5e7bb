//! Vishay VEML6075 UVA/UVB light sensor.
//!
//! UVA and UVB counts are corrected for visible and infrared leakage with the two
//! compensation channels, then scaled to UV index and irradiance using the
//! responsivity of the integration time and dynamic mode last written to the chip.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::auto_range::{Direction, IntegrationStep, next_step};
use super::{Sensor, SensorReadings, milli};
use crate::error::check_address;
use crate::{Error, Result};

const DEVICE: &str = "VEML6075";

/// The only address the VEML6075 answers on.
pub const DEFAULT_ADDRESS: u8 = 0x10;

/// Low byte of the device ID register.
pub const DEVICE_ID: u8 = 0x26;

// visible and infrared leakage into the UV channels
const UVA_VISIBLE: f32 = 2.22;
const UVA_IR: f32 = 1.33;
const UVB_VISIBLE: f32 = 2.95;
const UVB_IR: f32 = 1.74;

/// UV index per compensated count at 100 ms, normal dynamic.
const UVA_UVI_PER_COUNT: f32 = 0.001461;
const UVB_UVI_PER_COUNT: f32 = 0.002591;

/// Counts per µW/cm² at 50 ms, normal dynamic.
const UVA_COUNTS_PER_UW_CM2: f32 = 0.93;
const UVB_COUNTS_PER_UW_CM2: f32 = 2.1;

const CONF_HIGH_DYNAMIC: u16 = 0x0008;
const CONF_SHUTDOWN: u16 = 0x0001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Conf = 0x00,
    Uva = 0x07,
    Uvb = 0x09,
    UvComp1 = 0x0A,
    UvComp2 = 0x0B,
    Id = 0x0C,
}

/// Integration time (`UV_IT[2:0]`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntegrationTime {
    Ms50 = 0,
    #[default]
    Ms100 = 1,
    Ms200 = 2,
    Ms400 = 3,
    Ms800 = 4,
}

impl IntegrationTime {
    const ALL: [IntegrationTime; 5] = [
        IntegrationTime::Ms50,
        IntegrationTime::Ms100,
        IntegrationTime::Ms200,
        IntegrationTime::Ms400,
        IntegrationTime::Ms800,
    ];

    pub fn millis(self) -> u32 {
        50 << self as u32
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

/// Dynamic setting (`HD` bit). High dynamic halves the responsivity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dynamic {
    #[default]
    Normal,
    High,
}

/// Integration time and dynamic the counts were taken with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Veml6075Config {
    pub integration_time: IntegrationTime,
    pub dynamic: Dynamic,
}

impl Veml6075Config {
    fn conf(&self) -> u16 {
        let mut conf = (self.integration_time as u16) << 4;
        if self.dynamic == Dynamic::High {
            conf |= CONF_HIGH_DYNAMIC;
        }
        conf
    }

    /// Responsivity relative to 50 ms at normal dynamic.
    fn gain(&self) -> f32 {
        let gain = (1u32 << self.integration_time as u32) as f32;
        match self.dynamic {
            Dynamic::Normal => gain,
            Dynamic::High => gain / 2.0,
        }
    }
}

/// Raw counts of the four channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UvCounts {
    pub uva: u16,
    pub uvb: u16,
    pub uvcomp1: u16,
    pub uvcomp2: u16,
}

impl UvCounts {
    fn peaks(&self) -> [u16; 4] {
        [self.uva, self.uvb, self.uvcomp1, self.uvcomp2]
    }

    /// UVA counts minus visible and infrared leakage, floored at zero.
    pub fn uva_compensated(&self) -> f32 {
        let c1 = self.uvcomp1 as f32;
        let c2 = self.uvcomp2 as f32;
        (self.uva as f32 - UVA_VISIBLE * c1 - UVA_IR * c2).max(0.0)
    }

    /// UVB counts minus visible and infrared leakage, floored at zero.
    pub fn uvb_compensated(&self) -> f32 {
        let c1 = self.uvcomp1 as f32;
        let c2 = self.uvcomp2 as f32;
        (self.uvb as f32 - UVB_VISIBLE * c1 - UVB_IR * c2).max(0.0)
    }
}

/// Typed readings from the VEML6075 sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Veml6075Readings {
    pub counts: UvCounts,
    pub config: Veml6075Config,
    pub uva_index: f32,
    pub uvb_index: f32,
    /// Mean of the UVA and UVB indices
    pub uv_index: f32,
    /// µW/cm²
    pub uva_irradiance: f32,
    /// µW/cm²
    pub uvb_irradiance: f32,
}

impl Veml6075Readings {
    pub fn from_counts(counts: UvCounts, config: Veml6075Config) -> Self {
        let gain = config.gain();
        let uva = counts.uva_compensated();
        let uvb = counts.uvb_compensated();
        // UVI responsivities are specified at 100 ms, twice the 50 ms reference
        let uva_index = uva * UVA_UVI_PER_COUNT * 2.0 / gain;
        let uvb_index = uvb * UVB_UVI_PER_COUNT * 2.0 / gain;
        Self {
            counts,
            config,
            uva_index,
            uvb_index,
            uv_index: (uva_index + uvb_index) / 2.0,
            uva_irradiance: uva / (UVA_COUNTS_PER_UW_CM2 * gain),
            uvb_irradiance: uvb / (UVB_COUNTS_PER_UW_CM2 * gain),
        }
    }
}

impl SensorReadings<3> for Veml6075Readings {
    /// Milli-UVI, then UVA and UVB irradiance in nW/cm².
    fn to_array(self) -> [i32; 3] {
        [
            milli(self.uv_index),
            milli(self.uva_irradiance),
            milli(self.uvb_irradiance),
        ]
    }
}

pub struct Veml6075<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    config: Veml6075Config,
    active: Option<Veml6075Config>,
}

impl<I: I2c, D: DelayNs> Veml6075<I, D> {
    pub fn new(i2c: I, delay: D, address: u8, config: Veml6075Config) -> Result<Self, I::Error> {
        check_address::<I::Error>(DEVICE, address, &[DEFAULT_ADDRESS])?;
        Ok(Self {
            i2c,
            delay,
            address,
            config,
            active: None,
        })
    }

    /// Verify the device ID and write the configuration.
    pub fn init(&mut self) -> Result<(), I::Error> {
        let id = self.device_id()?;
        if id as u8 != DEVICE_ID {
            error!("{}: device id {:#06x}", DEVICE, id);
            return Err(Error::ChipId {
                device: DEVICE,
                expected: DEVICE_ID as u16,
                found: id,
            });
        }
        let config = self.config;
        self.apply(config)
    }

    pub fn device_id(&mut self) -> Result<u16, I::Error> {
        self.read_word(Register::Id)
    }

    /// Configuration last written to the chip, if any.
    pub fn active_config(&self) -> Option<Veml6075Config> {
        self.active
    }

    /// Write `config`, power the sensor up and wait for the first conversion.
    pub fn apply(&mut self, config: Veml6075Config) -> Result<(), I::Error> {
        self.write_word(Register::Conf, config.conf())?;
        self.active = Some(config);
        self.delay
            .delay_ms(config.integration_time.millis() * 11 / 10);
        info!(
            "{}: integration time {} ms, {:?} dynamic",
            DEVICE,
            config.integration_time.millis(),
            config.dynamic
        );
        Ok(())
    }

    /// Put the sensor into shutdown. The next measurement reconfigures it.
    pub fn shutdown(&mut self) -> Result<(), I::Error> {
        let config = self.active.unwrap_or(self.config);
        self.write_word(Register::Conf, config.conf() | CONF_SHUTDOWN)?;
        self.active = None;
        Ok(())
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    pub fn read_counts(&mut self) -> Result<UvCounts, I::Error> {
        let counts = UvCounts {
            uva: self.read_word(Register::Uva)?,
            uvb: self.read_word(Register::Uvb)?,
            uvcomp1: self.read_word(Register::UvComp1)?,
            uvcomp2: self.read_word(Register::UvComp2)?,
        };
        debug!("{}: {:?}", DEVICE, counts);
        Ok(counts)
    }

    /// Measure, adjusting the integration time until no channel saturates and the
    /// brightest channel uses at least 80% of half scale, or a limit is reached.
    pub fn measure_auto_ranging(&mut self) -> Result<Veml6075Readings, I::Error> {
        let mut config = self.ensure_configured()?;
        let mut direction: Option<Direction> = None;
        loop {
            let counts = self.read_counts()?;
            match next_step(config.integration_time, &counts.peaks(), direction) {
                Some((next, step)) => {
                    warn!(
                        "{}: {:?}, integration time {} -> {} ms",
                        DEVICE,
                        step,
                        config.integration_time.millis(),
                        next.millis()
                    );
                    config.integration_time = next;
                    self.apply(config)?;
                    direction = Some(step);
                }
                None => return Ok(Veml6075Readings::from_counts(counts, config)),
            }
        }
    }

    fn ensure_configured(&mut self) -> Result<Veml6075Config, I::Error> {
        match self.active {
            Some(config) => Ok(config),
            None => {
                let config = self.config;
                self.apply(config)?;
                Ok(config)
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

impl<I: I2c, D: DelayNs> Sensor<3> for Veml6075<I, D> {
    type Readings = Veml6075Readings;
    type Error = Error<I::Error>;

    fn measure(&mut self) -> Result<Veml6075Readings, I::Error> {
        let config = self.ensure_configured()?;
        let counts = self.read_counts()?;
        Ok(Veml6075Readings::from_counts(counts, config))
    }
}
