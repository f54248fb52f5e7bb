use serde::{Deserialize, Serialize};

use crate::sensors::RangeCheck;

/// Oversampling setting of one measurement channel (`osrs_t`, `osrs_p`, `osrs_h`).
///
/// | Variant   | Code | Resolution (T/P) | Typical use                   |
/// |-----------|------|------------------|-------------------------------|
/// | `Skipped` | 000  | -                | channel off                   |
/// | `X1`      | 001  | 16 bit           | weather, lowest power         |
/// | `X2`      | 010  | 17 bit           | low power handheld            |
/// | `X4`      | 011  | 18 bit           | standard                      |
/// | `X8`      | 100  | 19 bit           | high resolution               |
/// | `X16`     | 101  | 20 bit           | indoor navigation             |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Oversampling {
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

impl Oversampling {
    /// Number of samples taken per conversion.
    pub fn samples(self) -> u32 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// IIR filter coefficient (`filter[2:0]` in `config`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Filter {
    Off = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
}

/// Standby duration between conversions in normal mode (`t_sb[2:0]` in `config`).
///
/// Codes 110 and 111 mean different durations on the BMP280 and the BME280 and
/// are not offered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Standby {
    Ms0_5 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
}

/// Power mode written to `ctrl_meas`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Continuous conversions separated by the standby time
    Normal,
    /// One conversion per measurement, triggered by the driver
    Forced,
}

impl Mode {
    fn bits(self) -> u8 {
        match self {
            Mode::Normal => 0b11,
            Mode::Forced => 0b01,
        }
    }
}

/// Standard gravity, m/s².
const G0: f32 = 9.80665;
/// Molar mass of dry air, kg/mol.
const MOLAR_MASS: f32 = 0.028_964_4;
/// Universal gas constant, J/(mol·K).
const GAS_CONSTANT: f32 = 8.314_459_8;
/// Sea-level standard temperature, K.
const T0: f32 = 288.15;
/// Temperature lapse rate of the lowest atmosphere layer, K/m.
const LAPSE_RATE: f32 = -0.0065;

/// Top of the troposphere. The barometric formula below only holds under it.
pub const MAX_ALTITUDE_M: f32 = 11_000.0;

/// Temperature/pressure configuration shared by the BMP280 and the BME280.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bmp280Config {
    pub temperature_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,
    pub filter: Filter,
    pub standby: Standby,
    pub mode: Mode,
    pub range_check: RangeCheck,
    /// Height of the sensor above sea level, used for the sea-level pressure.
    pub altitude_m: f32,
}

impl Default for Bmp280Config {
    /// Normal mode, temperature ×1, pressure ×4, IIR ×4, 1000 ms standby, at sea level.
    fn default() -> Self {
        Self {
            temperature_oversampling: Oversampling::X1,
            pressure_oversampling: Oversampling::X4,
            filter: Filter::X4,
            standby: Standby::Ms1000,
            mode: Mode::Normal,
            range_check: RangeCheck::Warn,
            altitude_m: 0.0,
        }
    }
}

impl Bmp280Config {
    /// Both channels are decoded on every measurement, so neither may be skipped.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.temperature_oversampling == Oversampling::Skipped {
            return Err("temperature cannot be skipped: every compensation needs t_fine");
        }
        if self.pressure_oversampling == Oversampling::Skipped {
            return Err("pressure cannot be skipped");
        }
        if !self.altitude_m.is_finite() || self.altitude_m >= MAX_ALTITUDE_M {
            return Err("altitude must be below 11000 m");
        }
        Ok(())
    }

    /// Factor that reduces station pressure at `altitude_m` to sea level,
    /// from the barometric formula of the standard atmosphere.
    pub fn sea_level_coefficient(&self) -> f32 {
        let exponent = (G0 * MOLAR_MASS) / (GAS_CONSTANT * LAPSE_RATE);
        libm::powf(T0 / (T0 + LAPSE_RATE * self.altitude_m), -exponent)
    }

    /// Value of the `ctrl_meas` register.
    pub fn ctrl_meas(&self) -> u8 {
        (self.temperature_oversampling as u8) << 5
            | (self.pressure_oversampling as u8) << 2
            | self.mode.bits()
    }

    /// Value of the `config` register.
    pub fn config(&self) -> u8 {
        (self.standby as u8) << 5 | (self.filter as u8) << 2
    }

    /// Maximum duration of one forced conversion, in microseconds
    /// (1.25 ms + 2.3 ms per sample, plus 0.575 ms per extra channel).
    pub fn measurement_time_us(&self, humidity: Option<Oversampling>) -> u32 {
        let channel = |os: Oversampling| match os.samples() {
            0 => 0,
            n => 2300 * n + 575,
        };
        let humidity = humidity.map_or(0, channel);
        1250 + 2300 * self.temperature_oversampling.samples()
            + channel(self.pressure_oversampling)
            + humidity
    }
}
