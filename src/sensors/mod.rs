//! Sensor drivers and the traits they share.

pub mod auto_range;
#[cfg(feature = "sensor-bme280")]
pub mod bme280;
#[cfg(feature = "sensor-bmp280")]
pub mod bmp280;
#[cfg(feature = "sensor-max44009")]
pub mod max44009;
#[cfg(any(feature = "sensor-sht2x", feature = "sensor-sht3x"))]
pub mod sensirion;
#[cfg(feature = "sensor-sht2x")]
pub mod sht2x;
#[cfg(feature = "sensor-sht3x")]
pub mod sht3x;
#[cfg(feature = "sensor-veml6040")]
pub mod veml6040;
#[cfg(feature = "sensor-veml6075")]
pub mod veml6075;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Trait for sensor reading data structures.
/// Provides compile-time guarantees about the number of values and their conversion to arrays.
pub trait SensorReadings<const COUNT: usize> {
    /// Convert the readings into a fixed-size array of milli-units
    /// (milli-degrees, milli-percent, milli-hPa, milli-lux, ...).
    fn to_array(self) -> [i32; COUNT];
}

/// Trait for sensors that produce typed readings.
///
/// Every call performs a fresh bus transaction; readings are never cached.
pub trait Sensor<const COUNT: usize> {
    /// The type of readings this sensor produces.
    type Readings: SensorReadings<COUNT>;
    /// Error returned on failure.
    type Error;

    /// Read the sensor and return typed readings.
    fn measure(&mut self) -> Result<Self::Readings, Self::Error>;
}

/// What a driver does with a decoded value outside the chip's documented range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeCheck {
    /// Log a warning and return the value anyway
    #[default]
    Warn,
    /// Fail with [`Error::OutOfRange`]
    Strict,
}

impl RangeCheck {
    /// Apply the policy to `value`, whose documented range is `min..=max`.
    pub(crate) fn apply<E>(
        self,
        device: &'static str,
        quantity: &'static str,
        value: f32,
        min: f32,
        max: f32,
    ) -> Result<f32, Error<E>> {
        if (min..=max).contains(&value) {
            return Ok(value);
        }

        match self {
            RangeCheck::Warn => {
                warn!(
                    "{}: {} = {} outside documented range {}..={}",
                    device, quantity, value, min, max
                );
                Ok(value)
            }
            RangeCheck::Strict => Err(Error::OutOfRange {
                device,
                quantity,
                value,
            }),
        }
    }
}

/// Converts a value to milli-units for [`SensorReadings::to_array`].
pub(crate) fn milli(value: f32) -> i32 {
    (value * 1000.0) as i32
}
