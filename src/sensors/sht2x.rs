//! Sensirion SHT2x humidity and temperature sensor (SHT20, SHT21, SHT25).
//!
//! Measurements use the "no hold master" commands: the driver writes the trigger
//! command, waits the datasheet maximum conversion time for the active resolution
//! and then reads the 3-byte `[msb, lsb, crc]` frame in a single read transaction.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::sensirion::{clamp_humidity, fahrenheit, linear_humidity, linear_temperature};
use super::{RangeCheck, Sensor, SensorReadings, milli};
use crate::crc::{SHT2X_INIT, checked_word, crc8};
use crate::error::check_address;
use crate::{Error, Result};

const DEVICE: &str = "SHT2X";

/// The only address the SHT2x answers on.
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Time the chip needs after a soft reset.
const SOFT_RESET_MS: u32 = 15;

/// Resolution bits 7 and 0 of the user register.
const RESOLUTION_MASK: u8 = 0x81;

/// The two least significant bits of a measurement word carry status.
const STATUS_BITS: u16 = 0x0003;

/// Electronic identification, first and second memory access.
const SERIAL_FIRST: [u8; 2] = [0xFA, 0x0F];
const SERIAL_SECOND: [u8; 2] = [0xFC, 0xC9];

/// Documented operating range of the temperature channel.
const TEMPERATURE_RANGE: (f32, f32) = (-40.0, 125.0);

/// SHT2x command codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    TriggerTemperature = 0xF3,
    TriggerHumidity = 0xF5,
    WriteUserRegister = 0xE6,
    ReadUserRegister = 0xE7,
    SoftReset = 0xFE,
}

/// Measurement resolution (user register bits 7 and 0).
///
/// | Variant   | RH     | T      | RH max. time | T max. time |
/// |-----------|--------|--------|--------------|-------------|
/// | `Rh12T14` | 12 bit | 14 bit | 29 ms        | 85 ms       |
/// | `Rh8T12`  |  8 bit | 12 bit |  4 ms        | 22 ms       |
/// | `Rh10T13` | 10 bit | 13 bit |  9 ms        | 43 ms       |
/// | `Rh11T11` | 11 bit | 11 bit | 15 ms        | 11 ms       |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Resolution {
    #[default]
    Rh12T14 = 0x00,
    Rh8T12 = 0x01,
    Rh10T13 = 0x80,
    Rh11T11 = 0x81,
}

impl Resolution {
    /// Wait after triggering a temperature conversion, in milliseconds.
    pub fn temperature_delay_ms(self) -> u32 {
        match self {
            Resolution::Rh12T14 => 86,
            Resolution::Rh8T12 => 23,
            Resolution::Rh10T13 => 44,
            Resolution::Rh11T11 => 12,
        }
    }

    /// Wait after triggering a humidity conversion, in milliseconds.
    pub fn humidity_delay_ms(self) -> u32 {
        match self {
            Resolution::Rh12T14 => 30,
            Resolution::Rh8T12 => 5,
            Resolution::Rh10T13 => 10,
            Resolution::Rh11T11 => 16,
        }
    }
}

/// Driver configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sht2xConfig {
    pub resolution: Resolution,
    pub range_check: RangeCheck,
}

/// Typed readings from the SHT2x sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sht2xReadings {
    pub temperature_celsius: f32,
    /// Clamped to 0..=100 %
    pub humidity_percent: f32,
}

impl Sht2xReadings {
    pub fn temperature_fahrenheit(&self) -> f32 {
        fahrenheit(self.temperature_celsius)
    }
}

impl SensorReadings<2> for Sht2xReadings {
    fn to_array(self) -> [i32; 2] {
        [milli(self.temperature_celsius), milli(self.humidity_percent)]
    }
}

/// Temperature in °C from a raw measurement word, status bits ignored.
pub fn temperature_from_raw(raw: u16) -> f32 {
    linear_temperature(raw & !STATUS_BITS)
}

/// Relative humidity in % from a raw measurement word, status bits ignored, clamped.
pub fn humidity_from_raw(raw: u16) -> f32 {
    clamp_humidity(linear_humidity(raw & !STATUS_BITS))
}

pub struct Sht2x<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    config: Sht2xConfig,
}

impl<I: I2c, D: DelayNs> Sht2x<I, D> {
    /// Create a driver. No bus traffic happens until the first call.
    pub fn new(i2c: I, delay: D, address: u8, config: Sht2xConfig) -> Result<Self, I::Error> {
        check_address::<I::Error>(DEVICE, address, &[DEFAULT_ADDRESS])?;
        Ok(Self {
            i2c,
            delay,
            address,
            config,
        })
    }

    /// Soft reset the chip and apply the configured resolution.
    pub fn init(&mut self) -> Result<(), I::Error> {
        self.soft_reset()?;
        self.set_resolution(self.config.resolution)?;
        info!("{}: initialized with {:?}", DEVICE, self.config.resolution);
        Ok(())
    }

    /// Soft reset. The user register returns to its default (RH 12 bit, T 14 bit).
    pub fn soft_reset(&mut self) -> Result<(), I::Error> {
        self.write(&[Command::SoftReset as u8])?;
        self.delay.delay_ms(SOFT_RESET_MS);
        self.config.resolution = Resolution::default();
        Ok(())
    }

    pub fn user_register(&mut self) -> Result<u8, I::Error> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(
                self.address,
                &[Command::ReadUserRegister as u8],
                &mut value,
            )
            .map_err(|e| self.transport("read user register", e))?;
        Ok(value[0])
    }

    /// Change the measurement resolution, leaving the other user register bits untouched.
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), I::Error> {
        let current = self.user_register()?;
        let value = (current & !RESOLUTION_MASK) | resolution as u8;
        self.write(&[Command::WriteUserRegister as u8, value])?;
        self.config.resolution = resolution;
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    /// Temperature in °C.
    pub fn measure_temperature(&mut self) -> Result<f32, I::Error> {
        let delay = self.config.resolution.temperature_delay_ms();
        let raw = self.read_channel(Command::TriggerTemperature, delay)?;
        let (min, max) = TEMPERATURE_RANGE;
        self.config
            .range_check
            .apply(DEVICE, "temperature", temperature_from_raw(raw), min, max)
    }

    /// Relative humidity in %, clamped to 0..=100.
    pub fn measure_humidity(&mut self) -> Result<f32, I::Error> {
        let delay = self.config.resolution.humidity_delay_ms();
        let raw = self.read_channel(Command::TriggerHumidity, delay)?;
        Ok(humidity_from_raw(raw))
    }

    /// Read the 64-bit electronic identification.
    ///
    /// Every byte pair is CRC checked; the serial is withheld on any mismatch.
    pub fn serial_number(&mut self) -> Result<u64, I::Error> {
        let mut first = [0u8; 8];
        let mut second = [0u8; 6];
        self.i2c
            .write_read(self.address, &SERIAL_FIRST, &mut first)
            .map_err(|e| self.transport("read serial number", e))?;
        self.i2c
            .write_read(self.address, &SERIAL_SECOND, &mut second)
            .map_err(|e| self.transport("read serial number", e))?;

        // first access: SNB_3 crc SNB_2 crc SNB_1 crc SNB_0 crc
        for pair in first.chunks_exact(2) {
            check_crc::<I::Error>(&pair[..1], pair[1])?;
        }
        // second access: SNC_1 SNC_0 crc SNA_1 SNA_0 crc
        for field in second.chunks_exact(3) {
            check_crc::<I::Error>(&field[..2], field[2])?;
        }

        let bytes = [
            second[3], second[4], first[0], first[2], first[4], first[6], second[0], second[1],
        ];
        Ok(u64::from_be_bytes(bytes))
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    fn read_channel(&mut self, command: Command, delay_ms: u32) -> Result<u16, I::Error> {
        self.write(&[command as u8])?;
        self.delay.delay_ms(delay_ms);

        let mut frame = [0u8; 3];
        self.i2c
            .read(self.address, &mut frame)
            .map_err(|e| self.transport("read measurement", e))?;
        debug!("{}: {:?} frame {:02x?}", DEVICE, command, frame);

        checked_word(DEVICE, &frame, SHT2X_INIT)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), I::Error> {
        self.i2c
            .write(self.address, bytes)
            .map_err(|e| self.transport("write command", e))
    }

    fn transport(&self, operation: &str, e: I::Error) -> Error<I::Error> {
        error!("{}: {} failed: {:?}", DEVICE, operation, e);
        Error::Transport(e)
    }
}

fn check_crc<E>(data: &[u8], received: u8) -> Result<(), E> {
    let computed = crc8(data, SHT2X_INIT);
    if computed == received {
        Ok(())
    } else {
        error!("{}: serial number CRC mismatch", DEVICE);
        Err(Error::Checksum {
            device: DEVICE,
            received,
            computed,
        })
    }
}

impl<I: I2c, D: DelayNs> Sensor<2> for Sht2x<I, D> {
    type Readings = Sht2xReadings;
    type Error = Error<I::Error>;

    fn measure(&mut self) -> Result<Sht2xReadings, I::Error> {
        let temperature_celsius = self.measure_temperature()?;
        let humidity_percent = self.measure_humidity()?;
        Ok(Sht2xReadings {
            temperature_celsius,
            humidity_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = DEFAULT_ADDRESS;

    fn sensor(expectations: &[I2cTransaction]) -> (Sht2x<I2cMock, NoopDelay>, I2cMock) {
        let i2c = I2cMock::new(expectations);
        let handle = i2c.clone();
        let sensor = Sht2x::new(i2c, NoopDelay::new(), ADDR, Sht2xConfig::default()).unwrap();
        (sensor, handle)
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    #[test]
    fn test_rejects_wrong_address() {
        let mut i2c = I2cMock::new(&[]);
        let result = Sht2x::new(i2c.clone(), NoopDelay::new(), 0x44, Sht2xConfig::default());
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
        i2c.done();
    }

    #[test]
    fn test_measure() {
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write(ADDR, vec![0xF3]),
            I2cTransaction::read(ADDR, vec![0x66, 0x66, 0x12]),
            I2cTransaction::write(ADDR, vec![0xF5]),
            I2cTransaction::read(ADDR, vec![0x7A, 0x50, 0xAB]),
        ]);

        let readings = sensor.measure().unwrap();
        // status bits of 0x6666 are cleared before conversion: raw 0x6664
        let expected_t = -46.85 + 175.72 * 0x6664 as f32 / 65536.0;
        let expected_rh = -6.0 + 125.0 * 0x7A50 as f32 / 65536.0;
        assert!(close(readings.temperature_celsius, expected_t));
        assert!(close(readings.humidity_percent, expected_rh));
        assert!(close(readings.temperature_celsius, 23.4316));
        assert!(close(readings.humidity_percent, 53.7229));
        i2c.done();
    }

    #[test]
    fn test_corrupted_frame_is_checksum_error() {
        // one flipped bit in the lsb
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write(ADDR, vec![0xF3]),
            I2cTransaction::read(ADDR, vec![0x66, 0x67, 0x12]),
        ]);

        let err = sensor.measure_temperature().unwrap_err();
        assert!(matches!(
            err,
            Error::Checksum {
                device: "SHT2X",
                received: 0x12,
                ..
            }
        ));
        i2c.done();
    }

    #[test]
    fn test_transport_error_is_propagated() {
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write(ADDR, vec![0xF3]).with_error(ErrorKind::Other)
        ]);

        let err = sensor.measure().unwrap_err();
        assert!(matches!(err, Error::Transport(ErrorKind::Other)));
        i2c.done();
    }

    #[test]
    fn test_humidity_is_clamped() {
        assert_eq!(humidity_from_raw(0x0000), 0.0);
        assert_eq!(humidity_from_raw(0xFFFF), 100.0);
    }

    #[test]
    fn test_set_resolution_keeps_other_bits() {
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write_read(ADDR, vec![0xE7], vec![0x3A]),
            I2cTransaction::write(ADDR, vec![0xE6, 0xBB]),
        ]);

        sensor.set_resolution(Resolution::Rh11T11).unwrap();
        assert_eq!(sensor.resolution(), Resolution::Rh11T11);
        i2c.done();
    }

    #[test]
    fn test_init() {
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write(ADDR, vec![0xFE]),
            I2cTransaction::write_read(ADDR, vec![0xE7], vec![0x3A]),
            I2cTransaction::write(ADDR, vec![0xE6, 0x3A]),
        ]);

        sensor.init().unwrap();
        i2c.done();
    }

    #[test]
    fn test_serial_number() {
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write_read(
                ADDR,
                vec![0xFA, 0x0F],
                vec![0x12, 0x21, 0x34, 0x01, 0x56, 0xD8, 0x78, 0x41],
            ),
            I2cTransaction::write_read(
                ADDR,
                vec![0xFC, 0xC9],
                vec![0x9A, 0xBC, 0x61, 0x00, 0x80, 0x7A],
            ),
        ]);

        assert_eq!(sensor.serial_number().unwrap(), 0x0080_1234_5678_9ABC);
        i2c.done();
    }

    #[test]
    fn test_serial_number_checksum() {
        let (mut sensor, mut i2c) = sensor(&[
            I2cTransaction::write_read(
                ADDR,
                vec![0xFA, 0x0F],
                vec![0x12, 0x21, 0x34, 0x01, 0x56, 0xD8, 0x78, 0x40],
            ),
            I2cTransaction::write_read(
                ADDR,
                vec![0xFC, 0xC9],
                vec![0x9A, 0xBC, 0x61, 0x00, 0x80, 0x7A],
            ),
        ]);

        assert!(matches!(
            sensor.serial_number(),
            Err(Error::Checksum { .. })
        ));
        i2c.done();
    }
}
