//! Bosch BME280 combined humidity, pressure and temperature sensor.
//!
//! Register-compatible with the BMP280 plus a humidity channel, so the
//! temperature/pressure path is the BMP280 driver; this module adds the
//! humidity trimming block, the `ctrl_hum` register and the 8-byte result burst.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::bmp280::registers::{BME280_CHIP_ID, HUMIDITY_CALIBRATION_LEN, Register, SKIPPED_16BIT};
use super::bmp280::{Bmp280, Bmp280Config, Oversampling, raw_20bit};
use super::{Sensor, SensorReadings, milli};
use crate::{Error, Result};

pub use super::bmp280::{ALTERNATE_ADDRESS, DEFAULT_ADDRESS};

const DEVICE: &str = "BME280";

/// Humidity coefficients `dig_H1..dig_H6`.
///
/// `dig_H1` sits alone at 0xA1; the rest are packed into 0xE1..0xE7 with
/// `dig_H4` and `dig_H5` sharing the nibbles of 0xE5.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HumidityCalibration {
    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl HumidityCalibration {
    pub fn from_bytes(h1: u8, block: &[u8; HUMIDITY_CALIBRATION_LEN]) -> Self {
        Self {
            dig_h1: h1,
            dig_h2: i16::from_le_bytes([block[0], block[1]]),
            dig_h3: block[2],
            dig_h4: (block[3] as i8 as i16) << 4 | (block[4] & 0x0F) as i16,
            dig_h5: (block[5] as i8 as i16) << 4 | (block[4] >> 4) as i16,
            dig_h6: block[6] as i8,
        }
    }

    /// Relative humidity in %RH as unsigned Q22.10 (divide by 1024).
    pub fn compensate(&self, adc_h: i32, t_fine: i32) -> u32 {
        let h1 = self.dig_h1 as i32;
        let h2 = self.dig_h2 as i32;
        let h3 = self.dig_h3 as i32;
        let h4 = self.dig_h4 as i32;
        let h5 = self.dig_h5 as i32;
        let h6 = self.dig_h6 as i32;

        let v = t_fine.wrapping_sub(76_800);
        let offset = ((adc_h << 14)
            .wrapping_sub(h4 << 20)
            .wrapping_sub(h5.wrapping_mul(v))
            .wrapping_add(16_384))
            >> 15;
        let scale = ((((v.wrapping_mul(h6) >> 10)
            .wrapping_mul((v.wrapping_mul(h3) >> 11).wrapping_add(32_768))
            >> 10)
            .wrapping_add(2_097_152))
        .wrapping_mul(h2)
        .wrapping_add(8_192))
            >> 14;

        let mut v = offset.wrapping_mul(scale);
        v = v.wrapping_sub((((v >> 15).wrapping_mul(v >> 15) >> 7).wrapping_mul(h1)) >> 4);
        (v.clamp(0, 419_430_400) >> 12) as u32
    }
}

/// BMP280 settings plus the humidity oversampling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bme280Config {
    pub common: Bmp280Config,
    pub humidity_oversampling: Oversampling,
}

impl Default for Bme280Config {
    fn default() -> Self {
        Self {
            common: Bmp280Config::default(),
            humidity_oversampling: Oversampling::X4,
        }
    }
}

/// Typed readings from the BME280 sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bme280Readings {
    pub temperature_celsius: f32,
    pub pressure_hpa: f32,
    pub pressure_sea_level_hpa: f32,
    pub humidity_percent: f32,
}

impl SensorReadings<3> for Bme280Readings {
    fn to_array(self) -> [i32; 3] {
        [
            milli(self.temperature_celsius),
            milli(self.pressure_hpa),
            milli(self.humidity_percent),
        ]
    }
}

pub struct Bme280<I, D> {
    inner: Bmp280<I, D>,
    humidity_oversampling: Oversampling,
    humidity: Option<HumidityCalibration>,
}

impl<I: I2c, D: DelayNs> Bme280<I, D> {
    /// Create an uncalibrated driver. No bus traffic happens here.
    pub fn new(i2c: I, delay: D, address: u8, config: Bme280Config) -> Result<Self, I::Error> {
        if config.humidity_oversampling == Oversampling::Skipped {
            return Err(Error::InvalidConfiguration {
                device: DEVICE,
                details: "humidity cannot be skipped",
            });
        }
        Ok(Self {
            inner: Bmp280::with_device(DEVICE, i2c, delay, address, config.common)?,
            humidity_oversampling: config.humidity_oversampling,
            humidity: None,
        })
    }

    /// Check the chip ID, load both trimming blocks and apply the configuration.
    ///
    /// `ctrl_hum` only takes effect after the following `ctrl_meas` write, so it
    /// is written first.
    pub fn calibrate(&mut self) -> Result<(), I::Error> {
        self.humidity = None;
        self.inner.expect_chip_id(BME280_CHIP_ID)?;
        let calibration = self.inner.load_calibration()?;

        let mut h1 = [0u8; 1];
        self.inner.read_block(Register::HumidityCalibH1, &mut h1)?;
        let mut block = [0u8; HUMIDITY_CALIBRATION_LEN];
        self.inner
            .read_block(Register::HumidityCalibStart, &mut block)?;
        let humidity = HumidityCalibration::from_bytes(h1[0], &block);
        debug!("{}: {:?}", DEVICE, humidity);

        self.inner
            .write_register(Register::CtrlHum, self.humidity_oversampling as u8)?;
        self.inner.apply_config()?;
        self.inner
            .await_first_conversion(Some(self.humidity_oversampling));
        self.inner.set_calibration(calibration);
        self.humidity = Some(humidity);
        info!("{}: calibrated", DEVICE);
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.humidity.is_some() && self.inner.is_calibrated()
    }

    pub fn humidity_calibration(&self) -> Option<&HumidityCalibration> {
        self.humidity.as_ref()
    }

    pub fn chip_id(&mut self) -> Result<u8, I::Error> {
        self.inner.chip_id()
    }

    pub fn status(&mut self) -> Result<u8, I::Error> {
        self.inner.status()
    }

    /// Soft reset; the driver must be calibrated again afterwards.
    pub fn reset(&mut self) -> Result<(), I::Error> {
        self.humidity = None;
        self.inner.reset()
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.inner.release()
    }

    /// Read the raw `(adc_T, adc_P, adc_H)` triple.
    pub fn read_raw(&mut self) -> Result<(i32, i32, i32), I::Error> {
        if !self.is_calibrated() {
            return Err(Error::NotCalibrated { device: DEVICE });
        }
        let humidity_us = match self.humidity_oversampling.samples() {
            0 => 0,
            n => 2300 * n + 575,
        };
        self.inner.trigger_forced(humidity_us)?;

        let mut frame = [0u8; 8];
        self.inner.read_block(Register::PressMsb, &mut frame)?;
        debug!("{}: frame {:02x?}", DEVICE, frame);
        Ok((
            raw_20bit(&frame[3..6]),
            raw_20bit(&frame[0..3]),
            (frame[6] as i32) << 8 | frame[7] as i32,
        ))
    }
}

impl<I: I2c, D: DelayNs> Sensor<3> for Bme280<I, D> {
    type Readings = Bme280Readings;
    type Error = Error<I::Error>;

    fn measure(&mut self) -> Result<Bme280Readings, I::Error> {
        let (adc_t, adc_p, adc_h) = self.read_raw()?;
        let (t_fine, readings) = self.inner.compensate(adc_t, adc_p)?;

        let Some(humidity) = self.humidity else {
            return Err(Error::NotCalibrated { device: DEVICE });
        };
        if adc_h == SKIPPED_16BIT {
            return Err(Error::OutOfRange {
                device: DEVICE,
                quantity: "raw humidity (conversion not complete)",
                value: adc_h as f32,
            });
        }
        let humidity_percent = humidity.compensate(adc_h, t_fine) as f32 / 1024.0;

        Ok(Bme280Readings {
            temperature_celsius: readings.temperature_celsius,
            pressure_hpa: readings.pressure_hpa,
            pressure_sea_level_hpa: readings.pressure_sea_level_hpa,
            humidity_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::bmp280::Mode;
    use crate::sensors::bmp280::calibration::tests::DATASHEET_BLOCK;
    use crate::sensors::bmp280::tests::RecordingDelay;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = DEFAULT_ADDRESS;

    const H1: u8 = 0x4B;
    const HUMIDITY_BLOCK: [u8; HUMIDITY_CALIBRATION_LEN] =
        [0x6A, 0x01, 0x00, 0x14, 0x24, 0x03, 0x1E];

    /// adc_P = 415148, adc_T = 519888, adc_H = 30000.
    const FRAME: [u8; 8] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30];

    fn calibration_sequence(config: &Bme280Config) -> Vec<I2cTransaction> {
        vec![
            I2cTransaction::write_read(ADDR, vec![0xD0], vec![BME280_CHIP_ID]),
            I2cTransaction::write_read(ADDR, vec![0x88], DATASHEET_BLOCK.to_vec()),
            I2cTransaction::write_read(ADDR, vec![0xA1], vec![H1]),
            I2cTransaction::write_read(ADDR, vec![0xE1], HUMIDITY_BLOCK.to_vec()),
            I2cTransaction::write(ADDR, vec![0xF2, config.humidity_oversampling as u8]),
            I2cTransaction::write(ADDR, vec![0xF5, config.common.config()]),
            I2cTransaction::write(ADDR, vec![0xF4, config.common.ctrl_meas()]),
        ]
    }

    fn sensor(
        expectations: &[I2cTransaction],
        config: Bme280Config,
    ) -> (Bme280<I2cMock, NoopDelay>, I2cMock) {
        let i2c = I2cMock::new(expectations);
        let handle = i2c.clone();
        (
            Bme280::new(i2c, NoopDelay::new(), ADDR, config).unwrap(),
            handle,
        )
    }

    #[test]
    fn test_decode_humidity_block() {
        assert_eq!(
            HumidityCalibration::from_bytes(H1, &HUMIDITY_BLOCK),
            HumidityCalibration {
                dig_h1: 75,
                dig_h2: 362,
                dig_h3: 0,
                dig_h4: 324,
                dig_h5: 50,
                dig_h6: 30,
            }
        );
    }

    #[test]
    fn test_humidity_compensation() {
        let calibration = HumidityCalibration::from_bytes(H1, &HUMIDITY_BLOCK);
        assert_eq!(calibration.compensate(30_000, 128_422), 52_306);
    }

    #[test]
    fn test_humidity_is_clamped() {
        let calibration = HumidityCalibration::from_bytes(H1, &HUMIDITY_BLOCK);
        assert_eq!(calibration.compensate(0, 128_422), 0);
        assert_eq!(calibration.compensate(0xFFFF, 128_422), 419_430_400 >> 12);
    }

    #[test]
    fn test_measure_before_calibrate() {
        let (mut sensor, mut i2c) = sensor(&[], Bme280Config::default());

        assert!(matches!(
            sensor.measure(),
            Err(Error::NotCalibrated { device: "BME280" })
        ));
        i2c.done();
    }

    #[test]
    fn test_calibrate_and_measure() {
        let config = Bme280Config::default();
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        let readings = sensor.measure().unwrap();
        assert_eq!(readings.temperature_celsius, 25.08);
        assert!((readings.pressure_hpa - 1006.5325).abs() < 0.001);
        assert_eq!(readings.humidity_percent, 51.080078125);
        i2c.done();
    }

    #[test]
    fn test_first_conversion_includes_humidity() {
        let config = Bme280Config {
            common: Bmp280Config {
                altitude_m: 414.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let i2c = I2cMock::new(&expectations);
        let mut handle = i2c.clone();
        let delay = RecordingDelay::default();
        let mut sensor = Bme280::new(i2c, delay.clone(), ADDR, config).unwrap();

        sensor.calibrate().unwrap();
        // T x1, P x4 and H x4
        assert_eq!(delay.total_us(), 23_100);

        let readings = sensor.measure().unwrap();
        assert_eq!(delay.total_us(), 23_100);
        assert!((readings.pressure_sea_level_hpa - 1057.41).abs() < 0.05);
        assert_eq!(readings.humidity_percent, 51.080078125);
        handle.done();
    }

    #[test]
    fn test_forced_mode() {
        let config = Bme280Config {
            common: Bmp280Config {
                mode: Mode::Forced,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write(ADDR, vec![0xF4, 0x2D]));
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        assert_eq!(sensor.read_raw().unwrap(), (519_888, 415_148, 30_000));
        i2c.done();
    }

    #[test]
    fn test_rejects_bmp280_chip() {
        let (mut sensor, mut i2c) = sensor(
            &[I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x58])],
            Bme280Config::default(),
        );

        assert!(matches!(
            sensor.calibrate(),
            Err(Error::ChipId {
                device: "BME280",
                expected: 0x60,
                found: 0x58,
            })
        ));
        i2c.done();
    }

    #[test]
    fn test_skipped_humidity_rejected() {
        let config = Bme280Config {
            humidity_oversampling: Oversampling::Skipped,
            ..Default::default()
        };
        let i2c = I2cMock::new(&[]);
        let mut handle = i2c.clone();

        assert!(matches!(
            Bme280::new(i2c, NoopDelay::new(), ADDR, config),
            Err(Error::InvalidConfiguration { .. })
        ));
        handle.done();
    }
}
