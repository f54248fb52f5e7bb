//! Bosch BMP280 barometric pressure and temperature sensor.
//!
//! The driver starts out uncalibrated. [`Bmp280::calibrate`] checks the chip ID,
//! reads the trimming block once and writes the measurement configuration; only
//! then does [`Sensor::measure`] touch the result registers. Calibration is held
//! for the driver's lifetime and only dropped by [`Bmp280::reset`].
//!
//! In normal mode the chip converts continuously and a measurement is a single
//! burst read of 0xF7..0xFC; `calibrate` waits out the first conversion so the
//! result registers no longer hold their reset value. In forced mode each
//! measurement first writes `ctrl_meas` to start one conversion and waits its
//! worst-case duration.

pub mod calibration;
pub mod config;
pub mod registers;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

pub use calibration::Bmp280Calibration;
pub use config::{Bmp280Config, Filter, Mode, Oversampling, Standby};
pub use registers::{ALTERNATE_ADDRESS, DEFAULT_ADDRESS, Register};

use super::{Sensor, SensorReadings, milli};
use crate::error::check_address;
use crate::{Error, Result};
use registers::{BMP280_CHIP_ID, CALIBRATION_LEN, RESET_VALUE, SKIPPED_20BIT, STARTUP_MS};

const DEVICE: &str = "BMP280";

pub(crate) const TEMPERATURE_RANGE: (f32, f32) = (-40.0, 85.0);
pub(crate) const PRESSURE_RANGE_HPA: (f32, f32) = (300.0, 1100.0);

/// Typed readings from the BMP280 sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bmp280Readings {
    pub temperature_celsius: f32,
    pub pressure_hpa: f32,
    /// Station pressure reduced to sea level using [`Bmp280Config::altitude_m`].
    pub pressure_sea_level_hpa: f32,
}

impl SensorReadings<2> for Bmp280Readings {
    fn to_array(self) -> [i32; 2] {
        [milli(self.temperature_celsius), milli(self.pressure_hpa)]
    }
}

/// Assemble a 20-bit result from its msb, lsb and xlsb registers.
pub(crate) fn raw_20bit(bytes: &[u8]) -> i32 {
    (bytes[0] as i32) << 12 | (bytes[1] as i32) << 4 | (bytes[2] as i32) >> 4
}

/// Pressure in Q24.8 Pa to hPa.
pub(crate) fn pressure_hpa(q24_8: u32) -> f32 {
    (q24_8 as f64 / 25_600.0) as f32
}

pub struct Bmp280<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    config: Bmp280Config,
    sea_level_coefficient: f32,
    calibration: Option<Bmp280Calibration>,
    device: &'static str,
}

impl<I: I2c, D: DelayNs> Bmp280<I, D> {
    /// Create an uncalibrated driver. No bus traffic happens here.
    pub fn new(i2c: I, delay: D, address: u8, config: Bmp280Config) -> Result<Self, I::Error> {
        Self::with_device(DEVICE, i2c, delay, address, config)
    }

    pub(crate) fn with_device(
        device: &'static str,
        i2c: I,
        delay: D,
        address: u8,
        config: Bmp280Config,
    ) -> Result<Self, I::Error> {
        check_address::<I::Error>(device, address, &[DEFAULT_ADDRESS, ALTERNATE_ADDRESS])?;
        config
            .validate()
            .map_err(|details| Error::<I::Error>::InvalidConfiguration { device, details })?;
        Ok(Self {
            i2c,
            delay,
            address,
            config,
            sea_level_coefficient: config.sea_level_coefficient(),
            calibration: None,
            device,
        })
    }

    /// Check the chip ID, load the trimming coefficients and apply the configuration.
    pub fn calibrate(&mut self) -> Result<(), I::Error> {
        self.expect_chip_id(BMP280_CHIP_ID)?;
        let calibration = self.load_calibration()?;
        self.apply_config()?;
        self.await_first_conversion(None);
        self.calibration = Some(calibration);
        info!("{}: calibrated at {:#04x}", self.device, self.address);
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&Bmp280Calibration> {
        self.calibration.as_ref()
    }

    pub fn config(&self) -> &Bmp280Config {
        &self.config
    }

    pub fn chip_id(&mut self) -> Result<u8, I::Error> {
        let mut id = [0u8; 1];
        self.read_block(Register::Id, &mut id)?;
        Ok(id[0])
    }

    /// Raw status register (bit 3 measuring, bit 0 NVM copy in progress).
    pub fn status(&mut self) -> Result<u8, I::Error> {
        let mut status = [0u8; 1];
        self.read_block(Register::Status, &mut status)?;
        Ok(status[0])
    }

    /// Soft reset. The chip returns to sleep mode, so the driver goes back to
    /// the uncalibrated state and [`Bmp280::calibrate`] must be called again.
    pub fn reset(&mut self) -> Result<(), I::Error> {
        self.write_register(Register::Reset, RESET_VALUE)?;
        self.delay.delay_ms(STARTUP_MS);
        self.calibration = None;
        debug!("{}: soft reset", self.device);
        Ok(())
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Read the raw `(adc_T, adc_P)` pair.
    pub fn read_raw(&mut self) -> Result<(i32, i32), I::Error> {
        if self.calibration.is_none() {
            return Err(Error::NotCalibrated {
                device: self.device,
            });
        }
        self.trigger_forced(0)?;

        let mut frame = [0u8; 6];
        self.read_block(Register::PressMsb, &mut frame)?;
        debug!("{}: frame {:02x?}", self.device, frame);
        Ok((raw_20bit(&frame[3..6]), raw_20bit(&frame[0..3])))
    }

    pub(crate) fn set_calibration(&mut self, calibration: Bmp280Calibration) {
        self.calibration = Some(calibration);
    }

    pub(crate) fn expect_chip_id(&mut self, expected: u8) -> Result<(), I::Error> {
        let found = self.chip_id()?;
        if found != expected {
            error!(
                "{}: chip id {:#04x}, expected {:#04x}",
                self.device, found, expected
            );
            return Err(Error::ChipId {
                device: self.device,
                expected: expected as u16,
                found: found as u16,
            });
        }
        Ok(())
    }

    pub(crate) fn load_calibration(&mut self) -> Result<Bmp280Calibration, I::Error> {
        let mut block = [0u8; CALIBRATION_LEN];
        self.read_block(Register::CalibStart, &mut block)?;
        let calibration = Bmp280Calibration::from_bytes(&block);
        calibration.validate().map_err(|details| {
            error!("{}: {}", self.device, details);
            Error::<I::Error>::InvalidCalibration {
                device: self.device,
                details,
            }
        })?;
        debug!("{}: {:?}", self.device, calibration);
        Ok(calibration)
    }

    /// `config` goes first: writes to it in normal mode may be ignored.
    pub(crate) fn apply_config(&mut self) -> Result<(), I::Error> {
        self.write_register(Register::Config, self.config.config())?;
        self.write_register(Register::CtrlMeas, self.config.ctrl_meas())
    }

    /// In normal mode the first conversion starts with the `ctrl_meas` write;
    /// until it completes the result registers hold the skipped marker.
    pub(crate) fn await_first_conversion(&mut self, humidity: Option<Oversampling>) {
        if self.config.mode == Mode::Normal {
            self.delay
                .delay_us(self.config.measurement_time_us(humidity));
        }
    }

    /// In forced mode, start one conversion and wait for it. `humidity_us` extends
    /// the wait for the humidity channel.
    pub(crate) fn trigger_forced(&mut self, humidity_us: u32) -> Result<(), I::Error> {
        if self.config.mode != Mode::Forced {
            return Ok(());
        }
        self.write_register(Register::CtrlMeas, self.config.ctrl_meas())?;
        self.delay
            .delay_us(self.config.measurement_time_us(None) + humidity_us);
        Ok(())
    }

    /// Compensate a raw pair, returning `t_fine` alongside the readings.
    pub(crate) fn compensate(
        &self,
        adc_t: i32,
        adc_p: i32,
    ) -> Result<(i32, Bmp280Readings), I::Error> {
        let device = self.device;
        let Some(calibration) = self.calibration else {
            return Err(Error::NotCalibrated { device });
        };
        if adc_t == SKIPPED_20BIT {
            return Err(Error::OutOfRange {
                device,
                quantity: "raw temperature (conversion not complete)",
                value: adc_t as f32,
            });
        }
        if adc_p == SKIPPED_20BIT {
            return Err(Error::OutOfRange {
                device,
                quantity: "raw pressure (conversion not complete)",
                value: adc_p as f32,
            });
        }

        let (t_fine, centi) = calibration.compensate_temperature(adc_t);
        let Some(q24_8) = calibration.compensate_pressure(adc_p, t_fine) else {
            return Err(Error::InvalidCalibration {
                device,
                details: "pressure divisor is zero",
            });
        };

        let check = self.config.range_check;
        let (min, max) = TEMPERATURE_RANGE;
        let celsius = centi as f32 / 100.0;
        let temperature_celsius =
            check.apply::<I::Error>(device, "temperature", celsius, min, max)?;
        let (min, max) = PRESSURE_RANGE_HPA;
        let hpa = pressure_hpa(q24_8);
        let pressure_hpa = check.apply::<I::Error>(device, "pressure", hpa, min, max)?;

        Ok((
            t_fine,
            Bmp280Readings {
                temperature_celsius,
                pressure_hpa,
                pressure_sea_level_hpa: pressure_hpa * self.sea_level_coefficient,
            },
        ))
    }

    pub(crate) fn read_block(
        &mut self,
        register: Register,
        buffer: &mut [u8],
    ) -> Result<(), I::Error> {
        let (device, address) = (self.device, self.address);
        self.i2c
            .write_read(address, &[register as u8], buffer)
            .map_err(|e| {
                error!("{}: read {:?} failed: {:?}", device, register, e);
                Error::Transport(e)
            })
    }

    pub(crate) fn write_register(
        &mut self,
        register: Register,
        value: u8,
    ) -> Result<(), I::Error> {
        let (device, address) = (self.device, self.address);
        self.i2c
            .write(address, &[register as u8, value])
            .map_err(|e| {
                error!("{}: write {:?} failed: {:?}", device, register, e);
                Error::Transport(e)
            })
    }
}

impl<I: I2c, D: DelayNs> Sensor<2> for Bmp280<I, D> {
    type Readings = Bmp280Readings;
    type Error = Error<I::Error>;

    fn measure(&mut self) -> Result<Bmp280Readings, I::Error> {
        let (adc_t, adc_p) = self.read_raw()?;
        let (_, readings) = self.compensate(adc_t, adc_p)?;
        Ok(readings)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::calibration::tests::DATASHEET_BLOCK;
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use crate::sensors::RangeCheck;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = DEFAULT_ADDRESS;

    /// Delay that only adds up how long it was asked to wait.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingDelay(Rc<Cell<u64>>);

    impl RecordingDelay {
        pub(crate) fn total_us(&self) -> u64 {
            self.0.get() / 1000
        }
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + ns as u64);
        }
    }

    /// Result registers 0xF7..0xFC for adc_P = 415148, adc_T = 519888.
    const FRAME: [u8; 6] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00];

    fn calibration_sequence(config: &Bmp280Config) -> Vec<I2cTransaction> {
        vec![
            I2cTransaction::write_read(ADDR, vec![0xD0], vec![BMP280_CHIP_ID]),
            I2cTransaction::write_read(ADDR, vec![0x88], DATASHEET_BLOCK.to_vec()),
            I2cTransaction::write(ADDR, vec![0xF5, config.config()]),
            I2cTransaction::write(ADDR, vec![0xF4, config.ctrl_meas()]),
        ]
    }

    fn sensor(
        expectations: &[I2cTransaction],
        config: Bmp280Config,
    ) -> (Bmp280<I2cMock, NoopDelay>, I2cMock) {
        let i2c = I2cMock::new(expectations);
        let handle = i2c.clone();
        (
            Bmp280::new(i2c, NoopDelay::new(), ADDR, config).unwrap(),
            handle,
        )
    }

    #[test]
    fn test_raw_20bit() {
        assert_eq!(raw_20bit(&FRAME[0..3]), 415_148);
        assert_eq!(raw_20bit(&FRAME[3..6]), 519_888);
    }

    #[test]
    fn test_measure_before_calibrate() {
        let (mut sensor, mut i2c) = sensor(&[], Bmp280Config::default());

        assert!(matches!(
            sensor.measure(),
            Err(Error::NotCalibrated { device: "BMP280" })
        ));
        i2c.done();
    }

    #[test]
    fn test_calibrate_and_measure_normal_mode() {
        let config = Bmp280Config::default();
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        assert!(sensor.is_calibrated());
        let readings = sensor.measure().unwrap();
        assert_eq!(readings.temperature_celsius, 25.08);
        assert!((readings.pressure_hpa - 1006.5325).abs() < 0.001);
        assert_eq!(readings.to_array()[0], 25080);
        i2c.done();
    }

    #[test]
    fn test_normal_mode_waits_for_first_conversion() {
        let config = Bmp280Config::default();
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let i2c = I2cMock::new(&expectations);
        let mut handle = i2c.clone();
        let delay = RecordingDelay::default();
        let mut sensor = Bmp280::new(i2c, delay.clone(), ADDR, config).unwrap();

        sensor.calibrate().unwrap();
        assert_eq!(delay.total_us(), 13_325);

        // continuous conversions: measuring does not wait again
        sensor.measure().unwrap();
        assert_eq!(delay.total_us(), 13_325);
        handle.done();
    }

    #[test]
    fn test_forced_mode_waits_per_measurement() {
        let config = Bmp280Config {
            mode: Mode::Forced,
            ..Default::default()
        };
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write(ADDR, vec![0xF4, 0b0010_1101]));
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let i2c = I2cMock::new(&expectations);
        let mut handle = i2c.clone();
        let delay = RecordingDelay::default();
        let mut sensor = Bmp280::new(i2c, delay.clone(), ADDR, config).unwrap();

        sensor.calibrate().unwrap();
        assert_eq!(delay.total_us(), 0);
        sensor.measure().unwrap();
        assert_eq!(delay.total_us(), 13_325);
        handle.done();
    }

    #[test]
    fn test_repeated_measure_is_deterministic() {
        let config = Bmp280Config::default();
        let mut expectations = calibration_sequence(&config);
        for _ in 0..3 {
            expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        }
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        let first = sensor.measure().unwrap();
        assert_eq!(sensor.measure().unwrap(), first);
        assert_eq!(sensor.measure().unwrap(), first);
        i2c.done();
    }

    #[test]
    fn test_sea_level_pressure() {
        let config = Bmp280Config {
            altitude_m: 414.0,
            ..Default::default()
        };
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        let readings = sensor.measure().unwrap();
        // 1006.5325 hPa * 1.05055
        assert!((readings.pressure_sea_level_hpa - 1057.41).abs() < 0.05);
        assert!((readings.pressure_hpa - 1006.5325).abs() < 0.001);
        i2c.done();
    }

    #[test]
    fn test_altitude_above_troposphere_rejected() {
        let config = Bmp280Config {
            altitude_m: 11_000.0,
            ..Default::default()
        };
        let i2c = I2cMock::new(&[]);
        let mut handle = i2c.clone();

        assert!(matches!(
            Bmp280::new(i2c, NoopDelay::new(), ADDR, config),
            Err(Error::InvalidConfiguration { .. })
        ));
        handle.done();
    }

    #[test]
    fn test_forced_mode_triggers_conversion() {
        let config = Bmp280Config {
            mode: Mode::Forced,
            ..Default::default()
        };
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write(ADDR, vec![0xF4, 0b0010_1101]));
        expectations.push(I2cTransaction::write_read(ADDR, vec![0xF7], FRAME.to_vec()));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        assert_eq!(sensor.read_raw().unwrap(), (519_888, 415_148));
        i2c.done();
    }

    #[test]
    fn test_wrong_chip_id() {
        let (mut sensor, mut i2c) = sensor(
            &[I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x60])],
            Bmp280Config::default(),
        );

        assert!(matches!(
            sensor.calibrate(),
            Err(Error::ChipId {
                expected: 0x58,
                found: 0x60,
                ..
            })
        ));
        assert!(!sensor.is_calibrated());
        i2c.done();
    }

    #[test]
    fn test_erased_calibration_is_rejected() {
        let (mut sensor, mut i2c) = sensor(
            &[
                I2cTransaction::write_read(ADDR, vec![0xD0], vec![BMP280_CHIP_ID]),
                I2cTransaction::write_read(ADDR, vec![0x88], vec![0; CALIBRATION_LEN]),
            ],
            Bmp280Config::default(),
        );

        assert!(matches!(
            sensor.calibrate(),
            Err(Error::InvalidCalibration { .. })
        ));
        assert!(!sensor.is_calibrated());
        i2c.done();
    }

    #[test]
    fn test_reset_drops_calibration() {
        let config = Bmp280Config::default();
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write(ADDR, vec![0xE0, 0xB6]));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        sensor.reset().unwrap();
        assert!(!sensor.is_calibrated());
        assert!(matches!(
            sensor.measure(),
            Err(Error::NotCalibrated { .. })
        ));
        i2c.done();
    }

    #[test]
    fn test_skipped_marker() {
        let config = Bmp280Config::default();
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(
            ADDR,
            vec![0xF7],
            vec![0x80, 0x00, 0x00, 0x80, 0x00, 0x00],
        ));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        assert!(matches!(
            sensor.measure(),
            Err(Error::OutOfRange {
                quantity: "raw temperature (conversion not complete)",
                ..
            })
        ));
        i2c.done();
    }

    #[test]
    fn test_skipped_marker_on_pressure_only() {
        let config = Bmp280Config::default();
        let mut expectations = calibration_sequence(&config);
        expectations.push(I2cTransaction::write_read(
            ADDR,
            vec![0xF7],
            vec![0x80, 0x00, 0x00, 0x7E, 0xED, 0x00],
        ));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        match sensor.measure() {
            Err(Error::OutOfRange {
                quantity, value, ..
            }) => {
                assert_eq!(quantity, "raw pressure (conversion not complete)");
                assert_eq!(value, 524_288.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        i2c.done();
    }

    #[test]
    fn test_strict_pressure_range() {
        let config = Bmp280Config {
            range_check: RangeCheck::Strict,
            ..Default::default()
        };
        let mut expectations = calibration_sequence(&config);
        // adc_P = 0x10000 decodes to roughly 1616 hPa
        expectations.push(I2cTransaction::write_read(
            ADDR,
            vec![0xF7],
            vec![0x10, 0x00, 0x00, 0x7E, 0xED, 0x00],
        ));
        let (mut sensor, mut i2c) = sensor(&expectations, config);

        sensor.calibrate().unwrap();
        assert!(matches!(
            sensor.measure(),
            Err(Error::OutOfRange {
                quantity: "pressure",
                ..
            })
        ));
        i2c.done();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Bmp280Config {
            pressure_oversampling: Oversampling::Skipped,
            ..Default::default()
        };
        let i2c = I2cMock::new(&[]);
        let mut handle = i2c.clone();

        assert!(matches!(
            Bmp280::new(i2c, NoopDelay::new(), ADDR, config),
            Err(Error::InvalidConfiguration { .. })
        ));
        handle.done();
    }

    #[test]
    fn test_transport_error() {
        let (mut sensor, mut i2c) = sensor(
            &[I2cTransaction::write_read(ADDR, vec![0xD0], vec![0]).with_error(ErrorKind::Other)],
            Bmp280Config::default(),
        );

        assert!(matches!(
            sensor.calibrate(),
            Err(Error::Transport(ErrorKind::Other))
        ));
        i2c.done();
    }
}
