//! Drivers for I2C connected sensor and display ICs
//!
//! Every driver owns an [`embedded_hal::i2c::I2c`] bus handle and translates one
//! chip's register map into calibrated physical readings. Drivers are independent
//! of each other; an application creates only the ones it needs and is responsible
//! for sharing the bus between them.
//!
//! | Module                        | Chip(s)            | Reading                         |
//! |-------------------------------|--------------------|---------------------------------|
//! | [`sensors::sht2x`]            | SHT20, SHT21, SHT25| temperature, relative humidity  |
//! | [`sensors::sht3x`]            | SHT30, SHT31, SHT35| temperature, relative humidity  |
//! | [`sensors::bmp280`]           | BMP280             | temperature, pressure           |
//! | [`sensors::bme280`]           | BME280             | temperature, pressure, humidity |
//! | [`sensors::max44009`]         | MAX44009           | illuminance                     |
//! | [`sensors::veml6040`]         | VEML6040           | RGBW counts, illuminance        |
//! | [`sensors::veml6075`]         | VEML6075           | UV-A/UV-B, UV index             |
//! | [`display::ssd1306`]          | SSD1306            | monochrome OLED framebuffer     |
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on embedded targets
//! and on desktop hosts (for single-board computers and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod crc;
pub mod display;
pub mod error;
pub mod sensors;

pub use error::{Error, Result};
