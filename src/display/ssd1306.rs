//! Solomon Systech SSD1306 OLED controller over I2C.
//!
//! Every I2C write starts with a control byte: `0x00` for a command stream,
//! `0x40` for display RAM data. The controller is run in horizontal addressing
//! mode, so a flush sets a column and page window and streams the bytes of each
//! changed page span.

use core::convert::Infallible;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal::i2c::I2c;
use heapless::Vec;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::framebuffer::FrameBuffer;
use crate::error::check_address;
use crate::{Error, Result};

const DEVICE: &str = "SSD1306";

/// SA0 pin tied low.
pub const DEFAULT_ADDRESS: u8 = 0x3C;
/// SA0 pin tied high.
pub const ALTERNATE_ADDRESS: u8 = 0x3D;

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

const MAX_COMMAND_LEN: usize = 32;
const MAX_WIDTH: usize = 128;

/// SSD1306 commands used by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    MemoryAddressingMode = 0x20,
    ColumnAddress = 0x21,
    PageAddress = 0x22,
    StartLine = 0x40,
    Contrast = 0x81,
    ChargePump = 0x8D,
    SegmentRemap = 0xA1,
    ResumeRam = 0xA4,
    NormalDisplay = 0xA6,
    InvertDisplay = 0xA7,
    MultiplexRatio = 0xA8,
    DisplayOff = 0xAE,
    DisplayOn = 0xAF,
    ComScanDecrement = 0xC8,
    DisplayOffset = 0xD3,
    ClockDivide = 0xD5,
    PrechargePeriod = 0xD9,
    ComPins = 0xDA,
    VcomhDeselect = 0xDB,
}

/// Supported panel geometries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplaySize {
    Display128x64,
    #[default]
    Display128x32,
    Display96x16,
}

impl DisplaySize {
    pub fn width(self) -> u32 {
        match self {
            DisplaySize::Display128x64 | DisplaySize::Display128x32 => 128,
            DisplaySize::Display96x16 => 96,
        }
    }

    pub fn height(self) -> u32 {
        match self {
            DisplaySize::Display128x64 => 64,
            DisplaySize::Display128x32 => 32,
            DisplaySize::Display96x16 => 16,
        }
    }

    /// COM pins hardware configuration: alternative layout on 64-row panels.
    fn com_pins(self) -> u8 {
        match self {
            DisplaySize::Display128x64 => 0x12,
            DisplaySize::Display128x32 | DisplaySize::Display96x16 => 0x02,
        }
    }
}

/// Source of the panel drive voltage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VccSource {
    #[default]
    ChargePump,
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ssd1306Config {
    pub size: DisplaySize,
    pub vcc: VccSource,
    pub contrast: u8,
}

impl Default for Ssd1306Config {
    fn default() -> Self {
        Self {
            size: DisplaySize::default(),
            vcc: VccSource::default(),
            contrast: 0x7F,
        }
    }
}

impl Ssd1306Config {
    /// The initialization command stream, without the control byte.
    pub fn init_sequence(&self) -> [u8; 25] {
        let charge_pump = self.vcc == VccSource::ChargePump;
        [
            Command::DisplayOff as u8,
            Command::ClockDivide as u8,
            0x80,
            Command::MultiplexRatio as u8,
            (self.size.height() - 1) as u8,
            Command::DisplayOffset as u8,
            0x00,
            Command::StartLine as u8,
            Command::ChargePump as u8,
            if charge_pump { 0x14 } else { 0x10 },
            Command::MemoryAddressingMode as u8,
            0x00,
            Command::SegmentRemap as u8,
            Command::ComScanDecrement as u8,
            Command::ComPins as u8,
            self.size.com_pins(),
            Command::Contrast as u8,
            self.contrast,
            Command::PrechargePeriod as u8,
            if charge_pump { 0xF2 } else { 0x22 },
            Command::VcomhDeselect as u8,
            0x40,
            Command::ResumeRam as u8,
            Command::NormalDisplay as u8,
            Command::DisplayOn as u8,
        ]
    }
}

pub struct Ssd1306<I> {
    i2c: I,
    address: u8,
    config: Ssd1306Config,
    framebuffer: FrameBuffer,
    initialized: bool,
}

impl<I: I2c> Ssd1306<I> {
    /// Create the driver and allocate a blank framebuffer. No bus traffic happens here.
    pub fn new(i2c: I, address: u8, config: Ssd1306Config) -> Result<Self, I::Error> {
        check_address::<I::Error>(DEVICE, address, &[DEFAULT_ADDRESS, ALTERNATE_ADDRESS])?;
        let size = config.size;
        Ok(Self {
            i2c,
            address,
            config,
            framebuffer: FrameBuffer::new(size.width(), size.height()),
            initialized: false,
        })
    }

    /// Send the initialization sequence as one command stream.
    ///
    /// Display RAM content is undefined after power-up, so the next flush
    /// rewrites the whole panel.
    pub fn init(&mut self) -> Result<(), I::Error> {
        let sequence = self.config.init_sequence();
        self.command(&sequence)?;
        self.initialized = true;
        self.framebuffer.mark_all_dirty();
        info!(
            "{}: initialized {}x{} at {:#04x}",
            DEVICE,
            self.config.size.width(),
            self.config.size.height(),
            self.address
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &Ssd1306Config {
        &self.config
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn set_contrast(&mut self, contrast: u8) -> Result<(), I::Error> {
        self.command(&[Command::Contrast as u8, contrast])?;
        self.config.contrast = contrast;
        Ok(())
    }

    pub fn set_display_on(&mut self, on: bool) -> Result<(), I::Error> {
        let command = if on {
            Command::DisplayOn
        } else {
            Command::DisplayOff
        };
        self.command(&[command as u8])
    }

    pub fn set_inverted(&mut self, inverted: bool) -> Result<(), I::Error> {
        let command = if inverted {
            Command::InvertDisplay
        } else {
            Command::NormalDisplay
        };
        self.command(&[command as u8])
    }

    /// Blank the framebuffer. The next flush writes every page.
    pub fn clear(&mut self) {
        self.framebuffer.fill(false);
    }

    /// Set one framebuffer pixel; coordinates outside the panel are an error.
    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) -> Result<(), I::Error> {
        if self.framebuffer.try_set_pixel(x, y, on) {
            return Ok(());
        }
        let (quantity, value) = if x >= self.config.size.width() {
            ("pixel x", x)
        } else {
            ("pixel y", y)
        };
        Err(Error::OutOfRange {
            device: DEVICE,
            quantity,
            value: value as f32,
        })
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<bool> {
        self.framebuffer.get_pixel(x, y)
    }

    /// Write the changed column span of every dirty page to display RAM.
    ///
    /// A page is only marked clean once its data write succeeded.
    pub fn flush(&mut self) -> Result<(), I::Error> {
        if !self.initialized {
            error!("{}: flush before init", DEVICE);
            return Err(Error::NotInitialized { device: DEVICE });
        }

        for page in 0..self.framebuffer.page_count() {
            let Some(span) = self.framebuffer.dirty_span(page) else {
                continue;
            };
            debug!(
                "{}: flushing page {} columns {}..={}",
                DEVICE, page, span.start, span.end
            );

            self.command(&[
                Command::ColumnAddress as u8,
                span.start as u8,
                span.end as u8,
                Command::PageAddress as u8,
                page as u8,
                page as u8,
            ])?;

            let Some(bytes) = self
                .framebuffer
                .page(page)
                .and_then(|row| row.get(span.start..=span.end))
            else {
                continue;
            };
            let mut frame: Vec<u8, { MAX_WIDTH + 1 }> = Vec::new();
            if frame.push(CONTROL_DATA).is_err() || frame.extend_from_slice(bytes).is_err() {
                return Err(Error::InvalidConfiguration {
                    device: DEVICE,
                    details: "page wider than 128 columns",
                });
            }
            self.write(&frame, "write data")?;
            self.framebuffer.mark_page_clean(page);
        }
        Ok(())
    }

    /// Release the bus handle.
    pub fn release(self) -> I {
        self.i2c
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), I::Error> {
        let mut frame: Vec<u8, { MAX_COMMAND_LEN + 1 }> = Vec::new();
        if frame.push(CONTROL_COMMAND).is_err() || frame.extend_from_slice(bytes).is_err() {
            return Err(Error::InvalidConfiguration {
                device: DEVICE,
                details: "command stream too long",
            });
        }
        self.write(&frame, "write command")
    }

    fn write(&mut self, frame: &[u8], operation: &str) -> Result<(), I::Error> {
        self.i2c.write(self.address, frame).map_err(|e| {
            error!("{}: {} failed: {:?}", DEVICE, operation, e);
            Error::Transport(e)
        })
    }
}

impl<I: I2c> OriginDimensions for Ssd1306<I> {
    fn size(&self) -> Size {
        self.framebuffer.size()
    }
}

impl<I: I2c> DrawTarget for Ssd1306<I> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<P>(&mut self, pixels: P) -> core::result::Result<(), Self::Error>
    where
        P: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.framebuffer.draw_iter(pixels)
    }

    fn fill_solid(
        &mut self,
        area: &Rectangle,
        color: Self::Color,
    ) -> core::result::Result<(), Self::Error> {
        self.framebuffer.fill_solid(area, color)
    }

    fn clear(&mut self, color: Self::Color) -> core::result::Result<(), Self::Error> {
        self.framebuffer.clear(color)
    }
}
