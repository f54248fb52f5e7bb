/// Register map shared by the Bosch Sensortec BMP280 and BME280.
///
/// All addresses are 8-bit; the 7-bit slave address and R/W bit are handled by the
/// bus. Burst reads auto-increment the register pointer, so multi-byte values are
/// read with a single `write_read`.
///
/// Key groups:
/// - **Measurement results** - 0xF7..0xFC pressure + temperature (20 bit each),
///   0xFD..0xFE humidity (BME280, 16 bit)
/// - **Control** - 0xF2 `ctrl_hum` (BME280), 0xF4 `ctrl_meas`, 0xF5 `config`
/// - **Status** - 0xF3 (measuring / im_update bits)
/// - **Reset & ID** - 0xE0 (soft reset), 0xD0 (chip ID)
/// - **Calibration** - 0x88..0x9F (temperature + pressure), 0xA1 and 0xE1..0xE7
///   (humidity, BME280)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    CalibStart = 0x88,
    HumidityCalibH1 = 0xA1,
    Id = 0xD0,
    Reset = 0xE0,
    HumidityCalibStart = 0xE1,
    CtrlHum = 0xF2,
    // bit 3 - conversion running, bit 0 - NVM data being copied
    Status = 0xF3,
    CtrlMeas = 0xF4,
    Config = 0xF5,
    PressMsb = 0xF7,
    TempMsb = 0xFA,
    HumMsb = 0xFD,
}

/// SDO pin tied to GND.
pub const DEFAULT_ADDRESS: u8 = 0x76;
/// SDO pin tied to VDDIO.
pub const ALTERNATE_ADDRESS: u8 = 0x77;

/// Writing this to [`Register::Reset`] performs a power-on reset.
pub const RESET_VALUE: u8 = 0xB6;

pub const BMP280_CHIP_ID: u8 = 0x58;
pub const BME280_CHIP_ID: u8 = 0x60;

/// Bytes in the temperature/pressure trimming block 0x88..0x9F.
pub const CALIBRATION_LEN: usize = 24;
/// Bytes in the humidity trimming block 0xE1..0xE7.
pub const HUMIDITY_CALIBRATION_LEN: usize = 7;

pub const STATUS_MEASURING: u8 = 0x08;
pub const STATUS_IM_UPDATE: u8 = 0x01;

/// Value of a 20-bit result register whose measurement was skipped.
pub const SKIPPED_20BIT: i32 = 0x80000;
/// Value of the 16-bit humidity register when humidity was skipped.
pub const SKIPPED_16BIT: i32 = 0x8000;

/// Start-up time after power-on or soft reset.
pub const STARTUP_MS: u32 = 2;
