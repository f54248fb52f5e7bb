//! Factory trimming coefficients and the Bosch fixed-point compensation formulas.
//!
//! Arithmetic follows the reference integer implementation bit for bit, including
//! its two's-complement wrap-around, so results match other conforming drivers
//! exactly for the same raw inputs.

use super::registers::CALIBRATION_LEN;

/// Temperature and pressure coefficients (`dig_T1..dig_T3`, `dig_P1..dig_P9`),
/// stored little-endian at 0x88..0x9F.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bmp280Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

impl Bmp280Calibration {
    /// Decode the 24-byte block read from 0x88.
    pub fn from_bytes(buffer: &[u8; CALIBRATION_LEN]) -> Self {
        let unsigned = |i: usize| u16::from_le_bytes([buffer[i], buffer[i + 1]]);
        let signed = |i: usize| i16::from_le_bytes([buffer[i], buffer[i + 1]]);
        Self {
            dig_t1: unsigned(0),
            dig_t2: signed(2),
            dig_t3: signed(4),
            dig_p1: unsigned(6),
            dig_p2: signed(8),
            dig_p3: signed(10),
            dig_p4: signed(12),
            dig_p5: signed(14),
            dig_p6: signed(16),
            dig_p7: signed(18),
            dig_p8: signed(20),
            dig_p9: signed(22),
        }
    }

    /// Reject blocks that cannot come from a trimmed part (erased or unreadable NVM).
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.dig_t1 == 0 {
            return Err("dig_T1 is zero");
        }
        if self.dig_p1 == 0 {
            return Err("dig_P1 is zero");
        }
        Ok(())
    }

    /// Returns `(t_fine, temperature in 0.01 °C)`.
    ///
    /// `t_fine` carries the fine temperature into pressure and humidity compensation.
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        let t1 = self.dig_t1 as i32;
        let t2 = self.dig_t2 as i32;
        let t3 = self.dig_t3 as i32;

        let var1 = ((adc_t >> 3).wrapping_sub(t1 << 1)).wrapping_mul(t2) >> 11;
        let delta = (adc_t >> 4).wrapping_sub(t1);
        let var2 = ((delta.wrapping_mul(delta) >> 12).wrapping_mul(t3)) >> 14;
        let t_fine = var1.wrapping_add(var2);

        (t_fine, t_fine.wrapping_mul(5).wrapping_add(128) >> 8)
    }

    /// Pressure in Pa as unsigned Q24.8 (divide by 256 for Pa).
    ///
    /// Returns `None` when the coefficients make the divisor zero.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> Option<u32> {
        let p1 = self.dig_p1 as i64;
        let p2 = self.dig_p2 as i64;
        let p3 = self.dig_p3 as i64;
        let p4 = self.dig_p4 as i64;
        let p5 = self.dig_p5 as i64;
        let p6 = self.dig_p6 as i64;
        let p7 = self.dig_p7 as i64;
        let p8 = self.dig_p8 as i64;
        let p9 = self.dig_p9 as i64;

        let mut var1 = t_fine as i64 - 128_000;
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
        var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
        var2 = var2.wrapping_add(p4 << 35);
        var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8)
            .wrapping_add(var1.wrapping_mul(p2) << 12);
        var1 = (1i64 << 47).wrapping_add(var1).wrapping_mul(p1) >> 33;
        if var1 == 0 {
            return None;
        }

        let mut p = 1_048_576 - adc_p as i64;
        p = (p << 31).wrapping_sub(var2).wrapping_mul(3125) / var1;
        var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
        var2 = p8.wrapping_mul(p) >> 19;
        p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add(p7 << 4);

        Some(p as u32)
    }
}
