//! Conversion formulas shared by the Sensirion humidity sensors.

/// Temperature in °C from a 16-bit raw word (SHT2x datasheet linear formula).
pub fn linear_temperature(raw: u16) -> f32 {
    -46.85 + 175.72 * raw as f32 / 65536.0
}

/// Relative humidity in % from a 16-bit raw word, before clamping.
pub fn linear_humidity(raw: u16) -> f32 {
    -6.0 + 125.0 * raw as f32 / 65536.0
}

/// Clamps a relative humidity to the physical range 0..=100 %.
pub fn clamp_humidity(rh: f32) -> f32 {
    rh.clamp(0.0, 100.0)
}

/// Converts °C to °F.
pub fn fahrenheit(celsius: f32) -> f32 {
    celsius * 1.8 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.005
    }

    #[test]
    fn test_linear_limits() {
        assert!(close(linear_temperature(0x0000), -46.85));
        assert!(close(linear_temperature(0xFFFF), 128.87));
        assert!(close(linear_humidity(0x0000), -6.0));
        assert!(close(linear_humidity(0xFFFF), 118.998));
    }

    #[test]
    fn test_clamp_humidity() {
        assert_eq!(clamp_humidity(-6.0), 0.0);
        assert_eq!(clamp_humidity(125.0), 100.0);
        assert_eq!(clamp_humidity(42.0), 42.0);
    }

    #[test]
    fn test_fahrenheit() {
        assert!(close(fahrenheit(100.0), 212.0));
        assert!(close(fahrenheit(-40.0), -40.0));
    }
}
