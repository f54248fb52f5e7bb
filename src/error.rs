//! Error taxonomy shared by every driver in the crate.

use thiserror_no_std::Error;

/// Errors reported by the drivers.
///
/// `E` is the error type of the underlying I2C bus. Bus failures are wrapped in
/// [`Error::Transport`] unmodified and are never retried inside a driver.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// The bus reported a NACK, timeout or arbitration loss
    #[error("I2C transport error: {0:?}")]
    Transport(E),

    /// A CRC byte sent by the chip did not match its data
    #[error("{device}: checksum mismatch (received {received:#04x}, computed {computed:#04x})")]
    Checksum {
        /// Device that produced the frame
        device: &'static str,
        /// CRC byte read from the bus
        received: u8,
        /// CRC computed over the received data
        computed: u8,
    },

    /// A measurement was requested before the calibration coefficients were read
    #[error("{device}: measurement requested before calibration")]
    NotCalibrated {
        /// Device that was used out of sequence
        device: &'static str,
    },

    /// Data was written before the initialization sequence was sent
    #[error("{device}: data write before initialization")]
    NotInitialized {
        /// Device that was used out of sequence
        device: &'static str,
    },

    /// A decoded value, or a requested coordinate, lies outside the documented range
    #[error("{device}: {quantity} out of range ({value})")]
    OutOfRange {
        /// Device that produced the value
        device: &'static str,
        /// Name of the offending quantity
        quantity: &'static str,
        /// The offending value
        value: f32,
    },

    /// The identification register holds an unexpected value
    #[error("{device}: unexpected chip id {found:#06x} (expected {expected:#06x})")]
    ChipId {
        /// Device that was probed
        device: &'static str,
        /// Identifier the driver expects
        expected: u16,
        /// Identifier read from the chip
        found: u16,
    },

    /// Trimming coefficients read from the chip are unusable
    #[error("{device}: invalid calibration data: {details}")]
    InvalidCalibration {
        /// Device that supplied the coefficients
        device: &'static str,
        /// What was wrong with them
        details: &'static str,
    },

    /// The requested address or configuration is not supported by the chip
    #[error("{device}: unsupported configuration: {details}")]
    InvalidConfiguration {
        /// Device being configured
        device: &'static str,
        /// What was rejected
        details: &'static str,
    },
}

/// Result type for driver operations
pub type Result<T, E> = core::result::Result<T, Error<E>>;

impl<E> Error<E> {
    /// Returns `true` if the error came from the bus rather than from decoding.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Rejects any address the named device does not answer on.
pub(crate) fn check_address<E>(
    device: &'static str,
    address: u8,
    allowed: &[u8],
) -> Result<(), E> {
    if allowed.contains(&address) {
        Ok(())
    } else {
        log::error!("{}: address {:#04x} not supported", device, address);
        Err(Error::InvalidConfiguration {
            device,
            details: "I2C address not supported by this chip",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;

    #[test]
    fn test_check_address() {
        assert!(check_address::<ErrorKind>("SHT3X", 0x44, &[0x44, 0x45]).is_ok());
        let err = check_address::<ErrorKind>("SHT3X", 0x40, &[0x44, 0x45]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfiguration {
                device: "SHT3X",
                ..
            }
        ));
    }

    #[test]
    fn test_display_messages() {
        let err: Error<ErrorKind> = Error::Checksum {
            device: "SHT3X",
            received: 0x92,
            computed: 0x93,
        };
        assert_eq!(
            err.to_string(),
            "SHT3X: checksum mismatch (received 0x92, computed 0x93)"
        );

        let err: Error<ErrorKind> = Error::Transport(ErrorKind::Other);
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "I2C transport error: Other");
    }
}
