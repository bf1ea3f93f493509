//! Frame checksum algorithms
//!
//! Every layout appends one checksum byte computed over all bytes that
//! precede it in the frame.

use crc::{Crc, CRC_8_SMBUS};
use serde::{Deserialize, Serialize};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Checksum algorithm of a frame layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    /// Writes 0x00 and skips validation (legacy network peers)
    None,
    /// Low 8 bits of the byte sum (serial firmware)
    Sum8,
    /// CRC-8/SMBUS, polynomial 0x07
    #[default]
    Crc8,
}

impl Checksum {
    /// Compute the checksum byte over `data`
    pub fn compute(self, data: &[u8]) -> u8 {
        match self {
            Self::None => 0,
            Self::Sum8 => data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)),
            Self::Crc8 => CRC8.checksum(data),
        }
    }

    /// Whether decoders must compare the received byte
    pub fn is_validated(self) -> bool {
        !matches!(self, Self::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum8_wraps() {
        assert_eq!(Checksum::Sum8.compute(&[0xFF, 0x02]), 0x01);
        assert_eq!(Checksum::Sum8.compute(&[]), 0x00);
    }

    #[test]
    fn test_crc8_check_value() {
        // CRC-8/SMBUS check value over "123456789"
        assert_eq!(Checksum::Crc8.compute(b"123456789"), 0xF4);
    }

    #[test]
    fn test_none_is_zero_and_unvalidated() {
        assert_eq!(Checksum::None.compute(&[1, 2, 3]), 0);
        assert!(!Checksum::None.is_validated());
        assert!(Checksum::Sum8.is_validated());
    }

    #[test]
    fn test_checksum_toml_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            checksum: Checksum,
        }

        let w: Wrapper = toml::from_str("checksum = \"sum8\"").unwrap();
        assert_eq!(w.checksum, Checksum::Sum8);
        let w: Wrapper = toml::from_str("checksum = \"none\"").unwrap();
        assert_eq!(w.checksum, Checksum::None);
        let s = toml::to_string(&Wrapper {
            checksum: Checksum::Crc8,
        })
        .unwrap();
        assert!(s.contains("checksum = \"crc8\""));
    }
}
