//! Data size units
//!
//! Memory is normalized to megabytes, storage to gigabytes. Units are binary
//! (1 GB = 1024 MB), matching how providers size machine memory.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUnit {
    B,
    KB,
    MB,
    GB,
    TB,
    PB,
}

impl DataUnit {
    /// Power of 1024 relative to one byte
    fn exponent(self) -> i32 {
        match self {
            DataUnit::B => 0,
            DataUnit::KB => 1,
            DataUnit::MB => 2,
            DataUnit::GB => 3,
            DataUnit::TB => 4,
            DataUnit::PB => 5,
        }
    }

    pub fn convert(self, value: f64, target: DataUnit) -> f64 {
        value * 1024f64.powi(self.exponent() - target.exponent())
    }

    pub fn to_megabytes(self, value: f64) -> f64 {
        self.convert(value, DataUnit::MB)
    }

    pub fn to_gigabytes(self, value: f64) -> f64 {
        self.convert(value, DataUnit::GB)
    }
}

impl FromStr for DataUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b" | "byte" | "bytes" => Ok(DataUnit::B),
            "kb" | "kib" => Ok(DataUnit::KB),
            "mb" | "mib" => Ok(DataUnit::MB),
            "gb" | "gib" => Ok(DataUnit::GB),
            "tb" | "tib" => Ok(DataUnit::TB),
            "pb" | "pib" => Ok(DataUnit::PB),
            other => Err(format!("unknown data unit '{}'", other)),
        }
    }
}

impl fmt::Display for DataUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataUnit::B => "B",
            DataUnit::KB => "KB",
            DataUnit::MB => "MB",
            DataUnit::GB => "GB",
            DataUnit::TB => "TB",
            DataUnit::PB => "PB",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("GB".parse::<DataUnit>(), Ok(DataUnit::GB));
        assert_eq!("gb".parse::<DataUnit>(), Ok(DataUnit::GB));
        assert_eq!(" Tb ".parse::<DataUnit>(), Ok(DataUnit::TB));
        assert!("furlong".parse::<DataUnit>().is_err());
        assert!("".parse::<DataUnit>().is_err());
    }

    #[test]
    fn test_memory_conversion() {
        assert_eq!(DataUnit::GB.to_megabytes(3.75), 3840.0);
        assert_eq!(DataUnit::TB.to_megabytes(1.0), 1024.0 * 1024.0);
        assert_eq!(DataUnit::KB.to_megabytes(2048.0), 2.0);
        assert_eq!(DataUnit::MB.to_megabytes(512.0), 512.0);
    }

    #[test]
    fn test_storage_conversion() {
        assert_eq!(DataUnit::GB.to_gigabytes(100.0), 100.0);
        assert_eq!(DataUnit::TB.to_gigabytes(2.0), 2048.0);
        assert_eq!(DataUnit::MB.to_gigabytes(512.0), 0.5);
    }
}
