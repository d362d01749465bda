//! Construction parameters of a [`SplitOrderedMap`](crate::SplitOrderedMap).

use core::fmt;

/// Upper bound (exclusive) on `expected_max_entries`.
pub const MAX_EXPECTED_ENTRIES: u64 = 1 << 31;

/// Sizing of a split-ordered map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of entries the map is sized for. Bounds the bucket directory.
    pub expected_max_entries: u64,
    /// Average entries per bucket above which the bucket count doubles.
    pub load_factor: u64,
}

impl Config {
    /// Default sizing: a million entries, four per bucket.
    pub const DEFAULT: Config = Config {
        expected_max_entries: 1 << 20,
        load_factor: 4,
    };

    /// Creates a config from its two parameters.
    pub const fn new(expected_max_entries: u64, load_factor: u64) -> Self {
        Self {
            expected_max_entries,
            load_factor,
        }
    }

    /// Check `0 < expected_max_entries < 2^31` and
    /// `0 < load_factor <= expected_max_entries`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_max_entries == 0 {
            return Err(ConfigError::ZeroEntries);
        }
        if self.expected_max_entries >= MAX_EXPECTED_ENTRIES {
            return Err(ConfigError::TooManyEntries {
                expected_max_entries: self.expected_max_entries,
            });
        }
        if self.load_factor == 0 {
            return Err(ConfigError::ZeroLoadFactor);
        }
        if self.load_factor > self.expected_max_entries {
            return Err(ConfigError::LoadFactorTooLarge {
                load_factor: self.load_factor,
                expected_max_entries: self.expected_max_entries,
            });
        }
        Ok(())
    }

    /// Largest bucket count the map will grow to: entries per load factor,
    /// rounded up to a power of two.
    pub fn max_bucket_count(&self) -> u32 {
        let buckets = (self.expected_max_entries / self.load_factor).max(1);
        buckets.next_power_of_two().min(MAX_EXPECTED_ENTRIES) as u32
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Rejected construction parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `expected_max_entries` is zero
    ZeroEntries,
    /// `expected_max_entries` does not fit below the reserved key range
    TooManyEntries {
        /// The rejected value
        expected_max_entries: u64,
    },
    /// `load_factor` is zero
    ZeroLoadFactor,
    /// `load_factor` exceeds `expected_max_entries`
    LoadFactorTooLarge {
        /// The rejected value
        load_factor: u64,
        /// The entry count it was checked against
        expected_max_entries: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroEntries => write!(f, "expected_max_entries must be positive"),
            ConfigError::TooManyEntries {
                expected_max_entries,
            } => write!(
                f,
                "expected_max_entries {} must be below {}",
                expected_max_entries, MAX_EXPECTED_ENTRIES
            ),
            ConfigError::ZeroLoadFactor => write!(f, "load_factor must be positive"),
            ConfigError::LoadFactorTooLarge {
                load_factor,
                expected_max_entries,
            } => write!(
                f,
                "load_factor {} exceeds expected_max_entries {}",
                load_factor, expected_max_entries
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
        assert_eq!(Config::default().max_bucket_count(), 1 << 18);
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert_eq!(Config::new(0, 1).validate(), Err(ConfigError::ZeroEntries));
        assert_eq!(
            Config::new(1 << 31, 1).validate(),
            Err(ConfigError::TooManyEntries {
                expected_max_entries: 1 << 31
            })
        );
        assert_eq!(Config::new(10, 0).validate(), Err(ConfigError::ZeroLoadFactor));
        assert_eq!(
            Config::new(10, 11).validate(),
            Err(ConfigError::LoadFactorTooLarge {
                load_factor: 11,
                expected_max_entries: 10
            })
        );
        assert_eq!(Config::new(10, 10).validate(), Ok(()));
    }

    #[test]
    fn max_bucket_count_rounds_up() {
        assert_eq!(Config::new(0x10_0000, 4).max_bucket_count(), 0x4_0000);
        assert_eq!(Config::new(100, 3).max_bucket_count(), 64);
        assert_eq!(Config::new(7, 7).max_bucket_count(), 1);
        assert_eq!(Config::new((1 << 31) - 1, 1).max_bucket_count(), 1 << 31);
    }

    #[test]
    fn errors_render_their_parameters() {
        let err = Config::new(10, 11).validate().unwrap_err();
        assert_eq!(err.to_string(), "load_factor 11 exceeds expected_max_entries 10");
    }
}
