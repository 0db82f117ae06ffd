use crate::{env_optional, env_parse, ConfigError, FromEnv};

/// Default number of candidates returned by interactive lookups
pub const DEFAULT_LOOKUP_LIMIT: usize = 10;

/// Default RAM adjusted rate of new quotes, in percent
pub const DEFAULT_RAM_ADJUSTED_RATE: u32 = 100;

/// Accepted RAM adjusted rates, in percent
pub const RAM_ADJUSTED_RATE_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

/// Costing configuration shared by the quote service
#[derive(Clone, Debug, PartialEq)]
pub struct CostingConfig {
    /// Result cap of interactive lookups
    pub lookup_limit: usize,
    /// RAM adjusted rate applied to new quotes
    pub default_ram_adjusted_rate: u32,
    /// License applied to new quotes that do not set one
    pub default_license: Option<String>,
}

impl FromEnv for CostingConfig {
    /// Reads from environment variables with sensible defaults:
    /// - LOOKUP_LIMIT: defaults to 10, must be positive
    /// - DEFAULT_RAM_ADJUSTED_RATE: defaults to 100, within 1..=1000
    /// - DEFAULT_LICENSE: optional
    fn from_env() -> Result<Self, ConfigError> {
        let lookup_limit = env_parse("LOOKUP_LIMIT", DEFAULT_LOOKUP_LIMIT)?;
        if lookup_limit == 0 {
            return Err(ConfigError::OutOfRange {
                key: "LOOKUP_LIMIT".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        let default_ram_adjusted_rate =
            env_parse("DEFAULT_RAM_ADJUSTED_RATE", DEFAULT_RAM_ADJUSTED_RATE)?;
        if !RAM_ADJUSTED_RATE_RANGE.contains(&default_ram_adjusted_rate) {
            return Err(ConfigError::OutOfRange {
                key: "DEFAULT_RAM_ADJUSTED_RATE".to_string(),
                details: format!(
                    "{} is not within {}..={}",
                    default_ram_adjusted_rate,
                    RAM_ADJUSTED_RATE_RANGE.start(),
                    RAM_ADJUSTED_RATE_RANGE.end()
                ),
            });
        }

        Ok(Self {
            lookup_limit,
            default_ram_adjusted_rate,
            default_license: env_optional("DEFAULT_LICENSE"),
        })
    }
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            lookup_limit: DEFAULT_LOOKUP_LIMIT,
            default_ram_adjusted_rate: DEFAULT_RAM_ADJUSTED_RATE,
            default_license: None,
        }
    }
}
