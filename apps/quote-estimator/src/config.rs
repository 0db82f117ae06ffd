//! Configuration for the quote estimator

use std::path::PathBuf;

use core_config::{ConfigError, CostingConfig, Environment, FromEnv, env_optional, env_required};

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// JSON snapshot of the provider catalog
    pub catalog_path: PathBuf,
    /// Location of requests that do not name one; the first location of
    /// the catalog when unset
    pub default_location: Option<String>,
    pub costing: CostingConfig,
}

impl FromEnv for Config {
    /// Reads from environment variables:
    /// - CATALOG_PATH: required
    /// - DEFAULT_LOCATION: optional
    /// - costing settings, see [`CostingConfig`]
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            catalog_path: PathBuf::from(env_required("CATALOG_PATH")?),
            default_location: env_optional("DEFAULT_LOCATION"),
            costing: CostingConfig::from_env()?,
        })
    }
}
