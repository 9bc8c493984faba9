//! Settings common to every service.
//!
//! Values come from an optional `configuration.{toml,yaml,json}` file in the
//! working directory, overridden by `APP__*` environment variables
//! (`APP__PORT=9000`).

use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::load_from("configuration")
    }

    /// Load from the named file (extension optional, may be absent) plus the
    /// `APP__` environment.
    pub fn load_from(file_name: &str) -> Result<Self, AppError> {
        let config = Cfg::builder()
            .add_source(File::with_name(file_name).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
