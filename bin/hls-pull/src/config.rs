use std::path::Path;

use hls_source::HlsOptions;
use serde::{Deserialize, Serialize};

/// Settings read from a TOML file. Command line flags take precedence.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub headers: Vec<String>,
    pub cookies: Option<String>,
    pub hls: HlsOptions,
}

impl Config {
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(file)?;
        let config = toml::from_str(&data)?;
        Ok(config)
    }
}
