use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use zidaq::{ApiLevel, DEFAULT_PORT};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ApiLevel::try_from(self.server.api_level).map_err(|e| {
            ConfigError::Message(format!("Invalid server.api_level: {e}"))
        })?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_level: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// Serial of the device commands apply to, e.g. "dev2006".
    pub serial: Option<String>,
    /// Interface to connect the device over ("1GbE", "USB", ...).
    /// None lets the data server pick.
    pub interface: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            api_level: 6,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            interface: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    let mut config_file_found = false;

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
            config_file_found = true;
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        let possible_paths = ["node-tool.toml", "config.toml"];
        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                config_file_found = true;
                break;
            }
        }
    }

    if !config_file_found {
        builder = builder.add_source(Config::try_from(&AppConfig::default())?);
    }

    // Environment overrides, e.g. ZIDAQ__SERVER__HOST=10.0.0.5
    builder = builder.add_source(
        Environment::with_prefix("ZIDAQ")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let app_config = config.try_deserialize::<AppConfig>()?;
    app_config.validate()?;

    Ok(app_config)
}
