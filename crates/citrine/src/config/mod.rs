use error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub mod error;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Local address for the server, remote address for the client.
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    /// Constant-policy resend interval, milliseconds.
    pub timeout_ms: u64,
    /// Transmission attempts per datagram (first send + retries).
    pub send_try_count: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4000".to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            send_try_count: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.network.address).is_err() {
            return Err(ConfigError::Validation(format!(
                "invalid network address '{}', expected IP:PORT",
                self.network.address
            )));
        }

        if self.transport.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "transport timeout must be greater than 0".to_string(),
            ));
        }

        if self.transport.send_try_count == 0 {
            return Err(ConfigError::Validation(
                "send try count must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Pushes the transport tunables into the process-wide seqwire config.
    /// Out-of-range values are clamped there.
    pub fn apply_transport(&self) {
        seqwire::config::set_timeout(Duration::from_millis(self.transport.timeout_ms));
        seqwire::config::set_send_try_count(self.transport.send_try_count);
    }
}

/// Loads the configuration from `path`, writing the defaults there first if
/// no file exists yet.
pub fn handle(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        let config_content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_content = toml::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(config_content.as_bytes())?;
    Ok(())
}
