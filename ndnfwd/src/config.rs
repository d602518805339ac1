use std::{fs, net::SocketAddr, path::Path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub forwarder: ForwarderSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub pid_file: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: "/var/run/ndnfwd.pid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
    /// Static routes installed at startup
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 6363,
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub next_hop: SocketAddr,
    #[serde(default)]
    pub cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// The `forwarder` section. Unrecognized keys are a fatal configuration
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderSection {
    /// Hop limit attached to Interests that carry none; 0 means "do not set"
    #[serde(default)]
    pub default_hop_limit: u8,
}

impl Default for ForwarderSection {
    fn default() -> Self {
        Self { default_hop_limit: 0 }
    }
}

impl Config {
    /// Load and validate a configuration file. A missing file yields the
    /// defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "network.bind_address is not an IP address: {}",
                self.network.bind_address
            )));
        }
        for route in &self.network.routes {
            if !route.prefix.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "route prefix must start with '/': {}",
                    route.prefix
                )));
            }
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn bind_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: std::net::IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid("bad bind address".to_string()))?;
        Ok(SocketAddr::new(ip, self.network.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.port, 6363);
        assert_eq!(config.forwarder.default_hop_limit, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [daemon]
            pid_file = "/tmp/ndnfwd.pid"

            [network]
            bind_address = "0.0.0.0"
            port = 6464

            [[network.routes]]
            prefix = "/a"
            next_hop = "127.0.0.1:6465"
            cost = 10

            [logging]
            level = "debug"

            [forwarder]
            default_hop_limit = 32
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.forwarder.default_hop_limit, 32);
        assert_eq!(config.network.routes.len(), 1);
        assert_eq!(config.network.routes[0].prefix, "/a");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unrecognized_forwarder_key_is_fatal() {
        let toml = r#"
            [forwarder]
            default_hop_limit = 1
            bogus_option = true
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_out_of_range_hop_limit_is_fatal() {
        let toml = r#"
            [forwarder]
            default_hop_limit = 300
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = Config::default();
        config.network.bind_address = "not-an-ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_route_prefix() {
        let toml = r#"
            [[network.routes]]
            prefix = "no-slash"
            next_hop = "127.0.0.1:6363"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
