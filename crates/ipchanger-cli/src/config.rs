//! Configuration loading

use anyhow::{Context, Result};
use ipchanger_core::Ipv4Cidr;
use ipchanger_discovery::ScannerConfig;
use ipchanger_onvif::{EngineOptions, MutationShape, QueryTimeouts};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub onvif: OnvifConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub reconfigure: ReconfigureConfig,
    #[serde(default)]
    pub mappings: MappingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_username")]
    pub username: String,
    /// Prefer `--password` or `IPCHANGER_PASSWORD` over storing it here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: None,
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnvifConfig {
    /// Device-service port
    #[serde(default = "default_onvif_port")]
    pub port: u16,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_mutation_timeout")]
    pub mutation_timeout_secs: u64,
}

impl Default for OnvifConfig {
    fn default() -> Self {
        Self {
            port: default_onvif_port(),
            query_timeout_secs: default_query_timeout(),
            mutation_timeout_secs: default_mutation_timeout(),
        }
    }
}

fn default_onvif_port() -> u16 {
    80
}

fn default_query_timeout() -> u64 {
    10
}

fn default_mutation_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Range to scan; the first local interface network when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Ipv4Cidr>,
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            network: None,
            ports: default_ports(),
            parallelism: default_parallelism(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

fn default_ports() -> Vec<u16> {
    vec![80, 8080, 8081, 554, 8554]
}

fn default_parallelism() -> usize {
    50
}

fn default_probe_timeout() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconfigureConfig {
    /// Gateway used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_token: Option<String>,
    #[serde(default = "default_dhcp_settle")]
    pub dhcp_settle_secs: u64,
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_interval")]
    pub verify_interval_ms: u64,
    #[serde(default = "default_old_probe_timeout")]
    pub old_probe_timeout_ms: u64,
    #[serde(default = "default_new_probe_timeout")]
    pub new_probe_timeout_ms: u64,
    /// Body layout of the single fallback request
    #[serde(default)]
    pub alternate_shape: MutationShape,
}

impl Default for ReconfigureConfig {
    fn default() -> Self {
        Self {
            gateway: None,
            prefix_length: default_prefix_length(),
            interface_token: None,
            dhcp_settle_secs: default_dhcp_settle(),
            settle_secs: default_settle(),
            verify_attempts: default_verify_attempts(),
            verify_interval_ms: default_verify_interval(),
            old_probe_timeout_ms: default_old_probe_timeout(),
            new_probe_timeout_ms: default_new_probe_timeout(),
            alternate_shape: MutationShape::default(),
        }
    }
}

fn default_prefix_length() -> u8 {
    24
}

fn default_dhcp_settle() -> u64 {
    2
}

fn default_settle() -> u64 {
    5
}

fn default_verify_attempts() -> u32 {
    10
}

fn default_verify_interval() -> u64 {
    1000
}

fn default_old_probe_timeout() -> u64 {
    3000
}

fn default_new_probe_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingsConfig {
    /// JSON file receiving confirmed address changes
    #[serde(default = "default_mappings_path")]
    pub path: PathBuf,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            path: default_mappings_path(),
        }
    }
}

fn default_mappings_path() -> PathBuf {
    PathBuf::from("ip_mappings.json")
}

impl Config {
    pub fn query_timeouts(&self) -> QueryTimeouts {
        QueryTimeouts {
            query: Duration::from_secs(self.onvif.query_timeout_secs),
            mutation: Duration::from_secs(self.onvif.mutation_timeout_secs),
        }
    }

    /// Convert to EngineOptions
    pub fn to_engine_options(&self) -> EngineOptions {
        let r = &self.reconfigure;
        EngineOptions {
            port: self.onvif.port,
            timeouts: self.query_timeouts(),
            dhcp_settle: Duration::from_secs(r.dhcp_settle_secs),
            settle: Duration::from_secs(r.settle_secs),
            verify_attempts: r.verify_attempts,
            verify_interval: Duration::from_millis(r.verify_interval_ms),
            old_probe_timeout: Duration::from_millis(r.old_probe_timeout_ms),
            new_probe_timeout: Duration::from_millis(r.new_probe_timeout_ms),
            alternate_shape: r.alternate_shape,
        }
    }

    /// Convert to ScannerConfig
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            ports: self.discovery.ports.clone(),
            parallelism: self.discovery.parallelism,
            probe_timeout_ms: self.discovery.probe_timeout_ms,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file. Never contains a password.
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        discovery: DiscoveryConfig {
            network: "192.168.1.0/24".parse().ok(),
            ..Default::default()
        },
        ..Default::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("ipchanger.toml")).unwrap();
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.onvif.port, 80);
        assert_eq!(config.discovery.ports, vec![80, 8080, 8081, 554, 8554]);
        assert_eq!(config.reconfigure.prefix_length, 24);
        assert!(config.discovery.network.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ipchanger.toml");
        std::fs::write(
            &path,
            r#"
[discovery]
network = "10.0.0.0/24"
parallelism = 8

[reconfigure]
gateway = "10.0.0.254"
alternate_shape = "link_negotiated"
settle_secs = 9
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.discovery.network, "10.0.0.0/24".parse().ok());
        assert_eq!(config.discovery.parallelism, 8);
        assert_eq!(config.discovery.probe_timeout_ms, 1000);
        assert_eq!(config.reconfigure.gateway, Some(Ipv4Addr::new(10, 0, 0, 254)));

        let options = config.to_engine_options();
        assert_eq!(options.alternate_shape, MutationShape::LinkNegotiated);
        assert_eq!(options.settle, Duration::from_secs(9));
        assert_eq!(options.verify_attempts, 10);
        assert_eq!(config.to_scanner_config().parallelism, 8);
    }

    #[test]
    fn test_invalid_network_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ipchanger.toml");
        std::fs::write(&path, "[discovery]\nnetwork = \"10.0.0.0\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_default_config_round_trips_without_password() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ipchanger.toml");
        save_default_config(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("password"));

        let config = load_config(&path).unwrap();
        assert_eq!(config.discovery.network, "192.168.1.0/24".parse().ok());
        assert_eq!(config.mappings.path, PathBuf::from("ip_mappings.json"));
    }
}
