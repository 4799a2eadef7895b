use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

const DEFAULT_CONFIG_PATH: &str = "/etc/pxe-proxy.conf";
const DEFAULT_DATA_DIR: &str = "/var/lib/pxe-proxy";
const DEFAULT_BIND_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
const DEFAULT_BIND_PORT: u16 = 4011;
const DEFAULT_OUT_PORT: u16 = 68;
const DEFAULT_EFI_OUT_PORT: u16 = 4011;
const DEFAULT_API_SERVER_ADDRESS: &str = "10.1.1.1";
const DEFAULT_API_SERVER_PORT: u16 = 80;
const DEFAULT_GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
const DEFAULT_USER_CLASS: &str = "MonoRail";
const DEFAULT_LEASE_POLL_SECS: u64 = 5;
const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix for environment overrides, e.g. `PXE_PROXY_BIND_PORT`.
const ENV_PREFIX: &str = "PXE_PROXY_";

/// Every recognized key; each can be overridden from the environment.
const KEYS: &[&str] = &[
    "bind_address",
    "bind_port",
    "out_port",
    "efi_out_port",
    "interface",
    "api_server_address",
    "api_server_port",
    "gateway",
    "send_boot_file_name_check",
    "user_class",
    "data_dir",
    "leases_file",
    "lease_poll_interval_secs",
    "log_filter",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the proxy listens on
    pub bind_address: Ipv4Addr,
    pub bind_port: u16,
    /// Reply port for legacy PXE ROMs and iPXE
    pub out_port: u16,
    /// Reply port for EFI firmware
    pub efi_out_port: u16,
    /// Bind to this interface only (Linux SO_BINDTODEVICE)
    pub interface: Option<String>,
    pub api_server_address: String,
    pub api_server_port: u16,
    /// Written to `siaddr`/`sname` of every ACK
    pub gateway: Ipv4Addr,
    /// Ask the node registry whether a boot file is needed before answering
    pub send_boot_file_name_check: bool,
    /// User class that gets the profiles URL
    pub user_class: String,
    pub data_dir: PathBuf,
    pub leases_file: PathBuf,
    pub lease_poll_interval: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            bind_port: DEFAULT_BIND_PORT,
            out_port: DEFAULT_OUT_PORT,
            efi_out_port: DEFAULT_EFI_OUT_PORT,
            interface: None,
            api_server_address: DEFAULT_API_SERVER_ADDRESS.to_string(),
            api_server_port: DEFAULT_API_SERVER_PORT,
            gateway: DEFAULT_GATEWAY,
            send_boot_file_name_check: true,
            user_class: DEFAULT_USER_CLASS.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            leases_file: default_leases_file(),
            lease_poll_interval: Duration::from_secs(DEFAULT_LEASE_POLL_SECS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Reads `path`, or `$PXE_PROXY_CONFIG`, or `/etc/pxe-proxy.conf`, then
    /// applies `PXE_PROXY_*` environment overrides. A missing default file
    /// means built-in defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(format!("{}CONFIG", ENV_PREFIX)).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::parse(&std::fs::read_to_string(path)?)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::parse(&std::fs::read_to_string(DEFAULT_CONFIG_PATH)?)?
            }
            None => Self::default(),
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Parse `key = value` lines on top of the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if KEYS.contains(&key) {
                    config.set(key, value.trim())?;
                } else {
                    warn!(key = %key, "Ignoring unknown configuration key");
                }
            }
        }

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        for key in KEYS {
            if let Ok(value) = std::env::var(format!("{}{}", ENV_PREFIX, key.to_uppercase())) {
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "bind_address" => self.bind_address = parse_value(key, value)?,
            "bind_port" => self.bind_port = parse_value(key, value)?,
            "out_port" => self.out_port = parse_value(key, value)?,
            "efi_out_port" => self.efi_out_port = parse_value(key, value)?,
            "interface" => {
                self.interface = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "api_server_address" => self.api_server_address = value.to_string(),
            "api_server_port" => self.api_server_port = parse_value(key, value)?,
            "gateway" => self.gateway = parse_value(key, value)?,
            "send_boot_file_name_check" => {
                self.send_boot_file_name_check = parse_bool(key, value)?
            }
            "user_class" => self.user_class = value.to_string(),
            "data_dir" => self.data_dir = PathBuf::from(value),
            "leases_file" => self.leases_file = PathBuf::from(value),
            "lease_poll_interval_secs" => {
                let secs: u64 = parse_value(key, value)?;
                if secs == 0 {
                    return Err(invalid(key, value));
                }
                self.lease_poll_interval = Duration::from_secs(secs);
            }
            "log_filter" => self.log_filter = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn tracing_filter(&self) -> &str {
        &self.log_filter
    }
}

/// Where ISC dhcpd keeps its leases on this platform.
pub fn default_leases_file() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/var/db/dhcpd.leases")
    } else {
        PathBuf::from("/var/lib/dhcp/dhcpd.leases")
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
