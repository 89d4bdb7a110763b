//! Configuration surface for the network boot orchestrator (spec §6).
//!
//! Each subsystem (DHCP, TFTP, the iPXE/script HTTP server, syslog) has its
//! own `enabled` flag, bind address, and knobs, plus a handful of
//! orchestrator-wide settings (backend selector, trusted proxies, workflow
//! server). Keeps the teacher's `Config::load`/`Config::parse`/`AppState`
//! shape: a plain key=value file layered under CLI flags, reloadable at
//! runtime behind an `RwLock`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::ConfigError;
use crate::http::TrustedProxySet;

/// DHCP/proxyDHCP listener configuration (spec §4.D/§4.E).
#[derive(Debug, Clone)]
pub struct DhcpConfig {
    pub enabled: bool,
    pub bind_iface: Option<String>,
    pub server_ip: Ipv4Addr,
    pub http_base_url: String,
    pub mac_injection: bool,
    pub uefi_artifact: String,
    /// Option 7 log server (spec §3, §6), unset by default.
    pub syslog_ip: Option<Ipv4Addr>,
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_iface: None,
            server_ip: Ipv4Addr::UNSPECIFIED,
            http_base_url: String::from("http://127.0.0.1:8080"),
            mac_injection: true,
            uefi_artifact: String::from("ipxe.efi"),
            syslog_ip: None,
        }
    }
}

/// TFTP transport configuration (spec §4.B, §9 single-port mode).
#[derive(Debug, Clone)]
pub struct TftpConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub block_size: usize,
    pub block_timeout_secs: u64,
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 69)),
            block_size: crate::tftp::DEFAULT_BLOCK_SIZE,
            block_timeout_secs: 5,
        }
    }
}

/// HTTP server configuration: iPXE binary serving, script rendering, and
/// the healthcheck endpoint (spec §4.B, §4.C, §4.F).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub osie_base_url: String,
    pub syslog_host: Option<String>,
    pub tinkerbell_url: Option<String>,
    pub extra_kernel_args: Vec<String>,
    pub trusted_proxies: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            osie_base_url: String::from("http://127.0.0.1:8080/osie"),
            syslog_host: None,
            tinkerbell_url: None,
            extra_kernel_args: Vec::new(),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Syslog collector configuration (spec §6).
#[derive(Debug, Clone)]
pub struct SyslogConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 514)),
        }
    }
}

/// Which inventory store backs hardware-record lookups. No concrete
/// network-backed implementation ships here (spec §4.A Non-goals); the
/// selector exists so a config file can still name its intended target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelector {
    Memory,
    YamlFile(PathBuf),
    ClusterInventory(String),
}

impl Default for BackendSelector {
    fn default() -> Self {
        BackendSelector::Memory
    }
}

/// Log level, reused verbatim from the single-binary PXE listener this
/// crate grew out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(()),
        }
    }
}

/// Top-level application configuration, assembled from a config file and
/// overridden by CLI flags in `main`.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub log_level: LogLevel,
    pub backend: BackendSelector,
    pub dhcp: DhcpConfig,
    pub tftp: TftpConfig,
    pub http: HttpConfig,
    pub syslog: SyslogConfig,
    /// Directory of precompiled iPXE NBP binaries (`undionly.kpxe`,
    /// `ipxe.efi`, `snp.efi`, ...) loaded once at startup into the shared
    /// `IpxeImageSet` served over both TFTP and HTTP (spec §4.B).
    pub ipxe_image_dir: Option<PathBuf>,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl Config {
    /// Load configuration from file. Missing file falls back to defaults,
    /// matching the single-binary listener's forgiving startup behavior.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse a `key=value`, `#`-commented config file into a [`Config`].
    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let (mut saw_yaml_file, mut saw_cluster_inventory) = (false, false);

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = parse_key_value(line).ok_or_else(|| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: line_num + 1,
                message: format!("invalid line format: {line}"),
            })?;

            match key {
                "backend.yaml_file" => saw_yaml_file = true,
                "backend.cluster_inventory" => saw_cluster_inventory = true,
                _ => {}
            }

            apply_key(&mut config, key, value, path, line_num + 1)?;
        }

        if saw_yaml_file && saw_cluster_inventory {
            return Err(ConfigError::ConflictingBackends);
        }

        Ok(config)
    }

    /// Resolve the trusted-proxy CIDR allowlist from its string form.
    pub fn trusted_proxy_set(&self) -> Result<TrustedProxySet, ConfigError> {
        TrustedProxySet::parse(&self.http.trusted_proxies).map_err(ConfigError::from)
    }

    /// Tracing `EnvFilter` directive string for this log level.
    pub fn tracing_filter(&self) -> &'static str {
        match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

fn apply_key(
    config: &mut Config,
    key: &str,
    value: &str,
    path: &Path,
    line: usize,
) -> Result<(), ConfigError> {
    let err = |message: String| ConfigError::ParseError { path: path.to_path_buf(), line, message };

    match key {
        "log_level" => config.log_level = LogLevel::from_str(value).map_err(|_| err(format!("invalid log level: {value}")))?,
        "backend" => config.backend = BackendSelector::Memory,
        "backend.yaml_file" => config.backend = BackendSelector::YamlFile(PathBuf::from(value)),
        "backend.cluster_inventory" => config.backend = BackendSelector::ClusterInventory(value.to_string()),

        "dhcp.enabled" => config.dhcp.enabled = parse_bool(value).map_err(|_| err(format!("invalid bool: {value}")))?,
        "dhcp.bind_iface" => config.dhcp.bind_iface = Some(value.to_string()),
        "dhcp.server_ip" => config.dhcp.server_ip = Ipv4Addr::from_str(value).map_err(|_| err(format!("invalid ipv4 address: {value}")))?,
        "dhcp.http_base_url" => config.dhcp.http_base_url = value.to_string(),
        "dhcp.mac_injection" => config.dhcp.mac_injection = parse_bool(value).map_err(|_| err(format!("invalid bool: {value}")))?,
        "dhcp.uefi_artifact" => config.dhcp.uefi_artifact = value.to_string(),
        "dhcp.syslog_ip" => config.dhcp.syslog_ip = Some(Ipv4Addr::from_str(value).map_err(|_| err(format!("invalid ipv4 address: {value}")))?),

        "tftp.enabled" => config.tftp.enabled = parse_bool(value).map_err(|_| err(format!("invalid bool: {value}")))?,
        "tftp.bind_addr" => config.tftp.bind_addr = SocketAddr::from_str(value).map_err(|_| err(format!("invalid socket address: {value}")))?,
        "tftp.block_size" => config.tftp.block_size = value.parse().map_err(|_| err(format!("invalid block size: {value}")))?,
        "tftp.block_timeout_secs" => config.tftp.block_timeout_secs = value.parse().map_err(|_| err(format!("invalid timeout: {value}")))?,

        "http.enabled" => config.http.enabled = parse_bool(value).map_err(|_| err(format!("invalid bool: {value}")))?,
        "http.bind_addr" => config.http.bind_addr = SocketAddr::from_str(value).map_err(|_| err(format!("invalid socket address: {value}")))?,
        "http.osie_base_url" => config.http.osie_base_url = value.to_string(),
        "http.syslog_host" => config.http.syslog_host = Some(value.to_string()),
        "http.tinkerbell_url" => config.http.tinkerbell_url = Some(value.to_string()),
        "http.extra_kernel_args" => config.http.extra_kernel_args = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect(),
        "http.trusted_proxies" => config.http.trusted_proxies = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect(),

        "syslog.enabled" => config.syslog.enabled = parse_bool(value).map_err(|_| err(format!("invalid bool: {value}")))?,
        "syslog.bind_addr" => config.syslog.bind_addr = SocketAddr::from_str(value).map_err(|_| err(format!("invalid socket address: {value}")))?,

        "ipxe.image_dir" => config.ipxe_image_dir = Some(PathBuf::from(value)),

        _ => tracing::warn!("unknown config key '{key}' at line {line}"),
    }

    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, ()> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(()),
    }
}

fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Shared, reloadable application configuration.
#[derive(Clone)]
pub struct AppState {
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
}

impl AppState {
    pub fn new(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Config::load(&config_path)?;
        Ok(Self { config: Arc::new(RwLock::new(config)), config_path })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn reload(&self) -> Result<(), ConfigError> {
        let new_config = Config::load(&self.config_path)?;
        *self.config.write().await = new_config;
        tracing::info!("configuration reloaded");
        Ok(())
    }
}
