//! Error types for the netboot orchestration service.
//!
//! Using thiserror for ergonomic error definitions, one enum per module
//! boundary, composed into a single top-level [`AppError`].

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from a [`crate::backend::BackendReader`] implementation.
///
/// A "not found" lookup is not an error — callers get `Ok(None)`. Only
/// transport or parse failures against the backing store land here.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend returned malformed record for {mac}: {message}")]
    MalformedRecord { mac: String, message: String },
}

/// Errors from decoding a raw DHCPv4 packet off the wire.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("missing or invalid DHCP magic cookie")]
    InvalidMagicCookie,

    #[error("invalid option at offset {offset}: {message}")]
    InvalidOption { offset: usize, message: String },
}

/// Errors raised while classifying a DHCP transaction into a [`crate::dhcp::BootDecision`].
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("packet carries no DHCP message type option")]
    MissingMessageType,

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("packet parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors from the iPXE binary/script serving layer.
#[derive(Error, Debug)]
pub enum IpxeError {
    #[error("unknown iPXE artifact: {0}")]
    UnknownArtifact(String),

    #[error("patch fragment ({patch_len} bytes) exceeds reserved region ({region_len} bytes)")]
    PatchTooLarge { patch_len: usize, region_len: usize },

    #[error("no patch marker found in base image for {0}")]
    MarkerNotFound(String),

    #[error("malformed MAC address in request path: {0}")]
    InvalidMac(String),
}

/// Errors from the TFTP transport.
#[derive(Error, Debug)]
pub enum TftpError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("session timed out waiting for ack of block {0}")]
    Timeout(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while parsing the trusted-proxy CIDR allowlist.
#[derive(Error, Debug)]
pub enum ProxyConfigError {
    #[error("unparseable CIDR or IP address entry: {0}")]
    InvalidCidr(String),
}

/// Configuration-time errors, fatal at startup per the error-handling taxonomy.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error in {path:?} at line {line}: {message}")]
    ParseError {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid bind address {addr:?}: {source}")]
    InvalidBindAddr {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("trusted-proxy configuration error: {0}")]
    TrustedProxy(#[from] ProxyConfigError),

    #[error("both a YAML-file and a cluster-inventory backend were enabled; exactly one is required")]
    ConflictingBackends,

    #[error("ipForPacket {0} is not assigned to any local interface")]
    SourceIpUnavailable(IpAddr),
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("packet parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("ipxe error: {0}")]
    Ipxe(#[from] IpxeError),

    #[error("tftp error: {0}")]
    Tftp(#[from] TftpError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener failed: {0}")]
    Listener(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
