//! Network boot orchestration service.
//!
//! Chain-loads PXE clients through firmware PXE, iPXE, and iPXE's HTTP
//! stack by watching DHCP option 77 flip to "iPXE"/"Tinkerbell" — a
//! stateless decision engine with no session state held across requests.
//!
//! # Architecture
//!
//! - `domain`: core business types (hardware records, boot decisions, PXE
//!   client classification, DHCP transactions)
//! - `backend`: narrow `BackendReader` trait for hardware-record lookups,
//!   plus an in-memory reference implementation
//! - `dhcp`: the DHCPv4/proxyDHCP wire codec, the pure decision engine, and
//!   the async UDP/67 server loop
//! - `ipxe`: iPXE binary patch-splicing and iPXE script rendering
//! - `tftp`: single-port TFTP/69 transport for iPXE binaries
//! - `http`: axum router serving iPXE binaries/scripts over HTTP, plus the
//!   trusted-proxy client-IP resolver and healthcheck endpoint
//! - `syslog`: UDP/514 collector forwarding client log lines into `tracing`
//! - `config`: configuration surface and reloadable application state
//! - `error`: per-module error enums composed into a single [`error::AppError`]
//! - `utils`: small shared helpers (MAC/host parsing)
//!
//! Dependency Inversion throughout: the DHCP server and HTTP routes depend
//! on `backend::BackendReader`, never on a concrete store.

pub mod backend;
pub mod config;
pub mod dhcp;
pub mod domain;
pub mod error;
pub mod http;
pub mod ipxe;
pub mod syslog;
pub mod tftp;
pub mod utils;
