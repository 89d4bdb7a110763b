//! [`BackendReader`]: the narrow capability the decision engine, the HTTP
//! script renderer, and nothing else depend on (spec §4.A, §9).
//!
//! Two very different concrete stores (a YAML file, a cluster inventory
//! API) must look identical from here — neither is implemented in this
//! crate (spec §1 Non-goals); only the contract and an in-memory test
//! double are. This mirrors the narrow-trait, dependency-inversion shape
//! this codebase already uses for `PacketCapture`/`EventReporter`.

pub mod memory;

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use macaddr::MacAddr6;

use crate::domain::HardwareRecord;
use crate::error::BackendError;

/// Lookup hardware by MAC or IP. Implementations must be safe for
/// concurrent callers (spec §5) and must honor the deadline the caller
/// wraps the call in — it timing out should produce [`BackendError::Timeout`]
/// rather than hanging.
///
/// A "not found" result (`Ok(None)`) is a distinct, non-error outcome;
/// only transport or parse failures are `Err` (spec §4.A).
#[async_trait]
pub trait BackendReader: Send + Sync {
    async fn get_by_mac(&self, mac: MacAddr6) -> Result<Option<HardwareRecord>, BackendError>;

    async fn get_by_ip(&self, ip: Ipv4Addr) -> Result<Option<HardwareRecord>, BackendError>;
}

/// Wrap a backend call with the deadline spec §4.A requires, translating a
/// timeout into [`BackendError::Timeout`] rather than propagating
/// `tokio::time::error::Elapsed`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, BackendError>
where
    F: std::future::Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(BackendError::Timeout),
    }
}
