//! Domain models for the netboot orchestration service.
//!
//! This module contains the core domain types that are independent
//! of any infrastructure concerns (SRP, DIP): no sockets, no filesystem,
//! no backend lookups — just the shapes spec §3 defines.

mod decision;
mod hardware;
mod pxe;
mod transaction;

pub use decision::{BootDecision, BootStage, PxeVendorOpts};
pub use hardware::{HardwareRecord, NetbootPolicy, Osie};
pub use pxe::PxeClientArch;
pub use transaction::DhcpTransaction;
