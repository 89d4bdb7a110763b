//! In-memory [`BackendReader`] used by the decision-engine and HTTP script
//! tests. Not a real inventory backend — those are out of scope (spec §1)
//! — just a fixture, the same role `tempfile::TempDir`-backed fixtures
//! play for `services::hardware::HardwareService` tests elsewhere in this
//! codebase's history.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use async_trait::async_trait;
use macaddr::MacAddr6;

use crate::backend::BackendReader;
use crate::domain::HardwareRecord;
use crate::error::BackendError;

#[derive(Default)]
pub struct MemoryBackend {
    by_mac: RwLock<HashMap<MacAddr6, HardwareRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: HardwareRecord) {
        self.by_mac.write().unwrap().insert(record.mac, record);
    }

    pub fn with_record(self, record: HardwareRecord) -> Self {
        self.insert(record);
        self
    }
}

#[async_trait]
impl BackendReader for MemoryBackend {
    async fn get_by_mac(&self, mac: MacAddr6) -> Result<Option<HardwareRecord>, BackendError> {
        Ok(self.by_mac.read().unwrap().get(&mac).cloned())
    }

    async fn get_by_ip(&self, ip: Ipv4Addr) -> Result<Option<HardwareRecord>, BackendError> {
        Ok(self.by_mac.read().unwrap().values().find(|r| r.ip == ip).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_by_mac_hits_and_misses() {
        let mac = MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01);
        let backend = MemoryBackend::new()
            .with_record(HardwareRecord::new(mac, Ipv4Addr::new(10, 0, 0, 10)));

        assert!(backend.get_by_mac(mac).await.unwrap().is_some());
        assert!(backend
            .get_by_mac(MacAddr6::new(0, 0, 0, 0, 0, 0))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lookup_by_ip_hits_and_misses() {
        let mac = MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01);
        let ip = Ipv4Addr::new(10, 0, 0, 10);
        let backend = MemoryBackend::new().with_record(HardwareRecord::new(mac, ip));

        assert!(backend.get_by_ip(ip).await.unwrap().is_some());
        assert!(backend
            .get_by_ip(Ipv4Addr::new(10, 0, 0, 99))
            .await
            .unwrap()
            .is_none());
    }
}
