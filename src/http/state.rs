//! Shared state the HTTP router's handlers read from (spec §4.B, §4.C, §4.F).

use std::sync::Arc;
use std::time::Instant;

use crate::backend::BackendReader;
use crate::http::trusted_proxy::TrustedProxySet;
use crate::ipxe::{IpxeImageSet, ScriptConfig};

#[derive(Clone)]
pub struct HttpState {
    pub backend: Arc<dyn BackendReader>,
    pub images: Arc<IpxeImageSet>,
    pub script_config: Arc<ScriptConfig>,
    pub trusted_proxies: Arc<TrustedProxySet>,
    /// Splice the client MAC into the script path rather than resolving
    /// by source IP (spec §4.C.1).
    pub mac_injection: bool,
    pub started_at: Instant,
}
