//! HTTP route handlers (spec §4.B, §4.C, §4.F, §6).
//!
//! Generalized from `routes::boot::handle_boot`'s shape (extract → look up
//! → render → respond) and `routes::mod::create_router`'s middleware
//! layering, retargeted at iPXE binaries/scripts instead of cloud-init
//! autoinstall payloads.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::backend::with_deadline;
use crate::http::state::HttpState;
use crate::http::trusted_proxy::resolve_client_ip;
use crate::ipxe;
use crate::utils::parse_mac;

const BACKEND_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct PatchQuery {
    /// Inline iPXE commands to splice into the binary's reserved patch
    /// region, base64-encoded (spec §4.B "Patching").
    patch: Option<String>,
}

/// `GET /ipxe/{file}` (spec §4.B, §6).
pub async fn handle_ipxe_binary(
    State(state): State<HttpState>,
    Path(file): Path<String>,
    Query(query): Query<PatchQuery>,
) -> Response {
    let patch = match query.patch.as_deref().map(decode_patch) {
        Some(Ok(bytes)) => bytes,
        Some(Err(_)) => return StatusCode::BAD_REQUEST.into_response(),
        None => Vec::new(),
    };

    match state.images.serve(&file, &patch) {
        Ok(bytes) => ([("content-type", "application/octet-stream")], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn decode_patch(encoded: &str) -> Result<Vec<u8>, ()> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(encoded).map_err(|_| ())
}

/// `GET /{mac}/auto.ipxe` (spec §4.C).
pub async fn handle_script_with_mac(State(state): State<HttpState>, Path(mac): Path<String>) -> Response {
    let Some(mac) = parse_mac(&mac) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    render_script_for(&state, Lookup::Mac(mac)).await
}

/// `GET /auto.ipxe`, resolving the client by source IP (honoring
/// X-Forwarded-For only from a trusted peer) when MAC injection is off
/// (spec §4.C.1).
pub async fn handle_script_by_ip(
    State(state): State<HttpState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let forwarded_for = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let client_ip = resolve_client_ip(peer.ip(), forwarded_for, &state.trusted_proxies);
    let std::net::IpAddr::V4(client_ip) = client_ip else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    render_script_for(&state, Lookup::Ip(client_ip)).await
}

enum Lookup {
    Mac(macaddr::MacAddr6),
    Ip(std::net::Ipv4Addr),
}

async fn render_script_for(state: &HttpState, lookup: Lookup) -> Response {
    let record = match lookup {
        Lookup::Mac(mac) => with_deadline(BACKEND_DEADLINE, state.backend.get_by_mac(mac)).await,
        Lookup::Ip(ip) => with_deadline(BACKEND_DEADLINE, state.backend.get_by_ip(ip)).await,
    };

    let record = match record {
        Ok(Some(record)) => record,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    if !record.netboot.allow_pxe {
        return StatusCode::FORBIDDEN.into_response();
    }

    match ipxe::render_script(&record, &state.script_config) {
        Ok(body) => ([("content-type", "text/plain; charset=utf-8")], body).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct Healthcheck {
    git_rev: &'static str,
    uptime_seconds: u64,
}

/// `GET /healthcheck` (spec §4.F, §6): unconditional, unauthenticated.
pub async fn handle_healthcheck(State(state): State<HttpState>) -> Json<Healthcheck> {
    Json(Healthcheck {
        git_rev: option_env!("GIT_REV").unwrap_or("unknown"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// `GET /metrics` (spec §4.F, §6): a stub Prometheus text-exposition
/// endpoint. Metric *registration* is out of scope; the route exists so
/// a scraper pointed at this service gets a well-formed empty response
/// instead of a 404.
pub async fn handle_metrics() -> Response {
    ([("content-type", "text/plain; version=0.0.4")], "").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_patch_rejects_invalid_base64() {
        assert!(decode_patch("not valid base64!!").is_err());
    }

    #[test]
    fn decode_patch_accepts_valid_base64() {
        assert_eq!(decode_patch("aXB4ZQ==").unwrap(), b"ipxe");
    }
}
