//! Axum router assembly (spec §4.F), generalized from
//! `routes::mod::create_router`'s route table + logging-middleware shape.

use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;

use crate::http::routes::{handle_healthcheck, handle_ipxe_binary, handle_metrics, handle_script_by_ip, handle_script_with_mac};
use crate::http::state::HttpState;

async fn request_logging(ConnectInfo(addr): ConnectInfo<SocketAddr>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let status = response.status();
    tracing::info!("{} {} {} - {}", addr.ip(), method, uri, status.as_u16());

    response
}

pub fn create_router(state: HttpState) -> Router {
    let mac_routes = Router::new().route("/{mac}/auto.ipxe", get(handle_script_with_mac));
    let ip_routes = Router::new().route("/auto.ipxe", get(handle_script_by_ip));

    let router = if state.mac_injection { mac_routes } else { ip_routes };

    router
        .route("/ipxe/{file}", get(handle_ipxe_binary))
        .route("/healthcheck", get(handle_healthcheck))
        .route("/metrics", get(handle_metrics))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
