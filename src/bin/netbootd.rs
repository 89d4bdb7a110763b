//! netbootd - network boot orchestration daemon.
//!
//! Wires the DHCP/proxyDHCP, TFTP, HTTP, and syslog listeners to a shared
//! cancellation token: any one of them failing cancels the rest (spec §5).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use netboots::backend::memory::MemoryBackend;
use netboots::backend::BackendReader;
use netboots::config::Config;
use netboots::dhcp::decide::DecisionConfig;
use netboots::dhcp::server::DhcpServer;
use netboots::http::state::HttpState;
use netboots::ipxe::{IpxeImageSet, ScriptConfig};
use netboots::syslog::SyslogServer;
use netboots::tftp::TftpServer;

#[derive(Parser, Debug)]
#[command(name = "netbootd")]
#[command(about = "Network boot orchestration daemon: DHCP, TFTP and HTTP boot serving")]
struct Args {
    /// Path to the config file (key=value, `#`-commented).
    #[arg(short, long, default_value = "/etc/netbootd.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                format!("netboots={}", config.tracing_filter()).parse().unwrap(),
            ),
        )
        .init();

    run(config).await.context("netbootd exiting")
}

/// Load every regular file in `dir` into an [`IpxeImageSet`], keyed by
/// filename (spec §4.B "loaded once at startup, immutable after load").
/// With no directory configured, returns an empty set — `/ipxe/{file}`
/// requests and TFTP RRQs then hit the documented unknown-artifact
/// failure path rather than silently serving nothing useful.
fn load_ipxe_images(dir: Option<&std::path::Path>) -> Result<IpxeImageSet, netboots::error::AppError> {
    let mut images = IpxeImageSet::new();
    let Some(dir) = dir else {
        return Ok(images);
    };

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let bytes = std::fs::read(entry.path())?;
        tracing::info!("loaded ipxe image {filename} ({} bytes)", bytes.len());
        images = images.with_image(filename, bytes);
    }

    Ok(images)
}

async fn run(config: Config) -> Result<(), netboots::error::AppError> {
    let shutdown = CancellationToken::new();

    let backend: Arc<dyn BackendReader> = Arc::new(MemoryBackend::new());
    let images = Arc::new(load_ipxe_images(config.ipxe_image_dir.as_deref())?);

    let mut tasks = tokio::task::JoinSet::new();

    if config.dhcp.enabled {
        let decision_config = DecisionConfig {
            server_ip: config.dhcp.server_ip,
            http_base_url: config.dhcp.http_base_url.clone(),
            mac_injection: config.dhcp.mac_injection,
            uefi_artifact: config.dhcp.uefi_artifact.clone(),
            syslog_ip: config.dhcp.syslog_ip,
        };
        let server = DhcpServer::bind(config.dhcp.bind_iface.as_deref(), decision_config, backend.clone())?;
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            server.run(shutdown).await
        });
    }

    if config.tftp.enabled {
        let server = TftpServer::bind(config.tftp.bind_addr, images.clone()).await?;
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            server.run(shutdown).await.map_err(netboots::error::AppError::from)
        });
    }

    if config.http.enabled {
        let trusted_proxies = Arc::new(config.trusted_proxy_set()?);
        let script_config = Arc::new(ScriptConfig {
            osie_base_url: config.http.osie_base_url.clone(),
            syslog_host: config.http.syslog_host.clone(),
            tinkerbell_url: config.http.tinkerbell_url.clone(),
            extra_kernel_args: config.http.extra_kernel_args.clone(),
        });
        let state = HttpState {
            backend: backend.clone(),
            images: images.clone(),
            script_config,
            trusted_proxies,
            mac_injection: config.dhcp.mac_injection,
            started_at: std::time::Instant::now(),
        };
        let router = netboots::http::create_router(state);
        let bind_addr = config.http.bind_addr;
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let listener = tokio::net::TcpListener::bind(bind_addr)
                .await
                .map_err(netboots::error::AppError::from)?;
            axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(netboots::error::AppError::from)
        });
    }

    if config.syslog.enabled {
        let server = SyslogServer::bind(config.syslog.bind_addr).await?;
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            server.run(shutdown).await
        });
    }

    let ctrl_c = shutdown.clone();
    tasks.spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received interrupt signal, shutting down");
        ctrl_c.cancel();
        Ok(())
    });

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => {
                tracing::error!("listener failed: {e}");
                shutdown.cancel();
                return Err(e);
            }
            Err(e) => {
                tracing::error!("listener task panicked: {e}");
                shutdown.cancel();
                return Err(netboots::error::AppError::Listener(e.to_string()));
            }
        }
    }

    Ok(())
}
