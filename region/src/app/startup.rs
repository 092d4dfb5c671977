use core::net::{IpAddr, SocketAddr};
use std::path::Path;

use eyre::WrapErr as _;
use tokio::{net, signal};
use tracing::info;

use crate::{
    app::{AppState, state::initialize_state},
    http::router,
};

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::error!("Failed to create SIGTERM signal handler, only reacting to Ctrl-C: {e}");
                drop(signal::ctrl_c().await);
            }
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Serves the API until shutdown.
async fn start_server(app_state: AppState, listen_ip: IpAddr, listen_port: u16) -> eyre::Result<()> {
    let app = router::create_app(app_state);

    let addr = SocketAddr::from((listen_ip, listen_port));
    let listener = net::TcpListener::bind(addr)
        .await
        .wrap_err(format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        res = server => res.wrap_err("HTTP server failed")?,
        () = shutdown_signal() => {
            info!("Received shutdown, shutting down");
        }
    }

    Ok(())
}

/// Starts the region service and runs it until termination.
///
/// # Errors
///
/// Returns an error if the configuration or inventory can't be loaded, or the
/// server can't bind.
pub(crate) async fn start(
    config_path: &Path,
    port_override: Option<u16>,
    bind_override: Option<&str>,
) -> eyre::Result<()> {
    info!("Starting region service...");

    let app_state = initialize_state(config_path).await?;

    let listen_port = port_override.unwrap_or(app_state.config_rx.borrow().server.port);
    let bind_str = bind_override.map_or_else(
        || app_state.config_rx.borrow().server.bind.clone(),
        ToString::to_string,
    );

    let listen_ip: IpAddr = bind_str
        .parse()
        .wrap_err(format!("Invalid bind address: {bind_str}"))?;

    start_server(app_state, listen_ip, listen_port).await
}
