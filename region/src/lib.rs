//! Fake library entry for the region crate.
//!
//! Exposes `inner_main` so the workspace-level binary can start the region service.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod address_space;
pub mod app;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hosts;
pub mod http;
pub mod inventory;
pub mod ipam;
pub mod lifecycle;
pub mod model;
pub mod permission;
pub mod subnets;
pub mod websocket;

// for use in integration tests
pub use websocket::WsMessage;

use std::{env, fs, process, sync::Once};

use eyre::{Result, WrapErr as _};
#[cfg(unix)]
use nix::sys::stat;
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

static INIT_TRACING: Once = Once::new();

fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("METALFLEET_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The region's main function; called from the `region` binary.
///
/// # Errors
///
/// Returns an error if the config file is missing or invalid, the database
/// can't be opened, or the server fails to bind.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::RegionService(args) => {
            // The database holds the inventory; keep it private to the service user.
            #[cfg(unix)]
            stat::umask(stat::Mode::S_IRWXU.complement());

            let config = &args.config;
            let config_path =
                fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

            init_tracing(args.log_format);

            let startup_span = tracing::info_span!("region.startup", ?config_path, pid = ?process::id(), version = env!("CARGO_PKG_VERSION"));
            let _startup_enter = startup_span.enter();

            info!("Starting region");

            app::start(&config_path, args.port, args.bind.as_deref())
                .in_current_span()
                .await
        }
    }
}
