use alloc::sync::Arc;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use eyre::WrapErr as _;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::{
    address_space::StatisticsSettings,
    app::runtime::start_background_tasks,
    config::{DbConfig, RegionConfig, load, resolve_config_relative_paths},
    discovery::{ScanSettings, TcpRackClient},
    inventory::{DbPool, Inventory, db},
    websocket::WsMessage,
};

/// Whether a rack agent answered its last status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RackState {
    Online,
    Offline,
}

pub(crate) type ConfigRx = watch::Receiver<Arc<RegionConfig>>;
pub(super) type ConfigTx = watch::Sender<Arc<RegionConfig>>;
pub type RackStatus = BTreeMap<String, RackState>;
pub(crate) type RackStatusRx = watch::Receiver<Arc<RackStatus>>;
pub(crate) type RackStatusTx = watch::Sender<Arc<RackStatus>>;
pub(crate) type WsTx = broadcast::Sender<WsMessage>;

/// Application state shared across request handlers and background tasks.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Path to the configuration file, for reloads.
    pub config_path: PathBuf,

    /// Current effective config; only `[racks]` and `[users]` ever change.
    pub config_rx: ConfigRx,

    pub rackstatus_rx: RackStatusRx,
    pub rackstatus_tx: RackStatusTx,

    /// Broadcast sender for distributing WebSocket messages.
    pub ws_tx: WsTx,

    pub inventory: Arc<Inventory>,

    pub rack_client: TcpRackClient,
}

impl AppState {
    pub fn scan_settings(&self) -> ScanSettings {
        self.config_rx.borrow().scan.into()
    }

    pub fn statistics_settings(&self) -> StatisticsSettings {
        self.config_rx.borrow().statistics.into()
    }
}

/// Opens the database if one is configured and enabled.
#[tracing::instrument(skip_all)]
async fn initialize_database(
    initial_config: &RegionConfig,
    config_path: &Path,
) -> eyre::Result<Option<DbPool>> {
    Ok(match initial_config.db {
        Some(DbConfig {
            enable: true,
            ref path,
        }) => {
            let db_path = resolve_config_relative_paths(config_path, path);
            let pool = db::init(&db_path).await.wrap_err(format!(
                "Failed to initialize database at: {}",
                db_path.display()
            ))?;
            info!(
                "Database initialized at: {} (note: WAL mode creates .db-wal and .db-shm files alongside)",
                db_path.display()
            );
            Some(pool)
        }
        _ => {
            info!("DB persistence disabled");
            None
        }
    })
}

fn emit_startup_warnings(app_state: &AppState) {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt as _;
        if let Ok(metadata) = fs::metadata(&app_state.config_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "Config file permissions are too permissive (current: {mode:#o}). Run 'chmod 600 {}' to restrict access to owner only, it contains tokens and shared secrets.",
                    app_state.config_path.display()
                );
            }
        }
    }

    let config = app_state.config_rx.borrow();
    if !config.users.values().any(|u| u.admin) {
        warn!("No admin user configured; every administrative request will be denied.");
    }
    if config.racks.is_empty() {
        warn!("No rack agents configured; active discovery scans are unavailable.");
    }
}

/// Loads config and inventory, then starts background tasks.
#[tracing::instrument(skip_all)]
pub(super) async fn initialize_state(config_path: &Path) -> eyre::Result<AppState> {
    let initial_config = Arc::new(load(config_path).await?);

    let (config_tx, config_rx) = watch::channel(initial_config.clone());

    let (rackstatus_tx, rackstatus_rx) = watch::channel(Arc::new(RackStatus::new()));

    let (ws_tx, _) = broadcast::channel(32);

    let db_pool = initialize_database(&initial_config, config_path).await?;
    let persistent = db_pool.is_some();

    let inventory = Inventory::open(db_pool)
        .await
        .wrap_err("Failed to load inventory")?;
    if persistent {
        let tables = inventory.snapshot();
        info!(
            "Loaded {} host(s) and {} subnet(s) from database",
            tables.hosts.len(),
            tables.subnets.len()
        );
    }

    inventory
        .ensure_rack_hosts(initial_config.racks.keys().map(String::as_str))
        .await
        .wrap_err("Failed to register configured rack controllers")?;

    let app_state = AppState {
        config_path: config_path.to_path_buf(),
        config_rx,
        rackstatus_rx,
        rackstatus_tx,
        ws_tx,
        inventory,
        rack_client: TcpRackClient,
    };

    start_background_tasks(&app_state, &config_tx, config_path);

    emit_startup_warnings(&app_state);

    Ok(app_state)
}
