//! Reloading the config file when it changes on disk.

use alloc::sync::Arc;
use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr as _};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use super::state::{ConfigRx, ConfigTx};
use crate::config::{self, RegionConfig};

/// The config that takes effect when `new_config` is read while `prev` is live.
///
/// Only `[racks]` and `[users]` are taken over.
fn effective_config(prev: &RegionConfig, new_config: &RegionConfig) -> RegionConfig {
    RegionConfig {
        racks: new_config.racks.clone(),
        users: new_config.users.clone(),
        ..prev.clone()
    }
}

/// Loads the changed file and publishes whatever part of it can be applied live.
async fn process_config_change(path: &Path, tx: &ConfigTx, rx: &ConfigRx) -> Result<()> {
    info!("Config file modified. Reloading...");
    let prev = rx.borrow().clone();
    let new_config = config::load(path)
        .await
        .wrap_err(format!("Failed to reload config at: {}", path.display()))?;
    let effective = effective_config(&prev, &new_config);

    let uneffective_change = effective != new_config;
    let racks_changed = new_config.racks != prev.racks;
    let users_changed = new_config.users != prev.users;

    if uneffective_change {
        warn!(
            "Detected change outside of [racks] and [users] during runtime. Such changes require a restart and will be ignored."
        );
    }

    if racks_changed || users_changed {
        tx.send(Arc::new(effective))
            .wrap_err("Failed to send updated config through watch channel")?;
        info!("Applied racks/users changes from config file.");
    } else if uneffective_change {
        info!("No applicable (racks/users) changes detected; ignoring unsupported updates.");
    } else {
        info!("No changes detected in config.");
    }
    Ok(())
}

/// Watches the config file's directory and reloads on changes to the file.
///
/// Returns early, logging why, if the watcher can't be set up.
pub(super) async fn watch_config_file(path: PathBuf, tx: ConfigTx) {
    let (Some(dir), Some(config_filename)) = (path.parent(), path.file_name()) else {
        error!("Config path {} has no parent directory or file name; not watching it", path.display());
        return;
    };

    let (raw_tx, mut raw_rx) = unbounded_channel::<Event>();
    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res
                && raw_tx.send(event).is_err()
            {
                error!("Failed to send event to config watcher channel");
            }
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!(?e, "Failed to create file watcher; config changes won't be picked up");
            return;
        }
    };
    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        error!(?e, "Failed to watch config directory {}", dir.display());
        return;
    }

    let rx = tx.subscribe();

    while let Some(event) = raw_rx.recv().await {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            continue;
        }
        // Editors and atomic writes touch the file through temp names and renames,
        // so compare exactly, canonically, and finally by file name.
        let matches_config = event.paths.iter().any(|event_path| {
            if event_path == &path {
                return true;
            }
            if let (Ok(canonical_event), Ok(canonical_config)) =
                (fs::canonicalize(event_path), fs::canonicalize(&path))
                && canonical_event == canonical_config
            {
                return true;
            }
            event_path.file_name() == Some(config_filename)
        });

        if matches_config && let Err(e) = process_config_change(&path, &tx, &rx).await {
            // A half-written file is common mid-save; the next event retries.
            error!(?e, "Failed to process config change");
        }
    }
}
