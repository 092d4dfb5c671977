//! Background tasks of the region service.

use alloc::sync::Arc;
use core::time::Duration;
use std::path::Path;

use futures::future;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument as _, debug, error, info};

use super::state::{ConfigTx, RackState, RackStatus};
use crate::{
    app::{AppState, WsTx, config_watcher::watch_config_file},
    discovery::RackClient as _,
    http::views::HostView,
    inventory::{InventoryRx, Tables},
    websocket::WsMessage,
};

const RACK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RACK_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Start all background tasks of the region service.
pub(super) fn start_background_tasks(state: &AppState, config_tx: &ConfigTx, config_path: &Path) {
    // Rack agent status polling
    {
        let state = state.clone();
        tokio::spawn(
            async move {
                poll_rack_statuses(state).await;
            }
            .in_current_span(),
        );
    }

    // Config file watcher
    {
        let path = config_path.to_path_buf();
        let config_tx = config_tx.clone();
        tokio::spawn(
            async move {
                watch_config_file(path, config_tx).await;
            }
            .in_current_span(),
        );
    }

    // Registers hosts for racks added to the config
    {
        let inventory = state.inventory.clone();
        let mut config_rx = state.config_rx.clone();
        tokio::spawn(
            async move {
                while config_rx.changed().await.is_ok() {
                    let config = config_rx.borrow_and_update().clone();
                    if let Err(e) = inventory
                        .ensure_rack_hosts(config.racks.keys().map(String::as_str))
                        .await
                    {
                        error!("Failed to register rack controllers from reloaded config: {e}");
                    }
                }
            }
            .in_current_span(),
        );
    }

    // Forwards host status changes to the websocket client loops
    {
        let inventory_rx = state.inventory.subscribe();
        let ws_tx = state.ws_tx.clone();
        tokio::spawn(
            async move {
                broadcast_host_updates(inventory_rx, ws_tx).await;
            }
            .in_current_span(),
        );
    }

    // Forwards rack status changes to the websocket client loops
    {
        let ws_tx = state.ws_tx.clone();
        let mut rackstatus_rx = state.rackstatus_tx.subscribe();
        tokio::spawn(
            async move {
                while rackstatus_rx.changed().await.is_ok() {
                    let msg = WsMessage::RackStatus(rackstatus_rx.borrow().as_ref().clone());
                    if ws_tx.send(msg).is_err() {
                        debug!("No Websocket Subscribers");
                    }
                }
            }
            .in_current_span(),
        );
    }
}

/// Hosts that are new in `new` or whose status or owner differs from `prev`.
fn changed_hosts(prev: &Tables, new: &Tables) -> Vec<HostView> {
    new.hosts
        .values()
        .filter(|host| {
            prev.hosts
                .get(&host.id)
                .is_none_or(|old| old.status != host.status || old.owner != host.owner)
        })
        .map(HostView::from)
        .collect()
}

/// Background task: sends a `host_status` event for every host whose status changed.
async fn broadcast_host_updates(mut inventory_rx: InventoryRx, ws_tx: WsTx) {
    let mut prev: Arc<Tables> = inventory_rx.borrow_and_update().clone();

    while inventory_rx.changed().await.is_ok() {
        let new: Arc<Tables> = inventory_rx.borrow_and_update().clone();
        for host in changed_hosts(&prev, &new) {
            if ws_tx.send(WsMessage::HostStatus(host)).is_err() {
                debug!("No Websocket Subscribers");
            }
        }
        prev = new;
    }
}

/// Background task: periodically asks every configured rack agent for its status.
async fn poll_rack_statuses(state: AppState) {
    let mut ticker = interval(RACK_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let agents = state.config_rx.borrow().rack_agents();
        let client = state.rack_client;

        let polls = agents.iter().map(|agent| async move {
            let polled = match client.status(agent, RACK_POLL_TIMEOUT).await {
                Ok(()) => RackState::Online,
                Err(e) => {
                    debug!("Rack agent {} at {}:{} is offline: {e}", agent.name, agent.ip, agent.port);
                    RackState::Offline
                }
            };
            (agent.name.clone(), polled)
        });
        let new_status: RackStatus = future::join_all(polls).await.into_iter().collect();

        if **state.rackstatus_tx.borrow() == new_status {
            debug!("No change in rack status");
        } else {
            info!("Rack status changed: {:?}", new_status);
            if state.rackstatus_tx.send(Arc::new(new_status)).is_err() {
                debug!("Rack status receiver dropped, stopping polling");
                break;
            }
        }

        ticker.tick().await;
    }
}
