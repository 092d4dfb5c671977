//! Live feed for dashboards: host status changes, rack agent reachability and
//! completed discovery scans.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    app::{AppState, RackStatus},
    discovery::ScanSummary,
    http::{auth::Caller, views::HostView},
    permission::{Action, Target, authorize},
};

#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WsMessage {
    /// Sent once per connection to bootstrap the client.
    Initial {
        hosts: Vec<HostView>,
        racks: RackStatus,
    },
    /// A host was created or changed status or owner.
    HostStatus(HostView),
    /// Rack agent reachability changed.
    RackStatus(RackStatus),
    ScanCompleted(ScanSummary),
}

/// Gets called for every new client and spins up an event loop.
///
/// Requires the same read access as the inventory endpoints.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Response {
    if let Err(e) = authorize(principal.as_ref(), Action::ReadInventory, &Target::Inventory) {
        return e.into_response();
    }

    let initial = WsMessage::Initial {
        hosts: state
            .inventory
            .snapshot()
            .hosts
            .values()
            .map(HostView::from)
            .collect(),
        racks: state.rackstatus_rx.borrow().as_ref().clone(),
    };
    let rx = state.ws_tx.subscribe();
    ws.on_upgrade(move |socket| start_ws_loop(socket, rx, initial))
}

async fn send_ws_message(socket: &mut WebSocket, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to serialize websocket message: {}", e);
            Err(axum::Error::new(e))
        }
    }
}

/// One event loop per client.
async fn start_ws_loop(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<WsMessage>,
    initial: WsMessage,
) {
    if let Err(e) = send_ws_message(&mut socket, &initial).await {
        warn!("Failed to send initial state: {}", e);
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(msg) => {
                        if let Err(e) = send_ws_message(&mut socket, &msg).await {
                            warn!("Failed to send message, closing connection: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged behind, {skipped} message(s) dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Broadcast channel closed, stopping WebSocket handler");
                        break;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(Message::Close(_))) => {
                        info!("WebSocket connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket receive error, closing: {e}");
                        break;
                    }
                    // Clients have nothing to say.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::app::RackState;

    #[test]
    fn messages_are_tagged_in_snake_case() {
        let msg = WsMessage::RackStatus(RackStatus::from([("rack1".to_owned(), RackState::Online)]));
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({"type": "rack_status", "payload": {"rack1": "online"}})
        );
    }
}
