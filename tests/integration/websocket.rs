//! Integration tests for the websocket feed.

use std::time::Duration;

use futures_util::StreamExt as _;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Message, client::IntoClientRequest as _, http::HeaderValue},
};

use crate::common::{
    ADMIN_TOKEN, KillOnDrop, RegionClient, get_free_port, minimal_config,
    spawn_region_with_config, wait_for_listening,
};

#[tokio::test]
async fn websocket_streams_host_changes() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;

    let mut request = format!("ws://127.0.0.1:{port}/ws")
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {ADMIN_TOKEN}")).unwrap(),
    );
    let (ws_stream, _) = connect_async(request)
        .await
        .expect("failed to connect websocket");
    let (_write, mut read) = ws_stream.split();

    let initial: Value = serde_json::from_str(&read.next().await.unwrap().unwrap().to_string()).unwrap();
    assert_eq!(initial["type"], "initial");
    assert_eq!(initial["payload"]["hosts"], json!([]));

    let admin = RegionClient::new(port, ADMIN_TOKEN);
    let (status, _) = RegionClient::send(admin.post("/hosts", &json!({"hostname": "ws-node"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let update = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = read.next().await {
            if let Message::Text(text) = msg.unwrap() {
                let msg: Value = serde_json::from_str(&text).unwrap();
                if msg["type"] == "host_status" {
                    return msg;
                }
            }
        }
        panic!("websocket closed");
    })
    .await
    .expect("no host_status message");
    assert_eq!(update["payload"]["hostname"], "ws-node");
    assert_eq!(update["payload"]["status_name"], "NEW");
}

#[tokio::test]
async fn websocket_requires_a_known_token() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;

    let err = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect_err("anonymous upgrade must fail");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => {
            assert_eq!(resp.status().as_u16(), 403);
        }
        other => panic!("unexpected error: {other}"),
    }
}
