//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)

mod common;
mod inventory;
mod scan;
mod websocket;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt as _;

use common::{KillOnDrop, api, get_free_port, minimal_config, spawn_region_with_config, wait_for_listening};
use reqwest::StatusCode;

#[tokio::test]
async fn region_config_loads() {
    let port = get_free_port();
    let child = spawn_region_with_config(port, &minimal_config(port));
    let mut drop_guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;
    drop(drop_guard.0.kill());
    let status = drop_guard.0.wait().expect("failed to wait on child");
    #[cfg(unix)]
    assert!(
        status.success() || status.signal() == Some(9),
        "Process did not start or exit as expected"
    );
    #[cfg(not(unix))]
    assert!(status.success(), "Process did not start or exit as expected");
}

#[tokio::test]
async fn unknown_routes_answer_with_json_not_found() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;

    let resp = reqwest::Client::new()
        .get(api(port, "/nope"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers().contains_key("x-request-id"), "request id is propagated");
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["error"], "not_found");
}
