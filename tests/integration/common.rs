//! Common utilities for integration tests.
//!
//! Spawning the binaries, managing ports, and waiting for services to be ready.

use std::{
    path::Path,
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const VIEWER_TOKEN: &str = "viewer-token";

pub fn get_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .unwrap()
        .port()
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

/// Server section plus one admin and one read-only user, without persistence.
pub fn minimal_config(port: u16) -> String {
    format!(
        r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [users.root]
        token = "{ADMIN_TOKEN}"
        admin = true

        [users.viewer]
        token = "{VIEWER_TOKEN}"
        "#
    )
}

/// Writes `config_toml` to a temp file and spawns the region binary on it.
pub fn spawn_region_with_config(port: u16, config_toml: &str) -> Child {
    let tmp = std::env::temp_dir().join(format!("metalfleet_region_test_{port}.toml"));
    std::fs::write(&tmp, config_toml).expect("failed to write config");
    spawn_region_with_config_file(&tmp)
}

pub fn spawn_region_with_config_file(config_path: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_region"))
        .args(["region-service", "--config", config_path.to_str().unwrap()])
        .env("METALFLEET_INTEGRATION_TEST", "1")
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start region")
}

/// Spawns a rack agent answering from the given neighbour table.
pub fn spawn_rack_agent(port: u16, shared_secret: &str, neighbours: &str) -> Child {
    let table = std::env::temp_dir().join(format!("metalfleet_arp_{port}"));
    std::fs::write(
        &table,
        format!(
            "IP address       HW type     Flags       HW address            Mask     Device\n{neighbours}"
        ),
    )
    .expect("failed to write neighbour table");

    Command::new(env!("CARGO_BIN_EXE_rack_agent"))
        .args([
            "service",
            "--port",
            &port.to_string(),
            "--neighbours-file",
            table.to_str().unwrap(),
        ])
        .env("METALFLEET_SHARED_SECRET", shared_secret)
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start rack_agent")
}

/// Block until a TCP listener is accepting on `127.0.0.1:port` or timeout.
pub async fn wait_for_listening(port: u16, timeout_secs: u64) {
    let start = Instant::now();
    while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
        if start.elapsed() > Duration::from_secs(timeout_secs) {
            panic!("server did not start within timeout");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub fn api(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}/api{path}")
}

/// Thin client that sends every request with a bearer token.
pub struct RegionClient {
    pub port: u16,
    token: &'static str,
    http: Client,
}

impl RegionClient {
    pub fn new(port: u16, token: &'static str) -> Self {
        Self {
            port,
            token,
            http: Client::new(),
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(api(self.port, path)).bearer_auth(self.token)
    }

    pub fn post(&self, path: &str, body: &Value) -> RequestBuilder {
        self.http
            .post(api(self.port, path))
            .bearer_auth(self.token)
            .json(body)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.http.delete(api(self.port, path)).bearer_auth(self.token)
    }

    /// Sends `request` and returns status and JSON body (`Null` when empty).
    pub async fn send(request: RequestBuilder) -> (reqwest::StatusCode, Value) {
        let resp = request.send().await.expect("request failed");
        let status = resp.status();
        let text = resp.text().await.expect("body");
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).expect("json body")
        };
        (status, body)
    }

    /// Id of the host registered for `hostname`.
    pub async fn host_id(&self, hostname: &str) -> i64 {
        let (_, hosts) = Self::send(self.get("/hosts")).await;
        hosts
            .as_array()
            .unwrap()
            .iter()
            .find(|h| h["hostname"] == hostname)
            .unwrap_or_else(|| panic!("no host {hostname}"))["id"]
            .as_i64()
            .unwrap()
    }
}
