//! Active discovery scans dispatched to real rack agent processes.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::common::{
    ADMIN_TOKEN, KillOnDrop, RegionClient, get_free_port, minimal_config, spawn_rack_agent,
    spawn_region_with_config, wait_for_listening,
};

const SECRET: &str = "rack-secret";

fn config_with_racks(port: u16, racks: &[(&str, u16)]) -> String {
    let mut config = minimal_config(port);
    config.push_str("\n[scan]\nagent_timeout_ms = 1000\nscan_timeout_ms = 3000\n");
    for &(name, rack_port) in racks {
        config.push_str(&format!(
            "\n[racks.{name}]\nip = \"127.0.0.1\"\nport = {rack_port}\nshared_secret = \"{SECRET}\"\n"
        ));
    }
    config
}

/// Creates `cidr` and links each named rack controller to it.
async fn subnet_served_by(admin: &RegionClient, cidr: &str, racks: &[&str]) -> i64 {
    let (status, subnet) =
        RegionClient::send(admin.post("/subnets", &json!({"cidr": cidr}))).await;
    assert_eq!(status, StatusCode::CREATED, "{subnet}");
    let subnet_id = subnet["id"].as_i64().unwrap();
    for &rack in racks {
        let host_id = admin.host_id(rack).await;
        let (status, body) = RegionClient::send(admin.post(
            "/interfaces",
            &json!({"name": "eth0", "host_id": host_id, "subnet_id": subnet_id, "link_up": true}),
        ))
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
    subnet_id
}

#[tokio::test]
async fn scan_merges_agents_and_reports_the_silent_one() {
    let port = get_free_port();
    let good_port = get_free_port();
    let silent_port = get_free_port();

    // Accepts connections but never answers.
    let silent = std::net::TcpListener::bind(("127.0.0.1", silent_port)).unwrap();

    let _agent = KillOnDrop(spawn_rack_agent(
        good_port,
        SECRET,
        "10.20.0.5        0x1         0x2         52:54:00:AA:BB:01     *        eth0\n\
         10.99.0.5        0x1         0x2         52:54:00:AA:BB:02     *        eth0\n",
    ));
    wait_for_listening(good_port, 5).await;

    let _guard = KillOnDrop(spawn_region_with_config(
        port,
        &config_with_racks(port, &[("rack-good", good_port), ("rack-silent", silent_port)]),
    ));
    wait_for_listening(port, 5).await;
    let admin = RegionClient::new(port, ADMIN_TOKEN);
    let subnet_id = subnet_served_by(&admin, "10.20.0.0/24", &["rack-good", "rack-silent"]).await;

    let started = Instant::now();
    let (status, summary) =
        RegionClient::send(admin.post(&format!("/subnets/{subnet_id}/scan"), &Value::Null)).await;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert!(started.elapsed() < Duration::from_secs(10), "bounded by the scan timeout");
    drop(silent);

    assert_eq!(summary["scan_started_on"], json!(["rack-good"]));
    assert_eq!(
        summary["scan_failed_on"],
        json!([{"rack": "rack-silent", "reason": "unreachable"}])
    );
    let found = &summary["discoveries"]["10.20.0.0/24"];
    assert_eq!(found.as_array().unwrap().len(), 1, "{summary}");
    assert_eq!(found[0]["mac"], "52:54:00:aa:bb:01");
    assert!(
        summary["result"].as_str().unwrap().contains("1 of 2"),
        "{}",
        summary["result"]
    );

    let (_, audit) = RegionClient::send(admin.get("/audit")).await;
    assert!(
        audit
            .as_array()
            .unwrap()
            .iter()
            .any(|entry| entry["action"] == "scan" && entry["cidr"] == "10.20.0.0/24"),
        "{audit}"
    );
}

#[tokio::test]
async fn scans_that_cannot_run_are_rejected() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(
        port,
        &config_with_racks(port, &[("rack1", get_free_port())]),
    ));
    wait_for_listening(port, 5).await;
    let admin = RegionClient::new(port, ADMIN_TOKEN);

    let v6 = subnet_served_by(&admin, "fd00::/64", &["rack1"]).await;
    let (status, body) =
        RegionClient::send(admin.post(&format!("/subnets/{v6}/scan"), &Value::Null)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_family");

    let orphan = subnet_served_by(&admin, "10.30.0.0/24", &[]).await;
    let (status, body) =
        RegionClient::send(admin.post(&format!("/subnets/{orphan}/scan"), &Value::Null)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_agent_available");

    let (_, audit) = RegionClient::send(admin.get("/audit")).await;
    assert_eq!(audit, json!([]), "rejected scans leave no audit entry");
}
