//! Subnet, host and address administration through the API.

use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    ADMIN_TOKEN, KillOnDrop, RegionClient, VIEWER_TOKEN, get_free_port, minimal_config,
    spawn_region_with_config, spawn_region_with_config_file, wait_for_listening,
};

#[tokio::test]
async fn subnet_statistics_follow_ranges_and_addresses() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;
    let admin = RegionClient::new(port, ADMIN_TOKEN);

    let (status, subnet) = RegionClient::send(admin.post(
        "/subnets",
        &json!({"cidr": "10.0.0.0/24", "gateway_ip": "10.0.0.1", "dns_servers": ["10.0.0.3", "10.0.0.2"]}),
    ))
    .await;
    assert_eq!(status, StatusCode::CREATED, "{subnet}");
    assert_eq!(subnet["name"], "10.0.0.0/24");
    assert_eq!(subnet["rdns_mode"], 2);
    assert_eq!(subnet["dns_servers"], "10.0.0.2 10.0.0.3");
    let id = subnet["id"].as_i64().unwrap();

    let (status, range) = RegionClient::send(admin.post(
        &format!("/subnets/{id}/ranges"),
        &json!({"start_ip": "10.0.0.100", "end_ip": "10.0.0.149", "type": "dynamic"}),
    ))
    .await;
    assert_eq!(status, StatusCode::CREATED, "{range}");

    let (status, record) = RegionClient::send(admin.post(
        "/addresses",
        &json!({"ip": "10.0.0.10", "alloc_type": "user_reserved"}),
    ))
    .await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    assert_eq!(record["alloc_type"], 4);

    let (status, stats) = RegionClient::send(admin.get(&format!(
        "/subnets/{id}/statistics?include_ranges=true&include_suggestions=true"
    )))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_addresses"], 256);
    assert_eq!(stats["num_dynamic"], 50);
    assert!(stats["ranges"].is_array(), "{stats}");

    let (status, detail) = RegionClient::send(admin.get(&format!("/subnets/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["ip_addresses"].as_array().unwrap().len(), 1);
    assert_eq!(detail["ip_ranges"].as_array().unwrap().len(), 1);

    let (status, _) = RegionClient::send(admin.delete("/addresses/10.0.0.10")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = RegionClient::send(admin.delete("/addresses/10.0.0.10")).await;
    assert_eq!(status, StatusCode::NO_CONTENT, "releasing twice is fine");
}

#[tokio::test]
async fn discovered_addresses_cannot_be_created_by_users() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;
    let admin = RegionClient::new(port, ADMIN_TOKEN);

    RegionClient::send(admin.post("/subnets", &json!({"cidr": "10.9.0.0/24"}))).await;
    let (status, body) = RegionClient::send(admin.post(
        "/addresses",
        &json!({"ip": "10.9.0.20", "alloc_type": "discovered"}),
    ))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden_origin");
}

#[tokio::test]
async fn non_admins_are_denied_uniformly() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;
    let viewer = RegionClient::new(port, VIEWER_TOKEN);

    for (status, body) in [
        RegionClient::send(viewer.post("/subnets", &json!({"cidr": "10.1.0.0/24"}))).await,
        RegionClient::send(viewer.post("/subnets", &json!({"cidr": "10.1.0.0/33"}))).await,
        RegionClient::send(viewer.delete("/subnets/999")).await,
        RegionClient::send(viewer.get("/audit")).await,
    ] {
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"error": "permission_denied", "message": "Permission denied."}));
    }

    let (status, _) = RegionClient::send(viewer.get("/subnets")).await;
    assert_eq!(status, StatusCode::OK, "reads are allowed");

    let (status, _) = RegionClient::send(
        reqwest::Client::new().get(crate::common::api(port, "/subnets")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "anonymous reads are not");
}

#[tokio::test]
async fn host_lifecycle_over_the_api() {
    let port = get_free_port();
    let _guard = KillOnDrop(spawn_region_with_config(port, &minimal_config(port)));
    wait_for_listening(port, 5).await;
    let admin = RegionClient::new(port, ADMIN_TOKEN);
    let viewer = RegionClient::new(port, VIEWER_TOKEN);

    let (status, host) =
        RegionClient::send(admin.post("/hosts", &json!({"hostname": "node01"}))).await;
    assert_eq!(status, StatusCode::CREATED, "{host}");
    assert_eq!(host["status_name"], "NEW");
    let id = host["id"].as_i64().unwrap();
    let path = format!("/hosts/{id}/transition");

    let (status, host) = RegionClient::send(viewer.post(&path, &json!({"event": "commission"}))).await;
    assert_eq!(status, StatusCode::OK, "{host}");
    assert_eq!(host["status"], 1);

    let (status, body) =
        RegionClient::send(viewer.post(&path, &json!({"event": "deploy"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, body) = RegionClient::send(viewer.post(
        &path,
        &json!({"event": "commission-succeeded", "expected_status": 4}),
    ))
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "stale expectation: {body}");

    RegionClient::send(viewer.post(&path, &json!({"event": "commission-succeeded"}))).await;
    let (status, host) = RegionClient::send(viewer.post(&path, &json!({"event": "allocate"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(host["status_name"], "ALLOCATED");
    assert_eq!(host["owner"], "viewer");

    let (status, _) = RegionClient::send(viewer.post(&path, &json!({"event": "mark-broken"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "overrides are admin only");
}

#[tokio::test]
async fn inventory_survives_a_restart() {
    let port = get_free_port();
    let dir = std::env::temp_dir().join(format!("metalfleet_persist_{port}"));
    std::fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("region.toml");
    std::fs::write(
        &config_path,
        format!("{}\n[db]\npath = \"./inventory.db\"\n", minimal_config(port)),
    )
    .unwrap();

    {
        let _guard = KillOnDrop(spawn_region_with_config_file(&config_path));
        wait_for_listening(port, 5).await;
        let admin = RegionClient::new(port, ADMIN_TOKEN);
        let (status, _) =
            RegionClient::send(admin.post("/subnets", &json!({"cidr": "172.16.0.0/16"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            RegionClient::send(admin.post("/hosts", &json!({"hostname": "keeper"}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let _guard = KillOnDrop(spawn_region_with_config_file(&config_path));
    wait_for_listening(port, 5).await;
    let admin = RegionClient::new(port, ADMIN_TOKEN);
    let (_, subnets) = RegionClient::send(admin.get("/subnets")).await;
    assert_eq!(subnets[0]["cidr"], "172.16.0.0/16");
    let (_, audit) = RegionClient::send(admin.get("/audit")).await;
    assert!(audit.is_array(), "{audit}");
    admin.host_id("keeper").await;

    drop(std::fs::remove_dir_all(&dir));
}
