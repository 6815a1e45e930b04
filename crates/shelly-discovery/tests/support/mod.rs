//! Shared mock-device helpers: a wiremock HTTP endpoint that speaks just
//! enough mgRPC to exercise the discoverer.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use shelly_discovery::{Discoverer, DiscovererConfig};
use std::sync::Arc;

pub fn device_info(mac: &str, app: &str) -> Value {
    json!({
        "name": null,
        "id": format!("shelly-test-{}", mac.to_lowercase()),
        "mac": mac,
        "model": "TEST-MODEL",
        "gen": 2,
        "fw_id": "20240101-000000/1.0.0-test",
        "ver": "1.0.0",
        "app": app,
        "auth_en": false,
        "auth_domain": null
    })
}

/// Mount an `/rpc` responder that answers `Shelly.GetDeviceInfo` with the
/// given identity and `Shelly.GetStatus` with a canned status. Response
/// frames echo the request id and src.
pub async fn mock_device(mac: &'static str, app: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(move |request: &Request| {
            let frame: Value = serde_json::from_slice(&request.body).expect("request is a frame");
            let result = match frame["method"].as_str() {
                Some("Shelly.GetDeviceInfo") => device_info(mac, app),
                Some("Shelly.GetStatus") => json!({
                    "sys": {"mac": mac, "uptime": 42},
                    "switch:0": {"id": 0, "output": false}
                }),
                other => panic!("unexpected method {other:?}"),
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "id": frame["id"],
                "src": format!("shelly-test-{}", mac.to_lowercase()),
                "dst": frame["src"],
                "result": result
            }))
        })
        .mount(&server)
        .await;
    server
}

pub fn test_discoverer() -> Arc<Discoverer> {
    let mut config = DiscovererConfig::new("shellyfleet-test");
    config.rpc_timeout = Some(std::time::Duration::from_secs(5));
    Discoverer::new(config)
}
