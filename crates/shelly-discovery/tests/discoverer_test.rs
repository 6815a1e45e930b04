//! Registry and address-parsing behavior against mock HTTP devices.

mod support;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use shelly_discovery::DiscoveryError;
use support::{mock_device, test_discoverer};

#[tokio::test]
async fn add_device_by_address_installs_by_canonical_mac() {
    let server = mock_device("AABBCCDDEE01", "Pro3").await;
    let discoverer = test_discoverer();

    // Bare host:port, no scheme, no path.
    let addr = server.uri().trim_start_matches("http://").to_string();
    let device = discoverer.add_device_by_address(&addr).await.unwrap();

    assert_eq!(device.mac().as_deref(), Some("AABBCCDDEE01"));
    let specs = device.specs().unwrap();
    assert_eq!(specs.switches, 3);
    assert!(specs.ethernet);
    assert_eq!(device.uri().to_string(), format!("{}/rpc", server.uri()));
}

#[tokio::test]
async fn repeated_add_is_idempotent() {
    let server = mock_device("AABBCCDDEE02", "Plus1").await;
    let discoverer = test_discoverer();

    let first = discoverer
        .add_device_by_address(&server.uri())
        .await
        .unwrap();
    let before = first.last_seen();
    let second = discoverer
        .add_device_by_address(&server.uri())
        .await
        .unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(discoverer.all_devices().len(), 1);
    assert!(second.last_seen() >= before);
}

#[tokio::test]
async fn unsupported_schemes_paths_and_queries_are_rejected() {
    let discoverer = test_discoverer();

    let err = discoverer
        .add_device_by_address("ftp://192.0.2.1/rpc")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidAddress(_)), "{err}");

    let err = discoverer
        .add_device_by_address("http://192.0.2.1/other")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidAddress(_)), "{err}");

    let err = discoverer
        .add_device_by_address("http://192.0.2.1/rpc?x=1")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidAddress(_)), "{err}");
}

/// Device that requires digest auth: every request without an auth member
/// gets the 401 challenge, authenticated requests succeed.
async fn mock_authed_device(mac: &'static str, app: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(move |request: &Request| {
            let frame: Value = serde_json::from_slice(&request.body).unwrap();
            if frame.get("auth").is_none() {
                let challenge = json!({
                    "auth_type": "digest",
                    "nonce": 1619545138,
                    "nc": 1,
                    "realm": format!("shelly-test-{}", mac.to_lowercase()),
                    "algorithm": "SHA-256"
                });
                return ResponseTemplate::new(200).set_body_json(json!({
                    "id": frame["id"],
                    "src": format!("shelly-test-{}", mac.to_lowercase()),
                    "dst": frame["src"],
                    "error": {"code": 401, "message": challenge.to_string()}
                }));
            }
            assert_eq!(frame["auth"]["username"], "admin");
            assert_eq!(frame["auth"]["algorithm"], "SHA-256");
            ResponseTemplate::new(200).set_body_json(json!({
                "id": frame["id"],
                "src": format!("shelly-test-{}", mac.to_lowercase()),
                "dst": frame["src"],
                "result": support::device_info(mac, app)
            }))
        })
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn url_userinfo_password_satisfies_the_auth_challenge() {
    let server = mock_authed_device("AABBCCDDEE03", "Plus1PM").await;
    let discoverer = test_discoverer();

    let with_auth = server.uri().replace("http://", "http://admin:hunter2@");
    let device = discoverer.add_device_by_address(&with_auth).await.unwrap();
    assert_eq!(device.mac().as_deref(), Some("AABBCCDDEE03"));
}

#[tokio::test]
async fn single_userinfo_element_is_the_password() {
    let server = mock_authed_device("AABBCCDDEE04", "Plus1PM").await;
    let discoverer = test_discoverer();

    let with_auth = server.uri().replace("http://", "http://hunter2@");
    let device = discoverer.add_device_by_address(&with_auth).await.unwrap();
    assert_eq!(device.mac().as_deref(), Some("AABBCCDDEE04"));
}

#[tokio::test]
async fn missing_credentials_surface_auth_required() {
    let server = mock_authed_device("AABBCCDDEE05", "Plus1PM").await;
    let discoverer = test_discoverer();

    let err = discoverer
        .add_device_by_address(&server.uri())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            DiscoveryError::Rpc(shelly_rpc::RpcError::AuthRequired(_))
        ),
        "{err}"
    );
}

#[tokio::test]
async fn unreachable_device_fails_the_add() {
    let discoverer = test_discoverer();
    let err = discoverer
        .add_device_by_address("http://127.0.0.1:9/rpc")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Rpc(_)), "{err}");
}

#[tokio::test]
async fn ble_and_mqtt_adds_derive_the_mac_key() {
    let discoverer = test_discoverer();

    let ble = discoverer.add_ble_device("aa:bb:cc:dd:ee:06");
    assert_eq!(ble.mac().as_deref(), Some("AABBCCDDEE06"));

    let mqtt = discoverer
        .add_mqtt_device("shellyplugus-aabbccddee07")
        .await
        .unwrap();
    assert_eq!(mqtt.mac().as_deref(), Some("AABBCCDDEE07"));

    assert_eq!(discoverer.all_devices().len(), 2);
    assert!(discoverer.is_known_device("AABBCCDDEE06"));
}
