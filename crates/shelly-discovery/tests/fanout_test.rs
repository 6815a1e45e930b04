//! Fan-out behavior: parallel execution, distinct frame ids, and the
//! skip-failed-hosts policy.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use shelly_discovery::{run_on_all, DiscoveryError};
use shelly_rpc::executor;
use support::{mock_device, test_discoverer};

#[tokio::test]
async fn fanout_hits_every_device_with_distinct_ids() {
    let server_a = mock_device("AABBCCDD1101", "Pro3").await;
    let server_b = mock_device("AABBCCDD1102", "Plus1").await;
    let discoverer = test_discoverer();
    discoverer
        .add_device_by_address(&server_a.uri())
        .await
        .unwrap();
    discoverer
        .add_device_by_address(&server_b.uri())
        .await
        .unwrap();

    let devices = discoverer.all_devices();
    let outcomes = run_on_all(&devices, 5, false, |device, channel| async move {
        let result = executor::call(
            &channel,
            "Shelly.GetStatus",
            None,
            &device.call_options(),
        )
        .await?;
        Ok::<Value, DiscoveryError>(result)
    })
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(
            outcome.value["sys"]["mac"],
            Value::String(outcome.device.mac().unwrap())
        );
    }

    // Every request the two servers saw carried a distinct frame id.
    let mut ids = HashSet::new();
    for server in [&server_a, &server_b] {
        for request in server.received_requests().await.unwrap() {
            let frame: Value = serde_json::from_slice(&request.body).unwrap();
            assert!(ids.insert(frame["id"].as_i64().unwrap()));
        }
    }
}

#[tokio::test]
async fn one_failure_with_skip_continues_the_run() {
    let healthy = mock_device("AABBCCDD1103", "Pro3").await;
    let discoverer = test_discoverer();
    discoverer
        .add_device_by_address(&healthy.uri())
        .await
        .unwrap();
    // A broker-backed device with no broker connected fails at open.
    discoverer
        .add_mqtt_device("shellyplugus-aabbccdd1104")
        .await
        .unwrap();

    let devices = discoverer.all_devices();
    let outcomes = run_on_all(&devices, 5, true, |device, channel| async move {
        let result = executor::call(
            &channel,
            "Shelly.GetStatus",
            None,
            &device.call_options(),
        )
        .await?;
        Ok::<Value, DiscoveryError>(result)
    })
    .await
    .unwrap();

    // Only the healthy device produced output.
    assert_eq!(outcomes.len(), 1);
    assert_eq!(
        outcomes[0].device.mac().as_deref(),
        Some("AABBCCDD1103")
    );
}

#[tokio::test]
async fn one_failure_without_skip_fails_the_invocation() {
    let healthy = mock_device("AABBCCDD1105", "Pro3").await;
    let discoverer = test_discoverer();
    discoverer
        .add_device_by_address(&healthy.uri())
        .await
        .unwrap();
    discoverer
        .add_mqtt_device("shellyplugus-aabbccdd1106")
        .await
        .unwrap();

    let devices = discoverer.all_devices();
    let result = run_on_all(&devices, 5, false, |device, channel| async move {
        let result = executor::call(
            &channel,
            "Shelly.GetStatus",
            None,
            &device.call_options(),
        )
        .await?;
        Ok::<Value, DiscoveryError>(result)
    })
    .await;

    assert!(result.is_err());
}
