//! Forwarding Integration Tests
//!
//! Drives the engine end to end against a scripted broker: filtering,
//! sink failure isolation and the delivery timeout.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBroker, RecordingSink, Session, SinkMode, harness, reconnect, update, wait_until};
use vss_forwarder::{HealthServerState, SignalValue, SubscriptionState};

const FILTER: &str = "Vehicle.Speed,Vehicle.Body.Hood.IsOpen";

#[tokio::test]
async fn forwards_only_filtered_signals_in_order() {
    let broker = FakeBroker::new([Session::Batches(vec![
        vec![
            update("Vehicle.Speed", 42.0, 0),
            update("Vehicle.Cabin.Temperature", 21.5, 0),
        ],
        vec![update("Vehicle.Body.Hood.IsOpen", true, 1)],
        vec![update("Vehicle.Speed", 43.5, 2)],
    ])]);
    let sink = RecordingSink::new(SinkMode::Accept);
    let h = harness(broker.clone(), sink.clone(), Some(FILTER), reconnect(3, None));

    let shutdown = h.shutdown.clone();
    let status = h.status.clone();
    let run = tokio::spawn(h.engine.run());

    wait_until(|| status.updates_received() == 4).await;
    wait_until(|| sink.len() == 3).await;
    assert_eq!(status.state(), SubscriptionState::Subscribed);
    shutdown.trigger();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failed, 0);
    assert!(report.drained);

    assert_eq!(
        sink.paths(),
        vec!["Vehicle.Speed", "Vehicle.Body.Hood.IsOpen", "Vehicle.Speed"]
    );
    let received = sink.received.lock().clone();
    assert_eq!(received[1].value, SignalValue::Boolean(true));
    assert!(received[0].timestamp < received[2].timestamp);

    assert_eq!(
        broker.stats.subscriptions(),
        vec![vec![
            "Vehicle.Body.Hood.IsOpen".to_string(),
            "Vehicle.Speed".to_string()
        ]]
    );
    assert_eq!(status.updates_filtered(), 1);
    assert_eq!(status.updates_forwarded(), 3);
    assert_eq!(status.state(), SubscriptionState::Closed);
    assert_eq!(broker.stats.closes(), 1);
    assert_eq!(sink.flushes(), 1);
}

#[tokio::test]
async fn failing_sink_does_not_stop_forwarding() {
    let batch = (0..5).map(|i| update("Vehicle.Speed", f64::from(i), i64::from(i))).collect();
    let broker = FakeBroker::new([Session::Batches(vec![batch])]);
    let sink = RecordingSink::new(SinkMode::Fail);
    let h = harness(broker, sink.clone(), Some(FILTER), reconnect(3, None));

    let shutdown = h.shutdown.clone();
    let status = h.status.clone();
    let run = tokio::spawn(h.engine.run());

    let mut observed = Vec::new();
    wait_until(|| {
        let failures = status.delivery_failures();
        if observed.last() != Some(&failures) {
            observed.push(failures);
        }
        failures == 5
    })
    .await;
    shutdown.trigger();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.failed, 5);
    assert_eq!(report.forwarded(), 0);
    assert_eq!(sink.len(), 5);
    assert!(observed.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn stalled_sink_is_bounded_by_delivery_timeout() {
    let broker = FakeBroker::new([Session::Batches(vec![vec![
        update("Vehicle.Speed", 1.0, 0),
        update("Vehicle.Speed", 2.0, 1),
    ]])]);
    let sink = RecordingSink::new(SinkMode::Stall(Duration::from_secs(60)));
    let h = harness(broker, sink.clone(), Some(FILTER), reconnect(3, None));

    let shutdown = h.shutdown.clone();
    let status = h.status.clone();
    let run = tokio::spawn(h.engine.run());

    let started = tokio::time::Instant::now();
    wait_until(|| status.delivery_failures() == 2).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    shutdown.trigger();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn startup_fails_when_broker_unreachable() {
    let broker = FakeBroker::new([Session::Refuse]);
    let sink = RecordingSink::new(SinkMode::Accept);
    let h = harness(broker.clone(), sink.clone(), Some(FILTER), reconnect(3, None));

    let err = h.engine.run().await.unwrap_err();
    assert!(matches!(err, vss_forwarder::EngineError::Startup(_)));
    assert_eq!(broker.stats.connects(), 1);
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn trunk_update_is_dropped_between_speed_and_hood() {
    let broker = FakeBroker::new([Session::Batches(vec![
        vec![update("Vehicle.Speed", 42.0, 1)],
        vec![update("Vehicle.Body.Trunk.IsOpen", true, 2)],
        vec![update("Vehicle.Body.Hood.IsOpen", false, 3)],
    ])]);
    let sink = RecordingSink::new(SinkMode::Accept);
    let h = harness(broker, sink.clone(), Some(FILTER), reconnect(3, None));

    let shutdown = h.shutdown.clone();
    let status = h.status.clone();
    let run = tokio::spawn(h.engine.run());

    wait_until(|| status.updates_received() == 3).await;
    wait_until(|| sink.len() == 2).await;
    shutdown.trigger();
    run.await.unwrap().unwrap();

    let received = sink.received.lock().clone();
    assert_eq!(
        received,
        vec![
            update("Vehicle.Speed", 42.0, 1),
            update("Vehicle.Body.Hood.IsOpen", false, 3),
        ]
    );
}

#[tokio::test]
async fn configured_filter_is_not_reported_empty_while_connecting() {
    let broker = FakeBroker::new([Session::Hang]);
    let sink = RecordingSink::new(SinkMode::Accept);
    let h = harness(broker.clone(), sink, Some(FILTER), reconnect(3, None));

    let shutdown = h.shutdown.clone();
    let status = h.status.clone();
    let run = tokio::spawn(h.engine.run());

    wait_until(|| broker.stats.connects() == 1).await;
    let health = HealthServerState::new("test".to_string(), Arc::clone(&status)).response();
    assert_eq!(health.relay.state, SubscriptionState::Connecting);
    assert!(!health.empty_filter);

    shutdown.trigger();
    let report = run.await.unwrap().unwrap();
    assert_eq!(report.forwarded(), 0);
}
