//! Behaviour tests for [`StreamBus`] against the in-memory store.
//!
//! Covers the publish/read/ack round trip on both drivers, consumer group
//! idempotency, the empty-read contract and the dedupe gate.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stream_bus_core::group::GroupManager;
use stream_bus_core::{
    BusError, BusOptions, Delivery, Driver, GroupCreation, Payload, StreamBus, StreamStore,
};
use stream_bus_testing::{InMemoryStore, payload};

const TOPIC: &str = "events:outbound";
const KEY: &str = "stream-bus:events:outbound";

fn bus_with(store: &InMemoryStore, defaults: BusOptions) -> StreamBus {
    StreamBus::builder()
        .defaults(defaults)
        .connection("default", Arc::new(store.clone()))
        .build()
}

fn log_bus(store: &InMemoryStore) -> StreamBus {
    bus_with(
        store,
        BusOptions::new().driver(Driver::Log).prefix("stream-bus:"),
    )
}

fn queue_bus(store: &InMemoryStore) -> StreamBus {
    bus_with(
        store,
        BusOptions::new().driver(Driver::Queue).prefix("stream-bus:"),
    )
}

fn reader() -> BusOptions {
    BusOptions::new().group("g1").consumer("c1")
}

// ============================================================================
// Log driver
// ============================================================================

#[tokio::test]
async fn log_publish_read_ack_scenario() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    let record_id = bus
        .publish(TOPIC, payload(json!({"foo": "bar"})), &BusOptions::new())
        .await
        .unwrap();
    assert!(!record_id.is_empty());
    assert_eq!(store.log_len(KEY).unwrap(), 1);

    let messages = bus.read(TOPIC, &reader()).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id.as_deref(), Some(record_id.as_str()));
    assert_eq!(messages[0].payload()["foo"], "bar");

    let acked = bus
        .ack(TOPIC, [record_id.clone()], &BusOptions::new().group("g1"))
        .await
        .unwrap();
    assert_eq!(acked, 1);
    assert!(store.pending(KEY, "g1").unwrap().is_empty());

    let again = bus.read(TOPIC, &reader()).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn log_envelope_carries_producer_identity() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    let record_id = bus
        .publish(TOPIC, payload(json!({"n": 1})), &BusOptions::new())
        .await
        .unwrap();
    let messages = bus.read(TOPIC, &reader()).await.unwrap();

    let envelope = &messages[0].envelope;
    assert_ne!(envelope.id(), record_id);
    assert!(uuid_like(envelope.id()));
    assert!(envelope.timestamp() > 0);
}

fn uuid_like(id: &str) -> bool {
    id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn unacknowledged_records_stay_pending() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    bus.publish(TOPIC, payload(json!({"a": 1})), &BusOptions::new())
        .await
        .unwrap();
    let messages = bus.read(TOPIC, &reader()).await.unwrap();

    assert_eq!(
        store.pending(KEY, "g1").unwrap(),
        vec![messages[0].id.clone().unwrap()]
    );
}

#[tokio::test]
async fn log_read_honours_count_and_order() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    for n in 0..5 {
        bus.publish(TOPIC, payload(json!({"n": n})), &BusOptions::new())
            .await
            .unwrap();
    }

    let batch = bus.read(TOPIC, &reader().count(3)).await.unwrap();
    let ns: Vec<i64> = batch
        .iter()
        .map(|m| m.payload()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![0, 1, 2]);

    let rest = bus.read(TOPIC, &reader().count(10)).await.unwrap();
    assert_eq!(rest.len(), 2);
}

#[tokio::test]
async fn separate_groups_each_see_every_record() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    bus.publish(TOPIC, payload(json!({"x": 1})), &BusOptions::new())
        .await
        .unwrap();

    let a = bus.read(TOPIC, &BusOptions::new().group("a").consumer("c")).await.unwrap();
    let b = bus.read(TOPIC, &BusOptions::new().group("b").consumer("c")).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
}

#[tokio::test]
async fn read_on_missing_topic_creates_it_and_returns_empty() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    let messages = bus.read("nothing:here", &reader()).await.unwrap();
    assert!(messages.is_empty());
    assert!(store.log_exists("stream-bus:nothing:here").unwrap());
    assert!(store.group_exists("stream-bus:nothing:here", "g1").unwrap());
}

#[tokio::test]
async fn undecodable_log_records_are_skipped() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    store.append(KEY, "not an envelope").await.unwrap();
    bus.publish(TOPIC, payload(json!({"ok": true})), &BusOptions::new())
        .await
        .unwrap();

    let messages = bus.read(TOPIC, &reader().count(10)).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload()["ok"], true);

    // Only the decodable record is left waiting for an ack.
    let pending = store.pending(KEY, "g1").unwrap();
    assert_eq!(pending, vec![messages[0].id.clone().unwrap()]);
}

#[tokio::test]
async fn truncated_log_records_are_acknowledged() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    store.append(KEY, "{\"truncated\":").await.unwrap();
    assert!(bus.read(TOPIC, &reader()).await.unwrap().is_empty());
    assert!(store.pending(KEY, "g1").unwrap().is_empty());

    // Nothing is redelivered on the next read either.
    assert!(bus.read(TOPIC, &reader()).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_failures_surface_through_the_facade() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);
    store.set_unavailable(true).unwrap();

    let err = bus
        .publish(TOPIC, Payload::new(), &BusOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::TransportError(_)));
    assert!(bus.read(TOPIC, &reader()).await.is_err());
}

#[tokio::test]
async fn store_errors_pass_through_unwrapped() {
    let store = InMemoryStore::new();
    let log = log_bus(&store);
    let queue = queue_bus(&store);
    store.set_unavailable(true).unwrap();

    let expected = BusError::TransportError("store unavailable".to_string()).to_string();

    let published = log
        .publish(TOPIC, Payload::new(), &BusOptions::new())
        .await
        .unwrap_err();
    assert_eq!(published.to_string(), expected);

    let pushed = queue
        .publish(TOPIC, Payload::new(), &BusOptions::new())
        .await
        .unwrap_err();
    assert_eq!(pushed.to_string(), expected);

    let acked = log
        .ack(TOPIC, ["1-0"], &reader())
        .await
        .unwrap_err();
    assert_eq!(acked.to_string(), expected);
}

// ============================================================================
// Consumer groups
// ============================================================================

#[tokio::test]
async fn group_creation_is_idempotent_and_keeps_cursor() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);
    let groups = GroupManager::new(Arc::new(store.clone()));

    assert_eq!(groups.ensure(KEY, "g1").await.unwrap(), GroupCreation::Created);

    bus.publish(TOPIC, payload(json!({"n": 1})), &BusOptions::new())
        .await
        .unwrap();
    bus.read(TOPIC, &reader()).await.unwrap();
    let cursor = store.group_cursor(KEY, "g1").unwrap();

    assert_eq!(
        groups.ensure(KEY, "g1").await.unwrap(),
        GroupCreation::AlreadyExists
    );
    assert_eq!(store.group_cursor(KEY, "g1").unwrap(), cursor);
    assert!(bus.read(TOPIC, &reader()).await.unwrap().is_empty());
}

// ============================================================================
// Queue driver
// ============================================================================

#[tokio::test]
async fn queue_publish_read_scenario() {
    let store = InMemoryStore::new();
    let bus = queue_bus(&store);

    let id = bus
        .publish(TOPIC, payload(json!({"foo": "bar"})), &BusOptions::new())
        .await
        .unwrap();

    let items = store.list_items(KEY).unwrap();
    assert_eq!(items.len(), 1);
    let stored: serde_json::Value = serde_json::from_str(&items[0]).unwrap();
    assert_eq!(stored["id"], id.as_str());
    assert_eq!(stored["payload"]["foo"], "bar");

    let messages = bus.read(TOPIC, &BusOptions::new().block(1)).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id.as_deref(), Some(id.as_str()));
    assert_eq!(messages[0].payload()["foo"], "bar");
    assert!(store.list_items(KEY).unwrap().is_empty());

    let acked = bus.ack(TOPIC, [id], &BusOptions::new()).await.unwrap();
    assert_eq!(acked, 0);
    assert!(store.list_items(KEY).unwrap().is_empty());
}

#[tokio::test]
async fn queue_is_fifo_and_returns_one_per_read() {
    let store = InMemoryStore::new();
    let bus = queue_bus(&store);

    for n in 0..3 {
        bus.publish(TOPIC, payload(json!({"n": n})), &BusOptions::new())
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let batch = bus.read(TOPIC, &BusOptions::new().count(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        seen.push(batch[0].payload()["n"].as_i64().unwrap());
    }
    assert_eq!(seen, vec![0, 1, 2]);
    assert!(bus.read(TOPIC, &BusOptions::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn queue_ack_never_touches_the_store() {
    let store = InMemoryStore::new();
    let bus = queue_bus(&store);
    store.set_unavailable(true).unwrap();

    let acked = bus
        .ack(TOPIC, ["a", "b"], &BusOptions::new().group("whatever"))
        .await
        .unwrap();
    assert_eq!(acked, 0);

    let none: [&str; 0] = [];
    assert_eq!(bus.ack(TOPIC, none, &BusOptions::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn call_options_switch_driver_per_call() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    bus.publish(
        TOPIC,
        payload(json!({"q": 1})),
        &BusOptions::new().driver(Driver::Queue),
    )
    .await
    .unwrap();

    assert_eq!(store.log_len(KEY).unwrap(), 0);
    assert_eq!(store.list_items(KEY).unwrap().len(), 1);
}

// ============================================================================
// Dedupe gate
// ============================================================================

#[tokio::test]
async fn effectively_once_admits_once() {
    let store = InMemoryStore::new();
    let bus = bus_with(
        &store,
        BusOptions::new()
            .driver(Driver::Log)
            .prefix("stream-bus:")
            .delivery(Delivery::EffectivelyOnce)
            .dedupe_ttl(3600),
    );

    assert!(bus.should_process(TOPIC, "1-1", &BusOptions::new()).await.unwrap());
    assert!(!bus.should_process(TOPIC, "1-1", &BusOptions::new()).await.unwrap());
    assert!(store.has_value("stream-bus:events:outbound:dedupe:1-1").unwrap());

    // A different id is independent.
    assert!(bus.should_process(TOPIC, "1-2", &BusOptions::new()).await.unwrap());
}

#[tokio::test]
async fn effectively_once_applies_on_queue_path() {
    let store = InMemoryStore::new();
    let bus = queue_bus(&store);
    let options = BusOptions::new().delivery(Delivery::EffectivelyOnce);

    assert!(bus.should_process(TOPIC, "abc", &options).await.unwrap());
    assert!(!bus.should_process(TOPIC, "abc", &options).await.unwrap());
}

#[tokio::test]
async fn at_least_once_never_gates() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    for _ in 0..5 {
        assert!(bus.should_process(TOPIC, "1-1", &BusOptions::new()).await.unwrap());
    }
    assert!(!store.has_value("stream-bus:events:outbound:dedupe:1-1").unwrap());
}

#[tokio::test(start_paused = true)]
async fn dedupe_record_expires_after_ttl() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);
    let options = BusOptions::new()
        .delivery(Delivery::EffectivelyOnce)
        .dedupe_ttl(60);

    assert!(bus.should_process(TOPIC, "x", &options).await.unwrap());
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!bus.should_process(TOPIC, "x", &options).await.unwrap());
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(bus.should_process(TOPIC, "x", &options).await.unwrap());
}

#[tokio::test]
async fn dedupe_store_failure_is_reported() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);
    store.set_unavailable(true).unwrap();

    let err = bus
        .should_process(
            TOPIC,
            "x",
            &BusOptions::new().delivery(Delivery::EffectivelyOnce),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::DedupeFailed { .. }));
}

// ============================================================================
// Connections and keys
// ============================================================================

#[tokio::test]
async fn connection_option_selects_store() {
    let primary = InMemoryStore::new();
    let secondary = InMemoryStore::new();
    let bus = StreamBus::builder()
        .connection("default", Arc::new(primary.clone()))
        .connection("analytics", Arc::new(secondary.clone()))
        .build();

    bus.publish(
        TOPIC,
        Payload::new(),
        &BusOptions::new().connection("analytics"),
    )
    .await
    .unwrap();

    assert_eq!(primary.log_len(KEY).unwrap(), 0);
    assert_eq!(secondary.log_len(KEY).unwrap(), 1);

    let err = bus
        .publish(TOPIC, Payload::new(), &BusOptions::new().connection("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::UnknownConnection { .. }));
}

#[tokio::test]
async fn prefix_override_changes_key() {
    let store = InMemoryStore::new();
    let bus = log_bus(&store);

    bus.publish(TOPIC, Payload::new(), &BusOptions::new().prefix("other:"))
        .await
        .unwrap();
    assert_eq!(store.log_len("other:events:outbound").unwrap(), 1);
    assert_eq!(store.log_len(KEY).unwrap(), 0);
}

// ============================================================================
// Properties
// ============================================================================

fn arb_payload() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map(
        "[a-z]{1,8}",
        prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
            "[ -~]{0,16}".prop_map(serde_json::Value::from),
        ],
        0..6,
    )
    .prop_map(|map| map.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn publish_then_read_round_trips(body in arb_payload(), queue in any::<bool>()) {
        tokio_test::block_on(async {
            let store = InMemoryStore::new();
            let bus = if queue { queue_bus(&store) } else { log_bus(&store) };

            bus.publish(TOPIC, body.clone(), &BusOptions::new()).await.unwrap();
            let messages = bus.read(TOPIC, &reader().count(10)).await.unwrap();

            prop_assert_eq!(messages.len(), 1);
            prop_assert_eq!(messages[0].payload(), &body);
            Ok(())
        })?;
    }

    #[test]
    fn same_prefix_targets_same_key(topic in "[a-z:]{1,12}", prefix in "[a-z-]{0,8}:") {
        tokio_test::block_on(async {
            let store = InMemoryStore::new();
            let bus = log_bus(&store);
            let options = BusOptions::new().prefix(prefix.clone());

            bus.publish(&topic, Payload::new(), &options).await.unwrap();
            bus.publish(&topic, Payload::new(), &options).await.unwrap();

            let key = format!("{prefix}{topic}");
            prop_assert_eq!(bus.key(&topic, &options).unwrap(), key.clone());
            prop_assert_eq!(store.log_len(&key).unwrap(), 2);
            Ok(())
        })?;
    }
}
