use domain::EngineEventKind;
use fleet_storage::{
    InMemoryPositionStore, LastPositionRecord, NewEngineEvent, PositionBatch, PositionRow,
    PositionStore,
};
use std::collections::BTreeMap;

const VEHICLE: i64 = 7;

fn sample_row(recorded_at_ms: i64, lat: f64) -> PositionRow {
    PositionRow {
        vehicle_id: VEHICLE,
        device_id: 3,
        driver_id: None,
        distance_from_prev: Some(0.0),
        bytes_received: Some(45),
        lat,
        lng: 69.2401,
        speed: 0,
        angle: 0,
        satellites: 10,
        ignition: Some(true),
        raw_io: BTreeMap::new(),
        recorded_at_ms,
    }
}

fn sample_last(recorded_at_ms: i64, lat: f64) -> LastPositionRecord {
    LastPositionRecord {
        vehicle_id: VEHICLE,
        lat,
        lng: 69.2401,
        speed: 0,
        angle: 0,
        altitude: 450,
        satellites: 10,
        ignition: Some(true),
        movement: None,
        odometer: None,
        gsm_signal: None,
        battery_voltage: None,
        ext_voltage: None,
        recorded_at_ms,
    }
}

fn sample_batch(ts: &[i64]) -> PositionBatch {
    let last = *ts.last().expect("non-empty");
    PositionBatch {
        vehicle_id: VEHICLE,
        positions: ts.iter().map(|ts| sample_row(*ts, 41.0)).collect(),
        engine_events: vec![NewEngineEvent {
            vehicle_id: VEHICLE,
            kind: EngineEventKind::On,
            event_at_ms: ts[0],
            lat: 41.0,
            lng: 69.2401,
        }],
        last_position: sample_last(last, 41.0),
    }
}

#[tokio::test]
async fn persist_batch_writes_all_parts() {
    let store = InMemoryPositionStore::new();
    let summary = store
        .persist_batch(&sample_batch(&[1_000, 2_000]))
        .await
        .expect("persist");
    assert_eq!(summary.positions_written, 2);
    assert_eq!(summary.engine_events_written, 1);

    let positions = store.list_positions(VEHICLE).await.expect("positions");
    assert_eq!(positions.len(), 2);
    let last = store
        .last_position(VEHICLE)
        .await
        .expect("last")
        .expect("present");
    assert_eq!(last.recorded_at_ms, 2_000);
    let event = store
        .last_engine_event(VEHICLE)
        .await
        .expect("event")
        .expect("present");
    assert_eq!(event.kind, EngineEventKind::On);
    assert_eq!(event.event_at_ms, 1_000);
}

#[tokio::test]
async fn replayed_batch_is_deduplicated() {
    let store = InMemoryPositionStore::new();
    let batch = sample_batch(&[1_000, 2_000]);
    store.persist_batch(&batch).await.expect("first");
    let summary = store.persist_batch(&batch).await.expect("replay");
    assert_eq!(summary.positions_written, 0);
    assert_eq!(summary.engine_events_written, 0);
    assert_eq!(store.list_positions(VEHICLE).await.expect("list").len(), 2);
    assert_eq!(
        store.list_engine_events(VEHICLE).await.expect("list").len(),
        1
    );
}

#[tokio::test]
async fn last_position_never_moves_backwards() {
    let store = InMemoryPositionStore::new();
    let mut newer = sample_batch(&[5_000]);
    newer.last_position = sample_last(5_000, 42.0);
    store.persist_batch(&newer).await.expect("newer");

    let older = sample_batch(&[3_000]);
    store.persist_batch(&older).await.expect("older");

    let last = store
        .last_position(VEHICLE)
        .await
        .expect("last")
        .expect("present");
    assert_eq!(last.recorded_at_ms, 5_000);
    assert_eq!(last.lat, 42.0);
    let times: Vec<i64> = store
        .list_positions(VEHICLE)
        .await
        .expect("list")
        .iter()
        .map(|row| row.recorded_at_ms)
        .collect();
    assert_eq!(times, vec![3_000, 5_000]);
}

#[tokio::test]
async fn unavailable_store_writes_nothing() {
    let store = InMemoryPositionStore::new();
    store.set_unavailable(true);
    let result = store.persist_batch(&sample_batch(&[1_000])).await;
    assert!(result.is_err());
    assert!(store.is_empty());
    assert!(store.last_position(VEHICLE).await.expect("last").is_none());

    store.set_unavailable(false);
    store
        .persist_batch(&sample_batch(&[1_000]))
        .await
        .expect("recovered");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn unknown_vehicle_has_no_history() {
    let store = InMemoryPositionStore::new();
    assert!(store.last_position(99).await.expect("last").is_none());
    assert!(store.last_engine_event(99).await.expect("event").is_none());
    assert!(store.list_positions(99).await.expect("list").is_empty());
}

#[tokio::test]
async fn positions_between_excludes_lower_bound() {
    let store = InMemoryPositionStore::new();
    store
        .persist_batch(&sample_batch(&[1_000, 2_000, 3_000, 4_000]))
        .await
        .expect("persist");

    let rows = store
        .list_positions_between(VEHICLE, 1_000, 3_000)
        .await
        .expect("range");
    let times: Vec<i64> = rows.iter().map(|row| row.recorded_at_ms).collect();
    assert_eq!(times, vec![2_000, 3_000]);

    let empty = store
        .list_positions_between(VEHICLE + 1, 0, 10_000)
        .await
        .expect("other vehicle");
    assert!(empty.is_empty());
}
