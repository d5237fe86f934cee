use domain::{EngineEventKind, IoSnapshot, Record, TelemetryBatch};
use fleet_live::{BroadcastLiveSink, LiveMessage};
use fleet_pipeline::{IngestConfig, Ingestor};
use fleet_storage::{InMemoryDriverAssignmentStore, InMemoryPositionStore, PositionStore};
use std::collections::BTreeMap;
use std::sync::Arc;

const NOW: i64 = 1_767_300_000_000;
const VEHICLE: i64 = 1;

struct Harness {
    positions: Arc<InMemoryPositionStore>,
    drivers: Arc<InMemoryDriverAssignmentStore>,
    live: Arc<BroadcastLiveSink>,
    ingestor: Ingestor,
}

fn harness() -> Harness {
    let positions = Arc::new(InMemoryPositionStore::new());
    let drivers = Arc::new(InMemoryDriverAssignmentStore::new());
    let live = Arc::new(BroadcastLiveSink::new(64));
    let ingestor = Ingestor::new(
        positions.clone(),
        drivers.clone(),
        live.clone(),
        IngestConfig::default(),
    );
    Harness {
        positions,
        drivers,
        live,
        ingestor,
    }
}

fn record(ts_ms: i64, lat: f64, lng: f64, ignition: Option<bool>) -> Record {
    let mut elements = BTreeMap::new();
    if let Some(value) = ignition {
        elements.insert(239, i64::from(value));
    }
    elements.insert(66, 12_800);
    Record {
        ts_ms,
        priority: 1,
        lat,
        lng,
        altitude: 420,
        angle: 90,
        satellites: 11,
        speed: 35,
        io: IoSnapshot::from_elements(elements),
    }
}

fn batch(records: Vec<Record>) -> TelemetryBatch {
    TelemetryBatch {
        vehicle_id: VEHICLE,
        device_id: 10,
        bytes_received: 120,
        records,
    }
}

#[tokio::test]
async fn valid_records_are_persisted_with_derived_fields() {
    let h = harness();
    h.drivers.assign(VEHICLE, 77);
    let mut rx = h.live.subscribe();
    let outcome = h
        .ingestor
        .ingest_at(
            &batch(vec![
                record(NOW - 20_000, 41.2995, 69.2401, Some(true)),
                record(NOW - 15_000, 0.0, 69.2401, Some(true)),
                record(NOW - 10_000, 41.2995, 69.2401, Some(true)),
            ]),
            NOW,
        )
        .await
        .expect("ingest");
    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(outcome.engine_events, 1);
    assert!(!outcome.skipped);
    assert_eq!(outcome.records.len(), 2);

    let rows = h.positions.list_positions(VEHICLE).await.expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].driver_id, Some(77));
    assert_eq!(rows[0].distance_from_prev, None);
    assert_eq!(rows[1].distance_from_prev, Some(0.0));
    assert_eq!(rows[0].bytes_received, Some(120));
    assert_eq!(rows[1].bytes_received, None);
    assert_eq!(rows[1].raw_io.get(&66), Some(&12_800));

    let last = h
        .positions
        .last_position(VEHICLE)
        .await
        .expect("last")
        .expect("present");
    assert_eq!(last.recorded_at_ms, NOW - 10_000);
    assert_eq!(last.ext_voltage, Some(12_800));

    let events = h.positions.list_engine_events(VEHICLE).await.expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EngineEventKind::On);

    match rx.recv().await.expect("live") {
        LiveMessage::Location(update) => {
            assert_eq!(update.vehicle_id, VEHICLE);
            assert_eq!(update.ts_ms, NOW - 10_000);
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn all_invalid_batch_is_noop() {
    let h = harness();
    let outcome = h
        .ingestor
        .ingest_at(&batch(vec![record(NOW, 41.2995, 69.2401, None)]), NOW)
        .await
        .expect("ingest");
    assert!(outcome.skipped);
    assert_eq!(outcome.rejected, 1);
    assert!(h.positions.is_empty());
    assert!(h.positions.last_position(VEHICLE).await.expect("last").is_none());
}

#[tokio::test]
async fn replayed_batch_does_not_duplicate() {
    let h = harness();
    let replay = batch(vec![
        record(NOW - 60_000, 41.2995, 69.2401, Some(false)),
        record(NOW - 50_000, 41.3, 69.2401, Some(true)),
    ]);
    h.ingestor.ingest_at(&replay, NOW).await.expect("first");
    h.ingestor.ingest_at(&replay, NOW).await.expect("replay");
    assert_eq!(h.positions.len(), 2);
    let events = h.positions.list_engine_events(VEHICLE).await.expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EngineEventKind::On);
    assert_eq!(events[0].event_at_ms, NOW - 50_000);
}

#[tokio::test]
async fn engine_flip_back_across_batches_is_debounced() {
    let h = harness();
    h.ingestor
        .ingest_at(
            &batch(vec![record(NOW - 300_000, 41.2995, 69.2401, Some(true))]),
            NOW,
        )
        .await
        .expect("seed");
    h.ingestor
        .ingest_at(
            &batch(vec![
                record(NOW - 100_000, 41.2995, 69.2401, Some(false)),
                record(NOW - 90_000, 41.2995, 69.2401, Some(true)),
            ]),
            NOW,
        )
        .await
        .expect("flip");
    let events = h.positions.list_engine_events(VEHICLE).await.expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EngineEventKind::On);
}

#[tokio::test]
async fn engine_off_held_across_batches_keeps_switch_time() {
    let h = harness();
    h.ingestor
        .ingest_at(
            &batch(vec![record(NOW - 300_000, 41.2995, 69.2401, Some(true))]),
            NOW,
        )
        .await
        .expect("seed");
    let held = h
        .ingestor
        .ingest_at(
            &batch(vec![record(NOW - 290_000, 41.3001, 69.2405, Some(false))]),
            NOW,
        )
        .await
        .expect("inside window");
    assert_eq!(held.engine_events, 0);

    let later = batch(vec![record(NOW - 100_000, 41.2995, 69.2401, Some(false))]);
    let outcome = h.ingestor.ingest_at(&later, NOW).await.expect("confirm");
    assert_eq!(outcome.engine_events, 1);
    h.ingestor.ingest_at(&later, NOW).await.expect("replay");

    let events = h.positions.list_engine_events(VEHICLE).await.expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].kind, EngineEventKind::Off);
    assert_eq!(events[1].event_at_ms, NOW - 290_000);
    assert_eq!((events[1].lat, events[1].lng), (41.3001, 69.2405));
}

#[tokio::test]
async fn distant_jump_is_stored_as_null() {
    let h = harness();
    h.ingestor
        .ingest_at(
            &batch(vec![record(NOW - 20_000, 41.2995, 69.2401, Some(true))]),
            NOW,
        )
        .await
        .expect("first");
    h.ingestor
        .ingest_at(
            &batch(vec![record(NOW - 10_000, 41.5, 69.2401, Some(true))]),
            NOW,
        )
        .await
        .expect("jump");
    let rows = h.positions.list_positions(VEHICLE).await.expect("rows");
    assert_eq!(rows[1].distance_from_prev, None);
}

#[tokio::test]
async fn storage_failure_is_reported_and_retry_succeeds() {
    let h = harness();
    let pending = batch(vec![record(NOW - 5_000, 41.2995, 69.2401, Some(true))]);
    h.positions.set_unavailable(true);
    assert!(h.ingestor.ingest_at(&pending, NOW).await.is_err());
    h.positions.set_unavailable(false);
    let outcome = h.ingestor.ingest_at(&pending, NOW).await.expect("retry");
    assert_eq!(outcome.accepted, 1);
    assert_eq!(h.positions.len(), 1);
}
