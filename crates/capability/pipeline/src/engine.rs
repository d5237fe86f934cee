//! 发动机点火事件推导
//!
//! 以车辆最近一条已持久化事件为初始点火状态，逐条比较记录的点火值，仅在值变化时产生事件。
//! 去抖窗口内的往返翻转互相抵消：
//! - 本批已产生的待写事件在窗口内被反向翻转：撤销该事件
//! - 距上一条已持久化事件不足窗口：暂缓判定，记下翻转起点；
//!   新值保持到窗口之外才产生事件，事件时间与坐标取翻转起点
//!
//! 暂缓中的翻转可能跨批次，起点由已存储的定位明细恢复（见 [`deferred_flip_since`]）。
//! 早于等于已持久化事件时间的记录不参与推导，重投批次不会重复产生事件。

use domain::{EngineEventKind, Record};
use fleet_storage::{EngineEventRecord, NewEngineEvent, PositionRow};

/// 去抖窗口内暂缓的点火翻转起点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredFlip {
    pub ignition: bool,
    pub ts_ms: i64,
    pub lat: f64,
    pub lng: f64,
}

impl DeferredFlip {
    fn from_record(record: &Record, ignition: bool) -> Self {
        Self {
            ignition,
            ts_ms: record.ts_ms,
            lat: record.lat,
            lng: record.lng,
        }
    }
}

/// 从已存储定位中恢复暂缓的翻转：`rows` 为最近事件之后的定位（升序），
/// 返回末尾连续一段与事件点火值不同的定位中的第一条。
pub fn deferred_flip_since(
    last_event: &EngineEventRecord,
    rows: &[PositionRow],
) -> Option<DeferredFlip> {
    let seed = last_event.kind.ignition();
    let mut run: Option<DeferredFlip> = None;
    for row in rows {
        if row.recorded_at_ms <= last_event.event_at_ms {
            continue;
        }
        let Some(ignition) = row.ignition else {
            continue;
        };
        if ignition == seed {
            run = None;
        } else if run.is_none() {
            run = Some(DeferredFlip {
                ignition,
                ts_ms: row.recorded_at_ms,
                lat: row.lat,
                lng: row.lng,
            });
        }
    }
    run
}

struct PendingEvent {
    event: NewEngineEvent,
    previous: Option<bool>,
}

/// 推导一批记录中的发动机事件（记录需已通过校验，点火值已知）。
///
/// `carried` 为之前批次中尚未判定的翻转起点。
pub fn derive_engine_events(
    vehicle_id: i64,
    last_event: Option<&EngineEventRecord>,
    carried: Option<DeferredFlip>,
    records: &[Record],
    debounce_ms: i64,
) -> Vec<NewEngineEvent> {
    let mut current = last_event.map(|event| event.kind.ignition());
    let floor_ms = last_event.map(|event| event.event_at_ms);
    let mut deferred = carried.filter(|flip| current.is_some_and(|seed| seed != flip.ignition));
    let mut pending: Vec<PendingEvent> = Vec::new();

    for record in records {
        let Some(ignition) = record.io.ignition else {
            continue;
        };
        if floor_ms.is_some_and(|floor| record.ts_ms <= floor) {
            continue;
        }
        if current == Some(ignition) {
            deferred = None;
            continue;
        }

        let within_pending = pending
            .last()
            .is_some_and(|last| record.ts_ms - last.event.event_at_ms < debounce_ms);
        if within_pending {
            if let Some(reverted) = pending.pop() {
                current = reverted.previous;
                if current == Some(ignition) {
                    continue;
                }
            }
        } else if pending.is_empty()
            && last_event.is_some_and(|event| record.ts_ms - event.event_at_ms < debounce_ms)
        {
            deferred.get_or_insert(DeferredFlip::from_record(record, ignition));
            continue;
        }

        let origin = deferred
            .take()
            .filter(|flip| flip.ignition == ignition)
            .unwrap_or_else(|| DeferredFlip::from_record(record, ignition));
        pending.push(PendingEvent {
            event: NewEngineEvent {
                vehicle_id,
                kind: EngineEventKind::from_ignition(ignition),
                event_at_ms: origin.ts_ms,
                lat: origin.lat,
                lng: origin.lng,
            },
            previous: current,
        });
        current = Some(ignition);
    }

    pending.into_iter().map(|pending| pending.event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::IoSnapshot;
    use std::collections::BTreeMap;

    const T0: i64 = 1_767_300_000_000;
    const WINDOW: i64 = 30_000;

    fn record(ts_ms: i64, ignition: bool) -> Record {
        let mut elements = BTreeMap::new();
        elements.insert(239, i64::from(ignition));
        Record {
            ts_ms,
            priority: 0,
            lat: 41.3,
            lng: 69.2,
            altitude: 0,
            angle: 0,
            satellites: 8,
            speed: 0,
            io: IoSnapshot::from_elements(elements),
        }
    }

    fn persisted(kind: EngineEventKind, event_at_ms: i64) -> EngineEventRecord {
        EngineEventRecord {
            id: 1,
            vehicle_id: 1,
            kind,
            event_at_ms,
            lat: 41.3,
            lng: 69.2,
        }
    }

    fn kinds(events: &[NewEngineEvent]) -> Vec<(EngineEventKind, i64)> {
        events.iter().map(|e| (e.kind, e.event_at_ms)).collect()
    }

    #[test]
    fn first_known_ignition_emits_event() {
        let events = derive_engine_events(1, None, None, &[record(T0, true)], WINDOW);
        assert_eq!(kinds(&events), vec![(EngineEventKind::On, T0)]);
    }

    #[test]
    fn unchanged_ignition_emits_nothing() {
        let seed = persisted(EngineEventKind::On, T0 - 600_000);
        let records = [record(T0, true), record(T0 + 60_000, true)];
        assert!(derive_engine_events(1, Some(&seed), None, &records, WINDOW).is_empty());
    }

    #[test]
    fn flip_and_flip_back_within_window_cancels() {
        let seed = persisted(EngineEventKind::On, T0 - 600_000);
        let records = [
            record(T0, true),
            record(T0 + 5_000, false),
            record(T0 + 15_000, true),
        ];
        assert!(derive_engine_events(1, Some(&seed), None, &records, WINDOW).is_empty());
    }

    #[test]
    fn flips_outside_window_alternate() {
        let seed = persisted(EngineEventKind::On, T0 - 600_000);
        let records = [
            record(T0, false),
            record(T0 + 60_000, true),
            record(T0 + 120_000, false),
        ];
        let events = derive_engine_events(1, Some(&seed), None, &records, WINDOW);
        assert_eq!(
            kinds(&events),
            vec![
                (EngineEventKind::Off, T0),
                (EngineEventKind::On, T0 + 60_000),
                (EngineEventKind::Off, T0 + 120_000),
            ]
        );
    }

    #[test]
    fn flip_right_after_persisted_event_is_delayed() {
        let seed = persisted(EngineEventKind::Off, T0);
        let records = [
            record(T0 + 10_000, true),
            record(T0 + 20_000, false),
            record(T0 + 45_000, true),
        ];
        let events = derive_engine_events(1, Some(&seed), None, &records, WINDOW);
        assert_eq!(kinds(&events), vec![(EngineEventKind::On, T0 + 45_000)]);
    }

    #[test]
    fn unknown_start_flip_back_rewrites_pending_event() {
        let records = [record(T0, true), record(T0 + 5_000, false)];
        let events = derive_engine_events(1, None, None, &records, WINDOW);
        assert_eq!(kinds(&events), vec![(EngineEventKind::Off, T0 + 5_000)]);
    }

    #[test]
    fn records_at_or_before_persisted_event_are_ignored() {
        let seed = persisted(EngineEventKind::On, T0);
        let records = [record(T0 - 120_000, false), record(T0, false)];
        assert!(derive_engine_events(1, Some(&seed), None, &records, WINDOW).is_empty());
    }

    #[test]
    fn events_never_repeat_same_kind() {
        let seed = persisted(EngineEventKind::Off, T0 - 600_000);
        let mut records = Vec::new();
        for step in 0..40i64 {
            records.push(record(T0 + step * 7_000, step % 3 != 0));
        }
        let events = derive_engine_events(1, Some(&seed), None, &records, WINDOW);
        let mut previous = EngineEventKind::Off;
        for event in &events {
            assert_ne!(event.kind, previous);
            previous = event.kind;
        }
    }

    #[test]
    fn sticking_flip_inside_window_keeps_first_time() {
        let seed = persisted(EngineEventKind::On, T0);
        let mut first = record(T0 + 10_000, false);
        first.lat = 41.31;
        let records = [first, record(T0 + 20_000, false), record(T0 + 45_000, false)];
        let events = derive_engine_events(1, Some(&seed), None, &records, WINDOW);
        assert_eq!(kinds(&events), vec![(EngineEventKind::Off, T0 + 10_000)]);
        assert_eq!(events[0].lat, 41.31);
    }

    #[test]
    fn carried_flip_is_confirmed_by_later_batch() {
        let seed = persisted(EngineEventKind::On, T0);
        let carried = DeferredFlip {
            ignition: false,
            ts_ms: T0 + 10_000,
            lat: 41.31,
            lng: 69.21,
        };
        let records = [record(T0 + 3_600_000, false)];
        let events = derive_engine_events(1, Some(&seed), Some(carried), &records, WINDOW);
        assert_eq!(kinds(&events), vec![(EngineEventKind::Off, T0 + 10_000)]);
        assert_eq!((events[0].lat, events[0].lng), (41.31, 69.21));
    }

    #[test]
    fn carried_flip_is_dropped_when_value_returns() {
        let seed = persisted(EngineEventKind::On, T0);
        let carried = DeferredFlip {
            ignition: false,
            ts_ms: T0 + 10_000,
            lat: 41.3,
            lng: 69.2,
        };
        let records = [record(T0 + 20_000, true), record(T0 + 3_600_000, false)];
        let events = derive_engine_events(1, Some(&seed), Some(carried), &records, WINDOW);
        assert_eq!(kinds(&events), vec![(EngineEventKind::Off, T0 + 3_600_000)]);
    }

    fn stored(recorded_at_ms: i64, ignition: bool) -> PositionRow {
        PositionRow {
            vehicle_id: 1,
            device_id: 1,
            driver_id: None,
            distance_from_prev: None,
            bytes_received: None,
            lat: 41.3,
            lng: 69.2,
            speed: 0,
            angle: 0,
            satellites: 8,
            ignition: Some(ignition),
            raw_io: BTreeMap::new(),
            recorded_at_ms,
        }
    }

    #[test]
    fn deferred_flip_is_start_of_trailing_run() {
        let seed = persisted(EngineEventKind::On, T0);
        let rows = [
            stored(T0, true),
            stored(T0 + 5_000, false),
            stored(T0 + 8_000, true),
            stored(T0 + 12_000, false),
            stored(T0 + 20_000, false),
        ];
        let flip = deferred_flip_since(&seed, &rows).expect("deferred flip");
        assert_eq!(flip.ts_ms, T0 + 12_000);
        assert!(!flip.ignition);
    }

    #[test]
    fn no_deferred_flip_when_value_matches_event() {
        let seed = persisted(EngineEventKind::On, T0);
        let rows = [stored(T0 + 5_000, false), stored(T0 + 9_000, true)];
        assert_eq!(deferred_flip_since(&seed, &rows), None);
    }
}
