use domain::{IoSnapshot, MotionState, MotionStatus, Record, StopKind};

fn first_fix() -> Record {
    Record {
        ts_ms: 1_767_300_000_000,
        priority: 0,
        lat: 41.2995,
        lng: 69.2401,
        altitude: 450,
        angle: 0,
        satellites: 9,
        speed: 35,
        io: IoSnapshot::default(),
    }
}

#[test]
fn seed_starts_moving_and_replays_first_record() {
    let state = MotionState::seed(&first_fix());
    assert_eq!(state.status, MotionStatus::Moving);
    assert_eq!(state.since_ms, 1_767_300_000_000);
    assert_eq!(state.open_event_id, None);
    assert!(state.last_record_ms < first_fix().ts_ms);
}

#[test]
fn cached_state_uses_snake_case_status() {
    let state = MotionState {
        status: MotionStatus::ParkingCandidate,
        ..MotionState::anchored(MotionStatus::Moving, &first_fix())
    };
    let json = serde_json::to_value(&state).expect("encode");
    assert_eq!(json["status"], "parking_candidate");
    let back: MotionState = serde_json::from_value(json).expect("decode");
    assert_eq!(back, state);
}

#[test]
fn state_written_without_last_record_still_loads() {
    let json = r#"{"status":"stopped","since_ms":1767300000000,"lat":41.3,"lng":69.2,"open_event_id":5}"#;
    let state: MotionState = serde_json::from_str(json).expect("decode");
    assert_eq!(state.status, MotionStatus::Stopped);
    assert_eq!(state.open_event_id, Some(5));
    assert_eq!(state.last_record_ms, 0);
}

#[test]
fn candidates_promote_to_their_stop_kind() {
    assert_eq!(MotionStatus::StopCandidate.promotes_to(), Some(StopKind::Stop));
    assert_eq!(
        MotionStatus::ParkingCandidate.promotes_to(),
        Some(StopKind::Parking)
    );
    assert_eq!(MotionStatus::Parking.promotes_to(), None);
    assert_eq!(MotionStatus::confirmed(StopKind::Stop), MotionStatus::Stopped);
    assert!(!MotionStatus::Moving.is_candidate());
}
