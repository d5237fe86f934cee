//! 停车区间内存实现

use crate::error::StorageError;
use crate::models::{NewStopEvent, StopEventRecord, duration_seconds};
use crate::traits::StopEventStore;
use std::sync::RwLock;

#[derive(Default)]
struct StopEventState {
    events: Vec<StopEventRecord>,
    next_id: i64,
}

/// 停车区间内存存储
pub struct InMemoryStopEventStore {
    state: RwLock<StopEventState>,
}

impl InMemoryStopEventStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StopEventState::default()),
        }
    }
}

impl Default for InMemoryStopEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StopEventStore for InMemoryStopEventStore {
    async fn list_open(&self, vehicle_id: i64) -> Result<Vec<StopEventRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .events
            .iter()
            .filter(|event| event.vehicle_id == vehicle_id && event.is_open())
            .cloned()
            .collect())
    }

    async fn open_event(&self, event: &NewStopEvent) -> Result<i64, StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(StopEventRecord {
            id,
            vehicle_id: event.vehicle_id,
            kind: event.kind,
            start_ms: event.start_ms,
            end_ms: None,
            duration_seconds: None,
            lat: event.lat,
            lng: event.lng,
        });
        Ok(id)
    }

    async fn close_event(
        &self,
        event_id: i64,
        end_ms: i64,
    ) -> Result<Option<StopEventRecord>, StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(event) = state
            .events
            .iter_mut()
            .find(|event| event.id == event_id && event.is_open())
        else {
            return Ok(None);
        };
        event.end_ms = Some(end_ms);
        event.duration_seconds = Some(duration_seconds(event.start_ms, end_ms));
        Ok(Some(event.clone()))
    }

    async fn list_events(&self, vehicle_id: i64) -> Result<Vec<StopEventRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut events: Vec<StopEventRecord> = state
            .events
            .iter()
            .filter(|event| event.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.start_ms, event.id));
        Ok(events)
    }
}
