//! 运动状态缓存内存实现

use crate::error::StorageError;
use crate::traits::MotionStateStore;
use domain::MotionState;
use std::collections::HashMap;
use std::sync::RwLock;

/// 运动状态内存缓存
pub struct InMemoryMotionStateStore {
    states: RwLock<HashMap<i64, MotionState>>,
}

impl InMemoryMotionStateStore {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMotionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MotionStateStore for InMemoryMotionStateStore {
    async fn get_state(&self, vehicle_id: i64) -> Result<Option<MotionState>, StorageError> {
        let states = self
            .states
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(states.get(&vehicle_id).cloned())
    }

    async fn set_state(&self, vehicle_id: i64, state: &MotionState) -> Result<(), StorageError> {
        let mut states = self
            .states
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        states.insert(vehicle_id, state.clone());
        Ok(())
    }

    async fn list_vehicle_ids(&self) -> Result<Vec<i64>, StorageError> {
        let states = self
            .states
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut ids: Vec<i64> = states.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
