//! 司机分配内存实现

use crate::error::StorageError;
use crate::traits::DriverAssignmentStore;
use std::collections::HashMap;
use std::sync::RwLock;

/// 司机分配内存存储（车辆 → 当前司机）
pub struct InMemoryDriverAssignmentStore {
    assignments: RwLock<HashMap<i64, i64>>,
}

impl InMemoryDriverAssignmentStore {
    pub fn new() -> Self {
        Self {
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// 分配司机（覆盖当前分配）
    pub fn assign(&self, vehicle_id: i64, driver_id: i64) {
        if let Ok(mut assignments) = self.assignments.write() {
            assignments.insert(vehicle_id, driver_id);
        }
    }

    /// 结束车辆当前分配
    pub fn release(&self, vehicle_id: i64) {
        if let Ok(mut assignments) = self.assignments.write() {
            assignments.remove(&vehicle_id);
        }
    }
}

impl Default for InMemoryDriverAssignmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DriverAssignmentStore for InMemoryDriverAssignmentStore {
    async fn current_driver(&self, vehicle_id: i64) -> Result<Option<i64>, StorageError> {
        let assignments = self
            .assignments
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(assignments.get(&vehicle_id).copied())
    }
}
