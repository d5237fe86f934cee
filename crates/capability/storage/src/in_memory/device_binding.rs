//! 设备绑定内存实现

use crate::error::StorageError;
use crate::traits::DeviceBindingStore;
use domain::VehicleBinding;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备绑定内存存储
///
/// 使用 RwLock + HashMap（IMEI → 绑定）提供线程安全的内存存储。
pub struct InMemoryDeviceBindingStore {
    bindings: RwLock<HashMap<String, VehicleBinding>>,
}

impl InMemoryDeviceBindingStore {
    /// 创建空的绑定存储
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// 绑定 IMEI 到车辆（覆盖已有绑定）
    pub fn bind(&self, imei: impl Into<String>, binding: VehicleBinding) {
        if let Ok(mut bindings) = self.bindings.write() {
            bindings.insert(imei.into(), binding);
        }
    }

    /// 解除 IMEI 绑定
    pub fn unbind(&self, imei: &str) {
        if let Ok(mut bindings) = self.bindings.write() {
            bindings.remove(imei);
        }
    }
}

impl Default for InMemoryDeviceBindingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceBindingStore for InMemoryDeviceBindingStore {
    async fn resolve_imei(&self, imei: &str) -> Result<Option<VehicleBinding>, StorageError> {
        let bindings = self
            .bindings
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(bindings.get(imei).copied())
    }
}
