//! Postgres 设备绑定查询

use crate::error::StorageError;
use crate::traits::DeviceBindingStore;
use domain::VehicleBinding;
use sqlx::{PgPool, Row};

pub struct PgDeviceBindingStore {
    pub pool: PgPool,
}

impl PgDeviceBindingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl DeviceBindingStore for PgDeviceBindingStore {
    async fn resolve_imei(&self, imei: &str) -> Result<Option<VehicleBinding>, StorageError> {
        let row = sqlx::query(
            "select cd.car_id, d.id as device_id \
             from devices d \
             join car_devices cd on cd.device_id = d.id \
             where d.imei = $1 \
             and d.deleted_at is null \
             and cd.end_at is null \
             order by cd.start_at desc \
             limit 1",
        )
        .bind(imei)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(VehicleBinding {
            vehicle_id: row.try_get("car_id")?,
            device_id: row.try_get("device_id")?,
        }))
    }
}
