//! Postgres 司机分配查询

use crate::error::StorageError;
use crate::traits::DriverAssignmentStore;
use sqlx::{PgPool, Row};

pub struct PgDriverAssignmentStore {
    pub pool: PgPool,
}

impl PgDriverAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl DriverAssignmentStore for PgDriverAssignmentStore {
    async fn current_driver(&self, vehicle_id: i64) -> Result<Option<i64>, StorageError> {
        let row = sqlx::query(
            "select driver_id from car_drivers \
             where car_id = $1 and end_at is null \
             order by start_at desc \
             limit 1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("driver_id")?)),
            None => Ok(None),
        }
    }
}
