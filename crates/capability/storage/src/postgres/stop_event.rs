//! Postgres 停车区间实现

use crate::error::StorageError;
use crate::models::{NewStopEvent, StopEventRecord};
use crate::traits::StopEventStore;
use domain::StopKind;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgStopEventStore {
    pub pool: PgPool,
}

impl PgStopEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

const STOP_EVENT_COLUMNS: &str = "id, car_id, kind, lat, lng, duration_seconds, \
     (extract(epoch from start_at) * 1000)::bigint as start_ms, \
     (extract(epoch from end_at) * 1000)::bigint as end_ms";

fn stop_event_from_row(row: &PgRow) -> Result<StopEventRecord, StorageError> {
    let kind: String = row.try_get("kind")?;
    let kind = StopKind::parse(&kind)
        .ok_or_else(|| StorageError::new(format!("unknown stop kind: {kind}")))?;
    let duration: Option<i32> = row.try_get("duration_seconds")?;
    Ok(StopEventRecord {
        id: row.try_get("id")?,
        vehicle_id: row.try_get("car_id")?,
        kind,
        start_ms: row.try_get("start_ms")?,
        end_ms: row.try_get("end_ms")?,
        duration_seconds: duration.map(i64::from),
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
    })
}

#[async_trait::async_trait]
impl StopEventStore for PgStopEventStore {
    async fn list_open(&self, vehicle_id: i64) -> Result<Vec<StopEventRecord>, StorageError> {
        let sql = format!(
            "select {STOP_EVENT_COLUMNS} from car_stop_events \
             where car_id = $1 and end_at is null \
             order by start_at asc"
        );
        let rows = sqlx::query(&sql)
            .bind(vehicle_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(stop_event_from_row).collect()
    }

    async fn open_event(&self, event: &NewStopEvent) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "insert into car_stop_events (car_id, kind, start_at, lat, lng) \
             values ($1, $2, to_timestamp($3 / 1000.0), $4, $5) \
             returning id",
        )
        .bind(event.vehicle_id)
        .bind(event.kind.as_str())
        .bind(event.start_ms as f64)
        .bind(event.lat)
        .bind(event.lng)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn close_event(
        &self,
        event_id: i64,
        end_ms: i64,
    ) -> Result<Option<StopEventRecord>, StorageError> {
        let sql = format!(
            "update car_stop_events set \
             end_at = to_timestamp($2 / 1000.0), \
             duration_seconds = greatest(0, ($3::bigint - (extract(epoch from start_at) * 1000)::bigint) / 1000)::int \
             where id = $1 and end_at is null \
             returning {STOP_EVENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(event_id)
            .bind(end_ms as f64)
            .bind(end_ms)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(stop_event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_events(&self, vehicle_id: i64) -> Result<Vec<StopEventRecord>, StorageError> {
        let sql = format!(
            "select {STOP_EVENT_COLUMNS} from car_stop_events \
             where car_id = $1 \
             order by start_at asc, id asc"
        );
        let rows = sqlx::query(&sql)
            .bind(vehicle_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(stop_event_from_row).collect()
    }
}
