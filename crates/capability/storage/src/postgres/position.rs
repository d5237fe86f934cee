//! Postgres 定位写入实现
//!
//! `persist_batch` 在单个事务内写入定位明细、发动机事件与最新定位，
//! 任一语句失败则整体回滚，队列重投后依靠唯一约束去重。

use crate::error::StorageError;
use crate::models::{
    EngineEventRecord, LastPositionRecord, PersistSummary, PositionBatch, PositionRow,
};
use crate::traits::PositionStore;
use domain::EngineEventKind;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

pub struct PgPositionStore {
    pub pool: PgPool,
}

impl PgPositionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn engine_event_from_row(row: &PgRow) -> Result<EngineEventRecord, StorageError> {
    let kind: String = row.try_get("event_type")?;
    let kind = EngineEventKind::parse(&kind)
        .ok_or_else(|| StorageError::new(format!("unknown engine event type: {kind}")))?;
    Ok(EngineEventRecord {
        id: row.try_get("id")?,
        vehicle_id: row.try_get("car_id")?,
        kind,
        event_at_ms: row.try_get("event_at_ms")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
    })
}

const POSITION_COLUMNS: &str = "select car_id, device_id, driver_id, distance_from_prev, \
     bytes_received, lat, lng, speed, angle, satellites, ignition, raw_io, \
     (extract(epoch from recorded_at) * 1000)::bigint as recorded_at_ms";

fn position_from_row(row: &PgRow) -> Result<PositionRow, StorageError> {
    let raw_io: Json<BTreeMap<u8, i64>> = row.try_get("raw_io")?;
    Ok(PositionRow {
        vehicle_id: row.try_get("car_id")?,
        device_id: row.try_get("device_id")?,
        driver_id: row.try_get("driver_id")?,
        distance_from_prev: row.try_get("distance_from_prev")?,
        bytes_received: row.try_get("bytes_received")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        speed: row.try_get("speed")?,
        angle: row.try_get("angle")?,
        satellites: row.try_get("satellites")?,
        ignition: row.try_get("ignition")?,
        raw_io: raw_io.0,
        recorded_at_ms: row.try_get("recorded_at_ms")?,
    })
}

#[async_trait::async_trait]
impl PositionStore for PgPositionStore {
    async fn last_position(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<LastPositionRecord>, StorageError> {
        let row = sqlx::query(
            "select car_id, lat, lng, speed, angle, altitude, satellites, ignition, movement, \
             odometer, gsm_signal, battery_voltage, ext_voltage, \
             (extract(epoch from recorded_at) * 1000)::bigint as recorded_at_ms \
             from car_last_positions where car_id = $1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(LastPositionRecord {
            vehicle_id: row.try_get("car_id")?,
            lat: row.try_get("lat")?,
            lng: row.try_get("lng")?,
            speed: row.try_get("speed")?,
            angle: row.try_get("angle")?,
            altitude: row.try_get("altitude")?,
            satellites: row.try_get("satellites")?,
            ignition: row.try_get("ignition")?,
            movement: row.try_get("movement")?,
            odometer: row.try_get("odometer")?,
            gsm_signal: row.try_get("gsm_signal")?,
            battery_voltage: row.try_get("battery_voltage")?,
            ext_voltage: row.try_get("ext_voltage")?,
            recorded_at_ms: row.try_get("recorded_at_ms")?,
        }))
    }

    async fn last_engine_event(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<EngineEventRecord>, StorageError> {
        let row = sqlx::query(
            "select id, car_id, event_type, lat, lng, \
             (extract(epoch from event_at) * 1000)::bigint as event_at_ms \
             from car_engine_events where car_id = $1 \
             order by event_at desc \
             limit 1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(engine_event_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn persist_batch(&self, batch: &PositionBatch) -> Result<PersistSummary, StorageError> {
        let mut summary = PersistSummary::default();
        let mut tx = self.pool.begin().await?;

        for row in &batch.positions {
            let result = sqlx::query(
                "insert into car_positions (car_id, device_id, driver_id, distance_from_prev, \
                 bytes_received, lat, lng, speed, angle, satellites, ignition, raw_io, recorded_at) \
                 values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, to_timestamp($13 / 1000.0)) \
                 on conflict (car_id, recorded_at) do nothing",
            )
            .bind(row.vehicle_id)
            .bind(row.device_id)
            .bind(row.driver_id)
            .bind(row.distance_from_prev)
            .bind(row.bytes_received)
            .bind(row.lat)
            .bind(row.lng)
            .bind(row.speed)
            .bind(row.angle)
            .bind(row.satellites)
            .bind(row.ignition)
            .bind(Json(row.raw_io.clone()))
            .bind(row.recorded_at_ms as f64)
            .execute(&mut *tx)
            .await?;
            summary.positions_written += result.rows_affected() as usize;
        }

        for event in &batch.engine_events {
            let result = sqlx::query(
                "insert into car_engine_events (car_id, event_type, event_at, lat, lng) \
                 values ($1, $2, to_timestamp($3 / 1000.0), $4, $5) \
                 on conflict (car_id, event_at) do nothing",
            )
            .bind(event.vehicle_id)
            .bind(event.kind.as_str())
            .bind(event.event_at_ms as f64)
            .bind(event.lat)
            .bind(event.lng)
            .execute(&mut *tx)
            .await?;
            summary.engine_events_written += result.rows_affected() as usize;
        }

        let last = &batch.last_position;
        sqlx::query(
            "insert into car_last_positions (car_id, lat, lng, speed, angle, altitude, satellites, \
             ignition, movement, odometer, gsm_signal, battery_voltage, ext_voltage, recorded_at, updated_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, to_timestamp($14 / 1000.0), now()) \
             on conflict (car_id) do update set \
             lat = excluded.lat, lng = excluded.lng, speed = excluded.speed, angle = excluded.angle, \
             altitude = excluded.altitude, satellites = excluded.satellites, ignition = excluded.ignition, \
             movement = excluded.movement, odometer = excluded.odometer, gsm_signal = excluded.gsm_signal, \
             battery_voltage = excluded.battery_voltage, ext_voltage = excluded.ext_voltage, \
             recorded_at = excluded.recorded_at, updated_at = now() \
             where car_last_positions.recorded_at <= excluded.recorded_at",
        )
        .bind(last.vehicle_id)
        .bind(last.lat)
        .bind(last.lng)
        .bind(last.speed)
        .bind(last.angle)
        .bind(last.altitude)
        .bind(last.satellites)
        .bind(last.ignition)
        .bind(last.movement)
        .bind(last.odometer)
        .bind(last.gsm_signal)
        .bind(last.battery_voltage)
        .bind(last.ext_voltage)
        .bind(last.recorded_at_ms as f64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(summary)
    }

    async fn list_positions(&self, vehicle_id: i64) -> Result<Vec<PositionRow>, StorageError> {
        let rows = sqlx::query(&format!(
            "{POSITION_COLUMNS} from car_positions where car_id = $1 order by recorded_at asc"
        ))
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn list_positions_between(
        &self,
        vehicle_id: i64,
        after_ms: i64,
        until_ms: i64,
    ) -> Result<Vec<PositionRow>, StorageError> {
        let rows = sqlx::query(&format!(
            "{POSITION_COLUMNS} from car_positions where car_id = $1 \
             and recorded_at > to_timestamp($2 / 1000.0) \
             and recorded_at <= to_timestamp($3 / 1000.0) \
             order by recorded_at asc"
        ))
        .bind(vehicle_id)
        .bind(after_ms as f64)
        .bind(until_ms as f64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn list_engine_events(
        &self,
        vehicle_id: i64,
    ) -> Result<Vec<EngineEventRecord>, StorageError> {
        let rows = sqlx::query(
            "select id, car_id, event_type, lat, lng, \
             (extract(epoch from event_at) * 1000)::bigint as event_at_ms \
             from car_engine_events where car_id = $1 \
             order by event_at asc",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(engine_event_from_row).collect()
    }
}
