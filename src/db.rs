use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection as _;

use crate::config;
use crate::error::{Error, Result};
use crate::models::CollisionRecord;

/// Advisory-lock key guarding bulk loads; any concurrent loader sharing the
/// database coordinates through this value.
pub const LOAD_LOCK_KEY: i64 = 0x554b_434f_4c;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS collisions (
        accident_index        TEXT PRIMARY KEY,
        accident_date         DATE NOT NULL,
        accident_year         SMALLINT NOT NULL,
        accident_time         TIME,
        latitude              DOUBLE PRECISION,
        longitude             DOUBLE PRECISION,
        severity              TEXT NOT NULL,
        number_of_casualties  SMALLINT NOT NULL,
        number_of_vehicles    SMALLINT NOT NULL,
        road_type             TEXT,
        speed_limit           SMALLINT,
        weather               TEXT,
        light_conditions      TEXT,
        urban_or_rural        TEXT,
        raw_json              JSONB
    )",
    "CREATE INDEX IF NOT EXISTS ix_collisions_year ON collisions (accident_year)",
    "CREATE INDEX IF NOT EXISTS ix_collisions_severity ON collisions (severity)",
    "CREATE INDEX IF NOT EXISTS ix_collisions_road_type ON collisions (road_type)",
    "CREATE INDEX IF NOT EXISTS ix_collisions_location ON collisions (latitude, longitude)",
];

const INSERT_SQL: &str = "INSERT INTO collisions (
        accident_index, accident_date, accident_year, accident_time,
        latitude, longitude, severity, number_of_casualties,
        number_of_vehicles, road_type, speed_limit, weather,
        light_conditions, urban_or_rural, raw_json
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15::jsonb)
    ON CONFLICT (accident_index) DO NOTHING";

/// Builds the process-wide connection pool.
///
/// Connectivity is verified here so an unreachable or misconfigured
/// warehouse fails at startup with the target named, not on the first query.
pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .map_err(|source| Error::Connection {
            url: config::redact_url(url),
            source,
        })
}

/// Creates the collisions table and its supporting indexes if absent.
pub async fn init_db(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn collision_count(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collisions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Inserts one batch of records inside a single transaction.
///
/// Duplicate accident indexes are dropped by the warehouse; the return value
/// is (inserted, deduplicated).
pub async fn insert_batch(pool: &PgPool, records: &[CollisionRecord]) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for record in records {
        let result = sqlx::query(INSERT_SQL)
            .bind(&record.accident_index)
            .bind(record.date)
            .bind(record.year as i16)
            .bind(record.time)
            .bind(record.latitude)
            .bind(record.longitude)
            .bind(record.severity.as_str())
            .bind(record.casualties)
            .bind(record.vehicles)
            .bind(record.road_type.as_deref())
            .bind(record.speed_limit)
            .bind(record.weather.as_deref())
            .bind(record.light_conditions.as_deref())
            .bind(record.urban_or_rural.as_deref())
            .bind(&record.raw_json)
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok((inserted, records.len() as u64 - inserted))
}

/// A session-scoped advisory lock held for the duration of a bulk load.
///
/// The lock lives on a dedicated connection checked out of the pool and is
/// released explicitly; if the unlock fails the session is closed outright
/// so the lock dies with it instead of riding back into the pool.
pub struct LoadLock {
    conn: sqlx::pool::PoolConnection<sqlx::Postgres>,
}

impl LoadLock {
    /// Attempts to take the load lock without blocking. Returns `None` when
    /// another loader already holds it.
    pub async fn try_acquire(pool: &PgPool) -> Result<Option<Self>> {
        let mut conn = pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(LOAD_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await?;
        if locked {
            Ok(Some(Self { conn }))
        } else {
            Ok(None)
        }
    }

    pub async fn release(mut self) -> Result<()> {
        match sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(LOAD_LOCK_KEY)
            .execute(&mut *self.conn)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let _ = self.conn.detach().close().await;
                Err(err.into())
            }
        }
    }
}
