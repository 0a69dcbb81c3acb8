//! PostgreSQL position store
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use async_trait::async_trait;

use crate::{
    config::{is_identifier, DatabaseConfig},
    errors::{AisTrackerError, StoreError},
    models::{Mmsi, StoredPositionRecord},
    sink::{Ack, PositionSink},
};

/// Latest vessel positions, one row per MMSI
pub struct Database {
    pool: PgPool,
    table: String,
    upsert: String,
}

impl Database {
    /// Connect using the configured pool settings and prepare the table
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AisTrackerError> {
        config.validate()?;

        info!(
            "Connecting to database: table={}, max_connections={}",
            config.table, config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Self::new(pool, &config.table).await
    }

    /// Use an existing pool; creates `table` if it does not exist
    pub async fn new(pool: PgPool, table: &str) -> Result<Self, AisTrackerError> {
        if !is_identifier(table) {
            return Err(AisTrackerError::ConfigurationError {
                message: format!("Invalid table name: {}", table),
            });
        }

        let database = Self {
            upsert: format!(
                "INSERT INTO {table} (vessel_id, name, latitude, longitude, observed_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (vessel_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    observed_at = EXCLUDED.observed_at"
            ),
            table: table.to_string(),
            pool,
        };
        database.ensure_table().await?;
        Ok(database)
    }

    /// Create the positions table.
    ///
    /// Coordinates outside WGS84 ranges are refused by the table itself.
    async fn ensure_table(&self) -> Result<(), AisTrackerError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                vessel_id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                latitude DOUBLE PRECISION NOT NULL CHECK (latitude BETWEEN -90 AND 90),
                longitude DOUBLE PRECISION NOT NULL CHECK (longitude BETWEEN -180 AND 180),
                observed_at BIGINT NOT NULL
            )",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        debug!("Table {} ready", self.table);
        Ok(())
    }
}

#[async_trait]
impl PositionSink for Database {
    async fn write(&self, record: &StoredPositionRecord) -> Result<Ack, StoreError> {
        sqlx::query(&self.upsert)
            .bind(record.vessel_id())
            .bind(&record.name)
            .bind(record.lat)
            .bind(record.lon)
            .bind(record.observed_at_unix())
            .execute(&self.pool)
            .await
            .map_err(|e| classify(record.mmsi, e))?;

        Ok(Ack { mmsi: record.mmsi })
    }
}

/// Split write failures into those affecting one record and those
/// making the store unusable.
pub(crate) fn classify(mmsi: Mmsi, err: sqlx::Error) -> StoreError {
    let fatal = match &err {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_connectivity_sqlstate(&code)),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        _ => false,
    };

    if fatal {
        StoreError::Connectivity {
            message: err.to_string(),
        }
    } else {
        StoreError::Request {
            mmsi,
            message: err.to_string(),
        }
    }
}

/// SQLSTATE codes meaning the server cannot serve any write: connection
/// exceptions, authorization failures, unknown database, operator
/// intervention and a missing table.
fn is_connectivity_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08" | "28" | "3D")) || code.starts_with("57P") || code == "42P01"
}
