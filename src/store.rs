//! SQLite access for everything the pipeline persists.
//!
//! One connection is held for the whole run and every statement commits on
//! its own, so a crash loses at most the statement in flight.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::debug;

use crate::System;
use crate::record::{ArrivalRecord, StationKey};
use crate::ridership::RidershipEntry;
use crate::stops::Station;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS line_ids (name TEXT, id INTEGER PRIMARY KEY)",
    r#"CREATE TABLE IF NOT EXISTS boston (
        line_id INTEGER,
        station1_id INTEGER,
        station2_id INTEGER,
        prd_time INTEGER,
        arr_time INTEGER,
        "offset" INTEGER,
        UNIQUE (line_id, station1_id, station2_id, prd_time, arr_time, "offset")
    )"#,
    r#"CREATE TABLE IF NOT EXISTS chicago (
        line_id INTEGER,
        station_id INTEGER,
        train_num INTEGER,
        prd_time INTEGER,
        arr_time INTEGER,
        "offset" INTEGER,
        PRIMARY KEY (station_id, train_num)
    )"#,
    "CREATE TABLE IF NOT EXISTS chicago_stations (id INTEGER PRIMARY KEY, line_id INTEGER, name TEXT, lat INTEGER, lon INTEGER)",
    "CREATE TABLE IF NOT EXISTS Ridership (line_id INTEGER PRIMARY KEY, avg_wkdy_ridership INTEGER, share REAL)",
    r#"CREATE TABLE IF NOT EXISTS ingest_watermarks (
        system TEXT PRIMARY KEY,
        last_key TEXT NOT NULL,
        total_inserted INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
];

/// Progress marker for one system's incremental ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub last_key: String,
    pub total_inserted: i64,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Self::open(options).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::open(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn open(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(tables = SCHEMA.len(), "Schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // line_ids

    /// Returns `true` if the row was new.
    pub async fn insert_line_id(&self, name: &str, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("INSERT OR IGNORE INTO line_ids (name, id) VALUES (?, ?)")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn line_id(&self, name: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM line_ids WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    /// Number of seeded lines whose name starts with `prefix`.
    pub async fn line_count(&self, prefix: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM line_ids WHERE substr(name, 1, length(?)) = ?")
            .bind(prefix)
            .bind(prefix)
            .fetch_one(&self.pool)
            .await
    }

    // arrivals

    pub async fn contains_arrival(&self, record: &ArrivalRecord) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = match record.stations {
            StationKey::Pair { from, to } => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT 1 FROM boston WHERE line_id = ? AND station1_id = ? AND station2_id = ? AND prd_time = ? AND arr_time = ?",
                )
                .bind(record.line_id)
                .bind(from)
                .bind(to)
                .bind(record.predicted)
                .bind(record.actual)
                .fetch_optional(&self.pool)
                .await?
            }
            StationKey::Train { station, train } => {
                sqlx::query_scalar::<_, i64>("SELECT 1 FROM chicago WHERE station_id = ? AND train_num = ?")
                    .bind(station)
                    .bind(train)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(found.is_some())
    }

    /// Insert-if-absent. Returns `true` if a row was written.
    pub async fn insert_arrival(&self, record: &ArrivalRecord) -> Result<bool, sqlx::Error> {
        let result = match record.stations {
            StationKey::Pair { from, to } => {
                sqlx::query(
                    r#"INSERT OR IGNORE INTO boston (line_id, station1_id, station2_id, prd_time, arr_time, "offset") VALUES (?, ?, ?, ?, ?, ?)"#,
                )
                .bind(record.line_id)
                .bind(from)
                .bind(to)
                .bind(record.predicted)
                .bind(record.actual)
                .bind(record.offset)
                .execute(&self.pool)
                .await?
            }
            StationKey::Train { station, train } => {
                sqlx::query(
                    r#"INSERT OR IGNORE INTO chicago (line_id, station_id, train_num, prd_time, arr_time, "offset") VALUES (?, ?, ?, ?, ?, ?)"#,
                )
                .bind(record.line_id)
                .bind(station)
                .bind(train)
                .bind(record.predicted)
                .bind(record.actual)
                .bind(record.offset)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    pub async fn arrival_count(&self, system: System) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {}", system.arrivals_table());
        sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await
    }

    // chicago_stations

    /// Adds a location row if the station is not known yet.
    pub async fn insert_station(&self, station: &Station, line_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO chicago_stations (id, line_id, name, lat, lon) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(station.id)
        .bind(line_id)
        .bind(&station.name)
        .bind(station.latitude.round() as i64)
        .bind(station.longitude.round() as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_station_line(&self, station_id: i64, line_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chicago_stations SET line_id = ? WHERE id = ?")
            .bind(line_id)
            .bind(station_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn station_line(&self, station_id: i64) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT line_id FROM chicago_stations WHERE id = ?")
            .bind(station_id)
            .fetch_optional(&self.pool)
            .await
    }

    // ingest_watermarks

    pub async fn watermark(&self, system: System) -> Result<Option<Watermark>, sqlx::Error> {
        let row = sqlx::query_as::<_, (String, i64, String)>(
            "SELECT last_key, total_inserted, updated_at FROM ingest_watermarks WHERE system = ?",
        )
        .bind(system.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(last_key, total_inserted, updated_at)| Watermark {
            last_key,
            total_inserted,
            updated_at,
        }))
    }

    /// Moves the watermark to `last_key` and adds `inserted` to the running total.
    pub async fn advance_watermark(
        &self,
        system: System,
        last_key: &str,
        inserted: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ingest_watermarks (system, last_key, total_inserted, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(system) DO UPDATE SET
                last_key = excluded.last_key,
                total_inserted = ingest_watermarks.total_inserted + excluded.total_inserted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(system.as_str())
        .bind(last_key)
        .bind(inserted)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Ridership

    pub async fn insert_ridership(&self, entry: &RidershipEntry) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO Ridership (line_id, avg_wkdy_ridership, share) VALUES (?, ?, ?)",
        )
        .bind(entry.line_id)
        .bind(entry.ridership)
        .bind(entry.share)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn ridership(&self, line_id: i64) -> Result<Option<(i64, f64)>, sqlx::Error> {
        sqlx::query_as::<_, (i64, f64)>("SELECT avg_wkdy_ridership, share FROM Ridership WHERE line_id = ?")
            .bind(line_id)
            .fetch_optional(&self.pool)
            .await
    }
}
