use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use time::OffsetDateTime;

use crate::decision::Mode;
use crate::telemetry::TelemetrySnapshot;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/irrigation/controller.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS controller_state (
              key   TEXT PRIMARY KEY,
              value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create controller_state failed")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
              id            INTEGER PRIMARY KEY AUTOINCREMENT,
              ts            INTEGER NOT NULL,
              moisture_raw  INTEGER NOT NULL,
              moisture_pct  REAL NOT NULL,
              temperature_c REAL NOT NULL,
              humidity_pct  REAL NOT NULL,
              pump_on       INTEGER NOT NULL,
              pump_state    TEXT NOT NULL,
              adjusted_dry  INTEGER NOT NULL,
              adjusted_wet  INTEGER NOT NULL,
              mode          INTEGER NOT NULL,
              sensor_fault  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create snapshots failed")?;

        Ok(())
    }

    // ----------------------------
    // Mode persistence (boot resume)
    // ----------------------------

    pub async fn save_mode(&self, mode: Mode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO controller_state (key, value) VALUES ('mode', ?)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
        )
        .bind(mode.as_wire().to_string())
        .execute(&self.pool)
        .await
        .context("save_mode failed")?;
        Ok(())
    }

    pub async fn load_mode(&self) -> Result<Option<Mode>> {
        let row = sqlx::query("SELECT value FROM controller_state WHERE key = 'mode'")
            .fetch_optional(&self.pool)
            .await
            .context("load_mode failed")?;

        Ok(row
            .and_then(|r| r.get::<String, _>("value").parse::<u8>().ok())
            .and_then(Mode::from_wire))
    }

    // ----------------------------
    // Snapshot history
    // ----------------------------

    /// Append a telemetry snapshot with the current wall-clock timestamp.
    pub async fn insert_snapshot(&self, snap: &TelemetrySnapshot) -> Result<()> {
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO snapshots (
              ts, moisture_raw, moisture_pct, temperature_c, humidity_pct,
              pump_on, pump_state, adjusted_dry, adjusted_wet, mode, sensor_fault
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts)
        .bind(snap.moisture_raw)
        .bind(snap.moisture_pct as f64)
        .bind(snap.temperature_c as f64)
        .bind(snap.humidity_pct as f64)
        .bind(snap.pump_on as i64)
        .bind(format!("{:?}", snap.pump_state).to_lowercase())
        .bind(snap.adjusted_dry)
        .bind(snap.adjusted_wet)
        .bind(snap.mode as i64)
        .bind(snap.sensor_fault as i64)
        .execute(&self.pool)
        .await
        .context("insert_snapshot failed")?;
        Ok(())
    }

    /// Most recent `n` raw moisture values, newest first.
    pub async fn recent_moisture(&self, n: i64) -> Result<Vec<i32>> {
        let rows = sqlx::query("SELECT moisture_raw FROM snapshots ORDER BY ts DESC, id DESC LIMIT ?")
            .bind(n)
            .fetch_all(&self.pool)
            .await
            .context("recent_moisture failed")?;

        Ok(rows.iter().map(|r| r.get::<i32, _>("moisture_raw")).collect())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
