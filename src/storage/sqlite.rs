//! SQLite-backed state store.
//!
//! One row per game holding the serialized state. A save is a single
//! upsert, so a crash mid-write never leaves a half-updated game.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tracing::{debug, info};

use super::StateStore;
use crate::types::GameState;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url`, e.g.
    /// `sqlite:data/jackpot.db` or `sqlite::memory:`.
    pub async fn new(database_url: &str) -> Result<Self> {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("Failed to create database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true);

        // An in-memory database only exists on its own connection
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(database_url, "SQLite state store initialized");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_state (
                game_id TEXT PRIMARY KEY NOT NULL,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create game_state table")?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self, game_id: &str) -> Result<Option<GameState>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT state_json FROM game_state WHERE game_id = ?")
                .bind(game_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch game state")?;

        row.map(|(json,)| {
            serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse stored state for {game_id}"))
        })
        .transpose()
    }

    async fn save(&self, state: &GameState) -> Result<()> {
        let json = serde_json::to_string(state).context("Failed to serialise game state")?;
        sqlx::query(
            r#"
            INSERT INTO game_state (game_id, state_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(game_id) DO UPDATE SET
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.game_id)
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save game state")?;

        debug!(game_id = %state.game_id, "State saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<GameState>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT state_json FROM game_state ORDER BY game_id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch game states")?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).context("Failed to parse stored state"))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
