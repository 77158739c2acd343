//! Persistence layer.
//!
//! Game state is keyed by game id behind the [`StateStore`] trait so the
//! engine does not care where it lives. Writes are all-or-nothing: the JSON
//! store writes a temp file and renames it over the old one, the SQLite
//! store upserts a single row.

pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::types::GameState;

pub use sqlite::SqliteStore;

/// Keyed store for per-game state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// State for `game_id`, or `None` if the game has never been saved.
    async fn load(&self, game_id: &str) -> Result<Option<GameState>>;

    /// Atomically replace the stored state for `state.game_id`.
    async fn save(&self, state: &GameState) -> Result<()>;

    /// Every stored game state, ordered by game id.
    async fn list(&self) -> Result<Vec<GameState>>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    games: BTreeMap<String, GameState>,
}

/// All games in one pretty-printed JSON document: `{"games": {id: state}}`.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, GameState>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<BTreeMap<String, GameState>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            info!(path = %self.path.display(), "No saved state found, starting fresh");
            return Ok(BTreeMap::new());
        }
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read state from {}", self.path.display()))?;
        let file: StateFile = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state from {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            games = file.games.len(),
            "State loaded from disk"
        );
        Ok(file.games)
    }

    async fn write_file(&self, games: &BTreeMap<String, GameState>) -> Result<()> {
        let json = serde_json::to_string_pretty(&StateFile {
            games: games.clone(),
        })
        .context("Failed to serialise game state")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write state to {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move state into {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, game_id: &str) -> Result<Option<GameState>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache.as_ref().and_then(|games| games.get(game_id).cloned()))
    }

    async fn save(&self, state: &GameState) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut games = match cache.take() {
            Some(games) => games,
            None => self.read_file().await?,
        };
        let previous = games.insert(state.game_id.clone(), state.clone());

        match self.write_file(&games).await {
            Ok(()) => {
                *cache = Some(games);
                debug!(game_id = %state.game_id, path = %self.path.display(), "State saved");
                Ok(())
            }
            Err(e) => {
                // Keep the cache in step with what is on disk
                match previous {
                    Some(prev) => games.insert(state.game_id.clone(), prev),
                    None => games.remove(&state.game_id),
                };
                *cache = Some(games);
                Err(e)
            }
        }
    }

    async fn list(&self) -> Result<Vec<GameState>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache
            .as_ref()
            .map(|games| games.values().cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Non-persistent store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    games: RwLock<BTreeMap<String, GameState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, game_id: &str) -> Result<Option<GameState>> {
        Ok(self.games.read().await.get(game_id).cloned())
    }

    async fn save(&self, state: &GameState) -> Result<()> {
        self.games
            .write()
            .await
            .insert(state.game_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<GameState>> {
        Ok(self.games.read().await.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
