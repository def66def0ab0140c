// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`SnapshotStore`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use vitrina_config::model::StorageConfig;
use vitrina_core::{
    AdapterType, EngineSnapshot, HealthStatus, LedgerState, PluginAdapter, Session, SnapshotStore,
    VitrinaError,
};

use crate::database::{Database, map_tr_err};

/// SQLite-backed snapshot store.
///
/// The database is opened on the first call to
/// [`SnapshotStore::initialize`].
pub struct SqliteSnapshotStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

/// Rows read back from the database, before JSON decoding.
struct StoredRows {
    ledger: (String, String),
    sessions: Vec<(String, String)>,
}

impl SqliteSnapshotStore {
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, VitrinaError> {
        self.db.get().ok_or_else(|| VitrinaError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), VitrinaError> {
        if !self.config.wal_mode {
            return Ok(());
        }
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

fn encode_err(e: serde_json::Error) -> VitrinaError {
    VitrinaError::Storage {
        source: Box::new(e),
    }
}

#[async_trait]
impl PluginAdapter for SqliteSnapshotStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, VitrinaError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VitrinaError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn initialize(&self) -> Result<(), VitrinaError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| VitrinaError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite snapshot store initialized");
        Ok(())
    }

    async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), VitrinaError> {
        let taken_at = snapshot.taken_at.to_rfc3339();
        let ledger = serde_json::to_string(&snapshot.ledger).map_err(encode_err)?;
        let sessions = snapshot
            .sessions
            .iter()
            .map(|s| Ok((s.id.clone(), serde_json::to_string(s).map_err(encode_err)?)))
            .collect::<Result<Vec<_>, VitrinaError>>()?;
        let count = sessions.len();

        self.db()?
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM session_snapshots", [])?;
                {
                    let mut insert = tx.prepare(
                        "INSERT INTO session_snapshots (id, body, updated_at) VALUES (?1, ?2, ?3)",
                    )?;
                    for (id, body) in &sessions {
                        insert.execute(params![id, body, taken_at])?;
                    }
                }
                tx.execute(
                    "INSERT INTO ledger_snapshot (id, body, updated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                    params![ledger, taken_at],
                )?;
                tx.commit()
            })
            .await
            .map_err(map_tr_err)?;
        debug!(sessions = count, "snapshot written");
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>, VitrinaError> {
        let rows = self
            .db()?
            .connection()
            .call(|conn| -> Result<Option<StoredRows>, rusqlite::Error> {
                let ledger: Option<(String, String)> = conn
                    .query_row(
                        "SELECT body, updated_at FROM ledger_snapshot WHERE id = 1",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some(ledger) = ledger else {
                    return Ok(None);
                };
                let mut stmt =
                    conn.prepare("SELECT id, body FROM session_snapshots ORDER BY id")?;
                let sessions = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<(String, String)>, _>>()?;
                Ok(Some(StoredRows { ledger, sessions }))
            })
            .await
            .map_err(map_tr_err)?;

        let Some(StoredRows {
            ledger: (ledger_body, updated_at),
            sessions: session_rows,
        }) = rows
        else {
            return Ok(None);
        };

        let ledger: LedgerState = serde_json::from_str(&ledger_body).map_err(encode_err)?;
        let taken_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| VitrinaError::Storage {
                source: Box::new(e),
            })?;

        let mut sessions = Vec::with_capacity(session_rows.len());
        for (id, body) in session_rows {
            match serde_json::from_str::<Session>(&body) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(customer = %id, error = %e, "skipping unreadable session snapshot"),
            }
        }

        Ok(Some(EngineSnapshot {
            sessions,
            ledger,
            taken_at,
        }))
    }

    async fn close(&self) -> Result<(), VitrinaError> {
        let db = self.db()?;
        self.checkpoint(db).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;
    use vitrina_core::{LedgerMetrics, SessionState};

    use super::*;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            enabled: true,
            database_path: path.to_string(),
            wal_mode: true,
            snapshot_interval_secs: 60,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn snapshot(ids: &[&str], used: u64) -> EngineSnapshot {
        EngineSnapshot {
            sessions: ids
                .iter()
                .map(|id| {
                    let mut session = Session::new(*id, at(0));
                    session.state = SessionState::QuoteSent;
                    session
                })
                .collect(),
            ledger: LedgerState {
                month_key: "2025-10".into(),
                monthly_allowance: 100,
                used,
                bonus_added: 0,
                metrics: LedgerMetrics {
                    intent_yes: used,
                    ..LedgerMetrics::default()
                },
            },
            taken_at: at(60),
        }
    }

    async fn store(dir: &tempfile::TempDir) -> SqliteSnapshotStore {
        let path = dir.path().join("snapshots.db");
        let store = SqliteSnapshotStore::new(make_config(path.to_str().unwrap()));
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn store_implements_plugin_adapter() {
        let store = SqliteSnapshotStore::new(make_config("unused.db"));
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn load_on_empty_database_returns_none() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_snapshot_loads_back() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;
        let original = snapshot(&["50688881234", "50677776666"], 3);
        store.save(&original).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.ledger, original.ledger);
        assert_eq!(loaded.taken_at, original.taken_at);
        let mut ids: Vec<_> = loaded.sessions.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["50677776666", "50688881234"]);
        assert_eq!(loaded.sessions[0].state, SessionState::QuoteSent);
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;
        store
            .save(&snapshot(&["50688881234", "50677776666"], 1))
            .await
            .unwrap();
        store.save(&snapshot(&["50611112222"], 2)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        assert_eq!(loaded.sessions[0].id, "50611112222");
        assert_eq!(loaded.ledger.used, 2);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = store(&dir).await;
            store.save(&snapshot(&["50688881234"], 5)).await.unwrap();
            store.close().await.unwrap();
        }
        let reopened = store(&dir).await;
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded.ledger.used, 5);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;
        assert!(store.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let store = SqliteSnapshotStore::new(make_config("never-opened.db"));
        assert!(store.health_check().await.is_err());
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn health_check_after_initialize() {
        let dir = tempdir().unwrap();
        let store = store(&dir).await;
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.shutdown().await.unwrap();
    }
}
