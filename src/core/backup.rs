//! Best-effort schema backups
//!
//! Editing never waits on a backup: changes go through a channel to a
//! background task that writes once the schema has been quiet for the
//! debounce period.

use crate::core::schema::Table;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Key the schema is stored under
pub const BACKUP_KEY: &str = "schema-backup";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backup serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key-value blob storage
pub trait BackupStore: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<(), BackupError>;
    fn load(&self, key: &str) -> Result<Option<String>, BackupError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackupStore {
    entries: DashMap<String, String>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackupStore for MemoryBackupStore {
    fn save(&self, key: &str, value: &str) -> Result<(), BackupError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, BackupError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    dir: PathBuf,
}

impl FileBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BackupStore for FileBackupStore {
    fn save(&self, key: &str, value: &str) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, BackupError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stored form of a backup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    pub saved_at: DateTime<Utc>,
    pub tables: Vec<Table>,
}

pub fn write_backup(store: &dyn BackupStore, tables: Vec<Table>) -> Result<(), BackupError> {
    let envelope = BackupEnvelope {
        saved_at: Utc::now(),
        tables,
    };
    store.save(BACKUP_KEY, &serde_json::to_string(&envelope)?)
}

pub fn read_backup(store: &dyn BackupStore) -> Result<Option<BackupEnvelope>, BackupError> {
    match store.load(BACKUP_KEY)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

enum BackupCommand {
    Snapshot(Vec<Table>),
    /// Write whatever is pending now and acknowledge
    Flush(oneshot::Sender<()>),
}

/// Debounced writer in front of a [`BackupStore`]
pub struct BackupWriter {
    store: Arc<dyn BackupStore>,
    tx: mpsc::UnboundedSender<BackupCommand>,
    task: JoinHandle<()>,
}

impl BackupWriter {
    /// Start the background task. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn BackupStore>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(Arc::clone(&store), rx, debounce));
        Self { store, tx, task }
    }

    /// Queue a snapshot; only the latest one in a burst is written
    pub fn schedule(&self, tables: Vec<Table>) {
        if self.tx.send(BackupCommand::Snapshot(tables)).is_err() {
            tracing::warn!("backup task has stopped, dropping snapshot");
        }
    }

    /// Write the pending snapshot without waiting for the quiet period
    pub async fn flush(&self) {
        let (done, written) = oneshot::channel();
        if self.tx.send(BackupCommand::Flush(done)).is_err() || written.await.is_err() {
            tracing::warn!("backup task has stopped, nothing flushed");
        }
    }

    pub fn load(&self) -> Result<Option<BackupEnvelope>, BackupError> {
        read_backup(self.store.as_ref())
    }

    /// Write any pending snapshot and stop the task
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "backup task panicked");
        }
    }
}

async fn debounce_loop(
    store: Arc<dyn BackupStore>,
    mut rx: mpsc::UnboundedReceiver<BackupCommand>,
    debounce: Duration,
) {
    let mut pending: Option<Vec<Table>> = None;

    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    if let Some(tables) = pending.take() {
                        persist(&store, tables).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(BackupCommand::Snapshot(tables)) => pending = Some(tables),
            Some(BackupCommand::Flush(done)) => {
                if let Some(tables) = pending.take() {
                    persist(&store, tables).await;
                }
                let _ = done.send(());
            }
            None => {
                if let Some(tables) = pending.take() {
                    persist(&store, tables).await;
                }
                break;
            }
        }
    }
}

async fn persist(store: &Arc<dyn BackupStore>, tables: Vec<Table>) {
    let store = Arc::clone(store);
    let count = tables.len();
    match tokio::task::spawn_blocking(move || write_backup(store.as_ref(), tables)).await {
        Ok(Ok(())) => tracing::debug!(tables = count, "schema backup written"),
        Ok(Err(e)) => tracing::warn!(error = %e, "schema backup failed"),
        Err(e) => tracing::error!(error = %e, "schema backup task failed"),
    }
}
