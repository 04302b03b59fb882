//! Snapshot persistence.
//!
//! One JSON document on disk describes the last known supervisor state.
//! Writes go through a temp file and rename so a crash mid-write leaves
//! the previous snapshot intact.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use warden_types::{Snapshot, WardenError, WardenResult};

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the last snapshot, or `None` when none has been written yet.
    pub async fn load(&self) -> WardenResult<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WardenError::Persistence(format!(
                    "Failed to read snapshot: {}",
                    e
                )));
            }
        };

        let snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            WardenError::Persistence(format!("Corrupt snapshot at {:?}: {}", self.path, e))
        })?;

        debug!("Loaded snapshot from {:?}", self.path);
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &Snapshot) -> WardenResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WardenError::Persistence(format!("Failed to create data dir: {}", e))
            })?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| {
            WardenError::Persistence(format!("Failed to encode snapshot: {}", e))
        })?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            WardenError::Persistence(format!("Failed to write snapshot: {}", e))
        })?;

        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            WardenError::Persistence(format!("Failed to replace snapshot: {}", e))
        })?;

        debug!(
            "Snapshot saved to {:?} ({} workers, cycle {})",
            self.path,
            snapshot.workers.len(),
            snapshot.cycle_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_types::{SnapshotCounters, WorkerRecord, WorkerState};

    fn sample_snapshot() -> Snapshot {
        let workers = vec![
            WorkerRecord {
                name: "fetcher".to_string(),
                state: WorkerState::Running,
                last_transition_at: Utc::now(),
                last_exit_code: None,
                consecutive_crashes: 0,
            },
            WorkerRecord {
                name: "indexer".to_string(),
                state: WorkerState::Crashed,
                last_transition_at: Utc::now(),
                last_exit_code: Some(1),
                consecutive_crashes: 2,
            },
        ];

        Snapshot {
            cycle_count: 42,
            summary: Snapshot::tally(&workers),
            workers,
            counters: SnapshotCounters {
                workers_started: 7,
                ..Default::default()
            },
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state").join("snapshot.json"));

        store.save(&sample_snapshot()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.cycle_count, 42);
        assert_eq!(loaded.workers.len(), 2);
        assert_eq!(loaded.workers[1].consecutive_crashes, 2);
        assert_eq!(loaded.counters.workers_started, 7);
        assert_eq!(loaded.summary.total, 2);
        assert_eq!(loaded.summary.running, 1);
        assert_eq!(loaded.summary.crashed, 1);
    }

    #[tokio::test]
    async fn test_snapshot_file_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = SnapshotStore::new(&path);

        store.save(&sample_snapshot()).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.contains("\"cycleCount\""));
        assert!(contents.contains("\"lastTransitionAt\""));
        assert!(contents.contains("\"consecutiveCrashes\""));
        assert!(!contents.contains("\"cycle_count\""));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        store.save(&sample_snapshot()).await.unwrap();
        store.save(&sample_snapshot()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["snapshot.json".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = SnapshotStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, WardenError::Persistence(_)));
    }
}
