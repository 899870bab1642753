//! Versioned position table snapshot.
//!
//! Written atomically (temp file + rename) so a crash mid-write leaves the
//! previous snapshot intact. Concurrent writers pass a generation number;
//! a write older than the last one on disk is skipped.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use arb_core::{Position, PositionStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk record: `{positions: {symbol -> Position}, saved_at, version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub positions: BTreeMap<String, Position>,
    pub saved_at: DateTime<Utc>,
    pub version: u32,
}

/// Result of reading a snapshot at startup.
#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    /// Positions to restore, timers untouched.
    pub positions: Vec<Position>,
    /// Positions dropped because `expires_at` had already passed.
    pub dropped_expired: Vec<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Snapshot file owner.
pub struct SnapshotStore {
    path: PathBuf,
    /// Highest generation written so far. Held for the duration of a write.
    last_generation: Mutex<u64>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_generation: Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot for `generation`.
    ///
    /// Returns `Ok(false)` if a newer generation was already written.
    pub fn save<'a, I>(&self, generation: u64, positions: I) -> PersistenceResult<bool>
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut last = self.last_generation.lock();
        if generation < *last {
            debug!(generation, last = *last, "Skipping stale snapshot write");
            return Ok(false);
        }

        let snapshot = PositionSnapshot {
            positions: positions
                .into_iter()
                .map(|p| (p.symbol.clone(), p.clone()))
                .collect(),
            saved_at: Utc::now(),
            version: SNAPSHOT_VERSION,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        *last = generation;
        debug!(
            path = %self.path.display(),
            generation,
            positions = snapshot.positions.len(),
            "Position snapshot saved"
        );
        Ok(true)
    }

    /// Read the snapshot once at startup.
    ///
    /// A missing file is an empty table. Expired positions are dropped.
    /// Positions caught mid-close are restored as open so the monitor
    /// retries the close.
    pub fn load(&self, now: DateTime<Utc>) -> PersistenceResult<LoadedSnapshot> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No position snapshot found, starting empty");
            return Ok(LoadedSnapshot::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        let snapshot: PositionSnapshot = serde_json::from_str(&raw)?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let mut loaded = LoadedSnapshot {
            saved_at: Some(snapshot.saved_at),
            ..Default::default()
        };

        for (symbol, mut position) in snapshot.positions {
            if position.is_expired(now) {
                warn!(
                    symbol = %symbol,
                    expires_at = %position.expires_at,
                    "Dropping expired position from snapshot"
                );
                loaded.dropped_expired.push(symbol);
                continue;
            }
            if position.status == PositionStatus::Closing {
                warn!(symbol = %symbol, "Position was closing at shutdown, restoring as open");
                position.status = PositionStatus::Open;
            }
            loaded.positions.push(position);
        }

        info!(
            path = %self.path.display(),
            restored = loaded.positions.len(),
            dropped = loaded.dropped_expired.len(),
            saved_at = %snapshot.saved_at,
            "Position snapshot loaded"
        );
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::{Price, Side};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn sample_position(symbol: &str, opened_at: DateTime<Utc>, max_age: Duration) -> Position {
        Position::open(
            symbol,
            Side::Long,
            Price::new(dec!(1.0)),
            dec!(5),
            10,
            dec!(2.5),
            opened_at,
            max_age,
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("positions.json"));

        let loaded = store.load(Utc::now()).unwrap();
        assert!(loaded.positions.is_empty());
        assert!(loaded.saved_at.is_none());
    }

    #[test]
    fn test_save_load_preserves_timers_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state/positions.json"));
        let opened = Utc::now() - Duration::minutes(30);
        let pos = sample_position("FOO", opened, Duration::hours(2));

        assert!(store.save(1, [&pos]).unwrap());

        let loaded = store.load(Utc::now()).unwrap();
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.positions[0].opened_at, pos.opened_at);
        assert_eq!(loaded.positions[0].expires_at, pos.expires_at);
    }

    #[test]
    fn test_expired_positions_dropped() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("positions.json"));
        let now = Utc::now();
        let live = sample_position("LIVE", now - Duration::minutes(5), Duration::hours(1));
        let dead = sample_position("DEAD", now - Duration::hours(3), Duration::hours(1));

        store.save(1, [&live, &dead]).unwrap();

        let loaded = store.load(now).unwrap();
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.positions[0].symbol, "LIVE");
        assert_eq!(loaded.dropped_expired, vec!["DEAD".to_string()]);
    }

    #[test]
    fn test_closing_restored_as_open() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("positions.json"));
        let mut pos = sample_position("FOO", Utc::now(), Duration::hours(1));
        pos.status = PositionStatus::Closing;

        store.save(1, [&pos]).unwrap();
        let loaded = store.load(Utc::now()).unwrap();
        assert_eq!(loaded.positions[0].status, PositionStatus::Open);
    }

    #[test]
    fn test_stale_generation_skipped() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("positions.json"));
        let a = sample_position("A", Utc::now(), Duration::hours(1));
        let b = sample_position("B", Utc::now(), Duration::hours(1));

        assert!(store.save(5, [&a, &b]).unwrap());
        assert!(!store.save(4, [&a]).unwrap());

        let loaded = store.load(Utc::now()).unwrap();
        assert_eq!(loaded.positions.len(), 2);
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions.json");
        std::fs::write(
            &path,
            r#"{"positions":{},"saved_at":"2024-01-01T00:00:00Z","version":99}"#,
        )
        .unwrap();

        let err = SnapshotStore::new(&path).load(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::UnsupportedVersion { found: 99, .. }
        ));
    }
}
