use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;

use crate::foundation::error::{GaugeError, GaugeResult};

/// A persisted analyzer configuration, addressable by the video/design
/// pair it was made for.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ConfigSnapshot {
    /// Id of the analyzer that produced the snapshot.
    pub analyzer_id: String,
    /// Identity of the analyzed video (its path).
    pub video_id: String,
    /// Identity of the design (its path).
    pub design_id: String,
    /// The serialized analyzer configuration.
    pub config: serde_json::Value,
}

/// Persistence collaborator for configuration snapshots.
///
/// The backing schema is an embedding concern; the engine only needs
/// store-on-launch and latest-match lookup.
pub trait SnapshotStore: Send + Sync {
    /// Persist one snapshot.
    fn store(&self, snapshot: &ConfigSnapshot) -> GaugeResult<()>;

    /// The most recently stored snapshot for this video/design pair.
    fn load_latest_matching(
        &self,
        video_id: &str,
        design_id: &str,
    ) -> GaugeResult<Option<ConfigSnapshot>>;
}

/// Snapshot store writing one JSON file per snapshot under a directory.
///
/// Files are named by a monotonically increasing sequence number;
/// "latest" is the highest sequence among matches.
#[derive(Debug)]
pub struct JsonSnapshotStore {
    dir: PathBuf,
    next_seq: Mutex<u64>,
}

impl JsonSnapshotStore {
    /// Open (and create if needed) the snapshot directory.
    pub fn open(dir: impl Into<PathBuf>) -> GaugeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot dir '{}'", dir.display()))
            .map_err(GaugeError::from)?;

        let next_seq = Self::scan(&dir)?
            .into_iter()
            .map(|(seq, _)| seq)
            .max()
            .map_or(0, |max| max + 1);

        Ok(Self {
            dir,
            next_seq: Mutex::new(next_seq),
        })
    }

    fn scan(dir: &PathBuf) -> GaugeResult<Vec<(u64, PathBuf)>> {
        let mut out = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("read snapshot dir '{}'", dir.display()))
            .map_err(GaugeError::from)?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(seq) = stem
                .strip_prefix("snapshot_")
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            out.push((seq, path));
        }
        Ok(out)
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn store(&self, snapshot: &ConfigSnapshot) -> GaugeResult<()> {
        let seq = {
            let mut guard = self
                .next_seq
                .lock()
                .map_err(|_| GaugeError::validation("snapshot sequence lock poisoned"))?;
            let seq = *guard;
            *guard += 1;
            seq
        };

        let path = self.dir.join(format!("snapshot_{seq:08}.json"));
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| GaugeError::validation(format!("serialize snapshot: {e}")))?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("write snapshot '{}'", path.display()))
            .map_err(GaugeError::from)
    }

    fn load_latest_matching(
        &self,
        video_id: &str,
        design_id: &str,
    ) -> GaugeResult<Option<ConfigSnapshot>> {
        let mut files = Self::scan(&self.dir)?;
        files.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));

        for (_, path) in files {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let Ok(snapshot) = serde_json::from_slice::<ConfigSnapshot>(&bytes) else {
                continue;
            };
            if snapshot.video_id == video_id && snapshot.design_id == design_id {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }
}
