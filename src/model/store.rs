//! Model Store - versioned (encoder, classifier) snapshots on disk
//!
//! Layout under the model directory:
//!
//! ```text
//! encoder_20251122_085149_123456.json
//! classifier_20251122_085149_123456.json
//! ```
//!
//! Both artifacts of a snapshot share one [`VersionId`]. The directory is read
//! into a `VersionId -> {encoder, classifier}` index so that loading and
//! retention always work on pairs. Artifacts are written to a `.tmp` file
//! and renamed into place, so a reader never parses a half-written file.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::classifier::ForestClassifier;
use super::encoder::FeatureEncoder;
use crate::error::{MlError, Result};

const ENCODER_PREFIX: &str = "encoder_";
const CLASSIFIER_PREFIX: &str = "classifier_";
const ARTIFACT_EXTENSION: &str = "json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Time-ordered snapshot identifier.
///
/// Rendered as `YYYYMMDD_HHMMSS_micros`; the fixed width makes lexical and
/// chronological order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(DateTime<Utc>);

impl VersionId {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        // Truncate to the rendered precision so ids round-trip through names
        let micros = at.timestamp_micros();
        Self(DateTime::from_timestamp_micros(micros).unwrap_or(at))
    }

    /// A fresh id, strictly greater than `latest` when one is given
    pub fn next(latest: Option<&VersionId>) -> Self {
        let candidate = Self::from_datetime(Utc::now());
        match latest {
            Some(latest) if candidate <= *latest => Self(latest.0 + chrono::Duration::microseconds(1)),
            _ => candidate,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{:06}",
            self.0.format(TIMESTAMP_FORMAT),
            self.0.timestamp_subsec_micros()
        )
    }
}

impl FromStr for VersionId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (stamp, micros) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("invalid version id: {}", s))?;
        if micros.len() != 6 || !micros.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid version id: {}", s));
        }
        let micros: i64 = micros.parse().map_err(|_| format!("invalid version id: {}", s))?;
        let at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|e| format!("invalid version id {}: {}", s, e))?
            .and_utc();
        Ok(Self(at + chrono::Duration::microseconds(micros)))
    }
}

impl Serialize for VersionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which snapshot [`ModelStore::load_latest`] is allowed to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Only the newest version id; report no model if it is incomplete
    #[default]
    LatestOnly,
    /// Newest version id whose two artifacts are both present and readable
    LatestComplete,
}

/// Artifacts found on disk for one version id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotFiles {
    pub encoder: Option<PathBuf>,
    pub classifier: Option<PathBuf>,
}

impl SnapshotFiles {
    pub fn is_complete(&self) -> bool {
        self.encoder.is_some() && self.classifier.is_some()
    }

    fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.encoder.iter().chain(self.classifier.iter())
    }
}

/// A snapshot read back from disk
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub version: VersionId,
    pub encoder: FeatureEncoder,
    pub classifier: ForestClassifier,
}

/// Size and location of a stored snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub version: VersionId,
    pub filename: String,
    pub size_mb: f64,
}

pub struct ModelStore {
    base_dir: PathBuf,
    /// Serializes save and retain against each other
    write_lock: Mutex<()>,
}

impl ModelStore {
    /// Open (and create if needed) a store rooted at `base_dir`
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| MlError::storage(&base_dir, e))?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Scan the directory into a version index, oldest first
    pub fn index(&self) -> Result<BTreeMap<VersionId, SnapshotFiles>> {
        let entries = std::fs::read_dir(&self.base_dir).map_err(|e| MlError::storage(&self.base_dir, e))?;
        let mut index: BTreeMap<VersionId, SnapshotFiles> = BTreeMap::new();

        for entry in entries {
            let entry = entry.map_err(|e| MlError::storage(&self.base_dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if let Some(version) = stem.strip_prefix(ENCODER_PREFIX).and_then(|v| v.parse().ok()) {
                index.entry(version).or_default().encoder = Some(path);
            } else if let Some(version) = stem.strip_prefix(CLASSIFIER_PREFIX).and_then(|v| v.parse().ok()) {
                index.entry(version).or_default().classifier = Some(path);
            }
        }

        Ok(index)
    }

    /// All version ids on disk, oldest first
    pub fn versions(&self) -> Result<Vec<VersionId>> {
        Ok(self.index()?.into_keys().collect())
    }

    /// Persist both halves under a new version id
    pub fn save(&self, encoder: &FeatureEncoder, classifier: &ForestClassifier) -> Result<VersionId> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let latest = self.index()?.into_keys().next_back();
        let version = VersionId::next(latest.as_ref());

        let classifier_path = self.artifact_path(CLASSIFIER_PREFIX, &version);
        let encoder_path = self.artifact_path(ENCODER_PREFIX, &version);
        write_atomic(&classifier_path, &serde_json::to_vec(classifier)?)?;
        write_atomic(&encoder_path, &serde_json::to_vec(encoder)?)?;

        info!("Saved model snapshot {}", version);
        Ok(version)
    }

    /// Load the most recent snapshot according to `policy`.
    ///
    /// Missing, temporary or unreadable artifacts make a version incomplete.
    /// Incomplete versions are logged and never raise.
    pub fn load_latest(&self, policy: LoadPolicy) -> Result<Option<LoadedSnapshot>> {
        let index = self.index()?;
        if index.is_empty() {
            debug!("No model snapshots in {}", self.base_dir.display());
            return Ok(None);
        }

        for (version, files) in index.iter().rev() {
            match self.read_snapshot(version, files) {
                Some(snapshot) => return Ok(Some(snapshot)),
                None if policy == LoadPolicy::LatestOnly => {
                    warn!("Latest snapshot {} is incomplete, no model loaded", version);
                    return Ok(None);
                }
                None => warn!("Skipping incomplete snapshot {}", version),
            }
        }

        Ok(None)
    }

    /// Delete every snapshot beyond the `keep_latest` newest version ids.
    ///
    /// Both artifacts of a retired version are removed together. Returns the
    /// retired ids, newest first.
    pub fn retain(&self, keep_latest: usize) -> Result<Vec<VersionId>> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut retired = Vec::new();
        for (version, files) in self.index()?.into_iter().rev().skip(keep_latest) {
            for path in files.paths() {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(MlError::storage(path, e)),
                }
            }
            info!("Retired model snapshot {}", version);
            retired.push(version);
        }
        Ok(retired)
    }

    /// File details for a stored version, based on its classifier artifact
    pub fn info(&self, version: &VersionId) -> Option<SnapshotInfo> {
        let path = self.artifact_path(CLASSIFIER_PREFIX, version);
        let metadata = std::fs::metadata(&path).ok()?;
        let size_mb = metadata.len() as f64 / 1024.0 / 1024.0;
        Some(SnapshotInfo {
            version: *version,
            filename: path.file_name()?.to_string_lossy().into_owned(),
            size_mb: (size_mb * 100.0).round() / 100.0,
        })
    }

    fn artifact_path(&self, prefix: &str, version: &VersionId) -> PathBuf {
        self.base_dir
            .join(format!("{}{}.{}", prefix, version, ARTIFACT_EXTENSION))
    }

    fn read_snapshot(&self, version: &VersionId, files: &SnapshotFiles) -> Option<LoadedSnapshot> {
        let encoder_path = files.encoder.as_ref()?;
        let classifier_path = files.classifier.as_ref()?;
        let encoder: FeatureEncoder = read_artifact(encoder_path)?;
        let classifier: ForestClassifier = read_artifact(classifier_path)?;
        Some(LoadedSnapshot {
            version: *version,
            encoder,
            classifier,
        })
    }
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Write to a sibling `.tmp` file, flush to disk, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(|e| MlError::storage(&tmp, e))?;
    file.write_all(bytes).map_err(|e| MlError::storage(&tmp, e))?;
    file.sync_all().map_err(|e| MlError::storage(&tmp, e))?;
    drop(file);
    std::fs::rename(&tmp, path).map_err(|e| MlError::storage(path, e))?;
    Ok(())
}
