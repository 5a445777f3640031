//! Persisted classifier artifacts.
//!
//! An artifact is written once to a timestamped JSON file and never rewritten.
//! The on-disk form wraps the pipeline in a small container with a
//! `metadata` map (format version, creation time) so the payload can evolve
//! without breaking the version check.
//!
//! Loading is strict: any failure (I/O, parse, version mismatch, inconsistent
//! shapes) is reported as `ModelUnavailable` so the caller can fall back.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{CalibratedModel, ModelScore, SufficiencyModel, TextPipeline};
use crate::error::{CriticError, Result};
use crate::trainer::TrainingMetrics;

/// Version tag written into every artifact.
pub const FORMAT_VERSION: &str = "plan-critic-1";
/// File name prefix of persisted artifacts.
pub const FILE_PREFIX: &str = "critic_model_";
const FILE_EXTENSION: &str = "json";
// Same-second saves get a numeric suffix instead of overwriting.
const MAX_NAME_ATTEMPTS: usize = 1000;
// In-progress writes; never matched by `latest_artifact`.
const PARTIAL_PREFIX: &str = ".partial_critic_model_";

/// Fitted pipeline plus its calibrated threshold. Immutable once created.
#[derive(Clone, Debug)]
pub struct ClassifierArtifact {
    pub format_version: String,
    pub created_at: DateTime<Utc>,
    pub pipeline: TextPipeline,
    pub threshold: f64,
    pub metrics: TrainingMetrics,
}

impl ClassifierArtifact {
    pub fn new(pipeline: TextPipeline, threshold: f64, metrics: TrainingMetrics) -> Self {
        ClassifierArtifact {
            format_version: FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
            pipeline,
            threshold,
            metrics,
        }
    }

    /// `critic_model_<YYYYmmdd_HHMMSS>` in local time, without extension.
    pub fn file_stem(&self) -> String {
        format!(
            "{}{}",
            FILE_PREFIX,
            self.created_at.with_timezone(&Local).format("%Y%m%d_%H%M%S")
        )
    }
}

impl SufficiencyModel for ClassifierArtifact {
    fn score(&self, text: &str) -> Result<ModelScore> {
        self.pipeline.score(text)
    }
}

impl CalibratedModel for ClassifierArtifact {
    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// On-disk container.
#[derive(Serialize, Deserialize)]
struct SerializableArtifact {
    metadata: BTreeMap<String, String>,
    pipeline: TextPipeline,
    threshold: f64,
    metrics: TrainingMetrics,
}

impl From<&ClassifierArtifact> for SerializableArtifact {
    fn from(a: &ClassifierArtifact) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("format_version".to_string(), a.format_version.clone());
        metadata.insert("created_at".to_string(), a.created_at.to_rfc3339());
        SerializableArtifact {
            metadata,
            pipeline: a.pipeline.clone(),
            threshold: a.threshold,
            metrics: a.metrics.clone(),
        }
    }
}

/// Write an artifact into `dir` under a fresh timestamped name.
///
/// The directory is created if needed. The JSON is written to a temporary
/// file in `dir` and only renamed to `critic_model_*.json` once complete, so
/// a failed write never leaves a partial artifact behind. The rename refuses
/// to replace an existing file; a name collision within the same second gets
/// a `_<n>` suffix.
///
/// # Errors
///
/// `Io` when the directory or file cannot be created or written.
pub fn save_artifact(artifact: &ClassifierArtifact, dir: &Path) -> Result<PathBuf> {
    let serial = SerializableArtifact::from(artifact);
    let path = persist_new(dir, &artifact.file_stem(), |w| {
        serde_json::to_writer_pretty(w, &serial).map_err(io::Error::from)
    })?;
    info!(path = %path.display(), threshold = artifact.threshold, "saved classifier artifact");
    Ok(path)
}

// Write through `write` into a temp file, then move it to the first free
// `<stem>[_n].json`. The temp file is removed on any error.
fn persist_new<F>(dir: &Path, stem: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let out: &mut dyn Write = &mut writer;
        write(out)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.{FILE_EXTENSION}")
        } else {
            format!("{stem}_{attempt}.{FILE_EXTENSION}")
        };
        let path = dir.join(name);
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(e.error.into()),
        }
    }

    Err(CriticError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free artifact name for {stem} in {}", dir.display()),
    )))
}

/// Load and validate an artifact written by [`save_artifact`].
///
/// # Errors
///
/// Always `ModelUnavailable` (naming the path) on failure.
pub fn load_artifact(path: &Path) -> Result<ClassifierArtifact> {
    let unavailable = |reason: String| CriticError::unavailable(Some(path), reason);

    let file = File::open(path).map_err(|e| unavailable(format!("cannot open: {e}")))?;
    let serial: SerializableArtifact = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| unavailable(format!("cannot parse: {e}")))?;

    let version = serial
        .metadata
        .get("format_version")
        .map(String::as_str)
        .unwrap_or("<missing>");
    if version != FORMAT_VERSION {
        return Err(unavailable(format!(
            "format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let created_at = match serial.metadata.get("created_at") {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| unavailable(format!("bad created_at: {e}")))?
            .with_timezone(&Utc),
        None => return Err(unavailable("missing created_at".to_string())),
    };

    let mut pipeline = serial.pipeline;
    pipeline.rebuild_index();
    if !pipeline.is_consistent() {
        return Err(unavailable("inconsistent pipeline shapes".to_string()));
    }
    if !(serial.threshold.is_finite() && (0.0..=1.0).contains(&serial.threshold)) {
        return Err(unavailable(format!("threshold {} out of range", serial.threshold)));
    }

    debug!(path = %path.display(), features = pipeline.vectorizer.n_features(), "loaded classifier artifact");
    Ok(ClassifierArtifact {
        format_version: version.to_string(),
        created_at,
        pipeline,
        threshold: serial.threshold,
        metrics: serial.metrics,
    })
}

/// Most recently modified `critic_model_*.json` in `dir`, if any.
///
/// # Errors
///
/// `ModelUnavailable` when the directory cannot be read.
pub fn latest_artifact(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CriticError::unavailable(Some(dir), format!("cannot list: {e}")))?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_artifact = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(FILE_PREFIX))
            .unwrap_or(false)
            && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);
        if !is_artifact {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        // Ties on mtime resolve by name; timestamped names sort chronologically.
        let newer = match &newest {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

/// Shared, hot-swappable handle to the live artifact.
///
/// Readers clone the inner `Arc` and score against it; a `replace` only swaps
/// the pointer, so in-flight decisions keep using the artifact they started with.
#[derive(Debug)]
pub struct ArtifactStore {
    inner: RwLock<Arc<ClassifierArtifact>>,
}

impl ArtifactStore {
    pub fn new(artifact: ClassifierArtifact) -> Self {
        ArtifactStore {
            inner: RwLock::new(Arc::new(artifact)),
        }
    }

    /// Load the newest artifact in `dir`.
    ///
    /// # Errors
    ///
    /// `ModelUnavailable` when the directory has no loadable artifact.
    pub fn open_latest(dir: &Path) -> Result<Self> {
        let path = latest_artifact(dir)?
            .ok_or_else(|| CriticError::unavailable(Some(dir), "no artifact found"))?;
        Ok(Self::new(load_artifact(&path)?))
    }

    pub fn current(&self) -> Arc<ClassifierArtifact> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            // The lock only ever guards a pointer swap; a poisoned value is still whole.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new artifact, returning the previous one.
    pub fn replace(&self, artifact: ClassifierArtifact) -> Arc<ClassifierArtifact> {
        let next = Arc::new(artifact);
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
