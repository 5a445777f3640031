//! Dataset loading and the stratified train/validation split.
//!
//! Training logs are stored either as a JSON array (`*.json`) or as JSON
//! lines (`*.jsonl`). Older deployments only wrote the `.jsonl` form, so a
//! missing `.json` path falls back to its `.jsonl` sibling.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CriticError, Result};
use crate::model::ConversationRecord;

/// Load a dataset file into typed records.
///
/// # Behavior
///
/// - `.jsonl`: one JSON value per non-blank line; unparsable lines are skipped
///   with a warning.
/// - anything else: a JSON array of records; a single object is treated as a
///   one-record dataset and `null` as empty.
/// - missing path: try the `.jsonl` sibling, otherwise return an empty dataset.
///
/// # Errors
///
/// `Io` when the file exists but cannot be read, `Data` when a non-jsonl file
/// is not valid JSON.
pub fn load_dataset(path: &Path) -> Result<Vec<ConversationRecord>> {
    if path.exists() {
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            return load_jsonl(path);
        }
        let raw = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            CriticError::Data(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let records = match value {
            Value::Array(items) => items.iter().map(ConversationRecord::from_value).collect(),
            Value::Null => Vec::new(),
            other => vec![ConversationRecord::from_value(&other)],
        };
        debug!(path = %path.display(), records = records.len(), "loaded dataset");
        return Ok(records);
    }

    let legacy = path.with_extension("jsonl");
    if legacy != path && legacy.exists() {
        debug!(path = %legacy.display(), "falling back to legacy jsonl dataset");
        return load_jsonl(&legacy);
    }

    warn!(path = %path.display(), "dataset not found; treating as empty");
    Ok(Vec::new())
}

fn load_jsonl(path: &Path) -> Result<Vec<ConversationRecord>> {
    let raw = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(v) => records.push(ConversationRecord::from_value(&v)),
            Err(e) => warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping unparsable dataset line"
            ),
        }
    }
    debug!(path = %path.display(), records = records.len(), "loaded jsonl dataset");
    Ok(records)
}

/// Index-level result of a split: positions into the pooled vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Split sample indices so that both halves keep the pool's class balance.
///
/// Each class contributes `round(count * test_size)` samples to validation,
/// clamped so that every class lands on both sides. Within a class the order
/// is shuffled with a seeded RNG; the result is deterministic for a seed.
///
/// # Errors
///
/// `Data` when `test_size` is not in (0, 1), the pool has fewer than two
/// samples, only one distinct label, or a class with a single member.
pub fn stratified_split(labels: &[usize], test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(CriticError::Data(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    if labels.len() < 2 {
        return Err(CriticError::Data(format!(
            "need at least 2 records to split, got {}",
            labels.len()
        )));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, lbl) in labels.iter().enumerate() {
        by_class.entry(*lbl).or_default().push(i);
    }
    if by_class.len() < 2 {
        return Err(CriticError::Data(
            "pool contains a single label; stratified split is impossible".to_string(),
        ));
    }
    if let Some((lbl, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(CriticError::Data(format!(
            "class {} has {} member(s); need at least 2 to stratify",
            lbl,
            members.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut valid = Vec::new();
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_valid = ((n as f64) * test_size).round() as usize;
        let n_valid = n_valid.clamp(1, n - 1);
        valid.extend_from_slice(&members[..n_valid]);
        train.extend_from_slice(&members[n_valid..]);
    }
    // Interleave classes again so downstream consumers do not see blocks.
    train.shuffle(&mut rng);
    valid.shuffle(&mut rng);

    Ok(SplitIndices { train, valid })
}

/// Count samples per label (0 and 1) in the given index set.
pub fn class_counts(labels: &[usize], indices: &[usize]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &i in indices {
        if labels[i] == 1 {
            counts[1] += 1;
        } else {
            counts[0] += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pool(pos: usize, neg: usize) -> Vec<usize> {
        let mut v = vec![1usize; pos];
        v.extend(std::iter::repeat(0).take(neg));
        v
    }

    #[test]
    fn test_split_preserves_ratio() {
        let labels = pool(30, 70);
        let split = stratified_split(&labels, 0.2, 42).expect("split");
        assert_eq!(split.train.len() + split.valid.len(), 100);
        assert_eq!(class_counts(&labels, &split.valid), [14, 6]);
        assert_eq!(class_counts(&labels, &split.train), [56, 24]);
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let labels = pool(10, 25);
        let a = stratified_split(&labels, 0.3, 7).unwrap();
        let b = stratified_split(&labels, 0.3, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_rejects_degenerate_pools() {
        assert!(matches!(stratified_split(&[1], 0.2, 0), Err(CriticError::Data(_))));
        assert!(matches!(stratified_split(&[0, 0, 0], 0.2, 0), Err(CriticError::Data(_))));
        assert!(matches!(stratified_split(&[0, 0, 1], 0.2, 0), Err(CriticError::Data(_))));
        assert!(matches!(stratified_split(&pool(5, 5), 1.0, 0), Err(CriticError::Data(_))));
    }

    #[test]
    fn test_tiny_pool_puts_each_class_on_both_sides() {
        let labels = pool(2, 2);
        let split = stratified_split(&labels, 0.2, 1).unwrap();
        assert_eq!(class_counts(&labels, &split.valid), [1, 1]);
        assert_eq!(class_counts(&labels, &split.train), [1, 1]);
    }

    #[test]
    fn test_load_json_array_and_jsonl_fallback() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let json_path = dir.path().join("train.json");
        fs::write(
            &json_path,
            r#"[{"instruction": "a", "label": "sufficient"}, "garbage"]"#,
        )?;
        let records = load_dataset(&json_path)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].instruction, "a");
        assert_eq!(records[1], ConversationRecord::default());

        let legacy = dir.path().join("valid.jsonl");
        let mut f = fs::File::create(&legacy)?;
        writeln!(f, r#"{{"instruction": "b"}}"#)?;
        writeln!(f)?;
        writeln!(f, "{{not json")?;
        writeln!(f, r#"{{"instruction": "c"}}"#)?;
        drop(f);
        let records = load_dataset(&dir.path().join("valid.json"))?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].instruction, "c");

        assert!(load_dataset(&dir.path().join("missing.json"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_invalid_json_is_data_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("bad.json");
        fs::write(&p, "{ nope")?;
        assert!(matches!(load_dataset(&p), Err(CriticError::Data(_))));
        Ok(())
    }
}
