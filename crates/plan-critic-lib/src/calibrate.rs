//! Decision-threshold calibration on a validation split.
//!
//! The sweep walks the distinct scores from highest to lowest, treating each
//! as a candidate threshold (`score >= t` predicts positive), and stops once
//! every positive is recalled: lower thresholds can only add false positives.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Threshold used when the validation split cannot calibrate anything.
pub const FALLBACK_THRESHOLD: f64 = 0.5;

const F1_EPSILON: f64 = 1e-9;

/// One point of the precision-recall curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

impl PrPoint {
    pub fn f1(&self) -> f64 {
        2.0 * self.precision * self.recall / (self.precision + self.recall + F1_EPSILON)
    }
}

/// Precision-recall pairs for every distinct score, highest threshold first.
///
/// Empty when there are no positives (recall is undefined).
pub fn precision_recall_curve(labels: &[usize], scores: &[f64]) -> Vec<PrPoint> {
    let total_pos = labels.iter().filter(|l| **l == 1).count();
    if total_pos == 0 || labels.len() != scores.len() {
        return Vec::new();
    }

    let mut ranked: Vec<(f64, usize)> = scores
        .iter()
        .copied()
        .zip(labels.iter().copied())
        .filter(|(s, _)| s.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut curve = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < ranked.len() {
        let t = ranked[i].0;
        // Consume the whole tie block before emitting a point.
        while i < ranked.len() && ranked[i].0 == t {
            if ranked[i].1 == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        curve.push(PrPoint {
            threshold: t,
            precision: tp as f64 / (tp + fp) as f64,
            recall: tp as f64 / total_pos as f64,
        });
        if tp == total_pos {
            break;
        }
    }
    curve
}

/// Result of threshold selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub threshold: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    /// True when no positive was available and [`FALLBACK_THRESHOLD`] was used.
    pub fallback: bool,
}

/// Pick the F1-maximising threshold. Ties go to the lower threshold: a
/// dialogue that stops a turn early is preferred over one that drags on.
pub fn best_f1_threshold(labels: &[usize], scores: &[f64]) -> Calibration {
    let curve = precision_recall_curve(labels, scores);
    let mut best: Option<(PrPoint, f64)> = None;
    for point in curve {
        let f1 = point.f1();
        match best {
            Some((_, best_f1)) if f1 < best_f1 => {}
            _ => best = Some((point, f1)),
        }
    }

    match best {
        Some((point, f1)) => Calibration {
            threshold: point.threshold,
            f1,
            precision: point.precision,
            recall: point.recall,
            fallback: false,
        },
        None => {
            warn!(
                threshold = FALLBACK_THRESHOLD,
                samples = labels.len(),
                "validation split has no positive examples; using fallback threshold"
            );
            Calibration {
                threshold: FALLBACK_THRESHOLD,
                f1: 0.0,
                precision: 0.0,
                recall: 0.0,
                fallback: true,
            }
        }
    }
}

/// Per-class scores, zero where undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Two-class report at a fixed threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub threshold: f64,
    pub insufficient: ClassScores,
    pub sufficient: ClassScores,
    pub accuracy: f64,
}

fn class_scores(tp: usize, fp: usize, fn_: usize) -> ClassScores {
    let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassScores {
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

impl ClassificationReport {
    pub fn at_threshold(labels: &[usize], scores: &[f64], threshold: f64) -> Self {
        let mut m = [[0usize; 2]; 2]; // m[actual][predicted]
        for (l, s) in labels.iter().zip(scores.iter()) {
            let actual = usize::from(*l == 1);
            let predicted = usize::from(*s >= threshold);
            m[actual][predicted] += 1;
        }
        let total = labels.len().min(scores.len());
        let accuracy = if total == 0 {
            0.0
        } else {
            (m[0][0] + m[1][1]) as f64 / total as f64
        };
        ClassificationReport {
            threshold,
            insufficient: class_scores(m[0][0], m[1][0], m[0][1]),
            sufficient: class_scores(m[1][1], m[0][1], m[1][0]),
            accuracy,
        }
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "threshold {:.3}", self.threshold)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1", "support"
        )?;
        for (name, s) in [("insufficient", &self.insufficient), ("sufficient", &self.sufficient)] {
            writeln!(
                f,
                "{:>14} {:>9.3} {:>9.3} {:>9.3} {:>9}",
                name, s.precision, s.recall, s.f1, s.support
            )?;
        }
        write!(f, "{:>14} {:>9.3}", "accuracy", self.accuracy)
    }
}
