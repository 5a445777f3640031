//! Offline training: extraction, split, fitting, threshold calibration.
//!
//! Training is a one-shot batch job. The only parallelism is inside the
//! vectorizer (per-document n-gram counting via rayon).

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::ClassifierArtifact;
use crate::calibrate::{best_f1_threshold, ClassificationReport, FALLBACK_THRESHOLD};
use crate::classifier::{LogisticParams, TextPipeline};
use crate::dataset::stratified_split;
use crate::error::{CriticError, Result};
use crate::extract::extract_batch;
use crate::model::ConversationRecord;
use crate::text::TfidfParams;

/// Trainer settings. Defaults match the deployed critic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    /// Validation fraction used whenever the pools are re-split.
    pub test_size: f64,
    pub random_seed: u64,
    /// Pool and re-split even when both collections are non-empty.
    pub always_resplit: bool,
    pub tfidf: TfidfParams,
    pub logistic: LogisticParams,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            test_size: 0.2,
            random_seed: 42,
            always_resplit: false,
            tfidf: TfidfParams::default(),
            logistic: LogisticParams::default(),
        }
    }
}

impl TrainerConfig {
    /// Check the model hyper-parameters. `test_size` is only meaningful when
    /// a split happens and is checked there (as a `Data` error).
    ///
    /// # Errors
    ///
    /// `Config` when a vectorizer or classifier value is out of range.
    pub fn validate(&self) -> Result<()> {
        self.tfidf.validate()?;
        self.logistic.validate()
    }
}

/// Everything the trainer measured, persisted with the artifact.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    pub train_size: usize,
    pub valid_size: usize,
    /// `[insufficient, sufficient]`
    pub train_class_counts: [usize; 2],
    pub valid_class_counts: [usize; 2],
    /// Whether the input collections were pooled and re-split.
    pub resplit: bool,
    pub threshold: f64,
    pub valid_f1: f64,
    pub calibration_fallback: bool,
    pub report_calibrated: ClassificationReport,
    pub report_default: ClassificationReport,
    pub vocabulary_size: usize,
    pub iterations: usize,
    pub converged: bool,
}

struct Split {
    train_texts: Vec<String>,
    train_labels: Vec<usize>,
    valid_texts: Vec<String>,
    valid_labels: Vec<usize>,
    resplit: bool,
}

fn take(texts: &[String], labels: &[usize], idx: &[usize]) -> (Vec<String>, Vec<usize>) {
    idx.iter().map(|&i| (texts[i].clone(), labels[i])).unzip()
}

/// Fits a [`TextPipeline`] and calibrates its threshold.
#[derive(Clone, Debug, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Trainer { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train and calibrate a classifier.
    ///
    /// Both collections are used as given when non-empty (unless
    /// `always_resplit`); otherwise they are pooled and split with
    /// stratification by label.
    ///
    /// # Errors
    ///
    /// - `Config` for invalid settings.
    /// - `Data` when the pool cannot be stratified or a given training
    ///   collection holds a single label.
    /// - `Training` when fitting fails; no partial artifact is returned.
    pub fn train(
        &self,
        train: &[ConversationRecord],
        valid: &[ConversationRecord],
    ) -> Result<ClassifierArtifact> {
        self.config.validate()?;
        let split = self.split(train, valid)?;

        let train_counts = count(&split.train_labels);
        let valid_counts = count(&split.valid_labels);
        info!(
            train = split.train_labels.len(),
            valid = split.valid_labels.len(),
            train_sufficient = train_counts[1],
            valid_sufficient = valid_counts[1],
            resplit = split.resplit,
            "prepared training data"
        );

        let pipeline = TextPipeline::fit(
            &self.config.tfidf,
            &self.config.logistic,
            &split.train_texts,
            &split.train_labels,
        )?;

        let scores = pipeline.predict_proba(&split.valid_texts);
        let calibration = best_f1_threshold(&split.valid_labels, &scores);
        let report_calibrated =
            ClassificationReport::at_threshold(&split.valid_labels, &scores, calibration.threshold);
        let report_default =
            ClassificationReport::at_threshold(&split.valid_labels, &scores, FALLBACK_THRESHOLD);

        info!(
            threshold = calibration.threshold,
            valid_f1 = calibration.f1,
            vocabulary = pipeline.vectorizer.n_features(),
            iterations = pipeline.model.n_iter,
            "calibrated decision threshold"
        );
        info!("validation report (calibrated)\n{}", report_calibrated);
        info!("validation report (0.5)\n{}", report_default);

        let metrics = TrainingMetrics {
            train_size: split.train_labels.len(),
            valid_size: split.valid_labels.len(),
            train_class_counts: train_counts,
            valid_class_counts: valid_counts,
            resplit: split.resplit,
            threshold: calibration.threshold,
            valid_f1: calibration.f1,
            calibration_fallback: calibration.fallback,
            report_calibrated,
            report_default,
            vocabulary_size: pipeline.vectorizer.n_features(),
            iterations: pipeline.model.n_iter,
            converged: pipeline.model.converged,
        };
        Ok(ClassifierArtifact::new(pipeline, calibration.threshold, metrics))
    }

    fn split(&self, train: &[ConversationRecord], valid: &[ConversationRecord]) -> Result<Split> {
        if !train.is_empty() && !valid.is_empty() && !self.config.always_resplit {
            let (train_texts, train_labels) = extract_batch(train);
            let (valid_texts, valid_labels) = extract_batch(valid);
            if count(&train_labels).contains(&0) {
                return Err(CriticError::Data(
                    "training collection contains a single label".into(),
                ));
            }
            return Ok(Split {
                train_texts,
                train_labels,
                valid_texts,
                valid_labels,
                resplit: false,
            });
        }

        if train.is_empty() != valid.is_empty() {
            warn!(
                train = train.len(),
                valid = valid.len(),
                "one collection is empty; pooling and re-splitting"
            );
        }
        let pool: Vec<ConversationRecord> = train.iter().chain(valid.iter()).cloned().collect();
        let (texts, labels) = extract_batch(&pool);
        let idx = stratified_split(&labels, self.config.test_size, self.config.random_seed)?;
        let (train_texts, train_labels) = take(&texts, &labels, &idx.train);
        let (valid_texts, valid_labels) = take(&texts, &labels, &idx.valid);
        Ok(Split {
            train_texts,
            train_labels,
            valid_texts,
            valid_labels,
            resplit: true,
        })
    }
}

fn count(labels: &[usize]) -> [usize; 2] {
    let pos = labels.iter().filter(|l| **l == 1).count();
    [labels.len() - pos, pos]
}

/// Train with default hyper-parameters and the given split settings.
///
/// # Errors
///
/// See [`Trainer::train`].
pub fn train(
    train: &[ConversationRecord],
    valid: &[ConversationRecord],
    test_size: f64,
    random_seed: u64,
) -> Result<ClassifierArtifact> {
    Trainer::new(TrainerConfig {
        test_size,
        random_seed,
        ..Default::default()
    })
    .train(train, valid)
}
