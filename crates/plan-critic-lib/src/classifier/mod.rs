/*!
Text classification pipeline: TF-IDF features feeding a class-balanced
logistic regression.

`TextPipeline` is the fitted pair. The [`SufficiencyModel`] and
[`CalibratedModel`] traits are the seam the decision gate scores through, so
the gate can be driven by a persisted artifact or by any other model that
reports a probability or a raw margin.
*/

pub mod logistic;

use linfa::traits::Fit;
use linfa::DatasetBase;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{CriticError, Result};
use crate::text::{TfidfParams, TfidfVectorizer};

pub use logistic::{sigmoid, ClassWeight, LogisticModel, LogisticParams};

/// Raw output of a scoring model for the positive (sufficient) class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelScore {
    /// Already a probability in `[0, 1]`.
    Probability(f64),
    /// Unbounded decision score; squashed through the logistic function.
    Margin(f64),
}

impl ModelScore {
    /// Map the score into `[0, 1]`. `None` for non-finite values or a
    /// probability outside the unit interval.
    pub fn probability(self) -> Option<f64> {
        match self {
            ModelScore::Probability(p) if p.is_finite() && (0.0..=1.0).contains(&p) => Some(p),
            ModelScore::Probability(_) => None,
            ModelScore::Margin(m) if m.is_finite() => Some(sigmoid(m)),
            ModelScore::Margin(_) => None,
        }
    }
}

/// Anything that can score a FeatureText.
pub trait SufficiencyModel {
    /// # Errors
    ///
    /// Implementations return `ModelUnavailable` when they cannot score.
    fn score(&self, text: &str) -> Result<ModelScore>;
}

/// A scoring model together with its calibrated decision threshold.
pub trait CalibratedModel: SufficiencyModel {
    fn threshold(&self) -> f64;
}

/// Fitted vectorizer + classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextPipeline {
    pub vectorizer: TfidfVectorizer,
    pub model: LogisticModel,
}

impl TextPipeline {
    /// Fit both stages on parallel text/label vectors.
    ///
    /// # Errors
    ///
    /// `Training` on an empty vocabulary, a single-class label vector or a
    /// numerical failure in the optimiser; `Config` on invalid parameters.
    pub fn fit(
        tfidf: &TfidfParams,
        logistic: &LogisticParams,
        texts: &[String],
        labels: &[usize],
    ) -> Result<Self> {
        if texts.len() != labels.len() {
            return Err(CriticError::Training(format!(
                "{} texts for {} labels",
                texts.len(),
                labels.len()
            )));
        }
        let vectorizer = tfidf.fit(texts)?;
        let records = vectorizer.transform(texts);
        let dataset = DatasetBase::new(records, Array1::from(labels.to_vec()));
        let model = logistic.fit(&dataset)?;
        Ok(TextPipeline { vectorizer, model })
    }

    pub fn decision_function(&self, text: &str) -> f64 {
        let row = self.vectorizer.transform_one(text);
        self.model.decision_function(row.view())
    }

    /// Positive-class probability for every text.
    pub fn predict_proba(&self, texts: &[String]) -> Vec<f64> {
        let x = self.vectorizer.transform(texts);
        x.rows()
            .into_iter()
            .map(|row| self.model.predict_proba(row))
            .collect()
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.vectorizer.rebuild_index();
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.vectorizer.is_consistent()
            && self.model.n_features() == self.vectorizer.n_features()
            && self.model.is_consistent()
    }
}

impl SufficiencyModel for TextPipeline {
    fn score(&self, text: &str) -> Result<ModelScore> {
        Ok(ModelScore::Probability(sigmoid(self.decision_function(text))))
    }
}
