/*!
Word n-gram TF-IDF vectorizer.

Pipeline per document:

- lowercase, tokenize on `\b\w\w+\b` (single characters are dropped)
- emit n-grams for every n in `ngram_range` (space-joined tokens)
- raw term counts multiplied by the smoothed idf `ln((1 + n) / (1 + df)) + 1`
- L2 row normalisation

Vocabulary pruning keeps terms whose document frequency is at least
`min_df` documents and at most `max_df` (a fraction of the corpus). The
lower bound suppresses typos and one-off tokens, the upper bound
near-universal boilerplate such as the segment prefixes.

All public functions include `# Errors` sections where they can fail.
*/

use std::collections::{BTreeMap, HashMap, HashSet};

use ndarray::{Array1, Array2};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CriticError, Result};

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("static token pattern is valid"));

/// Vectorizer hyper-parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TfidfParams {
    /// Inclusive n-gram bounds (min, max).
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Maximum document frequency as a fraction of the corpus.
    pub max_df: f64,
    pub lowercase: bool,
}

impl Default for TfidfParams {
    fn default() -> Self {
        TfidfParams {
            ngram_range: (1, 2),
            min_df: 2,
            max_df: 0.95,
            lowercase: true,
        }
    }
}

impl TfidfParams {
    /// # Errors
    ///
    /// `Config` when a bound is out of range.
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.ngram_range;
        if lo == 0 || hi < lo {
            return Err(CriticError::Config(format!(
                "invalid ngram_range ({lo}, {hi})"
            )));
        }
        if self.min_df == 0 {
            return Err(CriticError::Config("min_df must be >= 1".into()));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(CriticError::Config(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        Ok(())
    }

    /// Fit a vectorizer on a corpus.
    ///
    /// # Errors
    ///
    /// `Training` when the corpus is empty or no term survives pruning.
    pub fn fit(&self, docs: &[String]) -> Result<TfidfVectorizer> {
        self.validate()?;
        if docs.is_empty() {
            return Err(CriticError::Training("cannot fit vectorizer on an empty corpus".into()));
        }

        // Document frequency per term; counting is independent per document.
        let per_doc_terms: Vec<HashSet<String>> = docs
            .par_iter()
            .map(|d| self.analyze(d).into_iter().collect())
            .collect();
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for terms in per_doc_terms {
            for t in terms {
                *df.entry(t).or_insert(0) += 1;
            }
        }
        if df.is_empty() {
            return Err(CriticError::Training(
                "empty vocabulary; documents contain no tokens".into(),
            ));
        }

        let n_docs = docs.len();
        let max_doc_count = self.max_df * n_docs as f64;
        // BTreeMap iteration keeps the vocabulary lexicographically sorted.
        let kept: Vec<(String, usize)> = df
            .into_iter()
            .filter(|(_, c)| *c >= self.min_df && (*c as f64) <= max_doc_count)
            .collect();
        if kept.is_empty() {
            return Err(CriticError::Training(format!(
                "after pruning (min_df={}, max_df={}) no terms remain",
                self.min_df, self.max_df
            )));
        }

        let idf: Vec<f64> = kept
            .iter()
            .map(|(_, c)| ((1.0 + n_docs as f64) / (1.0 + *c as f64)).ln() + 1.0)
            .collect();
        let vocabulary: Vec<String> = kept.into_iter().map(|(t, _)| t).collect();

        Ok(TfidfVectorizer::from_parts(self.clone(), vocabulary, idf))
    }

    /// Tokenize and expand one document into its n-gram terms (with repeats).
    pub fn analyze(&self, doc: &str) -> Vec<String> {
        let lowered;
        let text = if self.lowercase {
            lowered = doc.to_lowercase();
            lowered.as_str()
        } else {
            doc
        };
        let tokens: Vec<&str> = TOKEN_PATTERN.find_iter(text).map(|m| m.as_str()).collect();

        let (lo, hi) = self.ngram_range;
        let mut terms = Vec::new();
        for n in lo..=hi {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }
}

/// Fitted vectorizer: sorted vocabulary plus per-term idf weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    pub params: TfidfParams,
    pub vocabulary: Vec<String>,
    pub idf: Vec<f64>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TfidfVectorizer {
    fn from_parts(params: TfidfParams, vocabulary: Vec<String>, idf: Vec<f64>) -> Self {
        let mut v = TfidfVectorizer {
            params,
            vocabulary,
            idf,
            index: HashMap::new(),
        };
        v.rebuild_index();
        v
    }

    /// Rebuild the term lookup after deserialization.
    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    /// Check the persisted shape; used when an artifact is loaded.
    pub(crate) fn is_consistent(&self) -> bool {
        !self.vocabulary.is_empty()
            && self.vocabulary.len() == self.idf.len()
            && self.index.len() == self.vocabulary.len()
            && self.idf.iter().all(|v| v.is_finite())
    }

    /// Vectorize a single document into a dense, L2-normalised row.
    pub fn transform_one(&self, doc: &str) -> Array1<f64> {
        let mut row = Array1::<f64>::zeros(self.n_features());
        for term in self.params.analyze(doc) {
            if let Some(&j) = self.index.get(&term) {
                row[j] += 1.0;
            }
        }
        for (v, w) in row.iter_mut().zip(self.idf.iter()) {
            *v *= *w;
        }
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
        row
    }

    /// Vectorize a corpus into an `(n_docs, n_features)` matrix.
    pub fn transform(&self, docs: &[String]) -> Array2<f64> {
        let rows: Vec<Array1<f64>> = docs.par_iter().map(|d| self.transform_one(d)).collect();
        let mut mat = Array2::<f64>::zeros((docs.len(), self.n_features()));
        for (i, row) in rows.into_iter().enumerate() {
            mat.row_mut(i).assign(&row);
        }
        mat
    }
}
