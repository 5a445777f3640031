/*!
Runtime stop/continue gate.

A bare threshold crossing never ends a dialogue on its own. The probability
must reach the effective threshold *and* be corroborated by one of:

- a wide confidence margin above the threshold,
- a plan already emitted in `function_sequence`,
- enough clarifying turns (`corroborating_turns`, default 2).

The effective threshold is `max(trained, min_threshold_floor)` unless the
operator sets `force_threshold`, which replaces it outright.

The gate is stateless. `turn_count` is owned by the conversation loop, and a
model that cannot score is reported as `ModelUnavailable`, never guessed.
When that happens the caller applies its own policy such as
[`TurnLimitFallback`].
*/

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::CalibratedModel;
use crate::error::{CriticError, Result};
use crate::extract::feature_text;
use crate::model::ConversationRecord;

/// Operator-tunable gate parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Lower bound on the effective threshold.
    pub min_threshold_floor: f64,
    /// Extra probability above the threshold that counts as high confidence.
    pub margin: f64,
    /// Replaces the computed threshold entirely when set.
    pub force_threshold: Option<f64>,
    /// Turn count from which a threshold crossing is trusted on its own.
    pub corroborating_turns: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            min_threshold_floor: 0.60,
            margin: 0.15,
            force_threshold: None,
            corroborating_turns: 2,
        }
    }
}

fn unit_interval(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(CriticError::Config(format!("{name} must be in [0, 1], got {v}")))
    }
}

impl GateConfig {
    /// # Errors
    ///
    /// `Config` when a threshold or the margin is outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        unit_interval("min_threshold_floor", self.min_threshold_floor)?;
        unit_interval("margin", self.margin)?;
        if let Some(f) = self.force_threshold {
            unit_interval("force_threshold", f)?;
        }
        Ok(())
    }

    /// Threshold actually applied for a model trained at `trained`.
    pub fn effective_threshold(&self, trained: f64) -> f64 {
        match self.force_threshold {
            Some(forced) => forced,
            None => trained.max(self.min_threshold_floor),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Continue,
    Sufficient,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Continue => "continue",
            Outcome::Sufficient => "sufficient",
        }
    }
}

/// Everything the gate looked at for one call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub probability: f64,
    pub effective_threshold: f64,
    pub has_plan: bool,
    pub turn_count: usize,
    pub margin: f64,
    pub min_threshold_floor: f64,
    pub high_confidence: bool,
    pub forced_threshold: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub probability: f64,
    pub effective_threshold: f64,
    pub context: DecisionContext,
}

/// Decide whether the dialogue has gathered enough context to stop.
///
/// `config` is expected to have passed [`GateConfig::validate`], which
/// [`CriticConfig`](crate::config::CriticConfig) does on load.
///
/// # Errors
///
/// `ModelUnavailable` when the model cannot score or returns a non-finite /
/// out-of-range value, or its threshold is not finite. No other error is
/// returned.
pub fn decide<M>(
    model: &M,
    record: &ConversationRecord,
    turn_count: usize,
    config: &GateConfig,
) -> Result<Decision>
where
    M: CalibratedModel + ?Sized,
{
    let text = feature_text(record);
    let score = model.score(&text)?;
    let probability = score
        .probability()
        .ok_or_else(|| CriticError::unavailable(None, format!("unusable model output {score:?}")))?;

    let trained = model.threshold();
    if !trained.is_finite() {
        return Err(CriticError::unavailable(
            None,
            format!("trained threshold {trained} is not finite"),
        ));
    }
    let effective_threshold = config.effective_threshold(trained);

    let has_plan = record.has_plan();
    let high_confidence = probability >= effective_threshold + config.margin;
    let corroborated =
        high_confidence || has_plan || turn_count >= config.corroborating_turns;
    let outcome = if probability >= effective_threshold && corroborated {
        Outcome::Sufficient
    } else {
        Outcome::Continue
    };

    let context = DecisionContext {
        probability,
        effective_threshold,
        has_plan,
        turn_count,
        margin: config.margin,
        min_threshold_floor: config.min_threshold_floor,
        high_confidence,
        forced_threshold: config.force_threshold.is_some(),
    };
    debug!(?context, outcome = outcome.as_str(), "gate decision");

    Ok(Decision {
        outcome,
        probability,
        effective_threshold,
        context,
    })
}

/// Caller-side policy for when no model is available: stop after a fixed
/// number of turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnLimitFallback {
    pub max_turns: usize,
}

impl Default for TurnLimitFallback {
    fn default() -> Self {
        TurnLimitFallback { max_turns: 4 }
    }
}

impl TurnLimitFallback {
    pub fn new(max_turns: usize) -> Self {
        TurnLimitFallback { max_turns }
    }

    pub fn decide(&self, turn_count: usize) -> Outcome {
        if turn_count >= self.max_turns {
            Outcome::Sufficient
        } else {
            Outcome::Continue
        }
    }
}
