//! Library entry point for the plan critic.
//!
//! The critic decides whether a clarifying-question dialogue has gathered
//! enough context to stop asking and hand the plan over. It is made of:
//!
//! - `extract`: the single FeatureText construction shared by training and
//!   the live gate.
//! - `trainer`: TF-IDF + class-balanced logistic regression with an
//!   F1-calibrated decision threshold.
//! - `artifact`: write-once JSON persistence and a hot-swappable store.
//! - `gate`: the guarded stop/continue decision.
//
// Public modules
pub mod artifact;
pub mod calibrate;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod gate;
pub mod model;
pub mod text;
pub mod trainer;
pub mod utils;

// Re-export primary types for ergonomic use.
pub use artifact::{
    latest_artifact, load_artifact, save_artifact, ArtifactStore, ClassifierArtifact,
};
pub use classifier::{CalibratedModel, ModelScore, SufficiencyModel, TextPipeline};
pub use config::CriticConfig;
pub use dataset::load_dataset;
pub use error::{CriticError, Result};
pub use extract::{extract, feature_text};
pub use gate::{decide, Decision, DecisionContext, GateConfig, Outcome, TurnLimitFallback};
pub use model::{ClarifyingStep, ConversationRecord, Label};
pub use trainer::{train, Trainer, TrainerConfig, TrainingMetrics};
