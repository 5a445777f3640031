//! TOML configuration for the trainer and the gate.
//!
//! Every section is optional; missing keys take the deployed defaults.
//!
//! ```toml
//! model_dir = "models"
//!
//! [trainer]
//! test_size = 0.2
//! random_seed = 42
//!
//! [trainer.tfidf]
//! min_df = 2
//!
//! [gate]
//! min_threshold_floor = 0.6
//! margin = 0.15
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CriticError, Result};
use crate::gate::{GateConfig, TurnLimitFallback};
use crate::trainer::TrainerConfig;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CriticConfig {
    /// Directory artifacts are written to and loaded from.
    pub model_dir: PathBuf,
    pub trainer: TrainerConfig,
    pub gate: GateConfig,
    pub fallback: TurnLimitFallback,
}

impl Default for CriticConfig {
    fn default() -> Self {
        CriticConfig {
            model_dir: PathBuf::from("models"),
            trainer: TrainerConfig::default(),
            gate: GateConfig::default(),
            fallback: TurnLimitFallback::default(),
        }
    }
}

impl CriticConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, `Config` when it does not parse or
    /// fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|e| CriticError::Config(format!("{}: {}", path.display(), e)))
    }

    /// # Errors
    ///
    /// `Config` on a parse or validation failure.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: CriticConfig =
            toml::from_str(toml_str).map_err(|e| CriticError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `Config` naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        let test_size = self.trainer.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(CriticError::Config(format!(
                "trainer.test_size must be in (0, 1), got {test_size}"
            )));
        }
        self.trainer.validate()?;
        self.gate.validate()?;
        if self.fallback.max_turns == 0 {
            return Err(CriticError::Config("fallback.max_turns must be > 0".into()));
        }
        Ok(())
    }
}
