//! Scoring policy
//!
//! Loads the behaviours left to deployment choice from YAML: how strictly the
//! weight budget is enforced, whether submission waits for a scorable goal,
//! and the formula input limits.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::formula::FormulaLimits;

/// Environment variable naming the policy file
pub const POLICY_ENV: &str = "SCORING_POLICY";

const DEFAULT_POLICY_PATH: &str = "config/scoring.yaml";

/// What happens when an edit pushes the weights past 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightBudgetMode {
    /// Accept and flag
    #[default]
    Soft,
    /// Reject the edit
    Strict,
}

/// Whether a goal must be scorable before it can be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionGate {
    #[default]
    Unrestricted,
    RequireScorable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub weight_budget: WeightBudgetMode,
    pub submission: SubmissionGate,
    pub formula: FormulaLimits,
}

impl ScoringPolicy {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let policy: ScoringPolicy =
            serde_yaml::from_str(content).context("Failed to parse scoring policy")?;
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        if self.formula.max_length == 0 {
            return Err(anyhow!("formula.max_length must be greater than 0"));
        }
        if self.formula.max_depth == 0 {
            return Err(anyhow!("formula.max_depth must be greater than 0"));
        }
        Ok(())
    }
}

pub struct PolicyLoader {
    path: Option<PathBuf>,
}

impl PolicyLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Loader that always yields the default policy
    pub fn defaults() -> Self {
        Self { path: None }
    }

    /// Resolve the policy file
    ///
    /// 1. `SCORING_POLICY` environment variable
    /// 2. `config/scoring.yaml` relative to the working directory
    /// 3. Built-in defaults
    pub fn from_env() -> Self {
        if let Ok(path) = std::env::var(POLICY_ENV) {
            return Self::new(path);
        }
        if Path::new(DEFAULT_POLICY_PATH).exists() {
            return Self::new(DEFAULT_POLICY_PATH);
        }
        Self::defaults()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<ScoringPolicy> {
        let Some(path) = &self.path else {
            info!("No scoring policy file, using defaults");
            return Ok(ScoringPolicy::default());
        };

        info!("Loading scoring policy from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let policy = ScoringPolicy::from_yaml(&content)
            .with_context(|| format!("Invalid scoring policy in {}", path.display()))?;

        info!(
            "Loaded scoring policy: weight budget {:?}, submission {:?}",
            policy.weight_budget, policy.submission
        );
        Ok(policy)
    }
}
