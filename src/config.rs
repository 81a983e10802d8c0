//! Engine configuration
//!
//! Defaults reproduce the standard matching rules (threshold 0.7, ±5 day
//! window) and a one-cent completion tolerance. Values can be overridden
//! from `BANKREC_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `BANKREC_MATCH_THRESHOLD` | `matching.threshold` |
//! | `BANKREC_AUTO_MATCH_THRESHOLD` | `matching.auto_match_threshold` |
//! | `BANKREC_DATE_WINDOW_DAYS` | `matching.date_window_days` |
//! | `BANKREC_MAX_CANDIDATES` | `matching.max_candidates` |
//! | `BANKREC_IMPORT_CHUNK_SIZE` | `import.chunk_size` |
//! | `BANKREC_TOLERANCE` | `reconciliation.tolerance` |
//! | `BANKREC_MAX_UPDATE_RETRIES` | `reconciliation.max_update_retries` |

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::{currency_epsilon, LedgerError, LedgerResult};

/// Widest accepted candidate window on either side of a transaction date
pub const MAX_DATE_WINDOW_DAYS: i64 = 366;

/// Candidate matcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum score for a candidate to be proposed
    pub threshold: f64,
    /// Minimum score for a candidate to be accepted without an operator
    pub auto_match_threshold: f64,
    /// Candidates are pulled from `transaction_date ± date_window_days`
    pub date_window_days: i64,
    /// Upper bound on candidates scored per transaction
    pub max_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            auto_match_threshold: 0.9,
            date_window_days: 5,
            max_candidates: 50,
        }
    }
}

/// Statement import settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows processed per chunk
    pub chunk_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { chunk_size: 500 }
    }
}

/// Reconciliation engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Largest adjusted difference still accepted as balanced (exclusive)
    pub tolerance: BigDecimal,
    /// Reload-and-retry attempts on a concurrent modification
    pub max_update_retries: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance: currency_epsilon(),
            max_update_retries: 3,
        }
    }
}

/// Unified engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub import: ImportConfig,
    pub reconciliation: ReconciliationConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> LedgerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("BANKREC_MATCH_THRESHOLD") {
            config.matching.threshold = parse_var("BANKREC_MATCH_THRESHOLD", &val)?;
        }
        if let Some(val) = lookup("BANKREC_AUTO_MATCH_THRESHOLD") {
            config.matching.auto_match_threshold =
                parse_var("BANKREC_AUTO_MATCH_THRESHOLD", &val)?;
        }
        if let Some(val) = lookup("BANKREC_DATE_WINDOW_DAYS") {
            config.matching.date_window_days = parse_var("BANKREC_DATE_WINDOW_DAYS", &val)?;
        }
        if let Some(val) = lookup("BANKREC_MAX_CANDIDATES") {
            config.matching.max_candidates = parse_var("BANKREC_MAX_CANDIDATES", &val)?;
        }
        if let Some(val) = lookup("BANKREC_IMPORT_CHUNK_SIZE") {
            config.import.chunk_size = parse_var("BANKREC_IMPORT_CHUNK_SIZE", &val)?;
        }
        if let Some(val) = lookup("BANKREC_TOLERANCE") {
            config.reconciliation.tolerance = parse_var("BANKREC_TOLERANCE", &val)?;
        }
        if let Some(val) = lookup("BANKREC_MAX_UPDATE_RETRIES") {
            config.reconciliation.max_update_retries =
                parse_var("BANKREC_MAX_UPDATE_RETRIES", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> LedgerResult<()> {
        for (name, value) in [
            ("matching.threshold", self.matching.threshold),
            (
                "matching.auto_match_threshold",
                self.matching.auto_match_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LedgerError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.matching.auto_match_threshold < self.matching.threshold {
            tracing::warn!(
                threshold = self.matching.threshold,
                auto_match_threshold = self.matching.auto_match_threshold,
                "auto-match threshold is below the proposal threshold"
            );
        }

        if !(0..=MAX_DATE_WINDOW_DAYS).contains(&self.matching.date_window_days) {
            return Err(LedgerError::Config(format!(
                "matching.date_window_days must be between 0 and {}, got {}",
                MAX_DATE_WINDOW_DAYS, self.matching.date_window_days
            )));
        }

        if self.matching.max_candidates == 0 {
            return Err(LedgerError::Config(
                "matching.max_candidates must be at least 1".to_string(),
            ));
        }

        if self.import.chunk_size == 0 {
            return Err(LedgerError::Config(
                "import.chunk_size must be at least 1".to_string(),
            ));
        }

        if self.reconciliation.tolerance <= BigDecimal::from(0) {
            return Err(LedgerError::Config(
                "reconciliation.tolerance must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_import(mut self, import: ImportConfig) -> Self {
        self.import = import;
        self
    }

    pub fn with_reconciliation(mut self, reconciliation: ReconciliationConfig) -> Self {
        self.reconciliation = reconciliation;
        self
    }
}

fn parse_var<T>(key: &str, value: &str) -> LedgerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LedgerError::Config(format!("{}={:?}: {}", key, value, e)))
}
