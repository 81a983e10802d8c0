//! Candidate matcher: proposes payable entities for a bank transaction

use chrono::Duration;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::config::MatchingConfig;
use crate::matching::scoring::{confidence_from_score, score_candidate};
use crate::traits::*;
use crate::types::*;

/// Absorbs float noise when comparing a weighted score to a threshold
const SCORE_EPSILON: f64 = 1e-9;

/// Scored candidate for a bank transaction
#[derive(Clone)]
pub struct MatchCandidate {
    pub entity: Arc<dyn PayableEntity>,
    pub payable: PayableRef,
    pub score: f64,
    pub details: MatchDetails,
}

impl MatchCandidate {
    pub fn kind(&self) -> PayableKind {
        self.payable.kind
    }

    /// Score expressed as a 0–100 confidence
    pub fn confidence(&self) -> u8 {
        confidence_from_score(self.score)
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::from_score(self.confidence())
    }
}

impl fmt::Debug for MatchCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchCandidate")
            .field("payable", &self.payable)
            .field("score", &self.score)
            .field("details", &self.details)
            .finish()
    }
}

/// Scores payable entities from a directory against bank transactions
pub struct CandidateMatcher<S: LedgerStorage, D: PayableDirectory> {
    storage: S,
    directory: D,
    config: MatchingConfig,
}

impl<S: LedgerStorage, D: PayableDirectory> CandidateMatcher<S, D> {
    /// Create a matcher with the default settings
    pub fn new(storage: S, directory: D) -> Self {
        Self::with_config(storage, directory, MatchingConfig::default())
    }

    pub fn with_config(storage: S, directory: D, config: MatchingConfig) -> Self {
        Self {
            storage,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Candidates clearing the configured threshold, best first
    pub async fn find_potential_matches(
        &self,
        transaction: &Transaction,
    ) -> LedgerResult<Vec<MatchCandidate>> {
        self.find_potential_matches_with_threshold(transaction, self.config.threshold)
            .await
    }

    /// Candidates with a score of at least `threshold`, best first.
    ///
    /// Ties are broken by payable reference so that the order is stable.
    pub async fn find_potential_matches_with_threshold(
        &self,
        transaction: &Transaction,
        threshold: f64,
    ) -> LedgerResult<Vec<MatchCandidate>> {
        if !matches!(
            transaction.status,
            TransactionStatus::Pending | TransactionStatus::Matched
        ) {
            tracing::debug!(
                transaction_id = transaction.id,
                status = %transaction.status,
                "transaction is closed for matching"
            );
            return Ok(Vec::new());
        }

        let Some(kind) = PayableKind::for_amount(&transaction.amount) else {
            return Ok(Vec::new());
        };

        let window_days = self.config.date_window_days;
        let window = Duration::try_days(window_days);
        let bounds = window.and_then(|w| {
            Some((
                transaction.transaction_date.checked_sub_signed(w)?,
                transaction.transaction_date.checked_add_signed(w)?,
            ))
        });
        let Some((date_from, date_to)) = bounds else {
            return Err(LedgerError::Validation(format!(
                "date window of {} days around {} is out of range",
                window_days, transaction.transaction_date
            )));
        };

        let query = CandidateQuery {
            tenant_id: transaction.tenant_id.clone(),
            kind,
            amount: transaction.absolute_amount(),
            date_from,
            date_to,
            exclude: self.storage.linked_payables(kind).await?,
            limit: self.config.max_candidates,
        };

        let entities = self.directory.find_candidates(&query).await?;
        let mut candidates = Vec::with_capacity(entities.len());

        for entity in entities {
            let payable = entity.payable_ref();
            if query.exclude.contains(&payable) {
                tracing::debug!(%payable, "candidate already linked");
                continue;
            }

            let details = score_candidate(
                &transaction.amount,
                transaction.transaction_date,
                transaction.reference.as_deref(),
                &entity.amount(),
                entity.date(),
                entity.reference(),
            );
            tracing::debug!(
                transaction_id = transaction.id,
                %payable,
                score = details.score,
                "candidate scored"
            );

            if details.score + SCORE_EPSILON >= threshold {
                candidates.push(MatchCandidate {
                    entity,
                    payable,
                    score: details.score,
                    details,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.payable.cmp(&b.payable))
        });

        Ok(candidates)
    }

    /// Highest ranked candidate, if any clears the configured threshold
    pub async fn best_match(&self, transaction: &Transaction) -> LedgerResult<Option<MatchCandidate>> {
        Ok(self
            .find_potential_matches(transaction)
            .await?
            .into_iter()
            .next())
    }
}
