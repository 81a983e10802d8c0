//! Match registry: persists links between bank transactions and payables

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::matching::matcher::{CandidateMatcher, MatchCandidate};
use crate::matching::scoring::suggest_method;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_positive_amount;

/// Optional overrides for a new match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Defaults to the absolute transaction amount
    pub matched_amount: Option<BigDecimal>,
    /// Defaults to 100
    pub confidence_score: Option<u8>,
    /// Defaults to [`MatchMethod::Manual`]
    pub match_method: Option<MatchMethod>,
    pub match_details: Option<MatchDetails>,
    pub notes: Option<String>,
}

/// Outcome of an automatic matching run over an account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoMatchSummary {
    /// Pending transactions looked at
    pub examined: usize,
    pub matched: Vec<MatchId>,
    /// Transactions whose best candidate stayed below the auto threshold
    pub below_threshold: usize,
    /// Transactions without any candidate
    pub without_candidates: usize,
}

/// Registry enforcing at most one live match per transaction
pub struct MatchRegistry<S: LedgerStorage> {
    storage: S,
    /// Resolves the entity of a replaced match so it can be marked unpaid
    directory: Option<Arc<dyn PayableDirectory>>,
}

impl<S: LedgerStorage> MatchRegistry<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            directory: None,
        }
    }

    /// Registry that releases the paid flag of entities whose match gets
    /// replaced
    pub fn with_directory(storage: S, directory: Arc<dyn PayableDirectory>) -> Self {
        Self {
            storage,
            directory: Some(directory),
        }
    }

    /// Link a transaction to a payable entity.
    ///
    /// Any live match of the transaction is replaced in the same storage
    /// unit, so the transaction never ends up with two matches. Entities
    /// exposing a [`PaymentNotifier`] are marked paid afterwards. The entity
    /// of a replaced match is marked unpaid when the registry has a
    /// directory to look it up in.
    pub async fn create_match(
        &mut self,
        transaction: &Transaction,
        payable: &dyn PayableEntity,
        match_type: MatchType,
        options: MatchOptions,
        ctx: &OperationContext,
    ) -> LedgerResult<Match> {
        if payable.tenant_id() != transaction.tenant_id {
            return Err(LedgerError::Validation(format!(
                "Payable {} belongs to another tenant than transaction {}",
                payable.payable_ref(),
                transaction.id
            )));
        }

        let matched_amount = options
            .matched_amount
            .unwrap_or_else(|| transaction.absolute_amount());
        validate_positive_amount(&matched_amount)?;

        let confidence_score = options.confidence_score.unwrap_or(100);
        if confidence_score > 100 {
            return Err(LedgerError::Validation(format!(
                "Confidence score must be between 0 and 100, got {}",
                confidence_score
            )));
        }

        let new_match = NewMatch {
            transaction_id: transaction.id,
            payable: payable.payable_ref(),
            match_type,
            matched_amount,
            confidence_score,
            match_method: options.match_method.unwrap_or(MatchMethod::Manual),
            match_details: options.match_details,
            notes: options.notes,
            matched_by: ctx.actor_id.clone(),
            matched_at: ctx.at,
        };

        let replacement = self.storage.replace_match(new_match).await?;
        if let Some(replaced) = &replacement.replaced {
            tracing::info!(
                transaction_id = transaction.id,
                replaced_match = replaced.id,
                replaced_payable = %replaced.payable,
                "existing match replaced"
            );
            if replaced.payable != replacement.created.payable {
                self.release(&replaced.payable, ctx).await?;
            }
        }

        if let Some(notifier) = payable.payment_notifier() {
            notifier.mark_paid(ctx).await?;
        }

        let created = replacement.created;
        tracing::info!(
            match_id = created.id,
            transaction_id = created.transaction_id,
            payable = %created.payable,
            method = ?created.match_method,
            confidence = created.confidence_score,
            actor = %ctx.actor_id,
            "match created"
        );
        Ok(created)
    }

    /// Persist a scored candidate as an automatic match
    pub async fn accept_candidate(
        &mut self,
        transaction: &Transaction,
        candidate: &MatchCandidate,
        ctx: &OperationContext,
    ) -> LedgerResult<Match> {
        let options = MatchOptions {
            matched_amount: None,
            confidence_score: Some(candidate.confidence()),
            match_method: Some(suggest_method(&candidate.details)),
            match_details: Some(candidate.details.clone()),
            notes: None,
        };
        self.create_match(
            transaction,
            candidate.entity.as_ref(),
            MatchType::Full,
            options,
            ctx,
        )
        .await
    }

    /// Remove a match and return its transaction to pending.
    ///
    /// `payable` must be the entity the match points at; it is marked unpaid
    /// when it exposes a [`PaymentNotifier`].
    pub async fn unmatch(
        &mut self,
        match_id: MatchId,
        payable: &dyn PayableEntity,
        ctx: &OperationContext,
    ) -> LedgerResult<Transaction> {
        let existing = self.get_match_required(match_id).await?;
        if existing.payable != payable.payable_ref() {
            return Err(LedgerError::Validation(format!(
                "Match {} links {}, not {}",
                match_id,
                existing.payable,
                payable.payable_ref()
            )));
        }

        let (removed, transaction) = self.storage.remove_match(match_id, ctx.at).await?;

        if let Some(notifier) = payable.payment_notifier() {
            notifier.mark_unpaid(ctx).await?;
        }

        tracing::info!(
            match_id = removed.id,
            transaction_id = transaction.id,
            payable = %removed.payable,
            actor = %ctx.actor_id,
            "match removed"
        );
        Ok(transaction)
    }

    async fn release(&self, payable: &PayableRef, ctx: &OperationContext) -> LedgerResult<()> {
        let Some(directory) = &self.directory else {
            tracing::debug!(%payable, "no directory, replaced entity left as is");
            return Ok(());
        };
        match directory.get(payable).await? {
            Some(entity) => {
                if let Some(notifier) = entity.payment_notifier() {
                    notifier.mark_unpaid(ctx).await?;
                }
            }
            None => tracing::warn!(%payable, "replaced entity not found in directory"),
        }
        Ok(())
    }

    /// Accept the best candidate of every pending transaction of an account
    /// whose score reaches the matcher's auto-match threshold
    pub async fn auto_match<D: PayableDirectory>(
        &mut self,
        matcher: &CandidateMatcher<S, D>,
        account_id: &str,
        ctx: &OperationContext,
    ) -> LedgerResult<AutoMatchSummary> {
        let auto_threshold = matcher.config().auto_match_threshold;
        let pending: Vec<Transaction> = self
            .storage
            .get_account_transactions(account_id, None, None)
            .await?
            .into_iter()
            .filter(|t| t.is_pending())
            .collect();

        let mut summary = AutoMatchSummary {
            examined: pending.len(),
            ..Default::default()
        };

        for transaction in pending {
            let Some(best) = matcher.best_match(&transaction).await? else {
                summary.without_candidates += 1;
                continue;
            };

            if best.score + 1e-9 < auto_threshold {
                tracing::debug!(
                    transaction_id = transaction.id,
                    score = best.score,
                    auto_threshold,
                    "best candidate left for review"
                );
                summary.below_threshold += 1;
                continue;
            }

            let created = self.accept_candidate(&transaction, &best, ctx).await?;
            summary.matched.push(created.id);
        }

        tracing::info!(
            account_id,
            examined = summary.examined,
            matched = summary.matched.len(),
            below_threshold = summary.below_threshold,
            "auto-match run finished"
        );
        Ok(summary)
    }

    /// Get a match by ID
    pub async fn get_match(&self, match_id: MatchId) -> LedgerResult<Option<Match>> {
        self.storage.get_match(match_id).await
    }

    /// Get a match by ID, returning an error if not found
    pub async fn get_match_required(&self, match_id: MatchId) -> LedgerResult<Match> {
        self.storage
            .get_match(match_id)
            .await?
            .ok_or(LedgerError::MatchNotFound(match_id))
    }

    /// Live match of a transaction
    pub async fn match_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Match>> {
        self.storage.find_match_by_transaction(transaction_id).await
    }
}
