//! Reconciliation engine: drives a statement period from draft to approval

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::config::ReconciliationConfig;
use crate::ledger::{AccountManager, TransactionManager};
use crate::reconciliation::period::*;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_statement_window;

/// Reconciliation engine bound to a storage backend
pub struct ReconciliationEngine<S: LedgerStorage> {
    storage: S,
    account_manager: AccountManager<S>,
    transaction_manager: TransactionManager<S>,
    config: ReconciliationConfig,
}

impl<S: LedgerStorage + Clone> ReconciliationEngine<S> {
    /// Create an engine with the default settings
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, ReconciliationConfig::default())
    }

    pub fn with_config(storage: S, config: ReconciliationConfig) -> Self {
        Self {
            account_manager: AccountManager::new(storage.clone()),
            transaction_manager: TransactionManager::new(storage.clone()),
            storage,
            config,
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Open a draft reconciliation for the statement window `[start, end]`
    /// and run a first calculation
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &mut self,
        account_id: &str,
        reconciliation_date: NaiveDate,
        statement_start_date: NaiveDate,
        statement_end_date: NaiveDate,
        statement_balance: BigDecimal,
        notes: Option<String>,
        ctx: &OperationContext,
    ) -> LedgerResult<Reconciliation> {
        validate_statement_window(statement_start_date, statement_end_date)?;
        let account = self.account_manager.get_account_required(account_id).await?;

        let draft = NewReconciliation::draft(
            &account,
            reconciliation_date,
            statement_start_date,
            statement_end_date,
            statement_balance,
            notes,
            ctx,
        );
        let created = self.storage.save_reconciliation(draft).await?;

        tracing::info!(
            reconciliation_id = created.id,
            account_id,
            start = %statement_start_date,
            end = %statement_end_date,
            actor = %ctx.actor_id,
            "reconciliation opened"
        );

        self.calculate(created.id, ctx).await
    }

    /// Recompute counts, system balance and difference of a draft
    pub async fn calculate(
        &mut self,
        reconciliation_id: ReconciliationId,
        ctx: &OperationContext,
    ) -> LedgerResult<Reconciliation> {
        let (saved, ()) = self
            .update_with_retry(reconciliation_id, ctx, |rec| rec.ensure_draft())
            .await?;

        tracing::debug!(
            reconciliation_id,
            system_balance = %saved.system_balance,
            difference = %saved.difference,
            unmatched = saved.unmatched_count,
            "reconciliation calculated"
        );
        Ok(saved)
    }

    /// Book a manual adjustment on a draft
    pub async fn add_adjustment(
        &mut self,
        reconciliation_id: ReconciliationId,
        description: String,
        amount: BigDecimal,
        adjustment_type: AdjustmentType,
        ctx: &OperationContext,
    ) -> LedgerResult<(Reconciliation, AdjustmentId)> {
        let (saved, adjustment_id) = self
            .update_with_retry(reconciliation_id, ctx, |rec| {
                rec.add_adjustment(description.clone(), amount.clone(), adjustment_type, ctx)
            })
            .await?;

        tracing::info!(
            reconciliation_id,
            adjustment_id,
            amount = %amount,
            actor = %ctx.actor_id,
            "adjustment added"
        );
        Ok((saved, adjustment_id))
    }

    /// Remove an adjustment from a draft; unknown ids leave it untouched
    pub async fn remove_adjustment(
        &mut self,
        reconciliation_id: ReconciliationId,
        adjustment_id: AdjustmentId,
        ctx: &OperationContext,
    ) -> LedgerResult<Reconciliation> {
        let (saved, removed) = self
            .update_with_retry(reconciliation_id, ctx, |rec| {
                rec.remove_adjustment(adjustment_id)
            })
            .await?;

        if removed.is_some() {
            tracing::info!(
                reconciliation_id,
                adjustment_id,
                actor = %ctx.actor_id,
                "adjustment removed"
            );
        }
        Ok(saved)
    }

    /// Close the statement period.
    ///
    /// The figures are recalculated first and completion is refused with
    /// [`LedgerError::Precondition`] unless the adjusted difference is within
    /// tolerance and nothing in the window is still pending. The status
    /// change, the move of matched transactions to reconciled and the
    /// account's reconciled balance are persisted as one storage write.
    pub async fn mark_as_completed(
        &mut self,
        reconciliation_id: ReconciliationId,
        ctx: &OperationContext,
    ) -> LedgerResult<Reconciliation> {
        let tolerance = self.config.tolerance.clone();
        let (completed, ()) = self
            .update_with_retry(reconciliation_id, ctx, |rec| {
                rec.ensure_draft()?;
                let blockers = rec.completion_blockers(&tolerance);
                if !blockers.is_empty() {
                    return Err(LedgerError::Precondition(format!(
                        "reconciliation {} cannot be completed: {}",
                        rec.id,
                        blockers.join(", ")
                    )));
                }
                rec.mark_completed(ctx);
                Ok(())
            })
            .await?;

        tracing::info!(
            reconciliation_id,
            account_id = %completed.account_id,
            reconciled_transactions = completed.matched_count,
            statement_balance = %completed.statement_balance,
            actor = %ctx.actor_id,
            "reconciliation completed"
        );
        Ok(completed)
    }

    /// Approve a completed reconciliation
    pub async fn mark_as_approved(
        &mut self,
        reconciliation_id: ReconciliationId,
        approver_id: &str,
        ctx: &OperationContext,
    ) -> LedgerResult<Reconciliation> {
        let (approved, ()) = self
            .update_with_retry(reconciliation_id, ctx, |rec| {
                if !rec.status.can_transition_to(ReconciliationStatus::Approved) {
                    return Err(LedgerError::Precondition(format!(
                        "reconciliation {} is {}, only completed reconciliations can be approved",
                        rec.id, rec.status
                    )));
                }
                rec.mark_approved(approver_id, ctx);
                Ok(())
            })
            .await?;

        tracing::info!(
            reconciliation_id,
            approver = approver_id,
            "reconciliation approved"
        );
        Ok(approved)
    }

    /// Get a reconciliation by ID
    pub async fn get(
        &self,
        reconciliation_id: ReconciliationId,
    ) -> LedgerResult<Option<Reconciliation>> {
        self.storage.get_reconciliation(reconciliation_id).await
    }

    /// Get a reconciliation by ID, returning an error if not found
    pub async fn get_required(
        &self,
        reconciliation_id: ReconciliationId,
    ) -> LedgerResult<Reconciliation> {
        self.storage
            .get_reconciliation(reconciliation_id)
            .await?
            .ok_or(LedgerError::ReconciliationNotFound(reconciliation_id))
    }

    /// Reconciliations of an account, newest statement first
    pub async fn list_for_account(&self, account_id: &str) -> LedgerResult<Vec<Reconciliation>> {
        self.storage.list_reconciliations(account_id).await
    }

    /// Pending transactions inside the statement window
    pub async fn outstanding_transactions(
        &self,
        reconciliation_id: ReconciliationId,
    ) -> LedgerResult<Vec<Transaction>> {
        let rec = self.get_required(reconciliation_id).await?;
        self.transaction_manager
            .pending_transactions(
                &rec.account_id,
                Some(rec.statement_start_date),
                Some(rec.statement_end_date),
            )
            .await
    }

    /// Figures of the statement window as currently stored
    async fn totals_for(&self, rec: &Reconciliation) -> LedgerResult<ReconciliationTotals> {
        let transactions = self
            .transaction_manager
            .get_account_transactions(
                &rec.account_id,
                Some(rec.statement_start_date),
                Some(rec.statement_end_date),
            )
            .await?;

        let anchor = self
            .transaction_manager
            .calculate_system_balance(&rec.account_id, rec.statement_end_date)
            .await?;

        let mut matched_count = 0;
        let mut unmatched_count = 0;
        let mut activity = BigDecimal::from(0);
        for txn in &transactions {
            match txn.status {
                TransactionStatus::Matched => {
                    matched_count += 1;
                    activity += &txn.amount;
                }
                TransactionStatus::Pending => {
                    unmatched_count += 1;
                    activity += &txn.amount;
                }
                TransactionStatus::Reconciled | TransactionStatus::Ignored => {}
            }
        }

        Ok(ReconciliationTotals {
            transactions_count: transactions.len(),
            matched_count,
            unmatched_count,
            system_balance: anchor + activity,
        })
    }

    /// Load, edit and persist a reconciliation under optimistic versioning.
    ///
    /// Drafts get fresh totals before `edit` runs. An edit that completes a
    /// draft is persisted through [`LedgerStorage::complete_reconciliation`].
    /// A stale version reloads and replays the edit up to
    /// `max_update_retries` times.
    async fn update_with_retry<F, R>(
        &mut self,
        reconciliation_id: ReconciliationId,
        ctx: &OperationContext,
        mut edit: F,
    ) -> LedgerResult<(Reconciliation, R)>
    where
        F: FnMut(&mut Reconciliation) -> LedgerResult<R>,
    {
        let mut attempt = 0;
        loop {
            let mut rec = self.get_required(reconciliation_id).await?;
            let was_draft = rec.is_draft();
            if was_draft {
                let totals = self.totals_for(&rec).await?;
                rec.apply_totals(totals, ctx.at);
            }

            let output = edit(&mut rec)?;

            let written = if was_draft && rec.status == ReconciliationStatus::Completed {
                self.storage.complete_reconciliation(&rec).await
            } else {
                self.storage.update_reconciliation(&rec).await
            };
            match written {
                Ok(saved) => return Ok((saved, output)),
                Err(LedgerError::Conflict(reason)) if attempt < self.config.max_update_retries => {
                    attempt += 1;
                    tracing::warn!(
                        reconciliation_id,
                        attempt,
                        %reason,
                        "concurrent reconciliation update, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}
