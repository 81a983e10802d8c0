//! Reconciliation records and their pure state-machine rules

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::*;

/// Identifier of an adjustment, stable for the lifetime of a reconciliation
pub type AdjustmentId = u32;

/// Reconciliation lifecycle: draft → completed → approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Draft,
    Completed,
    Approved,
}

impl ReconciliationStatus {
    /// Only forward transitions exist
    pub fn can_transition_to(self, next: ReconciliationStatus) -> bool {
        matches!(
            (self, next),
            (ReconciliationStatus::Draft, ReconciliationStatus::Completed)
                | (ReconciliationStatus::Completed, ReconciliationStatus::Approved)
        )
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationStatus::Draft => f.write_str("draft"),
            ReconciliationStatus::Completed => f.write_str("completed"),
            ReconciliationStatus::Approved => f.write_str("approved"),
        }
    }
}

/// Reason a manual adjustment was booked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    BankFee,
    Interest,
    TimingDifference,
    Correction,
    Other,
}

/// Manual correction covering a discrepancy not represented by a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub description: String,
    /// Signed amount subtracted from the difference
    pub amount: BigDecimal,
    pub adjustment_type: AdjustmentType,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Derived figures produced by a calculation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    pub transactions_count: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub system_balance: BigDecimal,
}

/// Reconciliation about to be inserted; the storage assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReconciliation {
    pub account_id: String,
    pub tenant_id: String,
    pub reconciliation_date: NaiveDate,
    pub statement_start_date: NaiveDate,
    pub statement_end_date: NaiveDate,
    pub statement_balance: BigDecimal,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl NewReconciliation {
    /// Draft for the statement window `[start, end]` of an account
    pub fn draft(
        account: &Account,
        reconciliation_date: NaiveDate,
        statement_start_date: NaiveDate,
        statement_end_date: NaiveDate,
        statement_balance: BigDecimal,
        notes: Option<String>,
        ctx: &OperationContext,
    ) -> Self {
        Self {
            account_id: account.id.clone(),
            tenant_id: account.tenant_id.clone(),
            reconciliation_date,
            statement_start_date,
            statement_end_date,
            statement_balance,
            notes,
            created_by: ctx.actor_id.clone(),
            created_at: ctx.at,
        }
    }

    pub fn into_reconciliation(self, id: ReconciliationId) -> Reconciliation {
        let zero = BigDecimal::from(0);
        Reconciliation {
            id,
            account_id: self.account_id,
            tenant_id: self.tenant_id,
            reconciliation_date: self.reconciliation_date,
            statement_start_date: self.statement_start_date,
            statement_end_date: self.statement_end_date,
            difference: self.statement_balance.clone(),
            statement_balance: self.statement_balance,
            system_balance: zero,
            status: ReconciliationStatus::Draft,
            transactions_count: 0,
            matched_count: 0,
            unmatched_count: 0,
            adjustments: Vec::new(),
            next_adjustment_id: 1,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.created_at,
            completed_at: None,
            completed_by: None,
            approved_at: None,
            approved_by: None,
            version: 0,
        }
    }
}

/// Statement period being closed for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: ReconciliationId,
    pub account_id: String,
    pub tenant_id: String,
    pub reconciliation_date: NaiveDate,
    pub statement_start_date: NaiveDate,
    pub statement_end_date: NaiveDate,
    /// Closing balance printed on the bank statement
    pub statement_balance: BigDecimal,
    /// Reconciled anchor plus unreconciled activity inside the window
    pub system_balance: BigDecimal,
    /// `statement_balance - system_balance`
    pub difference: BigDecimal,
    pub status: ReconciliationStatus,
    pub transactions_count: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub adjustments: Vec<Adjustment>,
    next_adjustment_id: AdjustmentId,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub completed_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub approved_by: Option<String>,
    /// Optimistic concurrency token, bumped by the storage on every update
    pub version: u64,
}

impl Reconciliation {
    pub fn is_draft(&self) -> bool {
        self.status == ReconciliationStatus::Draft
    }

    /// Fail unless the reconciliation can still be edited
    pub fn ensure_draft(&self) -> LedgerResult<()> {
        if self.is_draft() {
            Ok(())
        } else {
            Err(LedgerError::Precondition(format!(
                "reconciliation {} is {} and can no longer be modified",
                self.id, self.status
            )))
        }
    }

    /// Store the figures of a calculation pass and refresh the difference
    pub fn apply_totals(&mut self, totals: ReconciliationTotals, at: NaiveDateTime) {
        self.transactions_count = totals.transactions_count;
        self.matched_count = totals.matched_count;
        self.unmatched_count = totals.unmatched_count;
        self.difference = &self.statement_balance - &totals.system_balance;
        self.system_balance = totals.system_balance;
        self.updated_at = at;
    }

    /// Append an adjustment and return its identifier
    pub fn add_adjustment(
        &mut self,
        description: String,
        amount: BigDecimal,
        adjustment_type: AdjustmentType,
        ctx: &OperationContext,
    ) -> LedgerResult<AdjustmentId> {
        self.ensure_draft()?;
        crate::utils::validation::validate_adjustment_description(&description)?;

        let id = self.next_adjustment_id;
        self.next_adjustment_id += 1;
        self.adjustments.push(Adjustment {
            id,
            description,
            amount,
            adjustment_type,
            created_by: ctx.actor_id.clone(),
            created_at: ctx.at,
        });
        Ok(id)
    }

    /// Remove an adjustment; unknown identifiers are ignored
    pub fn remove_adjustment(&mut self, id: AdjustmentId) -> LedgerResult<Option<Adjustment>> {
        self.ensure_draft()?;
        let removed = self
            .adjustments
            .iter()
            .position(|a| a.id == id)
            .map(|pos| self.adjustments.remove(pos));
        Ok(removed)
    }

    pub fn total_adjustments(&self) -> BigDecimal {
        self.adjustments.iter().map(|a| &a.amount).sum()
    }

    /// Difference left once adjustments are accounted for
    pub fn adjusted_difference(&self) -> BigDecimal {
        &self.difference - self.total_adjustments()
    }

    /// Completion check with the default one-cent tolerance
    pub fn can_be_completed(&self) -> bool {
        self.can_be_completed_within(&currency_epsilon())
    }

    pub fn can_be_completed_within(&self, tolerance: &BigDecimal) -> bool {
        self.completion_blockers(tolerance).is_empty()
    }

    /// Human readable reasons preventing completion
    pub fn completion_blockers(&self, tolerance: &BigDecimal) -> Vec<String> {
        let mut blockers = Vec::new();

        if !self.is_draft() {
            blockers.push(format!("status is {}", self.status));
        }

        let adjusted = self.adjusted_difference();
        if adjusted.abs() >= *tolerance {
            blockers.push(format!("adjusted difference is {}", adjusted));
        }

        if self.unmatched_count > 0 {
            blockers.push(format!(
                "{} transaction(s) still unmatched",
                self.unmatched_count
            ));
        }

        blockers
    }

    pub(crate) fn mark_completed(&mut self, ctx: &OperationContext) {
        self.status = ReconciliationStatus::Completed;
        self.completed_at = Some(ctx.at);
        self.completed_by = Some(ctx.actor_id.clone());
        self.updated_at = ctx.at;
    }

    pub(crate) fn mark_approved(&mut self, approver_id: &str, ctx: &OperationContext) {
        self.status = ReconciliationStatus::Approved;
        self.approved_at = Some(ctx.at);
        self.approved_by = Some(approver_id.to_string());
        self.updated_at = ctx.at;
    }
}
