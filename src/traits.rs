//! Traits for storage abstraction and the external payable collaborators

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::reconciliation::{NewReconciliation, Reconciliation};
use crate::types::*;

/// Storage abstraction for the reconciliation system
///
/// This trait allows the core to work with any storage backend (PostgreSQL,
/// SQLite, in-memory, etc.). Methods that guard an invariant are conditional
/// writes: a backend must perform the check and the write as one unit
/// (unique constraints, a database transaction, or a lock), never as a
/// separate read followed by a write.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Save a new account
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()>;

    /// Get an account by ID
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// List the accounts of a tenant
    async fn list_accounts(&self, tenant_id: &str) -> LedgerResult<Vec<Account>>;

    /// Set only the current balance of an account, leaving every other
    /// field as stored
    async fn set_current_balance(
        &mut self,
        account_id: &str,
        balance: BigDecimal,
        at: NaiveDateTime,
    ) -> LedgerResult<Account>;

    /// Insert a transaction unless one of its dedup keys already exists for
    /// the account.
    ///
    /// The keys are `(account, external_id)` when an external id is present
    /// and `(account, transaction_date, amount, description)`.
    async fn insert_transaction(&mut self, transaction: NewTransaction)
        -> LedgerResult<InsertOutcome>;

    /// Get a transaction by ID
    async fn get_transaction(&self, transaction_id: TransactionId)
        -> LedgerResult<Option<Transaction>>;

    /// List transactions of an account within an optional date range,
    /// ordered by (transaction date, id) ascending
    async fn get_account_transactions(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Most recent transaction of an account ordered by (transaction date
    /// desc, id desc), optionally restricted to a status and a last date
    async fn latest_transaction(
        &self,
        account_id: &str,
        until: Option<NaiveDate>,
        status: Option<TransactionStatus>,
    ) -> LedgerResult<Option<Transaction>>;

    /// Move a transaction from `from` to `to`, failing if its current status
    /// is not `from`
    async fn transition_transaction(
        &mut self,
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
        at: NaiveDateTime,
    ) -> LedgerResult<Transaction>;

    /// Delete any live match of the transaction, insert `new_match` and mark
    /// the transaction matched, all as one unit
    async fn replace_match(&mut self, new_match: NewMatch) -> LedgerResult<MatchReplacement>;

    /// Delete a match and return its transaction to pending, as one unit
    async fn remove_match(
        &mut self,
        match_id: MatchId,
        at: NaiveDateTime,
    ) -> LedgerResult<(Match, Transaction)>;

    /// Get a match by ID
    async fn get_match(&self, match_id: MatchId) -> LedgerResult<Option<Match>>;

    /// Live match of a transaction
    async fn find_match_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Match>>;

    /// Payable entities of `kind` referenced by a live match
    async fn linked_payables(&self, kind: PayableKind) -> LedgerResult<BTreeSet<PayableRef>>;

    /// Persist a reconciliation that has just been marked completed, as one
    /// unit with its side effects:
    ///
    /// - the stored version must still equal `reconciliation.version`,
    ///   otherwise [`LedgerError::Conflict`] and nothing is written
    /// - every matched transaction of the account inside the statement
    ///   window moves to reconciled and its match is stamped with the
    ///   reconciliation id
    /// - the account records the statement balance and reconciliation date
    ///
    /// Returns the stored copy with the version bumped.
    async fn complete_reconciliation(
        &mut self,
        reconciliation: &Reconciliation,
    ) -> LedgerResult<Reconciliation>;

    /// Insert a new reconciliation
    async fn save_reconciliation(
        &mut self,
        reconciliation: NewReconciliation,
    ) -> LedgerResult<Reconciliation>;

    /// Get a reconciliation by ID
    async fn get_reconciliation(
        &self,
        reconciliation_id: ReconciliationId,
    ) -> LedgerResult<Option<Reconciliation>>;

    /// List reconciliations of an account, newest statement first
    async fn list_reconciliations(&self, account_id: &str) -> LedgerResult<Vec<Reconciliation>>;

    /// Persist a reconciliation if the stored version still equals
    /// `reconciliation.version`, returning the stored copy with the version
    /// bumped. A stale version yields [`LedgerError::Conflict`].
    async fn update_reconciliation(
        &mut self,
        reconciliation: &Reconciliation,
    ) -> LedgerResult<Reconciliation>;
}

/// Optional capability of a payable entity to track its paid state
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    /// Called once a bank transaction has been linked to the entity
    async fn mark_paid(&self, ctx: &OperationContext) -> LedgerResult<()>;

    /// Called once the link has been removed again
    async fn mark_unpaid(&self, ctx: &OperationContext) -> LedgerResult<()>;
}

/// External receivable or payable record a bank transaction can settle
pub trait PayableEntity: Send + Sync {
    /// Tagged identity of the entity
    fn payable_ref(&self) -> PayableRef;

    fn tenant_id(&self) -> &str;

    fn amount(&self) -> BigDecimal;

    fn date(&self) -> NaiveDate;

    fn reference(&self) -> Option<&str>;

    /// Entities that track a paid flag expose it here; the default opts out
    fn payment_notifier(&self) -> Option<&dyn PaymentNotifier> {
        None
    }
}

/// Filter used to pull payable candidates for one bank transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub tenant_id: String,
    pub kind: PayableKind,
    /// Exact amount the candidate must carry
    pub amount: BigDecimal,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Entities that must not be returned, applied before `limit`
    #[serde(default)]
    pub exclude: BTreeSet<PayableRef>,
    pub limit: usize,
}

/// Source of payable entities (invoices, expenses, ...) owned by the
/// surrounding system
#[async_trait]
pub trait PayableDirectory: Send + Sync {
    /// Entities of `query.kind` in the tenant with exactly `query.amount`
    /// and a date inside `[date_from, date_to]`, minus `query.exclude`, at
    /// most `query.limit`
    async fn find_candidates(
        &self,
        query: &CandidateQuery,
    ) -> LedgerResult<Vec<Arc<dyn PayableEntity>>>;

    /// Look an entity up by reference
    async fn get(&self, payable: &PayableRef) -> LedgerResult<Option<Arc<dyn PayableEntity>>>;
}

/// Trait for implementing custom import row validation rules
pub trait ImportRowValidator: Send + Sync {
    /// Validate a row before it is inserted
    fn validate_row(&self, row: &ImportRow) -> LedgerResult<()>;
}

/// Default import row validator with basic rules
pub struct DefaultImportRowValidator;

impl ImportRowValidator for DefaultImportRowValidator {
    fn validate_row(&self, row: &ImportRow) -> LedgerResult<()> {
        crate::utils::validation::validate_import_row(row)
    }
}
