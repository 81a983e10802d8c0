//! Bank transaction storage and lifecycle management

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// What happened to a single import row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Imported(Transaction),
    Duplicate,
}

/// Transaction manager owning the lifecycle of imported transactions
pub struct TransactionManager<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn ImportRowValidator>,
}

impl<S: LedgerStorage> TransactionManager<S> {
    /// Create a new transaction manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultImportRowValidator),
        }
    }

    /// Create a new transaction manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn ImportRowValidator>) -> Self {
        Self { storage, validator }
    }

    /// Validate and conditionally insert one statement row
    pub async fn import_row(
        &mut self,
        account: &Account,
        batch_id: Uuid,
        row: ImportRow,
        ctx: &OperationContext,
    ) -> LedgerResult<RowOutcome> {
        self.validator.validate_row(&row)?;

        let new = NewTransaction::from_row(account, batch_id, row, ctx);
        match self.storage.insert_transaction(new).await? {
            InsertOutcome::Inserted(txn) => Ok(RowOutcome::Imported(txn)),
            InsertOutcome::Duplicate => Ok(RowOutcome::Duplicate),
        }
    }

    /// Get a transaction by ID
    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Transaction>> {
        self.storage.get_transaction(transaction_id).await
    }

    /// Get a transaction by ID, returning an error if not found
    pub async fn get_transaction_required(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Transaction> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }

    /// Get transactions for a specific account
    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>> {
        self.storage
            .get_account_transactions(account_id, start_date, end_date)
            .await
    }

    /// Pending transactions of an account, oldest first
    pub async fn pending_transactions(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>> {
        let transactions = self
            .get_account_transactions(account_id, start_date, end_date)
            .await?;
        Ok(transactions.into_iter().filter(|t| t.is_pending()).collect())
    }

    /// Exclude a pending transaction from matching and reconciliation counts
    pub async fn ignore_transaction(
        &mut self,
        transaction_id: TransactionId,
        ctx: &OperationContext,
    ) -> LedgerResult<Transaction> {
        let txn = self
            .storage
            .transition_transaction(
                transaction_id,
                TransactionStatus::Pending,
                TransactionStatus::Ignored,
                ctx.at,
            )
            .await?;
        tracing::info!(
            transaction_id,
            actor = %ctx.actor_id,
            "transaction ignored"
        );
        Ok(txn)
    }

    /// Balance implied by the last reconciled transaction at or before
    /// `until`; zero when there is none
    pub async fn calculate_system_balance(
        &self,
        account_id: &str,
        until: NaiveDate,
    ) -> LedgerResult<BigDecimal> {
        let anchor = self
            .storage
            .latest_transaction(account_id, Some(until), Some(TransactionStatus::Reconciled))
            .await?;

        Ok(anchor
            .and_then(|txn| txn.balance)
            .unwrap_or_else(|| BigDecimal::from(0)))
    }
}
