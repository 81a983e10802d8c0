//! Main ledger orchestrator: accounts, statement imports and balances

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::ledger::{AccountManager, RowOutcome, TransactionManager};
use crate::traits::*;
use crate::types::*;

/// Per-call import settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Overrides the configured chunk size
    pub chunk_size: Option<usize>,
    /// Batch identifier to stamp on the imported rows; generated when absent
    pub batch_id: Option<Uuid>,
}

/// Ledger system that owns bank accounts and their imported transactions
pub struct Ledger<S: LedgerStorage> {
    account_manager: AccountManager<S>,
    transaction_manager: TransactionManager<S>,
    config: ImportConfig,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, ImportConfig::default())
    }

    /// Create a new ledger with explicit import settings
    pub fn with_config(storage: S, config: ImportConfig) -> Self {
        Self {
            account_manager: AccountManager::new(storage.clone()),
            transaction_manager: TransactionManager::new(storage),
            config,
        }
    }

    /// Create a new ledger with a custom import row validator
    pub fn with_validator(
        storage: S,
        config: ImportConfig,
        validator: Box<dyn ImportRowValidator>,
    ) -> Self {
        Self {
            account_manager: AccountManager::new(storage.clone()),
            transaction_manager: TransactionManager::with_validator(storage, validator),
            config,
        }
    }

    // Account operations
    /// Create a new bank account
    pub async fn create_account(
        &mut self,
        id: String,
        tenant_id: String,
        name: String,
        currency: String,
        ctx: &OperationContext,
    ) -> LedgerResult<Account> {
        self.account_manager
            .create_account(id, tenant_id, name, currency, ctx)
            .await
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.account_manager.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.account_manager.get_account_required(account_id).await
    }

    /// List the accounts of a tenant
    pub async fn list_accounts(&self, tenant_id: &str) -> LedgerResult<Vec<Account>> {
        self.account_manager.list_accounts(tenant_id).await
    }

    // Transaction operations
    /// Import a batch of statement rows into an account.
    ///
    /// Rows whose dedup key already exists are counted as duplicates. A row
    /// that fails validation or storage is reported in `errors` and the
    /// remaining rows are still processed. The account balance is refreshed
    /// once the batch is done.
    pub async fn import_transactions(
        &mut self,
        tenant_id: &str,
        account_id: &str,
        rows: Vec<ImportRow>,
        options: ImportOptions,
        ctx: &OperationContext,
    ) -> LedgerResult<ImportSummary> {
        let account = self.account_manager.get_account_required(account_id).await?;
        if account.tenant_id != tenant_id {
            return Err(LedgerError::Validation(format!(
                "Account '{}' does not belong to tenant '{}'",
                account_id, tenant_id
            )));
        }

        let batch_id = options.batch_id.unwrap_or_else(Uuid::new_v4);
        let chunk_size = options.chunk_size.unwrap_or(self.config.chunk_size).max(1);
        let mut summary = ImportSummary::new(batch_id, rows.len());

        let mut rows = rows.into_iter().enumerate().peekable();
        let mut chunk_index = 0;
        while rows.peek().is_some() {
            let chunk: Vec<(usize, ImportRow)> = rows.by_ref().take(chunk_size).collect();
            tracing::debug!(
                %batch_id,
                chunk = chunk_index,
                rows = chunk.len(),
                "importing chunk"
            );

            for (index, row) in chunk {
                match self
                    .transaction_manager
                    .import_row(&account, batch_id, row, ctx)
                    .await
                {
                    Ok(RowOutcome::Imported(_)) => summary.imported += 1,
                    Ok(RowOutcome::Duplicate) => summary.duplicates += 1,
                    Err(err) => {
                        tracing::warn!(%batch_id, row = index, error = %err, "import row rejected");
                        summary.errors.push(ImportRowError {
                            row: index,
                            message: err.to_string(),
                        });
                    }
                }
            }
            chunk_index += 1;
        }

        self.update_balance(account_id, ctx).await?;

        tracing::info!(
            %batch_id,
            account_id,
            total = summary.total,
            imported = summary.imported,
            duplicates = summary.duplicates,
            errors = summary.errors.len(),
            "statement import finished"
        );
        Ok(summary)
    }

    /// Refresh the account's current balance from its latest transaction
    pub async fn update_balance(
        &mut self,
        account_id: &str,
        ctx: &OperationContext,
    ) -> LedgerResult<Account> {
        self.account_manager.update_balance(account_id, ctx).await
    }

    /// Balance anchored by the last reconciled transaction at or before
    /// `until_date`
    pub async fn calculate_system_balance(
        &self,
        account_id: &str,
        until_date: NaiveDate,
    ) -> LedgerResult<BigDecimal> {
        self.transaction_manager
            .calculate_system_balance(account_id, until_date)
            .await
    }

    /// Get a transaction by ID
    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Transaction>> {
        self.transaction_manager.get_transaction(transaction_id).await
    }

    /// Get a transaction by ID, returning an error if not found
    pub async fn get_transaction_required(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Transaction> {
        self.transaction_manager
            .get_transaction_required(transaction_id)
            .await
    }

    /// Get transactions for a specific account
    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>> {
        self.transaction_manager
            .get_account_transactions(account_id, start_date, end_date)
            .await
    }

    /// Pending transactions of an account
    pub async fn pending_transactions(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.transaction_manager
            .pending_transactions(account_id, None, None)
            .await
    }

    /// Exclude a pending transaction from matching
    pub async fn ignore_transaction(
        &mut self,
        transaction_id: TransactionId,
        ctx: &OperationContext,
    ) -> LedgerResult<Transaction> {
        self.transaction_manager
            .ignore_transaction(transaction_id, ctx)
            .await
    }
}
