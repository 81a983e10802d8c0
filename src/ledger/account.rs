//! Bank account management and balance bookkeeping

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_account_id, validate_currency};

/// Account manager for bank accounts and their current balance
pub struct AccountManager<S: LedgerStorage> {
    pub(crate) storage: S,
}

impl<S: LedgerStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Create a new account
    pub async fn create_account(
        &mut self,
        id: String,
        tenant_id: String,
        name: String,
        currency: String,
        ctx: &OperationContext,
    ) -> LedgerResult<Account> {
        validate_account_id(&id)?;
        validate_currency(&currency)?;
        if tenant_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Tenant ID cannot be empty".to_string(),
            ));
        }

        let account = Account::new(id, tenant_id, name, currency, ctx.at);
        self.storage.save_account(&account).await?;

        tracing::info!(
            account_id = %account.id,
            tenant_id = %account.tenant_id,
            "bank account created"
        );
        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// List the accounts of a tenant
    pub async fn list_accounts(&self, tenant_id: &str) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(tenant_id).await
    }

    /// Set the current balance to the running balance of the most recent
    /// transaction, when the bank reported one.
    ///
    /// Only `current_balance` is written; the reconciled fields belong to
    /// reconciliation completion.
    pub async fn update_balance(
        &mut self,
        account_id: &str,
        ctx: &OperationContext,
    ) -> LedgerResult<Account> {
        let account = self.get_account_required(account_id).await?;

        let latest = self
            .storage
            .latest_transaction(account_id, None, None)
            .await?;

        let Some(balance) = latest.and_then(|txn| txn.balance) else {
            return Ok(account);
        };

        if balance != account.current_balance {
            tracing::debug!(
                account_id,
                old = %account.current_balance,
                new = %balance,
                "current balance updated"
            );
        }
        self.storage
            .set_current_balance(account_id, balance, ctx.at)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use crate::reconciliation::NewReconciliation;
    use crate::utils::memory_storage::MemoryStorage;
    use crate::utils::test_support::HookedStorage;
    use uuid::Uuid;

    fn ctx() -> OperationContext {
        OperationContext::new(
            "admin",
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_account_validates_input() {
        let mut manager = AccountManager::new(MemoryStorage::new());

        let account = manager
            .create_account(
                "acc-1".to_string(),
                "tenant-1".to_string(),
                "Operating".to_string(),
                "EUR".to_string(),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(account.current_balance, BigDecimal::from(0));
        assert!(account.last_reconciled_date.is_none());

        let duplicate = manager
            .create_account(
                "acc-1".to_string(),
                "tenant-1".to_string(),
                "Again".to_string(),
                "EUR".to_string(),
                &ctx(),
            )
            .await;
        assert!(duplicate.is_err());

        let bad_currency = manager
            .create_account(
                "acc-2".to_string(),
                "tenant-1".to_string(),
                "Savings".to_string(),
                "euro".to_string(),
                &ctx(),
            )
            .await;
        assert!(matches!(bad_currency, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_balance_without_transactions_keeps_balance() {
        let mut manager = AccountManager::new(MemoryStorage::new());
        manager
            .create_account(
                "acc-1".to_string(),
                "tenant-1".to_string(),
                "Operating".to_string(),
                "EUR".to_string(),
                &ctx(),
            )
            .await
            .unwrap();

        let account = manager.update_balance("acc-1", &ctx()).await.unwrap();
        assert_eq!(account.current_balance, BigDecimal::from(0));

        let missing = manager.update_balance("nope", &ctx()).await;
        assert!(matches!(missing, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_balance_keeps_concurrent_close() {
        let mut inner = MemoryStorage::new();
        let account = Account::new(
            "acc-1".to_string(),
            "tenant-1".to_string(),
            "Operating".to_string(),
            "EUR".to_string(),
            ctx().at,
        );
        inner.save_account(&account).await.unwrap();

        let row = ImportRow::new(
            NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            "Deposit".to_string(),
            BigDecimal::from(900),
        )
        .with_balance(BigDecimal::from(900));
        inner
            .insert_transaction(NewTransaction::from_row(&account, Uuid::new_v4(), row, &ctx()))
            .await
            .unwrap();

        let mut closing = inner
            .save_reconciliation(NewReconciliation::draft(
                &account,
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                BigDecimal::from(777),
                None,
                &ctx(),
            ))
            .await
            .unwrap();
        closing.mark_completed(&ctx());

        let storage = HookedStorage::new(inner.clone());
        *storage.close_during_read.lock().unwrap() = Some(closing);

        let mut manager = AccountManager::new(storage);
        let updated = manager.update_balance("acc-1", &ctx()).await.unwrap();

        assert_eq!(updated.current_balance, BigDecimal::from(900));
        assert_eq!(updated.reconciled_balance, BigDecimal::from(777));
        let stored = inner.get_account("acc-1").await.unwrap().unwrap();
        assert_eq!(stored.reconciled_balance, BigDecimal::from(777));
        assert_eq!(
            stored.last_reconciled_date,
            NaiveDate::from_ymd_opt(2024, 1, 31)
        );
    }
}
