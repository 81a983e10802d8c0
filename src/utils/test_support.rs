//! Storage wrapper injecting concurrent writers and failures into tests

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::reconciliation::{NewReconciliation, Reconciliation};
use crate::traits::*;
use crate::types::*;
use crate::utils::memory_storage::MemoryStorage;

/// Delegates to a [`MemoryStorage`] and interferes on demand
#[derive(Clone, Default)]
pub(crate) struct HookedStorage {
    pub inner: MemoryStorage,
    /// Number of upcoming reconciliation writes that another writer beats
    pub conflicts: Arc<AtomicU32>,
    /// Fail the next completion with a storage error
    pub fail_completion: Arc<AtomicBool>,
    /// Completed reconciliation persisted by another writer while the
    /// latest transaction is being read
    pub close_during_read: Arc<Mutex<Option<Reconciliation>>>,
}

impl HookedStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    async fn race(&mut self, reconciliation_id: ReconciliationId) -> LedgerResult<()> {
        let pending = self.conflicts.load(Ordering::SeqCst);
        if pending == 0 {
            return Ok(());
        }
        self.conflicts.store(pending - 1, Ordering::SeqCst);
        let current = self
            .inner
            .get_reconciliation(reconciliation_id)
            .await?
            .ok_or(LedgerError::ReconciliationNotFound(reconciliation_id))?;
        self.inner.update_reconciliation(&current).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStorage for HookedStorage {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        self.inner.save_account(account).await
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.inner.get_account(account_id).await
    }

    async fn list_accounts(&self, tenant_id: &str) -> LedgerResult<Vec<Account>> {
        self.inner.list_accounts(tenant_id).await
    }

    async fn set_current_balance(
        &mut self,
        account_id: &str,
        balance: BigDecimal,
        at: NaiveDateTime,
    ) -> LedgerResult<Account> {
        self.inner.set_current_balance(account_id, balance, at).await
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> LedgerResult<InsertOutcome> {
        self.inner.insert_transaction(transaction).await
    }

    async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Transaction>> {
        self.inner.get_transaction(transaction_id).await
    }

    async fn get_account_transactions(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>> {
        self.inner
            .get_account_transactions(account_id, start_date, end_date)
            .await
    }

    async fn latest_transaction(
        &self,
        account_id: &str,
        until: Option<NaiveDate>,
        status: Option<TransactionStatus>,
    ) -> LedgerResult<Option<Transaction>> {
        let latest = self.inner.latest_transaction(account_id, until, status).await?;

        let closing = self
            .close_during_read
            .lock()
            .map_err(|_| LedgerError::Storage("hook lock poisoned".to_string()))?
            .take();
        if let Some(rec) = closing {
            self.inner.clone().complete_reconciliation(&rec).await?;
        }

        Ok(latest)
    }

    async fn transition_transaction(
        &mut self,
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
        at: NaiveDateTime,
    ) -> LedgerResult<Transaction> {
        self.inner
            .transition_transaction(transaction_id, from, to, at)
            .await
    }

    async fn replace_match(&mut self, new_match: NewMatch) -> LedgerResult<MatchReplacement> {
        self.inner.replace_match(new_match).await
    }

    async fn remove_match(
        &mut self,
        match_id: MatchId,
        at: NaiveDateTime,
    ) -> LedgerResult<(Match, Transaction)> {
        self.inner.remove_match(match_id, at).await
    }

    async fn get_match(&self, match_id: MatchId) -> LedgerResult<Option<Match>> {
        self.inner.get_match(match_id).await
    }

    async fn find_match_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Match>> {
        self.inner.find_match_by_transaction(transaction_id).await
    }

    async fn linked_payables(&self, kind: PayableKind) -> LedgerResult<BTreeSet<PayableRef>> {
        self.inner.linked_payables(kind).await
    }

    async fn complete_reconciliation(
        &mut self,
        reconciliation: &Reconciliation,
    ) -> LedgerResult<Reconciliation> {
        if self.fail_completion.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Storage("connection reset".to_string()));
        }
        self.race(reconciliation.id).await?;
        self.inner.complete_reconciliation(reconciliation).await
    }

    async fn save_reconciliation(
        &mut self,
        reconciliation: NewReconciliation,
    ) -> LedgerResult<Reconciliation> {
        self.inner.save_reconciliation(reconciliation).await
    }

    async fn get_reconciliation(
        &self,
        reconciliation_id: ReconciliationId,
    ) -> LedgerResult<Option<Reconciliation>> {
        self.inner.get_reconciliation(reconciliation_id).await
    }

    async fn list_reconciliations(&self, account_id: &str) -> LedgerResult<Vec<Reconciliation>> {
        self.inner.list_reconciliations(account_id).await
    }

    async fn update_reconciliation(
        &mut self,
        reconciliation: &Reconciliation,
    ) -> LedgerResult<Reconciliation> {
        self.race(reconciliation.id).await?;
        self.inner.update_reconciliation(reconciliation).await
    }
}
