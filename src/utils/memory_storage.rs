//! In-memory storage implementation for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::reconciliation::{NewReconciliation, Reconciliation, ReconciliationStatus};
use crate::traits::*;
use crate::types::*;

/// (account, transaction date, normalized amount, description)
type ContentKey = (String, NaiveDate, String, String);

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    transactions: BTreeMap<TransactionId, Transaction>,
    external_ids: HashSet<(String, String)>,
    content_keys: HashSet<ContentKey>,
    matches: BTreeMap<MatchId, Match>,
    match_by_transaction: HashMap<TransactionId, MatchId>,
    reconciliations: BTreeMap<ReconciliationId, Reconciliation>,
    next_transaction_id: TransactionId,
    next_match_id: MatchId,
    next_reconciliation_id: ReconciliationId,
}

impl Tables {
    fn transaction_mut(&mut self, id: TransactionId) -> LedgerResult<&mut Transaction> {
        self.transactions
            .get_mut(&id)
            .ok_or(LedgerError::TransactionNotFound(id))
    }
}

fn content_key(account_id: &str, date: NaiveDate, amount: &BigDecimal, description: &str) -> ContentKey {
    (
        account_id.to_string(),
        date,
        amount.normalized().to_string(),
        description.to_string(),
    )
}

/// In-memory storage implementation for testing and development
///
/// All tables sit behind a single lock so that every conditional write is
/// atomic with respect to concurrent callers sharing the same clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        *self.write()? = Tables::default();
        Ok(())
    }

    /// Number of live matches
    pub fn match_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.matches.len())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Storage("memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| LedgerError::Storage("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        let mut tables = self.write()?;
        if tables.accounts.contains_key(&account.id) {
            return Err(LedgerError::Validation(format!(
                "Account with ID '{}' already exists",
                account.id
            )));
        }
        tables.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    async fn list_accounts(&self, tenant_id: &str) -> LedgerResult<Vec<Account>> {
        let tables = self.read()?;
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|account| account.tenant_id == tenant_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn set_current_balance(
        &mut self,
        account_id: &str,
        balance: BigDecimal,
        at: NaiveDateTime,
    ) -> LedgerResult<Account> {
        let mut tables = self.write()?;
        let stored = tables
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        stored.current_balance = balance;
        stored.updated_at = at;
        Ok(stored.clone())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> LedgerResult<InsertOutcome> {
        let mut tables = self.write()?;

        if !tables.accounts.contains_key(&transaction.account_id) {
            return Err(LedgerError::AccountNotFound(transaction.account_id));
        }

        let external_key = transaction
            .external_id
            .as_ref()
            .map(|id| (transaction.account_id.clone(), id.clone()));
        if let Some(key) = &external_key {
            if tables.external_ids.contains(key) {
                return Ok(InsertOutcome::Duplicate);
            }
        }

        let content = content_key(
            &transaction.account_id,
            transaction.transaction_date,
            &transaction.amount,
            &transaction.description,
        );
        if tables.content_keys.contains(&content) {
            return Ok(InsertOutcome::Duplicate);
        }

        tables.next_transaction_id += 1;
        let id = tables.next_transaction_id;
        let stored = transaction.into_transaction(id);

        if let Some(key) = external_key {
            tables.external_ids.insert(key);
        }
        tables.content_keys.insert(content);
        tables.transactions.insert(id, stored.clone());

        Ok(InsertOutcome::Inserted(stored))
    }

    async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Transaction>> {
        Ok(self.read()?.transactions.get(&transaction_id).cloned())
    }

    async fn get_account_transactions(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>> {
        let tables = self.read()?;
        let mut filtered: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|txn| {
                if txn.account_id != account_id {
                    return false;
                }

                // Check date range
                if let Some(start) = start_date {
                    if txn.transaction_date < start {
                        return false;
                    }
                }
                if let Some(end) = end_date {
                    if txn.transaction_date > end {
                        return false;
                    }
                }

                true
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn latest_transaction(
        &self,
        account_id: &str,
        until: Option<NaiveDate>,
        status: Option<TransactionStatus>,
    ) -> LedgerResult<Option<Transaction>> {
        let tables = self.read()?;
        let latest = tables
            .transactions
            .values()
            .filter(|txn| txn.account_id == account_id)
            .filter(|txn| until.is_none_or(|date| txn.transaction_date <= date))
            .filter(|txn| status.is_none_or(|s| txn.status == s))
            .max_by(|a, b| {
                a.transaction_date
                    .cmp(&b.transaction_date)
                    .then(a.id.cmp(&b.id))
            })
            .cloned();
        Ok(latest)
    }

    async fn transition_transaction(
        &mut self,
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
        at: NaiveDateTime,
    ) -> LedgerResult<Transaction> {
        let mut tables = self.write()?;
        let txn = tables.transaction_mut(transaction_id)?;
        if txn.status != from || !from.can_transition_to(to) {
            return Err(LedgerError::InvalidStatusTransition {
                id: transaction_id,
                from: txn.status,
                to,
            });
        }
        txn.status = to;
        txn.updated_at = at;
        Ok(txn.clone())
    }

    async fn replace_match(&mut self, new_match: NewMatch) -> LedgerResult<MatchReplacement> {
        let mut tables = self.write()?;
        let transaction_id = new_match.transaction_id;
        let matched_at = new_match.matched_at;

        let current = tables.transaction_mut(transaction_id)?.status;
        if !current.can_transition_to(TransactionStatus::Matched) {
            return Err(LedgerError::InvalidStatusTransition {
                id: transaction_id,
                from: current,
                to: TransactionStatus::Matched,
            });
        }

        let replaced = match tables.match_by_transaction.remove(&transaction_id) {
            Some(old_id) => tables.matches.remove(&old_id),
            None => None,
        };

        tables.next_match_id += 1;
        let id = tables.next_match_id;
        let created = new_match.into_match(id);
        tables.matches.insert(id, created.clone());
        tables.match_by_transaction.insert(transaction_id, id);

        let txn = tables.transaction_mut(transaction_id)?;
        txn.status = TransactionStatus::Matched;
        txn.updated_at = matched_at;
        let transaction = txn.clone();

        Ok(MatchReplacement {
            created,
            replaced,
            transaction,
        })
    }

    async fn remove_match(
        &mut self,
        match_id: MatchId,
        at: NaiveDateTime,
    ) -> LedgerResult<(Match, Transaction)> {
        let mut tables = self.write()?;

        let transaction_id = tables
            .matches
            .get(&match_id)
            .map(|m| m.transaction_id)
            .ok_or(LedgerError::MatchNotFound(match_id))?;

        let current = tables.transaction_mut(transaction_id)?.status;
        if !current.can_transition_to(TransactionStatus::Pending) {
            return Err(LedgerError::InvalidStatusTransition {
                id: transaction_id,
                from: current,
                to: TransactionStatus::Pending,
            });
        }

        let removed = tables
            .matches
            .remove(&match_id)
            .ok_or(LedgerError::MatchNotFound(match_id))?;
        tables.match_by_transaction.remove(&transaction_id);

        let txn = tables.transaction_mut(transaction_id)?;
        txn.status = TransactionStatus::Pending;
        txn.updated_at = at;
        Ok((removed, txn.clone()))
    }

    async fn get_match(&self, match_id: MatchId) -> LedgerResult<Option<Match>> {
        Ok(self.read()?.matches.get(&match_id).cloned())
    }

    async fn find_match_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Match>> {
        let tables = self.read()?;
        Ok(tables
            .match_by_transaction
            .get(&transaction_id)
            .and_then(|id| tables.matches.get(id))
            .cloned())
    }

    async fn linked_payables(&self, kind: PayableKind) -> LedgerResult<BTreeSet<PayableRef>> {
        Ok(self
            .read()?
            .matches
            .values()
            .filter(|m| m.payable.kind == kind)
            .map(|m| m.payable.clone())
            .collect())
    }

    async fn complete_reconciliation(
        &mut self,
        reconciliation: &Reconciliation,
    ) -> LedgerResult<Reconciliation> {
        if reconciliation.status != ReconciliationStatus::Completed {
            return Err(LedgerError::Precondition(format!(
                "reconciliation {} is {}, not completed",
                reconciliation.id, reconciliation.status
            )));
        }

        let mut tables = self.write()?;
        let stored_version = tables
            .reconciliations
            .get(&reconciliation.id)
            .map(|r| r.version)
            .ok_or(LedgerError::ReconciliationNotFound(reconciliation.id))?;
        if stored_version != reconciliation.version {
            return Err(LedgerError::Conflict(format!(
                "reconciliation {} is at version {}, update was based on {}",
                reconciliation.id, stored_version, reconciliation.version
            )));
        }
        if !tables.accounts.contains_key(&reconciliation.account_id) {
            return Err(LedgerError::AccountNotFound(
                reconciliation.account_id.clone(),
            ));
        }

        // every check passed; nothing below can fail half way
        let at = reconciliation.updated_at;
        let ids: Vec<TransactionId> = tables
            .transactions
            .values()
            .filter(|txn| {
                txn.account_id == reconciliation.account_id
                    && txn.status == TransactionStatus::Matched
                    && txn.is_within(
                        reconciliation.statement_start_date,
                        reconciliation.statement_end_date,
                    )
            })
            .map(|txn| txn.id)
            .collect();

        for id in &ids {
            if let Some(txn) = tables.transactions.get_mut(id) {
                txn.status = TransactionStatus::Reconciled;
                txn.updated_at = at;
            }
            if let Some(match_id) = tables.match_by_transaction.get(id).copied() {
                if let Some(m) = tables.matches.get_mut(&match_id) {
                    m.reconciliation_id = Some(reconciliation.id);
                }
            }
        }

        if let Some(account) = tables.accounts.get_mut(&reconciliation.account_id) {
            account.reconciled_balance = reconciliation.statement_balance.clone();
            account.last_reconciled_date = Some(reconciliation.reconciliation_date);
            account.updated_at = at;
        }

        let mut updated = reconciliation.clone();
        updated.version += 1;
        tables.reconciliations.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn save_reconciliation(
        &mut self,
        reconciliation: NewReconciliation,
    ) -> LedgerResult<Reconciliation> {
        let mut tables = self.write()?;
        tables.next_reconciliation_id += 1;
        let id = tables.next_reconciliation_id;
        let stored = reconciliation.into_reconciliation(id);
        tables.reconciliations.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_reconciliation(
        &self,
        reconciliation_id: ReconciliationId,
    ) -> LedgerResult<Option<Reconciliation>> {
        Ok(self.read()?.reconciliations.get(&reconciliation_id).cloned())
    }

    async fn list_reconciliations(&self, account_id: &str) -> LedgerResult<Vec<Reconciliation>> {
        let tables = self.read()?;
        let mut list: Vec<Reconciliation> = tables
            .reconciliations
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.statement_end_date
                .cmp(&a.statement_end_date)
                .then(b.id.cmp(&a.id))
        });
        Ok(list)
    }

    async fn update_reconciliation(
        &mut self,
        reconciliation: &Reconciliation,
    ) -> LedgerResult<Reconciliation> {
        let mut tables = self.write()?;
        let stored = tables
            .reconciliations
            .get_mut(&reconciliation.id)
            .ok_or(LedgerError::ReconciliationNotFound(reconciliation.id))?;

        if stored.version != reconciliation.version {
            return Err(LedgerError::Conflict(format!(
                "reconciliation {} is at version {}, update was based on {}",
                reconciliation.id, stored.version, reconciliation.version
            )));
        }

        let mut updated = reconciliation.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }
}
