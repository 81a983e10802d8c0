//! In-memory payable directory for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// Receivable or payable document that tracks its paid flag
#[derive(Debug)]
pub struct PayableDocument {
    pub payable: PayableRef,
    pub tenant_id: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub reference: Option<String>,
    paid: AtomicBool,
}

impl PayableDocument {
    pub fn new(
        kind: PayableKind,
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        amount: BigDecimal,
        date: NaiveDate,
        reference: Option<String>,
    ) -> Self {
        Self {
            payable: PayableRef::new(kind, id),
            tenant_id: tenant_id.into(),
            amount,
            date,
            reference,
            paid: AtomicBool::new(false),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentNotifier for PayableDocument {
    async fn mark_paid(&self, _ctx: &OperationContext) -> LedgerResult<()> {
        self.paid.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_unpaid(&self, _ctx: &OperationContext) -> LedgerResult<()> {
        self.paid.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl PayableEntity for PayableDocument {
    fn payable_ref(&self) -> PayableRef {
        self.payable.clone()
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn amount(&self) -> BigDecimal {
        self.amount.clone()
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    fn payment_notifier(&self) -> Option<&dyn PaymentNotifier> {
        Some(self)
    }
}

/// In-memory directory of payable entities
#[derive(Clone, Default)]
pub struct MemoryPayableDirectory {
    entities: Arc<RwLock<Vec<Arc<dyn PayableEntity>>>>,
}

impl MemoryPayableDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity and hand back a shared handle to it
    pub fn insert<E>(&self, entity: E) -> LedgerResult<Arc<E>>
    where
        E: PayableEntity + 'static,
    {
        let entity = Arc::new(entity);
        self.entities
            .write()
            .map_err(|_| LedgerError::Storage("payable directory lock poisoned".to_string()))?
            .push(entity.clone());
        Ok(entity)
    }
}

#[async_trait]
impl PayableDirectory for MemoryPayableDirectory {
    async fn find_candidates(
        &self,
        query: &CandidateQuery,
    ) -> LedgerResult<Vec<Arc<dyn PayableEntity>>> {
        let entities = self
            .entities
            .read()
            .map_err(|_| LedgerError::Storage("payable directory lock poisoned".to_string()))?;
        Ok(entities
            .iter()
            .filter(|e| {
                e.tenant_id() == query.tenant_id
                    && e.payable_ref().kind == query.kind
                    && e.amount() == query.amount
                    && e.date() >= query.date_from
                    && e.date() <= query.date_to
                    && !query.exclude.contains(&e.payable_ref())
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn get(&self, payable: &PayableRef) -> LedgerResult<Option<Arc<dyn PayableEntity>>> {
        let entities = self
            .entities
            .read()
            .map_err(|_| LedgerError::Storage("payable directory lock poisoned".to_string()))?;
        Ok(entities
            .iter()
            .find(|e| &e.payable_ref() == payable)
            .cloned())
    }
}
