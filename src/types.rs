//! Core types and data structures for the reconciliation system

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Storage-assigned identifier of an imported bank transaction
pub type TransactionId = u64;

/// Storage-assigned identifier of a match
pub type MatchId = u64;

/// Storage-assigned identifier of a reconciliation
pub type ReconciliationId = u64;

/// Smallest amount difference that still counts as balanced (one cent)
pub fn currency_epsilon() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

/// Who performs a mutation and when.
///
/// Every mutating operation takes its actor and timestamp explicitly so that
/// results are reproducible in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub actor_id: String,
    pub at: NaiveDateTime,
}

impl OperationContext {
    pub fn new(actor_id: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            actor_id: actor_id.into(),
            at,
        }
    }

    /// Context stamped with the current UTC time
    pub fn now(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, chrono::Utc::now().naive_utc())
    }
}

/// Bank account whose statements are imported and reconciled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Tenant owning the account
    pub tenant_id: String,
    /// Human-readable account name
    pub name: String,
    /// ISO currency code
    pub currency: String,
    /// Latest running balance reported by the bank
    pub current_balance: BigDecimal,
    /// Statement balance of the last completed reconciliation
    pub reconciled_balance: BigDecimal,
    /// Date of the last completed reconciliation
    pub last_reconciled_date: Option<NaiveDate>,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new account with zero balances
    pub fn new(
        id: String,
        tenant_id: String,
        name: String,
        currency: String,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            currency,
            current_balance: BigDecimal::from(0),
            reconciled_balance: BigDecimal::from(0),
            last_reconciled_date: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Kind of bank movement, derived from the sign of the amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Fee,
    Interest,
}

impl TransactionType {
    /// Positive amounts are deposits, everything else is a withdrawal
    pub fn from_amount(amount: &BigDecimal) -> Self {
        if *amount > BigDecimal::from(0) {
            TransactionType::Deposit
        } else {
            TransactionType::Withdrawal
        }
    }
}

/// Lifecycle state of an imported transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Imported, not yet linked to a payable entity
    Pending,
    /// Linked to exactly one payable entity
    Matched,
    /// Closed by a completed reconciliation
    Reconciled,
    /// Excluded from matching by an operator
    Ignored,
}

impl TransactionStatus {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Matched)
                | (Matched, Matched)
                | (Matched, Pending)
                | (Matched, Reconciled)
                | (Pending, Ignored)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Matched => "matched",
            TransactionStatus::Reconciled => "reconciled",
            TransactionStatus::Ignored => "ignored",
        };
        f.write_str(label)
    }
}

/// One row of a statement import batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub transaction_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub reference: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Signed amount, positive for money in
    pub amount: BigDecimal,
    /// Running balance reported by the bank after this line
    pub balance: Option<BigDecimal>,
    pub external_id: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ImportRow {
    /// Create a row with only the mandatory fields set
    pub fn new(transaction_date: NaiveDate, description: String, amount: BigDecimal) -> Self {
        Self {
            transaction_date,
            value_date: None,
            reference: None,
            description,
            amount,
            balance: None,
            external_id: None,
            category: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_balance(mut self, balance: BigDecimal) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_value_date(mut self, value_date: NaiveDate) -> Self {
        self.value_date = Some(value_date);
        self
    }
}

/// Transaction about to be inserted; the storage assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub account_id: String,
    pub tenant_id: String,
    pub import_batch_id: Uuid,
    pub transaction_date: NaiveDate,
    pub value_date: NaiveDate,
    pub reference: Option<String>,
    pub description: String,
    pub amount: BigDecimal,
    pub balance: Option<BigDecimal>,
    pub transaction_type: TransactionType,
    pub external_id: Option<String>,
    pub category: Option<String>,
    pub metadata: HashMap<String, String>,
    pub imported_by: String,
    pub created_at: NaiveDateTime,
}

impl NewTransaction {
    /// Build a pending transaction from an import row
    pub fn from_row(
        account: &Account,
        import_batch_id: Uuid,
        row: ImportRow,
        ctx: &OperationContext,
    ) -> Self {
        let transaction_type = TransactionType::from_amount(&row.amount);
        Self {
            account_id: account.id.clone(),
            tenant_id: account.tenant_id.clone(),
            import_batch_id,
            transaction_date: row.transaction_date,
            value_date: row.value_date.unwrap_or(row.transaction_date),
            reference: row.reference,
            description: row.description,
            amount: row.amount,
            balance: row.balance,
            transaction_type,
            external_id: row.external_id,
            category: row.category,
            metadata: row.metadata,
            imported_by: ctx.actor_id.clone(),
            created_at: ctx.at,
        }
    }

    /// Materialize the stored transaction under the assigned id
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            account_id: self.account_id,
            tenant_id: self.tenant_id,
            import_batch_id: self.import_batch_id,
            transaction_date: self.transaction_date,
            value_date: self.value_date,
            reference: self.reference,
            description: self.description,
            amount: self.amount,
            balance: self.balance,
            transaction_type: self.transaction_type,
            external_id: self.external_id,
            category: self.category,
            metadata: self.metadata,
            status: TransactionStatus::Pending,
            imported_by: self.imported_by,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Imported bank statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: String,
    pub tenant_id: String,
    /// Import batch that produced this line
    pub import_batch_id: Uuid,
    pub transaction_date: NaiveDate,
    pub value_date: NaiveDate,
    pub reference: Option<String>,
    pub description: String,
    /// Signed amount, positive for money in
    pub amount: BigDecimal,
    /// Running balance reported by the bank after this line
    pub balance: Option<BigDecimal>,
    pub transaction_type: TransactionType,
    pub external_id: Option<String>,
    pub category: Option<String>,
    pub metadata: HashMap<String, String>,
    pub status: TransactionStatus,
    pub imported_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// Absolute value of the amount
    pub fn absolute_amount(&self) -> BigDecimal {
        self.amount.abs()
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Whether the transaction date falls inside `[start, end]`
    pub fn is_within(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.transaction_date >= start && self.transaction_date <= end
    }
}

/// Kinds of external records a transaction can be linked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayableKind {
    /// Money owed to the tenant (customer payment)
    Receivable,
    /// Money owed by the tenant (expense)
    Payable,
}

impl PayableKind {
    /// Deposits settle receivables, withdrawals settle payables
    pub fn for_amount(amount: &BigDecimal) -> Option<Self> {
        let zero = BigDecimal::from(0);
        if *amount > zero {
            Some(PayableKind::Receivable)
        } else if *amount < zero {
            Some(PayableKind::Payable)
        } else {
            None
        }
    }
}

impl fmt::Display for PayableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayableKind::Receivable => f.write_str("receivable"),
            PayableKind::Payable => f.write_str("payable"),
        }
    }
}

/// Tagged reference to an external payable entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PayableRef {
    pub kind: PayableKind,
    pub id: String,
}

impl PayableRef {
    pub fn new(kind: PayableKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for PayableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Whether a match settles the whole payable or only part of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Full,
    Partial,
}

/// How a match was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Manual,
    AutoReference,
    AutoAmount,
    AutoDate,
    AutoCombined,
}

impl MatchMethod {
    pub fn is_automatic(self) -> bool {
        self != MatchMethod::Manual
    }
}

/// Qualitative band of a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    /// ≥90 is high, 70–89 medium, below 70 low
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => ConfidenceBand::High,
            70..=89 => ConfidenceBand::Medium,
            _ => ConfidenceBand::Low,
        }
    }
}

/// Evidence behind a scored candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    pub amount_match: bool,
    /// Absolute distance between the two dates in days
    pub date_difference_days: i64,
    pub date_factor: f64,
    pub reference_similarity: f64,
    /// Weighted total in `0.0..=1.0`
    pub score: f64,
}

/// Link about to be persisted; the storage assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub transaction_id: TransactionId,
    pub payable: PayableRef,
    pub match_type: MatchType,
    pub matched_amount: BigDecimal,
    pub confidence_score: u8,
    pub match_method: MatchMethod,
    pub match_details: Option<MatchDetails>,
    pub notes: Option<String>,
    pub matched_by: String,
    pub matched_at: NaiveDateTime,
}

impl NewMatch {
    pub fn into_match(self, id: MatchId) -> Match {
        Match {
            id,
            transaction_id: self.transaction_id,
            payable: self.payable,
            match_type: self.match_type,
            matched_amount: self.matched_amount,
            confidence_score: self.confidence_score,
            match_method: self.match_method,
            match_details: self.match_details,
            notes: self.notes,
            matched_by: self.matched_by,
            matched_at: self.matched_at,
            reconciliation_id: None,
        }
    }
}

/// Persisted link between a bank transaction and a payable entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub transaction_id: TransactionId,
    pub payable: PayableRef,
    pub match_type: MatchType,
    pub matched_amount: BigDecimal,
    /// 0–100
    pub confidence_score: u8,
    pub match_method: MatchMethod,
    pub match_details: Option<MatchDetails>,
    pub notes: Option<String>,
    pub matched_by: String,
    pub matched_at: NaiveDateTime,
    /// Set when the reconciliation covering the transaction completes
    pub reconciliation_id: Option<ReconciliationId>,
}

impl Match {
    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::from_score(self.confidence_score)
    }
}

/// Result of atomically replacing the match of a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReplacement {
    pub created: Match,
    /// Match that was live before and got deleted
    pub replaced: Option<Match>,
    pub transaction: Transaction,
}

/// Outcome of a conditional transaction insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Transaction),
    /// A dedup key already exists for the account; nothing was written
    Duplicate,
}

/// Per-row failure inside an import batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRowError {
    /// Zero-based position of the row in the batch
    pub row: usize,
    pub message: String,
}

/// Counts returned by a statement import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub batch_id: Uuid,
    pub imported: usize,
    pub duplicates: usize,
    pub errors: Vec<ImportRowError>,
    pub total: usize,
}

impl ImportSummary {
    pub fn new(batch_id: Uuid, total: usize) -> Self {
        Self {
            batch_id,
            imported: 0,
            duplicates: 0,
            errors: Vec::new(),
            total,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Errors that can occur in the reconciliation system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),
    #[error("Reconciliation not found: {0}")]
    ReconciliationNotFound(ReconciliationId),
    #[error("Invalid status transition for transaction {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for reconciliation operations
pub type LedgerResult<T> = Result<T, LedgerError>;
