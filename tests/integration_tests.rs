//! Integration tests for bank-reconciliation

use bank_reconciliation::{
    utils::{MemoryPayableDirectory, MemoryStorage, PayableDocument},
    AdjustmentType, CandidateMatcher, ConfidenceBand, EngineConfig, ImportOptions, ImportRow,
    Ledger, LedgerError, LedgerStorage, MatchMethod, MatchOptions, MatchRegistry, MatchType,
    OperationContext, PayableKind, ReconciliationEngine, ReconciliationStatus, TransactionStatus,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ctx(actor: &str) -> OperationContext {
    OperationContext::new(actor, date(2024, 3, 1).and_hms_opt(10, 0, 0).unwrap())
}

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

async fn ledger_with_account(storage: &MemoryStorage) -> Ledger<MemoryStorage> {
    let mut ledger = Ledger::new(storage.clone());
    ledger
        .create_account(
            "main-eur".to_string(),
            "acme".to_string(),
            "Main EUR account".to_string(),
            "EUR".to_string(),
            &ctx("admin"),
        )
        .await
        .unwrap();
    ledger
}

#[tokio::test]
async fn test_import_is_idempotent() {
    let storage = MemoryStorage::new();
    let mut ledger = ledger_with_account(&storage).await;

    let rows = vec![
        ImportRow::new(date(2024, 1, 5), String::new(), dec("1000")).with_external_id("A"),
        ImportRow::new(date(2024, 1, 10), String::new(), dec("-500")),
        ImportRow::new(date(2024, 1, 5), String::new(), dec("1000")).with_external_id("A"),
    ];

    let first = ledger
        .import_transactions("acme", "main-eur", rows.clone(), ImportOptions::default(), &ctx("importer"))
        .await
        .unwrap();
    assert_eq!((first.imported, first.duplicates, first.total), (2, 1, 3));

    let second = ledger
        .import_transactions("acme", "main-eur", rows, ImportOptions::default(), &ctx("importer"))
        .await
        .unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.duplicates, second.total);
    assert_ne!(first.batch_id, second.batch_id);

    let stored = ledger
        .get_account_transactions("main-eur", None, None)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|t| t.import_batch_id == first.batch_id));
}

#[tokio::test]
async fn test_near_reference_candidate_is_proposed() {
    let storage = MemoryStorage::new();
    let mut ledger = ledger_with_account(&storage).await;
    ledger
        .import_transactions(
            "acme",
            "main-eur",
            vec![ImportRow::new(date(2024, 2, 1), "Customer payment".to_string(), dec("15000"))
                .with_reference("FAC1001")],
            ImportOptions::default(),
            &ctx("importer"),
        )
        .await
        .unwrap();
    let txn = ledger.pending_transactions("main-eur").await.unwrap().remove(0);

    let directory = MemoryPayableDirectory::new();
    let invoice = directory
        .insert(PayableDocument::new(
            PayableKind::Receivable,
            "FAC-1001",
            "acme",
            dec("15000"),
            date(2024, 2, 2),
            Some("FAC-1001".to_string()),
        ))
        .unwrap();
    let matcher = CandidateMatcher::new(storage.clone(), directory);

    let candidates = matcher.find_potential_matches(&txn).await.unwrap();
    assert_eq!(candidates.len(), 1);
    let best = &candidates[0];
    assert!(best.score >= 0.7);
    assert!((best.score - 0.83).abs() < 0.01);
    assert!((best.details.date_factor - 0.5).abs() < 1e-9);
    assert_eq!(best.confidence_band(), ConfidenceBand::Medium);

    let mut registry = MatchRegistry::new(storage.clone());
    let created = registry.accept_candidate(&txn, best, &ctx("clerk")).await.unwrap();
    assert_eq!(created.match_method, MatchMethod::AutoCombined);
    assert_eq!(created.confidence_score, 83);
    assert!(invoice.is_paid());

    // a linked payable is not proposed again
    assert!(matcher.find_potential_matches(&txn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rematch_replaces_previous_match() {
    let storage = MemoryStorage::new();
    let mut ledger = ledger_with_account(&storage).await;
    ledger
        .import_transactions(
            "acme",
            "main-eur",
            vec![ImportRow::new(date(2024, 2, 8), "Supplier".to_string(), dec("-420"))],
            ImportOptions::default(),
            &ctx("importer"),
        )
        .await
        .unwrap();
    let txn = ledger.pending_transactions("main-eur").await.unwrap().remove(0);

    let first = PayableDocument::new(PayableKind::Payable, "bill-1", "acme", dec("420"), date(2024, 2, 8), None);
    let second = PayableDocument::new(PayableKind::Payable, "bill-2", "acme", dec("420"), date(2024, 2, 8), None);

    let mut registry = MatchRegistry::new(storage.clone());
    let old = registry
        .create_match(&txn, &first, MatchType::Full, MatchOptions::default(), &ctx("clerk"))
        .await
        .unwrap();
    let new = registry
        .create_match(&txn, &second, MatchType::Full, MatchOptions::default(), &ctx("clerk"))
        .await
        .unwrap();

    assert_eq!(storage.match_count().unwrap(), 1);
    assert!(registry.get_match(old.id).await.unwrap().is_none());
    let live = registry.match_for_transaction(txn.id).await.unwrap().unwrap();
    assert_eq!(live.id, new.id);
    assert_eq!(live.payable.id, "bill-2");

    let stored = storage.get_transaction(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Matched);
}

#[tokio::test]
async fn test_statement_periods_close_and_chain() {
    let storage = MemoryStorage::new();
    let mut ledger = ledger_with_account(&storage).await;
    let directory = MemoryPayableDirectory::new();
    let matcher = CandidateMatcher::new(storage.clone(), directory.clone());
    let mut registry = MatchRegistry::new(storage.clone());
    let mut engine = ReconciliationEngine::new(storage.clone());
    let accountant = ctx("accountant");

    // January nets to zero and anchors February
    ledger
        .import_transactions(
            "acme",
            "main-eur",
            vec![
                ImportRow::new(date(2024, 1, 5), "Refund".to_string(), dec("50"))
                    .with_reference("CN-1")
                    .with_balance(dec("50")),
                ImportRow::new(date(2024, 1, 10), "Fee".to_string(), dec("-50"))
                    .with_reference("BILL-1")
                    .with_balance(dec("0")),
            ],
            ImportOptions::default(),
            &ctx("importer"),
        )
        .await
        .unwrap();
    directory
        .insert(PayableDocument::new(PayableKind::Receivable, "cn-1", "acme", dec("50"), date(2024, 1, 5), Some("CN-1".to_string())))
        .unwrap();
    directory
        .insert(PayableDocument::new(PayableKind::Payable, "bill-1", "acme", dec("50"), date(2024, 1, 10), Some("BILL-1".to_string())))
        .unwrap();

    let january = registry.auto_match(&matcher, "main-eur", &accountant).await.unwrap();
    assert_eq!(january.matched.len(), 2);

    let jan = engine
        .create("main-eur", date(2024, 1, 31), date(2024, 1, 1), date(2024, 1, 31), dec("0"), None, &accountant)
        .await
        .unwrap();
    assert_eq!(jan.system_balance, dec("0"));
    engine.mark_as_completed(jan.id, &accountant).await.unwrap();

    // February: two deposits summing to the statement balance
    ledger
        .import_transactions(
            "acme",
            "main-eur",
            vec![
                ImportRow::new(date(2024, 2, 3), "Customer A".to_string(), dec("100.00"))
                    .with_reference("INV-100")
                    .with_balance(dec("100.00")),
                ImportRow::new(date(2024, 2, 12), "Customer B".to_string(), dec("200.00"))
                    .with_reference("INV-200")
                    .with_balance(dec("300.00")),
            ],
            ImportOptions::default(),
            &ctx("importer"),
        )
        .await
        .unwrap();

    let feb = engine
        .create("main-eur", date(2024, 2, 29), date(2024, 2, 1), date(2024, 2, 29), dec("300.00"), None, &accountant)
        .await
        .unwrap();
    assert_eq!(feb.unmatched_count, 2);
    assert!(!feb.can_be_completed());
    assert!(matches!(
        engine.mark_as_completed(feb.id, &accountant).await,
        Err(LedgerError::Precondition(_))
    ));
    assert_eq!(engine.outstanding_transactions(feb.id).await.unwrap().len(), 2);

    directory
        .insert(PayableDocument::new(PayableKind::Receivable, "inv-100", "acme", dec("100"), date(2024, 2, 3), Some("INV-100".to_string())))
        .unwrap();
    directory
        .insert(PayableDocument::new(PayableKind::Receivable, "inv-200", "acme", dec("200"), date(2024, 2, 12), Some("INV-200".to_string())))
        .unwrap();
    let february = registry.auto_match(&matcher, "main-eur", &accountant).await.unwrap();
    assert_eq!(february.examined, 2);
    assert_eq!(february.matched.len(), 2);

    let feb = engine.calculate(feb.id, &accountant).await.unwrap();
    assert_eq!(feb.system_balance, dec("300"));
    assert_eq!(feb.difference, dec("0"));
    assert_eq!(feb.unmatched_count, 0);
    assert!(feb.can_be_completed());

    let feb = engine.mark_as_completed(feb.id, &accountant).await.unwrap();
    assert_eq!(feb.status, ReconciliationStatus::Completed);
    let feb = engine.mark_as_approved(feb.id, "controller", &ctx("controller")).await.unwrap();
    assert_eq!(feb.status, ReconciliationStatus::Approved);

    let account = ledger.get_account_required("main-eur").await.unwrap();
    assert_eq!(account.current_balance, dec("300"));
    assert_eq!(account.reconciled_balance, dec("300"));
    assert_eq!(account.last_reconciled_date, Some(date(2024, 2, 29)));
    assert_eq!(
        ledger.calculate_system_balance("main-eur", date(2024, 2, 29)).await.unwrap(),
        dec("300")
    );

    let history = engine.list_for_account("main-eur").await.unwrap();
    let ids: Vec<u64> = history.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![feb.id, jan.id]);

    let late = engine
        .add_adjustment(feb.id, "late fee".to_string(), dec("-1"), AdjustmentType::BankFee, &accountant)
        .await;
    assert!(matches!(late, Err(LedgerError::Precondition(_))));
}

#[tokio::test]
async fn test_invalid_statement_window_is_rejected() {
    let storage = MemoryStorage::new();
    ledger_with_account(&storage).await;
    let mut engine = ReconciliationEngine::new(storage);

    let result = engine
        .create("main-eur", date(2024, 1, 31), date(2024, 2, 1), date(2024, 1, 1), dec("0"), None, &ctx("accountant"))
        .await;
    assert!(matches!(result, Err(LedgerError::Validation(_))));
}

#[tokio::test]
async fn test_configuration_drives_components() {
    let config = EngineConfig::from_lookup(|key| match key {
        "BANKREC_MATCH_THRESHOLD" => Some("0.95".to_string()),
        "BANKREC_IMPORT_CHUNK_SIZE" => Some("1".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.import.chunk_size, 1);

    let storage = MemoryStorage::new();
    let mut ledger = Ledger::with_config(storage.clone(), config.import.clone());
    ledger
        .create_account("main-eur".to_string(), "acme".to_string(), "Main".to_string(), "EUR".to_string(), &ctx("admin"))
        .await
        .unwrap();
    ledger
        .import_transactions(
            "acme",
            "main-eur",
            vec![ImportRow::new(date(2024, 2, 1), "Payment".to_string(), dec("15000")).with_reference("FAC1001")],
            ImportOptions::default(),
            &ctx("importer"),
        )
        .await
        .unwrap();
    let txn = ledger.pending_transactions("main-eur").await.unwrap().remove(0);

    let directory = MemoryPayableDirectory::new();
    directory
        .insert(PayableDocument::new(PayableKind::Receivable, "FAC-1001", "acme", dec("15000"), date(2024, 2, 2), Some("FAC-1001".to_string())))
        .unwrap();
    let matcher = CandidateMatcher::with_config(storage, directory, config.matching.clone());

    assert!(matcher.find_potential_matches(&txn).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_imports_and_matches_share_storage() {
    let storage = MemoryStorage::new();
    ledger_with_account(&storage).await;

    let rows: Vec<ImportRow> = (1..=20)
        .map(|day| {
            ImportRow::new(date(2024, 1, day), format!("Line {}", day), dec("12.50"))
                .with_external_id(format!("EXT-{}", day))
        })
        .collect();

    let imports: Vec<_> = (0..2)
        .map(|_| {
            let mut ledger = Ledger::new(storage.clone());
            let rows = rows.clone();
            tokio::spawn(async move {
                let importer = ctx("importer");
                let summary = ledger
                    .import_transactions("acme", "main-eur", rows, ImportOptions::default(), &importer)
                    .await;
                summary
            })
        })
        .collect();

    let mut imported = 0;
    let mut duplicates = 0;
    for handle in imports {
        let summary = handle.await.unwrap().unwrap();
        assert!(!summary.has_errors());
        imported += summary.imported;
        duplicates += summary.duplicates;
    }
    assert_eq!(imported, rows.len());
    assert_eq!(duplicates, rows.len());

    let stored = storage
        .get_account_transactions("main-eur", None, None)
        .await
        .unwrap();
    assert_eq!(stored.len(), rows.len());

    let txn = stored[0].clone();
    let matches: Vec<_> = ["INV-A", "INV-B"]
        .into_iter()
        .map(|id| {
            let mut registry = MatchRegistry::new(storage.clone());
            let txn = txn.clone();
            tokio::spawn(async move {
                let invoice = PayableDocument::new(
                    PayableKind::Receivable,
                    id,
                    "acme",
                    dec("12.50"),
                    txn.transaction_date,
                    None,
                );
                let clerk = ctx("clerk");
                let created = registry
                    .create_match(&txn, &invoice, MatchType::Full, MatchOptions::default(), &clerk)
                    .await;
                created
            })
        })
        .collect();

    for handle in matches {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(storage.match_count().unwrap(), 1);
    let live = storage.find_match_by_transaction(txn.id).await.unwrap().unwrap();
    assert!(live.payable.id == "INV-A" || live.payable.id == "INV-B");
    let stored = storage.get_transaction(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Matched);
}
