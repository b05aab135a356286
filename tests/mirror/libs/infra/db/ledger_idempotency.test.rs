// [tests/mirror/libs/infra/db/ledger_idempotency.test.rs]
/**
 * =================================================================
 * APARATO: LEDGER IDEMPOTENCY TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: CERTIFICACIÓN DE IDEMPOTENCIA Y CONSERVACIÓN
 * =================================================================
 */

use hive_core_credits::CreditAmount;
use hive_domain_models::ledger::{CreditKind, DebitKind};
use hive_infra_db::repositories::ledger::HistoryQuery;
use hive_infra_db::repositories::LedgerRepository;
use hive_infra_db::{DbError, LedgerDbClient};

async fn forge_ledger(database_name: &str) -> LedgerRepository {
    let client = LedgerDbClient::connect(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        None,
    )
    .await
    .unwrap();
    LedgerRepository::new(client)
}

#[tokio::test]
async fn certify_duplicate_reference_collapses_to_single_transaction() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing reference idempotency strata...");
    let ledger = forge_ledger("ledger_idem_ref").await;

    // 1. PRIMER ABONO CON REFERENCIA A: debe sellar.
    ledger
        .credit(
            "tenant-alpha",
            CreditAmount::from_cents(1000).unwrap(),
            CreditKind::Purchase,
            None,
            Some("ref-A"),
            None,
            None,
        )
        .await
        .expect("first credit must seal");

    // 2. SEGUNDO ABONO CON LA MISMA REFERENCIA: colisión dedicada.
    let replay_outcome = ledger
        .credit(
            "tenant-alpha",
            CreditAmount::from_cents(1000).unwrap(),
            CreditKind::Purchase,
            None,
            Some("ref-A"),
            None,
            None,
        )
        .await;
    assert!(
        matches!(replay_outcome, Err(DbError::DuplicateReference)),
        "L3_IDEMPOTENCY_FAULT: Replay was not classified as duplicate reference."
    );

    // 3. EL BALANCE Y EL REGISTRO QUEDAN INTACTOS.
    let balance = ledger.balance("tenant-alpha").await.unwrap();
    assert_eq!(balance.amount.to_cents(), 1000, "BALANCE_DRIFT_ON_REPLAY");

    let history = ledger
        .history("tenant-alpha", HistoryQuery { limit: 50, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(history.len(), 1, "DUPLICATE_ROW_SEALED");
    assert_eq!(history[0].reference_id.as_deref(), Some("ref-A"));

    println!("   ✅ [SUCCESS]: Reference idempotency certified bit-perfect.");
}

#[tokio::test]
async fn certify_insufficient_balance_rejects_without_write() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing insufficient-balance guard...");
    let ledger = forge_ledger("ledger_idem_guard").await;

    ledger
        .credit("tenant-alpha", CreditAmount::from_cents(100).unwrap(), CreditKind::SignupGrant, None, None, None, None)
        .await
        .unwrap();

    // Cargo por encima del balance sin permiso de negativo: rechazo limpio.
    let debit_outcome = ledger
        .debit(
            "tenant-alpha",
            CreditAmount::from_cents(500).unwrap(),
            DebitKind::BotRuntime,
            None,
            None,
            false,
            None,
        )
        .await;
    assert!(
        matches!(debit_outcome, Err(DbError::InsufficientBalance)),
        "L3_GUARD_FAULT: Overdraft was not rejected."
    );

    // Sin escritura alguna: balance e historial intactos.
    assert_eq!(ledger.balance("tenant-alpha").await.unwrap().amount.to_cents(), 100);
    let history = ledger
        .history("tenant-alpha", HistoryQuery { limit: 50, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(history.len(), 1, "REJECTED_DEBIT_LEFT_A_ROW");

    println!("   ✅ [SUCCESS]: No-write rejection certified.");
}

#[tokio::test]
async fn certify_balance_equals_transaction_sum() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing balance conservation invariant...");
    let ledger = forge_ledger("ledger_idem_sum").await;

    // Secuencia mixta de abonos y cargos.
    ledger
        .credit("tenant-alpha", CreditAmount::from_cents(1000).unwrap(), CreditKind::Purchase, None, None, None, None)
        .await
        .unwrap();
    ledger
        .debit("tenant-alpha", CreditAmount::from_cents(250).unwrap(), DebitKind::AdapterUsage, None, None, false, Some("user-1"))
        .await
        .unwrap();
    ledger
        .credit("tenant-alpha", CreditAmount::from_cents(40).unwrap(), CreditKind::Referral, None, None, None, None)
        .await
        .unwrap();
    ledger
        .debit("tenant-alpha", CreditAmount::from_cents(90).unwrap(), DebitKind::BotRuntime, None, None, false, Some("user-2"))
        .await
        .unwrap();

    let history = ledger
        .history("tenant-alpha", HistoryQuery { limit: 250, ..Default::default() })
        .await
        .unwrap();

    // INVARIANTE: balance == suma de montos con signo del registro.
    let signed_sum: i64 = history.iter().map(|row| row.amount.to_cents()).sum();
    let balance = ledger.balance("tenant-alpha").await.unwrap().amount.to_cents();
    assert_eq!(balance, signed_sum, "CONSERVATION_VIOLATION: balance != Σ(amounts)");
    assert_eq!(balance, 700);

    // balance_after de la fila más reciente == balance vivo.
    assert_eq!(history[0].balance_after.to_cents(), balance, "BALANCE_AFTER_DRIFT");

    println!("   ✅ [SUCCESS]: Conservation invariant certified ({}c).", balance);
}

#[tokio::test]
async fn certify_allow_negative_creates_negative_balance_row() {
    let ledger = forge_ledger("ledger_idem_negative").await;

    // Cargo sobre fila ausente con negativo permitido: fila negativa nace.
    ledger
        .debit("tenant-ghost", CreditAmount::from_cents(30).unwrap(), DebitKind::AdapterUsage, None, None, true, None)
        .await
        .expect("allow_negative debit must seal");

    assert_eq!(ledger.balance("tenant-ghost").await.unwrap().amount.to_cents(), -30);
}

#[tokio::test]
async fn certify_non_positive_amounts_rejected() {
    let ledger = forge_ledger("ledger_idem_nonpositive").await;

    let zero_credit = ledger
        .credit("tenant-alpha", CreditAmount::ZERO, CreditKind::Promo, None, None, None, None)
        .await;
    assert!(matches!(zero_credit, Err(DbError::NonPositiveAmount)));

    let negative_debit = ledger
        .debit(
            "tenant-alpha",
            CreditAmount::from_cents(-5).unwrap(),
            DebitKind::Addon,
            None,
            None,
            true,
            None,
        )
        .await;
    assert!(matches!(negative_debit, Err(DbError::NonPositiveAmount)));
}
