// [tests/mirror/libs/infra/db/ledger_multi_tenant.test.rs]
/**
 * =================================================================
 * APARATO: LEDGER MULTI-TENANT TEST (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AISLAMIENTO DE HISTORIAL, PAGINACIÓN Y AGREGADOS
 * =================================================================
 */

use hive_core_credits::CreditAmount;
use hive_domain_models::ledger::{CreditKind, DebitKind};
use hive_infra_db::repositories::ledger::HistoryQuery;
use hive_infra_db::repositories::LedgerRepository;
use hive_infra_db::LedgerDbClient;

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
async fn certify_history_isolation_between_tenants() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing ledger multi-tenancy strata...");
    let ledger = forge_ledger("ledger_mt_iso").await;

    ledger
        .credit("tenant-alpha", CreditAmount::from_cents(100).unwrap(), CreditKind::Purchase, Some("alpha purchase"), None, None, None)
        .await
        .unwrap();
    ledger
        .credit("tenant-beta", CreditAmount::from_cents(500).unwrap(), CreditKind::Purchase, Some("beta purchase"), None, None, None)
        .await
        .unwrap();

    let alpha_history = ledger
        .history("tenant-alpha", HistoryQuery { limit: 10, ..Default::default() })
        .await
        .unwrap();

    assert_eq!(alpha_history.len(), 1, "L3_SECURITY_FAULT: History leaked across tenants.");
    assert_eq!(alpha_history[0].description.as_deref(), Some("alpha purchase"));

    println!("   ✅ [SUCCESS]: History isolation certified bit-perfect.");
}

#[tokio::test]
async fn certify_history_pagination_and_kind_filter() {
    let ledger = forge_ledger("ledger_mt_page").await;

    for iteration in 0..5 {
        ledger
            .credit(
                "tenant-alpha",
                CreditAmount::from_cents(10 + iteration).unwrap(),
                CreditKind::Promo,
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap();
    }
    ledger
        .debit("tenant-alpha", CreditAmount::from_cents(7).unwrap(), DebitKind::Addon, None, None, false, None)
        .await
        .unwrap();

    // Límite fuera de rango se fija a [1, 250]; cero colapsa a 1.
    let single_page = ledger
        .history("tenant-alpha", HistoryQuery { limit: 0, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(single_page.len(), 1, "LIMIT_CLAMP_FAULT");

    // Más reciente primero: el cargo es la cabeza del historial.
    assert_eq!(single_page[0].kind, "addon");

    // Offset desplaza la ventana.
    let offset_page = ledger
        .history("tenant-alpha", HistoryQuery { limit: 10, offset: 4, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(offset_page.len(), 2, "OFFSET_WINDOW_FAULT");

    // Filtro por discriminante de tipo.
    let promo_page = ledger
        .history(
            "tenant-alpha",
            HistoryQuery { limit: 250, kind_filter: Some("promo".into()), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(promo_page.len(), 5, "KIND_FILTER_FAULT");
}

#[tokio::test]
async fn certify_member_usage_aggregates_negative_rows() {
    println!("\n💳 [PROVING_GROUNDS]: Auditing member usage aggregation...");
    let ledger = forge_ledger("ledger_mt_members").await;

    ledger
        .credit("tenant-alpha", CreditAmount::from_cents(1000).unwrap(), CreditKind::Purchase, None, None, None, None)
        .await
        .unwrap();

    // user-1 consume dos veces, user-2 una; un cargo sin atribución.
    for (user, cents) in [(Some("user-1"), 100), (Some("user-1"), 50), (Some("user-2"), 25), (None, 10)] {
        ledger
            .debit("tenant-alpha", CreditAmount::from_cents(cents).unwrap(), DebitKind::AdapterUsage, None, None, false, user)
            .await
            .unwrap();
    }

    let member_usage = ledger.member_usage("tenant-alpha").await.unwrap();
    assert_eq!(member_usage.len(), 2, "UNATTRIBUTED_ROWS_LEAKED");

    let user_one = member_usage
        .iter()
        .find(|aggregate| aggregate.attributed_user_id == "user-1")
        .expect("user-1 aggregate present");
    assert_eq!(user_one.total_debit.to_cents(), 150, "DEBIT_MAGNITUDE_FAULT");
    assert_eq!(user_one.transaction_count, 2);

    println!("   ✅ [SUCCESS]: Member usage aggregation certified.");
}

#[tokio::test]
async fn certify_tenants_with_balance_excludes_non_positive() {
    let ledger = forge_ledger("ledger_mt_positive").await;

    ledger
        .credit("tenant-rich", CreditAmount::from_cents(500).unwrap(), CreditKind::Purchase, None, None, None, None)
        .await
        .unwrap();
    ledger
        .credit("tenant-broke", CreditAmount::from_cents(100).unwrap(), CreditKind::Purchase, None, None, None, None)
        .await
        .unwrap();
    ledger
        .debit("tenant-broke", CreditAmount::from_cents(100).unwrap(), DebitKind::BotRuntime, None, None, false, None)
        .await
        .unwrap();
    ledger
        .debit("tenant-debtor", CreditAmount::from_cents(20).unwrap(), DebitKind::AdapterUsage, None, None, true, None)
        .await
        .unwrap();

    let funded_tenants = ledger.tenants_with_balance().await.unwrap();
    assert_eq!(funded_tenants.len(), 1, "NON_POSITIVE_BALANCE_LEAKED");
    assert_eq!(funded_tenants[0].tenant_id, "tenant-rich");
}
