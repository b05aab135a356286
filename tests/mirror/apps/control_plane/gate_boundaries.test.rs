// [tests/mirror/apps/control_plane/gate_boundaries.test.rs]
/**
 * =================================================================
 * APARATO: CREDIT GATE BOUNDARY TEST (V1.4)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: PARTICIÓN EXACTA DE VEREDICTOS Y CRUCE ONE-SHOT
 * =================================================================
 */

use hive_control_plane::gate::{CreditGate, GateVerdict};
use hive_control_plane::prelude::*;
use hive_core_credits::CreditAmount;
use hive_domain_models::ledger::{CreditKind, DebitKind};
use hive_domain_models::PlatformEvent;
use hive_infra_db::LedgerDbClient;
use std::sync::Arc;

async fn forge_state(database_name: &str, workspace: &tempfile::TempDir) -> AppState {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();
    AppState::new(client, Arc::new(config), CollaboratorPorts::disconnected()).unwrap()
}

/// Fija el balance del tenant mediante operaciones reales del Ledger.
async fn seed_balance(state: &AppState, tenant: &str, target_cents: i64) {
    if target_cents > 0 {
        state
            .ledger_repository
            .credit(tenant, CreditAmount::from_cents(target_cents).unwrap(), CreditKind::Purchase, None, None, None, None)
            .await
            .unwrap();
    } else if target_cents < 0 {
        state
            .ledger_repository
            .debit(tenant, CreditAmount::from_cents(-target_cents).unwrap(), DebitKind::AdapterUsage, None, None, true, None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn certify_verdict_partition_boundaries() {
    println!("\n🚦 [PROVING_GROUNDS]: Auditing gate verdict partition (grace = 50c)...");
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("gate_partition", &workspace).await;
    let credit_gate = CreditGate::new(state.clone());

    // (balance, costo estimado, veredicto esperado)
    let boundary_matrix: &[(&str, i64, i64, GateVerdict)] = &[
        // ESCENARIO 2: balance 5, costo 0 => permit.
        ("t-scenario2", 5, 0, GateVerdict::Permit),
        // Balance cubre el costo exacto.
        ("t-exact", 100, 100, GateVerdict::Permit),
        // 0 <= b < c => insufficient (prompt de top-up, sin bloqueo duro).
        ("t-short", 10, 20, GateVerdict::InsufficientCredits),
        ("t-zero", 0, 1, GateVerdict::InsufficientCredits),
        // -g < b < 0 => la gracia absorbe la carrera débito/recarga.
        ("t-grace-edge", -1, 10, GateVerdict::PermitWithGrace),
        ("t-grace-deep", -49, 10, GateVerdict::PermitWithGrace),
        // ESCENARIO 3: b = -g rechaza (la frontera exige estrictamente mayor).
        ("t-scenario3", -50, 0, GateVerdict::CreditsExhausted),
        ("t-beyond", -80, 0, GateVerdict::CreditsExhausted),
    ];

    for (tenant, balance_cents, estimated_cents, expected_verdict) in boundary_matrix {
        seed_balance(&state, tenant, *balance_cents).await;
        let verdict = credit_gate
            .pre_check(tenant, CreditAmount::from_cents(*estimated_cents).unwrap())
            .await
            .unwrap();
        assert_eq!(
            verdict, *expected_verdict,
            "PARTITION_FAULT: balance={balance_cents} estimated={estimated_cents}"
        );
    }

    println!("   ✅ [SUCCESS]: Verdict partition certified bit-perfect.");
}

#[tokio::test]
async fn certify_rejection_codes() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("gate_codes", &workspace).await;
    let credit_gate = CreditGate::new(state.clone());

    seed_balance(&state, "t-short", 5).await;
    let short_verdict =
        credit_gate.pre_check("t-short", CreditAmount::from_cents(10).unwrap()).await.unwrap();
    assert_eq!(short_verdict.rejection_code(), Some("insufficient_credits"));

    seed_balance(&state, "t-drained", -60).await;
    let drained_verdict =
        credit_gate.pre_check("t-drained", CreditAmount::ZERO).await.unwrap();
    assert_eq!(drained_verdict.rejection_code(), Some("credits_exhausted"));

    assert!(GateVerdict::Permit.rejection_code().is_none());
    assert!(GateVerdict::PermitWithGrace.is_permitted());
}

#[tokio::test]
async fn certify_post_debit_without_exhaustion_crossing() {
    println!("\n🚦 [PROVING_GROUNDS]: Auditing post-debit (scenario: 500c, $0.10)...");
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("gate_postdebit_safe", &workspace).await;
    let credit_gate = CreditGate::new(state.clone());

    seed_balance(&state, "tenant-alpha", 500).await;
    let mut bus_receiver = state.event_bus.subscribe();

    // ESCENARIO 4: margen identidad, costo $0.10 => cargo 10c.
    let outcome = credit_gate
        .post_debit(
            "tenant-alpha",
            CreditAmount::from_dollars("0.10").unwrap(),
            "chat",
            "provider-x",
            "model-x",
            None,
            Some(120),
        )
        .await
        .unwrap();

    assert_eq!(outcome.charge_cents, 10);
    assert_eq!(outcome.new_balance.to_cents(), 490, "MARGIN_IDENTITY_FAULT");
    assert!(!outcome.exhaustion_crossed, "PHANTOM_EXHAUSTION_SIGNAL");

    // Ninguna señal de agotamiento viajó por el bus.
    assert!(
        bus_receiver.try_recv().is_err(),
        "ONE_SHOT_VIOLATION: BalanceExhausted published without crossing."
    );

    // El evento de medición quedó en el WAL con costo y cargo crudos.
    let wal_snapshot = state.meter_wal.snapshot_for_flush().unwrap();
    assert_eq!(wal_snapshot.events.len(), 1);
    assert_eq!(wal_snapshot.events[0].charge.to_cents(), 10);
    assert_eq!(wal_snapshot.events[0].tenant, "tenant-alpha");

    println!("   ✅ [SUCCESS]: Safe post-debit certified.");
}

#[tokio::test]
async fn certify_post_debit_exhaustion_crossing_fires_once() {
    println!("\n🚦 [PROVING_GROUNDS]: Auditing exhaustion crossing (scenario: 5c, $0.10)...");
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("gate_postdebit_cross", &workspace).await;
    let credit_gate = CreditGate::new(state.clone());

    seed_balance(&state, "tenant-alpha", 5).await;
    let mut bus_receiver = state.event_bus.subscribe();

    // ESCENARIO 5: balance 5c, cargo 10c => balance -5c y señal única.
    let crossing_outcome = credit_gate
        .post_debit(
            "tenant-alpha",
            CreditAmount::from_dollars("0.10").unwrap(),
            "chat",
            "provider-x",
            "model-x",
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(crossing_outcome.new_balance.to_cents(), -5);
    assert!(crossing_outcome.exhaustion_crossed, "CROSSING_NOT_DETECTED");

    match bus_receiver.try_recv() {
        Ok(PlatformEvent::BalanceExhausted { tenant_id, balance_cents }) => {
            assert_eq!(tenant_id, "tenant-alpha");
            assert_eq!(balance_cents, -5, "CROSSING_BALANCE_FAULT");
        }
        other => panic!("SIGNAL_CLASS_FAULT: {:?}", other),
    }

    // Un débito posterior YA en territorio negativo no re-emite la señal
    // (el cruce se decide por transición, no por signo absoluto).
    let follow_up_outcome = credit_gate
        .post_debit(
            "tenant-alpha",
            CreditAmount::from_dollars("0.10").unwrap(),
            "chat",
            "provider-x",
            "model-x",
            None,
            None,
        )
        .await
        .unwrap();
    assert!(!follow_up_outcome.exhaustion_crossed);
    assert!(
        bus_receiver.try_recv().is_err(),
        "ONE_SHOT_VIOLATION: signal re-fired while already non-positive."
    );

    println!("   ✅ [SUCCESS]: One-shot crossing certified.");
}
