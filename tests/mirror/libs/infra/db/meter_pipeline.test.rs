// [tests/mirror/libs/infra/db/meter_pipeline.test.rs]
/**
 * =================================================================
 * APARATO: METER PIPELINE TEST (V1.3)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: EXACTLY-ONCE ACCOUNTING E IDEMPOTENCIA DE FLUSH
 * =================================================================
 */

use hive_control_plane::prelude::*;
use hive_control_plane::services::MeterFlushService;
use hive_core_credits::CreditAmount;
use hive_domain_models::metering::MeterEvent;
use hive_infra_db::LedgerDbClient;
use std::sync::Arc;

/// Instante base determinista (alineado a periodo de 5 minutos).
const BASE_TIMESTAMP_MS: i64 = 1_700_000_100_000;
const PERIOD_MS: i64 = 300_000;

fn forge_event(identifier: &str, tenant: &str, timestamp_ms: i64) -> MeterEvent {
    MeterEvent {
        id: identifier.to_string(),
        tenant: tenant.to_string(),
        capability: "chat".into(),
        provider: "openrouter".into(),
        cost: CreditAmount::from_cents(10).unwrap(),
        charge: CreditAmount::from_cents(15).unwrap(),
        timestamp: timestamp_ms,
        session_id: None,
        duration: Some(100),
    }
}

async fn forge_state(database_name: &str, workspace: &tempfile::TempDir) -> AppState {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();
    AppState::new(client, Arc::new(config), CollaboratorPorts::disconnected()).unwrap()
}

#[tokio::test]
async fn certify_flush_crystallizes_and_is_idempotent() {
    println!("\n📊 [PROVING_GROUNDS]: Auditing WAL -> relational crystallization...");
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("meter_flush_idem", &workspace).await;
    let flush_service = MeterFlushService::new(state.clone());

    // 1. EMISIÓN AL WAL (ruta caliente, sin tocar el motor relacional).
    state.meter_wal.emit(forge_event("evt-1", "tenant-alpha", BASE_TIMESTAMP_MS)).unwrap();
    state.meter_wal.emit(forge_event("evt-2", "tenant-alpha", BASE_TIMESTAMP_MS + 10)).unwrap();

    // 2. PRIMER FLUSH: ambos eventos cristalizan.
    let first_cycle = flush_service.flush_once().await.unwrap();
    assert_eq!(first_cycle.events_flushed, 2, "FLUSH_VOLUME_FAULT");
    assert_eq!(state.meter_repository.count_events_for_tenant("tenant-alpha").await.unwrap(), 2);

    // 3. SEGUNDO FLUSH SIN ENTRADAS NUEVAS: estado idéntico (idempotencia).
    let second_cycle = flush_service.flush_once().await.unwrap();
    assert_eq!(second_cycle.events_flushed, 0, "PHANTOM_REFLUSH_FAULT");
    assert_eq!(state.meter_repository.count_events_for_tenant("tenant-alpha").await.unwrap(), 2);

    // 4. REPLAY DEL MISMO ID (crash entre inserción y compactación):
    // INSERT OR IGNORE colapsa at-least-once a exactly-once.
    state.meter_wal.emit(forge_event("evt-1", "tenant-alpha", BASE_TIMESTAMP_MS)).unwrap();
    flush_service.flush_once().await.unwrap();
    assert_eq!(
        state.meter_repository.count_events_for_tenant("tenant-alpha").await.unwrap(),
        2,
        "EXACTLY_ONCE_VIOLATION: replayed id duplicated accounting."
    );

    println!("   ✅ [SUCCESS]: Exactly-once crystallization certified.");
}

#[tokio::test]
async fn certify_aggregation_is_idempotent_and_excludes_current_period() {
    println!("\n📊 [PROVING_GROUNDS]: Auditing period re-sum idempotency...");
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("meter_aggregate_idem", &workspace).await;

    // Dos eventos en un periodo cerrado, uno en el periodo en curso.
    let simulated_now = BASE_TIMESTAMP_MS + 2 * PERIOD_MS;
    let closed_period_events = vec![
        forge_event("evt-a", "tenant-alpha", BASE_TIMESTAMP_MS),
        forge_event("evt-b", "tenant-alpha", BASE_TIMESTAMP_MS + 1_000),
        forge_event("evt-current", "tenant-alpha", simulated_now),
    ];
    state.meter_repository.insert_events_bulk(&closed_period_events).await.unwrap();

    // 1. PRIMERA AGREGACIÓN.
    state
        .meter_repository
        .aggregate_closed_periods(simulated_now, PERIOD_MS, PERIOD_MS)
        .await
        .unwrap();

    let first_pass = state.meter_repository.list_summaries("tenant-alpha").await.unwrap();
    assert_eq!(first_pass.len(), 1, "CURRENT_PERIOD_LEAKED_INTO_SUMMARY");
    assert_eq!(first_pass[0].event_count, 2, "CLOSED_PERIOD_COUNT_FAULT");
    assert_eq!(first_pass[0].total_cost.to_cents(), 20);
    assert_eq!(first_pass[0].total_charge.to_cents(), 30);
    assert_eq!(first_pass[0].total_duration_ms, 200);

    // 2. SEGUNDA AGREGACIÓN SIN ENTRADAS NUEVAS: filas idénticas.
    state
        .meter_repository
        .aggregate_closed_periods(simulated_now, PERIOD_MS, PERIOD_MS)
        .await
        .unwrap();
    let second_pass = state.meter_repository.list_summaries("tenant-alpha").await.unwrap();
    assert_eq!(second_pass, first_pass, "AGGREGATION_IDEMPOTENCE_VIOLATION");

    println!("   ✅ [SUCCESS]: Idempotent re-sum certified.");
}

#[tokio::test]
async fn certify_late_arrival_grace_re_sums_closed_period() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("meter_late_arrival", &workspace).await;
    let simulated_now = BASE_TIMESTAMP_MS + 2 * PERIOD_MS;

    state
        .meter_repository
        .insert_events_bulk(&[forge_event("evt-a", "tenant-alpha", BASE_TIMESTAMP_MS)])
        .await
        .unwrap();
    state
        .meter_repository
        .aggregate_closed_periods(simulated_now, PERIOD_MS, PERIOD_MS)
        .await
        .unwrap();

    // Llegada tardía dentro de la ventana de gracia: la re-suma completa
    // reemplaza el resumen del periodo con la verdad total.
    state
        .meter_repository
        .insert_events_bulk(&[forge_event("evt-late", "tenant-alpha", BASE_TIMESTAMP_MS + 2_000)])
        .await
        .unwrap();
    state
        .meter_repository
        .aggregate_closed_periods(simulated_now, PERIOD_MS, PERIOD_MS)
        .await
        .unwrap();

    let summaries = state.meter_repository.list_summaries("tenant-alpha").await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].event_count, 2, "LATE_ARRIVAL_LOST");
}

#[tokio::test]
async fn certify_corrupted_wal_lines_do_not_block_flush() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("meter_corruption", &workspace).await;
    let flush_service = MeterFlushService::new(state.clone());

    state.meter_wal.emit(forge_event("evt-1", "tenant-alpha", BASE_TIMESTAMP_MS)).unwrap();

    // Inyección de corrupción directa en el archivo del WAL.
    {
        use std::io::Write;
        let mut raw_handle = std::fs::OpenOptions::new()
            .append(true)
            .open(&state.config.meter_wal_path)
            .unwrap();
        raw_handle.write_all(b"}}corrupted-line{{\n").unwrap();
    }
    state.meter_wal.emit(forge_event("evt-2", "tenant-alpha", BASE_TIMESTAMP_MS)).unwrap();

    let cycle = flush_service.flush_once().await.unwrap();
    assert_eq!(cycle.events_flushed, 2, "CORRUPTION_BLOCKED_RECOVERY");
    assert_eq!(cycle.malformed_lines_skipped, 1, "CORRUPTION_NOT_COUNTED");

    // La línea corrupta fue desalojada por la compactación.
    let residue = state.meter_wal.snapshot_for_flush().unwrap();
    assert_eq!(residue.events.len(), 0);
    assert_eq!(residue.malformed_lines_skipped, 0, "CORRUPTION_SURVIVED_COMPACTION");
}
