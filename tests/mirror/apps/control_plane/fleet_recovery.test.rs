// [tests/mirror/apps/control_plane/fleet_recovery.test.rs]
/**
 * =================================================================
 * APARATO: FLEET RECOVERY TEST (V1.4)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: WATCHDOG, CONSERVACIÓN DE CONTEOS Y RETRY WAITING
 * =================================================================
 */

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hive_control_plane::prelude::*;
use hive_control_plane::services::{FleetWatchdogService, RecoveryOrchestrator};
use hive_domain_models::fleet::{
    BillingState, BotInstance, RecoveryEventStatus, RecoveryItemStatus, RecoveryTrigger,
};
use hive_domain_models::ports::{NodeAgentRpc, NodeCommand, PortError};
use hive_domain_models::snapshot::{SnapshotKind, SnapshotRecord, SnapshotTrigger};
use hive_domain_models::PlatformEvent;
use hive_infra_db::LedgerDbClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Agente de nodo del Proving Grounds: registra comandos, fallo conmutable.
#[derive(Default)]
struct RehearsalNodeAgent {
    executed_commands: Mutex<Vec<(String, String)>>,
    should_fail: AtomicBool,
}

#[async_trait]
impl NodeAgentRpc for RehearsalNodeAgent {
    async fn execute(
        &self,
        node_id: &str,
        command: NodeCommand,
    ) -> Result<serde_json::Value, PortError> {
        self.executed_commands
            .lock()
            .unwrap()
            .push((node_id.to_string(), command.wire_name().to_string()));

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(PortError::ExternalServiceFailure("AGENT_UNREACHABLE".into()));
        }
        Ok(serde_json::json!({ "acknowledged": true }))
    }
}

async fn forge_state_with_agent(
    database_name: &str,
    workspace: &tempfile::TempDir,
) -> (AppState, Arc<RehearsalNodeAgent>) {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();

    let rehearsal_agent = Arc::new(RehearsalNodeAgent::default());
    let agent_port: Arc<dyn NodeAgentRpc> = rehearsal_agent.clone();

    let mut collaborators = CollaboratorPorts::disconnected();
    collaborators.node_agent = Collaborator::Present(agent_port);

    let state = AppState::new(client, Arc::new(config), collaborators).unwrap();
    (state, rehearsal_agent)
}

/// Siembra una instancia viva del tenant sobre el nodo dado.
async fn seed_instance(state: &AppState, tenant: &str, node: &str) {
    let now = Utc::now();
    state
        .fleet_repository
        .insert_instance(&BotInstance {
            id: format!("bot-{tenant}"),
            tenant_id: tenant.to_string(),
            node_id: Some(node.to_string()),
            billing_state: BillingState::Active,
            suspended_at: None,
            destroy_after: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// Siembra un respaldo usable del tenant.
async fn seed_backup(state: &AppState, tenant: &str) {
    let now = Utc::now();
    state
        .snapshot_repository
        .insert(&SnapshotRecord {
            id: format!("snapshot-{tenant}"),
            tenant_id: tenant.to_string(),
            instance_id: format!("bot-{tenant}"),
            user_id: tenant.to_string(),
            name: None,
            kind: SnapshotKind::Nightly,
            size_bytes: 128,
            node_id: None,
            trigger: SnapshotTrigger::Scheduled,
            plugins: Vec::new(),
            config_hash: "cafebabe".into(),
            storage_path: format!("snapshots/{tenant}/latest"),
            created_at: now,
            expires_at: None,
            deleted_at: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn certify_watchdog_detects_silent_node_and_signals_once() {
    println!("\n🐕 [PROVING_GROUNDS]: Auditing heartbeat watchdog (timeout 60s)...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("watchdog_signal", &workspace).await;
    let watchdog = FleetWatchdogService::new(state.clone());

    state.fleet_repository.register_node("node-silent").await.unwrap();
    state.fleet_repository.register_node("node-healthy").await.unwrap();

    // Último latido hace 120s: el doble del timeout.
    state
        .fleet_repository
        .record_heartbeat("node-silent", Utc::now() - Duration::seconds(120))
        .await
        .unwrap();

    let mut bus_receiver = state.event_bus.subscribe();

    let first_tick_signals = watchdog.tick_once().await.unwrap();
    assert_eq!(first_tick_signals, 1, "SILENT_NODE_UNDETECTED");

    match bus_receiver.try_recv() {
        Ok(PlatformEvent::NodeLost { node_id, trigger }) => {
            assert_eq!(node_id, "node-silent");
            assert_eq!(trigger, RecoveryTrigger::HeartbeatTimeout);
        }
        other => panic!("SIGNAL_CLASS_FAULT: {:?}", other),
    }

    // El mismo episodio de silencio jamás re-dispara la señal.
    let second_tick_signals = watchdog.tick_once().await.unwrap();
    assert_eq!(second_tick_signals, 0, "SIGNAL_STORM: episode re-signaled.");

    println!("   ✅ [SUCCESS]: Deduplicated NodeLost signal certified.");
}

#[tokio::test]
async fn certify_recovery_count_conservation() {
    println!("\n🩺 [PROVING_GROUNDS]: Auditing recovery bookkeeping (4 tenants)...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("recovery_counts", &workspace).await;
    let orchestrator = RecoveryOrchestrator::new(state.clone());

    // ESCENARIO 7: nodo con 4 tenants; 3 con respaldo usable, 1 sin él.
    state.fleet_repository.register_node("node-failed").await.unwrap();
    state.fleet_repository.register_node("node-target").await.unwrap();
    for tenant in ["tenant-a", "tenant-b", "tenant-c", "tenant-d"] {
        seed_instance(&state, tenant, "node-failed").await;
    }
    for tenant in ["tenant-a", "tenant-b", "tenant-c"] {
        seed_backup(&state, tenant).await;
    }

    let concluded_event = orchestrator
        .execute_recovery("node-failed", RecoveryTrigger::HeartbeatTimeout)
        .await
        .unwrap();

    // CONSERVACIÓN: recovered + failed + waiting == total.
    assert_eq!(concluded_event.tenants_total, 4);
    assert_eq!(
        concluded_event.tenants_recovered
            + concluded_event.tenants_failed
            + concluded_event.tenants_waiting,
        concluded_event.tenants_total,
        "COUNT_CONSERVATION_VIOLATION"
    );
    assert_eq!(concluded_event.tenants_recovered, 3);
    assert_eq!(concluded_event.tenants_failed, 1, "NO_BACKUP_TENANT_NOT_FAILED");
    assert_eq!(concluded_event.status, RecoveryEventStatus::Partial);
    assert_eq!(concluded_event.trigger, RecoveryTrigger::HeartbeatTimeout);

    // Un item por tenant afectado, todos terminales.
    let items = state.recovery_repository.list_items(&concluded_event.id, None).await.unwrap();
    assert_eq!(items.len(), 4, "ITEM_PER_TENANT_VIOLATION");

    // Los recuperados quedaron reasignados al destino de menor carga.
    let relocated = state.fleet_repository.get_instance("bot-tenant-a").await.unwrap().unwrap();
    assert_eq!(relocated.node_id.as_deref(), Some("node-target"), "REASSIGNMENT_FAULT");

    println!("   ✅ [SUCCESS]: Count conservation certified (3/1/0 of 4).");
}

#[tokio::test]
async fn certify_full_recovery_reaches_completed() {
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("recovery_completed", &workspace).await;
    let orchestrator = RecoveryOrchestrator::new(state.clone());

    state.fleet_repository.register_node("node-failed").await.unwrap();
    state.fleet_repository.register_node("node-target").await.unwrap();
    for tenant in ["tenant-a", "tenant-b"] {
        seed_instance(&state, tenant, "node-failed").await;
        seed_backup(&state, tenant).await;
    }

    let concluded_event = orchestrator
        .execute_recovery("node-failed", RecoveryTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(concluded_event.status, RecoveryEventStatus::Completed);
    assert_eq!(concluded_event.tenants_recovered, 2);
    assert!(concluded_event.completed_at.is_some(), "TERMINAL_WITHOUT_TIMESTAMP");
}

#[tokio::test]
async fn certify_retry_waiting_recovers_after_capacity_arrives() {
    println!("\n🩺 [PROVING_GROUNDS]: Auditing retry of waiting items...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("recovery_retry", &workspace).await;
    let orchestrator = RecoveryOrchestrator::new(state.clone());

    // Sin destino elegible: solo existe el nodo caído.
    state.fleet_repository.register_node("node-failed").await.unwrap();
    seed_instance(&state, "tenant-a", "node-failed").await;
    seed_backup(&state, "tenant-a").await;

    let stranded_event = orchestrator
        .execute_recovery("node-failed", RecoveryTrigger::HeartbeatTimeout)
        .await
        .unwrap();
    assert_eq!(stranded_event.status, RecoveryEventStatus::Partial);
    assert_eq!(stranded_event.tenants_waiting, 1, "NO_TARGET_NOT_WAITING");

    let waiting_items = state
        .recovery_repository
        .list_items(&stranded_event.id, Some(RecoveryItemStatus::Waiting))
        .await
        .unwrap();
    assert_eq!(waiting_items.len(), 1);
    assert_eq!(waiting_items[0].reason.as_deref(), Some("NO_ELIGIBLE_TARGET_NODE"));

    // Llega capacidad nueva: el reintento ataca SOLO los waiting.
    state.fleet_repository.register_node("node-fresh").await.unwrap();
    let retried_event = orchestrator.retry_waiting(&stranded_event.id).await.unwrap();

    assert_eq!(retried_event.status, RecoveryEventStatus::Completed, "RETRY_DID_NOT_CONVERGE");
    assert_eq!(retried_event.tenants_recovered, 1);
    assert_eq!(retried_event.tenants_waiting, 0);

    println!("   ✅ [SUCCESS]: partial -> completed convergence certified.");
}
