// [tests/mirror/apps/control_plane/fleet_drain.test.rs]
/**
 * =================================================================
 * APARATO: FLEET DRAIN & MIGRATION TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: DRENAJE TOLERANTE, CANCELACIÓN Y MÁQUINA DE ESTADOS
 * =================================================================
 */

use async_trait::async_trait;
use chrono::Utc;
use hive_control_plane::fleet::{FleetControl, FleetFault};
use hive_control_plane::prelude::*;
use hive_domain_models::fleet::{BillingState, BotInstance, NodeStatus};
use hive_domain_models::ports::{NodeAgentRpc, NodeCommand, PortError};
use hive_infra_db::{DbError, LedgerDbClient};
use std::sync::{Arc, Mutex};

/// Agente que registra comandos y puede fallar para tenants marcados.
#[derive(Default)]
struct RehearsalNodeAgent {
    executed_commands: Mutex<Vec<(String, String)>>,
    failing_tenants: Mutex<Vec<String>>,
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

        // restore.begin falla para los tenants en la lista negra.
        if let NodeCommand::RestoreBegin { tenant_id, .. } = &command {
            if self.failing_tenants.lock().unwrap().contains(tenant_id) {
                return Err(PortError::Rejected("RESTORE_REFUSED".into()));
            }
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

async fn seed_instance(state: &AppState, instance: &str, tenant: &str, node: Option<&str>) {
    let now = Utc::now();
    state
        .fleet_repository
        .insert_instance(&BotInstance {
            id: instance.to_string(),
            tenant_id: tenant.to_string(),
            node_id: node.map(str::to_string),
            billing_state: BillingState::Active,
            suspended_at: None,
            destroy_after: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn certify_drain_migrates_tenants_and_records_progress() {
    println!("\n🚚 [PROVING_GROUNDS]: Auditing tolerant node drain...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, agent) = forge_state_with_agent("drain_nominal", &workspace).await;
    let fleet_control = FleetControl::new(state.clone());

    state.fleet_repository.register_node("node-source").await.unwrap();
    state.fleet_repository.register_node("node-target").await.unwrap();
    seed_instance(&state, "bot-a", "tenant-a", Some("node-source")).await;
    seed_instance(&state, "bot-b", "tenant-b", Some("node-source")).await;

    let drain_report = fleet_control.drain_node("node-source").await.unwrap();
    assert_eq!(drain_report.tenants_total, 2);
    assert_eq!(drain_report.tenants_migrated, 2);
    assert!(drain_report.failures.is_empty());

    // Las instancias abandonaron el origen.
    for instance in ["bot-a", "bot-b"] {
        let relocated = state.fleet_repository.get_instance(instance).await.unwrap().unwrap();
        assert_eq!(relocated.node_id.as_deref(), Some("node-target"), "INSTANCE_STRANDED");
    }

    // Máquina de estados y progreso sellados.
    let drained_node = fleet_control.get_node("node-source").await.unwrap();
    assert_eq!(drained_node.status, NodeStatus::Drained);
    assert_eq!(drained_node.drain_migrated, Some(2));
    assert_eq!(drained_node.drain_total, Some(2));

    // El canal RPC recibió drain.step en origen y restore.begin en destino.
    let commands = agent.executed_commands.lock().unwrap().clone();
    assert!(commands.iter().any(|(node, cmd)| node == "node-source" && cmd == "drain.step"));
    assert!(commands.iter().any(|(node, cmd)| node == "node-target" && cmd == "restore.begin"));

    println!("   ✅ [SUCCESS]: Nominal drain certified.");
}

#[tokio::test]
async fn certify_drain_tolerates_per_tenant_failures() {
    println!("\n🚚 [PROVING_GROUNDS]: Auditing per-tenant failure isolation...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, agent) = forge_state_with_agent("drain_tolerant", &workspace).await;
    let fleet_control = FleetControl::new(state.clone());

    state.fleet_repository.register_node("node-source").await.unwrap();
    state.fleet_repository.register_node("node-target").await.unwrap();
    seed_instance(&state, "bot-a", "tenant-a", Some("node-source")).await;
    seed_instance(&state, "bot-b", "tenant-b", Some("node-source")).await;

    // tenant-a rehúsa restaurar; el drenaje debe continuar con tenant-b.
    agent.failing_tenants.lock().unwrap().push("tenant-a".to_string());

    let drain_report = fleet_control.drain_node("node-source").await.unwrap();
    assert_eq!(drain_report.tenants_migrated, 1, "SURVIVOR_NOT_MIGRATED");
    assert_eq!(drain_report.failures.len(), 1, "FAILURE_NOT_RECORDED");
    assert_eq!(drain_report.failures[0].0, "tenant-a");

    // El drenaje concluyó pese al fallo individual.
    let drained_node = fleet_control.get_node("node-source").await.unwrap();
    assert_eq!(drained_node.status, NodeStatus::Drained, "DRAIN_ABORTED_BY_ONE_TENANT");

    println!("   ✅ [SUCCESS]: Failure isolation certified.");
}

#[tokio::test]
async fn certify_cancel_drain_restores_active_state() {
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("drain_cancel", &workspace).await;
    let fleet_control = FleetControl::new(state.clone());

    state.fleet_repository.register_node("node-source").await.unwrap();
    state
        .fleet_repository
        .transition_node_status("node-source", NodeStatus::Draining)
        .await
        .unwrap();
    state
        .fleet_repository
        .set_drain_progress("node-source", "draining", 1, 3)
        .await
        .unwrap();

    fleet_control.cancel_drain("node-source").await.unwrap();

    let restored_node = fleet_control.get_node("node-source").await.unwrap();
    assert_eq!(restored_node.status, NodeStatus::Active, "CANCEL_DRAIN_EDGE_MISSING");
    assert!(restored_node.drain_status.is_none(), "DRAIN_RESIDUE");
    assert!(restored_node.drain_migrated.is_none());
    assert!(restored_node.drain_total.is_none());
}

#[tokio::test]
async fn certify_migrate_tenant_admin_validations() {
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("migrate_guards", &workspace).await;
    let fleet_control = FleetControl::new(state.clone());

    state.fleet_repository.register_node("node-a").await.unwrap();
    state.fleet_repository.register_node("node-b").await.unwrap();
    seed_instance(&state, "bot-assigned", "tenant-a", Some("node-a")).await;
    seed_instance(&state, "bot-orphan", "tenant-b", None).await;

    // Instancia inexistente.
    assert!(matches!(
        fleet_control.migrate_tenant("bot-ghost", "node-b").await,
        Err(FleetFault::NotFound)
    ));

    // Instancia sin asignación de nodo.
    assert!(matches!(
        fleet_control.migrate_tenant("bot-orphan", "node-b").await,
        Err(FleetFault::Unassigned)
    ));

    // Origen == destino.
    assert!(matches!(
        fleet_control.migrate_tenant("bot-assigned", "node-a").await,
        Err(FleetFault::SameNode)
    ));

    // Migración legítima.
    fleet_control.migrate_tenant("bot-assigned", "node-b").await.unwrap();
    let relocated = state.fleet_repository.get_instance("bot-assigned").await.unwrap().unwrap();
    assert_eq!(relocated.node_id.as_deref(), Some("node-b"));
}

#[tokio::test]
async fn certify_node_state_machine_rejects_illegal_edges() {
    let workspace = tempfile::tempdir().unwrap();
    let (state, _agent) = forge_state_with_agent("state_machine", &workspace).await;

    state.fleet_repository.register_node("node-a").await.unwrap();

    // active -> drained (saltando draining): ilegal.
    assert!(matches!(
        state.fleet_repository.transition_node_status("node-a", NodeStatus::Drained).await,
        Err(DbError::InvalidState)
    ));

    // Recorrido legal completo hasta el estado terminal.
    state.fleet_repository.transition_node_status("node-a", NodeStatus::Draining).await.unwrap();
    state.fleet_repository.transition_node_status("node-a", NodeStatus::Drained).await.unwrap();
    state
        .fleet_repository
        .transition_node_status("node-a", NodeStatus::Decommissioned)
        .await
        .unwrap();

    // Sin retorno desde decommissioned.
    assert!(matches!(
        state.fleet_repository.transition_node_status("node-a", NodeStatus::Active).await,
        Err(DbError::InvalidState)
    ));
}
