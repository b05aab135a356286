// [tests/mirror/apps/control_plane/notification_herald.test.rs]
/**
 * =================================================================
 * APARATO: BALANCE HERALD TEST (V1.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: DEDUPLICACIÓN DIARIA Y DESPACHO POR EL SINK
 * =================================================================
 */

use async_trait::async_trait;
use hive_control_plane::prelude::*;
use hive_control_plane::services::BalanceHeraldService;
use hive_domain_models::ports::{NotificationSink, PortError};
use hive_infra_db::LedgerDbClient;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Sink del Proving Grounds: cuenta despachos.
#[derive(Default)]
struct RehearsalSink {
    dispatched_count: AtomicU32,
}

#[async_trait]
impl NotificationSink for RehearsalSink {
    async fn send(
        &self,
        _template_name: &str,
        _tenant_id: &str,
        _payload: serde_json::Value,
    ) -> Result<(), PortError> {
        self.dispatched_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn forge_state_with_sink(
    database_name: &str,
    workspace: &tempfile::TempDir,
) -> (AppState, Arc<RehearsalSink>) {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();

    let rehearsal_sink = Arc::new(RehearsalSink::default());
    let sink_port: Arc<dyn NotificationSink> = rehearsal_sink.clone();

    let mut collaborators = CollaboratorPorts::disconnected();
    collaborators.notification_sink = Collaborator::Present(sink_port);

    let state = AppState::new(client, Arc::new(config), collaborators).unwrap();
    (state, rehearsal_sink)
}

#[tokio::test]
async fn certify_daily_deduplication_absorbs_repeat_announcements() {
    println!("\n📯 [PROVING_GROUNDS]: Auditing herald daily dedup...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, sink) = forge_state_with_sink("herald_dedup", &workspace).await;
    let herald = BalanceHeraldService::new(state.clone());

    // Primer anuncio del día: encolado y despachado.
    let first_announcement = herald.announce_exhaustion("tenant-alpha", -5).await.unwrap();
    assert!(first_announcement, "FIRST_ANNOUNCEMENT_ABSORBED");
    assert_eq!(sink.dispatched_count.load(Ordering::SeqCst), 1);

    // Repetición el mismo día: el índice (tenant, template, fecha) absorbe.
    let repeat_announcement = herald.announce_exhaustion("tenant-alpha", -12).await.unwrap();
    assert!(!repeat_announcement, "DAILY_DEDUP_HOLE");
    assert_eq!(sink.dispatched_count.load(Ordering::SeqCst), 1, "DUPLICATE_DISPATCH");

    // Otro tenant el mismo día: canal independiente.
    let sibling_announcement = herald.announce_exhaustion("tenant-beta", -3).await.unwrap();
    assert!(sibling_announcement);
    assert_eq!(sink.dispatched_count.load(Ordering::SeqCst), 2);

    println!("   ✅ [SUCCESS]: Daily dedup certified.");
}

#[tokio::test]
async fn certify_queue_survives_absent_sink() {
    let workspace = tempfile::tempdir().unwrap();
    let config = PlatformConfig::for_tests(
        "file:herald_no_sink?mode=memory&cache=shared",
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();
    let state =
        AppState::new(client, Arc::new(config), CollaboratorPorts::disconnected()).unwrap();
    let herald = BalanceHeraldService::new(state.clone());

    // Sin sink inyectado: la entrada queda pendiente para el host.
    assert!(herald.announce_exhaustion("tenant-alpha", -5).await.unwrap());

    let pending_entries = state.notification_repository.pending(10).await.unwrap();
    assert_eq!(pending_entries.len(), 1, "QUEUE_LOST_WITHOUT_SINK");
    assert_eq!(pending_entries[0].template_name, "balance_exhausted");
}
