// [tests/mirror/apps/control_plane/deletion_executor.test.rs]
/**
 * =================================================================
 * APARATO: DELETION EXECUTOR TEST (V1.3)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: PURGA ORDENADA, AISLAMIENTO DE FALLOS Y ANONIMIZACIÓN
 * =================================================================
 */

use async_trait::async_trait;
use chrono::Utc;
use hive_control_plane::deletion::DeletionExecutor;
use hive_control_plane::prelude::*;
use hive_core_credits::CreditAmount;
use hive_domain_models::fleet::{BillingState, BotInstance};
use hive_domain_models::ledger::{CreditKind, DebitKind};
use hive_domain_models::metering::MeterEvent;
use hive_domain_models::ports::{ObjectStore, PortError};
use hive_domain_models::snapshot::{SnapshotKind, SnapshotRecord, SnapshotTrigger};
use hive_infra_db::LedgerDbClient;
use libsql::params;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Object store del Proving Grounds con fallo conmutable en remove().
#[derive(Default)]
struct RehearsalObjectStore {
    should_fail_removals: AtomicBool,
}

#[async_trait]
impl ObjectStore for RehearsalObjectStore {
    async fn put(&self, _path: &str, _content: Vec<u8>) -> Result<(), PortError> {
        Ok(())
    }

    async fn get(&self, _path: &str) -> Result<Vec<u8>, PortError> {
        Err(PortError::NotFound)
    }

    async fn remove(&self, _path: &str) -> Result<(), PortError> {
        if self.should_fail_removals.load(Ordering::SeqCst) {
            return Err(PortError::ExternalServiceFailure("BUCKET_UNREACHABLE".into()));
        }
        Ok(())
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<String>, PortError> {
        Ok(Vec::new())
    }
}

async fn forge_state_with_store(
    database_name: &str,
    workspace: &tempfile::TempDir,
) -> (AppState, Arc<RehearsalObjectStore>) {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();

    let rehearsal_store = Arc::new(RehearsalObjectStore::default());
    let store_port: Arc<dyn ObjectStore> = rehearsal_store.clone();

    let mut collaborators = CollaboratorPorts::disconnected();
    collaborators.object_store = Collaborator::Present(store_port);

    let state = AppState::new(client, Arc::new(config), collaborators).unwrap();
    (state, rehearsal_store)
}

/// Siembra filas del tenant a través de los almacenes de la secuencia.
async fn seed_tenant_universe(state: &AppState, tenant: &str) {
    let now = Utc::now();

    // Finanzas.
    state
        .ledger_repository
        .credit(tenant, CreditAmount::from_cents(1000).unwrap(), CreditKind::Purchase, None, None, None, None)
        .await
        .unwrap();
    state
        .ledger_repository
        .debit(tenant, CreditAmount::from_cents(100).unwrap(), DebitKind::AdapterUsage, None, None, false, None)
        .await
        .unwrap();

    // Instancia.
    state
        .fleet_repository
        .insert_instance(&BotInstance {
            id: format!("bot-{tenant}"),
            tenant_id: tenant.to_string(),
            node_id: None,
            billing_state: BillingState::Active,
            suspended_at: None,
            destroy_after: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    // Medición.
    state
        .meter_repository
        .insert_events_bulk(&[MeterEvent {
            id: format!("evt-{tenant}"),
            tenant: tenant.to_string(),
            capability: "chat".into(),
            provider: "openrouter".into(),
            cost: CreditAmount::from_cents(5).unwrap(),
            charge: CreditAmount::from_cents(8).unwrap(),
            timestamp: 1_700_000_000_000,
            session_id: None,
            duration: None,
        }])
        .await
        .unwrap();

    // Respaldos.
    state
        .snapshot_repository
        .insert(&SnapshotRecord {
            id: format!("snapshot-{tenant}"),
            tenant_id: tenant.to_string(),
            instance_id: format!("bot-{tenant}"),
            user_id: tenant.to_string(),
            name: None,
            kind: SnapshotKind::OnDemand,
            size_bytes: 64,
            node_id: None,
            trigger: SnapshotTrigger::Manual,
            plugins: Vec::new(),
            config_hash: "feedface".into(),
            storage_path: format!("snapshots/{tenant}/feedface"),
            created_at: now,
            expires_at: None,
            deleted_at: None,
        })
        .await
        .unwrap();

    // Comunicaciones, auditoría y gobernanza.
    state
        .notification_repository
        .enqueue(tenant, "low_balance", "2026-08-01", "{}")
        .await
        .unwrap();
    state.audit_repository.record_tenant_audit(tenant, "login", None).await.unwrap();
    state
        .audit_repository
        .record_admin_audit("admin-1", "tenant.flag", Some(tenant), Some(tenant), None)
        .await
        .unwrap();
    state.audit_repository.record_admin_note(tenant, "escalated once", "admin-1").await.unwrap();

    // Pagos e identidad.
    state.billing_support_repository.upsert_processor_customer(tenant, "cus_777").await.unwrap();
    state
        .billing_support_repository
        .record_payment_charge(tenant, 1000, Some("charge-1"), "checkout")
        .await
        .unwrap();
    state.billing_support_repository.upsert_tenant_tier(tenant, "pro").await.unwrap();

    let connection = state.database_client.get_connection().unwrap();
    connection
        .execute(
            "INSERT INTO auth_users (id, email, created_at) VALUES (?1, ?2, ?3)",
            params![tenant, format!("{tenant}@hive.test"), now.to_rfc3339()],
        )
        .await
        .unwrap();
    connection
        .execute(
            "INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ('sess-1', ?1, ?2)",
            params![tenant, now.to_rfc3339()],
        )
        .await
        .unwrap();
    connection
        .execute(
            "INSERT INTO user_roles (id, user_id, scope_tenant_id, role) VALUES ('role-1', ?1, ?1, 'owner')",
            params![tenant],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn certify_full_purge_empties_every_store() {
    println!("\n🧨 [PROVING_GROUNDS]: Auditing full tenant purge...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, _store) = forge_state_with_store("deletion_full", &workspace).await;
    seed_tenant_universe(&state, "tenant-doomed").await;

    let executor = DeletionExecutor::new(state.clone());
    let report = executor.execute_deletion("tenant-doomed").await;

    assert!(report.errors.is_empty(), "UNEXPECTED_ERRORS: {:?}", report.errors);
    assert!(report.total_rows_deleted() > 0);

    // PROPIEDAD 7: cada almacén del catálogo quedó en cero filas.
    for store_name in hive_infra_db::repositories::PurgeRepository::catalog_store_names() {
        let remaining = state
            .purge_repository
            .count_remaining(store_name, "tenant-doomed")
            .await
            .unwrap();
        assert_eq!(remaining, 0, "RESIDUE_IN_STORE: {store_name}");
    }

    // El registro de autenticación desapareció por completo.
    let connection = state.database_client.get_connection().unwrap();
    let mut auth_rows = connection
        .query("SELECT COUNT(*) FROM auth_users WHERE id = 'tenant-doomed'", ())
        .await
        .unwrap();
    assert_eq!(auth_rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap(), 0);

    println!("   ✅ [SUCCESS]: All stores emptied, zero errors.");
}

#[tokio::test]
async fn certify_admin_audit_is_anonymized_not_deleted() {
    println!("\n🧨 [PROVING_GROUNDS]: Auditing regulatory anonymization...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, _store) = forge_state_with_store("deletion_anon", &workspace).await;
    seed_tenant_universe(&state, "tenant-doomed").await;

    let executor = DeletionExecutor::new(state.clone());
    executor.execute_deletion("tenant-doomed").await;

    let connection = state.database_client.get_connection().unwrap();

    // La fila sobrevive (retención regulatoria)...
    let mut surviving_rows = connection
        .query("SELECT target_tenant, target_user FROM admin_audit_log", ())
        .await
        .unwrap();
    let audit_row = surviving_rows.next().await.unwrap().expect("admin audit row retained");

    // ...pero la identidad fue severada in-place.
    assert_eq!(audit_row.get::<String>(0).unwrap(), "[deleted]", "TENANT_IDENTITY_RETAINED");
    assert_eq!(audit_row.get::<String>(1).unwrap(), "[deleted]", "USER_IDENTITY_RETAINED");

    println!("   ✅ [SUCCESS]: Anonymization certified.");
}

#[tokio::test]
async fn certify_object_store_failure_is_isolated() {
    println!("\n🧨 [PROVING_GROUNDS]: Auditing partial-failure isolation (scenario 8)...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, store) = forge_state_with_store("deletion_partial", &workspace).await;
    seed_tenant_universe(&state, "tenant-doomed").await;

    // El object store colapsa en remove(): el paso 7a registra el error
    // y TODOS los demás almacenes se purgan igual.
    store.should_fail_removals.store(true, Ordering::SeqCst);

    let executor = DeletionExecutor::new(state.clone());
    let report = executor.execute_deletion("tenant-doomed").await;

    assert!(
        report.errors.iter().any(|error| error.store == "snapshot_objects"),
        "OBJECT_FAILURE_NOT_RECORDED"
    );

    for store_name in hive_infra_db::repositories::PurgeRepository::catalog_store_names() {
        let remaining = state
            .purge_repository
            .count_remaining(store_name, "tenant-doomed")
            .await
            .unwrap();
        assert_eq!(remaining, 0, "FAILURE_CASCADED_INTO_STORE: {store_name}");
    }

    println!("   ✅ [SUCCESS]: Failure isolation certified.");
}

#[tokio::test]
async fn certify_purge_retry_is_idempotent() {
    let workspace = tempfile::tempdir().unwrap();
    let (state, _store) = forge_state_with_store("deletion_retry", &workspace).await;
    seed_tenant_universe(&state, "tenant-doomed").await;

    let executor = DeletionExecutor::new(state.clone());
    let first_report = executor.execute_deletion("tenant-doomed").await;
    assert!(first_report.total_rows_deleted() > 0);

    // El reintento sobre almacenes vacíos borra cero filas sin errores.
    let second_report = executor.execute_deletion("tenant-doomed").await;
    assert_eq!(second_report.total_rows_deleted(), 0, "RETRY_NOT_IDEMPOTENT");
    assert!(second_report.errors.is_empty());
}
