// [tests/mirror/apps/control_plane/payment_reconciler.test.rs]
/**
 * =================================================================
 * APARATO: PAYMENT RECONCILER TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: INMUNIDAD AL REPLAY Y AUTENTICACIÓN DE WEBHOOKS
 * =================================================================
 */

use hive_control_plane::prelude::*;
use hive_control_plane::services::payment_reconciler::ReconcileFault;
use hive_control_plane::services::PaymentReconciler;
use hive_infra_db::LedgerDbClient;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

async fn forge_state(database_name: &str, workspace: &tempfile::TempDir) -> AppState {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();
    AppState::new(client, Arc::new(config), CollaboratorPorts::disconnected()).unwrap()
}

/// Firma el cuerpo como lo haría el procesador (HMAC-SHA256 hex).
fn sign_body(state: &AppState, raw_body: &[u8]) -> String {
    let mut keyed_mac =
        <Hmac<Sha256> as Mac>::new_from_slice(&state.config.webhook_secret).unwrap();
    keyed_mac.update(raw_body);
    hex::encode(keyed_mac.finalize().into_bytes())
}

fn checkout_body(reference: &str) -> Vec<u8> {
    serde_json::json!({
        "type": "checkout.completed",
        "data": {
            "tenant_id": "tenant-alpha",
            "processor_customer_id": "cus_001",
            "amount_cents": 1000,
            "reference_id": reference,
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn certify_webhook_replay_produces_single_transaction() {
    println!("\n🧾 [PROVING_GROUNDS]: Auditing webhook replay immunity...");
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("reconciler_replay", &workspace).await;
    let reconciler = PaymentReconciler::new(state.clone());

    let raw_body = checkout_body("cs_ref_A");
    let signature = sign_body(&state, &raw_body);

    // 1. PRIMERA ENTREGA: abono sellado.
    let first_outcome = reconciler.handle_webhook(&raw_body, &signature).await.unwrap();
    assert!(first_outcome.handled);
    assert_eq!(first_outcome.credited_cents, Some(1000));
    assert_eq!(first_outcome.tenant.as_deref(), Some("tenant-alpha"));

    // 2. RE-ENTREGA BIT-IDÉNTICA: éxito sin efectos.
    let replay_outcome = reconciler.handle_webhook(&raw_body, &signature).await.unwrap();
    assert!(replay_outcome.handled, "REPLAY_NOT_ABSORBED_AS_SUCCESS");
    assert_eq!(replay_outcome.credited_cents, None, "REPLAY_DOUBLE_CREDIT");

    // 3. MISMO BALANCE, UNA SOLA TRANSACCIÓN CON LA REFERENCIA.
    assert_eq!(state.ledger_repository.balance("tenant-alpha").await.unwrap().amount.to_cents(), 1000);
    assert!(state.ledger_repository.has_reference_id("cs_ref_A").await.unwrap());

    // 4. EL MAPEO TENANT -> CLIENTE QUEDÓ SELLADO.
    assert_eq!(
        state
            .billing_support_repository
            .processor_customer_for_tenant("tenant-alpha")
            .await
            .unwrap()
            .as_deref(),
        Some("cus_001")
    );

    println!("   ✅ [SUCCESS]: Replay immunity certified (balance 1000c, 1 row).");
}

#[tokio::test]
async fn certify_invalid_signature_blocks_processing() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("reconciler_signature", &workspace).await;
    let reconciler = PaymentReconciler::new(state.clone());

    let raw_body = checkout_body("cs_ref_B");

    let forged_outcome = reconciler.handle_webhook(&raw_body, "deadbeef").await;
    assert!(
        matches!(forged_outcome, Err(ReconcileFault::InvalidSignature)),
        "SECURITY_FAULT: Forged signature accepted."
    );

    // Cero efectos colaterales.
    assert_eq!(state.ledger_repository.balance("tenant-alpha").await.unwrap().amount.to_cents(), 0);
    assert!(!state.ledger_repository.has_reference_id("cs_ref_B").await.unwrap());
}

#[tokio::test]
async fn certify_malformed_event_fails_closed() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("reconciler_malformed", &workspace).await;
    let reconciler = PaymentReconciler::new(state.clone());

    // checkout.completed sin reference_id: violación de schema.
    let raw_body = serde_json::json!({
        "type": "checkout.completed",
        "data": { "tenant_id": "tenant-alpha", "processor_customer_id": "cus_001", "amount_cents": 1000 }
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(&state, &raw_body);

    let outcome = reconciler.handle_webhook(&raw_body, &signature).await;
    assert!(matches!(outcome, Err(ReconcileFault::MalformedEvent(_))), "SCHEMA_HOLE");
}

#[tokio::test]
async fn certify_subscription_update_seals_tier() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("reconciler_tier", &workspace).await;
    let reconciler = PaymentReconciler::new(state.clone());

    let raw_body = serde_json::json!({
        "type": "subscription.updated",
        "data": { "tenant_id": "tenant-alpha", "processor_customer_id": "cus_001", "tier": "pro" }
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(&state, &raw_body);

    let outcome = reconciler.handle_webhook(&raw_body, &signature).await.unwrap();
    assert!(outcome.handled);
    assert_eq!(
        state.billing_support_repository.tenant_tier("tenant-alpha").await.unwrap().as_deref(),
        Some("pro"),
        "TIER_NOT_SEALED"
    );

    // Un tier desconocido es violación de schema, jamás default.
    let rogue_body = serde_json::json!({
        "type": "subscription.updated",
        "data": { "tenant_id": "tenant-alpha", "processor_customer_id": "cus_001", "tier": "diamond" }
    })
    .to_string()
    .into_bytes();
    let rogue_signature = sign_body(&state, &rogue_body);
    assert!(matches!(
        reconciler.handle_webhook(&rogue_body, &rogue_signature).await,
        Err(ReconcileFault::MalformedEvent(_))
    ));
}

#[tokio::test]
async fn certify_unrecognized_event_passes_through_unhandled() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("reconciler_unknown", &workspace).await;
    let reconciler = PaymentReconciler::new(state.clone());

    let raw_body = serde_json::json!({ "type": "invoice.finalized", "data": {} })
        .to_string()
        .into_bytes();
    let signature = sign_body(&state, &raw_body);

    let outcome = reconciler.handle_webhook(&raw_body, &signature).await.unwrap();
    assert!(!outcome.handled);
    assert_eq!(outcome.event_type, "invoice.finalized");
}

#[tokio::test]
async fn certify_customer_deletion_removes_mapping() {
    let workspace = tempfile::tempdir().unwrap();
    let state = forge_state("reconciler_cus_delete", &workspace).await;
    let reconciler = PaymentReconciler::new(state.clone());

    state
        .billing_support_repository
        .upsert_processor_customer("tenant-alpha", "cus_001")
        .await
        .unwrap();

    let raw_body = serde_json::json!({
        "type": "customer.deleted",
        "data": { "processor_customer_id": "cus_001" }
    })
    .to_string()
    .into_bytes();
    let signature = sign_body(&state, &raw_body);

    let outcome = reconciler.handle_webhook(&raw_body, &signature).await.unwrap();
    assert!(outcome.handled);
    assert_eq!(outcome.tenant.as_deref(), Some("tenant-alpha"));
    assert!(state
        .billing_support_repository
        .processor_customer_for_tenant("tenant-alpha")
        .await
        .unwrap()
        .is_none());
}
