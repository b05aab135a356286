// [tests/mirror/apps/control_plane/topup_scheduler.test.rs]
/**
 * =================================================================
 * APARATO: AUTO-TOPUP SCHEDULER TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AVANCE ANTI-MARTILLEO Y TOPE DE FALLOS
 * =================================================================
 */

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hive_control_plane::prelude::*;
use hive_control_plane::services::TopupSchedulerService;
use hive_core_credits::CreditAmount;
use hive_domain_models::ports::{
    CheckoutSessionHandle, PaymentMethodSummary, PaymentProcessor, PortError,
    ProcessorChargeReceipt,
};
use hive_infra_db::LedgerDbClient;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Procesador de pagos del Proving Grounds: éxito o fallo conmutables.
#[derive(Default)]
struct RehearsalProcessor {
    charge_invocations: AtomicU32,
    should_fail: AtomicBool,
}

#[async_trait]
impl PaymentProcessor for RehearsalProcessor {
    async fn create_checkout_session(
        &self,
        _tenant_id: &str,
        _amount: CreditAmount,
    ) -> Result<CheckoutSessionHandle, PortError> {
        Err(PortError::Rejected("NOT_EXERCISED".into()))
    }

    async fn create_portal_session(&self, _tenant_id: &str) -> Result<String, PortError> {
        Err(PortError::Rejected("NOT_EXERCISED".into()))
    }

    async fn setup_payment_method(&self, _tenant_id: &str) -> Result<String, PortError> {
        Err(PortError::Rejected("NOT_EXERCISED".into()))
    }

    async fn list_payment_methods(
        &self,
        _tenant_id: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PortError> {
        Ok(Vec::new())
    }

    async fn charge(
        &self,
        tenant_id: &str,
        amount: CreditAmount,
        _reason: &str,
    ) -> Result<ProcessorChargeReceipt, PortError> {
        let invocation_ordinal = self.charge_invocations.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(PortError::ExternalServiceFailure("CARD_DECLINED".into()));
        }
        Ok(ProcessorChargeReceipt {
            reference_id: format!("topup-{tenant_id}-{invocation_ordinal}"),
            amount_cents: amount.to_cents(),
        })
    }

    async fn delete_customer(&self, _processor_customer_id: &str) -> Result<(), PortError> {
        Ok(())
    }
}

async fn forge_state_with_processor(
    database_name: &str,
    workspace: &tempfile::TempDir,
) -> (AppState, Arc<RehearsalProcessor>) {
    let config = PlatformConfig::for_tests(
        &format!("file:{database_name}?mode=memory&cache=shared"),
        workspace.path(),
    );
    let client = LedgerDbClient::connect(&config.database_url, None).await.unwrap();

    let rehearsal_processor = Arc::new(RehearsalProcessor::default());
    let processor_port: Arc<dyn PaymentProcessor> = rehearsal_processor.clone();

    let mut collaborators = CollaboratorPorts::disconnected();
    collaborators.payment_processor = Collaborator::Present(processor_port);

    let state = AppState::new(client, Arc::new(config), collaborators).unwrap();
    (state, rehearsal_processor)
}

#[tokio::test]
async fn certify_successful_topup_credits_via_webhook_path() {
    println!("\n💰 [PROVING_GROUNDS]: Auditing successful auto-topup cycle...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, _processor) = forge_state_with_processor("topup_success", &workspace).await;
    let scheduler = TopupSchedulerService::new(state.clone());

    let past_due = Utc::now() - Duration::hours(1);
    state
        .billing_support_repository
        .upsert_topup_schedule("tenant-alpha", 2000, 24, past_due)
        .await
        .unwrap();

    let cycle_outcome = scheduler.run_once().await.unwrap();
    assert_eq!(cycle_outcome.schedules_due, 1);
    assert_eq!(cycle_outcome.charges_succeeded, 1);

    // El abono viajó por la vía del webhook (referencia idempotente).
    assert_eq!(state.ledger_repository.balance("tenant-alpha").await.unwrap().amount.to_cents(), 2000);

    // La agenda avanzó y el contador de fallos quedó en cero.
    let schedule = state
        .billing_support_repository
        .get_schedule("tenant-alpha")
        .await
        .unwrap()
        .expect("schedule persists");
    assert!(schedule.next_charge_at > Utc::now(), "SCHEDULE_NOT_ADVANCED");
    assert_eq!(schedule.consecutive_failures, 0);
    assert!(schedule.is_enabled);

    println!("   ✅ [SUCCESS]: Auto-topup happy path certified.");
}

#[tokio::test]
async fn certify_advance_is_unconditional_on_failure() {
    println!("\n💰 [PROVING_GROUNDS]: Auditing anti-hammer advance...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, processor) = forge_state_with_processor("topup_advance", &workspace).await;
    let scheduler = TopupSchedulerService::new(state.clone());

    processor.should_fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let past_due = Utc::now() - Duration::minutes(5);
    state
        .billing_support_repository
        .upsert_topup_schedule("tenant-alpha", 2000, 24, past_due)
        .await
        .unwrap();

    let cycle_outcome = scheduler.run_once().await.unwrap();
    assert_eq!(cycle_outcome.charges_failed, 1);

    // ANTI-MARTILLEO: pese al fallo, next_charge_at avanzó al futuro.
    let schedule = state
        .billing_support_repository
        .get_schedule("tenant-alpha")
        .await
        .unwrap()
        .unwrap();
    assert!(schedule.next_charge_at > Utc::now(), "HAMMER_RETRY_WINDOW_OPEN");
    assert_eq!(schedule.consecutive_failures, 1);

    // Un segundo ciclo inmediato no encuentra agendas vencidas.
    let idle_cycle = scheduler.run_once().await.unwrap();
    assert_eq!(idle_cycle.schedules_due, 0, "ADVANCE_NOT_RESPECTED");
    assert_eq!(processor.charge_invocations.load(std::sync::atomic::Ordering::SeqCst), 1);

    println!("   ✅ [SUCCESS]: Unconditional advance certified.");
}

#[tokio::test]
async fn certify_failure_cap_disables_schedule() {
    println!("\n💰 [PROVING_GROUNDS]: Auditing consecutive failure cap (3)...");
    let workspace = tempfile::tempdir().unwrap();
    let (state, processor) = forge_state_with_processor("topup_cap", &workspace).await;
    let scheduler = TopupSchedulerService::new(state.clone());

    processor.should_fail.store(true, std::sync::atomic::Ordering::SeqCst);

    // intervalo 0h: el avance incondicional deja la agenda vencida de
    // nuevo, permitiendo ejercitar el tope ciclo a ciclo.
    let past_due = Utc::now() - Duration::minutes(5);
    state
        .billing_support_repository
        .upsert_topup_schedule("tenant-alpha", 2000, 0, past_due)
        .await
        .unwrap();

    for expected_failures in 1..=2u32 {
        let cycle = scheduler.run_once().await.unwrap();
        assert_eq!(cycle.charges_failed, 1);
        assert_eq!(cycle.schedules_disabled, 0, "PREMATURE_DISABLE");
        let schedule = state
            .billing_support_repository
            .get_schedule("tenant-alpha")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(schedule.consecutive_failures, expected_failures);
        assert!(schedule.is_enabled);
    }

    // Tercer fallo consecutivo: la agenda se deshabilita.
    let final_cycle = scheduler.run_once().await.unwrap();
    assert_eq!(final_cycle.schedules_disabled, 1, "CAP_NOT_ENFORCED");

    let disabled_schedule = state
        .billing_support_repository
        .get_schedule("tenant-alpha")
        .await
        .unwrap()
        .unwrap();
    assert!(!disabled_schedule.is_enabled);
    assert_eq!(disabled_schedule.consecutive_failures, 3);

    // Las agendas deshabilitadas desaparecen del escrutinio.
    let idle_cycle = scheduler.run_once().await.unwrap();
    assert_eq!(idle_cycle.schedules_due, 0, "DISABLED_SCHEDULE_STILL_DUE");

    println!("   ✅ [SUCCESS]: Failure cap certified.");
}

#[tokio::test]
async fn certify_success_resets_failure_counter() {
    let workspace = tempfile::tempdir().unwrap();
    let (state, processor) = forge_state_with_processor("topup_reset", &workspace).await;
    let scheduler = TopupSchedulerService::new(state.clone());

    processor.should_fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let past_due = Utc::now() - Duration::minutes(5);
    state
        .billing_support_repository
        .upsert_topup_schedule("tenant-alpha", 1500, 0, past_due)
        .await
        .unwrap();

    scheduler.run_once().await.unwrap();
    assert_eq!(
        state.billing_support_repository.get_schedule("tenant-alpha").await.unwrap().unwrap().consecutive_failures,
        1
    );

    // El procesador se recupera: el contador vuelve a cero.
    processor.should_fail.store(false, std::sync::atomic::Ordering::SeqCst);
    scheduler.run_once().await.unwrap();

    let recovered_schedule = state
        .billing_support_repository
        .get_schedule("tenant-alpha")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered_schedule.consecutive_failures, 0, "COUNTER_NOT_RESET");
    assert_eq!(state.ledger_repository.balance("tenant-alpha").await.unwrap().amount.to_cents(), 1500);
}
