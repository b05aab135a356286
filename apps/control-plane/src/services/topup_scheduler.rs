// [apps/control-plane/src/services/topup_scheduler.rs]
/*!
 * =================================================================
 * APARATO: AUTO-TOPUP SCHEDULER DAEMON (V7.3 - ANTI HAMMER)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: CARGOS PROGRAMADOS Y ABONO POR LA VÍA DEL WEBHOOK
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ADVANCE FIRST: next_charge_at avanza INCONDICIONALMENTE antes de
 *    intentar el cargo; un procesador caído produce a lo sumo un
 *    intento por intervalo, jamás un martilleo de reintentos.
 * 2. WEBHOOK PARITY: El abono usa el reference_id del recibo como llave
 *    de idempotencia; si el webhook del procesador también entrega el
 *    evento, la colisión de referencia colapsa a no-op.
 * 3. FAILURE CAP: El contador de fallos consecutivos deshabilita la
 *    agenda al alcanzar el tope configurado (default 3).
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use hive_core_credits::CreditAmount;
use hive_domain_models::ledger::CreditKind;
use hive_infra_db::DbError;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

/// Desenlace de un ciclo de agenda (Proving Grounds y telemetría).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TopupCycleOutcome {
    pub schedules_due: usize,
    pub charges_succeeded: usize,
    pub charges_failed: usize,
    pub schedules_disabled: usize,
}

pub struct TopupSchedulerService {
    application_state: AppState,
}

impl TopupSchedulerService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /// Inicia el bucle de agendas de recarga automática.
    pub async fn spawn_scheduler_daemon(self, mut shutdown_signal: watch::Receiver<bool>) {
        let scan_interval_secs = self.application_state.config.topup_scan_interval_secs;
        let mut schedule_timer = interval(Duration::from_secs(scan_interval_secs));
        schedule_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            info!("💰 [TOPUP_SCHEDULER]: Auto-topup daemon online (every {}s).", scan_interval_secs);

            loop {
                tokio::select! {
                    _ = schedule_timer.tick() => {
                        if let Err(scheduler_fault) = self.run_once().await {
                            error!("❌ [TOPUP_SCHEDULER]: Cycle collapsed: {}", scheduler_fault);
                        }
                    }
                    _ = shutdown_signal.changed() => {
                        info!("🛑 [TOPUP_SCHEDULER]: Cooperative shutdown acknowledged.");
                        break;
                    }
                }
            }
        });
    }

    /**
     * Un ciclo de agendas vencidas.
     *
     * # Logic:
     * Por cada agenda vencida: (1) avance incondicional de
     * next_charge_at, (2) cargo vía el puerto del procesador, (3) éxito:
     * contador a cero y abono idempotente al Ledger; fallo: contador
     * incrementado y deshabilitación al tope.
     */
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> anyhow::Result<TopupCycleOutcome> {
        let due_schedules =
            self.application_state.billing_support_repository.due_schedules(Utc::now()).await?;

        let mut cycle_outcome = TopupCycleOutcome {
            schedules_due: due_schedules.len(),
            ..Default::default()
        };

        if due_schedules.is_empty() {
            return Ok(cycle_outcome);
        }

        let Some(payment_processor) =
            self.application_state.collaborators.payment_processor.as_present()
        else {
            warn!("⚠️ [TOPUP_SCHEDULER]: {} schedules due but no payment processor injected.", due_schedules.len());
            return Ok(cycle_outcome);
        };

        for due_schedule in due_schedules {
            // 1. AVANCE INCONDICIONAL (protección anti-martilleo).
            self.application_state
                .billing_support_repository
                .advance_schedule(&due_schedule)
                .await?;

            // 2. CARGO DIRECTO CONTRA EL PROCESADOR.
            let charge_amount = CreditAmount::from_cents(due_schedule.amount_cents)?;
            match payment_processor
                .charge(&due_schedule.tenant_id, charge_amount, "auto_topup_schedule")
                .await
            {
                Ok(charge_receipt) => {
                    self.application_state
                        .billing_support_repository
                        .record_schedule_success(&due_schedule.tenant_id)
                        .await?;

                    // 3. ABONO POR LA VÍA DEL WEBHOOK (idempotente por
                    // reference_id: la entrega duplicada colapsa a no-op).
                    let credit_outcome = self
                        .application_state
                        .ledger_repository
                        .credit(
                            &due_schedule.tenant_id,
                            CreditAmount::from_cents(charge_receipt.amount_cents)?,
                            CreditKind::Purchase,
                            Some("auto_topup_schedule"),
                            Some(&charge_receipt.reference_id),
                            Some("auto_topup"),
                            None,
                        )
                        .await;

                    match credit_outcome {
                        Ok(_) | Err(DbError::DuplicateReference) => {
                            self.application_state
                                .billing_support_repository
                                .record_payment_charge(
                                    &due_schedule.tenant_id,
                                    charge_receipt.amount_cents,
                                    Some(&charge_receipt.reference_id),
                                    "auto_topup_schedule",
                                )
                                .await?;
                            cycle_outcome.charges_succeeded += 1;
                            info!(
                                "💰 [TOPUP_SCHEDULER]: Tenant {} recharged {}c.",
                                due_schedule.tenant_id, charge_receipt.amount_cents
                            );
                        }
                        Err(ledger_fault) => return Err(ledger_fault.into()),
                    }
                }
                Err(charge_fault) => {
                    warn!(
                        "⚠️ [TOPUP_SCHEDULER]: Charge failed for tenant {}: {}",
                        due_schedule.tenant_id, charge_fault
                    );
                    let was_disabled = self
                        .application_state
                        .billing_support_repository
                        .record_schedule_failure(
                            &due_schedule.tenant_id,
                            self.application_state.config.topup_failure_cap,
                        )
                        .await?;

                    cycle_outcome.charges_failed += 1;
                    if was_disabled {
                        cycle_outcome.schedules_disabled += 1;
                    }
                }
            }
        }

        Ok(cycle_outcome)
    }
}
