// [apps/control-plane/src/services/balance_herald.rs]
/*!
 * =================================================================
 * APARATO: BALANCE HERALD SERVICE (V7.1 - DEDUP GUARDED)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: COMUNICACIÓN DE AGOTAMIENTO DE BALANCE AL TENANT
 *
 * Suscriptor de ignición del bus: consume BalanceExhausted, encola la
 * comunicación con deduplicación diaria (tenant, plantilla, fecha) y la
 * despacha por el sink cuando el colaborador está presente. El sink
 * puede ser tonto; la cola del núcleo garantiza a lo sumo un correo de
 * agotamiento por tenant por día.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use hive_domain_models::PlatformEvent;
use tracing::{error, info, warn};

/// Plantilla nominal del correo de agotamiento de balance.
const BALANCE_EXHAUSTED_TEMPLATE: &str = "balance_exhausted";

pub struct BalanceHeraldService {
    application_state: AppState,
}

impl BalanceHeraldService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /// Registra el suscriptor en el bus; una sola vez por ignición.
    pub fn spawn_exhaustion_listener(self) {
        let mut signal_receiver = self.application_state.event_bus.subscribe();

        tokio::spawn(async move {
            info!("📯 [HERALD]: Balance exhaustion listener armed on the platform bus.");

            while let Ok(platform_event) = signal_receiver.recv().await {
                if let PlatformEvent::BalanceExhausted { tenant_id, balance_cents } = platform_event {
                    if let Err(herald_fault) =
                        self.announce_exhaustion(&tenant_id, balance_cents).await
                    {
                        error!(
                            "❌ [HERALD_FAULT]: Exhaustion announcement collapsed for {}: {}",
                            tenant_id, herald_fault
                        );
                    }
                }
            }
        });
    }

    /**
     * Encola (con dedup diario) y despacha la comunicación.
     */
    pub async fn announce_exhaustion(
        &self,
        tenant_identifier: &str,
        balance_cents: i64,
    ) -> anyhow::Result<bool> {
        let date_key = Utc::now().format("%Y-%m-%d").to_string();
        let payload = serde_json::json!({
            "tenant_id": tenant_identifier,
            "balance_cents": balance_cents,
        });

        let was_enqueued = self
            .application_state
            .notification_repository
            .enqueue(
                tenant_identifier,
                BALANCE_EXHAUSTED_TEMPLATE,
                &date_key,
                &payload.to_string(),
            )
            .await?;

        if !was_enqueued {
            // El índice de deduplicación ya absorbió el aviso de hoy.
            return Ok(false);
        }

        // Despacho inmediato cuando el sink está inyectado; sin sink, la
        // entrada queda 'pending' para el drenaje del host.
        if let Some(notification_sink) =
            self.application_state.collaborators.notification_sink.as_present()
        {
            let pending_entries = self.application_state.notification_repository.pending(16).await?;
            for pending_entry in pending_entries {
                match notification_sink
                    .send(
                        &pending_entry.template_name,
                        &pending_entry.tenant_id,
                        serde_json::from_str(&pending_entry.payload_json)
                            .unwrap_or(serde_json::Value::Null),
                    )
                    .await
                {
                    Ok(()) => {
                        self.application_state
                            .notification_repository
                            .mark_sent(&pending_entry.id)
                            .await?;
                    }
                    Err(sink_fault) => {
                        // Transitorio del colaborador: la entrada queda
                        // pendiente para el siguiente despacho.
                        warn!(
                            "⚠️ [HERALD]: Sink rejected {} for {}: {}",
                            pending_entry.template_name, pending_entry.tenant_id, sink_fault
                        );
                    }
                }
            }
        }

        info!(
            "📯 [HERALD]: Exhaustion notice queued for tenant {} ({}c).",
            tenant_identifier, balance_cents
        );
        Ok(true)
    }
}
