// [apps/control-plane/src/services/usage_aggregator.rs]
/*!
 * =================================================================
 * APARATO: USAGE AGGREGATOR DAEMON (V7.3 - IDEMPOTENT RE-SUM)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: RESUMEN PERIÓDICO DE EVENTOS EN BUCKETS CERRADOS
 *
 * El periodo en curso jamás se resume; las llegadas tardías se absorben
 * re-escaneando los periodos dentro de la ventana de gracia. La re-suma
 * completa hace la operación estructuralmente idempotente.
 * =================================================================
 */

use crate::state::AppState;
use hive_domain_models::metering::now_unix_ms;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

pub struct UsageAggregatorService {
    application_state: AppState,
}

impl UsageAggregatorService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /// Inicia el bucle de agregación auto-excluyente.
    pub async fn spawn_aggregator_daemon(self, mut shutdown_signal: watch::Receiver<bool>) {
        let aggregate_interval_secs = self.application_state.config.aggregate_interval_secs;
        let mut aggregation_timer = interval(Duration::from_secs(aggregate_interval_secs));
        aggregation_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            info!(
                "📊 [AGGREGATOR]: Period re-sum daemon online (every {}s, period {}ms).",
                aggregate_interval_secs, self.application_state.config.billing_period_ms
            );

            loop {
                tokio::select! {
                    _ = aggregation_timer.tick() => {
                        if let Err(aggregation_fault) = self.aggregate_once().await {
                            error!("❌ [AGGREGATOR]: Cycle collapsed: {}", aggregation_fault);
                        }
                    }
                    _ = shutdown_signal.changed() => {
                        info!("🛑 [AGGREGATOR]: Cooperative shutdown acknowledged.");
                        break;
                    }
                }
            }
        });
    }

    /// Un ciclo de re-suma sobre el horizonte de gracia.
    #[instrument(skip(self))]
    pub async fn aggregate_once(&self) -> anyhow::Result<usize> {
        let sealed_summaries = self
            .application_state
            .meter_repository
            .aggregate_closed_periods(
                now_unix_ms(),
                self.application_state.config.billing_period_ms,
                self.application_state.config.late_arrival_grace_ms,
            )
            .await?;

        if sealed_summaries > 0 {
            debug!("📊 [AGGREGATOR]: {} period summaries sealed.", sealed_summaries);
        }
        Ok(sealed_summaries)
    }
}
