// [apps/control-plane/src/services/retention_reaper.rs]
/**
 * =================================================================
 * APARATO: SNAPSHOT RETENTION REAPER (V7.2 - TWO PHASE)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: EXPIRACIÓN BLANDA Y PURGA DURA DE RESPALDOS
 * =================================================================
 */

use crate::snapshots::SnapshotManager;
use crate::state::AppState;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/**
 * Inicia la barrida periódica de retención en el runtime de Tokio.
 *
 * # Performance:
 * El ciclo por defecto (1h) está sintonizado para que la purga dura se
 * aplique con la gracia de arrastre de 24h sin presionar el storage.
 */
pub async fn spawn_retention_reaper(
    application_state: AppState,
    mut shutdown_signal: watch::Receiver<bool>,
) {
    let sweep_interval_secs = application_state.config.retention_sweep_interval_secs;
    let mut maintenance_ticker = interval(Duration::from_secs(sweep_interval_secs));
    maintenance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::spawn(async move {
        info!("💀 [RETENTION_REAPER]: Snapshot hygiene daemon online (every {}s).", sweep_interval_secs);
        let snapshot_manager = SnapshotManager::new(application_state);

        loop {
            tokio::select! {
                _ = maintenance_ticker.tick() => {
                    match snapshot_manager.sweep_retention().await {
                        Ok((expired_count, purged_count)) => {
                            if expired_count + purged_count > 0 {
                                info!(
                                    "💀 [RETENTION_REAPER]: {} expired, {} hard-purged.",
                                    expired_count, purged_count
                                );
                            }
                        }
                        Err(sweep_fault) => {
                            error!("❌ [RETENTION_REAPER]: Sweep collapsed: {}", sweep_fault);
                        }
                    }
                }
                _ = shutdown_signal.changed() => {
                    info!("🛑 [RETENTION_REAPER]: Cooperative shutdown acknowledged.");
                    break;
                }
            }
        }
    });
}
