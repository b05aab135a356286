// [apps/control-plane/src/services/fleet_watchdog.rs]
/*!
 * =================================================================
 * APARATO: FLEET HEARTBEAT WATCHDOG (V7.4 - SIGNAL DEDUPED)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: DETECCIÓN DE NODOS SILENCIOSOS Y SEÑAL NodeLost
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PUBLISH, NEVER CALL: El watchdog publica NodeLost en el bus; el
 *    orquestador de recuperación decide qué hacer. Cero acoplamiento.
 * 2. SIGNAL DEDUPLICATION: Un nodo silencioso dispara UNA señal por
 *    episodio; el censo local se limpia cuando el latido regresa.
 * 3. ACTIVE ONLY: Solo los nodos 'active' vigilados; un nodo drenado o
 *    decomisado no es una pérdida.
 * =================================================================
 */

use crate::state::AppState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hive_domain_models::fleet::RecoveryTrigger;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

pub struct FleetWatchdogService {
    application_state: AppState,
    /// Censo de nodos ya señalados en el episodio de silencio vigente.
    signaled_census: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FleetWatchdogService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state, signaled_census: Mutex::new(HashMap::new()) }
    }

    /// Inicia el bucle de vigilancia de latidos (default 10s / timeout 60s).
    pub async fn spawn_watchdog_daemon(self, mut shutdown_signal: watch::Receiver<bool>) {
        let scan_interval_secs = self.application_state.config.heartbeat_scan_interval_secs;
        let mut surveillance_timer = interval(Duration::from_secs(scan_interval_secs));
        surveillance_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            info!(
                "🐕 [WATCHDOG]: Heartbeat surveillance online (every {}s, timeout {}s).",
                scan_interval_secs, self.application_state.config.heartbeat_timeout_secs
            );

            loop {
                tokio::select! {
                    _ = surveillance_timer.tick() => {
                        if let Err(watchdog_fault) = self.tick_once().await {
                            error!("❌ [WATCHDOG]: Surveillance tick collapsed: {}", watchdog_fault);
                        }
                    }
                    _ = shutdown_signal.changed() => {
                        info!("🛑 [WATCHDOG]: Cooperative shutdown acknowledged.");
                        break;
                    }
                }
            }
        });
    }

    /**
     * Un tick de vigilancia: nodos 'active' sin latido dentro del
     * timeout disparan NodeLost (una vez por episodio de silencio).
     */
    #[instrument(skip(self))]
    pub async fn tick_once(&self) -> anyhow::Result<u32> {
        let timeout_seconds = self.application_state.config.heartbeat_timeout_secs;
        let heartbeat_cutoff = Utc::now() - ChronoDuration::seconds(timeout_seconds);

        let silent_nodes =
            self.application_state.fleet_repository.stale_active_nodes(heartbeat_cutoff).await?;

        let mut signals_fired: u32 = 0;
        for silent_node in silent_nodes {
            let already_signaled = {
                let census_guard = self
                    .signaled_census
                    .lock()
                    .map_err(|_| anyhow::anyhow!("SIGNAL_CENSUS_LOCK_POISONED"))?;
                census_guard
                    .get(&silent_node.id)
                    .is_some_and(|signaled_at| *signaled_at > silent_node.last_heartbeat_at)
            };

            if already_signaled {
                continue;
            }

            warn!(
                "💀 [WATCHDOG]: Node {} silent since {} (timeout {}s). Raising NodeLost.",
                silent_node.id, silent_node.last_heartbeat_at, timeout_seconds
            );

            self.application_state
                .event_bus
                .publish_node_lost(&silent_node.id, RecoveryTrigger::HeartbeatTimeout);

            if let Ok(mut census_guard) = self.signaled_census.lock() {
                census_guard.insert(silent_node.id.clone(), Utc::now());
            }
            signals_fired += 1;
        }

        Ok(signals_fired)
    }
}
