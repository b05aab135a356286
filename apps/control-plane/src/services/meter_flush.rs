// [apps/control-plane/src/services/meter_flush.rs]
/*!
 * =================================================================
 * APARATO: METER FLUSH DAEMON (V7.6 - RETRY BUDGETED)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: CRISTALIZACIÓN WAL -> ALMACÉN RELACIONAL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SELF-EXCLUSIVE TIMER: A lo sumo un flush en vuelo; los ticks
 *    perdidos se saltan (MissedTickBehavior::Skip) en vez de acumularse.
 * 2. OFFSET FENCE RESPECTED: La compactación usa la cerca de bytes de
 *    la instantánea; los emits concurrentes al flush sobreviven.
 * 3. RETRY BUDGET: Cada evento fallido incrementa su contador; al
 *    agotar el presupuesto (default 5) se destierra al DLQ con su
 *    metadata de fallo y sale del WAL.
 * =================================================================
 */

use crate::state::AppState;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Desenlace de un ciclo de flush (Proving Grounds y telemetría).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushCycleOutcome {
    pub events_flushed: usize,
    pub events_retained: usize,
    pub events_dead_lettered: usize,
    pub malformed_lines_skipped: u32,
}

pub struct MeterFlushService {
    application_state: AppState,
    /// Contadores de reintento por identificador de evento.
    retry_census: Mutex<HashMap<String, u32>>,
}

impl MeterFlushService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state, retry_census: Mutex::new(HashMap::new()) }
    }

    /**
     * Inicia el bucle de cristalización en el reactor de Tokio.
     * El apagado cooperativo completa la iteración en curso y salta la
     * siguiente.
     */
    pub async fn spawn_flush_daemon(self, mut shutdown_signal: watch::Receiver<bool>) {
        let flush_interval_secs = self.application_state.config.meter_flush_interval_secs;
        let mut synchronization_timer = interval(Duration::from_secs(flush_interval_secs));
        synchronization_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            info!("💾 [METER_FLUSH]: Crystallization daemon online (every {}s).", flush_interval_secs);

            loop {
                tokio::select! {
                    _ = synchronization_timer.tick() => {
                        if let Err(flush_fault) = self.flush_once().await {
                            error!("❌ [METER_FLUSH]: Cycle collapsed: {}", flush_fault);
                        }
                    }
                    _ = shutdown_signal.changed() => {
                        info!("🛑 [METER_FLUSH]: Cooperative shutdown acknowledged.");
                        break;
                    }
                }
            }
        });
    }

    /**
     * Un ciclo completo de flush; también expuesto como flush() manual.
     *
     * # Logic:
     * 1. Instantánea del WAL con cerca de bytes.
     * 2. Inserción del lote en una transacción (INSERT OR IGNORE por id).
     * 3. Éxito: compactación sin supervivientes; censo de reintentos limpio.
     * 4. Fallo: el lote entero incrementa reintentos; los agotados se
     *    destierran al DLQ y el resto sobrevive a la compactación.
     */
    #[instrument(skip(self))]
    pub async fn flush_once(&self) -> anyhow::Result<FlushCycleOutcome> {
        let wal_snapshot = self.application_state.meter_wal.snapshot_for_flush()?;

        if wal_snapshot.malformed_lines_skipped > 0 {
            warn!(
                "💀 [METER_FLUSH]: {} corrupted WAL lines skipped during recovery.",
                wal_snapshot.malformed_lines_skipped
            );
        }

        if wal_snapshot.events.is_empty() {
            // Compactación sin lote: desaloja las líneas corruptas.
            if wal_snapshot.byte_fence > 0 {
                self.application_state.meter_wal.compact(&wal_snapshot, &[])?;
            }
            return Ok(FlushCycleOutcome {
                malformed_lines_skipped: wal_snapshot.malformed_lines_skipped,
                ..Default::default()
            });
        }

        match self
            .application_state
            .meter_repository
            .insert_events_bulk(&wal_snapshot.events)
            .await
        {
            Ok(crystallized_count) => {
                self.application_state.meter_wal.compact(&wal_snapshot, &[])?;

                // Censo limpio: los ids sellados ya no acumulan reintentos.
                if let Ok(mut census_guard) = self.retry_census.lock() {
                    for flushed_event in &wal_snapshot.events {
                        census_guard.remove(&flushed_event.id);
                    }
                }

                debug!("✅ [METER_FLUSH]: {} events crystallized.", crystallized_count);
                Ok(FlushCycleOutcome {
                    events_flushed: crystallized_count,
                    malformed_lines_skipped: wal_snapshot.malformed_lines_skipped,
                    ..Default::default()
                })
            }
            Err(persistence_fault) => {
                let failure_diagnostic = persistence_fault.to_string();
                warn!("⚠️ [METER_FLUSH]: Batch rejected, applying retry budget: {}", failure_diagnostic);

                let max_retries = self.application_state.config.meter_max_flush_retries;
                let mut surviving_events = Vec::new();
                let mut dead_lettered_count = 0usize;

                for failed_event in wal_snapshot.events.iter() {
                    let exhausted_retries = {
                        let mut census_guard = self
                            .retry_census
                            .lock()
                            .map_err(|_| anyhow::anyhow!("RETRY_CENSUS_LOCK_POISONED"))?;
                        let retry_slot = census_guard.entry(failed_event.id.clone()).or_insert(0);
                        *retry_slot += 1;
                        *retry_slot
                    };

                    if exhausted_retries >= max_retries {
                        self.application_state.meter_wal.append_dead_letter(
                            failed_event.clone(),
                            &failure_diagnostic,
                            exhausted_retries,
                        )?;
                        if let Ok(mut census_guard) = self.retry_census.lock() {
                            census_guard.remove(&failed_event.id);
                        }
                        dead_lettered_count += 1;
                    } else {
                        surviving_events.push(failed_event.clone());
                    }
                }

                self.application_state.meter_wal.compact(&wal_snapshot, &surviving_events)?;

                Ok(FlushCycleOutcome {
                    events_retained: surviving_events.len(),
                    events_dead_lettered: dead_lettered_count,
                    malformed_lines_skipped: wal_snapshot.malformed_lines_skipped,
                    ..Default::default()
                })
            }
        }
    }
}
