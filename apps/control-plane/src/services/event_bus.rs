// [apps/control-plane/src/services/event_bus.rs]
/*!
 * =================================================================
 * APARATO: PLATFORM EVENT BUS SERVICE (V7.2 - ONE-SHOT BROADCASTER)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DIFUSIÓN SOBERANA DE SEÑALES ONE-SHOT
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CALLBACK ERADICATION: onBalanceExhausted deja de ser un callback
 *    inyectado; la compuerta publica la señal exactamente una vez por
 *    cruce y los suscriptores se registran en la ignición.
 * 2. CYCLE BREAKING: El watchdog publica NodeLost; el orquestador de
 *    recuperación se suscribe. Ninguno referencia al otro.
 * 3. DISPATCH MONITORING: Analiza el conteo de suscriptores en cada
 *    ráfaga para detectar estados de 'Ceguera de Mando'.
 *
 * # Mathematical Proof (Signal Propagation):
 * El bus garantiza un tiempo de despacho O(1) independiente del número
 * de receptores. La pérdida de un suscriptor no afecta el determinismo
 * del reactor asíncrono principal (Lock-Free Emission).
 * =================================================================
 */

use hive_domain_models::fleet::{RecoveryEventStatus, RecoveryTrigger};
use hive_domain_models::PlatformEvent;
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};

/// Capacidad del canal de difusión soberano.
/// Sintonizado para absorber ráfagas masivas sin disparar 'Lagging'.
const SOVEREIGN_CHANNEL_CAPACITY: usize = 4096;

/**
 * Orquestador central de señales de plataforma (el sistema nervioso).
 */
#[derive(Debug, Clone)]
pub struct EventBus {
    /// Canal de transmisión central (multi-productor, multi-consumidor).
    internal_transmission_channel: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /**
     * Forja una nueva instancia del bus con buffer endurecido.
     */
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SOVEREIGN_CHANNEL_CAPACITY);
        Self { internal_transmission_channel: sender }
    }

    /**
     * Genera un nuevo receptor para suscriptores de ignición.
     */
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.internal_transmission_channel.subscribe()
    }

    // --- ESTRATO DE SEÑALES FINANCIERAS ---

    /**
     * Notifica el cruce de balance positivo a <= 0 de un tenant.
     * Emitida exactamente una vez por cruce (lo decide la compuerta).
     */
    pub fn publish_balance_exhausted(&self, tenant_identifier: &str, balance_cents: i64) {
        warn!(
            "💸 [EVENT_BUS]: Tenant {} crossed into exhausted balance ({}c).",
            tenant_identifier, balance_cents
        );
        self.dispatch_event_sovereign(PlatformEvent::BalanceExhausted {
            tenant_id: tenant_identifier.to_string(),
            balance_cents,
        });
    }

    // --- ESTRATO DE SEÑALES DE FLOTA ---

    /// Señal de pérdida de nodo detectada por el watchdog o el operador.
    pub fn publish_node_lost(&self, node_identifier: &str, trigger: RecoveryTrigger) {
        warn!(
            "💀 [EVENT_BUS]: Node {} declared lost (trigger: {}).",
            node_identifier,
            trigger.as_str()
        );
        self.dispatch_event_sovereign(PlatformEvent::NodeLost {
            node_id: node_identifier.to_string(),
            trigger,
        });
    }

    /// Conclusión (terminal) de un evento de recuperación.
    pub fn publish_recovery_concluded(
        &self,
        event_identifier: &str,
        node_identifier: &str,
        status: RecoveryEventStatus,
    ) {
        info!(
            "🩺 [EVENT_BUS]: Recovery {} for node {} concluded as {}.",
            event_identifier,
            node_identifier,
            status.as_str()
        );
        self.dispatch_event_sovereign(PlatformEvent::RecoveryConcluded {
            event_id: event_identifier.to_string(),
            node_id: node_identifier.to_string(),
            status,
        });
    }

    // --- ESTRATO DE SEÑALES DE RESPALDOS ---

    pub fn publish_snapshot_expired(&self, snapshot_identifier: &str, tenant_identifier: &str) {
        self.dispatch_event_sovereign(PlatformEvent::SnapshotExpired {
            snapshot_id: snapshot_identifier.to_string(),
            tenant_id: tenant_identifier.to_string(),
        });
    }

    // --- ESTRATO DE DESPACHO INTERNO (PROPIOCEPCIÓN) ---

    /**
     * Motor interno de despacho con auditoría de congestión.
     *
     * # Errors:
     * Sin suscriptores activos, el mensaje se descarta silenciosamente.
     * Si el canal colapsa, registra el fallo en el log del sistema.
     */
    fn dispatch_event_sovereign(&self, event_artifact: PlatformEvent) {
        match self.internal_transmission_channel.send(event_artifact) {
            Ok(subscriber_count) => {
                if subscriber_count == 0 {
                    trace!("💤 [EVENT_BUS]: Signal discarded. No active neural links.");
                } else {
                    trace!("📡 [EVENT_BUS]: Signal broadcasted to {} active links.", subscriber_count);
                }
            }
            Err(_) => {
                error!("💀 [EVENT_BUS_FATAL]: Internal transmission channel collapsed.");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
