// [libs/domain/models/src/events.rs]
/*!
 * =================================================================
 * APARATO: PLATFORM SIGNAL CONTRACT (V2.0 - ONE-SHOT ALIGNED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: SEÑALES TIPADAS DEL BUS DE EVENTOS IN-PROCESS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CALLBACK ERADICATION: onBalanceExhausted y onNodeLost dejan de ser
 *    callbacks inyectados; son señales publicadas una sola vez por el
 *    productor y consumidas por suscriptores registrados en la ignición.
 * 2. CYCLE BREAKING: El registry de nodos publica NodeLost; el
 *    orquestador de recuperación se suscribe. Ninguno conoce al otro.
 * =================================================================
 */

use crate::fleet::{RecoveryEventStatus, RecoveryTrigger};
use serde::{Deserialize, Serialize};

/// Señal de difusión interna del plano de control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlatformEvent {
    /// El balance de un tenant cruzó de positivo a <= 0. Emitida
    /// exactamente una vez por cruce (no por signo absoluto).
    BalanceExhausted {
        tenant_id: String,
        balance_cents: i64,
    },

    /// Un nodo dejó de emitir latidos o fue marcado perdido manualmente.
    NodeLost {
        node_id: String,
        trigger: RecoveryTrigger,
    },

    /// Un evento de recuperación alcanzó un estado terminal.
    RecoveryConcluded {
        event_id: String,
        node_id: String,
        status: RecoveryEventStatus,
    },

    /// La barrida de retención borró (blando) un respaldo expirado.
    SnapshotExpired {
        snapshot_id: String,
        tenant_id: String,
    },
}
