// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN CONTRACT HUB (V6.0 - CONTROL PLANE ALIGNED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CONTRATOS SERDE, PUERTOS Y SEÑALES DE PLATAFORMA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. STRICT SCHEMAS: Cada evento de frontera se deserializa contra un
 *    struct tipado; los campos faltantes colapsan el parseo (fail closed).
 * 2. PORT SOVEREIGNTY: Los colaboradores externos (procesador de pagos,
 *    object store, sink de notificaciones, agente de nodo) se alcanzan
 *    únicamente a través de traits angostos definidos aquí.
 * 3. EVENT DECOUPLING: Las señales one-shot (BalanceExhausted, NodeLost)
 *    viajan por el bus tipado, erradicando callbacks y ciclos de
 *    referencia entre registry y orquestador de recuperación.
 * =================================================================
 */

pub mod credential;
pub mod deletion;
pub mod events;
pub mod fleet;
pub mod ledger;
pub mod metering;
pub mod ports;
pub mod snapshot;

pub use events::PlatformEvent;
pub use ports::{NodeAgentRpc, NotificationSink, ObjectStore, PaymentProcessor, PortError};
