// [libs/infra/node-agent/src/lib.rs]
/*!
 * =================================================================
 * APARATO: NODE AGENT UPLINK HUB (V4.0 - GOLD MASTER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DEL CLIENTE RPC DE AGENTES
 * =================================================================
 */

pub mod client;
pub mod errors;

pub use client::NodeAgentHttpClient;
pub use errors::AgentClientError;
