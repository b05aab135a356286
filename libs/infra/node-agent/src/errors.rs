// [libs/infra/node-agent/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentClientError {
    /// Fallo físico del enlace con el agente (DNS, TCP, TLS).
    #[error("[L3_AGENT_FAULT]: UPLINK_SEVERED -> {0}")]
    TransportFault(#[from] reqwest::Error),

    /// El agente rechazó el comando con un estado no exitoso.
    #[error("[L3_AGENT_FAULT]: COMMAND_REJECTED -> HTTP_{0}")]
    CommandRejected(u16),
}
