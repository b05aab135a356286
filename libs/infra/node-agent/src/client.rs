// [libs/infra/node-agent/src/client.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN NODE AGENT UPLINK (V4.2 - DEADLINE BOUNDED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: TRANSPORTE HTTP DEL CANAL RPC HACIA LOS AGENTES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. BOUNDED DEADLINES: Conexión <= 5s, deadline total 30s; la
 *    cancelación del request se propaga al descartar el futuro.
 * 2. NAMED COMMANDS: El canal transporta (comando, payload) nominales
 *    (stats.get, restore.begin, drain.step); el agente resuelve la
 *    semántica de contenedores localmente.
 * 3. NOMINAL PURITY: Nomenclatura nominal absoluta.
 * =================================================================
 */

use crate::errors::AgentClientError;
use async_trait::async_trait;
use hive_domain_models::ports::{NodeAgentRpc, NodeCommand, PortError};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Deadline de conexión TCP/TLS con el agente.
const AGENT_CONNECT_TIMEOUT_SECONDS: u64 = 5;

/// Deadline total de un comando (incluye exportaciones de contenedor).
const AGENT_COMMAND_DEADLINE_SECONDS: u64 = 30;

pub struct NodeAgentHttpClient {
    network_session_client: Client,
    /// Plantilla de endpoint: "{base}/{node_id}/rpc".
    agent_base_endpoint: String,
}

impl NodeAgentHttpClient {
    /**
     * Inicializa el cliente de red con seguridad de cabeceras.
     *
     * @param base_url Endpoint raíz de la malla de agentes.
     * @param secret_token Token maestro para el handshake táctico.
     */
    pub fn new(base_url: String, secret_token: String) -> Result<Self, AgentClientError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        if let Ok(auth_value) =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", secret_token))
        {
            header_map.insert(reqwest::header::AUTHORIZATION, auth_value);
        }

        let network_session_client = Client::builder()
            .default_headers(header_map)
            .user_agent("Hive-Control-Plane/V4")
            .connect_timeout(Duration::from_secs(AGENT_CONNECT_TIMEOUT_SECONDS))
            .timeout(Duration::from_secs(AGENT_COMMAND_DEADLINE_SECONDS))
            .build()?;

        Ok(Self {
            network_session_client,
            agent_base_endpoint: base_url.trim_end_matches('/').to_string(),
        })
    }

    /**
     * Despacha un comando nombrado al agente del nodo.
     *
     * # Errors:
     * - `AgentClientError::TransportFault`: enlace físico interrumpido o
     *   deadline excedido.
     * - `AgentClientError::CommandRejected`: el agente respondió no-2xx.
     */
    #[instrument(skip(self, command), fields(command = command.wire_name()))]
    pub async fn dispatch_command(
        &self,
        node_identifier: &str,
        command: &NodeCommand,
    ) -> Result<serde_json::Value, AgentClientError> {
        let target_url = format!("{}/{}/rpc", self.agent_base_endpoint, node_identifier);

        let command_envelope = serde_json::json!({
            "command": command.wire_name(),
            "payload": command.wire_payload(),
        });

        let network_response = self
            .network_session_client
            .post(&target_url)
            .json(&command_envelope)
            .send()
            .await?;

        let http_status = network_response.status();
        if !http_status.is_success() {
            error!(
                "⚠️ [AGENT_UPLINK]: Node {} rejected '{}': HTTP_{}",
                node_identifier,
                command.wire_name(),
                http_status.as_u16()
            );
            return Err(AgentClientError::CommandRejected(http_status.as_u16()));
        }

        let response_payload = network_response.json::<serde_json::Value>().await?;
        debug!(
            "📡 [AGENT_UPLINK]: Node {} acknowledged '{}'.",
            node_identifier,
            command.wire_name()
        );
        Ok(response_payload)
    }
}

#[async_trait]
impl NodeAgentRpc for NodeAgentHttpClient {
    async fn execute(
        &self,
        node_id: &str,
        command: NodeCommand,
    ) -> Result<serde_json::Value, PortError> {
        self.dispatch_command(node_id, &command).await.map_err(|agent_fault| match agent_fault {
            AgentClientError::TransportFault(transport) if transport.is_timeout() => {
                PortError::Timeout
            }
            AgentClientError::TransportFault(transport) => {
                PortError::ExternalServiceFailure(transport.to_string())
            }
            AgentClientError::CommandRejected(404) => PortError::NotFound,
            AgentClientError::CommandRejected(status) => {
                PortError::Rejected(format!("HTTP_{status}"))
            }
        })
    }
}
