// [libs/domain/models/src/ports.rs]
/*!
 * =================================================================
 * APARATO: COLLABORATOR PORT CONTRACTS (V3.0 - NARROW SEAMS)
 * CLASIFICACIÓN: DOMAIN BOUNDARY (ESTRATO L2)
 * RESPONSABILIDAD: TRAITS ANGOSTOS HACIA LOS COLABORADORES EXTERNOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. VENDOR AGNOSTIC: El núcleo jamás depende de un SDK concreto; el
 *    host inyecta implementaciones de estos puertos en la ignición.
 * 2. EXPLICIT GRAPH: Sin bolsas de dependencias duck-typed; un campo
 *    por capacidad, Option<T> solo donde la capacidad es genuinamente
 *    opcional.
 * 3. BOUNDED CALLS: Toda llamada saliente porta timeout acotado en el
 *    adaptador; la cancelación del request se propaga por el drop del
 *    futuro.
 * =================================================================
 */

use async_trait::async_trait;
use hive_core_credits::CreditAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Superficie de error opaca de los colaboradores externos.
#[derive(Error, Debug)]
pub enum PortError {
    /// El servicio externo respondió 5xx o equivalente (retry con backoff).
    #[error("[L2_PORT_FAULT]: EXTERNAL_SERVICE_FAILURE -> {0}")]
    ExternalServiceFailure(String),

    /// El servicio rechazó la operación de forma definitiva.
    #[error("[L2_PORT_FAULT]: OPERATION_REJECTED -> {0}")]
    Rejected(String),

    /// El recurso remoto no existe.
    #[error("[L2_PORT_FAULT]: REMOTE_NOT_FOUND")]
    NotFound,

    /// La llamada excedió su deadline acotado.
    #[error("[L2_PORT_FAULT]: DEADLINE_EXCEEDED")]
    Timeout,
}

// --- ESTRATO DE PAGOS ---

/// Sesión de checkout forjada por el procesador para redirigir al tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionHandle {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodSummary {
    pub method_id: String,
    pub display_label: String,
    pub is_default: bool,
}

/// Recibo de un cargo directo (auto-topup programado).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorChargeReceipt {
    /// Llave de idempotencia que el webhook del procesador replicará.
    pub reference_id: String,
    pub amount_cents: i64,
}

/**
 * Puerto hacia el procesador de pagos externo.
 *
 * La verificación de firma y la proyección canónica del webhook viven en
 * el núcleo (hive-domain-payments); este puerto solo transporta las
 * operaciones que requieren la red del procesador.
 */
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        tenant_id: &str,
        amount: CreditAmount,
    ) -> Result<CheckoutSessionHandle, PortError>;

    async fn create_portal_session(&self, tenant_id: &str) -> Result<String, PortError>;

    async fn setup_payment_method(&self, tenant_id: &str) -> Result<String, PortError>;

    async fn list_payment_methods(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PortError>;

    /// Cargo directo contra el método de pago guardado del tenant.
    async fn charge(
        &self,
        tenant_id: &str,
        amount: CreditAmount,
        reason: &str,
    ) -> Result<ProcessorChargeReceipt, PortError>;

    /// Borrado best-effort del cliente en el procesador (purga de tenant).
    async fn delete_customer(&self, processor_customer_id: &str) -> Result<(), PortError>;
}

// --- ESTRATO DE ALMACENAMIENTO DE OBJETOS ---

/**
 * Puerto hacia el object store de respaldos. Superficie de error opaca;
 * las filas relacionales son la autoridad de existencia, el store es
 * eventualmente consistente.
 */
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, content: Vec<u8>) -> Result<(), PortError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, PortError>;

    async fn remove(&self, path: &str) -> Result<(), PortError>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PortError>;
}

// --- ESTRATO DE NOTIFICACIONES ---

/**
 * Puerto hacia el despachador de correo/plantillas. La deduplicación
 * (tenant, template, fecha) la impone la cola de notificaciones del
 * núcleo, no el sink.
 */
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        template_name: &str,
        tenant_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), PortError>;
}

// --- ESTRATO DE AGENTE DE NODO ---

/// Comando nombrado del canal RPC angosto hacia un agente de nodo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeCommand {
    /// `stats.get`: telemetría de carga del nodo.
    StatsGet,
    /// `restore.begin`: restaurar el contenedor de un tenant desde un respaldo.
    RestoreBegin { tenant_id: String, backup_key: String },
    /// `drain.step`: exportar y detener el contenedor de un tenant.
    DrainStep { tenant_id: String },
    /// `export.begin`: exportar el estado del contenedor sin detenerlo.
    ExportBegin { tenant_id: String },
    /// `container.stop`: detener el contenedor de un tenant.
    ContainerStop { tenant_id: String },
    /// `container.start`: arrancar el contenedor de un tenant.
    ContainerStart { tenant_id: String },
}

impl NodeCommand {
    /// Nombre de cable del comando.
    pub fn wire_name(&self) -> &'static str {
        match self {
            NodeCommand::StatsGet => "stats.get",
            NodeCommand::RestoreBegin { .. } => "restore.begin",
            NodeCommand::DrainStep { .. } => "drain.step",
            NodeCommand::ExportBegin { .. } => "export.begin",
            NodeCommand::ContainerStop { .. } => "container.stop",
            NodeCommand::ContainerStart { .. } => "container.start",
        }
    }

    /// Payload JSON que acompaña al comando en el canal.
    pub fn wire_payload(&self) -> serde_json::Value {
        match self {
            NodeCommand::StatsGet => serde_json::json!({}),
            NodeCommand::RestoreBegin { tenant_id, backup_key } => serde_json::json!({
                "tenant_id": tenant_id,
                "backup_key": backup_key,
            }),
            NodeCommand::DrainStep { tenant_id }
            | NodeCommand::ExportBegin { tenant_id }
            | NodeCommand::ContainerStop { tenant_id }
            | NodeCommand::ContainerStart { tenant_id } => serde_json::json!({
                "tenant_id": tenant_id,
            }),
        }
    }
}

/**
 * Puerto de RPC request/response hacia los agentes de nodo. El plano de
 * control lo usa para drenaje, migración y recuperación.
 */
#[async_trait]
pub trait NodeAgentRpc: Send + Sync {
    async fn execute(
        &self,
        node_id: &str,
        command: NodeCommand,
    ) -> Result<serde_json::Value, PortError>;
}
