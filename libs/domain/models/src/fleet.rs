// [libs/domain/models/src/fleet.rs]
/*!
 * =================================================================
 * APARATO: FLEET STATE CONTRACTS (V4.2 - STATE MACHINE SEALED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: MÁQUINAS DE ESTADO DE NODOS, INSTANCIAS Y RECUPERACIÓN
 *
 * # Mathematical Proof (Monotone Lifecycles):
 * Node.status avanza active -> draining -> drained -> decommissioned sin
 * transiciones hacia atrás desde el estado terminal; cancel-drain es la
 * única arista de retorno (draining -> active). RecoveryEvent.status es
 * un semi-retículo: in_progress < {partial} < completed, y partial puede
 * re-visitarse en cada reintento hasta converger.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Ventana de gracia entre la suspensión de una instancia y su destrucción.
pub const SUSPENDED_DESTROY_AFTER_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Draining,
    Drained,
    Decommissioned,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Draining => "draining",
            NodeStatus::Drained => "drained",
            NodeStatus::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(label: &str) -> Option<NodeStatus> {
        match label {
            "active" => Some(NodeStatus::Active),
            "draining" => Some(NodeStatus::Draining),
            "drained" => Some(NodeStatus::Drained),
            "decommissioned" => Some(NodeStatus::Decommissioned),
            _ => None,
        }
    }

    /// Aristas válidas de la máquina de estados del nodo.
    #[must_use]
    pub fn can_transition_to(&self, target: NodeStatus) -> bool {
        matches!(
            (self, target),
            (NodeStatus::Active, NodeStatus::Draining)
                | (NodeStatus::Draining, NodeStatus::Drained)
                | (NodeStatus::Draining, NodeStatus::Active) // cancel-drain
                | (NodeStatus::Drained, NodeStatus::Decommissioned)
        )
    }
}

/// Fila del registro de nodos trabajadores de la flota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "node_identifier")]
    pub id: String,

    pub status: NodeStatus,

    /// Progreso del drenaje para el sondeo del panel de administración.
    pub drain_status: Option<String>,
    pub drain_migrated: Option<u32>,
    pub drain_total: Option<u32>,

    #[serde(rename = "last_heartbeat_at_utc")]
    pub last_heartbeat_at: DateTime<Utc>,

    #[serde(rename = "updated_at_utc")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingState {
    Active,
    Suspended,
    Destroyed,
}

impl BillingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingState::Active => "active",
            BillingState::Suspended => "suspended",
            BillingState::Destroyed => "destroyed",
        }
    }

    pub fn parse(label: &str) -> Option<BillingState> {
        match label {
            "active" => Some(BillingState::Active),
            "suspended" => Some(BillingState::Suspended),
            "destroyed" => Some(BillingState::Destroyed),
            _ => None,
        }
    }
}

/// Instancia de bot hospedada; su nodo puede estar transitoriamente ausente
/// durante una recuperación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInstance {
    #[serde(rename = "instance_identifier")]
    pub id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    pub node_id: Option<String>,

    pub billing_state: BillingState,

    #[serde(rename = "suspended_at_utc")]
    pub suspended_at: Option<DateTime<Utc>>,

    /// Fecha límite de destrucción fijada al suspender (now + 30 días).
    #[serde(rename = "destroy_after_utc")]
    pub destroy_after: Option<DateTime<Utc>>,

    #[serde(rename = "created_at_utc")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updated_at_utc")]
    pub updated_at: DateTime<Utc>,
}

impl BotInstance {
    /**
     * Transición monótona active -> suspended.
     * Fija la ventana de destrucción diferida.
     */
    pub fn suspend(&mut self, at: DateTime<Utc>) -> bool {
        if self.billing_state != BillingState::Active {
            return false;
        }
        self.billing_state = BillingState::Suspended;
        self.suspended_at = Some(at);
        self.destroy_after = Some(at + Duration::days(SUSPENDED_DESTROY_AFTER_DAYS));
        self.updated_at = at;
        true
    }

    /// Transición suspended -> active; limpia la ventana de destrucción.
    pub fn resume(&mut self, at: DateTime<Utc>) -> bool {
        if self.billing_state != BillingState::Suspended {
            return false;
        }
        self.billing_state = BillingState::Active;
        self.suspended_at = None;
        self.destroy_after = None;
        self.updated_at = at;
        true
    }

    /// Transición terminal: cualquier estado -> destroyed.
    pub fn destroy(&mut self, at: DateTime<Utc>) {
        self.billing_state = BillingState::Destroyed;
        self.updated_at = at;
    }
}

// --- ESTRATO DE RECUPERACIÓN ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTrigger {
    HeartbeatTimeout,
    Manual,
}

impl RecoveryTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTrigger::HeartbeatTimeout => "heartbeat_timeout",
            RecoveryTrigger::Manual => "manual",
        }
    }

    pub fn parse(label: &str) -> Option<RecoveryTrigger> {
        match label {
            "heartbeat_timeout" => Some(RecoveryTrigger::HeartbeatTimeout),
            "manual" => Some(RecoveryTrigger::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryEventStatus {
    InProgress,
    Completed,
    Partial,
}

impl RecoveryEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryEventStatus::InProgress => "in_progress",
            RecoveryEventStatus::Completed => "completed",
            RecoveryEventStatus::Partial => "partial",
        }
    }

    pub fn parse(label: &str) -> Option<RecoveryEventStatus> {
        match label {
            "in_progress" => Some(RecoveryEventStatus::InProgress),
            "completed" => Some(RecoveryEventStatus::Completed),
            "partial" => Some(RecoveryEventStatus::Partial),
            _ => None,
        }
    }
}

/// Unidad de contabilidad de una respuesta a pérdida de nodo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryEvent {
    #[serde(rename = "event_identifier")]
    pub id: String,

    #[serde(rename = "node_identifier")]
    pub node_id: String,

    pub trigger: RecoveryTrigger,

    pub status: RecoveryEventStatus,

    pub tenants_total: u32,
    pub tenants_recovered: u32,
    pub tenants_failed: u32,
    pub tenants_waiting: u32,

    #[serde(rename = "started_at_utc")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "completed_at_utc")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Reporte forense serializado para el panel de administración.
    pub report_json: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryItemStatus {
    Recovered,
    Failed,
    Skipped,
    Waiting,
    Retried,
}

impl RecoveryItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryItemStatus::Recovered => "recovered",
            RecoveryItemStatus::Failed => "failed",
            RecoveryItemStatus::Skipped => "skipped",
            RecoveryItemStatus::Waiting => "waiting",
            RecoveryItemStatus::Retried => "retried",
        }
    }

    pub fn parse(label: &str) -> Option<RecoveryItemStatus> {
        match label {
            "recovered" => Some(RecoveryItemStatus::Recovered),
            "failed" => Some(RecoveryItemStatus::Failed),
            "skipped" => Some(RecoveryItemStatus::Skipped),
            "waiting" => Some(RecoveryItemStatus::Waiting),
            "retried" => Some(RecoveryItemStatus::Retried),
            _ => None,
        }
    }
}

/// Desenlace por-tenant dentro de un evento de recuperación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryItem {
    #[serde(rename = "item_identifier")]
    pub id: String,

    #[serde(rename = "event_identifier")]
    pub event_id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    pub source_node: String,
    pub target_node: Option<String>,

    /// Llave del respaldo usable más reciente empleada en la restauración.
    pub backup_key: Option<String>,

    pub status: RecoveryItemStatus,

    pub reason: Option<String>,
}
