// [libs/domain/models/src/snapshot.rs]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Naturaleza del respaldo según su disparador de ciclo de vida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotKind {
    Nightly,
    OnDemand,
    PreRestore,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Nightly => "nightly",
            SnapshotKind::OnDemand => "on-demand",
            SnapshotKind::PreRestore => "pre-restore",
        }
    }

    pub fn parse(label: &str) -> Option<SnapshotKind> {
        match label {
            "nightly" => Some(SnapshotKind::Nightly),
            "on-demand" => Some(SnapshotKind::OnDemand),
            "pre-restore" => Some(SnapshotKind::PreRestore),
            _ => None,
        }
    }
}

/// Origen de la orden de creación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
    Manual,
    Scheduled,
    PreUpdate,
}

impl SnapshotTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotTrigger::Manual => "manual",
            SnapshotTrigger::Scheduled => "scheduled",
            SnapshotTrigger::PreUpdate => "pre_update",
        }
    }

    pub fn parse(label: &str) -> Option<SnapshotTrigger> {
        match label {
            "manual" => Some(SnapshotTrigger::Manual),
            "scheduled" => Some(SnapshotTrigger::Scheduled),
            "pre_update" => Some(SnapshotTrigger::PreUpdate),
            _ => None,
        }
    }
}

/// Fila del registro de respaldos direccionados por contenido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "snapshot_identifier")]
    pub id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    #[serde(rename = "instance_identifier")]
    pub instance_id: String,

    #[serde(rename = "requesting_user_identifier")]
    pub user_id: String,

    pub name: Option<String>,

    pub kind: SnapshotKind,

    pub size_bytes: i64,

    /// Nodo de origen al momento de la captura.
    pub node_id: Option<String>,

    pub trigger: SnapshotTrigger,

    /// Plugins activos capturados con el estado.
    pub plugins: Vec<String>,

    /// Hash SHA-256 de la configuración capturada.
    pub config_hash: String,

    /// Ruta opaca del contenido (local y/o llave del object store).
    pub storage_path: String,

    #[serde(rename = "created_at_utc")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "expires_at_utc")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Borrado blando; la purga dura elimina la fila.
    #[serde(rename = "deleted_at_utc")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SnapshotRecord {
    /// Un respaldo visible es aquel que no ha sido borrado (blando o duro).
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Nivel de suscripción del tenant; gobierna retención y cuotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    Free,
    Pro,
    Scale,
}

impl TenantTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantTier::Free => "free",
            TenantTier::Pro => "pro",
            TenantTier::Scale => "scale",
        }
    }

    pub fn parse(label: &str) -> Option<TenantTier> {
        match label {
            "free" => Some(TenantTier::Free),
            "pro" => Some(TenantTier::Pro),
            "scale" => Some(TenantTier::Scale),
            _ => None,
        }
    }

    /// Máximo de respaldos no-borrados retenidos por instancia.
    #[must_use]
    pub fn snapshot_max_count(&self) -> u32 {
        match self {
            TenantTier::Free => 3,
            TenantTier::Pro => 10,
            TenantTier::Scale => 30,
        }
    }

    /// Días de vida de un respaldo antes de expirar.
    #[must_use]
    pub fn snapshot_retention_days(&self) -> i64 {
        match self {
            TenantTier::Free => 7,
            TenantTier::Pro => 30,
            TenantTier::Scale => 90,
        }
    }

    /// Cuota de respaldos on-demand simultáneos por tenant.
    #[must_use]
    pub fn on_demand_snapshot_quota(&self) -> u32 {
        match self {
            TenantTier::Free => 5,
            TenantTier::Pro => 25,
            TenantTier::Scale => 100,
        }
    }
}
