// [libs/domain/models/src/credential.rs]

use chrono::{DateTime, Utc};
use hive_core_vault::EncryptedCredentialPayload;
use serde::{Deserialize, Serialize};

/// Esquema de autenticación con el que se presenta la llave al proveedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialAuthType {
    Header,
    Bearer,
    Basic,
}

impl CredentialAuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialAuthType::Header => "header",
            CredentialAuthType::Bearer => "bearer",
            CredentialAuthType::Basic => "basic",
        }
    }

    pub fn parse(label: &str) -> Option<CredentialAuthType> {
        match label {
            "header" => Some(CredentialAuthType::Header),
            "bearer" => Some(CredentialAuthType::Bearer),
            "basic" => Some(CredentialAuthType::Basic),
            _ => None,
        }
    }
}

/// Fila completa de la bóveda. El texto plano jamás habita este contrato.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(rename = "credential_identifier")]
    pub id: String,

    pub provider: String,
    pub key_name: String,

    /// Valor sellado por el motor AES-256-GCM de la bóveda.
    pub encrypted_value: EncryptedCredentialPayload,

    pub auth_type: CredentialAuthType,

    /// Nombre de cabecera cuando auth_type es 'header'.
    pub auth_header: Option<String>,

    pub is_active: bool,

    #[serde(rename = "last_validated_utc")]
    pub last_validated: Option<DateTime<Utc>>,

    #[serde(rename = "created_at_utc")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "rotated_at_utc")]
    pub rotated_at: Option<DateTime<Utc>>,

    pub created_by: String,
}

/// Proyección de listado: el ciphertext jamás viaja en los resúmenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
    #[serde(rename = "credential_identifier")]
    pub id: String,
    pub provider: String,
    pub key_name: String,
    pub auth_type: CredentialAuthType,
    pub is_active: bool,
    #[serde(rename = "last_validated_utc")]
    pub last_validated: Option<DateTime<Utc>>,
    #[serde(rename = "created_at_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "rotated_at_utc")]
    pub rotated_at: Option<DateTime<Utc>>,
}

impl From<&CredentialRecord> for CredentialSummary {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            id: record.id.clone(),
            provider: record.provider.clone(),
            key_name: record.key_name.clone(),
            auth_type: record.auth_type,
            is_active: record.is_active,
            last_validated: record.last_validated,
            created_at: record.created_at,
            rotated_at: record.rotated_at,
        }
    }
}
