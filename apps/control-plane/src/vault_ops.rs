// [apps/control-plane/src/vault_ops.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL VAULT OPERATIONS (V7.2 - AUDIT TRAILED)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: CRUD CIFRADO DE LLAVES DE PROVEEDOR CON ROTACIÓN
 *
 * Toda operación mutante emite una entrada de auditoría. El texto plano
 * solo existe en memoria durante el cifrado/descifrado; los listados
 * jamás incluyen ciphertext.
 * =================================================================
 */

use crate::state::AppState;
use chrono::Utc;
use hive_core_vault::VaultError;
use hive_domain_models::credential::{CredentialAuthType, CredentialRecord, CredentialSummary};
use hive_infra_db::DbError;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum VaultOpsFault {
    /// La credencial solicitada no existe.
    #[error("[L4_VAULT_FAULT]: CREDENTIAL_NOT_FOUND")]
    NotFound,

    #[error(transparent)]
    Crypto(#[from] VaultError),

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Orden de alta de una credencial de proveedor.
#[derive(Debug, Clone)]
pub struct CredentialCreateRequest {
    pub provider: String,
    pub key_name: String,
    /// Material en texto plano; solo vive hasta el cifrado.
    pub plain_value: String,
    pub auth_type: CredentialAuthType,
    pub auth_header: Option<String>,
    pub created_by: String,
}

pub struct CredentialVaultService {
    application_state: AppState,
}

impl CredentialVaultService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /// Alta cifrada con rastro de auditoría.
    #[instrument(skip(self, request), fields(provider = %request.provider))]
    pub async fn create(
        &self,
        request: CredentialCreateRequest,
    ) -> Result<CredentialSummary, VaultOpsFault> {
        let sealed_payload = self.application_state.vault_engine.encrypt(&request.plain_value)?;

        let credential_record = CredentialRecord {
            id: Uuid::new_v4().to_string(),
            provider: request.provider.clone(),
            key_name: request.key_name.clone(),
            encrypted_value: sealed_payload,
            auth_type: request.auth_type,
            auth_header: request.auth_header,
            is_active: true,
            last_validated: None,
            created_at: Utc::now(),
            rotated_at: None,
            created_by: request.created_by.clone(),
        };

        self.application_state.credential_repository.insert(&credential_record).await?;
        self.application_state
            .audit_repository
            .record_admin_audit(
                &request.created_by,
                "credential.create",
                None,
                None,
                Some(&format!(r#"{{"provider":"{}","key":"{}"}}"#, request.provider, request.key_name)),
            )
            .await?;

        info!("🔐 [VAULT]: Credential {} sealed for provider {}.", credential_record.id, request.provider);
        Ok(CredentialSummary::from(&credential_record))
    }

    /**
     * Descifra el material de una credencial activa.
     * El plano retorna al llamador y no se persiste jamás.
     */
    #[instrument(skip(self))]
    pub async fn reveal(&self, credential_identifier: &str) -> Result<String, VaultOpsFault> {
        let credential_record = self
            .application_state
            .credential_repository
            .get(credential_identifier)
            .await?
            .ok_or(VaultOpsFault::NotFound)?;

        Ok(self.application_state.vault_engine.decrypt(&credential_record.encrypted_value)?)
    }

    /// Rotación: reemplaza el valor sellado y registra rotated_at.
    #[instrument(skip(self, replacement_plain_value))]
    pub async fn rotate(
        &self,
        credential_identifier: &str,
        replacement_plain_value: &str,
        rotated_by: &str,
    ) -> Result<(), VaultOpsFault> {
        let replacement_payload =
            self.application_state.vault_engine.encrypt(replacement_plain_value)?;

        match self
            .application_state
            .credential_repository
            .rotate(credential_identifier, &replacement_payload)
            .await
        {
            Ok(()) => {}
            Err(DbError::NotFound) => return Err(VaultOpsFault::NotFound),
            Err(storage_fault) => return Err(storage_fault.into()),
        }

        self.application_state
            .audit_repository
            .record_admin_audit(rotated_by, "credential.rotate", None, None, None)
            .await?;

        info!("🔄 [VAULT]: Credential {} rotated.", credential_identifier);
        Ok(())
    }

    /// Listado de resúmenes (sin ciphertext, por contrato).
    pub async fn list(&self) -> Result<Vec<CredentialSummary>, VaultOpsFault> {
        Ok(self.application_state.credential_repository.list_summaries().await?)
    }

    /// Desactivación con rastro de auditoría.
    #[instrument(skip(self))]
    pub async fn deactivate(
        &self,
        credential_identifier: &str,
        deactivated_by: &str,
    ) -> Result<(), VaultOpsFault> {
        match self
            .application_state
            .credential_repository
            .set_active(credential_identifier, false)
            .await
        {
            Ok(()) => {}
            Err(DbError::NotFound) => return Err(VaultOpsFault::NotFound),
            Err(storage_fault) => return Err(storage_fault.into()),
        }

        self.application_state
            .audit_repository
            .record_admin_audit(deactivated_by, "credential.deactivate", None, None, None)
            .await?;
        Ok(())
    }
}
