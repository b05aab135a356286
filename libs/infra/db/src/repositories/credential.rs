// [libs/infra/db/src/repositories/credential.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL VAULT REPOSITORY (V8.1 - ZERO PLAINTEXT)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE LLAVES DE PROVEEDOR CIFRADAS
 *
 * El texto plano jamás toca este aparato: las filas transportan el
 * payload {iv, authTag, ciphertext} sellado por el motor de la bóveda y
 * los listados exponen únicamente resúmenes sin ciphertext.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::ledger::parse_rfc3339;
use crate::LedgerDbClient;
use chrono::Utc;
use hive_core_vault::EncryptedCredentialPayload;
use hive_domain_models::credential::{CredentialAuthType, CredentialRecord, CredentialSummary};
use libsql::{params, Row};
use tracing::{debug, instrument};

pub struct CredentialRepository {
    database_client: LedgerDbClient,
}

impl CredentialRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, record), fields(credential = %record.id))]
    pub async fn insert(&self, record: &CredentialRecord) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let encrypted_value_json = serde_json::to_string(&record.encrypted_value)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        database_connection
            .execute(
                r#"
                INSERT INTO credentials (
                    id, provider, key_name, encrypted_value_json, auth_type,
                    auth_header, is_active, last_validated, created_at,
                    rotated_at, created_by
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    record.id.clone(),
                    record.provider.clone(),
                    record.key_name.clone(),
                    encrypted_value_json,
                    record.auth_type.as_str(),
                    record.auth_header.clone(),
                    if record.is_active { 1i64 } else { 0i64 },
                    record.last_validated.map(|instant| instant.to_rfc3339()),
                    record.created_at.to_rfc3339(),
                    record.rotated_at.map(|instant| instant.to_rfc3339()),
                    record.created_by.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, credential_identifier: &str) -> Result<Option<CredentialRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut credential_rows = database_connection
            .query(
                &format!("{CREDENTIAL_PROJECTION} WHERE id = ?1"),
                params![credential_identifier],
            )
            .await?;

        match credential_rows.next().await? {
            Some(credential_row) => Ok(Some(map_credential_row(&credential_row)?)),
            None => Ok(None),
        }
    }

    /// Listado sin ciphertext (contrato de resumen de la bóveda).
    #[instrument(skip(self))]
    pub async fn list_summaries(&self) -> Result<Vec<CredentialSummary>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut credential_rows = database_connection
            .query(&format!("{CREDENTIAL_PROJECTION} ORDER BY provider ASC, key_name ASC"), ())
            .await?;

        let mut summaries = Vec::new();
        while let Some(credential_row) = credential_rows.next().await? {
            let full_record = map_credential_row(&credential_row)?;
            summaries.push(CredentialSummary::from(&full_record));
        }
        Ok(summaries)
    }

    /**
     * Rotación: reemplaza el valor cifrado y sella rotated_at.
     */
    #[instrument(skip(self, replacement_payload))]
    pub async fn rotate(
        &self,
        credential_identifier: &str,
        replacement_payload: &EncryptedCredentialPayload,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let encrypted_value_json = serde_json::to_string(replacement_payload)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        let affected_rows = database_connection
            .execute(
                "UPDATE credentials SET encrypted_value_json = ?2, rotated_at = ?3 WHERE id = ?1",
                params![credential_identifier, encrypted_value_json, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected_rows == 0 {
            return Err(DbError::NotFound);
        }

        debug!("🔐 [VAULT_LEDGER]: Credential {} rotated.", credential_identifier);
        Ok(())
    }

    pub async fn set_active(
        &self,
        credential_identifier: &str,
        is_active: bool,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute(
                "UPDATE credentials SET is_active = ?2 WHERE id = ?1",
                params![credential_identifier, if is_active { 1i64 } else { 0i64 }],
            )
            .await?;

        if affected_rows == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn mark_validated(&self, credential_identifier: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE credentials SET last_validated = ?2 WHERE id = ?1",
                params![credential_identifier, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, credential_identifier: &str) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute("DELETE FROM credentials WHERE id = ?1", params![credential_identifier])
            .await?;
        Ok(affected_rows > 0)
    }
}

const CREDENTIAL_PROJECTION: &str = r#"
    SELECT id, provider, key_name, encrypted_value_json, auth_type,
           auth_header, is_active, last_validated, created_at, rotated_at,
           created_by
    FROM credentials
"#;

fn map_credential_row(credential_row: &Row) -> Result<CredentialRecord, DbError> {
    let encrypted_value_json: String = credential_row.get(3)?;
    let auth_type_label: String = credential_row.get(4)?;

    // Un payload que no decodifica a {iv, authTag, ciphertext} es
    // corrupción de datos: se rechaza, jamás se interpreta parcialmente.
    let encrypted_value: EncryptedCredentialPayload = serde_json::from_str(&encrypted_value_json)
        .map_err(|fault| DbError::MappingError(format!("ENCRYPTED_PAYLOAD_DRIFT: {fault}")))?;

    Ok(CredentialRecord {
        id: credential_row.get(0)?,
        provider: credential_row.get(1)?,
        key_name: credential_row.get(2)?,
        encrypted_value,
        auth_type: CredentialAuthType::parse(&auth_type_label)
            .ok_or_else(|| DbError::MappingError(format!("AUTH_TYPE_DRIFT: {auth_type_label}")))?,
        auth_header: credential_row.get::<Option<String>>(5)?,
        is_active: credential_row.get::<i64>(6)? != 0,
        last_validated: credential_row
            .get::<Option<String>>(7)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
        created_at: parse_rfc3339(&credential_row.get::<String>(8)?)?,
        rotated_at: credential_row
            .get::<Option<String>>(9)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
        created_by: credential_row.get(10)?,
    })
}
