// [libs/infra/db/src/repositories/audit.rs]
/*!
 * =================================================================
 * APARATO: AUDIT TRAIL REPOSITORY (V8.1 - ANONYMIZATION AWARE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RASTROS DE AUDITORÍA DE TENANT Y ADMINISTRACIÓN
 *
 * El rastro de administración se retiene por obligación regulatoria:
 * la purga de un tenant lo ANONIMIZA in-place (campos objetivo
 * reemplazados por el literal "[deleted]"), jamás lo elimina.
 * =================================================================
 */

use crate::errors::DbError;
use crate::LedgerDbClient;
use chrono::Utc;
use libsql::params;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Literal de anonimización regulatoria.
pub const ANONYMIZED_PLACEHOLDER: &str = "[deleted]";

pub struct AuditRepository {
    database_client: LedgerDbClient,
}

impl AuditRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /// Rastro visible para el propio tenant.
    #[instrument(skip(self, detail_json))]
    pub async fn record_tenant_audit(
        &self,
        tenant_identifier: &str,
        action: &str,
        detail_json: Option<&str>,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO tenant_audit_log (id, tenant_id, action, detail_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    tenant_identifier,
                    action,
                    detail_json.map(str::to_string),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Rastro del panel de administración.
    #[instrument(skip(self, detail_json))]
    pub async fn record_admin_audit(
        &self,
        actor: &str,
        action: &str,
        target_tenant: Option<&str>,
        target_user: Option<&str>,
        detail_json: Option<&str>,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO admin_audit_log (id, actor, action, target_tenant, target_user, detail_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    actor,
                    action,
                    target_tenant.map(str::to_string),
                    target_user.map(str::to_string),
                    detail_json.map(str::to_string),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /**
     * Anonimización regulatoria del rastro de administración: los campos
     * objetivo que apuntaban al tenant purgado se reemplazan in-place.
     *
     * @returns Cantidad de filas anonimizadas.
     */
    #[instrument(skip(self))]
    pub async fn anonymize_admin_audit(&self, tenant_identifier: &str) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;

        let tenant_rows = database_connection
            .execute(
                "UPDATE admin_audit_log SET target_tenant = ?2 WHERE target_tenant = ?1",
                params![tenant_identifier, ANONYMIZED_PLACEHOLDER],
            )
            .await?;

        // En modo single-user el identificador de usuario ES el tenant.
        let user_rows = database_connection
            .execute(
                "UPDATE admin_audit_log SET target_user = ?2 WHERE target_user = ?1",
                params![tenant_identifier, ANONYMIZED_PLACEHOLDER],
            )
            .await?;

        let anonymized_total = tenant_rows + user_rows;
        debug!(
            "🕶️  [AUDIT_TRAIL]: {} admin audit fields anonymized for purged tenant.",
            anonymized_total
        );
        Ok(anonymized_total)
    }

    /// Nota interna de administración sobre un tenant.
    pub async fn record_admin_note(
        &self,
        tenant_identifier: &str,
        note_text: &str,
        created_by: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO admin_notes (id, tenant_id, note_text, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    tenant_identifier,
                    note_text,
                    created_by,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }
}
