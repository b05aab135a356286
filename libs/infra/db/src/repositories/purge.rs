// [libs/infra/db/src/repositories/purge.rs]
/*!
 * =================================================================
 * APARATO: TENANT PURGE REPOSITORY (V8.2 - IDEMPOTENT SWEEP)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: BORRADO POR-ALMACÉN PARA EL EJECUTOR DE PURGA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DELIBERATELY NON-TRANSACTIONAL: Cada almacén se purga en su propia
 *    sentencia; el ejecutor tolera fallos parciales y un reintento es
 *    seguro porque borrar sobre un almacén vacío elimina cero filas.
 * 2. WHITELISTED TABLES: El par (tabla, columna) proviene de un catálogo
 *    cerrado; jamás se interpola texto arbitrario en el SQL.
 * =================================================================
 */

use crate::errors::DbError;
use crate::LedgerDbClient;
use libsql::params;
use tracing::{debug, instrument};

/// Catálogo cerrado de purga: (nombre lógico, tabla, columna de tenant).
const TENANT_SCOPED_STORES: &[(&str, &str, &str)] = &[
    ("bot_instances", "bot_instances", "tenant_id"),
    ("credit_transactions", "credit_transactions", "tenant_id"),
    ("credit_balances", "credit_balances", "tenant_id"),
    ("credit_adjustments", "credit_adjustments", "tenant_id"),
    ("meter_events", "meter_events", "tenant_id"),
    ("billing_period_summaries", "billing_period_summaries", "tenant_id"),
    ("external_usage_reports", "external_usage_reports", "tenant_id"),
    ("notification_queue", "notification_queue", "tenant_id"),
    ("notification_preferences", "notification_preferences", "tenant_id"),
    ("email_notifications", "email_notifications", "tenant_id"),
    ("tenant_audit_log", "tenant_audit_log", "tenant_id"),
    ("admin_notes", "admin_notes", "tenant_id"),
    ("snapshots", "snapshots", "tenant_id"),
    ("container_backups", "container_backups", "tenant_id"),
    ("payment_charges", "payment_charges", "tenant_id"),
    ("tenant_status", "tenant_status", "tenant_id"),
    ("processor_customers", "processor_customers", "tenant_id"),
];

pub struct PurgeRepository {
    database_client: LedgerDbClient,
}

impl PurgeRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /**
     * Borra las filas del tenant en un almacén del catálogo cerrado.
     *
     * # Errors:
     * - `DbError::ConfigurationError`: el nombre lógico no pertenece al
     *   catálogo (defensa contra interpolación).
     */
    #[instrument(skip(self))]
    pub async fn purge_store(
        &self,
        store_logical_name: &str,
        tenant_identifier: &str,
    ) -> Result<u64, DbError> {
        let (_, table_name, tenant_column) = TENANT_SCOPED_STORES
            .iter()
            .find(|(logical_name, _, _)| *logical_name == store_logical_name)
            .ok_or_else(|| {
                DbError::ConfigurationError(format!("UNKNOWN_PURGE_STORE: {store_logical_name}"))
            })?;

        let database_connection = self.database_client.get_connection()?;
        let deleted_rows = database_connection
            .execute(
                &format!("DELETE FROM {table_name} WHERE {tenant_column} = ?1"),
                params![tenant_identifier],
            )
            .await?;

        debug!(
            "🧹 [PURGE]: {} rows removed from '{}' for tenant {}.",
            deleted_rows, store_logical_name, tenant_identifier
        );
        Ok(deleted_rows)
    }

    /**
     * Purga los roles del usuario: tanto donde el usuario ES el tenant
     * como donde el tenant es el alcance del rol.
     */
    #[instrument(skip(self))]
    pub async fn purge_user_roles(&self, tenant_identifier: &str) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let deleted_rows = database_connection
            .execute(
                "DELETE FROM user_roles WHERE user_id = ?1 OR scope_tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;
        Ok(deleted_rows)
    }

    /**
     * Purga final de autenticación: sesiones, cuentas, tokens y por
     * último la fila del usuario (en modo single-user, user == tenant).
     */
    #[instrument(skip(self))]
    pub async fn purge_auth_records(&self, tenant_identifier: &str) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut total_deleted: u64 = 0;

        total_deleted += database_connection
            .execute("DELETE FROM auth_sessions WHERE user_id = ?1", params![tenant_identifier])
            .await?;
        total_deleted += database_connection
            .execute("DELETE FROM auth_accounts WHERE user_id = ?1", params![tenant_identifier])
            .await?;
        total_deleted += database_connection
            .execute(
                "DELETE FROM auth_verification_tokens WHERE user_id = ?1",
                params![tenant_identifier],
            )
            .await?;
        total_deleted += database_connection
            .execute("DELETE FROM auth_users WHERE id = ?1", params![tenant_identifier])
            .await?;

        Ok(total_deleted)
    }

    /// Conteo residual de filas del tenant en un almacén del catálogo.
    pub async fn count_remaining(
        &self,
        store_logical_name: &str,
        tenant_identifier: &str,
    ) -> Result<u64, DbError> {
        let (_, table_name, tenant_column) = TENANT_SCOPED_STORES
            .iter()
            .find(|(logical_name, _, _)| *logical_name == store_logical_name)
            .ok_or_else(|| {
                DbError::ConfigurationError(format!("UNKNOWN_PURGE_STORE: {store_logical_name}"))
            })?;

        let database_connection = self.database_client.get_connection()?;
        let mut count_rows = database_connection
            .query(
                &format!("SELECT COUNT(*) FROM {table_name} WHERE {tenant_column} = ?1"),
                params![tenant_identifier],
            )
            .await?;

        match count_rows.next().await? {
            Some(count_row) => Ok(count_row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    /// Nombres lógicos del catálogo en orden de declaración.
    #[must_use]
    pub fn catalog_store_names() -> Vec<&'static str> {
        TENANT_SCOPED_STORES.iter().map(|(logical_name, _, _)| *logical_name).collect()
    }
}
