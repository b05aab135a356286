// [libs/infra/db/src/repositories/notification.rs]
/*!
 * =================================================================
 * APARATO: HERALD NOTIFICATION REPOSITORY (V8.1 - DEDUP SEALED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: COLA DE COMUNICACIONES CON DEDUPLICACIÓN DIARIA
 *
 * # Logic:
 * La unicidad (tenant, template, date_key) la impone el índice único de
 * la cola: el sink externo puede ser tonto, el núcleo garantiza que un
 * tenant reciba a lo sumo una instancia de cada plantilla por día.
 * =================================================================
 */

use crate::errors::DbError;
use crate::LedgerDbClient;
use chrono::Utc;
use libsql::params;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Entrada pendiente de despacho de la cola Herald.
#[derive(Debug, Clone)]
pub struct QueuedNotification {
    pub id: String,
    pub tenant_id: String,
    pub template_name: String,
    pub payload_json: String,
}

pub struct NotificationRepository {
    database_client: LedgerDbClient,
}

impl NotificationRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /**
     * Encola una comunicación con deduplicación (tenant, template, día).
     *
     * @returns true si la entrada fue encolada; false si el índice de
     * deduplicación la absorbió como repetida.
     */
    #[instrument(skip(self, payload_json))]
    pub async fn enqueue(
        &self,
        tenant_identifier: &str,
        template_name: &str,
        date_key: &str,
        payload_json: &str,
    ) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute(
                r#"
                INSERT OR IGNORE INTO notification_queue (
                    id, tenant_id, template_name, date_key, payload_json, status, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    tenant_identifier,
                    template_name,
                    date_key,
                    payload_json,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if affected_rows == 0 {
            debug!(
                "💤 [HERALD]: Duplicate ({}, {}, {}) absorbed by dedup index.",
                tenant_identifier, template_name, date_key
            );
        }
        Ok(affected_rows > 0)
    }

    /// Entradas pendientes, más antiguas primero.
    #[instrument(skip(self))]
    pub async fn pending(&self, batch_ceiling: u32) -> Result<Vec<QueuedNotification>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut queue_rows = database_connection
            .query(
                r#"
                SELECT id, tenant_id, template_name, payload_json
                FROM notification_queue
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT ?1
                "#,
                params![i64::from(batch_ceiling)],
            )
            .await?;

        let mut pending_entries = Vec::new();
        while let Some(queue_row) = queue_rows.next().await? {
            pending_entries.push(QueuedNotification {
                id: queue_row.get(0)?,
                tenant_id: queue_row.get(1)?,
                template_name: queue_row.get(2)?,
                payload_json: queue_row.get(3)?,
            });
        }
        Ok(pending_entries)
    }

    /// Sella el despacho exitoso y registra el correo emitido.
    #[instrument(skip(self))]
    pub async fn mark_sent(&self, notification_identifier: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;

        database_connection
            .execute(
                "UPDATE notification_queue SET status = 'sent' WHERE id = ?1",
                params![notification_identifier],
            )
            .await?;

        database_connection
            .execute(
                r#"
                INSERT INTO email_notifications (id, tenant_id, template_name, sent_at)
                SELECT ?2, tenant_id, template_name, ?3 FROM notification_queue WHERE id = ?1
                "#,
                params![
                    notification_identifier,
                    Uuid::new_v4().to_string(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Preferencias de comunicación del tenant (JSON opaco para el núcleo).
    pub async fn upsert_preferences(
        &self,
        tenant_identifier: &str,
        preferences_json: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO notification_preferences (tenant_id, preferences_json, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    preferences_json = excluded.preferences_json,
                    updated_at = excluded.updated_at
                "#,
                params![tenant_identifier, preferences_json, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }
}
