// [libs/infra/db/src/repositories/recovery.rs]
/*!
 * =================================================================
 * APARATO: RECOVERY BOOKKEEPING REPOSITORY (V8.1 - COUNT CONSERVING)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CONTABILIDAD DE EVENTOS E ITEMS DE RECUPERACIÓN
 *
 * # Mathematical Proof (Count Conservation):
 * Al recalcular los contadores del evento desde sus items,
 * recovered + failed + waiting + skipped + retried = total se cumple por
 * construcción; el estado terminal (completed | partial) se deriva de
 * los mismos contadores, nunca se fija de forma independiente.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::ledger::parse_rfc3339;
use crate::LedgerDbClient;
use chrono::Utc;
use hive_domain_models::fleet::{
    RecoveryEvent, RecoveryEventStatus, RecoveryItem, RecoveryItemStatus, RecoveryTrigger,
};
use libsql::{params, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct RecoveryRepository {
    /// Cliente táctico para el enlace con el cluster relacional.
    database_client: LedgerDbClient,
}

impl RecoveryRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /// Abre un evento de recuperación en estado in_progress.
    #[instrument(skip(self))]
    pub async fn open_event(
        &self,
        node_identifier: &str,
        trigger: RecoveryTrigger,
        tenants_total: u32,
    ) -> Result<RecoveryEvent, DbError> {
        let event = RecoveryEvent {
            id: Uuid::new_v4().to_string(),
            node_id: node_identifier.to_string(),
            trigger,
            status: RecoveryEventStatus::InProgress,
            tenants_total,
            tenants_recovered: 0,
            tenants_failed: 0,
            tenants_waiting: 0,
            started_at: Utc::now(),
            completed_at: None,
            report_json: None,
        };

        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO recovery_events (
                    id, node_id, trigger_source, status, tenants_total,
                    tenants_recovered, tenants_failed, tenants_waiting, started_at
                )
                VALUES (?1, ?2, ?3, 'in_progress', ?4, 0, 0, 0, ?5)
                "#,
                params![
                    event.id.clone(),
                    event.node_id.clone(),
                    event.trigger.as_str(),
                    i64::from(tenants_total),
                    event.started_at.to_rfc3339()
                ],
            )
            .await?;

        debug!("🩺 [RECOVERY_LEDGER]: Event {} opened for node {}.", event.id, node_identifier);
        Ok(event)
    }

    pub async fn get_event(&self, event_identifier: &str) -> Result<Option<RecoveryEvent>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut event_rows = database_connection
            .query(&format!("{EVENT_PROJECTION} WHERE id = ?1"), params![event_identifier])
            .await?;

        match event_rows.next().await? {
            Some(event_row) => Ok(Some(map_event_row(&event_row)?)),
            None => Ok(None),
        }
    }

    /// Sella el item de un tenant dentro del evento.
    #[instrument(skip(self, item), fields(event = %item.event_id, tenant = %item.tenant_id))]
    pub async fn upsert_item(&self, item: &RecoveryItem) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO recovery_items (
                    id, event_id, tenant_id, source_node, target_node,
                    backup_key, status, reason
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    target_node = excluded.target_node,
                    backup_key = excluded.backup_key,
                    status = excluded.status,
                    reason = excluded.reason
                "#,
                params![
                    item.id.clone(),
                    item.event_id.clone(),
                    item.tenant_id.clone(),
                    item.source_node.clone(),
                    item.target_node.clone(),
                    item.backup_key.clone(),
                    item.status.as_str(),
                    item.reason.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Items del evento, opcionalmente filtrados por estado.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        event_identifier: &str,
        status_filter: Option<RecoveryItemStatus>,
    ) -> Result<Vec<RecoveryItem>, DbError> {
        let database_connection = self.database_client.get_connection()?;

        let mut item_rows = match status_filter {
            Some(status) => {
                database_connection
                    .query(
                        &format!("{ITEM_PROJECTION} WHERE event_id = ?1 AND status = ?2 ORDER BY tenant_id ASC"),
                        params![event_identifier, status.as_str()],
                    )
                    .await?
            }
            None => {
                database_connection
                    .query(
                        &format!("{ITEM_PROJECTION} WHERE event_id = ?1 ORDER BY tenant_id ASC"),
                        params![event_identifier],
                    )
                    .await?
            }
        };

        let mut items = Vec::new();
        while let Some(item_row) = item_rows.next().await? {
            items.push(map_item_row(&item_row)?);
        }
        Ok(items)
    }

    /**
     * Recalcula los contadores del evento desde sus items y deriva el
     * estado terminal cuando todos los items son terminales.
     *
     * # Logic:
     * completed sii todos los items terminaron 'recovered'; partial en
     * cualquier otra combinación terminal (failed/waiting presentes).
     * 'waiting' cuenta como no-terminal para el cierre total, pero un
     * evento con solo waiting/failed restantes se reporta partial para
     * que retry_waiting pueda re-atacarlo.
     */
    #[instrument(skip(self))]
    pub async fn reconcile_event_counts(
        &self,
        event_identifier: &str,
    ) -> Result<RecoveryEvent, DbError> {
        let items = self.list_items(event_identifier, None).await?;

        let recovered_count =
            items.iter().filter(|item| item.status == RecoveryItemStatus::Recovered).count() as u32;
        let failed_count =
            items.iter().filter(|item| item.status == RecoveryItemStatus::Failed).count() as u32;
        let waiting_count =
            items.iter().filter(|item| item.status == RecoveryItemStatus::Waiting).count() as u32;
        let pending_count = items
            .iter()
            .filter(|item| matches!(item.status, RecoveryItemStatus::Retried))
            .count() as u32;

        let total_count = items.len() as u32;
        let all_settled = pending_count == 0;

        let derived_status = if !all_settled {
            RecoveryEventStatus::InProgress
        } else if recovered_count == total_count && total_count > 0 {
            RecoveryEventStatus::Completed
        } else if failed_count + waiting_count > 0 {
            RecoveryEventStatus::Partial
        } else {
            RecoveryEventStatus::Completed
        };

        let completed_at = match derived_status {
            RecoveryEventStatus::InProgress => None,
            _ => Some(Utc::now()),
        };

        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                UPDATE recovery_events SET
                    status = ?2, tenants_total = ?3, tenants_recovered = ?4,
                    tenants_failed = ?5, tenants_waiting = ?6, completed_at = ?7
                WHERE id = ?1
                "#,
                params![
                    event_identifier,
                    derived_status.as_str(),
                    i64::from(total_count),
                    i64::from(recovered_count),
                    i64::from(failed_count),
                    i64::from(waiting_count),
                    completed_at.map(|instant| instant.to_rfc3339()),
                ],
            )
            .await?;

        self.get_event(event_identifier).await?.ok_or(DbError::NotFound)
    }

    /// Adjunta el reporte forense serializado al evento.
    #[instrument(skip(self, report_json))]
    pub async fn attach_report(
        &self,
        event_identifier: &str,
        report_json: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE recovery_events SET report_json = ?2 WHERE id = ?1",
                params![event_identifier, report_json],
            )
            .await?;
        Ok(())
    }
}

const EVENT_PROJECTION: &str = r#"
    SELECT id, node_id, trigger_source, status, tenants_total,
           tenants_recovered, tenants_failed, tenants_waiting,
           started_at, completed_at, report_json
    FROM recovery_events
"#;

const ITEM_PROJECTION: &str = r#"
    SELECT id, event_id, tenant_id, source_node, target_node,
           backup_key, status, reason
    FROM recovery_items
"#;

fn map_event_row(event_row: &Row) -> Result<RecoveryEvent, DbError> {
    let trigger_label: String = event_row.get(2)?;
    let status_label: String = event_row.get(3)?;

    Ok(RecoveryEvent {
        id: event_row.get(0)?,
        node_id: event_row.get(1)?,
        trigger: RecoveryTrigger::parse(&trigger_label)
            .ok_or_else(|| DbError::MappingError(format!("RECOVERY_TRIGGER_DRIFT: {trigger_label}")))?,
        status: RecoveryEventStatus::parse(&status_label)
            .ok_or_else(|| DbError::MappingError(format!("RECOVERY_STATUS_DRIFT: {status_label}")))?,
        tenants_total: event_row.get::<i64>(4)? as u32,
        tenants_recovered: event_row.get::<i64>(5)? as u32,
        tenants_failed: event_row.get::<i64>(6)? as u32,
        tenants_waiting: event_row.get::<i64>(7)? as u32,
        started_at: parse_rfc3339(&event_row.get::<String>(8)?)?,
        completed_at: event_row
            .get::<Option<String>>(9)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
        report_json: event_row.get::<Option<String>>(10)?,
    })
}

fn map_item_row(item_row: &Row) -> Result<RecoveryItem, DbError> {
    let status_label: String = item_row.get(6)?;
    Ok(RecoveryItem {
        id: item_row.get(0)?,
        event_id: item_row.get(1)?,
        tenant_id: item_row.get(2)?,
        source_node: item_row.get(3)?,
        target_node: item_row.get::<Option<String>>(4)?,
        backup_key: item_row.get::<Option<String>>(5)?,
        status: RecoveryItemStatus::parse(&status_label)
            .ok_or_else(|| DbError::MappingError(format!("RECOVERY_ITEM_DRIFT: {status_label}")))?,
        reason: item_row.get::<Option<String>>(7)?,
    })
}
