// [libs/infra/db/src/repositories/snapshot.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT LEDGER REPOSITORY (V8.3 - RETENTION AWARE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: AUTORIDAD RELACIONAL DE RESPALDOS Y RETENCIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ROWS AS AUTHORITY: El object store es eventualmente consistente;
 *    la existencia de un respaldo la decide exclusivamente su fila.
 * 2. TWO-PHASE DELETION: Borrado blando (deleted_at) por retención o
 *    expiración; purga dura tras la gracia de arrastre.
 * 3. DETERMINISTIC ORDER: El conjunto retenido es el max_count más
 *    reciente por created_at con desempate por id.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::ledger::parse_rfc3339;
use crate::LedgerDbClient;
use chrono::{DateTime, Utc};
use hive_domain_models::snapshot::{SnapshotKind, SnapshotRecord, SnapshotTrigger};
use libsql::{params, Row};
use tracing::{debug, instrument};

pub struct SnapshotRepository {
    /// Cliente táctico para el enlace con el cluster relacional.
    database_client: LedgerDbClient,
}

impl SnapshotRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /// Sella la fila de un respaldo recién capturado.
    #[instrument(skip(self, snapshot_record), fields(snapshot = %snapshot_record.id))]
    pub async fn insert(&self, snapshot_record: &SnapshotRecord) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;

        let plugins_json = serde_json::to_string(&snapshot_record.plugins)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;

        database_connection
            .execute(
                r#"
                INSERT INTO snapshots (
                    id, tenant_id, instance_id, user_id, name, kind, size_bytes,
                    node_id, trigger_source, plugins_json, config_hash,
                    storage_path, created_at, expires_at, deleted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    snapshot_record.id.clone(),
                    snapshot_record.tenant_id.clone(),
                    snapshot_record.instance_id.clone(),
                    snapshot_record.user_id.clone(),
                    snapshot_record.name.clone(),
                    snapshot_record.kind.as_str(),
                    snapshot_record.size_bytes,
                    snapshot_record.node_id.clone(),
                    snapshot_record.trigger.as_str(),
                    plugins_json,
                    snapshot_record.config_hash.clone(),
                    snapshot_record.storage_path.clone(),
                    snapshot_record.created_at.to_rfc3339(),
                    snapshot_record.expires_at.map(|expiry| expiry.to_rfc3339()),
                    snapshot_record.deleted_at.map(|deletion| deletion.to_rfc3339()),
                ],
            )
            .await?;

        Ok(())
    }

    /// Recupera una fila por identificador (incluye borradas en blando).
    #[instrument(skip(self))]
    pub async fn get(&self, snapshot_identifier: &str) -> Result<Option<SnapshotRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut snapshot_rows = database_connection
            .query(
                &format!("{SNAPSHOT_PROJECTION} WHERE id = ?1"),
                params![snapshot_identifier],
            )
            .await?;

        match snapshot_rows.next().await? {
            Some(snapshot_row) => Ok(Some(map_snapshot_row(&snapshot_row)?)),
            None => Ok(None),
        }
    }

    /// Respaldos visibles de una instancia, más reciente primero.
    #[instrument(skip(self))]
    pub async fn list_for_instance(
        &self,
        instance_identifier: &str,
    ) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect_rows(
            &format!(
                "{SNAPSHOT_PROJECTION} WHERE instance_id = ?1 AND deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC"
            ),
            params![instance_identifier],
        )
        .await
    }

    /// Respaldos visibles de un tenant, más reciente primero.
    #[instrument(skip(self))]
    pub async fn list_for_tenant(
        &self,
        tenant_identifier: &str,
    ) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect_rows(
            &format!(
                "{SNAPSHOT_PROJECTION} WHERE tenant_id = ?1 AND deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC"
            ),
            params![tenant_identifier],
        )
        .await
    }

    /// Conteo de respaldos visibles del tenant.
    #[instrument(skip(self))]
    pub async fn count_visible_by_tenant(&self, tenant_identifier: &str) -> Result<u64, DbError> {
        self.count_scalar(
            "SELECT COUNT(*) FROM snapshots WHERE tenant_id = ?1 AND deleted_at IS NULL",
            params![tenant_identifier],
        )
        .await
    }

    /// Conteo de respaldos on-demand visibles (guardia de cuota por tier).
    #[instrument(skip(self))]
    pub async fn count_on_demand_visible(&self, tenant_identifier: &str) -> Result<u64, DbError> {
        self.count_scalar(
            "SELECT COUNT(*) FROM snapshots \
             WHERE tenant_id = ?1 AND kind = 'on-demand' AND deleted_at IS NULL",
            params![tenant_identifier],
        )
        .await
    }

    /**
     * Filas visibles que exceden el conjunto retenido de una instancia.
     *
     * # Logic:
     * El conjunto retenido es el max_count más reciente por created_at
     * (desempate por id); el desborde son las filas siguientes en ese
     * mismo orden, es decir las más antiguas.
     */
    #[instrument(skip(self))]
    pub async fn retention_overflow(
        &self,
        instance_identifier: &str,
        maximum_retained_count: u32,
    ) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect_rows(
            &format!(
                "{SNAPSHOT_PROJECTION} WHERE instance_id = ?1 AND deleted_at IS NULL \
                 ORDER BY created_at DESC, id DESC LIMIT -1 OFFSET ?2"
            ),
            params![instance_identifier, i64::from(maximum_retained_count)],
        )
        .await
    }

    /// Respaldos visibles cuya expiración ya venció.
    #[instrument(skip(self))]
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect_rows(
            &format!(
                "{SNAPSHOT_PROJECTION} WHERE deleted_at IS NULL AND expires_at IS NOT NULL \
                 AND expires_at < ?1 ORDER BY expires_at ASC"
            ),
            params![now.to_rfc3339()],
        )
        .await
    }

    /// Filas en borrado blando más antiguas que la gracia de arrastre.
    #[instrument(skip(self))]
    pub async fn list_soft_deleted_before(
        &self,
        hard_delete_cutoff: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>, DbError> {
        self.collect_rows(
            &format!(
                "{SNAPSHOT_PROJECTION} WHERE deleted_at IS NOT NULL AND deleted_at < ?1"
            ),
            params![hard_delete_cutoff.to_rfc3339()],
        )
        .await
    }

    /// Respaldo usable más reciente de un tenant (recuperación de flota).
    #[instrument(skip(self))]
    pub async fn latest_usable_backup(
        &self,
        tenant_identifier: &str,
    ) -> Result<Option<SnapshotRecord>, DbError> {
        let mut usable_rows = self
            .collect_rows(
                &format!(
                    "{SNAPSHOT_PROJECTION} WHERE tenant_id = ?1 AND deleted_at IS NULL \
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![tenant_identifier],
            )
            .await?;
        Ok(usable_rows.pop())
    }

    /// Borrado blando; retorna false si la fila no existía o ya estaba borrada.
    #[instrument(skip(self))]
    pub async fn soft_delete(
        &self,
        snapshot_identifier: &str,
        deletion_instant: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute(
                "UPDATE snapshots SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![snapshot_identifier, deletion_instant.to_rfc3339()],
            )
            .await?;

        if affected_rows > 0 {
            debug!("🗑️  [SNAPSHOT_LEDGER]: Snapshot {} soft-deleted.", snapshot_identifier);
        }
        Ok(affected_rows > 0)
    }

    /// Purga dura de la fila.
    #[instrument(skip(self))]
    pub async fn hard_delete(&self, snapshot_identifier: &str) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute("DELETE FROM snapshots WHERE id = ?1", params![snapshot_identifier])
            .await?;
        Ok(affected_rows > 0)
    }

    // --- MOTORES INTERNOS DE PROYECCIÓN ---

    async fn collect_rows(
        &self,
        projection_sql: &str,
        query_params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SnapshotRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut snapshot_rows = database_connection.query(projection_sql, query_params).await?;

        let mut records = Vec::new();
        while let Some(snapshot_row) = snapshot_rows.next().await? {
            records.push(map_snapshot_row(&snapshot_row)?);
        }
        Ok(records)
    }

    async fn count_scalar(
        &self,
        count_sql: &str,
        query_params: impl libsql::params::IntoParams,
    ) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut count_rows = database_connection.query(count_sql, query_params).await?;
        match count_rows.next().await? {
            Some(count_row) => Ok(count_row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }
}

const SNAPSHOT_PROJECTION: &str = r#"
    SELECT id, tenant_id, instance_id, user_id, name, kind, size_bytes,
           node_id, trigger_source, plugins_json, config_hash, storage_path,
           created_at, expires_at, deleted_at
    FROM snapshots
"#;

fn map_snapshot_row(snapshot_row: &Row) -> Result<SnapshotRecord, DbError> {
    let kind_label: String = snapshot_row.get(5)?;
    let trigger_label: String = snapshot_row.get(8)?;
    let plugins_json: String = snapshot_row.get(9)?;

    Ok(SnapshotRecord {
        id: snapshot_row.get(0)?,
        tenant_id: snapshot_row.get(1)?,
        instance_id: snapshot_row.get(2)?,
        user_id: snapshot_row.get(3)?,
        name: snapshot_row.get::<Option<String>>(4)?,
        kind: SnapshotKind::parse(&kind_label)
            .ok_or_else(|| DbError::MappingError(format!("SNAPSHOT_KIND_DRIFT: {kind_label}")))?,
        size_bytes: snapshot_row.get(6)?,
        node_id: snapshot_row.get::<Option<String>>(7)?,
        trigger: SnapshotTrigger::parse(&trigger_label)
            .ok_or_else(|| DbError::MappingError(format!("SNAPSHOT_TRIGGER_DRIFT: {trigger_label}")))?,
        plugins: serde_json::from_str(&plugins_json)
            .map_err(|fault| DbError::MappingError(format!("PLUGINS_JSON_DRIFT: {fault}")))?,
        config_hash: snapshot_row.get(10)?,
        storage_path: snapshot_row.get(11)?,
        created_at: parse_rfc3339(&snapshot_row.get::<String>(12)?)?,
        expires_at: snapshot_row
            .get::<Option<String>>(13)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
        deleted_at: snapshot_row
            .get::<Option<String>>(14)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
    })
}
