// [libs/infra/db/src/repositories/fleet.rs]
/*!
 * =================================================================
 * APARATO: FLEET REGISTRY REPOSITORY (V8.5 - STATE MACHINE GUARDED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO DE NODOS, INSTANCIAS Y PROGRESO DE DRENAJE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. GUARDED TRANSITIONS: Toda mutación de Node.status valida la arista
 *    contra la máquina de estados antes de escribir; una transición
 *    ilegal es InvalidState, jamás una escritura silenciosa.
 * 2. LOAD AWARENESS: El conteo de instancias por nodo alimenta la
 *    elección de objetivo lowest-load del orquestador de recuperación.
 * 3. DRAIN TELEMETRY: Los campos de progreso (migrated, total) permiten
 *    el sondeo del panel de administración sin estado en RAM.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::ledger::parse_rfc3339;
use crate::LedgerDbClient;
use chrono::{DateTime, Utc};
use hive_domain_models::fleet::{BillingState, BotInstance, NodeRecord, NodeStatus};
use libsql::{params, Row};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub struct FleetRepository {
    /// Cliente táctico para el enlace con el cluster relacional.
    database_client: LedgerDbClient,
}

impl FleetRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    // --- ESTRATO DE NODOS ---

    /// Alta (o re-alta) de un nodo con estado inicial 'active'.
    #[instrument(skip(self))]
    pub async fn register_node(&self, node_identifier: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let now = Utc::now().to_rfc3339();

        database_connection
            .execute(
                r#"
                INSERT INTO nodes (id, status, last_heartbeat_at, updated_at)
                VALUES (?1, 'active', ?2, ?2)
                ON CONFLICT(id) DO UPDATE SET
                    status = 'active',
                    drain_status = NULL,
                    drain_migrated = NULL,
                    drain_total = NULL,
                    last_heartbeat_at = excluded.last_heartbeat_at,
                    updated_at = excluded.updated_at
                "#,
                params![node_identifier, now],
            )
            .await?;

        debug!("🖥️  [FLEET_REGISTRY]: Node {} registered as active.", node_identifier);
        Ok(())
    }

    /// Registra un latido del agente del nodo.
    #[instrument(skip(self))]
    pub async fn record_heartbeat(
        &self,
        node_identifier: &str,
        heartbeat_instant: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute(
                "UPDATE nodes SET last_heartbeat_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![node_identifier, heartbeat_instant.to_rfc3339()],
            )
            .await?;
        Ok(affected_rows > 0)
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut node_rows = database_connection
            .query(&format!("{NODE_PROJECTION} ORDER BY id ASC"), ())
            .await?;

        let mut nodes = Vec::new();
        while let Some(node_row) = node_rows.next().await? {
            nodes.push(map_node_row(&node_row)?);
        }
        Ok(nodes)
    }

    pub async fn get_node(&self, node_identifier: &str) -> Result<Option<NodeRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut node_rows = database_connection
            .query(&format!("{NODE_PROJECTION} WHERE id = ?1"), params![node_identifier])
            .await?;

        match node_rows.next().await? {
            Some(node_row) => Ok(Some(map_node_row(&node_row)?)),
            None => Ok(None),
        }
    }

    /**
     * Muta el estado del nodo validando la arista de la máquina de estados.
     *
     * # Errors:
     * - `DbError::NotFound`: el nodo no existe.
     * - `DbError::InvalidState`: la arista solicitada es ilegal (p. ej.
     *   cualquier salida desde 'decommissioned').
     */
    #[instrument(skip(self))]
    pub async fn transition_node_status(
        &self,
        node_identifier: &str,
        target_status: NodeStatus,
    ) -> Result<(), DbError> {
        let current_node = self.get_node(node_identifier).await?.ok_or(DbError::NotFound)?;

        if !current_node.status.can_transition_to(target_status) {
            return Err(DbError::InvalidState);
        }

        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE nodes SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![node_identifier, target_status.as_str(), Utc::now().to_rfc3339()],
            )
            .await?;

        debug!(
            "🔁 [FLEET_REGISTRY]: Node {} transitioned {} -> {}.",
            node_identifier,
            current_node.status.as_str(),
            target_status.as_str()
        );
        Ok(())
    }

    /// Actualiza el progreso de drenaje para el sondeo del panel.
    #[instrument(skip(self))]
    pub async fn set_drain_progress(
        &self,
        node_identifier: &str,
        drain_status: &str,
        migrated_count: u32,
        total_count: u32,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                UPDATE nodes SET drain_status = ?2, drain_migrated = ?3,
                       drain_total = ?4, updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    node_identifier,
                    drain_status,
                    i64::from(migrated_count),
                    i64::from(total_count),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Limpia los campos de drenaje (cancel-drain).
    #[instrument(skip(self))]
    pub async fn clear_drain_progress(&self, node_identifier: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                UPDATE nodes SET drain_status = NULL, drain_migrated = NULL,
                       drain_total = NULL, updated_at = ?2
                WHERE id = ?1
                "#,
                params![node_identifier, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    /// Nodos activos cuyo último latido es anterior al corte del watchdog.
    #[instrument(skip(self))]
    pub async fn stale_active_nodes(
        &self,
        heartbeat_cutoff: DateTime<Utc>,
    ) -> Result<Vec<NodeRecord>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut node_rows = database_connection
            .query(
                &format!(
                    "{NODE_PROJECTION} WHERE status = 'active' AND last_heartbeat_at < ?1"
                ),
                params![heartbeat_cutoff.to_rfc3339()],
            )
            .await?;

        let mut stale_nodes = Vec::new();
        while let Some(node_row) = node_rows.next().await? {
            stale_nodes.push(map_node_row(&node_row)?);
        }
        Ok(stale_nodes)
    }

    // --- ESTRATO DE INSTANCIAS ---

    /// Tenants distintos con instancias vivas sobre el nodo.
    #[instrument(skip(self))]
    pub async fn get_node_tenants(&self, node_identifier: &str) -> Result<Vec<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut tenant_rows = database_connection
            .query(
                r#"
                SELECT DISTINCT tenant_id FROM bot_instances
                WHERE node_id = ?1 AND billing_state != 'destroyed'
                ORDER BY tenant_id ASC
                "#,
                params![node_identifier],
            )
            .await?;

        let mut tenants = Vec::new();
        while let Some(tenant_row) = tenant_rows.next().await? {
            tenants.push(tenant_row.get(0)?);
        }
        Ok(tenants)
    }

    pub async fn get_instance(
        &self,
        instance_identifier: &str,
    ) -> Result<Option<BotInstance>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut instance_rows = database_connection
            .query(
                &format!("{INSTANCE_PROJECTION} WHERE id = ?1"),
                params![instance_identifier],
            )
            .await?;

        match instance_rows.next().await? {
            Some(instance_row) => Ok(Some(map_instance_row(&instance_row)?)),
            None => Ok(None),
        }
    }

    /// Inserta una instancia (alta de bot).
    #[instrument(skip(self, bot_instance), fields(instance = %bot_instance.id))]
    pub async fn insert_instance(&self, bot_instance: &BotInstance) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO bot_instances (
                    id, tenant_id, node_id, billing_state, suspended_at,
                    destroy_after, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    bot_instance.id.clone(),
                    bot_instance.tenant_id.clone(),
                    bot_instance.node_id.clone(),
                    bot_instance.billing_state.as_str(),
                    bot_instance.suspended_at.map(|instant| instant.to_rfc3339()),
                    bot_instance.destroy_after.map(|instant| instant.to_rfc3339()),
                    bot_instance.created_at.to_rfc3339(),
                    bot_instance.updated_at.to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Reasigna el nodo de todas las instancias vivas de un tenant.
    #[instrument(skip(self))]
    pub async fn reassign_tenant_instances(
        &self,
        tenant_identifier: &str,
        source_node: &str,
        target_node: Option<&str>,
    ) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute(
                r#"
                UPDATE bot_instances SET node_id = ?3, updated_at = ?4
                WHERE tenant_id = ?1 AND node_id = ?2 AND billing_state != 'destroyed'
                "#,
                params![
                    tenant_identifier,
                    source_node,
                    target_node.map(str::to_string),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(affected_rows)
    }

    /// Reasigna una instancia individual (migración de administración).
    #[instrument(skip(self))]
    pub async fn assign_instance_node(
        &self,
        instance_identifier: &str,
        target_node: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        let affected_rows = database_connection
            .execute(
                "UPDATE bot_instances SET node_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![instance_identifier, target_node, Utc::now().to_rfc3339()],
            )
            .await?;

        if affected_rows == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Persiste el estado de facturación completo de una instancia.
    #[instrument(skip(self, bot_instance), fields(instance = %bot_instance.id))]
    pub async fn persist_billing_state(&self, bot_instance: &BotInstance) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                UPDATE bot_instances SET billing_state = ?2, suspended_at = ?3,
                       destroy_after = ?4, updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    bot_instance.id.clone(),
                    bot_instance.billing_state.as_str(),
                    bot_instance.suspended_at.map(|instant| instant.to_rfc3339()),
                    bot_instance.destroy_after.map(|instant| instant.to_rfc3339()),
                    bot_instance.updated_at.to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }

    /**
     * Carga de instancias vivas por nodo activo (elección lowest-load).
     * Los nodos activos sin instancias aparecen con carga cero.
     */
    #[instrument(skip(self))]
    pub async fn active_node_loads(&self) -> Result<BTreeMap<String, u64>, DbError> {
        let database_connection = self.database_client.get_connection()?;

        let mut load_map = BTreeMap::new();

        let mut active_rows = database_connection
            .query("SELECT id FROM nodes WHERE status = 'active'", ())
            .await?;
        while let Some(active_row) = active_rows.next().await? {
            load_map.insert(active_row.get::<String>(0)?, 0u64);
        }

        let mut count_rows = database_connection
            .query(
                r#"
                SELECT node_id, COUNT(*) FROM bot_instances
                WHERE node_id IS NOT NULL AND billing_state != 'destroyed'
                GROUP BY node_id
                "#,
                (),
            )
            .await?;
        while let Some(count_row) = count_rows.next().await? {
            let node_identifier: String = count_row.get(0)?;
            if let Some(load_slot) = load_map.get_mut(&node_identifier) {
                *load_slot = count_row.get::<i64>(1)? as u64;
            }
        }

        Ok(load_map)
    }
}

const NODE_PROJECTION: &str = r#"
    SELECT id, status, drain_status, drain_migrated, drain_total,
           last_heartbeat_at, updated_at
    FROM nodes
"#;

const INSTANCE_PROJECTION: &str = r#"
    SELECT id, tenant_id, node_id, billing_state, suspended_at,
           destroy_after, created_at, updated_at
    FROM bot_instances
"#;

fn map_node_row(node_row: &Row) -> Result<NodeRecord, DbError> {
    let status_label: String = node_row.get(1)?;
    Ok(NodeRecord {
        id: node_row.get(0)?,
        status: NodeStatus::parse(&status_label)
            .ok_or_else(|| DbError::MappingError(format!("NODE_STATUS_DRIFT: {status_label}")))?,
        drain_status: node_row.get::<Option<String>>(2)?,
        drain_migrated: node_row.get::<Option<i64>>(3)?.map(|value| value as u32),
        drain_total: node_row.get::<Option<i64>>(4)?.map(|value| value as u32),
        last_heartbeat_at: parse_rfc3339(&node_row.get::<String>(5)?)?,
        updated_at: parse_rfc3339(&node_row.get::<String>(6)?)?,
    })
}

fn map_instance_row(instance_row: &Row) -> Result<BotInstance, DbError> {
    let billing_state_label: String = instance_row.get(3)?;
    Ok(BotInstance {
        id: instance_row.get(0)?,
        tenant_id: instance_row.get(1)?,
        node_id: instance_row.get::<Option<String>>(2)?,
        billing_state: BillingState::parse(&billing_state_label).ok_or_else(|| {
            DbError::MappingError(format!("BILLING_STATE_DRIFT: {billing_state_label}"))
        })?,
        suspended_at: instance_row
            .get::<Option<String>>(4)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
        destroy_after: instance_row
            .get::<Option<String>>(5)?
            .map(|raw| parse_rfc3339(&raw))
            .transpose()?,
        created_at: parse_rfc3339(&instance_row.get::<String>(6)?)?,
        updated_at: parse_rfc3339(&instance_row.get::<String>(7)?)?,
    })
}
