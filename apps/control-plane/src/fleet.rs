// [apps/control-plane/src/fleet.rs]
/*!
 * =================================================================
 * APARATO: FLEET CONTROL COMMAND (V7.4 - DRAIN TOLERANT)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO, DRENAJE Y MIGRACIÓN DE LA FLOTA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PER-TENANT TOLERANCE: El drenaje registra los fallos individuales
 *    y continúa; un tenant atascado jamás aborta el drenaje del nodo.
 * 2. GUARDED EDGES: Toda transición de estado del nodo pasa por la
 *    máquina de estados del repositorio (InvalidState ante aristas
 *    ilegales).
 * 3. ADMIN SINGLE-STEP: migrate_tenant valida existencia, asignación y
 *    source != target antes de tocar un solo contenedor.
 * =================================================================
 */

use crate::state::AppState;
use hive_domain_models::fleet::{NodeRecord, NodeStatus};
use hive_domain_models::ports::{NodeCommand, PortError};
use hive_infra_db::DbError;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum FleetFault {
    /// El nodo o la instancia solicitada no existe.
    #[error("[L4_FLEET_FAULT]: TARGET_NOT_FOUND")]
    NotFound,

    /// La instancia no tiene asignación de nodo vigente.
    #[error("[L4_FLEET_FAULT]: INSTANCE_UNASSIGNED")]
    Unassigned,

    /// Migración rechazada: el origen y el destino son el mismo nodo.
    #[error("[L4_FLEET_FAULT]: SOURCE_EQUALS_TARGET")]
    SameNode,

    /// No existe ningún nodo activo elegible como destino.
    #[error("[L4_FLEET_FAULT]: NO_ELIGIBLE_TARGET")]
    NoEligibleTarget,

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(transparent)]
    Agent(#[from] PortError),
}

/// Reporte del drenaje de un nodo.
#[derive(Debug, Clone)]
pub struct DrainReport {
    pub node_id: String,
    pub tenants_total: u32,
    pub tenants_migrated: u32,
    /// (tenant, diagnóstico) de cada migración fallida; el drenaje continuó.
    pub failures: Vec<(String, String)>,
}

pub struct FleetControl {
    application_state: AppState,
}

impl FleetControl {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    // --- ESTRATO DE REGISTRO (delegación al repositorio) ---

    pub async fn register_node(&self, node_identifier: &str) -> Result<(), FleetFault> {
        Ok(self.application_state.fleet_repository.register_node(node_identifier).await?)
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>, FleetFault> {
        Ok(self.application_state.fleet_repository.list_nodes().await?)
    }

    pub async fn get_node(&self, node_identifier: &str) -> Result<NodeRecord, FleetFault> {
        self.application_state
            .fleet_repository
            .get_node(node_identifier)
            .await?
            .ok_or(FleetFault::NotFound)
    }

    pub async fn get_node_tenants(&self, node_identifier: &str) -> Result<Vec<String>, FleetFault> {
        Ok(self.application_state.fleet_repository.get_node_tenants(node_identifier).await?)
    }

    // --- ESTRATO DE DRENAJE ---

    /**
     * Drena un nodo migrando cada tenant hacia un destino elegible.
     *
     * # Logic:
     * active -> draining; por cada tenant se intenta la migración y el
     * fallo individual se registra sin abortar; el progreso (migrated,
     * total) se sella en cada iteración para el sondeo del panel; al
     * terminar, draining -> drained.
     */
    #[instrument(skip(self))]
    pub async fn drain_node(&self, node_identifier: &str) -> Result<DrainReport, FleetFault> {
        self.application_state
            .fleet_repository
            .transition_node_status(node_identifier, NodeStatus::Draining)
            .await?;

        let resident_tenants =
            self.application_state.fleet_repository.get_node_tenants(node_identifier).await?;
        let tenants_total = resident_tenants.len() as u32;

        let mut report = DrainReport {
            node_id: node_identifier.to_string(),
            tenants_total,
            tenants_migrated: 0,
            failures: Vec::new(),
        };

        self.application_state
            .fleet_repository
            .set_drain_progress(node_identifier, "draining", 0, tenants_total)
            .await?;

        for resident_tenant in resident_tenants {
            match self.migrate_tenant_off_node(&resident_tenant, node_identifier).await {
                Ok(target_node) => {
                    report.tenants_migrated += 1;
                    info!(
                        "🚚 [DRAIN]: Tenant {} migrated {} -> {}.",
                        resident_tenant, node_identifier, target_node
                    );
                }
                Err(migration_fault) => {
                    // Tolerancia por-tenant: se registra y se continúa.
                    warn!(
                        "⚠️ [DRAIN]: Tenant {} migration failed (drain continues): {}",
                        resident_tenant, migration_fault
                    );
                    report.failures.push((resident_tenant, migration_fault.to_string()));
                }
            }

            self.application_state
                .fleet_repository
                .set_drain_progress(
                    node_identifier,
                    "draining",
                    report.tenants_migrated,
                    tenants_total,
                )
                .await?;
        }

        self.application_state
            .fleet_repository
            .transition_node_status(node_identifier, NodeStatus::Drained)
            .await?;
        self.application_state
            .fleet_repository
            .set_drain_progress(node_identifier, "drained", report.tenants_migrated, tenants_total)
            .await?;

        info!(
            "🏁 [DRAIN]: Node {} drained. {}/{} tenants migrated, {} failures.",
            node_identifier,
            report.tenants_migrated,
            tenants_total,
            report.failures.len()
        );
        Ok(report)
    }

    /// Revierte un drenaje en curso: draining -> active, progreso limpio.
    #[instrument(skip(self))]
    pub async fn cancel_drain(&self, node_identifier: &str) -> Result<(), FleetFault> {
        self.application_state
            .fleet_repository
            .transition_node_status(node_identifier, NodeStatus::Active)
            .await?;
        self.application_state.fleet_repository.clear_drain_progress(node_identifier).await?;
        info!("↩️  [DRAIN]: Node {} drain cancelled; node active again.", node_identifier);
        Ok(())
    }

    // --- ESTRATO DE MIGRACIÓN ---

    /**
     * Variante single-step de administración: migra una instancia
     * concreta hacia un nodo explícito.
     *
     * # Errors:
     * - `FleetFault::NotFound`: la instancia no existe.
     * - `FleetFault::Unassigned`: la instancia no tiene nodo vigente.
     * - `FleetFault::SameNode`: origen == destino.
     */
    #[instrument(skip(self))]
    pub async fn migrate_tenant(
        &self,
        bot_instance_identifier: &str,
        target_node_identifier: &str,
    ) -> Result<(), FleetFault> {
        let bot_instance = self
            .application_state
            .fleet_repository
            .get_instance(bot_instance_identifier)
            .await?
            .ok_or(FleetFault::NotFound)?;

        let source_node = bot_instance.node_id.ok_or(FleetFault::Unassigned)?;
        if source_node == target_node_identifier {
            return Err(FleetFault::SameNode);
        }

        self.execute_container_handoff(&bot_instance.tenant_id, &source_node, target_node_identifier)
            .await?;

        self.application_state
            .fleet_repository
            .assign_instance_node(bot_instance_identifier, target_node_identifier)
            .await?;

        info!(
            "🚚 [MIGRATION]: Instance {} handed off {} -> {}.",
            bot_instance_identifier, source_node, target_node_identifier
        );
        Ok(())
    }

    /**
     * Migra todas las instancias de un tenant fuera de un nodo, eligiendo
     * el destino activo de menor carga.
     */
    async fn migrate_tenant_off_node(
        &self,
        tenant_identifier: &str,
        source_node: &str,
    ) -> Result<String, FleetFault> {
        let target_node = self.pick_lowest_load_target(source_node).await?;

        self.execute_container_handoff(tenant_identifier, source_node, &target_node).await?;

        self.application_state
            .fleet_repository
            .reassign_tenant_instances(tenant_identifier, source_node, Some(&target_node))
            .await?;

        Ok(target_node)
    }

    /// Nodo activo con menor cantidad de instancias, excluyendo el origen.
    pub(crate) async fn pick_lowest_load_target(
        &self,
        excluded_node: &str,
    ) -> Result<String, FleetFault> {
        let node_loads = self.application_state.fleet_repository.active_node_loads().await?;

        node_loads
            .into_iter()
            .filter(|(node_identifier, _)| node_identifier != excluded_node)
            .min_by_key(|(node_identifier, load)| (*load, node_identifier.clone()))
            .map(|(node_identifier, _)| node_identifier)
            .ok_or(FleetFault::NoEligibleTarget)
    }

    /**
     * Secuencia física del traspaso: exportar/detener en el origen
     * (best-effort si el origen ya no responde) y restaurar en destino.
     */
    async fn execute_container_handoff(
        &self,
        tenant_identifier: &str,
        source_node: &str,
        target_node: &str,
    ) -> Result<(), FleetFault> {
        let node_agent = self
            .application_state
            .collaborators
            .node_agent
            .as_present()
            .ok_or(PortError::Rejected("NODE_AGENT_ABSENT".into()))?;

        // Exportación en el origen: best-effort (el nodo puede estar caído).
        if let Err(export_fault) = node_agent
            .execute(source_node, NodeCommand::DrainStep { tenant_id: tenant_identifier.to_string() })
            .await
        {
            warn!(
                "⚠️ [HANDOFF]: Source export failed for tenant {} (restore from backup): {}",
                tenant_identifier, export_fault
            );
        }

        // La restauración en destino usa el respaldo usable más reciente.
        let latest_backup = self
            .application_state
            .snapshot_repository
            .latest_usable_backup(tenant_identifier)
            .await?;
        let backup_key = latest_backup
            .map(|snapshot| snapshot.storage_path)
            .unwrap_or_default();

        node_agent
            .execute(
                target_node,
                NodeCommand::RestoreBegin {
                    tenant_id: tenant_identifier.to_string(),
                    backup_key,
                },
            )
            .await?;

        Ok(())
    }
}
