// [apps/control-plane/src/services/node_resurrection.rs]
/*!
 * =================================================================
 * APARATO: NODE RESURRECTION ORCHESTRATOR (V7.5 - TYPE SOBERANO)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: RECUPERACIÓN DE TENANTS TRAS PÉRDIDA DE NODO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EVENT DRIVEN: El orquestador se suscribe a NodeLost en el bus; el
 *    watchdog jamás lo referencia directamente (ciclo roto por diseño).
 * 2. BOOKKEEPING FIRST: El RecoveryEvent se abre ANTES de contactar a
 *    cualquier agente; cada tenant obtiene su RecoveryItem con desenlace
 *    terminal (recovered | failed | waiting).
 * 3. LOWEST LOAD TARGETING: El destino es el nodo activo de menor carga,
 *    excluyendo al caído; sin destino elegible el item queda 'waiting'
 *    y retry_waiting lo re-ataca.
 *
 * # Mathematical Proof (Count Conservation):
 * Al concluir, recovered + failed + waiting = total por construcción:
 * cada tenant del nodo caído recibe exactamente un item y cada item
 * alcanza exactamente uno de los tres desenlaces.
 * =================================================================
 */

use crate::state::AppState;
use hive_domain_models::fleet::{
    RecoveryEvent, RecoveryItem, RecoveryItemStatus, RecoveryTrigger,
};
use hive_domain_models::ports::{NodeCommand, PortError};
use hive_domain_models::PlatformEvent;
use hive_infra_db::DbError;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecoveryFault {
    /// El evento de recuperación solicitado no existe.
    #[error("[L4_RECOVERY_FAULT]: EVENT_NOT_FOUND")]
    EventNotFound,

    #[error(transparent)]
    Storage(#[from] DbError),
}

pub struct RecoveryOrchestrator {
    application_state: AppState,
}

impl RecoveryOrchestrator {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Suscriptor de ignición: consume NodeLost del bus y dispara la
     * secuencia de recuperación. Registrado una sola vez por el Kernel.
     */
    pub fn spawn_lost_node_listener(self) {
        let mut signal_receiver = self.application_state.event_bus.subscribe();

        tokio::spawn(async move {
            info!("🩺 [RESURRECTION]: Lost-node listener armed on the platform bus.");

            while let Ok(platform_event) = signal_receiver.recv().await {
                if let PlatformEvent::NodeLost { node_id, trigger } = platform_event {
                    if let Err(recovery_fault) = self.execute_recovery(&node_id, trigger).await {
                        error!(
                            "❌ [RECOVERY_FAULT]: Resurrection sequence collapsed for node {}: {}",
                            node_id, recovery_fault
                        );
                    }
                }
            }
        });
    }

    /**
     * Ejecuta la secuencia completa de recuperación de un nodo perdido.
     *
     * # Logic:
     * (a) abre el RecoveryEvent in_progress, (b) por cada tenant busca
     * destino de menor carga y respaldo usable más reciente, (c) ordena
     * restore.begin en el destino, (d) sella el item como recovered /
     * failed / waiting, (e) reconcilia contadores y estado terminal.
     */
    #[instrument(skip(self))]
    pub async fn execute_recovery(
        &self,
        failed_node_identifier: &str,
        trigger: RecoveryTrigger,
    ) -> Result<RecoveryEvent, RecoveryFault> {
        let affected_tenants = self
            .application_state
            .fleet_repository
            .get_node_tenants(failed_node_identifier)
            .await?;

        let recovery_event = self
            .application_state
            .recovery_repository
            .open_event(failed_node_identifier, trigger, affected_tenants.len() as u32)
            .await?;

        warn!(
            "💀 [RESURRECTION]: Node {} lost ({} tenants affected). Event {} opened.",
            failed_node_identifier,
            affected_tenants.len(),
            recovery_event.id
        );

        // Mapa de cargas vivo: cada recuperación exitosa incrementa el
        // destino elegido para repartir el enjambre.
        let mut live_node_loads: BTreeMap<String, u64> = self
            .application_state
            .fleet_repository
            .active_node_loads()
            .await?
            .into_iter()
            .filter(|(node_identifier, _)| node_identifier != failed_node_identifier)
            .collect();

        for affected_tenant in &affected_tenants {
            let recovery_item = self
                .recover_single_tenant(
                    &recovery_event.id,
                    affected_tenant,
                    failed_node_identifier,
                    &mut live_node_loads,
                )
                .await?;

            self.application_state.recovery_repository.upsert_item(&recovery_item).await?;
        }

        self.conclude_event(&recovery_event.id).await
    }

    /**
     * Re-ataca exclusivamente los items 'waiting' de un evento parcial.
     */
    #[instrument(skip(self))]
    pub async fn retry_waiting(&self, event_identifier: &str) -> Result<RecoveryEvent, RecoveryFault> {
        let recovery_event = self
            .application_state
            .recovery_repository
            .get_event(event_identifier)
            .await?
            .ok_or(RecoveryFault::EventNotFound)?;

        let waiting_items = self
            .application_state
            .recovery_repository
            .list_items(event_identifier, Some(RecoveryItemStatus::Waiting))
            .await?;

        if waiting_items.is_empty() {
            return Ok(recovery_event);
        }

        let mut live_node_loads: BTreeMap<String, u64> = self
            .application_state
            .fleet_repository
            .active_node_loads()
            .await?
            .into_iter()
            .filter(|(node_identifier, _)| node_identifier != recovery_event.node_id.as_str())
            .collect();

        for waiting_item in waiting_items {
            let mut retried_item = self
                .recover_single_tenant(
                    event_identifier,
                    &waiting_item.tenant_id,
                    &waiting_item.source_node,
                    &mut live_node_loads,
                )
                .await?;
            // El reintento conserva la identidad del item original.
            retried_item.id = waiting_item.id;
            self.application_state.recovery_repository.upsert_item(&retried_item).await?;
        }

        self.conclude_event(event_identifier).await
    }

    /**
     * Intento de recuperación de un tenant individual. Jamás retorna un
     * estado no-terminal: recovered, failed o waiting.
     */
    async fn recover_single_tenant(
        &self,
        event_identifier: &str,
        tenant_identifier: &str,
        source_node: &str,
        live_node_loads: &mut BTreeMap<String, u64>,
    ) -> Result<RecoveryItem, RecoveryFault> {
        let mut recovery_item = RecoveryItem {
            id: Uuid::new_v4().to_string(),
            event_id: event_identifier.to_string(),
            tenant_id: tenant_identifier.to_string(),
            source_node: source_node.to_string(),
            target_node: None,
            backup_key: None,
            status: RecoveryItemStatus::Waiting,
            reason: None,
        };

        // 1. DESTINO DE MENOR CARGA (sin destino => waiting).
        let Some(target_node) = live_node_loads
            .iter()
            .min_by_key(|(node_identifier, load)| (**load, (*node_identifier).clone()))
            .map(|(node_identifier, _)| node_identifier.clone())
        else {
            recovery_item.reason = Some("NO_ELIGIBLE_TARGET_NODE".into());
            return Ok(recovery_item);
        };

        // 2. RESPALDO USABLE MÁS RECIENTE (sin respaldo => failed).
        let latest_backup = self
            .application_state
            .snapshot_repository
            .latest_usable_backup(tenant_identifier)
            .await?;

        let Some(backup_snapshot) = latest_backup else {
            recovery_item.status = RecoveryItemStatus::Failed;
            recovery_item.reason = Some("NO_USABLE_BACKUP".into());
            return Ok(recovery_item);
        };
        recovery_item.backup_key = Some(backup_snapshot.storage_path.clone());

        // 3. ORDEN DE RESTAURACIÓN EN EL DESTINO.
        let restore_outcome = match self.application_state.collaborators.node_agent.as_present() {
            Some(node_agent) => {
                node_agent
                    .execute(
                        &target_node,
                        NodeCommand::RestoreBegin {
                            tenant_id: tenant_identifier.to_string(),
                            backup_key: backup_snapshot.storage_path,
                        },
                    )
                    .await
            }
            None => Err(PortError::Rejected("NODE_AGENT_ABSENT".into())),
        };

        match restore_outcome {
            Ok(_) => {
                // 4. REASIGNACIÓN RELACIONAL DEL TENANT.
                self.application_state
                    .fleet_repository
                    .reassign_tenant_instances(tenant_identifier, source_node, Some(&target_node))
                    .await?;

                *live_node_loads.entry(target_node.clone()).or_insert(0) += 1;
                recovery_item.target_node = Some(target_node);
                recovery_item.status = RecoveryItemStatus::Recovered;
            }
            Err(restore_fault) => {
                recovery_item.target_node = Some(target_node);
                recovery_item.status = RecoveryItemStatus::Failed;
                recovery_item.reason = Some(restore_fault.to_string());
            }
        }

        Ok(recovery_item)
    }

    /// Reconcilia contadores, adjunta el reporte y difunde la conclusión.
    async fn conclude_event(&self, event_identifier: &str) -> Result<RecoveryEvent, RecoveryFault> {
        let concluded_event = self
            .application_state
            .recovery_repository
            .reconcile_event_counts(event_identifier)
            .await?;

        let items = self
            .application_state
            .recovery_repository
            .list_items(event_identifier, None)
            .await?;
        let forensic_report = serde_json::json!({
            "event_id": concluded_event.id,
            "node_id": concluded_event.node_id,
            "status": concluded_event.status.as_str(),
            "items": items
                .iter()
                .map(|item| serde_json::json!({
                    "tenant": item.tenant_id,
                    "status": item.status.as_str(),
                    "target": item.target_node,
                    "reason": item.reason,
                }))
                .collect::<Vec<_>>(),
        });
        self.application_state
            .recovery_repository
            .attach_report(event_identifier, &forensic_report.to_string())
            .await?;

        self.application_state.event_bus.publish_recovery_concluded(
            &concluded_event.id,
            &concluded_event.node_id,
            concluded_event.status,
        );

        info!(
            "🩺 [RESURRECTION]: Event {} concluded {} ({} recovered / {} failed / {} waiting of {}).",
            concluded_event.id,
            concluded_event.status.as_str(),
            concluded_event.tenants_recovered,
            concluded_event.tenants_failed,
            concluded_event.tenants_waiting,
            concluded_event.tenants_total
        );
        Ok(concluded_event)
    }
}
