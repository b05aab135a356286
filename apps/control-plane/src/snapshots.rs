// [apps/control-plane/src/snapshots.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT LIFECYCLE MANAGER (V7.2 - CONTENT ADDRESSED)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: CREACIÓN, RESTAURACIÓN Y RETENCIÓN DE RESPALDOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. QUOTA BEFORE WORK: La cuota on-demand por tier se valida antes de
 *    mover un solo byte; la violación es un rechazo limpio.
 * 2. CONTENT ADDRESSING: La ruta de almacenamiento deriva del SHA-256
 *    del contenido; dos capturas idénticas comparten dirección.
 * 3. SAFETY FIRST RESTORE: Toda restauración toma primero un respaldo
 *    pre-restore del estado vigente; un fallo a mitad de camino deja el
 *    respaldo de seguridad en pie y reporta el fallo.
 * 4. ROWS AS AUTHORITY: El object store es eventualmente consistente;
 *    la fila relacional decide la existencia.
 * =================================================================
 */

use crate::state::AppState;
use chrono::{Duration, Utc};
use hive_domain_models::ports::PortError;
use hive_domain_models::snapshot::{SnapshotKind, SnapshotRecord, SnapshotTrigger, TenantTier};
use hive_infra_db::DbError;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SnapshotFault {
    /// Cuota on-demand del tier alcanzada; no se realizó trabajo alguno.
    #[error("[L4_SNAPSHOT_FAULT]: QUOTA_EXCEEDED")]
    QuotaExceeded,

    /// El respaldo no existe o está en borrado blando.
    #[error("[L4_SNAPSHOT_FAULT]: SNAPSHOT_NOT_FOUND")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] DbError),

    /// Fallo opaco del object store.
    #[error(transparent)]
    ObjectStore(#[from] PortError),
}

/// Orden de captura de un respaldo.
#[derive(Debug, Clone)]
pub struct SnapshotCreateRequest {
    pub tenant_id: String,
    pub instance_id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub kind: SnapshotKind,
    pub trigger: SnapshotTrigger,
    pub tier: TenantTier,
    pub node_id: Option<String>,
    pub plugins: Vec<String>,
    /// Contenido serializado del estado de la instancia.
    pub content: Vec<u8>,
}

/// Desenlace de una restauración exitosa.
#[derive(Debug)]
pub struct RestoreOutcome {
    /// Contenido restaurado listo para inyectarse en la instancia.
    pub content: Vec<u8>,
    /// Respaldo de seguridad pre-restore tomado antes del reemplazo.
    pub safety_snapshot_id: String,
}

pub struct SnapshotManager {
    application_state: AppState,
}

impl SnapshotManager {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Captura un respaldo y aplica la retención del tier.
     *
     * # Errors:
     * - `SnapshotFault::QuotaExceeded`: tope on-demand del tier alcanzado
     *   (validado antes de cualquier trabajo).
     */
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, instance = %request.instance_id))]
    pub async fn create(&self, request: SnapshotCreateRequest) -> Result<SnapshotRecord, SnapshotFault> {
        // 1. GUARDIA DE CUOTA (antes de mover un solo byte).
        if request.kind == SnapshotKind::OnDemand {
            let on_demand_count = self
                .application_state
                .snapshot_repository
                .count_on_demand_visible(&request.tenant_id)
                .await?;
            if on_demand_count >= u64::from(request.tier.on_demand_snapshot_quota()) {
                return Err(SnapshotFault::QuotaExceeded);
            }
        }

        // 2. DIRECCIONAMIENTO POR CONTENIDO.
        let content_digest = hex::encode(Sha256::digest(&request.content));
        let storage_path = format!(
            "snapshots/{}/{}/{}",
            request.tenant_id, request.instance_id, content_digest
        );

        let now = Utc::now();
        let expires_at = now + Duration::days(request.tier.snapshot_retention_days());

        // 3. CARGA AL OBJECT STORE (cuando el colaborador está presente).
        if let Some(object_store) = self.application_state.collaborators.object_store.as_present() {
            object_store.put(&storage_path, request.content.clone()).await?;
        }

        // 4. SELLADO DE LA FILA DE AUTORIDAD.
        let snapshot_record = SnapshotRecord {
            id: Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id.clone(),
            instance_id: request.instance_id.clone(),
            user_id: request.user_id,
            name: request.name,
            kind: request.kind,
            size_bytes: request.content.len() as i64,
            node_id: request.node_id,
            trigger: request.trigger,
            plugins: request.plugins,
            config_hash: content_digest,
            storage_path,
            created_at: now,
            expires_at: Some(expires_at),
            deleted_at: None,
        };
        self.application_state.snapshot_repository.insert(&snapshot_record).await?;

        // 5. RETENCIÓN DEL TIER (el desborde más antiguo se borra blando).
        self.enforce_retention(&request.instance_id, request.tier).await?;

        info!(
            "📸 [SNAPSHOT_MANAGER]: Snapshot {} sealed ({} bytes) for instance {}.",
            snapshot_record.id, snapshot_record.size_bytes, request.instance_id
        );
        Ok(snapshot_record)
    }

    /**
     * Restaura un respaldo tomando primero la captura de seguridad.
     *
     * # Errors:
     * - `SnapshotFault::NotFound`: fila ausente o en borrado blando.
     * - Cualquier fallo posterior deja el respaldo pre-restore en pie y
     *   la operación se reporta fallida.
     */
    #[instrument(skip(self, current_state_content))]
    pub async fn restore(
        &self,
        snapshot_identifier: &str,
        current_state_content: Vec<u8>,
        tier: TenantTier,
    ) -> Result<RestoreOutcome, SnapshotFault> {
        let target_snapshot = self
            .application_state
            .snapshot_repository
            .get(snapshot_identifier)
            .await?
            .filter(SnapshotRecord::is_visible)
            .ok_or(SnapshotFault::NotFound)?;

        // 1. RESPALDO DE SEGURIDAD DEL ESTADO VIGENTE.
        let safety_snapshot = self
            .create(SnapshotCreateRequest {
                tenant_id: target_snapshot.tenant_id.clone(),
                instance_id: target_snapshot.instance_id.clone(),
                user_id: target_snapshot.user_id.clone(),
                name: Some(format!("pre-restore of {}", target_snapshot.id)),
                kind: SnapshotKind::PreRestore,
                trigger: SnapshotTrigger::PreUpdate,
                tier,
                node_id: target_snapshot.node_id.clone(),
                plugins: target_snapshot.plugins.clone(),
                content: current_state_content,
            })
            .await?;

        // 2. RECUPERACIÓN DEL CONTENIDO DIRECCIONADO.
        let restored_content = match self.application_state.collaborators.object_store.as_present() {
            Some(object_store) => object_store.get(&target_snapshot.storage_path).await?,
            // Sin object store el contenido viaja fuera de banda; el
            // llamador resuelve la ruta opaca localmente.
            None => Vec::new(),
        };

        debug!(
            "♻️  [SNAPSHOT_MANAGER]: Snapshot {} restored under safety cover {}.",
            snapshot_identifier, safety_snapshot.id
        );

        Ok(RestoreOutcome {
            content: restored_content,
            safety_snapshot_id: safety_snapshot.id,
        })
    }

    /// Borrado blando a pedido del tenant.
    #[instrument(skip(self))]
    pub async fn delete(&self, snapshot_identifier: &str) -> Result<(), SnapshotFault> {
        let was_deleted = self
            .application_state
            .snapshot_repository
            .soft_delete(snapshot_identifier, Utc::now())
            .await?;

        if !was_deleted {
            return Err(SnapshotFault::NotFound);
        }
        Ok(())
    }

    pub async fn list_for_instance(
        &self,
        instance_identifier: &str,
    ) -> Result<Vec<SnapshotRecord>, SnapshotFault> {
        Ok(self.application_state.snapshot_repository.list_for_instance(instance_identifier).await?)
    }

    pub async fn list_for_tenant(
        &self,
        tenant_identifier: &str,
    ) -> Result<Vec<SnapshotRecord>, SnapshotFault> {
        Ok(self.application_state.snapshot_repository.list_for_tenant(tenant_identifier).await?)
    }

    pub async fn count_by_tenant(&self, tenant_identifier: &str) -> Result<u64, SnapshotFault> {
        Ok(self.application_state.snapshot_repository.count_visible_by_tenant(tenant_identifier).await?)
    }

    /**
     * Aplica la retención del tier sobre una instancia: conserva los
     * max_count más recientes por created_at (desempate por id) y borra
     * en blando el desborde más antiguo.
     */
    #[instrument(skip(self))]
    pub async fn enforce_retention(
        &self,
        instance_identifier: &str,
        tier: TenantTier,
    ) -> Result<u32, SnapshotFault> {
        let overflow_rows = self
            .application_state
            .snapshot_repository
            .retention_overflow(instance_identifier, tier.snapshot_max_count())
            .await?;

        let mut evicted_count: u32 = 0;
        for overflow_snapshot in overflow_rows {
            if self
                .application_state
                .snapshot_repository
                .soft_delete(&overflow_snapshot.id, Utc::now())
                .await?
            {
                evicted_count += 1;
                debug!(
                    "🗑️  [RETENTION]: Snapshot {} evicted beyond tier ceiling ({}).",
                    overflow_snapshot.id,
                    tier.snapshot_max_count()
                );
            }
        }
        Ok(evicted_count)
    }

    /// Respaldos visibles cuya expiración ya venció (barrida periódica).
    pub async fn list_expired(&self) -> Result<Vec<SnapshotRecord>, SnapshotFault> {
        Ok(self.application_state.snapshot_repository.list_expired(Utc::now()).await?)
    }

    /**
     * Barrida de retención periódica: expira en blando y purga en duro
     * tras la gracia de arrastre, removiendo el objeto best-effort.
     *
     * @returns (expirados_en_blando, purgados_en_duro)
     */
    #[instrument(skip(self))]
    pub async fn sweep_retention(&self) -> Result<(u32, u32), SnapshotFault> {
        let now = Utc::now();

        // FASE 1: EXPIRACIÓN BLANDA.
        let mut soft_deleted_count: u32 = 0;
        for expired_snapshot in self.application_state.snapshot_repository.list_expired(now).await? {
            if self
                .application_state
                .snapshot_repository
                .soft_delete(&expired_snapshot.id, now)
                .await?
            {
                soft_deleted_count += 1;
                self.application_state
                    .event_bus
                    .publish_snapshot_expired(&expired_snapshot.id, &expired_snapshot.tenant_id);
            }
        }

        // FASE 2: PURGA DURA TRAS LA GRACIA DE ARRASTRE.
        let hard_delete_cutoff =
            now - Duration::hours(self.application_state.config.snapshot_hard_delete_grace_hours);

        let mut hard_deleted_count: u32 = 0;
        for condemned_snapshot in self
            .application_state
            .snapshot_repository
            .list_soft_deleted_before(hard_delete_cutoff)
            .await?
        {
            // El objeto remoto se remueve best-effort; la fila es la autoridad.
            if let Some(object_store) = self.application_state.collaborators.object_store.as_present() {
                if let Err(removal_fault) = object_store.remove(&condemned_snapshot.storage_path).await {
                    warn!(
                        "⚠️ [RETENTION]: Object removal failed for {} (row purge proceeds): {}",
                        condemned_snapshot.id, removal_fault
                    );
                }
            }

            if self.application_state.snapshot_repository.hard_delete(&condemned_snapshot.id).await? {
                hard_deleted_count += 1;
            }
        }

        if soft_deleted_count + hard_deleted_count > 0 {
            info!(
                "🧹 [RETENTION]: Sweep complete. {} expired, {} purged.",
                soft_deleted_count, hard_deleted_count
            );
        }
        Ok((soft_deleted_count, hard_deleted_count))
    }
}
