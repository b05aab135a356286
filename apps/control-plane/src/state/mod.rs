// [apps/control-plane/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN STATE ORCHESTRATOR (V7.0 - SINGULARITY GOLD)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, PUERTOS Y BUS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EXPLICIT COMPOSITION: Sin bolsas de dependencias duck-typed ni
 *    singletons lazy; el grafo de componentes se forja completo en la
 *    ignición y se inyecta por clonación de Arc.
 * 2. SUM-TYPE COLLABORATORS: Los puertos opcionales usan el tipo suma
 *    Collaborator (Present | Absent), jamás referencias anulables.
 * 3. COMPOSITION ROOT: Centraliza el rastro de los repositorios, el
 *    motor del WAL, la bóveda y los daemons.
 *
 * # Mathematical Proof (Deterministic State Hub):
 * El aparato garantiza la coherencia 360°: todo cambio observable viaja
 * por el almacén relacional o por el bus tipado; los daemons no
 * comparten estado mutable en RAM fuera de esos dos canales.
 * =================================================================
 */

use crate::config::PlatformConfig;
use crate::services::event_bus::EventBus;
use hive_core_vault::VaultCryptoEngine;
use hive_domain_models::ports::{NodeAgentRpc, NotificationSink, ObjectStore, PaymentProcessor};
use hive_infra_db::repositories::{
    AuditRepository, BillingSupportRepository, CredentialRepository, FleetRepository,
    LedgerRepository, MeterRepository, NotificationRepository, PurgeRepository,
    RecoveryRepository, SnapshotRepository,
};
use hive_infra_db::LedgerDbClient;
use hive_infra_meter_wal::{MeterWalEngine, WalError};
use std::sync::Arc;
use tracing::debug;

/**
 * Tipo suma para colaboradores opcionales del despliegue.
 * La ausencia es un estado explícito, no un puntero nulo.
 */
pub enum Collaborator<P: ?Sized> {
    Present(Arc<P>),
    Absent,
}

impl<P: ?Sized> Clone for Collaborator<P> {
    fn clone(&self) -> Self {
        match self {
            Collaborator::Present(port) => Collaborator::Present(Arc::clone(port)),
            Collaborator::Absent => Collaborator::Absent,
        }
    }
}

impl<P: ?Sized> Collaborator<P> {
    /// Acceso al puerto cuando el colaborador fue inyectado.
    pub fn as_present(&self) -> Option<Arc<P>> {
        match self {
            Collaborator::Present(port) => Some(Arc::clone(port)),
            Collaborator::Absent => None,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Collaborator::Present(_))
    }
}

/// Grafo explícito de colaboradores externos: un campo por capacidad.
#[derive(Clone)]
pub struct CollaboratorPorts {
    pub payment_processor: Collaborator<dyn PaymentProcessor>,
    pub object_store: Collaborator<dyn ObjectStore>,
    pub notification_sink: Collaborator<dyn NotificationSink>,
    pub node_agent: Collaborator<dyn NodeAgentRpc>,
}

impl CollaboratorPorts {
    /// Despliegue sin colaboradores externos (Proving Grounds mínimo).
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            payment_processor: Collaborator::Absent,
            object_store: Collaborator::Absent,
            notification_sink: Collaborator::Absent,
            node_agent: Collaborator::Absent,
        }
    }
}

/**
 * Contenedor de estado compartido (thread-safe) del plano de control.
 * Actúa como la placa base neural donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    /// Cliente táctico para el almacén relacional.
    pub database_client: LedgerDbClient,
    /// Configuración inmutable cargada una única vez.
    pub config: Arc<PlatformConfig>,
    /// Bus de señales one-shot de la plataforma.
    pub event_bus: Arc<EventBus>,
    /// Motor del WAL local de medición (único hot path sin I/O remoto).
    pub meter_wal: Arc<MeterWalEngine>,
    /// Motor criptográfico de la bóveda de credenciales.
    pub vault_engine: Arc<VaultCryptoEngine>,

    // --- ESTRATO L3: REPOSITORIOS ---
    pub ledger_repository: Arc<LedgerRepository>,
    pub meter_repository: Arc<MeterRepository>,
    pub snapshot_repository: Arc<SnapshotRepository>,
    pub fleet_repository: Arc<FleetRepository>,
    pub recovery_repository: Arc<RecoveryRepository>,
    pub credential_repository: Arc<CredentialRepository>,
    pub billing_support_repository: Arc<BillingSupportRepository>,
    pub notification_repository: Arc<NotificationRepository>,
    pub audit_repository: Arc<AuditRepository>,
    pub purge_repository: Arc<PurgeRepository>,

    // --- ESTRATO L2: PUERTOS DE COLABORADORES ---
    pub collaborators: CollaboratorPorts,
}

impl AppState {
    /**
     * Forja una nueva instancia del estado maestro inyectando todas las
     * dependencias. Abre el WAL local y deriva la llave de la bóveda.
     *
     * # Errors:
     * - `WalError::Io`: el directorio del WAL no puede materializarse.
     */
    pub fn new(
        database_client: LedgerDbClient,
        config: Arc<PlatformConfig>,
        collaborators: CollaboratorPorts,
    ) -> Result<Self, WalError> {
        debug!("🧬 [APP_STATE]: Executing sovereign ignition sequence V7.0...");

        let meter_wal = Arc::new(MeterWalEngine::open(
            &config.meter_wal_path,
            &config.meter_dlq_path,
        )?);

        let vault_engine = Arc::new(VaultCryptoEngine::from_platform_secret(
            config.platform_secret.as_bytes(),
        ));

        Ok(Self {
            config,
            event_bus: Arc::new(EventBus::new()),
            meter_wal,
            vault_engine,

            ledger_repository: Arc::new(LedgerRepository::new(database_client.clone())),
            meter_repository: Arc::new(MeterRepository::new(database_client.clone())),
            snapshot_repository: Arc::new(SnapshotRepository::new(database_client.clone())),
            fleet_repository: Arc::new(FleetRepository::new(database_client.clone())),
            recovery_repository: Arc::new(RecoveryRepository::new(database_client.clone())),
            credential_repository: Arc::new(CredentialRepository::new(database_client.clone())),
            billing_support_repository: Arc::new(BillingSupportRepository::new(database_client.clone())),
            notification_repository: Arc::new(NotificationRepository::new(database_client.clone())),
            audit_repository: Arc::new(AuditRepository::new(database_client.clone())),
            purge_repository: Arc::new(PurgeRepository::new(database_client.clone())),

            collaborators,
            database_client,
        })
    }
}
