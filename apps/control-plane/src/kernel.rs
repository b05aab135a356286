// INICIO DEL ARCHIVO [apps/control-plane/src/kernel.rs]
/**
 * =================================================================
 * APARATO: CONTROL PLANE SOVEREIGN KERNEL (V7.0 - GUARD ACTIVE)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan todos los servicios. El
 * grafo de componentes se forja completo aquí (cero singletons lazy);
 * los suscriptores del bus se registran ANTES de lanzar los daemons
 * para que ninguna señal temprana se pierda.
 * =================================================================
 */

use crate::config::PlatformConfig;
use crate::services::{
    spawn_retention_reaper, BalanceHeraldService, FleetWatchdogService, MeterFlushService,
    RecoveryOrchestrator, TopupSchedulerService, UsageAggregatorService,
};
use crate::state::{AppState, Collaborator, CollaboratorPorts};
use hive_infra_db::LedgerDbClient;
use hive_infra_node_agent::NodeAgentHttpClient;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

pub struct ControlPlaneKernel {
    pub application_shared_state: AppState,
    /// Emisor del apagado cooperativo de los daemons.
    shutdown_transmitter: watch::Sender<bool>,
}

impl ControlPlaneKernel {
    /**
     * Realiza la ignición del cliente táctico y el estado neural.
     * Establece la conexión relacional antes de levantar servicios.
     */
    #[instrument(skip(platform_config, collaborators))]
    pub async fn ignite(
        platform_config: PlatformConfig,
        mut collaborators: CollaboratorPorts,
    ) -> anyhow::Result<Self> {
        let database_client = LedgerDbClient::connect(
            &platform_config.database_url,
            platform_config.database_auth_token.clone(),
        )
        .await?;

        // El adaptador HTTP de agentes se forja desde la configuración
        // cuando el host no inyectó uno propio.
        if !collaborators.node_agent.is_present() {
            if let (Some(base_url), Some(agent_token)) = (
                platform_config.node_agent_base_url.clone(),
                platform_config.node_agent_token.clone(),
            ) {
                let node_agent_client = NodeAgentHttpClient::new(base_url, agent_token)
                    .map_err(|agent_fault| anyhow::anyhow!("AGENT_CLIENT_IGNITION: {agent_fault}"))?;
                collaborators.node_agent = Collaborator::Present(Arc::new(node_agent_client));
            }
        }

        let (shutdown_transmitter, _) = watch::channel(false);

        Ok(Self {
            application_shared_state: AppState::new(
                database_client,
                Arc::new(platform_config),
                collaborators,
            )?,
            shutdown_transmitter,
        })
    }

    /**
     * Lanza la ejecución de todas las operaciones autónomas del plano
     * de control: suscriptores del bus primero, daemons después.
     */
    pub async fn launch_control_plane_operations(&self) {
        let shared_application_state = self.application_shared_state.clone();

        // --- 1. SUSCRIPTORES DEL BUS (ANTES DE CUALQUIER PRODUCTOR) ---

        // Orquestador de recuperación: consume NodeLost del watchdog.
        RecoveryOrchestrator::new(shared_application_state.clone()).spawn_lost_node_listener();

        // Heraldo de balance: consume BalanceExhausted de la compuerta.
        BalanceHeraldService::new(shared_application_state.clone()).spawn_exhaustion_listener();

        // --- 2. DESPLIEGUE DE DAEMONS DE MANTENIMIENTO TÁCTICO ---

        // A. Cristalización del WAL de medición (WAL -> Motor relacional).
        let flush_service = MeterFlushService::new(shared_application_state.clone());
        flush_service.spawn_flush_daemon(self.shutdown_transmitter.subscribe()).await;

        // B. Re-suma de periodos de facturación cerrados.
        let aggregator_service = UsageAggregatorService::new(shared_application_state.clone());
        aggregator_service.spawn_aggregator_daemon(self.shutdown_transmitter.subscribe()).await;

        // C. Vigilancia de latidos de la flota.
        let watchdog_service = FleetWatchdogService::new(shared_application_state.clone());
        watchdog_service.spawn_watchdog_daemon(self.shutdown_transmitter.subscribe()).await;

        // D. Barrida de retención de respaldos.
        spawn_retention_reaper(
            shared_application_state.clone(),
            self.shutdown_transmitter.subscribe(),
        )
        .await;

        // E. Agendas de recarga automática.
        let topup_service = TopupSchedulerService::new(shared_application_state.clone());
        topup_service.spawn_scheduler_daemon(self.shutdown_transmitter.subscribe()).await;

        info!("🚀 [KERNEL_ONLINE]: Control plane daemons armed and operational.");
    }

    /**
     * Señal de apagado cooperativo: cada daemon completa su iteración en
     * curso y omite la siguiente.
     */
    pub fn signal_shutdown(&self) {
        info!("🛑 [KERNEL]: Cooperative shutdown signal raised.");
        let _ = self.shutdown_transmitter.send(true);
    }
}
// FIN DEL ARCHIVO [apps/control-plane/src/kernel.rs]
