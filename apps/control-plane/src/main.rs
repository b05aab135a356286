// [apps/control-plane/src/main.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE MAIN ENTRY POINT (V7.0 - GOLD MASTER)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE CONFIG READ: El entorno se captura una única vez en la
 *    ignición; ningún aparato lee variables en sitio de llamada.
 * 2. GRACEFUL SHUTDOWN: SIGINT dispara el apagado cooperativo; los
 *    daemons completan su iteración en curso antes de morir.
 *
 * # Mathematical Proof (Deterministic Ignition):
 * El proceso garantiza que el esquema relacional esté cristalizado y
 * los suscriptores del bus registrados ANTES de armar los daemons,
 * previniendo estados de carrera donde una señal temprana (NodeLost)
 * carezca de consumidor.
 * =================================================================
 */

use hive_control_plane::prelude::*;

use dotenvy::dotenv;
use hive_shared_telemetry::init_tracing;
use tracing::{error, info};

/**
 * Punto de ignición supremo del binario del plano de control.
 */
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO SOBERANO
    dotenv().ok();

    // 2. INICIALIZACIÓN DE OBSERVABILIDAD NEURAL
    init_tracing("hive_control_plane");

    // 3. CONFIGURACIÓN DEL RUNTIME SOBERANO
    let runtime_control_plane = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime_control_plane.block_on(async {
        info!("🛰️  [COMMAND_CENTER]: Global ignition sequence starting...");

        // 4. CAPTURA ÚNICA DE CONFIGURACIÓN
        let platform_config = match PlatformConfig::from_environment() {
            Ok(config) => config,
            Err(config_fault) => {
                error!("❌ [IGNITION_ABORTED]: Configuration rejected: {}", config_fault);
                std::process::exit(1);
            }
        };

        // 5. CONSTRUCCIÓN DEL KERNEL SOBERANO (ESTRATO L1-APP)
        // Los colaboradores externos (procesador, object store, sink)
        // los inyecta el host; el binario arranca con los puertos que
        // la configuración permite forjar (agente de nodo HTTP).
        let kernel_instance =
            match ControlPlaneKernel::ignite(platform_config, CollaboratorPorts::disconnected())
                .await
            {
                Ok(kernel) => kernel,
                Err(ignition_fault) => {
                    error!("❌ [IGNITION_ABORTED]: Kernel collapse: {}", ignition_fault);
                    std::process::exit(1);
                }
            };

        // 6. IGNICIÓN DE OPERACIONES AUTÓNOMAS
        kernel_instance.launch_control_plane_operations().await;
        info!("🚀 [HIVE_ONLINE]: Control plane fully operational.");

        // 7. ESPERA DE APAGADO COOPERATIVO
        if tokio::signal::ctrl_c().await.is_ok() {
            kernel_instance.signal_shutdown();
        }

        Ok(())
    })
}
