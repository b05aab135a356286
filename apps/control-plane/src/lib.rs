// [apps/control-plane/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE LIBRARY ROOT (V7.0 - SOVEREIGN AUTHORITY)
 * CLASIFICACIÓN: CRATE ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: DEFINICIÓN SUPREMA DEL ÁRBOL DE MÓDULOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. MODULE HIERARCHY HARDENING: Establece la autoridad única de
 *    módulos, permitiendo que 'crate::' sea resuelto de forma
 *    determinista tanto en la librería como en el binario.
 * 2. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta en la
 *    exposición de servicios.
 * 3. PUBLIC INTERFACE: Expone 'prelude' para facilitar la ignición
 *    del Kernel desde el binario 'main.rs'.
 * =================================================================
 */

// --- ESTRATO DE CONFIGURACIÓN Y ESTADO (L1-APP) ---
/// Configuración de plataforma cargada una única vez en la ignición.
pub mod config;
/// Gestor del sistema nervioso central del plano de control.
pub mod state;

// --- ESTRATO DE OPERACIONES DE NEGOCIO ---
/// Ejecutor ordenado de purga multi-almacén de tenants.
pub mod deletion;
/// Control de flota: registro, drenaje y migración.
pub mod fleet;
/// Compuerta de créditos del gateway (pre-check y post-debit).
pub mod gate;
/// Ciclo de vida de respaldos direccionados por contenido.
pub mod snapshots;
/// Operaciones de la bóveda de credenciales con rastro de auditoría.
pub mod vault_ops;

// --- ESTRATO DE SERVICIOS DE FONDO ---
/// Núcleo de mando y control para la ignición de servicios.
pub mod kernel;
/// Daemons de fondo y bus de señales de plataforma.
pub mod services;

/**
 * PRELUDIO DEL PLANO DE CONTROL
 *
 * Re-exportación estratégica de los componentes necesarios para
 * la ignición mínima del sistema. Reduce el acoplamiento en 'main.rs'.
 */
pub mod prelude {
    pub use crate::config::PlatformConfig;
    pub use crate::kernel::ControlPlaneKernel;
    pub use crate::state::{AppState, Collaborator, CollaboratorPorts};
}
