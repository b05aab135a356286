// [apps/control-plane/src/services/mod.rs]
/*!
 * =================================================================
 * APARATO: SERVICE REGISTRY (V7.0 - CONTROL PLANE)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO NOMINAL DE DAEMONS Y SERVICIOS
 * =================================================================
 */

pub mod balance_herald;
pub mod event_bus;
pub mod fleet_watchdog;
pub mod meter_flush;
pub mod node_resurrection;
pub mod payment_reconciler;
pub mod retention_reaper;
pub mod topup_scheduler;
pub mod usage_aggregator;

pub use balance_herald::BalanceHeraldService;
pub use event_bus::EventBus;
pub use fleet_watchdog::FleetWatchdogService;
pub use meter_flush::MeterFlushService;
pub use node_resurrection::RecoveryOrchestrator;
pub use payment_reconciler::PaymentReconciler;
pub use retention_reaper::spawn_retention_reaper;
pub use topup_scheduler::TopupSchedulerService;
pub use usage_aggregator::UsageAggregatorService;
