// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY REGISTRY (V8.0 - CONTROL PLANE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO NOMINAL DE LOS ADAPTADORES DE PERSISTENCIA
 * =================================================================
 */

pub mod audit;
pub mod billing_support;
pub mod credential;
pub mod fleet;
pub mod ledger;
pub mod meter;
pub mod notification;
pub mod purge;
pub mod recovery;
pub mod snapshot;

pub use audit::AuditRepository;
pub use billing_support::BillingSupportRepository;
pub use credential::CredentialRepository;
pub use fleet::FleetRepository;
pub use ledger::LedgerRepository;
pub use meter::MeterRepository;
pub use notification::NotificationRepository;
pub use purge::PurgeRepository;
pub use recovery::RecoveryRepository;
pub use snapshot::SnapshotRepository;
