// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: RELATIONAL INFRASTRUCTURE HUB (V8.0 - CONTROL PLANE)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DE CLIENTE, ESQUEMA Y REPOSITORIOS
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::LedgerDbClient;
pub use errors::DbError;
