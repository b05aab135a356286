// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V8.1 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. KIND OVER DETAIL: El núcleo expone la clase del fallo, jamás el
 *    detalle de implementación del storage; los fallos esperados del
 *    Ledger (balance insuficiente, referencia duplicada) son variantes
 *    dedicadas, no pánicos.
 * 2. PANOPTICON COMPLIANCE: Mensajes con prefijo de estrato para su
 *    renderizado cromático en el panel de administración.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el cluster relacional.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo en la configuración del entorno (variables vacías o malformadas).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    // --- ESTRATO DEL LEDGER DE CRÉDITOS (FALLOS ESPERADOS) ---

    /// Cargo rechazado: el balance del tenant no cubre el monto.
    /// Fallo normal de negocio; el gateway lo mapea a 'insufficient_credits'.
    #[error("[L3_LEDGER_FAULT]: INSUFFICIENT_BALANCE")]
    InsufficientBalance,

    /// La llave de idempotencia ya existe en el registro de transacciones.
    /// Los webhooks la tratan como éxito sin efectos.
    #[error("[L3_LEDGER_FAULT]: DUPLICATE_REFERENCE")]
    DuplicateReference,

    /// El monto de la operación viola el contrato (cero o negativo).
    #[error("[L3_LEDGER_FAULT]: NON_POSITIVE_AMOUNT")]
    NonPositiveAmount,

    // --- ESTRATO DE ENTIDADES ---

    /// La entidad solicitada no existe o fue borrada (blando).
    #[error("[L3_ENTITY_FAULT]: IDENTIFIER_NOT_FOUND")]
    NotFound,

    /// La transición de estado solicitada viola la máquina de estados.
    #[error("[L3_ENTITY_FAULT]: INVALID_STATE_TRANSITION")]
    InvalidState,
}

impl DbError {
    /**
     * Reclasifica una violación de índice único sobre reference_id como
     * el fallo dedicado de idempotencia.
     *
     * # Logic:
     * El índice único de base de datos es la autoridad (el pre-chequeo de
     * la aplicación jamás basta por sí solo); el motor reporta la
     * violación como error de query y aquí se eleva a su clase semántica.
     */
    pub fn classify_reference_collision(self) -> DbError {
        if let DbError::QueryError(ref query_fault) = self {
            let diagnostic = query_fault.to_string();
            if diagnostic.contains("UNIQUE constraint failed")
                && diagnostic.contains("reference_id")
            {
                return DbError::DuplicateReference;
            }
        }
        self
    }
}
