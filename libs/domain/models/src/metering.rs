// [libs/domain/models/src/metering.rs]
/*!
 * =================================================================
 * APARATO: METER EVENT CONTRACT (V3.1 - WAL ALIGNED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CONTRATO BIT-PERFECTO DEL WAL Y AGREGADOS DE PERIODO
 *
 * # Mathematical Proof (Period Alignment):
 * Para una longitud de periodo P, el bucket de un instante t es
 * [floor(t/P)·P, floor(t/P)·P + P). La función es total y estable ante
 * re-ejecución, por lo que el agregador puede re-sumar un periodo
 * arbitrarias veces produciendo filas idénticas.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use hive_core_credits::CreditAmount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/**
 * Evento de consumo medido. Una línea JSON del WAL es exactamente la
 * serialización de este contrato (UTF-8, terminador '\n').
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeterEvent {
    pub id: String,

    pub tenant: String,

    /// Capacidad facturable invocada (chat, embeddings, vision...).
    pub capability: String,

    /// Proveedor externo que sirvió la llamada.
    pub provider: String,

    /// Costo mayorista del proveedor (unidades crudas).
    pub cost: CreditAmount,

    /// Precio al tenant con margen aplicado (unidades crudas).
    pub charge: CreditAmount,

    /// Milisegundos Unix UTC del instante de la llamada.
    pub timestamp: i64,

    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Duración de la llamada en milisegundos.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl MeterEvent {
    /// Asigna un identificador UUID v4 si el emisor no lo trajo.
    pub fn ensure_identifier(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }
}

/// Línea del Dead-Letter Queue: el evento más la metadata del fallo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    #[serde(flatten)]
    pub event: MeterEvent,

    /// Marca de tiempo UTC del destierro al DLQ (RFC3339).
    pub dlq_timestamp: String,

    /// Diagnóstico del último intento de persistencia fallido.
    pub dlq_error: String,

    /// Cantidad de reintentos agotados antes del destierro.
    pub dlq_retries: u32,
}

/// Agregado pre-calculado por periodo de facturación cerrado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingPeriodSummary {
    pub tenant: String,
    pub capability: String,
    pub provider: String,

    /// Inicio del bucket, milisegundos Unix, alineado a floor(t/P)·P.
    pub period_start: i64,
    /// Fin exclusivo del bucket (period_start + P).
    pub period_end: i64,

    pub event_count: u64,
    pub total_cost: CreditAmount,
    pub total_charge: CreditAmount,
    pub total_duration_ms: i64,
}

/// Calcula el inicio del periodo que contiene al instante dado.
#[must_use]
pub fn period_start_for(timestamp_ms: i64, period_length_ms: i64) -> i64 {
    debug_assert!(period_length_ms > 0);
    timestamp_ms.div_euclid(period_length_ms) * period_length_ms
}

/// Conveniencia para el emisor: milisegundos Unix del instante actual.
#[must_use]
pub fn now_unix_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Conveniencia para tests y reportes: instante RFC3339 desde ms Unix.
#[must_use]
pub fn unix_ms_to_datetime(timestamp_ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
}
