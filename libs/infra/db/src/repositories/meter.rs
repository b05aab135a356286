// [libs/infra/db/src/repositories/meter.rs]
/*!
 * =================================================================
 * APARATO: METER PERSISTENCE REPOSITORY (V8.2 - EXACTLY ONCE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CRISTALIZACIÓN DE EVENTOS Y AGREGADOS DE PERIODO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDEMPOTENT INGESTION: La inserción masiva usa INSERT OR IGNORE
 *    sobre la llave primaria; la emisión at-least-once del WAL colapsa
 *    a contabilidad exactly-once.
 * 2. FULL RE-SUM UPSERT: El agregador reemplaza el resumen del periodo
 *    con la re-suma completa; ejecutarlo dos veces produce filas
 *    idénticas (idempotencia estructural).
 * 3. TRANSACTIONAL BURSTS: Cada ráfaga de inserción viaja en una
 *    transacción ACID, amortizando el RTT de O(N) a O(1).
 * =================================================================
 */

use crate::errors::DbError;
use crate::LedgerDbClient;
use hive_core_credits::CreditAmount;
use hive_domain_models::metering::{period_start_for, BillingPeriodSummary, MeterEvent};
use libsql::params;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub struct MeterRepository {
    /// Cliente táctico para el enlace con el cluster relacional.
    database_client: LedgerDbClient,
}

impl MeterRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /**
     * Inserta una ráfaga de eventos del WAL en una transacción.
     *
     * # Performance:
     * O(N) en memoria, O(1) en transacciones de red.
     *
     * @returns Cantidad de eventos procesados (incluye los ya presentes).
     */
    #[instrument(skip(self, meter_events_batch), fields(count = meter_events_batch.len()))]
    pub async fn insert_events_bulk(
        &self,
        meter_events_batch: &[MeterEvent],
    ) -> Result<usize, DbError> {
        if meter_events_batch.is_empty() {
            return Ok(0);
        }

        let database_connection = self.database_client.get_connection()?;
        let atomic_transaction = database_connection.transaction().await?;

        // INSERT OR IGNORE: un re-flush tras un crash parcial no duplica.
        let bulk_insert_sql = r#"
            INSERT OR IGNORE INTO meter_events (
                id, tenant_id, capability, provider,
                cost_raw, charge_raw, timestamp_ms, session_id, duration_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#;

        for meter_event in meter_events_batch {
            atomic_transaction
                .execute(
                    bulk_insert_sql,
                    params![
                        meter_event.id.clone(),
                        meter_event.tenant.clone(),
                        meter_event.capability.clone(),
                        meter_event.provider.clone(),
                        meter_event.cost.raw(),
                        meter_event.charge.raw(),
                        meter_event.timestamp,
                        meter_event.session_id.clone(),
                        meter_event.duration,
                    ],
                )
                .await?;
        }

        atomic_transaction.commit().await?;

        debug!("✅ [METER_SYNC]: {} meter events secured in the relational strata.", meter_events_batch.len());
        Ok(meter_events_batch.len())
    }

    /**
     * Re-suma los periodos cerrados dentro del horizonte de gracia y
     * sella los resúmenes vía UPSERT de reemplazo completo.
     *
     * # Mathematical Proof (Idempotent Aggregation):
     * El horizonte [H, C) está alineado a periodos: H = floor((now - P -
     * grace)/P)·P y C = floor(now/P)·P. Cada grupo (tenant, capability,
     * provider, periodo) se re-suma desde las filas crudas, de modo que
     * ejecuciones repetidas convergen al mismo estado. El periodo en
     * curso (>= C) queda siempre excluido.
     *
     * @returns Cantidad de filas de resumen selladas.
     */
    #[instrument(skip(self))]
    pub async fn aggregate_closed_periods(
        &self,
        now_ms: i64,
        period_length_ms: i64,
        late_arrival_grace_ms: i64,
    ) -> Result<usize, DbError> {
        let horizon_start_ms =
            period_start_for(now_ms - period_length_ms - late_arrival_grace_ms, period_length_ms);
        let current_period_start_ms = period_start_for(now_ms, period_length_ms);

        if horizon_start_ms >= current_period_start_ms {
            return Ok(0);
        }

        let database_connection = self.database_client.get_connection()?;
        let mut event_rows = database_connection
            .query(
                r#"
                SELECT tenant_id, capability, provider, cost_raw, charge_raw,
                       timestamp_ms, duration_ms
                FROM meter_events
                WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                "#,
                params![horizon_start_ms, current_period_start_ms],
            )
            .await?;

        // Re-suma en RAM agrupando por (tenant, capability, provider, periodo).
        let mut period_groups: BTreeMap<(String, String, String, i64), BillingPeriodSummary> =
            BTreeMap::new();

        while let Some(event_row) = event_rows.next().await? {
            let tenant: String = event_row.get(0)?;
            let capability: String = event_row.get(1)?;
            let provider: String = event_row.get(2)?;
            let cost_raw: i64 = event_row.get(3)?;
            let charge_raw: i64 = event_row.get(4)?;
            let timestamp_ms: i64 = event_row.get(5)?;
            let duration_ms: Option<i64> = event_row.get(6)?;

            let period_start_ms = period_start_for(timestamp_ms, period_length_ms);
            let group_key = (tenant.clone(), capability.clone(), provider.clone(), period_start_ms);

            let summary = period_groups.entry(group_key).or_insert_with(|| BillingPeriodSummary {
                tenant,
                capability,
                provider,
                period_start: period_start_ms,
                period_end: period_start_ms + period_length_ms,
                event_count: 0,
                total_cost: CreditAmount::ZERO,
                total_charge: CreditAmount::ZERO,
                total_duration_ms: 0,
            });

            summary.event_count += 1;
            summary.total_cost = CreditAmount::from_raw(summary.total_cost.raw() + cost_raw);
            summary.total_charge = CreditAmount::from_raw(summary.total_charge.raw() + charge_raw);
            summary.total_duration_ms += duration_ms.unwrap_or(0);
        }

        if period_groups.is_empty() {
            return Ok(0);
        }

        let atomic_transaction = database_connection.transaction().await?;
        let upsert_summary_sql = r#"
            INSERT INTO billing_period_summaries (
                tenant_id, capability, provider, period_start_ms, period_end_ms,
                event_count, total_cost_raw, total_charge_raw, total_duration_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(tenant_id, capability, provider, period_start_ms) DO UPDATE SET
                period_end_ms = excluded.period_end_ms,
                event_count = excluded.event_count,
                total_cost_raw = excluded.total_cost_raw,
                total_charge_raw = excluded.total_charge_raw,
                total_duration_ms = excluded.total_duration_ms
        "#;

        let sealed_summaries_count = period_groups.len();
        for summary in period_groups.values() {
            atomic_transaction
                .execute(
                    upsert_summary_sql,
                    params![
                        summary.tenant.clone(),
                        summary.capability.clone(),
                        summary.provider.clone(),
                        summary.period_start,
                        summary.period_end,
                        summary.event_count as i64,
                        summary.total_cost.raw(),
                        summary.total_charge.raw(),
                        summary.total_duration_ms,
                    ],
                )
                .await?;
        }

        atomic_transaction.commit().await?;

        debug!("📊 [AGGREGATOR]: {} period summaries re-summed and sealed.", sealed_summaries_count);
        Ok(sealed_summaries_count)
    }

    /// Resúmenes de un tenant, periodo más reciente primero.
    #[instrument(skip(self))]
    pub async fn list_summaries(
        &self,
        tenant_identifier: &str,
    ) -> Result<Vec<BillingPeriodSummary>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut summary_rows = database_connection
            .query(
                r#"
                SELECT tenant_id, capability, provider, period_start_ms, period_end_ms,
                       event_count, total_cost_raw, total_charge_raw, total_duration_ms
                FROM billing_period_summaries
                WHERE tenant_id = ?1
                ORDER BY period_start_ms DESC
                "#,
                params![tenant_identifier],
            )
            .await?;

        let mut summaries = Vec::new();
        while let Some(summary_row) = summary_rows.next().await? {
            summaries.push(BillingPeriodSummary {
                tenant: summary_row.get(0)?,
                capability: summary_row.get(1)?,
                provider: summary_row.get(2)?,
                period_start: summary_row.get(3)?,
                period_end: summary_row.get(4)?,
                event_count: summary_row.get::<i64>(5)? as u64,
                total_cost: CreditAmount::from_raw(summary_row.get::<i64>(6)?),
                total_charge: CreditAmount::from_raw(summary_row.get::<i64>(7)?),
                total_duration_ms: summary_row.get(8)?,
            });
        }
        Ok(summaries)
    }

    /// Conteo crudo de eventos de un tenant (vista de agregación delgada).
    #[instrument(skip(self))]
    pub async fn count_events_for_tenant(&self, tenant_identifier: &str) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut count_rows = database_connection
            .query(
                "SELECT COUNT(*) FROM meter_events WHERE tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;

        match count_rows.next().await? {
            Some(count_row) => Ok(count_row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }
}
