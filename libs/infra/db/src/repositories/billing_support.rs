// [libs/infra/db/src/repositories/billing_support.rs]
/*!
 * =================================================================
 * APARATO: BILLING SUPPORT REPOSITORY (V8.2 - RECONCILIATION STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: MAPEOS DE CLIENTE, CARGOS Y AGENDAS DE AUTO-TOPUP
 *
 * # Mathematical Proof (Anti-Hammer Scheduling):
 * advance_schedule avanza next_charge_at INCONDICIONALMENTE en
 * interval_hours antes de conocer el desenlace del cargo; un procesador
 * caído produce a lo sumo un intento por intervalo, jamás un martilleo.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::ledger::parse_rfc3339;
use crate::LedgerDbClient;
use chrono::{DateTime, Duration, Utc};
use libsql::{params, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Agenda de recarga automática de un tenant.
#[derive(Debug, Clone)]
pub struct TopupSchedule {
    pub tenant_id: String,
    pub amount_cents: i64,
    pub interval_hours: i64,
    pub next_charge_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub is_enabled: bool,
}

pub struct BillingSupportRepository {
    database_client: LedgerDbClient,
}

impl BillingSupportRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    // --- MAPEO TENANT <-> CLIENTE DEL PROCESADOR ---

    #[instrument(skip(self))]
    pub async fn upsert_processor_customer(
        &self,
        tenant_identifier: &str,
        processor_customer_identifier: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO processor_customers (tenant_id, processor_customer_id, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    processor_customer_id = excluded.processor_customer_id,
                    updated_at = excluded.updated_at
                "#,
                params![tenant_identifier, processor_customer_identifier, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    pub async fn processor_customer_for_tenant(
        &self,
        tenant_identifier: &str,
    ) -> Result<Option<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut mapping_rows = database_connection
            .query(
                "SELECT processor_customer_id FROM processor_customers WHERE tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;

        match mapping_rows.next().await? {
            Some(mapping_row) => Ok(Some(mapping_row.get(0)?)),
            None => Ok(None),
        }
    }

    pub async fn tenant_for_processor_customer(
        &self,
        processor_customer_identifier: &str,
    ) -> Result<Option<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut mapping_rows = database_connection
            .query(
                "SELECT tenant_id FROM processor_customers WHERE processor_customer_id = ?1",
                params![processor_customer_identifier],
            )
            .await?;

        match mapping_rows.next().await? {
            Some(mapping_row) => Ok(Some(mapping_row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Borra el mapeo cuando el procesador elimina al cliente.
    #[instrument(skip(self))]
    pub async fn remove_processor_customer(
        &self,
        processor_customer_identifier: &str,
    ) -> Result<u64, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let deleted_rows = database_connection
            .execute(
                "DELETE FROM processor_customers WHERE processor_customer_id = ?1",
                params![processor_customer_identifier],
            )
            .await?;
        Ok(deleted_rows)
    }

    // --- REGISTRO DE CARGOS DEL PROCESADOR ---

    #[instrument(skip(self))]
    pub async fn record_payment_charge(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        reference_identifier: Option<&str>,
        charge_reason: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO payment_charges (id, tenant_id, amount_cents, reference_id, charge_reason, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    tenant_identifier,
                    amount_cents,
                    reference_identifier.map(str::to_string),
                    charge_reason,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    // --- NIVEL DE SUSCRIPCIÓN DEL TENANT ---

    #[instrument(skip(self))]
    pub async fn upsert_tenant_tier(
        &self,
        tenant_identifier: &str,
        tier_label: &str,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO tenant_status (tenant_id, tier, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    tier = excluded.tier,
                    updated_at = excluded.updated_at
                "#,
                params![tenant_identifier, tier_label, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    pub async fn tenant_tier(&self, tenant_identifier: &str) -> Result<Option<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut tier_rows = database_connection
            .query(
                "SELECT tier FROM tenant_status WHERE tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;

        match tier_rows.next().await? {
            Some(tier_row) => Ok(Some(tier_row.get(0)?)),
            None => Ok(None),
        }
    }

    // --- AGENDAS DE AUTO-TOPUP ---

    #[instrument(skip(self))]
    pub async fn upsert_topup_schedule(
        &self,
        tenant_identifier: &str,
        amount_cents: i64,
        interval_hours: i64,
        first_charge_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                r#"
                INSERT INTO topup_schedules (
                    tenant_id, amount_cents, interval_hours, next_charge_at,
                    consecutive_failures, is_enabled, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, 0, 1, ?5)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    amount_cents = excluded.amount_cents,
                    interval_hours = excluded.interval_hours,
                    next_charge_at = excluded.next_charge_at,
                    consecutive_failures = 0,
                    is_enabled = 1,
                    updated_at = excluded.updated_at
                "#,
                params![
                    tenant_identifier,
                    amount_cents,
                    interval_hours,
                    first_charge_at.to_rfc3339(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;
        Ok(())
    }

    /// Agendas habilitadas cuyo próximo cargo ya venció.
    #[instrument(skip(self))]
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<TopupSchedule>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut schedule_rows = database_connection
            .query(
                &format!("{SCHEDULE_PROJECTION} WHERE is_enabled = 1 AND next_charge_at <= ?1"),
                params![now.to_rfc3339()],
            )
            .await?;

        let mut due = Vec::new();
        while let Some(schedule_row) = schedule_rows.next().await? {
            due.push(map_schedule_row(&schedule_row)?);
        }
        Ok(due)
    }

    /**
     * Avance incondicional de la agenda (protección anti-martilleo).
     * Se ejecuta ANTES de conocer el desenlace del cargo.
     */
    #[instrument(skip(self))]
    pub async fn advance_schedule(&self, schedule: &TopupSchedule) -> Result<(), DbError> {
        let next_charge_at = schedule.next_charge_at + Duration::hours(schedule.interval_hours);
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE topup_schedules SET next_charge_at = ?2, updated_at = ?3 WHERE tenant_id = ?1",
                params![schedule.tenant_id.clone(), next_charge_at.to_rfc3339(), Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    /// Cargo exitoso: el contador de fallos consecutivos vuelve a cero.
    #[instrument(skip(self))]
    pub async fn record_schedule_success(&self, tenant_identifier: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "UPDATE topup_schedules SET consecutive_failures = 0, updated_at = ?2 WHERE tenant_id = ?1",
                params![tenant_identifier, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    /**
     * Cargo fallido: incrementa el contador y deshabilita la agenda al
     * alcanzar el tope configurado.
     *
     * @returns true si la agenda quedó deshabilitada en esta invocación.
     */
    #[instrument(skip(self))]
    pub async fn record_schedule_failure(
        &self,
        tenant_identifier: &str,
        disable_threshold: u32,
    ) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;

        database_connection
            .execute(
                "UPDATE topup_schedules SET consecutive_failures = consecutive_failures + 1, updated_at = ?2 WHERE tenant_id = ?1",
                params![tenant_identifier, Utc::now().to_rfc3339()],
            )
            .await?;

        let disabled_rows = database_connection
            .execute(
                "UPDATE topup_schedules SET is_enabled = 0 WHERE tenant_id = ?1 AND consecutive_failures >= ?2 AND is_enabled = 1",
                params![tenant_identifier, i64::from(disable_threshold)],
            )
            .await?;

        if disabled_rows > 0 {
            warn!(
                "🛑 [TOPUP_SCHEDULER]: Schedule for tenant {} disabled after {} consecutive failures.",
                tenant_identifier, disable_threshold
            );
        } else {
            debug!("⚠️ [TOPUP_SCHEDULER]: Failure recorded for tenant {}.", tenant_identifier);
        }
        Ok(disabled_rows > 0)
    }

    pub async fn get_schedule(
        &self,
        tenant_identifier: &str,
    ) -> Result<Option<TopupSchedule>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut schedule_rows = database_connection
            .query(
                &format!("{SCHEDULE_PROJECTION} WHERE tenant_id = ?1"),
                params![tenant_identifier],
            )
            .await?;

        match schedule_rows.next().await? {
            Some(schedule_row) => Ok(Some(map_schedule_row(&schedule_row)?)),
            None => Ok(None),
        }
    }
}

const SCHEDULE_PROJECTION: &str = r#"
    SELECT tenant_id, amount_cents, interval_hours, next_charge_at,
           consecutive_failures, is_enabled
    FROM topup_schedules
"#;

fn map_schedule_row(schedule_row: &Row) -> Result<TopupSchedule, DbError> {
    Ok(TopupSchedule {
        tenant_id: schedule_row.get(0)?,
        amount_cents: schedule_row.get(1)?,
        interval_hours: schedule_row.get(2)?,
        next_charge_at: parse_rfc3339(&schedule_row.get::<String>(3)?)?,
        consecutive_failures: schedule_row.get::<i64>(4)? as u32,
        is_enabled: schedule_row.get::<i64>(5)? != 0,
    })
}
