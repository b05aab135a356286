// [libs/infra/db/src/repositories/ledger.rs]
/*!
 * =================================================================
 * APARATO: CREDIT LEDGER REPOSITORY (V8.4 - FINANCIAL AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: FUENTE DE VERDAD FINANCIERA DEL PLANO DE CONTROL
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TRANSACTIONAL PAIRING: Cada abono/cargo sella la fila de balance y
 *    la fila de transacción dentro de UNA transacción ACID; el balance
 *    es siempre la suma exacta del registro append-only.
 * 2. DB-LEVEL IDEMPOTENCY: La colisión de reference_id la detecta el
 *    índice único del motor, jamás solo el pre-chequeo de aplicación.
 * 3. EXPECTED FAILURES AS VALUES: Balance insuficiente y referencia
 *    duplicada son variantes dedicadas del catálogo, no pánicos.
 * 4. NOMINAL PURITY: Nomenclatura nominal absoluta (amt -> credit_amount,
 *    ref -> reference_identifier).
 *
 * # Mathematical Proof (Balance Conservation):
 * Sea B(t) el balance y S(t) la suma de transacciones del tenant t.
 * Cada operación exitosa ejecuta {S += delta; B = B_old + delta} bajo el
 * mismo commit, luego B(t) = S(t) es invariante en todo instante
 * observable. balance_after de cada fila captura B inmediatamente
 * después de su aplicación.
 * =================================================================
 */

use crate::errors::DbError;
use crate::LedgerDbClient;
use chrono::{DateTime, Utc};
use hive_core_credits::CreditAmount;
use hive_domain_models::ledger::{
    CreditBalanceSnapshot, CreditKind, CreditTransactionRecord, DebitKind, MemberUsageAggregate,
    TransactionKind,
};
use libsql::{params, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Tope duro de paginación del historial.
const HISTORY_LIMIT_CEILING: u32 = 250;

/// Parámetros de consulta del historial de transacciones.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Tamaño de página solicitado; se fija al rango [1, 250].
    pub limit: u32,
    pub offset: u32,
    /// Filtro opcional por discriminante de tipo.
    pub kind_filter: Option<String>,
}

pub struct LedgerRepository {
    /// Cliente táctico para el enlace con el cluster relacional.
    database_client: LedgerDbClient,
}

impl LedgerRepository {
    #[must_use]
    pub fn new(database_client: LedgerDbClient) -> Self {
        Self { database_client }
    }

    /**
     * Abona créditos al tenant.
     *
     * # Errors:
     * - `DbError::NonPositiveAmount`: el monto no es estrictamente positivo.
     * - `DbError::DuplicateReference`: reference_id ya usado (no-op para
     *   webhooks).
     * - `DbError::QueryError`: fallo transitorio del storage.
     */
    #[instrument(skip(self, credit_amount, description), fields(tenant = %tenant_identifier))]
    pub async fn credit(
        &self,
        tenant_identifier: &str,
        credit_amount: CreditAmount,
        credit_kind: CreditKind,
        description: Option<&str>,
        reference_identifier: Option<&str>,
        funding_source: Option<&str>,
        attributed_user_identifier: Option<&str>,
    ) -> Result<CreditTransactionRecord, DbError> {
        self.apply_ledger_mutation(LedgerMutation {
            tenant_identifier,
            magnitude: credit_amount,
            is_debit: false,
            allow_negative: false,
            kind_label: TransactionKind::Credit(credit_kind).as_str(),
            description,
            reference_identifier,
            funding_source,
            attributed_user_identifier,
        })
        .await
    }

    /**
     * Carga créditos al tenant.
     *
     * # Logic:
     * Con allow_negative=false la operación se rechaza SIN escribir si el
     * balance no cubre la magnitud. Con allow_negative=true (gateway) el
     * balance puede cruzar a territorio negativo; si la fila de balance
     * no existía, se crea negativa.
     */
    #[instrument(skip(self, debit_amount, description), fields(tenant = %tenant_identifier))]
    pub async fn debit(
        &self,
        tenant_identifier: &str,
        debit_amount: CreditAmount,
        debit_kind: DebitKind,
        description: Option<&str>,
        reference_identifier: Option<&str>,
        allow_negative: bool,
        attributed_user_identifier: Option<&str>,
    ) -> Result<CreditTransactionRecord, DbError> {
        self.apply_ledger_mutation(LedgerMutation {
            tenant_identifier,
            magnitude: debit_amount,
            is_debit: true,
            allow_negative,
            kind_label: TransactionKind::Debit(debit_kind).as_str(),
            description,
            reference_identifier,
            funding_source: None,
            attributed_user_identifier,
        })
        .await
    }

    /**
     * Núcleo transaccional compartido de abonos y cargos.
     */
    async fn apply_ledger_mutation(
        &self,
        mutation: LedgerMutation<'_>,
    ) -> Result<CreditTransactionRecord, DbError> {
        if !mutation.magnitude.is_positive() {
            return Err(DbError::NonPositiveAmount);
        }

        let database_connection = self.database_client.get_connection()?;
        let atomic_transaction = database_connection.transaction().await?;

        // 1. LECTURA DEL BALANCE VIVO (cero si la fila está ausente).
        let mut balance_rows = atomic_transaction
            .query(
                "SELECT amount_raw FROM credit_balances WHERE tenant_id = ?1",
                params![mutation.tenant_identifier],
            )
            .await?;

        let old_balance = match balance_rows.next().await? {
            Some(balance_row) => CreditAmount::from_raw(balance_row.get::<i64>(0)?),
            None => CreditAmount::ZERO,
        };

        // 2. CÁLCULO DEL NUEVO BALANCE Y GUARDIA DE FONDOS.
        let signed_delta = if mutation.is_debit {
            if !mutation.allow_negative && old_balance.less_than(mutation.magnitude) {
                // Rechazo sin escritura: fallo esperado de negocio.
                atomic_transaction.rollback().await.ok();
                return Err(DbError::InsufficientBalance);
            }
            mutation.magnitude.negated()
        } else {
            mutation.magnitude
        };

        let new_balance = old_balance
            .add(signed_delta)
            .map_err(|arithmetic_fault| DbError::MappingError(arithmetic_fault.to_string()))?;

        // 3. SELLADO DEL REGISTRO APPEND-ONLY.
        // El índice único sobre reference_id aborta aquí ante colisión.
        let transaction_identifier = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let insert_result = atomic_transaction
            .execute(
                r#"
                INSERT INTO credit_transactions (
                    id, tenant_id, amount_raw, balance_after_raw, kind,
                    description, reference_id, funding_source,
                    attributed_user_id, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    transaction_identifier.clone(),
                    mutation.tenant_identifier,
                    signed_delta.raw(),
                    new_balance.raw(),
                    mutation.kind_label,
                    mutation.description.map(str::to_string),
                    mutation.reference_identifier.map(str::to_string),
                    mutation.funding_source.map(str::to_string),
                    mutation.attributed_user_identifier.map(str::to_string),
                    created_at.to_rfc3339(),
                ],
            )
            .await;

        if let Err(insert_fault) = insert_result {
            atomic_transaction.rollback().await.ok();
            return Err(DbError::QueryError(insert_fault).classify_reference_collision());
        }

        // 4. UPSERT DEL BALANCE (last_updated monótono no-decreciente).
        atomic_transaction
            .execute(
                r#"
                INSERT INTO credit_balances (tenant_id, amount_raw, last_updated)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    amount_raw = excluded.amount_raw,
                    last_updated = excluded.last_updated
                "#,
                params![
                    mutation.tenant_identifier,
                    new_balance.raw(),
                    created_at.to_rfc3339(),
                ],
            )
            .await?;

        atomic_transaction.commit().await?;

        debug!(
            "💳 [LEDGER]: {} sealed for tenant {}. Balance {} -> {}.",
            mutation.kind_label,
            mutation.tenant_identifier,
            old_balance.to_display_string(),
            new_balance.to_display_string()
        );

        Ok(CreditTransactionRecord {
            id: transaction_identifier,
            tenant_id: mutation.tenant_identifier.to_string(),
            amount: signed_delta,
            balance_after: new_balance,
            kind: mutation.kind_label.to_string(),
            description: mutation.description.map(str::to_string),
            reference_id: mutation.reference_identifier.map(str::to_string),
            funding_source: mutation.funding_source.map(str::to_string),
            attributed_user_id: mutation.attributed_user_identifier.map(str::to_string),
            created_at,
        })
    }

    /// Balance vivo del tenant; la fila ausente se interpreta como cero.
    #[instrument(skip(self))]
    pub async fn balance(&self, tenant_identifier: &str) -> Result<CreditBalanceSnapshot, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut balance_rows = database_connection
            .query(
                "SELECT amount_raw, last_updated FROM credit_balances WHERE tenant_id = ?1",
                params![tenant_identifier],
            )
            .await?;

        match balance_rows.next().await? {
            Some(balance_row) => Ok(CreditBalanceSnapshot {
                tenant_id: tenant_identifier.to_string(),
                amount: CreditAmount::from_raw(balance_row.get::<i64>(0)?),
                last_updated: parse_rfc3339(&balance_row.get::<String>(1)?)?,
            }),
            None => Ok(CreditBalanceSnapshot {
                tenant_id: tenant_identifier.to_string(),
                amount: CreditAmount::ZERO,
                last_updated: Utc::now(),
            }),
        }
    }

    /// Sondeo barato de idempotencia previo a construir un payload.
    #[instrument(skip(self))]
    pub async fn has_reference_id(&self, reference_identifier: &str) -> Result<bool, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut existence_rows = database_connection
            .query(
                "SELECT 1 FROM credit_transactions WHERE reference_id = ?1 LIMIT 1",
                params![reference_identifier],
            )
            .await?;
        Ok(existence_rows.next().await?.is_some())
    }

    /**
     * Historial paginado del tenant, más reciente primero.
     * El límite se fija al rango [1, 250]; offset >= 0.
     */
    #[instrument(skip(self, history_query))]
    pub async fn history(
        &self,
        tenant_identifier: &str,
        history_query: HistoryQuery,
    ) -> Result<Vec<CreditTransactionRecord>, DbError> {
        let clamped_limit = history_query.limit.clamp(1, HISTORY_LIMIT_CEILING);
        let database_connection = self.database_client.get_connection()?;

        let mut transaction_rows = match &history_query.kind_filter {
            Some(kind_label) => {
                database_connection
                    .query(
                        r#"
                        SELECT id, tenant_id, amount_raw, balance_after_raw, kind,
                               description, reference_id, funding_source,
                               attributed_user_id, created_at
                        FROM credit_transactions
                        WHERE tenant_id = ?1 AND kind = ?2
                        ORDER BY created_at DESC, id DESC
                        LIMIT ?3 OFFSET ?4
                        "#,
                        params![
                            tenant_identifier,
                            kind_label.as_str(),
                            i64::from(clamped_limit),
                            i64::from(history_query.offset)
                        ],
                    )
                    .await?
            }
            None => {
                database_connection
                    .query(
                        r#"
                        SELECT id, tenant_id, amount_raw, balance_after_raw, kind,
                               description, reference_id, funding_source,
                               attributed_user_id, created_at
                        FROM credit_transactions
                        WHERE tenant_id = ?1
                        ORDER BY created_at DESC, id DESC
                        LIMIT ?2 OFFSET ?3
                        "#,
                        params![
                            tenant_identifier,
                            i64::from(clamped_limit),
                            i64::from(history_query.offset)
                        ],
                    )
                    .await?
            }
        };

        let mut history_page = Vec::new();
        while let Some(transaction_row) = transaction_rows.next().await? {
            history_page.push(map_transaction_row(&transaction_row)?);
        }
        Ok(history_page)
    }

    /**
     * Agrupa las transacciones negativas por usuario atribuido.
     */
    #[instrument(skip(self))]
    pub async fn member_usage(
        &self,
        tenant_identifier: &str,
    ) -> Result<Vec<MemberUsageAggregate>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut aggregate_rows = database_connection
            .query(
                r#"
                SELECT attributed_user_id, SUM(amount_raw), COUNT(*)
                FROM credit_transactions
                WHERE tenant_id = ?1 AND amount_raw < 0 AND attributed_user_id IS NOT NULL
                GROUP BY attributed_user_id
                ORDER BY SUM(amount_raw) ASC
                "#,
                params![tenant_identifier],
            )
            .await?;

        let mut member_aggregates = Vec::new();
        while let Some(aggregate_row) = aggregate_rows.next().await? {
            let signed_total: i64 = aggregate_row.get(1)?;
            member_aggregates.push(MemberUsageAggregate {
                attributed_user_id: aggregate_row.get(0)?,
                // El total de consumo se reporta como magnitud positiva.
                total_debit: CreditAmount::from_raw(-signed_total),
                transaction_count: aggregate_row.get::<i64>(2)? as u64,
            });
        }
        Ok(member_aggregates)
    }

    /// Tenants con balance estrictamente positivo (deducciones periódicas).
    #[instrument(skip(self))]
    pub async fn tenants_with_balance(&self) -> Result<Vec<CreditBalanceSnapshot>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut balance_rows = database_connection
            .query(
                "SELECT tenant_id, amount_raw, last_updated FROM credit_balances WHERE amount_raw > 0",
                (),
            )
            .await?;

        let mut positive_balances = Vec::new();
        while let Some(balance_row) = balance_rows.next().await? {
            positive_balances.push(CreditBalanceSnapshot {
                tenant_id: balance_row.get(0)?,
                amount: CreditAmount::from_raw(balance_row.get::<i64>(1)?),
                last_updated: parse_rfc3339(&balance_row.get::<String>(2)?)?,
            });
        }
        Ok(positive_balances)
    }

    /// Actividad reciente a través de todos los tenants (panel de administración).
    #[instrument(skip(self))]
    pub async fn recent_activity(&self, page_size: u32) -> Result<Vec<CreditTransactionRecord>, DbError> {
        let clamped_limit = page_size.clamp(1, HISTORY_LIMIT_CEILING);
        let database_connection = self.database_client.get_connection()?;
        let mut transaction_rows = database_connection
            .query(
                r#"
                SELECT id, tenant_id, amount_raw, balance_after_raw, kind,
                       description, reference_id, funding_source,
                       attributed_user_id, created_at
                FROM credit_transactions
                ORDER BY created_at DESC, id DESC
                LIMIT ?1
                "#,
                params![i64::from(clamped_limit)],
            )
            .await?;

        let mut activity_feed = Vec::new();
        while let Some(transaction_row) = transaction_rows.next().await? {
            activity_feed.push(map_transaction_row(&transaction_row)?);
        }
        Ok(activity_feed)
    }
}

/// Parámetros internos del núcleo transaccional.
struct LedgerMutation<'a> {
    tenant_identifier: &'a str,
    /// Magnitud estrictamente positiva; el signo lo decide is_debit.
    magnitude: CreditAmount,
    is_debit: bool,
    allow_negative: bool,
    kind_label: &'static str,
    description: Option<&'a str>,
    reference_identifier: Option<&'a str>,
    funding_source: Option<&'a str>,
    attributed_user_identifier: Option<&'a str>,
}

fn map_transaction_row(transaction_row: &Row) -> Result<CreditTransactionRecord, DbError> {
    Ok(CreditTransactionRecord {
        id: transaction_row.get(0)?,
        tenant_id: transaction_row.get(1)?,
        amount: CreditAmount::from_raw(transaction_row.get::<i64>(2)?),
        balance_after: CreditAmount::from_raw(transaction_row.get::<i64>(3)?),
        kind: transaction_row.get(4)?,
        description: transaction_row.get::<Option<String>>(5)?,
        reference_id: transaction_row.get::<Option<String>>(6)?,
        funding_source: transaction_row.get::<Option<String>>(7)?,
        attributed_user_id: transaction_row.get::<Option<String>>(8)?,
        created_at: parse_rfc3339(&transaction_row.get::<String>(9)?)?,
    })
}

pub(crate) fn parse_rfc3339(timestamp_text: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp_text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|parse_fault| DbError::MappingError(format!("TIMESTAMP_DRIFT: {parse_fault}")))
}
