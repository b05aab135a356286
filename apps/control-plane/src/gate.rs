// [apps/control-plane/src/gate.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY CREDIT GATE (V7.3 - BOUNDARY SEALED)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: PRE-CHEQUEO DE BALANCE Y POST-DÉBITO MEDIDO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RESULT OVER THROW: El veredicto de la compuerta es un tipo suma
 *    con discriminante; los rechazos esperados jamás son pánicos.
 * 2. ONE-SHOT CROSSING: BalanceExhausted se publica exactamente una vez
 *    por cruce positivo -> no-positivo, determinado comparando balances
 *    pre y post débito, jamás por el signo absoluto.
 * 3. SINGLE ROUNDING POINT: El cargo nace de la multiplicación de
 *    margen (half-away-from-zero); la compuerta no redondea nada más.
 *
 * # Mathematical Proof (Verdict Partition):
 * Para balance b, costo estimado c >= 0 y gracia g > 0, el veredicto
 * particiona Z exactamente: permit sii b >= c o -g < b < 0;
 * insufficient_credits sii 0 <= b < c; credits_exhausted sii b <= -g.
 * La frontera b = -g rechaza (la gracia exige estrictamente mayor).
 * =================================================================
 */

use crate::state::AppState;
use hive_core_credits::{CreditAmount, CreditError};
use hive_domain_models::ledger::DebitKind;
use hive_domain_models::metering::{now_unix_ms, MeterEvent};
use hive_infra_db::DbError;
use hive_infra_meter_wal::WalError;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum GateFault {
    #[error(transparent)]
    Ledger(#[from] DbError),

    #[error(transparent)]
    MeterWal(#[from] WalError),

    #[error(transparent)]
    Arithmetic(#[from] CreditError),
}

/// Veredicto del pre-chequeo; los rechazos portan su código de cable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// Balance cubre el costo estimado.
    Permit,
    /// Balance en la ventana de gracia (-g, 0): se permite con marcador.
    PermitWithGrace,
    /// Balance no-negativo pero insuficiente para el costo estimado.
    /// La UI puede solicitar top-up sin bloquear duro.
    InsufficientCredits,
    /// Balance agotado más allá de la gracia: bloqueo duro.
    CreditsExhausted,
}

impl GateVerdict {
    #[must_use]
    pub fn is_permitted(&self) -> bool {
        matches!(self, GateVerdict::Permit | GateVerdict::PermitWithGrace)
    }

    /// Código user-visible del rechazo; None cuando la llamada procede.
    #[must_use]
    pub fn rejection_code(&self) -> Option<&'static str> {
        match self {
            GateVerdict::InsufficientCredits => Some("insufficient_credits"),
            GateVerdict::CreditsExhausted => Some("credits_exhausted"),
            _ => None,
        }
    }
}

/// Desenlace del post-débito medido.
#[derive(Debug, Clone)]
pub struct PostDebitOutcome {
    /// Cargo al tenant en centavos enteros (margen ya aplicado).
    pub charge_cents: i64,
    /// Balance resultante tras el débito.
    pub new_balance: CreditAmount,
    /// true cuando ESTE débito cruzó el balance de positivo a <= 0.
    pub exhaustion_crossed: bool,
    /// Identificador del evento de medición emitido al WAL.
    pub meter_event_id: String,
}

/**
 * Compuerta de créditos que envuelve cada llamada externa facturable.
 */
pub struct CreditGate {
    application_state: AppState,
}

impl CreditGate {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Pre-chequeo de vuelo: particiona el balance según costo y gracia.
     *
     * # Logic:
     * 1. b >= c                  -> Permit
     * 2. 0 <= b < c              -> InsufficientCredits (top-up prompt)
     * 3. -g < b < 0              -> PermitWithGrace (carrera débito/recarga)
     * 4. b <= -g                 -> CreditsExhausted (la frontera rechaza)
     */
    #[instrument(skip(self, estimated_cost))]
    pub async fn pre_check(
        &self,
        tenant_identifier: &str,
        estimated_cost: CreditAmount,
    ) -> Result<GateVerdict, GateFault> {
        let balance_snapshot =
            self.application_state.ledger_repository.balance(tenant_identifier).await?;
        let current_balance = balance_snapshot.amount;

        let grace_floor = CreditAmount::from_cents(self.application_state.config.grace_buffer_cents)?
            .negated();

        let verdict = if !current_balance.less_than(estimated_cost) {
            GateVerdict::Permit
        } else if !current_balance.is_negative() {
            GateVerdict::InsufficientCredits
        } else if current_balance.greater_than(grace_floor) {
            GateVerdict::PermitWithGrace
        } else {
            GateVerdict::CreditsExhausted
        };

        debug!(
            "🚦 [CREDIT_GATE]: Tenant {} verdict {:?} (balance {}).",
            tenant_identifier,
            verdict,
            current_balance.to_display_string()
        );
        Ok(verdict)
    }

    /**
     * Post-débito medido: aplica margen, debita con negativo permitido,
     * emite el evento de medición y publica el cruce de agotamiento.
     *
     * # Logic:
     * El débito usa allow_negative=true porque la llamada externa YA
     * ocurrió; el costo es irrecuperable y el Ledger debe reflejarlo.
     * Un cargo de cero centavos (costo despreciable) emite el evento de
     * medición sin tocar el Ledger.
     */
    #[instrument(skip(self, wholesale_cost), fields(tenant = %tenant_identifier))]
    pub async fn post_debit(
        &self,
        tenant_identifier: &str,
        wholesale_cost: CreditAmount,
        capability: &str,
        provider: &str,
        model: &str,
        session_identifier: Option<String>,
        call_duration_ms: Option<i64>,
    ) -> Result<PostDebitOutcome, GateFault> {
        // 1. RESOLUCIÓN DE MARGEN Y CARGO (único punto de redondeo).
        let resolved_margin = self.application_state.config.margin_table.resolve(provider, model);
        let charge_cents = resolved_margin.charge_cents(wholesale_cost);
        let charge_amount = CreditAmount::from_cents(charge_cents)?;

        // 2. DÉBITO CON CRUCE VIGILADO.
        let pre_debit_balance =
            self.application_state.ledger_repository.balance(tenant_identifier).await?.amount;

        let new_balance = if charge_cents > 0 {
            let debit_record = self
                .application_state
                .ledger_repository
                .debit(
                    tenant_identifier,
                    charge_amount,
                    DebitKind::AdapterUsage,
                    Some(&format!("{provider}/{capability}")),
                    None,
                    true, // allow_negative: la llamada externa ya ocurrió
                    None,
                )
                .await?;
            debit_record.balance_after
        } else {
            pre_debit_balance
        };

        // 3. EMISIÓN AL WAL (ruta caliente local, jamás I/O remoto).
        let meter_event_id = self.application_state.meter_wal.emit(MeterEvent {
            id: String::new(),
            tenant: tenant_identifier.to_string(),
            capability: capability.to_string(),
            provider: provider.to_string(),
            cost: wholesale_cost,
            charge: charge_amount,
            timestamp: now_unix_ms(),
            session_id: session_identifier,
            duration: call_duration_ms,
        })?;

        // 4. SEÑAL ONE-SHOT DE AGOTAMIENTO (cruce, no signo absoluto).
        let exhaustion_crossed = pre_debit_balance.is_positive() && !new_balance.is_positive();
        if exhaustion_crossed {
            self.application_state
                .event_bus
                .publish_balance_exhausted(tenant_identifier, new_balance.to_cents());
        }

        Ok(PostDebitOutcome {
            charge_cents,
            new_balance,
            exhaustion_crossed,
            meter_event_id,
        })
    }
}
