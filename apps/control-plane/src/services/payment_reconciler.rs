// [apps/control-plane/src/services/payment_reconciler.rs]
/*!
 * =================================================================
 * APARATO: PAYMENT RECONCILER SERVICE (V7.4 - REPLAY IMMUNE)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: APLICACIÓN IDEMPOTENTE DE EVENTOS DEL PROCESADOR
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SIGNATURE FIRST: Ningún byte del payload se interpreta antes de
 *    verificar la firma HMAC del cuerpo crudo.
 * 2. DOUBLE IDEMPOTENCY: Sondeo barato por reference_id seguido del
 *    índice único del Ledger como autoridad final; la colisión de
 *    referencia se reporta como handled=true sin efectos.
 * 3. STRICT PROJECTION: Los eventos se proyectan contra schemas
 *    estrictos por clase; un campo ausente colapsa el procesamiento.
 * =================================================================
 */

use crate::state::AppState;
use hive_core_credits::CreditAmount;
use hive_domain_models::ledger::CreditKind;
use hive_domain_models::snapshot::TenantTier;
use hive_domain_payments::{
    verify_webhook_signature, CanonicalPaymentEvent, PaymentError, WebhookEnvelope,
};
use hive_infra_db::DbError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum ReconcileFault {
    /// Firma inválida: el evento NO debe procesarse.
    #[error("[L4_RECONCILE_FAULT]: INVALID_SIGNATURE")]
    InvalidSignature,

    /// Payload malformado para su clase de evento (fail closed).
    #[error("[L4_RECONCILE_FAULT]: MALFORMED_EVENT -> {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl From<PaymentError> for ReconcileFault {
    fn from(payment_fault: PaymentError) -> Self {
        match payment_fault {
            PaymentError::InvalidSignature => ReconcileFault::InvalidSignature,
            PaymentError::MalformedEvent(diagnostic) => ReconcileFault::MalformedEvent(diagnostic),
        }
    }
}

/// Desenlace del procesamiento de un webhook.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub handled: bool,
    pub credited_cents: Option<i64>,
    pub tenant: Option<String>,
    pub event_type: String,
}

pub struct PaymentReconciler {
    application_state: AppState,
}

impl PaymentReconciler {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Procesa un webhook crudo del procesador de pagos.
     *
     * # Errors:
     * - `ReconcileFault::InvalidSignature`: la cabecera no autentica el
     *   cuerpo; no se procesa nada.
     * - `ReconcileFault::MalformedEvent`: clase conocida con schema
     *   violado.
     */
    #[instrument(skip(self, raw_body, signature_header))]
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookOutcome, ReconcileFault> {
        // 1. AUTENTICACIÓN DEL CUERPO CRUDO.
        verify_webhook_signature(
            raw_body,
            signature_header,
            &self.application_state.config.webhook_secret,
        )?;

        // 2. PROYECCIÓN CANÓNICA ESTRICTA.
        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|parse_fault| ReconcileFault::MalformedEvent(parse_fault.to_string()))?;
        let canonical_event = CanonicalPaymentEvent::project(&envelope)?;

        match canonical_event {
            CanonicalPaymentEvent::CreditPurchase {
                tenant_id,
                processor_customer_id,
                amount_cents,
                reference_id,
                ..
            } => {
                self.apply_credit_purchase(
                    &envelope.event_type,
                    &tenant_id,
                    processor_customer_id.as_deref(),
                    amount_cents,
                    &reference_id,
                )
                .await
            }

            CanonicalPaymentEvent::SubscriptionUpdated {
                tenant_id,
                processor_customer_id,
                tier,
            } => {
                // El tier desconocido es violación de schema, no default.
                let validated_tier = TenantTier::parse(&tier).ok_or_else(|| {
                    ReconcileFault::MalformedEvent(format!("UNKNOWN_TIER: {tier}"))
                })?;

                self.application_state
                    .billing_support_repository
                    .upsert_processor_customer(&tenant_id, &processor_customer_id)
                    .await?;
                self.application_state
                    .billing_support_repository
                    .upsert_tenant_tier(&tenant_id, validated_tier.as_str())
                    .await?;

                info!("🧾 [RECONCILER]: Tenant {} tier updated to {}.", tenant_id, tier);
                Ok(WebhookOutcome {
                    handled: true,
                    credited_cents: None,
                    tenant: Some(tenant_id),
                    event_type: envelope.event_type,
                })
            }

            CanonicalPaymentEvent::CustomerDeleted { processor_customer_id } => {
                let mapped_tenant = self
                    .application_state
                    .billing_support_repository
                    .tenant_for_processor_customer(&processor_customer_id)
                    .await?;
                self.application_state
                    .billing_support_repository
                    .remove_processor_customer(&processor_customer_id)
                    .await?;

                Ok(WebhookOutcome {
                    handled: true,
                    credited_cents: None,
                    tenant: mapped_tenant,
                    event_type: envelope.event_type,
                })
            }

            CanonicalPaymentEvent::Unrecognized { event_type } => {
                debug!("💤 [RECONCILER]: Unrecognized event class '{}' ignored.", event_type);
                Ok(WebhookOutcome {
                    handled: false,
                    credited_cents: None,
                    tenant: None,
                    event_type,
                })
            }
        }
    }

    /**
     * Aplica una compra de créditos con doble guardia de idempotencia.
     */
    async fn apply_credit_purchase(
        &self,
        event_type: &str,
        tenant_identifier: &str,
        processor_customer_identifier: Option<&str>,
        amount_cents: i64,
        reference_identifier: &str,
    ) -> Result<WebhookOutcome, ReconcileFault> {
        // Sondeo barato: la re-entrega conocida retorna sin efectos.
        if self
            .application_state
            .ledger_repository
            .has_reference_id(reference_identifier)
            .await?
        {
            debug!(
                "💤 [RECONCILER]: Reference {} already applied; replay absorbed.",
                reference_identifier
            );
            return Ok(WebhookOutcome {
                handled: true,
                credited_cents: None,
                tenant: Some(tenant_identifier.to_string()),
                event_type: event_type.to_string(),
            });
        }

        let purchase_amount = CreditAmount::from_cents(amount_cents)
            .map_err(|amount_fault| ReconcileFault::MalformedEvent(amount_fault.to_string()))?;

        let credit_outcome = self
            .application_state
            .ledger_repository
            .credit(
                tenant_identifier,
                purchase_amount,
                CreditKind::Purchase,
                Some(event_type),
                Some(reference_identifier),
                Some("payment_processor"),
                None,
            )
            .await;

        let credited_cents = match credit_outcome {
            Ok(_) => Some(amount_cents),
            // La autoridad final (índice único) absorbe la carrera entre
            // el sondeo y el commit: no-op exitoso.
            Err(DbError::DuplicateReference) => {
                warn!(
                    "💤 [RECONCILER]: Reference {} raced into the ledger; treated as success.",
                    reference_identifier
                );
                None
            }
            Err(storage_fault) => return Err(storage_fault.into()),
        };

        if let Some(customer_identifier) = processor_customer_identifier {
            self.application_state
                .billing_support_repository
                .upsert_processor_customer(tenant_identifier, customer_identifier)
                .await?;
        }

        if credited_cents.is_some() {
            self.application_state
                .billing_support_repository
                .record_payment_charge(
                    tenant_identifier,
                    amount_cents,
                    Some(reference_identifier),
                    event_type,
                )
                .await?;
            info!(
                "💳 [RECONCILER]: {}c credited to tenant {} (ref {}).",
                amount_cents, tenant_identifier, reference_identifier
            );
        }

        Ok(WebhookOutcome {
            handled: true,
            credited_cents,
            tenant: Some(tenant_identifier.to_string()),
            event_type: event_type.to_string(),
        })
    }
}
