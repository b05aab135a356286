// [libs/domain/payments/src/webhook.rs]
/*!
 * =================================================================
 * APARATO: WEBHOOK PROJECTION ENGINE (V5.2 - STRICT SCHEMA)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: VERIFICACIÓN DE FIRMA Y PROYECCIÓN CANÓNICA
 *
 * # Mathematical Proof (Signature Integrity):
 * La firma es HMAC-SHA256(webhook_secret, raw_body) en hex minúscula.
 * La verificación delega en Mac::verify_slice (comparación de tiempo
 * constante), de modo que el tiempo de rechazo no filtra prefijos
 * correctos de la firma.
 * =================================================================
 */

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// La firma del webhook no corresponde al cuerpo crudo recibido.
    #[error("[L2_PAYMENT_FAULT]: WEBHOOK_SIGNATURE_REJECTED")]
    InvalidSignature,

    /// El payload del evento no cumple el schema estricto de su clase.
    #[error("[L2_PAYMENT_FAULT]: EVENT_SCHEMA_VIOLATION -> {0}")]
    MalformedEvent(String),
}

/**
 * Verifica la firma del procesador contra el cuerpo crudo.
 *
 * # Errors:
 * - `PaymentError::InvalidSignature`: cabecera no-hex o MAC divergente.
 *   El evento NO debe procesarse.
 */
pub fn verify_webhook_signature(
    raw_body: &[u8],
    signature_header: &str,
    webhook_secret: &[u8],
) -> Result<(), PaymentError> {
    let claimed_signature = hex::decode(signature_header.trim())
        .map_err(|_| PaymentError::InvalidSignature)?;

    let mut keyed_mac = <Hmac<Sha256> as Mac>::new_from_slice(webhook_secret)
        .expect("HMAC accepts any key length");
    keyed_mac.update(raw_body);

    keyed_mac
        .verify_slice(&claimed_signature)
        .map_err(|_| PaymentError::InvalidSignature)
}

/// Sobre exterior común a todos los eventos del procesador.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

// --- SCHEMAS ESTRICTOS POR CLASE DE EVENTO ---
// Un campo ausente es violación de schema, jamás un default silencioso.

#[derive(Debug, Deserialize)]
struct CheckoutCompletedData {
    tenant_id: String,
    processor_customer_id: String,
    amount_cents: i64,
    reference_id: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentSucceededData {
    tenant_id: String,
    amount_cents: i64,
    reference_id: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubscriptionUpdatedData {
    tenant_id: String,
    processor_customer_id: String,
    tier: String,
}

#[derive(Debug, Deserialize)]
struct CustomerDeletedData {
    processor_customer_id: String,
}

/**
 * Evento lógico canónico, independiente del vendor del procesador.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CanonicalPaymentEvent {
    /// Compra de créditos lista para abonarse al Ledger.
    CreditPurchase {
        tenant_id: String,
        /// Presente cuando el evento porta el mapeo tenant -> cliente.
        processor_customer_id: Option<String>,
        amount_cents: i64,
        /// Llave de idempotencia replicada por el procesador en reintentos.
        reference_id: String,
        metadata: serde_json::Value,
    },

    /// Cambio de nivel de suscripción del tenant.
    SubscriptionUpdated {
        tenant_id: String,
        processor_customer_id: String,
        tier: String,
    },

    /// El cliente fue eliminado del lado del procesador.
    CustomerDeleted {
        processor_customer_id: String,
    },

    /// Clase de evento que el núcleo no procesa (handled=false).
    Unrecognized {
        event_type: String,
    },
}

impl CanonicalPaymentEvent {
    /**
     * Proyecta el sobre del procesador al evento canónico de su clase.
     *
     * # Errors:
     * - `PaymentError::MalformedEvent`: el payload de una clase conocida
     *   viola su schema estricto (fail closed).
     */
    pub fn project(envelope: &WebhookEnvelope) -> Result<CanonicalPaymentEvent, PaymentError> {
        let schema_fault = |fault: serde_json::Error| {
            PaymentError::MalformedEvent(format!("{}: {}", envelope.event_type, fault))
        };

        match envelope.event_type.as_str() {
            "checkout.completed" => {
                let data: CheckoutCompletedData =
                    serde_json::from_value(envelope.data.clone()).map_err(schema_fault)?;
                Ok(CanonicalPaymentEvent::CreditPurchase {
                    tenant_id: data.tenant_id,
                    processor_customer_id: Some(data.processor_customer_id),
                    amount_cents: data.amount_cents,
                    reference_id: data.reference_id,
                    metadata: data.metadata,
                })
            }
            "payment_intent.succeeded" => {
                let data: PaymentIntentSucceededData =
                    serde_json::from_value(envelope.data.clone()).map_err(schema_fault)?;
                Ok(CanonicalPaymentEvent::CreditPurchase {
                    tenant_id: data.tenant_id,
                    processor_customer_id: None,
                    amount_cents: data.amount_cents,
                    reference_id: data.reference_id,
                    metadata: data.metadata,
                })
            }
            "subscription.updated" => {
                let data: SubscriptionUpdatedData =
                    serde_json::from_value(envelope.data.clone()).map_err(schema_fault)?;
                Ok(CanonicalPaymentEvent::SubscriptionUpdated {
                    tenant_id: data.tenant_id,
                    processor_customer_id: data.processor_customer_id,
                    tier: data.tier,
                })
            }
            "customer.deleted" => {
                let data: CustomerDeletedData =
                    serde_json::from_value(envelope.data.clone()).map_err(schema_fault)?;
                Ok(CanonicalPaymentEvent::CustomerDeleted {
                    processor_customer_id: data.processor_customer_id,
                })
            }
            unrecognized_type => Ok(CanonicalPaymentEvent::Unrecognized {
                event_type: unrecognized_type.to_string(),
            }),
        }
    }
}
