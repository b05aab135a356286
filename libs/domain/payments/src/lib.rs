// [libs/domain/payments/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PAYMENT DOMAIN ENGINE (V5.0 - GOLD MASTER)
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: FIRMAS DE WEBHOOK, PROYECCIÓN CANÓNICA Y MÁRGENES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FAIL CLOSED PARSING: Cada clase de evento del procesador se
 *    deserializa contra un schema estricto; un campo ausente colapsa la
 *    proyección como evento malformado, jamás como valor por defecto.
 * 2. CONSTANT TIME SIGNATURES: La verificación HMAC-SHA256 usa la
 *    comparación de tiempo constante del motor Mac.
 * 3. BOUNDED MARGINS: Ningún multiplicador fuera de [1.0, 3.0]
 *    sobrevive a la carga de configuración.
 * =================================================================
 */

pub mod pricing;
pub mod webhook;

pub use pricing::{MarginRule, MarginTable};
pub use webhook::{verify_webhook_signature, CanonicalPaymentEvent, PaymentError, WebhookEnvelope};
