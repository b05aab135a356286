// INICIO DEL ARCHIVO [libs/core/vault/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL VAULT CRYPTO ENGINE (V9.1 - GOLD MASTER)
 * CLASIFICACIÓN: CORE SECURITY (ESTRATO L1)
 * RESPONSABILIDAD: CIFRADO SIMÉTRICO AES-256-GCM DE LLAVES DE PROVEEDOR
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FAIL CLOSED: Cualquier manipulación del payload (IV, tag o
 *    ciphertext) colapsa el descifrado sin revelar diagnóstico alguno.
 * 2. DETERMINISTIC KEY STRATA: La llave de 32 bytes se deriva del
 *    secreto de plataforma vía HMAC-SHA256 con dominio fijo, o se forja
 *    efímera para el Proving Grounds.
 * 3. NOMINAL PURITY: Nomenclatura nominal absoluta (iv ->
 *    initialization_vector, ct -> cipher_text).
 *
 * # Mathematical Proof (Payload Integrity):
 * GCM adjunta un tag de autenticación de 128 bits; la probabilidad de
 * forjar un payload aceptado sin la llave es 2^-128. El texto plano solo
 * existe en memoria durante el descifrado.
 * =================================================================
 */

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

/// Dominio fijo de derivación: separa esta llave de cualquier otro uso del secreto.
const KEY_DERIVATION_DOMAIN: &[u8] = b"credential-vault";

/// Longitud nominal del vector de inicialización GCM (96 bits).
const INITIALIZATION_VECTOR_LENGTH_BYTES: usize = 12;

/// Longitud nominal del tag de autenticación GCM (128 bits).
const AUTHENTICATION_TAG_LENGTH_BYTES: usize = 16;

#[derive(Error, Debug)]
pub enum VaultError {
    /// El payload no cumple el contrato hex {iv, authTag, ciphertext}.
    #[error("[L1_VAULT_FAULT]: PAYLOAD_CONTRACT_VIOLATION -> {0}")]
    PayloadCorrupted(String),

    /// Integridad comprometida o llave maestra incorrecta.
    #[error("[L1_VAULT_FAULT]: DECRYPTION_MALFUNCTION -> integrity compromised or wrong master key")]
    DecryptionFailed,

    /// Fallo interno del motor de cifrado.
    #[error("[L1_VAULT_FAULT]: ENCRYPTION_MALFUNCTION")]
    EncryptionFailed,
}

/**
 * Contrato binario del valor cifrado en reposo.
 *
 * Los tres campos son hex minúscula y los tres son obligatorios: un valor
 * sin cualquiera de ellos NO se considera cifrado y se rechaza.
 */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredentialPayload {
    /// Vector de inicialización de 12 bytes, aleatorio por invocación.
    pub iv: String,
    /// Tag de autenticación GCM de 16 bytes.
    #[serde(rename = "authTag")]
    pub auth_tag: String,
    /// Texto cifrado del material de credencial.
    pub ciphertext: String,
}

impl EncryptedCredentialPayload {
    /**
     * Valida la forma del contrato sin intentar descifrar.
     *
     * # Logic:
     * Los tres campos deben decodificar como hex y el IV/tag deben medir
     * exactamente 12 y 16 bytes. Payloads con deriva estructural se
     * catalogan como corrupción de datos (spec de errores: no retry).
     */
    pub fn validate_shape(&self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), VaultError> {
        let initialization_vector = hex::decode(&self.iv)
            .map_err(|_| VaultError::PayloadCorrupted("IV_NOT_HEX".into()))?;
        let authentication_tag = hex::decode(&self.auth_tag)
            .map_err(|_| VaultError::PayloadCorrupted("AUTH_TAG_NOT_HEX".into()))?;
        let cipher_text = hex::decode(&self.ciphertext)
            .map_err(|_| VaultError::PayloadCorrupted("CIPHERTEXT_NOT_HEX".into()))?;

        if initialization_vector.len() != INITIALIZATION_VECTOR_LENGTH_BYTES {
            return Err(VaultError::PayloadCorrupted("IV_LENGTH_DRIFT".into()));
        }
        if authentication_tag.len() != AUTHENTICATION_TAG_LENGTH_BYTES {
            return Err(VaultError::PayloadCorrupted("AUTH_TAG_LENGTH_DRIFT".into()));
        }

        Ok((initialization_vector, authentication_tag, cipher_text))
    }
}

/**
 * Motor simétrico de la bóveda. Inmutable tras la forja; compartible entre
 * hilos sin cerrojos.
 */
pub struct VaultCryptoEngine {
    derived_key_material: [u8; 32],
}

impl VaultCryptoEngine {
    /**
     * Deriva la llave soberana desde el secreto de plataforma.
     *
     * # Mathematical Proof:
     * key = HMAC-SHA256(platform_secret, "credential-vault"). El dominio
     * fijo garantiza que la misma semilla jamás produzca llaves colisionantes
     * con otros estratos del sistema.
     */
    #[must_use]
    pub fn from_platform_secret(platform_secret: &[u8]) -> Self {
        let mut keyed_mac = <Hmac<Sha256> as Mac>::new_from_slice(platform_secret)
            .expect("HMAC accepts any key length");
        keyed_mac.update(KEY_DERIVATION_DOMAIN);
        let derived = keyed_mac.finalize().into_bytes();

        let mut derived_key_material = [0u8; 32];
        derived_key_material.copy_from_slice(&derived);
        Self { derived_key_material }
    }

    /// Forja una llave efímera aleatoria para el Proving Grounds.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut derived_key_material = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut derived_key_material);
        Self { derived_key_material }
    }

    /**
     * Cifra material de credencial en texto plano.
     *
     * # Logic:
     * IV aleatorio de 12 bytes por invocación (jamás reutilizado), cifrado
     * AES-256-GCM, separación del tag de autenticación en su propio campo
     * hex según el contrato de almacenamiento.
     */
    pub fn encrypt(&self, plain_text_material: &str) -> Result<EncryptedCredentialPayload, VaultError> {
        let mut initialization_vector = [0u8; INITIALIZATION_VECTOR_LENGTH_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut initialization_vector);

        let cipher_engine = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.derived_key_material));
        let nonce = Nonce::from_slice(&initialization_vector);

        // El motor GCM adjunta el tag al final del buffer; lo separamos
        // para cumplir el contrato {iv, authTag, ciphertext}.
        let sealed_buffer = cipher_engine
            .encrypt(nonce, Payload { msg: plain_text_material.as_bytes(), aad: &[] })
            .map_err(|_| VaultError::EncryptionFailed)?;

        let tag_boundary = sealed_buffer.len() - AUTHENTICATION_TAG_LENGTH_BYTES;
        let (cipher_text, authentication_tag) = sealed_buffer.split_at(tag_boundary);

        Ok(EncryptedCredentialPayload {
            iv: hex::encode(initialization_vector),
            auth_tag: hex::encode(authentication_tag),
            ciphertext: hex::encode(cipher_text),
        })
    }

    /**
     * Descifra un payload verificando la integridad GCM.
     *
     * # Errors:
     * - `VaultError::PayloadCorrupted`: deriva estructural del contrato.
     * - `VaultError::DecryptionFailed`: tag inválido, IV manipulado o llave
     *   incorrecta. El motor no distingue las causas (fail closed).
     */
    pub fn decrypt(&self, encrypted_payload: &EncryptedCredentialPayload) -> Result<String, VaultError> {
        let (initialization_vector, authentication_tag, cipher_text) =
            encrypted_payload.validate_shape()?;

        let cipher_engine = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.derived_key_material));
        let nonce = Nonce::from_slice(&initialization_vector);

        // Reconstrucción del buffer sellado: ciphertext || tag.
        let mut sealed_buffer = cipher_text;
        sealed_buffer.extend_from_slice(&authentication_tag);

        let decrypted_bytes = cipher_engine
            .decrypt(nonce, sealed_buffer.as_ref())
            .map_err(|_| VaultError::DecryptionFailed)?;

        String::from_utf8(decrypted_bytes).map_err(|_| VaultError::DecryptionFailed)
    }
}

// FIN DEL ARCHIVO [libs/core/vault/src/lib.rs]
