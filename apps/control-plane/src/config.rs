// [apps/control-plane/src/config.rs]
/*!
 * =================================================================
 * APARATO: PLATFORM CONFIGURATION LOADER (V7.1 - SINGLE READ)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA ÚNICA DEL ENTORNO Y VALIDACIÓN DE RANGOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE READ DISCIPLINE: El entorno se lee UNA vez en la ignición;
 *    ningún aparato del sistema consulta variables en sitio de llamada.
 * 2. LOAD-TIME VALIDATION: Los márgenes fuera de [1.0, 3.0] y los
 *    intervalos nulos abortan la carga, jamás llegan al runtime.
 * =================================================================
 */

use anyhow::{bail, Context, Result};
use hive_domain_payments::MarginTable;
use std::env;

/// Valor por defecto del colchón de gracia del gateway (centavos).
const DEFAULT_GRACE_BUFFER_CENTS: i64 = 50;

/// Tope por defecto de fallos consecutivos antes de deshabilitar un auto-topup.
const DEFAULT_TOPUP_FAILURE_CAP: u32 = 3;

/// Longitud por defecto del periodo de facturación (5 minutos).
const DEFAULT_BILLING_PERIOD_MS: i64 = 300_000;

/**
 * Valor de configuración inmutable del plano de control.
 * Se construye una única vez y se inyecta vía AppState.
 */
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    // --- ENLACE RELACIONAL ---
    pub database_url: String,
    pub database_auth_token: Option<String>,

    // --- PIPELINE DE MEDICIÓN ---
    pub meter_wal_path: String,
    pub meter_dlq_path: String,
    pub meter_flush_interval_secs: u64,
    pub meter_max_flush_retries: u32,
    pub aggregate_interval_secs: u64,
    pub billing_period_ms: i64,
    pub late_arrival_grace_ms: i64,

    // --- COMPUERTA DEL GATEWAY ---
    pub grace_buffer_cents: i64,
    pub margin_table: MarginTable,

    // --- PAGOS ---
    pub webhook_secret: Vec<u8>,
    pub topup_scan_interval_secs: u64,
    pub topup_failure_cap: u32,

    // --- FLOTA ---
    pub heartbeat_scan_interval_secs: u64,
    pub heartbeat_timeout_secs: i64,

    // --- RESPALDOS ---
    pub retention_sweep_interval_secs: u64,
    pub snapshot_hard_delete_grace_hours: i64,

    // --- SEGURIDAD ---
    pub platform_secret: String,

    // --- AGENTES DE NODO ---
    pub node_agent_base_url: Option<String>,
    pub node_agent_token: Option<String>,
}

impl PlatformConfig {
    /**
     * Captura el entorno del proceso y forja el valor de configuración.
     *
     * # Errors:
     * Aborta la ignición ante variables críticas ausentes (DATABASE_URL,
     * HIVE_PLATFORM_SECRET, HIVE_WEBHOOK_SECRET) o valores fuera de rango.
     */
    pub fn from_environment() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("CRITICAL_CONFIG_VOID: DATABASE_URL not defined")?;

        let platform_secret = env::var("HIVE_PLATFORM_SECRET")
            .context("CRITICAL_CONFIG_VOID: HIVE_PLATFORM_SECRET not defined")?;

        let webhook_secret = env::var("HIVE_WEBHOOK_SECRET")
            .context("CRITICAL_CONFIG_VOID: HIVE_WEBHOOK_SECRET not defined")?
            .into_bytes();

        // Las reglas de margen llegan como literales "provider:glob:mult"
        // separados por coma; un margen fuera de [1.0, 3.0] aborta aquí.
        let margin_rule_literals: Vec<String> = env::var("HIVE_MARGIN_RULES")
            .unwrap_or_default()
            .split(',')
            .filter(|literal| !literal.trim().is_empty())
            .map(str::to_string)
            .collect();

        let default_margin_literal =
            env::var("HIVE_DEFAULT_MARGIN").unwrap_or_else(|_| "1.5".to_string());

        let margin_table =
            MarginTable::from_config_literals(&margin_rule_literals, &default_margin_literal)
                .map_err(|margin_fault| {
                    anyhow::anyhow!("MARGIN_CONFIG_REJECTED: {margin_fault}")
                })?;

        let billing_period_ms = parse_env_i64("HIVE_BILLING_PERIOD_MS", DEFAULT_BILLING_PERIOD_MS)?;
        if billing_period_ms <= 0 {
            bail!("MALFORMED_CONFIG: HIVE_BILLING_PERIOD_MS must be positive");
        }

        Ok(Self {
            database_url,
            database_auth_token: env::var("HIVE_DB_AUTH_TOKEN").ok(),

            meter_wal_path: env::var("HIVE_METER_WAL_PATH")
                .unwrap_or_else(|_| "data/meter.wal".to_string()),
            meter_dlq_path: env::var("HIVE_METER_DLQ_PATH")
                .unwrap_or_else(|_| "data/meter.dlq".to_string()),
            meter_flush_interval_secs: parse_env_u64("HIVE_METER_FLUSH_INTERVAL_SECS", 60)?,
            meter_max_flush_retries: parse_env_u64("HIVE_METER_MAX_RETRIES", 5)? as u32,
            aggregate_interval_secs: parse_env_u64("HIVE_AGGREGATE_INTERVAL_SECS", 60)?,
            billing_period_ms,
            // La gracia de llegadas tardías default iguala al periodo.
            late_arrival_grace_ms: parse_env_i64("HIVE_LATE_ARRIVAL_GRACE_MS", billing_period_ms)?,

            grace_buffer_cents: parse_env_i64("HIVE_GRACE_BUFFER_CENTS", DEFAULT_GRACE_BUFFER_CENTS)?,
            margin_table,

            webhook_secret,
            topup_scan_interval_secs: parse_env_u64("HIVE_TOPUP_SCAN_INTERVAL_SECS", 300)?,
            topup_failure_cap: parse_env_u64("HIVE_TOPUP_FAILURE_CAP", u64::from(DEFAULT_TOPUP_FAILURE_CAP))? as u32,

            heartbeat_scan_interval_secs: parse_env_u64("HIVE_HEARTBEAT_SCAN_INTERVAL_SECS", 10)?,
            heartbeat_timeout_secs: parse_env_i64("HIVE_HEARTBEAT_TIMEOUT_SECS", 60)?,

            retention_sweep_interval_secs: parse_env_u64("HIVE_RETENTION_SWEEP_INTERVAL_SECS", 3600)?,
            snapshot_hard_delete_grace_hours: parse_env_i64("HIVE_SNAPSHOT_HARD_DELETE_GRACE_HOURS", 24)?,

            platform_secret,

            node_agent_base_url: env::var("HIVE_NODE_AGENT_BASE_URL").ok(),
            node_agent_token: env::var("HIVE_NODE_AGENT_TOKEN").ok(),
        })
    }

    /**
     * Configuración mínima para el Proving Grounds: base en memoria,
     * WAL/DLQ en un directorio temporal y secretos deterministas.
     */
    pub fn for_tests(database_url: &str, wal_directory: &std::path::Path) -> Self {
        Self {
            database_url: database_url.to_string(),
            database_auth_token: None,
            meter_wal_path: wal_directory.join("meter.wal").to_string_lossy().into_owned(),
            meter_dlq_path: wal_directory.join("meter.dlq").to_string_lossy().into_owned(),
            meter_flush_interval_secs: 60,
            meter_max_flush_retries: 5,
            aggregate_interval_secs: 60,
            billing_period_ms: DEFAULT_BILLING_PERIOD_MS,
            late_arrival_grace_ms: DEFAULT_BILLING_PERIOD_MS,
            grace_buffer_cents: DEFAULT_GRACE_BUFFER_CENTS,
            margin_table: MarginTable::from_config_literals(&[], "1.0")
                .expect("identity margin is always in range"),
            webhook_secret: b"whsec_proving_grounds".to_vec(),
            topup_scan_interval_secs: 300,
            topup_failure_cap: DEFAULT_TOPUP_FAILURE_CAP,
            heartbeat_scan_interval_secs: 10,
            heartbeat_timeout_secs: 60,
            retention_sweep_interval_secs: 3600,
            snapshot_hard_delete_grace_hours: 24,
            platform_secret: "proving-grounds-secret".to_string(),
            node_agent_base_url: None,
            node_agent_token: None,
        }
    }
}

fn parse_env_u64(variable_name: &str, default_value: u64) -> Result<u64> {
    match env::var(variable_name) {
        Ok(raw_value) => raw_value
            .parse::<u64>()
            .with_context(|| format!("MALFORMED_CONFIG: {variable_name}")),
        Err(_) => Ok(default_value),
    }
}

fn parse_env_i64(variable_name: &str, default_value: i64) -> Result<i64> {
    match env::var(variable_name) {
        Ok(raw_value) => raw_value
            .parse::<i64>()
            .with_context(|| format!("MALFORMED_CONFIG: {variable_name}")),
        Err(_) => Ok(default_value),
    }
}
