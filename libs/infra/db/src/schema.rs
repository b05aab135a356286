// [libs/infra/db/src/schema.rs]
/**
 * =================================================================
 * APARATO: CONTROL PLANE DATABASE SCHEMA (V8.0 - LEDGER STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. REFERENCE UNIQUENESS: El índice único sobre reference_id es la
 *    autoridad de idempotencia del Ledger; la aplicación jamás confía
 *    solo en su pre-chequeo.
 * 2. RAW MONEY: Los montos viven como enteros crudos i64 (nano-dólar);
 *    la columna INTEGER de SQLite los preserva sin pérdida en ±10^18.
 * 3. IDEMPOTENCIA: Gestión de errores para migraciones en caliente.
 * 4. PERFORMANCE: Índices de aceleración para el despacho de los daemons.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del plano de control Hive.
 */
const TACTICAL_TABLES: &[(&str, &str)] = &[
    // --- COMPONENTE B: LEDGER DE CRÉDITOS ---
    ("TABLE_CREDIT_BALANCES", r#"
        CREATE TABLE IF NOT EXISTS credit_balances (
            tenant_id TEXT PRIMARY KEY,
            amount_raw INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL
        );
    "#),
    ("TABLE_CREDIT_TRANSACTIONS", r#"
        CREATE TABLE IF NOT EXISTS credit_transactions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            amount_raw INTEGER NOT NULL,
            balance_after_raw INTEGER NOT NULL,
            kind TEXT NOT NULL,
            description TEXT,
            reference_id TEXT,
            funding_source TEXT,
            attributed_user_id TEXT,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_CREDIT_ADJUSTMENTS", r#"
        CREATE TABLE IF NOT EXISTS credit_adjustments (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            amount_raw INTEGER NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL
        );
    "#),

    // --- COMPONENTE C: PIPELINE DE MEDICIÓN ---
    ("TABLE_METER_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS meter_events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            capability TEXT NOT NULL,
            provider TEXT NOT NULL,
            cost_raw INTEGER NOT NULL,
            charge_raw INTEGER NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            session_id TEXT,
            duration_ms INTEGER
        );
    "#),
    ("TABLE_BILLING_PERIOD_SUMMARIES", r#"
        CREATE TABLE IF NOT EXISTS billing_period_summaries (
            tenant_id TEXT NOT NULL,
            capability TEXT NOT NULL,
            provider TEXT NOT NULL,
            period_start_ms INTEGER NOT NULL,
            period_end_ms INTEGER NOT NULL,
            event_count INTEGER NOT NULL,
            total_cost_raw INTEGER NOT NULL,
            total_charge_raw INTEGER NOT NULL,
            total_duration_ms INTEGER NOT NULL,
            PRIMARY KEY(tenant_id, capability, provider, period_start_ms)
        );
    "#),
    ("TABLE_EXTERNAL_USAGE_REPORTS", r#"
        CREATE TABLE IF NOT EXISTS external_usage_reports (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            report_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    "#),

    // --- COMPONENTE D: RECONCILIACIÓN DE PAGOS ---
    ("TABLE_PROCESSOR_CUSTOMERS", r#"
        CREATE TABLE IF NOT EXISTS processor_customers (
            tenant_id TEXT PRIMARY KEY,
            processor_customer_id TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_PAYMENT_CHARGES", r#"
        CREATE TABLE IF NOT EXISTS payment_charges (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            reference_id TEXT,
            charge_reason TEXT,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_TOPUP_SCHEDULES", r#"
        CREATE TABLE IF NOT EXISTS topup_schedules (
            tenant_id TEXT PRIMARY KEY,
            amount_cents INTEGER NOT NULL,
            interval_hours INTEGER NOT NULL,
            next_charge_at TEXT NOT NULL,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_TENANT_STATUS", r#"
        CREATE TABLE IF NOT EXISTS tenant_status (
            tenant_id TEXT PRIMARY KEY,
            tier TEXT NOT NULL DEFAULT 'free',
            updated_at TEXT NOT NULL
        );
    "#),

    // --- COMPONENTE F: RESPALDOS ---
    ("TABLE_SNAPSHOTS", r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            instance_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            name TEXT,
            kind TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            node_id TEXT,
            trigger_source TEXT NOT NULL,
            plugins_json TEXT NOT NULL DEFAULT '[]',
            config_hash TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT,
            deleted_at TEXT
        );
    "#),
    ("TABLE_CONTAINER_BACKUPS", r#"
        CREATE TABLE IF NOT EXISTS container_backups (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            backup_key TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    "#),

    // --- COMPONENTE G: CONTROL DE FLOTA ---
    ("TABLE_NODES", r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'active',
            drain_status TEXT,
            drain_migrated INTEGER,
            drain_total INTEGER,
            last_heartbeat_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_BOT_INSTANCES", r#"
        CREATE TABLE IF NOT EXISTS bot_instances (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            node_id TEXT,
            billing_state TEXT NOT NULL DEFAULT 'active',
            suspended_at TEXT,
            destroy_after TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_RECOVERY_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS recovery_events (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            trigger_source TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'in_progress',
            tenants_total INTEGER NOT NULL DEFAULT 0,
            tenants_recovered INTEGER NOT NULL DEFAULT 0,
            tenants_failed INTEGER NOT NULL DEFAULT 0,
            tenants_waiting INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            report_json TEXT
        );
    "#),
    ("TABLE_RECOVERY_ITEMS", r#"
        CREATE TABLE IF NOT EXISTS recovery_items (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            source_node TEXT NOT NULL,
            target_node TEXT,
            backup_key TEXT,
            status TEXT NOT NULL,
            reason TEXT
        );
    "#),

    // --- COMPONENTE I: BÓVEDA DE CREDENCIALES ---
    ("TABLE_CREDENTIALS", r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            key_name TEXT NOT NULL,
            encrypted_value_json TEXT NOT NULL,
            auth_type TEXT NOT NULL,
            auth_header TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_validated TEXT,
            created_at TEXT NOT NULL,
            rotated_at TEXT,
            created_by TEXT NOT NULL
        );
    "#),

    // --- ESTRATO DE COMUNICACIONES ---
    ("TABLE_NOTIFICATION_QUEUE", r#"
        CREATE TABLE IF NOT EXISTS notification_queue (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            template_name TEXT NOT NULL,
            date_key TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_NOTIFICATION_PREFERENCES", r#"
        CREATE TABLE IF NOT EXISTS notification_preferences (
            tenant_id TEXT PRIMARY KEY,
            preferences_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#),
    ("TABLE_EMAIL_NOTIFICATIONS", r#"
        CREATE TABLE IF NOT EXISTS email_notifications (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            template_name TEXT NOT NULL,
            sent_at TEXT NOT NULL
        );
    "#),

    // --- ESTRATO DE AUDITORÍA Y GOBERNANZA ---
    ("TABLE_TENANT_AUDIT_LOG", r#"
        CREATE TABLE IF NOT EXISTS tenant_audit_log (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            action TEXT NOT NULL,
            detail_json TEXT,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_ADMIN_AUDIT_LOG", r#"
        CREATE TABLE IF NOT EXISTS admin_audit_log (
            id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            target_tenant TEXT,
            target_user TEXT,
            detail_json TEXT,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_ADMIN_NOTES", r#"
        CREATE TABLE IF NOT EXISTS admin_notes (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            note_text TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    "#),

    // --- ESTRATO DE AUTENTICACIÓN (PURGA DE TENANT) ---
    ("TABLE_AUTH_USERS", r#"
        CREATE TABLE IF NOT EXISTS auth_users (
            id TEXT PRIMARY KEY,
            email TEXT,
            created_at TEXT NOT NULL
        );
    "#),
    ("TABLE_AUTH_SESSIONS", r#"
        CREATE TABLE IF NOT EXISTS auth_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
    ("TABLE_AUTH_ACCOUNTS", r#"
        CREATE TABLE IF NOT EXISTS auth_accounts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL
        );
    "#),
    ("TABLE_AUTH_VERIFICATION_TOKENS", r#"
        CREATE TABLE IF NOT EXISTS auth_verification_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#),
    ("TABLE_USER_ROLES", r#"
        CREATE TABLE IF NOT EXISTS user_roles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            scope_tenant_id TEXT NOT NULL,
            role TEXT NOT NULL
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que las tablas existentes se adapten a las nuevas capacidades.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("SNAPSHOT_OBJECT_KEY", "ALTER TABLE snapshots ADD COLUMN object_store_key TEXT"),
    ("NODE_REGION", "ALTER TABLE nodes ADD COLUMN region TEXT DEFAULT 'default'"),
    ("CHARGE_PROCESSOR_ID", "ALTER TABLE payment_charges ADD COLUMN processor_charge_id TEXT"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración y Unicidad)
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    // Autoridad de idempotencia del Ledger (parcial: NULL permitido N veces).
    ("IDX_UNIQUE_REFERENCE", "CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_reference ON credit_transactions(reference_id) WHERE reference_id IS NOT NULL;"),
    ("IDX_TRANSACTIONS_TENANT", "CREATE INDEX IF NOT EXISTS idx_transactions_tenant ON credit_transactions(tenant_id, created_at);"),
    ("IDX_METER_TENANT_TS", "CREATE INDEX IF NOT EXISTS idx_meter_tenant_ts ON meter_events(tenant_id, timestamp_ms);"),
    ("IDX_METER_TS", "CREATE INDEX IF NOT EXISTS idx_meter_ts ON meter_events(timestamp_ms);"),
    ("IDX_SNAPSHOTS_INSTANCE", "CREATE INDEX IF NOT EXISTS idx_snapshots_instance ON snapshots(instance_id, created_at);"),
    ("IDX_SNAPSHOTS_TENANT", "CREATE INDEX IF NOT EXISTS idx_snapshots_tenant ON snapshots(tenant_id);"),
    ("IDX_INSTANCES_NODE", "CREATE INDEX IF NOT EXISTS idx_instances_node ON bot_instances(node_id);"),
    ("IDX_INSTANCES_TENANT", "CREATE INDEX IF NOT EXISTS idx_instances_tenant ON bot_instances(tenant_id);"),
    ("IDX_RECOVERY_ITEMS_EVENT", "CREATE INDEX IF NOT EXISTS idx_recovery_items_event ON recovery_items(event_id);"),
    // Deduplicación de comunicaciones (tenant, plantilla, fecha).
    ("IDX_UNIQUE_NOTIFICATION", "CREATE UNIQUE INDEX IF NOT EXISTS idx_notification_dedup ON notification_queue(tenant_id, template_name, date_key);"),
    ("IDX_TOPUP_DUE", "CREATE INDEX IF NOT EXISTS idx_topup_due ON topup_schedules(is_enabled, next_charge_at);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace relacional.
 */
#[instrument(skip(database_connection))]
pub async fn apply_control_plane_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V8.0...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Control Plane Ledger V8.0 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in TACTICAL_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(fault) => {
                let message = fault.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: {} already level.", identifier);
                } else {
                    warn!("  ⚠️ [REPAIR_BYPASS]: {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}
