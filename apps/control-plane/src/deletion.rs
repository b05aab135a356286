// [apps/control-plane/src/deletion.rs]
/*!
 * =================================================================
 * APARATO: TENANT DELETION EXECUTOR (V7.5 - PARTIAL FAILURE TOLERANT)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: PURGA ORDENADA MULTI-ALMACÉN DE UN TENANT
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DELIBERATELY NON-TRANSACTIONAL: La secuencia NO viaja en una
 *    transacción; cada paso aislado registra su fallo en 'errors' y los
 *    pasos siguientes proceden. El orden elegido deja todo estado
 *    intermedio consistente y el reintento es idempotente (borrar sobre
 *    almacenes vacíos elimina cero filas).
 * 2. REGULATORY RETENTION: El rastro de administración se ANONIMIZA
 *    in-place ("[deleted]"), jamás se elimina.
 * 3. BEST EFFORT EXTERNALS: El cliente del procesador y los objetos del
 *    object store se remueven best-effort; sus registros retenidos son
 *    responsabilidad del colaborador.
 * =================================================================
 */

use crate::state::AppState;
use hive_domain_models::deletion::DeletionReport;
use tracing::{info, instrument, warn};

pub struct DeletionExecutor {
    application_state: AppState,
}

impl DeletionExecutor {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Ejecuta la secuencia fija de purga para un tenant.
     *
     * # Logic (orden fijo):
     * 1. Cliente del procesador externo (best-effort).
     * 2. Instancias; transacciones; balances; ajustes crudos.
     * 3. Eventos de medición; resúmenes; reportes de uso externo.
     * 4. Cola de notificaciones; preferencias; correos.
     * 5. Auditoría de tenant (borrar); auditoría admin (anonimizar).
     * 6. Notas de administración.
     * 7. Objetos de respaldo (best-effort por fila); filas; backups de
     *    contenedor.
     * 8. Cargos; estado del tenant; roles; mapeo de cliente; registro de
     *    autenticación con sesiones, cuentas y tokens.
     */
    #[instrument(skip(self), fields(tenant = %tenant_identifier))]
    pub async fn execute_deletion(&self, tenant_identifier: &str) -> DeletionReport {
        let mut report = DeletionReport::new(tenant_identifier);
        info!("🧨 [DELETION]: Ordered purge sequence starting for tenant {}.", tenant_identifier);

        // --- PASO 1: CLIENTE DEL PROCESADOR (EXTERNO, BEST-EFFORT) ---
        self.purge_processor_customer(tenant_identifier, &mut report).await;

        // --- PASO 2: NÚCLEO FINANCIERO Y DE CÓMPUTO ---
        for store_name in ["bot_instances", "credit_transactions", "credit_balances", "credit_adjustments"] {
            self.purge_relational_store(store_name, tenant_identifier, &mut report).await;
        }

        // --- PASO 3: MEDICIÓN Y REPORTES ---
        for store_name in ["meter_events", "billing_period_summaries", "external_usage_reports"] {
            self.purge_relational_store(store_name, tenant_identifier, &mut report).await;
        }

        // --- PASO 4: COMUNICACIONES ---
        for store_name in ["notification_queue", "notification_preferences", "email_notifications"] {
            self.purge_relational_store(store_name, tenant_identifier, &mut report).await;
        }

        // --- PASO 5: AUDITORÍA (BORRADO + ANONIMIZACIÓN REGULATORIA) ---
        self.purge_relational_store("tenant_audit_log", tenant_identifier, &mut report).await;
        match self.application_state.audit_repository.anonymize_admin_audit(tenant_identifier).await {
            Ok(anonymized_rows) => report.record_count("admin_audit_log(anonymized)", anonymized_rows),
            Err(audit_fault) => report.record_error("admin_audit_log(anonymized)", audit_fault),
        }

        // --- PASO 6: NOTAS DE ADMINISTRACIÓN ---
        self.purge_relational_store("admin_notes", tenant_identifier, &mut report).await;

        // --- PASO 7: RESPALDOS (OBJETOS BEST-EFFORT, LUEGO FILAS) ---
        self.purge_snapshot_objects(tenant_identifier, &mut report).await;
        self.purge_relational_store("snapshots", tenant_identifier, &mut report).await;
        self.purge_relational_store("container_backups", tenant_identifier, &mut report).await;

        // --- PASO 8: CIERRE FINANCIERO Y DE IDENTIDAD ---
        for store_name in ["payment_charges", "tenant_status"] {
            self.purge_relational_store(store_name, tenant_identifier, &mut report).await;
        }

        match self.application_state.purge_repository.purge_user_roles(tenant_identifier).await {
            Ok(deleted_rows) => report.record_count("user_roles", deleted_rows),
            Err(purge_fault) => report.record_error("user_roles", purge_fault),
        }

        self.purge_relational_store("processor_customers", tenant_identifier, &mut report).await;

        match self.application_state.purge_repository.purge_auth_records(tenant_identifier).await {
            Ok(deleted_rows) => report.record_count("auth_records", deleted_rows),
            Err(purge_fault) => report.record_error("auth_records", purge_fault),
        }

        info!(
            "🏁 [DELETION]: Purge for tenant {} complete. {} rows across {} stores, {} errors.",
            tenant_identifier,
            report.total_rows_deleted(),
            report.store_counts.len(),
            report.errors.len()
        );
        report
    }

    /// Paso aislado sobre un almacén relacional del catálogo cerrado.
    async fn purge_relational_store(
        &self,
        store_name: &str,
        tenant_identifier: &str,
        report: &mut DeletionReport,
    ) {
        match self
            .application_state
            .purge_repository
            .purge_store(store_name, tenant_identifier)
            .await
        {
            Ok(deleted_rows) => report.record_count(store_name, deleted_rows),
            Err(purge_fault) => {
                warn!(
                    "⚠️ [DELETION]: Store '{}' purge failed (sequence continues): {}",
                    store_name, purge_fault
                );
                report.record_error(store_name, purge_fault);
            }
        }
    }

    /// Paso 1: borrado best-effort del cliente en el procesador externo.
    async fn purge_processor_customer(
        &self,
        tenant_identifier: &str,
        report: &mut DeletionReport,
    ) {
        let mapped_customer = match self
            .application_state
            .billing_support_repository
            .processor_customer_for_tenant(tenant_identifier)
            .await
        {
            Ok(mapping) => mapping,
            Err(lookup_fault) => {
                report.record_error("processor_customer", lookup_fault);
                return;
            }
        };

        let Some(customer_identifier) = mapped_customer else {
            report.record_count("processor_customer", 0);
            return;
        };

        match self.application_state.collaborators.payment_processor.as_present() {
            Some(payment_processor) => {
                match payment_processor.delete_customer(&customer_identifier).await {
                    Ok(()) => report.record_count("processor_customer", 1),
                    Err(processor_fault) => {
                        report.record_error("processor_customer", processor_fault)
                    }
                }
            }
            // Sin procesador inyectado no hay nada externo que borrar.
            None => report.record_count("processor_customer", 0),
        }
    }

    /// Paso 7a: remoción best-effort por-fila de los objetos de respaldo.
    async fn purge_snapshot_objects(
        &self,
        tenant_identifier: &str,
        report: &mut DeletionReport,
    ) {
        let snapshot_rows = match self
            .application_state
            .snapshot_repository
            .list_for_tenant(tenant_identifier)
            .await
        {
            Ok(rows) => rows,
            Err(listing_fault) => {
                report.record_error("snapshot_objects", listing_fault);
                return;
            }
        };

        let Some(object_store) = self.application_state.collaborators.object_store.as_present()
        else {
            report.record_count("snapshot_objects", 0);
            return;
        };

        let mut removed_objects: u64 = 0;
        for snapshot_row in snapshot_rows {
            match object_store.remove(&snapshot_row.storage_path).await {
                Ok(()) => removed_objects += 1,
                Err(removal_fault) => {
                    // Best-effort por fila: el fallo se registra y se sigue.
                    report.record_error(
                        "snapshot_objects",
                        format!("{}: {}", snapshot_row.id, removal_fault),
                    );
                }
            }
        }
        report.record_count("snapshot_objects", removed_objects);
    }
}
