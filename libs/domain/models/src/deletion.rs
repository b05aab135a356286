// [libs/domain/models/src/deletion.rs]

use serde::{Deserialize, Serialize};

/// Fallo aislado de un paso de purga; jamás aborta los pasos siguientes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionStepError {
    /// Nombre del almacén cuyo paso colapsó.
    pub store: String,
    /// Diagnóstico del fallo, sin detalles de implementación del storage.
    pub detail: String,
}

/// Reporte final del ejecutor de borrado multi-almacén.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeletionReport {
    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    /// Conteo de filas eliminadas por almacén, en orden de ejecución.
    pub store_counts: Vec<(String, u64)>,

    /// Fallos por-paso recolectados sin abortar la secuencia.
    pub errors: Vec<DeletionStepError>,
}

impl DeletionReport {
    #[must_use]
    pub fn new(tenant_id: &str) -> Self {
        Self { tenant_id: tenant_id.to_string(), ..Default::default() }
    }

    pub fn record_count(&mut self, store: &str, deleted_rows: u64) {
        self.store_counts.push((store.to_string(), deleted_rows));
    }

    pub fn record_error(&mut self, store: &str, detail: impl ToString) {
        self.errors.push(DeletionStepError {
            store: store.to_string(),
            detail: detail.to_string(),
        });
    }

    /// Total de filas purgadas a través de todos los almacenes.
    #[must_use]
    pub fn total_rows_deleted(&self) -> u64 {
        self.store_counts.iter().map(|(_, count)| count).sum()
    }
}
