// INICIO DEL ARCHIVO [libs/infra/meter-wal/src/lib.rs]
/*!
 * =================================================================
 * APARATO: METER WAL TACTICAL ENGINE (V6.3 - ATOMIC COMPACTION)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA LOCAL APPEND-ONLY DE EVENTOS DE MEDICIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. HOT PATH PURITY: El append del emisor es la única ruta caliente del
 *    sistema y jamás toca I/O remoto; un cerrojo por-proceso serializa
 *    las escrituras de los handlers concurrentes.
 * 2. OFFSET FENCE: La compactación captura la longitud del archivo al
 *    iniciar el flush; las líneas emitidas durante el flush quedan
 *    intactas porque viven después de la cerca de bytes.
 * 3. ATOMIC REWRITE: temp + rename con fsync del archivo y del
 *    directorio en la rotación. Durabilidad por-lote: el DLQ más el
 *    ack idempotente del batch hacen redundante el fsync por-línea.
 * 4. LOUD CORRUPTION: Una línea imparseable se salta con log forense y
 *    se contabiliza; jamás detiene la recuperación del resto.
 *
 * # Mathematical Proof (At-Least-Once Safety):
 * Un evento e aparece en el WAL hasta que un flush lo inserta en el
 * almacén relacional Y la compactación lo remueve. Si el proceso muere
 * entre ambos, e se re-inserta en el siguiente flush; la inserción es
 * por-id idempotente aguas abajo, luego la contabilidad es exactamente
 * una vez.
 * =================================================================
 */

use hive_domain_models::metering::{DeadLetterEntry, MeterEvent};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

#[derive(Error, Debug)]
pub enum WalError {
    /// Fallo físico de I/O sobre el WAL o el DLQ local.
    #[error("[L3_WAL_FAULT]: LOCAL_IO_SEVERED -> {0}")]
    Io(#[from] std::io::Error),

    /// Fallo de serialización del contrato del evento.
    #[error("[L3_WAL_FAULT]: LINE_SERIALIZATION_REJECTED -> {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cerrojo del escritor envenenado por pánico de otro hilo.
    #[error("[L3_WAL_FAULT]: WRITER_LOCK_POISONED")]
    LockPoisoned,
}

/// Instantánea del WAL capturada al inicio de un flush.
#[derive(Debug)]
pub struct WalFlushSnapshot {
    /// Eventos parseados dentro de la cerca de bytes.
    pub events: Vec<MeterEvent>,
    /// Cerca: longitud del archivo al momento de la captura.
    pub byte_fence: u64,
    /// Líneas corruptas saltadas durante la lectura.
    pub malformed_lines_skipped: u32,
}

/**
 * Motor de persistencia local del pipeline de medición.
 * Un único escritor lógico por proceso; compartible vía Arc.
 */
pub struct MeterWalEngine {
    wal_file_path: PathBuf,
    dead_letter_file_path: PathBuf,
    /// Serializa append y compactación (invariante de escritor único).
    writer_exclusion_lock: Mutex<()>,
}

impl MeterWalEngine {
    /**
     * Abre (o crea) el WAL y el DLQ en las rutas configuradas.
     *
     * # Errors:
     * - `WalError::Io`: el directorio padre no puede materializarse.
     */
    pub fn open(wal_file_path: impl Into<PathBuf>, dead_letter_file_path: impl Into<PathBuf>) -> Result<Self, WalError> {
        let wal_file_path = wal_file_path.into();
        let dead_letter_file_path = dead_letter_file_path.into();

        if let Some(parent_directory) = wal_file_path.parent() {
            fs::create_dir_all(parent_directory)?;
        }
        if let Some(parent_directory) = dead_letter_file_path.parent() {
            fs::create_dir_all(parent_directory)?;
        }

        Ok(Self {
            wal_file_path,
            dead_letter_file_path,
            writer_exclusion_lock: Mutex::new(()),
        })
    }

    /**
     * Ruta caliente del emisor: asigna identificador si falta y adjunta
     * una línea JSON UTF-8 terminada en '\n'.
     *
     * # Performance:
     * O(1) sobre disco local; jamás bloquea en el almacén relacional.
     *
     * @returns El identificador definitivo del evento.
     */
    #[instrument(skip(self, meter_event), fields(tenant = %meter_event.tenant))]
    pub fn emit(&self, mut meter_event: MeterEvent) -> Result<String, WalError> {
        meter_event.ensure_identifier();
        let serialized_line = serde_json::to_string(&meter_event)?;

        let _writer_guard = self.writer_exclusion_lock.lock().map_err(|_| WalError::LockPoisoned)?;

        let mut append_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.wal_file_path)?;
        append_handle.write_all(serialized_line.as_bytes())?;
        append_handle.write_all(b"\n")?;

        debug!("📝 [METER_WAL]: Event {} appended for tenant {}.", meter_event.id, meter_event.tenant);
        Ok(meter_event.id)
    }

    /**
     * Captura la instantánea del WAL para un ciclo de flush.
     *
     * # Logic:
     * La cerca de bytes es la longitud del archivo al entrar; solo las
     * líneas completas dentro de la cerca participan del lote. Las líneas
     * malformadas se saltan con rastro forense (corrupción de datos: sin
     * reintento, sin aborto).
     */
    #[instrument(skip(self))]
    pub fn snapshot_for_flush(&self) -> Result<WalFlushSnapshot, WalError> {
        let _writer_guard = self.writer_exclusion_lock.lock().map_err(|_| WalError::LockPoisoned)?;

        let wal_handle = match File::open(&self.wal_file_path) {
            Ok(handle) => handle,
            Err(open_fault) if open_fault.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WalFlushSnapshot { events: Vec::new(), byte_fence: 0, malformed_lines_skipped: 0 });
            }
            Err(open_fault) => return Err(open_fault.into()),
        };

        let byte_fence = wal_handle.metadata()?.len();
        let mut fenced_reader = BufReader::new(wal_handle).take(byte_fence);

        let mut fenced_content = String::new();
        fenced_reader.read_to_string(&mut fenced_content)?;

        let mut events = Vec::new();
        let mut malformed_lines_skipped: u32 = 0;

        for wal_line in fenced_content.lines() {
            if wal_line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MeterEvent>(wal_line) {
                Ok(parsed_event) => events.push(parsed_event),
                Err(parse_fault) => {
                    malformed_lines_skipped += 1;
                    error!(
                        "💀 [WAL_CORRUPTION]: Unparseable line skipped during recovery: {}",
                        parse_fault
                    );
                }
            }
        }

        Ok(WalFlushSnapshot { events, byte_fence, malformed_lines_skipped })
    }

    /**
     * Compactación atómica post-flush: reescribe el WAL con los
     * supervivientes del lote más todo lo emitido después de la cerca.
     *
     * # Reliability:
     * temp + rename en el mismo directorio; fsync del archivo temporal y
     * del directorio tras la rotación. Un crash en cualquier punto deja
     * el WAL viejo o el nuevo, jamás un híbrido.
     */
    #[instrument(skip(self, surviving_events), fields(survivors = surviving_events.len()))]
    pub fn compact(&self, snapshot: &WalFlushSnapshot, surviving_events: &[MeterEvent]) -> Result<(), WalError> {
        let _writer_guard = self.writer_exclusion_lock.lock().map_err(|_| WalError::LockPoisoned)?;

        // Rescate de la cola: bytes emitidos durante el flush en curso.
        let tail_bytes = match File::open(&self.wal_file_path) {
            Ok(mut wal_handle) => {
                wal_handle.seek(SeekFrom::Start(snapshot.byte_fence))?;
                let mut tail_buffer = Vec::new();
                wal_handle.read_to_end(&mut tail_buffer)?;
                tail_buffer
            }
            Err(open_fault) if open_fault.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(open_fault) => return Err(open_fault.into()),
        };

        let temporary_path = self.wal_file_path.with_extension("wal.tmp");
        {
            let mut rewrite_handle = File::create(&temporary_path)?;
            for surviving_event in surviving_events {
                let serialized_line = serde_json::to_string(surviving_event)?;
                rewrite_handle.write_all(serialized_line.as_bytes())?;
                rewrite_handle.write_all(b"\n")?;
            }
            rewrite_handle.write_all(&tail_bytes)?;
            rewrite_handle.sync_all()?;
        }

        fs::rename(&temporary_path, &self.wal_file_path)?;
        sync_parent_directory(&self.wal_file_path);

        debug!(
            "🧹 [WAL_COMPACTION]: Rotation sealed. {} survivors, {} tail bytes preserved.",
            surviving_events.len(),
            tail_bytes.len()
        );
        Ok(())
    }

    /**
     * Destierra un evento al Dead-Letter Queue con la metadata del fallo.
     */
    #[instrument(skip(self, condemned_event, failure_diagnostic))]
    pub fn append_dead_letter(
        &self,
        condemned_event: MeterEvent,
        failure_diagnostic: &str,
        exhausted_retries: u32,
    ) -> Result<(), WalError> {
        let dead_letter_entry = DeadLetterEntry {
            event: condemned_event,
            dlq_timestamp: chrono::Utc::now().to_rfc3339(),
            dlq_error: failure_diagnostic.to_string(),
            dlq_retries: exhausted_retries,
        };
        let serialized_line = serde_json::to_string(&dead_letter_entry)?;

        let _writer_guard = self.writer_exclusion_lock.lock().map_err(|_| WalError::LockPoisoned)?;

        let mut dead_letter_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.dead_letter_file_path)?;
        dead_letter_handle.write_all(serialized_line.as_bytes())?;
        dead_letter_handle.write_all(b"\n")?;

        warn!(
            "⚰️  [METER_DLQ]: Event {} banished after {} retries: {}",
            dead_letter_entry.event.id, exhausted_retries, failure_diagnostic
        );
        Ok(())
    }

    /// Lee el DLQ completo (inspección operativa y Proving Grounds).
    pub fn read_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, WalError> {
        let dead_letter_handle = match File::open(&self.dead_letter_file_path) {
            Ok(handle) => handle,
            Err(open_fault) if open_fault.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(open_fault) => return Err(open_fault.into()),
        };

        let mut entries = Vec::new();
        for dead_letter_line in BufReader::new(dead_letter_handle).lines() {
            let dead_letter_line = dead_letter_line?;
            if dead_letter_line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeadLetterEntry>(&dead_letter_line) {
                Ok(entry) => entries.push(entry),
                Err(parse_fault) => {
                    error!("💀 [DLQ_CORRUPTION]: Unparseable DLQ line skipped: {}", parse_fault);
                }
            }
        }
        Ok(entries)
    }
}

/// fsync del directorio contenedor tras la rotación (best-effort en
/// plataformas sin soporte de open-directory).
fn sync_parent_directory(child_path: &Path) {
    if let Some(parent_directory) = child_path.parent() {
        if let Ok(directory_handle) = File::open(parent_directory) {
            let _ = directory_handle.sync_all();
        }
    }
}

// FIN DEL ARCHIVO [libs/infra/meter-wal/src/lib.rs]
