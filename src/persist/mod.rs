use crate::region::{PersistedRecord, RegionCoordinate, RegionRecord};
use crate::store::RecordStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;


/// Durable image of the record store.
///
/// One entry per region keyed `"{world};{x};{z}"`. The whole archive is
/// rewritten from the in-memory store on every save; there is no incremental
/// diffing. Entries are held as raw JSON values so a single malformed entry
/// is skipped at load without poisoning its siblings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordArchive {
    /// Archive format version (for future schema evolution)
    pub archive_version: String,

    /// Timestamp when the archive was written
    pub created_at: DateTime<Utc>,

    pub records: HashMap<String, serde_json::Value>,
}

/// Result of restoring an archive into a store.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub loaded: usize,
    /// Entries dropped by the retention check. A nonzero count obliges the
    /// caller to re-save immediately.
    pub dropped: usize,
    /// Entries skipped because the key or fields were unreadable.
    pub malformed: usize,
    /// Cleared records still inside their amnesty window, with remaining ms;
    /// the caller schedules their deferred removal.
    pub amnesty: Vec<(RegionCoordinate, i64)>,
}

impl RecordArchive {
    /// Build an archive from the current store contents, applying the
    /// retention check at save time so expired records never hit disk.
    pub fn from_store(store: &RecordStore, now_ms: i64, retention_ms: i64) -> Self {
        let mut records = HashMap::new();
        for (coord, record) in store.export_all() {
            if record.is_expired(now_ms, retention_ms) {
                continue;
            }
            match serde_json::to_value(record.to_persisted()) {
                Ok(value) => {
                    records.insert(coord.to_string(), value);
                }
                Err(e) => {
                    warn!(region = %coord, error = %e, "Skipping unserializable record");
                }
            }
        }

        Self {
            archive_version: "1".to_string(),
            created_at: Utc::now(),
            records,
        }
    }

    /// Restore entries into `store`, replacing its contents.
    ///
    /// Entries failing the retention check are dropped; unreadable entries
    /// are skipped with a warning. Neither is fatal to the rest of the load.
    pub fn restore_into(&self, store: &RecordStore, now_ms: i64, retention_ms: i64) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        let mut entries = Vec::new();

        for (key, value) in &self.records {
            let coord: RegionCoordinate = match key.parse() {
                Ok(coord) => coord,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping record with malformed key");
                    outcome.malformed += 1;
                    continue;
                }
            };

            let persisted: PersistedRecord = match serde_json::from_value(value.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed record entry");
                    outcome.malformed += 1;
                    continue;
                }
            };

            let record = RegionRecord::from_persisted(&persisted);
            if record.is_expired(now_ms, retention_ms) {
                outcome.dropped += 1;
                continue;
            }
            if let Some(remaining) = record.amnesty_remaining_ms(now_ms) {
                outcome.amnesty.push((coord.clone(), remaining));
            }

            entries.push((coord, record));
        }

        outcome.loaded = entries.len();
        store.replace_all(entries);
        outcome
    }

    /// Save the archive as compressed JSON (gzip).
    ///
    /// Uses atomic write: writes to .tmp file, fsyncs, then renames. This
    /// prevents partial/corrupt archives from being read.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize record archive")?;

        let tmp_path = path.with_extension("tmp");
        {
            let tmp_file =
                File::create(&tmp_path).context("Failed to create temporary archive file")?;

            let mut encoder = GzEncoder::new(tmp_file, Compression::default());
            encoder
                .write_all(json.as_bytes())
                .context("Failed to write compressed archive data")?;

            let file = encoder.finish().context("Failed to finish compression")?;
            file.sync_all()
                .context("Failed to sync archive file to disk")?;
        }

        fs::rename(&tmp_path, path).context("Failed to rename temporary archive file")?;
        Ok(())
    }

    /// Load an archive from a compressed JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).context("Failed to open archive file")?;

        let mut decoder = GzDecoder::new(file);
        let mut json = String::new();
        decoder
            .read_to_string(&mut json)
            .context("Failed to decompress archive file")?;

        serde_json::from_str(&json).context("Failed to deserialize archive JSON")
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
