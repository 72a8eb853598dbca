//! CSV dataset store.
//!
//! Layout: `{data_dir}/{source}/{source}.csv` plus `{data_dir}/{source}/meta.json`
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Validation on load; a file that fails it is renamed to `.csv.quarantined`
//!   and the source starts over from an empty dataset
//! - Metadata sidecar with the blake3 hash of the CSV bytes

use super::dataset::{Dataset, DatasetError, SeriesSchema};
use super::provider::ObservationRow;
use crate::period::{Period, Periodicity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const YEAR_COLUMN: &str = "year";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Errors that mean the stored file itself is bad, as opposed to the disk.
    fn is_corruption(&self) -> bool {
        matches!(self, Self::Csv(_) | Self::Validation(_) | Self::Dataset(_))
    }
}

/// Metadata sidecar for a stored dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub source: String,
    pub periodicity: Periodicity,
    pub first_period: Option<String>,
    pub last_period: Option<String>,
    pub row_count: usize,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

/// One file per source, rewritten whole on every run.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_dir(&self, source: &str) -> PathBuf {
        self.root.join(source)
    }

    /// `{data_dir}/{source}/{source}.csv`
    pub fn data_path(&self, source: &str) -> PathBuf {
        self.source_dir(source).join(format!("{source}.csv"))
    }

    fn meta_path(&self, source: &str) -> PathBuf {
        self.source_dir(source).join("meta.json")
    }

    /// Load the stored dataset for `schema`.
    ///
    /// A missing file is an empty dataset. A file that does not parse or
    /// validate is quarantined and also treated as empty.
    pub fn load(&self, schema: &SeriesSchema) -> Result<Dataset, StoreError> {
        let path = self.data_path(&schema.source);
        match self.read(schema) {
            Err(e) if e.is_corruption() => {
                let quarantine = path.with_extension("csv.quarantined");
                warn!(
                    source = %schema.source,
                    path = %path.display(),
                    error = %e,
                    "quarantining corrupt dataset file"
                );
                fs::rename(&path, &quarantine).map_err(|e| StoreError::io(&path, e))?;
                Ok(Dataset::empty(schema.clone()))
            }
            result => result,
        }
    }

    /// Like [`load`](Self::load) but never touches the store: a corrupt
    /// file is returned as an error and left in place.
    pub fn read(&self, schema: &SeriesSchema) -> Result<Dataset, StoreError> {
        let path = self.data_path(&schema.source);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(source = %schema.source, "no stored dataset");
                return Ok(Dataset::empty(schema.clone()));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let dataset = decode_csv(&bytes, schema)?;
        if let Some(meta) = self.meta(&schema.source) {
            if meta.data_hash != hash_bytes(&bytes) {
                warn!(source = %schema.source, "stored dataset does not match its metadata hash");
            }
        }
        Ok(dataset)
    }

    /// Persist `dataset` and its metadata sidecar. Both writes are atomic.
    pub fn write(&self, dataset: &Dataset) -> Result<StoreMeta, StoreError> {
        let source = dataset.source();
        let dir = self.source_dir(source);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let bytes = encode_csv(dataset)?;
        write_atomic(&self.data_path(source), &bytes)?;

        let meta = StoreMeta {
            source: source.to_string(),
            periodicity: dataset.schema().periodicity,
            first_period: dataset.first_period().map(|p| p.to_string()),
            last_period: dataset.last_period().map(|p| p.to_string()),
            row_count: dataset.len(),
            data_hash: hash_bytes(&bytes),
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;
        write_atomic(&self.meta_path(source), &meta_json)?;

        info!(source, rows = meta.row_count, "dataset written");
        Ok(meta)
    }

    /// Metadata sidecar for `source`, if one exists and parses.
    pub fn meta(&self, source: &str) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(source)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })
}

fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

// ── CSV encoding ────────────────────────────────────────────────────

fn encode_csv(dataset: &Dataset) -> Result<Vec<u8>, StoreError> {
    let schema = dataset.schema();
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![YEAR_COLUMN, schema.periodicity.unit_label()];
    header.extend(schema.columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for row in dataset.rows() {
        let mut record = vec![row.period.year().to_string(), row.period.unit().to_string()];
        record.extend(
            schema
                .columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| StoreError::Validation(format!("flushing CSV buffer: {e}")))
}

fn decode_csv(bytes: &[u8], schema: &SeriesSchema) -> Result<Dataset, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let unit_label = schema.periodicity.unit_label();
    if headers.get(0) != Some(YEAR_COLUMN) || headers.get(1) != Some(unit_label) {
        return Err(StoreError::Validation(format!(
            "expected leading columns '{YEAR_COLUMN},{unit_label}', found '{}'",
            headers.iter().take(2).collect::<Vec<_>>().join(",")
        )));
    }

    let mut columns: Vec<(usize, &str)> = Vec::new();
    for (idx, name) in headers.iter().enumerate().skip(2) {
        match schema.columns.iter().find(|c| c.as_str() == name) {
            Some(column) => columns.push((idx, column.as_str())),
            None => warn!(source = %schema.source, column = name, "ignoring unknown stored column"),
        }
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let year: i32 = parse_field(record.get(0), "year", line)?;
        let unit: u32 = parse_field(record.get(1), unit_label, line)?;
        let period = Period::new(year, unit, schema.periodicity)
            .map_err(|e| StoreError::Validation(format!("row {line}: {e}")))?;

        let mut row = ObservationRow::new(period);
        for &(idx, name) in &columns {
            let raw = record.get(idx).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            let value = raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    StoreError::Validation(format!(
                        "row {line}: '{raw}' in column '{name}' is not a finite number"
                    ))
                })?;
            row.set(name, value);
        }
        rows.push(row);
    }

    Ok(Dataset::from_rows(schema.clone(), rows)?)
}

fn parse_field<T: std::str::FromStr>(raw: Option<&str>, name: &str, line: usize) -> Result<T, StoreError> {
    let raw = raw.unwrap_or_default();
    raw.parse()
        .map_err(|_| StoreError::Validation(format!("row {line}: invalid {name} '{raw}'")))
}
