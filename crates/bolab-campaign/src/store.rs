//! Filesystem persistence for campaigns, run ledgers, and optimizer state.
//!
//! Layout per workspace root:
//!
//! ```text
//! campaigns/<campaign_id>/config.json
//! campaigns/<campaign_id>/runs/<batch_id>.csv
//! campaigns/<campaign_id>/optimizer_state.bin
//! settings.json
//! ```
//!
//! Every write is write-temp-then-rename in the destination directory, so a
//! crash mid-write leaves either the old or the new complete file visible.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::ids::{BatchId, CampaignId};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde_json::Value;

use crate::config::CampaignConfig;
use crate::history::{BatchSource, BatchStatus, Outcome, Row, RunBatch, RunHistory, RunResult};
use crate::migrate::{decode_config, encode_config};
use crate::parameter::ParameterDomain;

const CAMPAIGNS_DIRNAME: &str = "campaigns";
const RUNS_DIRNAME: &str = "runs";
const CONFIG_FILENAME: &str = "config.json";
const STATE_FILENAME: &str = "optimizer_state.bin";

const COL_BATCH_ID: &str = "batch_id";
const COL_ROW_INDEX: &str = "row_index";
const COL_STATUS: &str = "status";
const COL_SOURCE: &str = "source";
const COL_GENERATED_AT: &str = "generated_at";
const COL_INGESTED_AT: &str = "ingested_at";

static TEMP_NONCE: AtomicU64 = AtomicU64::new(0);

/// Filesystem store rooted at one workspace directory.
#[derive(Debug, Clone)]
pub struct CampaignStore {
    root: PathBuf,
}

impl CampaignStore {
    /// Creates a store rooted at `root`. Nothing is touched until the first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one campaign's artifacts.
    pub fn campaign_dir(&self, id: CampaignId) -> PathBuf {
        self.root.join(CAMPAIGNS_DIRNAME).join(id.to_string())
    }

    /// Path to one campaign's config file.
    pub fn config_path(&self, id: CampaignId) -> PathBuf {
        self.campaign_dir(id).join(CONFIG_FILENAME)
    }

    /// Path to one campaign's opaque optimizer-state file.
    pub fn optimizer_state_path(&self, id: CampaignId) -> PathBuf {
        self.campaign_dir(id).join(STATE_FILENAME)
    }

    /// Path to one batch's ledger file.
    pub fn batch_path(&self, id: CampaignId, batch_id: BatchId) -> PathBuf {
        self.campaign_dir(id)
            .join(RUNS_DIRNAME)
            .join(format!("{batch_id}.csv"))
    }

    /// Serializes and atomically persists a campaign config.
    pub fn save_config(&self, config: &CampaignConfig) -> Result<(), BolabError> {
        let bytes = encode_config(config)?;
        atomic_write(&self.config_path(config.id), &bytes)
    }

    /// Loads a campaign config, migrating older schemas forward.
    pub fn load_config(&self, id: CampaignId) -> Result<CampaignConfig, BolabError> {
        let path = self.config_path(id);
        let bytes = fs::read(&path).map_err(|err| {
            BolabError::Storage(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        decode_config(&bytes)
    }

    /// Persists one batch (and its recorded results) as a ledger CSV.
    pub fn save_batch(
        &self,
        config: &CampaignConfig,
        batch: &RunBatch,
        results: &[&RunResult],
    ) -> Result<(), BolabError> {
        let bytes = render_batch_csv(config, batch, results)?;
        atomic_write(&self.batch_path(config.id, batch.id), &bytes)
    }

    /// Rebuilds the run history from the ledger files on disk.
    ///
    /// Temp files and foreign files in the runs directory are ignored; an
    /// absent runs directory yields an empty ledger.
    pub fn load_history(&self, config: &CampaignConfig) -> Result<RunHistory, BolabError> {
        let runs_dir = self.campaign_dir(config.id).join(RUNS_DIRNAME);
        if !runs_dir.exists() {
            return Ok(RunHistory::new());
        }
        let mut batches = Vec::new();
        let mut results = Vec::new();
        let entries = fs::read_dir(&runs_dir).map_err(|err| {
            BolabError::Storage(
                ErrorInfo::new("runs-scan", err.to_string())
                    .with_context("path", runs_dir.display().to_string()),
            )
        })?;
        for entry in entries {
            let entry = entry.map_err(|err| {
                BolabError::Storage(ErrorInfo::new("runs-scan-entry", err.to_string()))
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            let (batch, batch_results) = parse_batch_csv(config, &path)?;
            batches.push(batch);
            results.extend(batch_results);
        }
        Ok(RunHistory::from_parts(batches, results))
    }

    /// Reads the raw optimizer-state bytes, if any were persisted.
    pub fn read_optimizer_state(&self, id: CampaignId) -> Result<Option<Vec<u8>>, BolabError> {
        let path = self.optimizer_state_path(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BolabError::Storage(
                ErrorInfo::new("state-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )),
        }
    }

    /// Atomically persists the raw optimizer-state bytes.
    pub fn write_optimizer_state(&self, id: CampaignId, bytes: &[u8]) -> Result<(), BolabError> {
        atomic_write(&self.optimizer_state_path(id), bytes)
    }

    /// Lists every campaign with a readable directory name.
    pub fn list_campaigns(&self) -> Result<Vec<CampaignId>, BolabError> {
        let dir = self.root.join(CAMPAIGNS_DIRNAME);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|err| {
            BolabError::Storage(
                ErrorInfo::new("campaigns-scan", err.to_string())
                    .with_context("path", dir.display().to_string()),
            )
        })?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                BolabError::Storage(ErrorInfo::new("campaigns-scan-entry", err.to_string()))
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = CampaignId::parse(name) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Writes `bytes` to `path` through a same-directory temp file and rename.
///
/// Per the storage policy, a failed replacement is retried exactly once
/// before surfacing a `Storage` error.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), BolabError> {
    match replace_file(path, bytes) {
        Ok(()) => Ok(()),
        Err(first) => {
            tracing::warn!(
                path = %path.display(),
                error = %first,
                "atomic write failed, retrying once"
            );
            replace_file(path, bytes)
        }
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), BolabError> {
    let parent = path.parent().ok_or_else(|| {
        BolabError::Storage(
            ErrorInfo::new("write-no-parent", "destination has no parent directory")
                .with_context("path", path.display().to_string()),
        )
    })?;
    fs::create_dir_all(parent).map_err(|err| {
        BolabError::Storage(
            ErrorInfo::new("write-mkdir", err.to_string())
                .with_context("path", parent.display().to_string()),
        )
    })?;

    let nonce = TEMP_NONCE.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");
    let temp_path = parent.join(format!(
        ".{file_name}.tmp-{}-{nonce}",
        std::process::id()
    ));

    fs::write(&temp_path, bytes).map_err(|err| {
        BolabError::Storage(
            ErrorInfo::new("write-temp", err.to_string())
                .with_context("path", temp_path.display().to_string()),
        )
    })?;
    fs::rename(&temp_path, path).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        BolabError::Storage(
            ErrorInfo::new("write-rename", err.to_string())
                .with_context("from", temp_path.display().to_string())
                .with_context("to", path.display().to_string()),
        )
    })
}

fn render_batch_csv(
    config: &CampaignConfig,
    batch: &RunBatch,
    results: &[&RunResult],
) -> Result<Vec<u8>, BolabError> {
    let parameter_names = config.parameters.names();
    let objective_names = config.objectives.names();

    let mut header: Vec<String> = parameter_names.clone();
    header.extend(objective_names.iter().cloned());
    header.extend(
        [
            COL_BATCH_ID,
            COL_ROW_INDEX,
            COL_STATUS,
            COL_SOURCE,
            COL_GENERATED_AT,
            COL_INGESTED_AT,
        ]
        .map(String::from),
    );

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|err| wrap_csv("ledger-write-header", err))?;

    for (row_index, row) in batch.rows.iter().enumerate() {
        let result = results
            .iter()
            .find(|r| r.batch_id == batch.id && r.row_index == row_index);
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        for name in &parameter_names {
            record.push(row.get(name).map(value_to_cell).unwrap_or_default());
        }
        for name in &objective_names {
            record.push(
                result
                    .and_then(|r| r.measurements.get(name))
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        record.push(batch.id.to_string());
        record.push(row_index.to_string());
        record.push(batch.status.to_string());
        record.push(batch.source.to_string());
        record.push(batch.generated_at.to_rfc3339());
        record.push(
            result
                .map(|r| r.ingested_at.to_rfc3339())
                .unwrap_or_default(),
        );
        writer
            .write_record(&record)
            .map_err(|err| wrap_csv("ledger-write-row", err))?;
    }

    writer
        .into_inner()
        .map_err(|err| BolabError::Storage(ErrorInfo::new("ledger-flush", err.to_string())))
}

fn parse_batch_csv(
    config: &CampaignConfig,
    path: &Path,
) -> Result<(RunBatch, Vec<RunResult>), BolabError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|err| wrap_csv("ledger-read", err))?;
    let header: Vec<String> = reader
        .headers()
        .map_err(|err| wrap_csv("ledger-header", err))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    let column = |name: &str| header.iter().position(|h| h.as_str() == name);

    let batch_id_col = column(COL_BATCH_ID).ok_or_else(|| ledger_shape(path, COL_BATCH_ID))?;
    let row_index_col = column(COL_ROW_INDEX).ok_or_else(|| ledger_shape(path, COL_ROW_INDEX))?;
    let status_col = column(COL_STATUS).ok_or_else(|| ledger_shape(path, COL_STATUS))?;
    let source_col = column(COL_SOURCE).ok_or_else(|| ledger_shape(path, COL_SOURCE))?;
    let generated_col =
        column(COL_GENERATED_AT).ok_or_else(|| ledger_shape(path, COL_GENERATED_AT))?;
    let ingested_col = column(COL_INGESTED_AT);

    let mut batch_id = None;
    let mut generated_at = None;
    let mut status = BatchStatus::Pending;
    let mut source = BatchSource::Fallback;
    let mut rows: Vec<(usize, Row)> = Vec::new();
    let mut results = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|err| wrap_csv("ledger-record", err))?;
        let get = |idx: usize| record.get(idx).unwrap_or_default();

        let id = BatchId::parse(get(batch_id_col))?;
        batch_id.get_or_insert(id);
        let row_index: usize = get(row_index_col).parse().map_err(|_| {
            BolabError::Storage(
                ErrorInfo::new("ledger-row-index", "row index is not an integer")
                    .with_context("path", path.display().to_string()),
            )
        })?;
        status = parse_status(get(status_col), path)?;
        source = parse_source(get(source_col), path)?;
        generated_at = Some(parse_timestamp(get(generated_col), path)?);

        let mut row = Row::new();
        for parameter in config.parameters.iter() {
            if let Some(idx) = column(&parameter.name) {
                let cell = get(idx);
                if !cell.is_empty() {
                    row.insert(parameter.name.clone(), parse_cell(&parameter.domain, cell));
                }
            }
        }

        let mut measurements = Outcome::new();
        for objective in config.objectives.names() {
            if let Some(idx) = column(&objective) {
                let cell = get(idx);
                if let Ok(value) = cell.parse::<f64>() {
                    measurements.insert(objective, value);
                }
            }
        }
        if status == BatchStatus::Completed {
            let ingested_at = ingested_col
                .map(|idx| parse_timestamp(get(idx), path))
                .transpose()?
                .unwrap_or_else(Utc::now);
            results.push(RunResult {
                batch_id: id,
                row_index,
                measurements,
                ingested_at,
            });
        }

        rows.push((row_index, row));
    }

    let batch_id = batch_id.ok_or_else(|| {
        BolabError::Storage(
            ErrorInfo::new("ledger-empty", "ledger file holds no rows")
                .with_context("path", path.display().to_string()),
        )
    })?;
    rows.sort_by_key(|(idx, _)| *idx);

    let batch = RunBatch {
        id: batch_id,
        generated_at: generated_at.unwrap_or_else(Utc::now),
        source,
        status,
        rows: rows.into_iter().map(|(_, row)| row).collect(),
    };
    Ok((batch, results))
}

fn parse_cell(domain: &ParameterDomain, cell: &str) -> Value {
    match domain {
        ParameterDomain::Continuous { .. }
        | ParameterDomain::DiscreteRange { .. }
        | ParameterDomain::DiscreteSet { .. } => cell
            .parse::<f64>()
            .ok()
            .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number))
            .unwrap_or_else(|| Value::String(cell.to_string())),
        ParameterDomain::Categorical { .. } | ParameterDomain::Substance { .. } => {
            Value::String(cell.to_string())
        }
        ParameterDomain::Fixed { value } => match value {
            Value::String(_) => Value::String(cell.to_string()),
            _ => serde_json::from_str(cell).unwrap_or_else(|_| Value::String(cell.to_string())),
        },
    }
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn parse_status(cell: &str, path: &Path) -> Result<BatchStatus, BolabError> {
    match cell {
        "pending" => Ok(BatchStatus::Pending),
        "completed" => Ok(BatchStatus::Completed),
        other => Err(BolabError::Storage(
            ErrorInfo::new("ledger-status", "unknown batch status")
                .with_context("status", other)
                .with_context("path", path.display().to_string()),
        )),
    }
}

fn parse_source(cell: &str, path: &Path) -> Result<BatchSource, BolabError> {
    match cell {
        "optimizer" => Ok(BatchSource::Optimizer),
        "fallback" => Ok(BatchSource::Fallback),
        other => Err(BolabError::Storage(
            ErrorInfo::new("ledger-source", "unknown batch source")
                .with_context("source", other)
                .with_context("path", path.display().to_string()),
        )),
    }
}

fn parse_timestamp(cell: &str, path: &Path) -> Result<DateTime<Utc>, BolabError> {
    DateTime::parse_from_rfc3339(cell)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            BolabError::Storage(
                ErrorInfo::new("ledger-timestamp", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
}

fn ledger_shape(path: &Path, column: &str) -> BolabError {
    BolabError::Storage(
        ErrorInfo::new("ledger-shape", "ledger file is missing a required column")
            .with_context("column", column)
            .with_context("path", path.display().to_string()),
    )
}

fn wrap_csv(code: &str, err: csv::Error) -> BolabError {
    BolabError::Storage(ErrorInfo::new(code, "ledger CSV failure").with_hint(err.to_string()))
}
