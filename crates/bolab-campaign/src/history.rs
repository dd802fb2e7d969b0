//! Append-only ledger of suggestion batches and measured results.

use std::collections::BTreeMap;

use bolab_core::errors::{BolabError, ErrorInfo};
use bolab_core::ids::BatchId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One suggested parameter assignment, keyed by parameter name.
pub type Row = BTreeMap<String, Value>;

/// Measured objective values for one row, keyed by objective name.
pub type Outcome = BTreeMap<String, f64>;

/// Lifecycle of a suggestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Suggested, awaiting measured results.
    Pending,
    /// Results ingested; available as training data.
    Completed,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Provenance of a suggestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchSource {
    /// Produced by the external optimization engine.
    Optimizer,
    /// Produced by the constraint-respecting random sampler.
    Fallback,
}

impl std::fmt::Display for BatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchSource::Optimizer => write!(f, "optimizer"),
            BatchSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// One generated batch of suggested experiments.
///
/// Immutable once created except for the pending→completed status flip,
/// which [`RunHistory::complete_batch`] performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunBatch {
    /// Unique batch identity.
    pub id: BatchId,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
    /// Whether the optimizer or the fallback produced the rows.
    pub source: BatchSource,
    /// Lifecycle status.
    pub status: BatchStatus,
    /// Ordered suggested rows covering every parameter name.
    pub rows: Vec<Row>,
}

impl RunBatch {
    /// Creates a pending batch stamped now.
    pub fn pending(source: BatchSource, rows: Vec<Row>) -> Self {
        Self {
            id: BatchId::generate(),
            generated_at: Utc::now(),
            source,
            status: BatchStatus::Pending,
            rows,
        }
    }
}

/// One measured result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Batch the measurement belongs to.
    pub batch_id: BatchId,
    /// Index of the measured row within the batch.
    pub row_index: usize,
    /// Measured value per objective.
    pub measurements: Outcome,
    /// Ingestion timestamp.
    pub ingested_at: DateTime<Utc>,
}

/// Outcome of a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Results were appended and the batch flipped to completed.
    Appended,
    /// The batch was already completed; nothing changed.
    AlreadyCompleted,
}

/// Append-only set of all batches and results for one campaign.
///
/// Entries are never mutated or deleted; the only state transition is the
/// status flip performed by [`complete_batch`](Self::complete_batch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunHistory {
    batches: Vec<RunBatch>,
    results: Vec<RunResult>,
}

impl RunHistory {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembles a ledger from persisted parts, restoring generation order.
    pub(crate) fn from_parts(mut batches: Vec<RunBatch>, results: Vec<RunResult>) -> Self {
        batches.sort_by_key(|b| b.generated_at);
        Self { batches, results }
    }

    /// Appends a freshly generated batch.
    pub fn append_batch(&mut self, batch: RunBatch) -> Result<(), BolabError> {
        if self.batches.iter().any(|b| b.id == batch.id) {
            return Err(BolabError::Validation(
                ErrorInfo::new("batch-duplicate", "batch id already recorded")
                    .with_context("batch", batch.id.to_string()),
            ));
        }
        self.batches.push(batch);
        Ok(())
    }

    /// Appends measured results and flips the batch to completed.
    ///
    /// Unknown ids fail with `BatchNotFound`. Re-submitting a completed
    /// batch is an idempotent no-op; nothing is ever double-appended. A
    /// row-count mismatch or non-finite measurement fails validation and
    /// leaves the ledger untouched.
    pub fn complete_batch(
        &mut self,
        batch_id: BatchId,
        outcomes: Vec<Outcome>,
    ) -> Result<CompletionOutcome, BolabError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or_else(|| {
                BolabError::BatchNotFound(
                    ErrorInfo::new("batch-unknown", "no batch with the submitted id")
                        .with_context("batch", batch_id.to_string()),
                )
            })?;

        if batch.status == BatchStatus::Completed {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }
        if outcomes.len() != batch.rows.len() {
            return Err(BolabError::Validation(
                ErrorInfo::new("result-count", "result rows do not match the batch")
                    .with_context("batch", batch_id.to_string())
                    .with_context("expected", batch.rows.len().to_string())
                    .with_context("submitted", outcomes.len().to_string()),
            ));
        }
        for (idx, outcome) in outcomes.iter().enumerate() {
            for (objective, value) in outcome {
                if !value.is_finite() {
                    return Err(BolabError::Validation(
                        ErrorInfo::new("result-non-finite", "measured value must be finite")
                            .with_context("row", idx.to_string())
                            .with_context("objective", objective.clone()),
                    ));
                }
            }
        }

        let ingested_at = Utc::now();
        for (row_index, measurements) in outcomes.into_iter().enumerate() {
            self.results.push(RunResult {
                batch_id,
                row_index,
                measurements,
                ingested_at,
            });
        }
        batch.status = BatchStatus::Completed;
        Ok(CompletionOutcome::Appended)
    }

    /// Looks up a batch by id.
    pub fn batch(&self, batch_id: BatchId) -> Option<&RunBatch> {
        self.batches.iter().find(|b| b.id == batch_id)
    }

    /// Iterates batches in generation order.
    pub fn batches(&self) -> impl Iterator<Item = &RunBatch> {
        self.batches.iter()
    }

    /// Iterates all recorded results in ingestion order.
    pub fn results(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter()
    }

    /// Results recorded for one batch, in row order.
    pub fn results_for(&self, batch_id: BatchId) -> Vec<&RunResult> {
        self.results
            .iter()
            .filter(|r| r.batch_id == batch_id)
            .collect()
    }

    /// Completed `(row, outcome)` pairs in chronological generation order;
    /// this is the engine's training set.
    pub fn completed_measurements(&self) -> Vec<(Row, Outcome)> {
        let mut pairs = Vec::new();
        for batch in &self.batches {
            if batch.status != BatchStatus::Completed {
                continue;
            }
            for result in self.results_for(batch.id) {
                if let Some(row) = batch.rows.get(result.row_index) {
                    pairs.push((row.clone(), result.measurements.clone()));
                }
            }
        }
        pairs
    }

    /// Number of recorded batches.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Number of recorded result rows.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// True when at least one completed measurement exists.
    pub fn has_training_data(&self) -> bool {
        self.batches
            .iter()
            .any(|b| b.status == BatchStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(x: f64) -> Row {
        let mut row = Row::new();
        row.insert("x".to_string(), json!(x));
        row
    }

    fn outcome(y: f64) -> Outcome {
        let mut outcome = Outcome::new();
        outcome.insert("yield".to_string(), y);
        outcome
    }

    #[test]
    fn completion_is_idempotent() {
        let mut history = RunHistory::new();
        let batch = RunBatch::pending(BatchSource::Fallback, vec![row(1.0), row(2.0)]);
        let id = batch.id;
        history.append_batch(batch).expect("append");

        let first = history
            .complete_batch(id, vec![outcome(0.5), outcome(0.7)])
            .expect("complete");
        assert_eq!(first, CompletionOutcome::Appended);
        assert_eq!(history.result_count(), 2);

        let second = history
            .complete_batch(id, vec![outcome(0.5), outcome(0.7)])
            .expect("resubmit");
        assert_eq!(second, CompletionOutcome::AlreadyCompleted);
        assert_eq!(history.result_count(), 2);
    }

    #[test]
    fn unknown_batch_is_rejected_and_ledger_unchanged() {
        let mut history = RunHistory::new();
        let err = history
            .complete_batch(BatchId::generate(), vec![outcome(1.0)])
            .unwrap_err();
        assert!(matches!(err, BolabError::BatchNotFound(_)));
        assert_eq!(history.result_count(), 0);
    }

    #[test]
    fn row_count_mismatch_is_rejected() {
        let mut history = RunHistory::new();
        let batch = RunBatch::pending(BatchSource::Optimizer, vec![row(1.0), row(2.0)]);
        let id = batch.id;
        history.append_batch(batch).expect("append");
        let err = history.complete_batch(id, vec![outcome(0.1)]).unwrap_err();
        assert_eq!(err.info().code, "result-count");
        assert_eq!(history.result_count(), 0);
    }

    #[test]
    fn training_pairs_follow_generation_order() {
        let mut history = RunHistory::new();
        let first = RunBatch::pending(BatchSource::Fallback, vec![row(1.0)]);
        let second = RunBatch::pending(BatchSource::Optimizer, vec![row(2.0)]);
        let first_id = first.id;
        let second_id = second.id;
        history.append_batch(first).expect("append");
        history.append_batch(second).expect("append");
        history
            .complete_batch(second_id, vec![outcome(0.2)])
            .expect("complete");
        history
            .complete_batch(first_id, vec![outcome(0.1)])
            .expect("complete");

        let pairs = history.completed_measurements();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0["x"], json!(1.0));
        assert_eq!(pairs[1].0["x"], json!(2.0));
    }
}
