use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::IngestionError;
use crate::ids::DatasetId;
use crate::types::ShapeSource;

use super::unified::{IngestError, IngestStage};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal, or the input is usable with different hints).
    Warning,
    /// Error-level event (operation failed on bad input).
    Error,
    /// Critical error (I/O failures, files vanishing underneath us).
    Critical,
}

impl IngestionSeverity {
    /// Classify an error.
    pub fn of(error: &IngestionError) -> Self {
        match error {
            IngestionError::Io(_) | IngestionError::FileMissing { .. } => Self::Critical,
            IngestionError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Error,
            },
            IngestionError::Storage { .. } => Self::Critical,
            IngestionError::EmptyResult { .. } | IngestionError::TotalCountFailed { .. } => Self::Warning,
            IngestionError::UnsupportedFormat { .. }
            | IngestionError::LoadFailed { .. }
            | IngestionError::Json(_)
            | IngestionError::Config { .. } => Self::Error,
        }
    }
}

/// Context about an ingestion attempt.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// Original upload filename.
    pub filename: String,
    /// Assigned id; `None` when validation failed before one was generated.
    pub dataset_id: Option<DatasetId>,
    /// Last stage reached.
    pub stage: IngestStage,
}

/// Stats reported on successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Rows held in the in-memory sample.
    pub sample_rows: usize,
    /// Rows in the whole file (see `total_source`).
    pub total_rows: u64,
    pub total_source: ShapeSource,
    pub columns: usize,
    /// Size of the stored raw file.
    pub bytes: u64,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when ingestion succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when ingestion fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestError) {}

    /// Called when an ingestion failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports ingestion events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            filename = %ctx.filename,
            dataset_id = ctx.dataset_id.as_ref().map(DatasetId::as_str),
            sample_rows = stats.sample_rows,
            total_rows = stats.total_rows,
            total_source = ?stats.total_source,
            columns = stats.columns,
            bytes = stats.bytes,
            "ingested dataset"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        tracing::warn!(
            filename = %ctx.filename,
            dataset_id = ctx.dataset_id.as_ref().map(DatasetId::as_str),
            stage = %ctx.stage,
            ?severity,
            error = %error,
            "ingestion failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        tracing::error!(
            filename = %ctx.filename,
            dataset_id = ctx.dataset_id.as_ref().map(DatasetId::as_str),
            stage = %ctx.stage,
            ?severity,
            error = %error,
            "ingestion alert"
        );
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

fn id_or_dash(ctx: &IngestionContext) -> &str {
    ctx.dataset_id.as_ref().map_or("-", DatasetId::as_str)
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok id={} file={} sample_rows={} total_rows={} total_source={:?} cols={} bytes={}",
            unix_ts(),
            id_or_dash(ctx),
            ctx.filename,
            stats.sample_rows,
            stats.total_rows,
            stats.total_source,
            stats.columns,
            stats.bytes
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        self.append_line(&format!(
            "{} fail severity={:?} id={} file={} stage={} err={}",
            unix_ts(),
            severity,
            id_or_dash(ctx),
            ctx.filename,
            ctx.stage,
            error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} id={} file={} stage={} err={}",
            unix_ts(),
            severity,
            id_or_dash(ctx),
            ctx.filename,
            ctx.stage,
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
