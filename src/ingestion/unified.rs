//! Ingestion orchestrator.
//!
//! [`Ingestor::ingest`] turns raw upload bytes into a stored dataset:
//!
//! 1. validate the filename extension (nothing is written for unsupported types)
//! 2. generate a [`DatasetId`] and copy the bytes to `<upload-root>/<id>/raw.<ext>`
//! 3. sniff encoding and delimiter
//! 4. load a bounded sample and count the full file
//! 5. write `<meta-root>/<id>.json`
//!
//! The first failing step short-circuits and is reported as an [`IngestError`] naming the stage.
//! Artifacts written by earlier steps are left in place; a missing metadata record is the signal
//! that ingestion did not complete.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::IngestConfig;
use crate::error::{IngestionError, IngestionResult};
use crate::ids::{self, DatasetId};
use crate::storage::{MetadataStore, RawStore};
use crate::types::DatasetMetadata;

use super::csv::{Sample, SampleOptions, load_sample_with};
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use super::sniff::{SniffReport, SourceExtension, sniff_with};

/// Pipeline step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestStage {
    Validate,
    Persist,
    Sniff,
    Sample,
    WriteMetadata,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validate => "validate",
            Self::Persist => "persist",
            Self::Sniff => "sniff",
            Self::Sample => "sample",
            Self::WriteMetadata => "write_metadata",
        })
    }
}

/// A failed ingestion: which stage failed, and why.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct IngestError {
    pub stage: IngestStage,
    /// Set once an id was generated; partial artifacts may exist under it.
    pub dataset_id: Option<DatasetId>,
    #[source]
    pub error: IngestionError,
}

impl IngestError {
    fn at(stage: IngestStage, dataset_id: Option<DatasetId>) -> impl FnOnce(IngestionError) -> IngestError {
        move |error| IngestError {
            stage,
            dataset_id,
            error,
        }
    }

    pub fn severity(&self) -> IngestionSeverity {
        IngestionSeverity::of(&self.error)
    }
}

/// Options controlling a single ingestion.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Sample size; `None` uses [`IngestConfig::sample_rows`].
    pub sample_rows: Option<usize>,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("sample_rows", &self.sample_rows)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            sample_rows: None,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// A successfully ingested dataset.
#[derive(Debug, Clone)]
pub struct IngestedDataset {
    pub id: DatasetId,
    /// The record that was persisted.
    pub metadata: DatasetMetadata,
    /// Sniff result plus how each hint was obtained.
    pub sniff: SniffReport,
    /// In-memory sample and total row count.
    pub sample: Sample,
    /// Lowercase hex SHA-256 of the raw bytes.
    pub content_sha256: String,
    pub bytes: u64,
}

/// Lowercased text after the last `.` of `filename`, or `""` when there is none.
///
/// A leading dot counts, so `.csv` names a CSV upload.
pub fn upload_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Stateless entry point over the upload and metadata roots of an [`IngestConfig`].
#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
    raw: RawStore,
    meta: MetadataStore,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> IngestionResult<Self> {
        config.validate()?;
        Ok(Self {
            raw: RawStore::new(config.upload_dir()),
            meta: MetadataStore::new(config.meta_dir()),
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn raw_store(&self) -> &RawStore {
        &self.raw
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.meta
    }

    /// Ingest an upload held in memory.
    ///
    /// When an observer is configured, this reports:
    ///
    /// - `on_success` on success, with sample/total row stats
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
    ///
    /// ```no_run
    /// use datachat_ingest::config::IngestConfig;
    /// use datachat_ingest::ingestion::{Ingestor, IngestionOptions};
    ///
    /// let ingestor = Ingestor::new(IngestConfig::with_data_dir("data")).unwrap();
    /// let bytes = std::fs::read("sales.csv").unwrap();
    /// let ds = ingestor.ingest(&bytes, "sales.csv", &IngestionOptions::default()).unwrap();
    /// println!("{} -> {:?}", ds.id, ds.metadata.shape_total);
    /// ```
    pub fn ingest(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &IngestionOptions,
    ) -> Result<IngestedDataset, IngestError> {
        let result = self.run(filename, options, || Ok(bytes));
        report(filename, options, &result);
        result
    }

    /// Ingest a file already on disk, streaming it into storage.
    ///
    /// The file name (not the full path) is used as the upload filename.
    pub fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        options: &IngestionOptions,
    ) -> Result<IngestedDataset, IngestError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = self.run(&filename, options, || {
            File::open(path).map_err(|e| IngestionError::from_io_at(e, path))
        });
        report(&filename, options, &result);
        result
    }

    fn run<R, F>(
        &self,
        filename: &str,
        options: &IngestionOptions,
        open: F,
    ) -> Result<IngestedDataset, IngestError>
    where
        R: Read,
        F: FnOnce() -> IngestionResult<R>,
    {
        let ext = SourceExtension::parse(&upload_extension(filename))
            .map_err(IngestError::at(IngestStage::Validate, None))?;

        let id = ids::generate(filename);
        let stored = open()
            .and_then(|reader| self.raw.persist_from_reader(&id, ext.as_str(), reader))
            .map_err(IngestError::at(IngestStage::Persist, Some(id.clone())))?;

        let sniff = sniff_with(&stored.path, ext.as_str(), &self.config.sniff_options())
            .map_err(IngestError::at(IngestStage::Sniff, Some(id.clone())))?;

        let sample_options = SampleOptions {
            max_rows: options.sample_rows.unwrap_or(self.config.sample_rows),
            count_chunk_rows: self.config.count_chunk_rows,
        };
        let sample = load_sample_with(&stored.path, &sniff.result, &sample_options)
            .map_err(IngestError::at(IngestStage::Sample, Some(id.clone())))?;

        let metadata = DatasetMetadata {
            sniff: sniff.result.clone(),
            shape_sample: sample.sample_shape(),
            shape_total: Some(sample.total_shape()),
            shape_total_source: sample.total.source(),
            columns: sample.data.columns(),
            ext,
            raw_path: stored.path.clone(),
        };
        self.meta
            .write(&id, &metadata)
            .map_err(IngestError::at(IngestStage::WriteMetadata, Some(id.clone())))?;

        Ok(IngestedDataset {
            id,
            metadata,
            sniff,
            sample,
            content_sha256: stored.sha256,
            bytes: stored.bytes,
        })
    }

    /// Stored metadata for `id`; `Ok(None)` if it was never (completely) ingested.
    pub fn read(&self, id: &DatasetId) -> IngestionResult<Option<DatasetMetadata>> {
        self.meta.read(id)
    }

    /// The most recently written dataset, rediscovered from durable storage.
    pub fn find_most_recent(&self) -> IngestionResult<Option<(DatasetId, DatasetMetadata)>> {
        self.meta.find_most_recent()
    }

    /// Remove every dataset: all metadata records and all raw uploads.
    pub fn reset(&self) -> IngestionResult<()> {
        self.meta.clear()?;
        self.raw.clear()?;
        tracing::info!(
            meta_dir = %self.meta.root().display(),
            upload_dir = %self.raw.root().display(),
            "cleared all datasets"
        );
        Ok(())
    }
}

fn report(filename: &str, options: &IngestionOptions, result: &Result<IngestedDataset, IngestError>) {
    let Some(obs) = options.observer.as_ref() else {
        return;
    };
    match result {
        Ok(ds) => {
            let ctx = IngestionContext {
                filename: filename.to_owned(),
                dataset_id: Some(ds.id.clone()),
                stage: IngestStage::WriteMetadata,
            };
            obs.on_success(
                &ctx,
                IngestionStats {
                    sample_rows: ds.sample.data.row_count(),
                    total_rows: ds.sample.total.rows(),
                    total_source: ds.sample.total.source(),
                    columns: ds.sample.data.column_count(),
                    bytes: ds.bytes,
                },
            );
        }
        Err(e) => {
            let ctx = IngestionContext {
                filename: filename.to_owned(),
                dataset_id: e.dataset_id.clone(),
                stage: e.stage,
            };
            let sev = e.severity();
            obs.on_failure(&ctx, sev, e);
            if sev >= options.alert_at_or_above {
                obs.on_alert(&ctx, sev, e);
            }
        }
    }
}

/// Convenience helper for callers that want an owned request object.
///
/// This can be useful if you want to enqueue ingestion work in a job system.
#[derive(Clone)]
pub struct IngestionRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub options: IngestionOptions,
}

impl fmt::Debug for IngestionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionRequest")
            .field("filename", &self.filename)
            .field("bytes_len", &self.bytes.len())
            .field("options", &self.options)
            .finish()
    }
}

impl IngestionRequest {
    /// Execute the request by calling [`Ingestor::ingest`].
    pub fn run(&self, ingestor: &Ingestor) -> Result<IngestedDataset, IngestError> {
        ingestor.ingest(&self.bytes, &self.filename, &self.options)
    }
}
