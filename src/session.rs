//! Dataset context handed to the chat layer.
//!
//! A [`DatasetContext`] is a plain value: callers hold it per session or per request. After a restart
//! it is rebuilt from durable storage with [`restore_latest`]; nothing here caches across calls.

use serde::Serialize;

use crate::error::{IngestionError, IngestionResult};
use crate::ids::DatasetId;
use crate::ingestion::csv::read_sample;
use crate::ingestion::{IngestedDataset, Ingestor};
use crate::storage::raw::sha256_file;
use crate::types::{ColumnProfile, DatasetMetadata};

type Record = serde_json::Map<String, serde_json::Value>;

/// What the chat layer needs to know about the active dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetContext {
    pub dataset_id: DatasetId,
    pub meta: DatasetMetadata,
    /// First rows of the sample, keyed by column.
    #[serde(rename = "preview_df")]
    pub preview: Vec<Record>,
    /// Per-column null counts and inferred types.
    #[serde(rename = "dtype_df")]
    pub profile: Vec<ColumnProfile>,
    /// SHA-256 of the raw file, for spotting re-uploads of identical bytes.
    pub content_sha256: String,
}

impl DatasetContext {
    /// Build a context straight from a fresh ingestion; the profile covers the whole sample.
    pub fn from_ingested(ds: &IngestedDataset, preview_rows: usize) -> Self {
        Self {
            dataset_id: ds.id.clone(),
            meta: ds.metadata.clone(),
            preview: ds.sample.data.head(preview_rows).to_records(),
            profile: ds.sample.data.column_profiles(),
            content_sha256: ds.content_sha256.clone(),
        }
    }

    /// Rebuild a context for a stored record by re-reading a preview from its raw file.
    ///
    /// Fails with [`IngestionError::FileMissing`] if the raw file is gone.
    pub fn from_stored(
        dataset_id: DatasetId,
        meta: DatasetMetadata,
        preview_rows: usize,
    ) -> IngestionResult<Self> {
        if !meta.raw_path.exists() {
            return Err(IngestionError::FileMissing {
                path: meta.raw_path.clone(),
            });
        }
        let content_sha256 = sha256_file(&meta.raw_path)?;
        let (preview, _) = read_sample(&meta.raw_path, &meta.sniff, preview_rows)?;

        Ok(Self {
            dataset_id,
            preview: preview.to_records(),
            profile: preview.column_profiles(),
            meta,
            content_sha256,
        })
    }
}

/// Context for the most recently ingested dataset, or `None` if nothing was ingested.
pub fn restore_latest(ingestor: &Ingestor) -> IngestionResult<Option<DatasetContext>> {
    let Some((id, meta)) = ingestor.find_most_recent()? else {
        return Ok(None);
    };
    let ctx = DatasetContext::from_stored(id, meta, ingestor.config().preview_rows)?;
    tracing::info!(dataset_id = %ctx.dataset_id, "restored most recent dataset");
    Ok(Some(ctx))
}

/// Context for a specific dataset, or `None` if it has no metadata record.
pub fn restore(ingestor: &Ingestor, id: &DatasetId) -> IngestionResult<Option<DatasetContext>> {
    match ingestor.read(id)? {
        Some(meta) => DatasetContext::from_stored(id.clone(), meta, ingestor.config().preview_rows).map(Some),
        None => Ok(None),
    }
}
