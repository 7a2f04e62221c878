//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`Ingestor`] (from [`unified`]) which:
//!
//! - validates the upload extension and stores the raw bytes under a fresh dataset id
//! - sniffs encoding and delimiter ([`sniff`])
//! - loads a bounded sample and counts the whole file ([`csv`])
//! - persists the dataset metadata record
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]

pub mod csv;
pub mod observability;
pub mod sniff;
pub mod unified;

pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
pub use unified::{
    IngestError, IngestStage, IngestedDataset, IngestionOptions, IngestionRequest, Ingestor, upload_extension,
};
