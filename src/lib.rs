//! `datachat-ingest` turns an uploaded delimited-text file into a dataset a chat-driven analysis
//! agent can work with: a stable [`ids::DatasetId`], sniffed structural hints (encoding,
//! delimiter), a bounded in-memory sample with a streamed total row count, and a durable metadata
//! record that a restarted process can rediscover.
//!
//! The primary entrypoint is [`ingestion::Ingestor`].
//!
//! ## What you can ingest
//!
//! - `.csv`, `.tsv`, `.txt` (case-insensitive). Anything else is rejected before a byte is written.
//! - UTF-8, single-byte encodings (windows-1252, ...) and EUC encodings (EUC-KR, EUC-JP, ...) as
//!   detected by `chardetng`. Shift_JIS, Big5 and GBK files load with `,` `\t` `;` but not with
//!   `|` or `^`, which occur inside their multi-byte characters (see
//!   [`ingestion::sniff::delimiter_splits_cleanly`]).
//! - Delimiters `,` `\t` `;` `|` `^`. `.tsv` always means tab.
//!
//! ## Quick example
//!
//! ```no_run
//! use datachat_ingest::config::IngestConfig;
//! use datachat_ingest::ingestion::{Ingestor, IngestionOptions};
//! use datachat_ingest::session::{DatasetContext, restore_latest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ingestor = Ingestor::new(IngestConfig::with_data_dir("data"))?;
//!
//! let bytes = std::fs::read("sales.csv")?;
//! let options = IngestionOptions {
//!     sample_rows: Some(100),
//!     ..Default::default()
//! };
//! let ds = ingestor.ingest(&bytes, "sales.csv", &options)?;
//! println!("id={} delimiter={:?}", ds.id, ds.metadata.sniff.delimiter);
//! let ctx = DatasetContext::from_ingested(&ds, 20);
//! println!("{} preview rows", ctx.preview.len());
//!
//! // After a restart: rediscover the last dataset from disk.
//! if let Some(ctx) = restore_latest(&ingestor)? {
//!     println!("resuming {}", ctx.dataset_id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## On-disk layout
//!
//! - raw bytes: `<upload-root>/<id>/raw.<ext>`
//! - metadata: `<meta-root>/<id>.json` with fields `sniff{filetype,encoding,delimiter,ext}`,
//!   `shape_sample`, `shape_total`, `shape_total_source`, `columns`, `ext`, `raw_path`
//!
//! ## Modules
//!
//! - [`ingestion`]: orchestrator, sniffing, sampling, observers
//! - [`storage`]: raw artifact and metadata stores
//! - [`session`]: per-session dataset context and restart recovery
//! - [`ids`]: dataset id generation
//! - [`types`]: sample and metadata types
//! - [`config`], [`logging`], [`error`]

pub mod config;
pub mod error;
pub mod ids;
pub mod ingestion;
pub mod logging;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{IngestionError, IngestionResult};
