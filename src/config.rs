//! Ingestion configuration.
//!
//! Loaded from TOML; every key is optional:
//!
//! ```toml
//! data_dir = "data"            # uploads/ and meta/ default to subdirectories of this
//! upload_dir = "data/uploads"
//! meta_dir = "data/meta"
//! sample_rows = 100
//! preview_rows = 20
//! encoding_probe_bytes = 200000
//! delimiter_probe_bytes = 50000
//! count_chunk_rows = 100000
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::csv::DEFAULT_COUNT_CHUNK_ROWS;
use crate::ingestion::sniff::SniffOptions;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    upload_dir: Option<PathBuf>,
    #[serde(default)]
    meta_dir: Option<PathBuf>,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    #[serde(default = "default_encoding_probe_bytes")]
    pub encoding_probe_bytes: usize,
    #[serde(default = "default_delimiter_probe_bytes")]
    pub delimiter_probe_bytes: usize,
    #[serde(default = "default_count_chunk_rows")]
    pub count_chunk_rows: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_sample_rows() -> usize {
    100
}
fn default_preview_rows() -> usize {
    20
}
fn default_encoding_probe_bytes() -> usize {
    SniffOptions::default().encoding_probe_bytes
}
fn default_delimiter_probe_bytes() -> usize {
    SniffOptions::default().delimiter_probe_bytes
}
fn default_count_chunk_rows() -> usize {
    DEFAULT_COUNT_CHUNK_ROWS
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_dir: None,
            meta_dir: None,
            sample_rows: default_sample_rows(),
            preview_rows: default_preview_rows(),
            encoding_probe_bytes: default_encoding_probe_bytes(),
            delimiter_probe_bytes: default_delimiter_probe_bytes(),
            count_chunk_rows: default_count_chunk_rows(),
        }
    }
}

impl IngestConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> IngestionResult<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| IngestionError::Config {
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IngestionError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Root for raw uploads.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    /// Root for metadata records.
    pub fn meta_dir(&self) -> PathBuf {
        self.meta_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("meta"))
    }

    pub fn sniff_options(&self) -> SniffOptions {
        SniffOptions {
            encoding_probe_bytes: self.encoding_probe_bytes,
            delimiter_probe_bytes: self.delimiter_probe_bytes,
        }
    }

    pub fn validate(&self) -> IngestionResult<()> {
        let checks = [
            ("sample_rows", self.sample_rows),
            ("encoding_probe_bytes", self.encoding_probe_bytes),
            ("delimiter_probe_bytes", self.delimiter_probe_bytes),
            ("count_chunk_rows", self.count_chunk_rows),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(IngestionError::Config {
                    message: format!("{name} must be > 0"),
                });
            }
        }
        Ok(())
    }
}
