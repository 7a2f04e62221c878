//! Per-dataset metadata records.
//!
//! Each record is pretty-printed JSON (non-ASCII left unescaped) at `<root>/<id>.json`. A write
//! goes to a sibling temp file first and is renamed into place, so readers see either the old
//! record or the new one. "Most recent" is decided by file modification time, which is how a
//! restarted process rediscovers the last active dataset without any in-memory state.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{IngestionError, IngestionResult};
use crate::ids::DatasetId;
use crate::types::DatasetMetadata;

/// Filesystem-backed store for [`DatasetMetadata`].
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `id`.
    pub fn record_path(&self, id: &DatasetId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Persist `metadata` for `id`, replacing any existing record.
    pub fn write(&self, id: &DatasetId, metadata: &DatasetMetadata) -> IngestionResult<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.record_path(id);
        let tmp = self.root.join(format!(".{id}.json.tmp"));

        let written = write_pretty(&tmp, metadata)
            .and_then(|()| fs::rename(&tmp, &path).map_err(IngestionError::from));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::debug!(path = %tmp.display(), error = %cleanup, "could not remove temp record");
            }
            return Err(e);
        }

        tracing::info!(dataset_id = %id, path = %path.display(), "wrote dataset metadata");
        Ok(path)
    }

    /// Read the record for `id`. `Ok(None)` means no record exists; a record that exists but
    /// cannot be parsed is an error.
    pub fn read(&self, id: &DatasetId) -> IngestionResult<Option<DatasetMetadata>> {
        let file = match File::open(self.record_path(id)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(metadata))
    }

    /// The record with the latest modification time, if any.
    ///
    /// Ties on modification time go to the lexically greatest id. A concurrent write during the
    /// scan may or may not be observed.
    pub fn find_most_recent(&self) -> IngestionResult<Option<(DatasetId, DatasetMetadata)>> {
        let mut latest: Option<(SystemTime, DatasetId)> = None;
        for (id, path) in self.records()? {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable record");
                    continue;
                }
            };
            let newer = match &latest {
                None => true,
                Some((t, best)) => (modified, &id) > (*t, best),
            };
            if newer {
                latest = Some((modified, id));
            }
        }

        let Some((_, id)) = latest else {
            return Ok(None);
        };
        Ok(self.read(&id)?.map(|metadata| (id, metadata)))
    }

    /// Ids of every stored record, in no particular order.
    pub fn ids(&self) -> IngestionResult<Vec<DatasetId>> {
        Ok(self.records()?.into_iter().map(|(id, _)| id).collect())
    }

    /// Remove every record.
    pub fn clear(&self) -> IngestionResult<()> {
        super::reset_dir(&self.root).map_err(IngestionError::from)
    }

    fn records(&self) -> IngestionResult<Vec<(DatasetId, PathBuf)>> {
        let root = self.root.to_str().ok_or_else(|| IngestionError::Storage {
            message: format!("metadata root is not valid UTF-8: {}", self.root.display()),
        })?;
        let pattern = format!("{}/*.json", glob::Pattern::escape(root));
        let paths = glob::glob(&pattern).map_err(|e| IngestionError::Storage {
            message: format!("bad metadata glob {pattern:?}: {e}"),
        })?;

        let mut out = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable metadata entry");
                    continue;
                }
            };
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(DatasetId::parse);
            if let Some(id) = id {
                out.push((id, path));
            }
        }
        Ok(out)
    }
}

fn write_pretty(path: &Path, metadata: &DatasetMetadata) -> IngestionResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, metadata)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
