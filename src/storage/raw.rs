//! Raw upload artifacts.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{IngestionError, IngestionResult};
use crate::ids::DatasetId;

/// File name for a raw artifact: `raw.<ext>`, or `raw.bin` when `ext` is empty.
pub fn raw_file_name(ext: &str) -> String {
    if ext.is_empty() {
        "raw.bin".to_string()
    } else {
        format!("raw.{ext}")
    }
}

/// Result of copying upload bytes into permanent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRaw {
    /// Absolute path of the stored file.
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub sha256: String,
}

/// Stores uploaded bytes under `<root>/<id>/raw.<ext>`.
#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds every artifact of `id`.
    pub fn dataset_dir(&self, id: &DatasetId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Path of the raw file; a pure function of `(id, ext)`.
    pub fn raw_path(&self, id: &DatasetId, ext: &str) -> PathBuf {
        self.dataset_dir(id).join(raw_file_name(ext))
    }

    /// Persist an in-memory upload.
    pub fn persist(&self, id: &DatasetId, ext: &str, bytes: &[u8]) -> IngestionResult<PersistedRaw> {
        self.persist_from_reader(id, ext, bytes)
    }

    /// Stream `reader` into the raw file, hashing as it goes.
    pub fn persist_from_reader<R: Read>(
        &self,
        id: &DatasetId,
        ext: &str,
        mut reader: R,
    ) -> IngestionResult<PersistedRaw> {
        fs::create_dir_all(self.dataset_dir(id))?;
        let path = std::path::absolute(self.raw_path(id, ext))?;

        let mut out = HashingWriter::new(BufWriter::new(File::create(&path)?));
        io::copy(&mut reader, &mut out)?;
        let (mut inner, bytes, sha256) = out.finish();
        inner.flush()?;

        Ok(PersistedRaw {
            path,
            bytes,
            sha256,
        })
    }

    /// Remove every stored upload.
    pub fn clear(&self) -> IngestionResult<()> {
        super::reset_dir(&self.root).map_err(IngestionError::from)
    }
}

/// Streaming SHA-256 of a file, for callers that only have the stored path.
pub fn sha256_file(path: &Path) -> IngestionResult<String> {
    let mut file = File::open(path).map_err(|e| IngestionError::from_io_at(e, path))?;
    let mut out = HashingWriter::new(io::sink());
    io::copy(&mut file, &mut out)?;
    Ok(out.finish().2)
}

struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (W, u64, String) {
        (self.inner, self.bytes, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
