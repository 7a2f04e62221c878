//! Dataset identifiers.
//!
//! An id is the first 16 hex characters (64 bits) of `SHA-1("<filename>-<nanos>")`, where `nanos` is
//! a process-wide monotonic nanosecond timestamp. Two calls never observe the same timestamp, so
//! repeated uploads of the same filename get distinct ids without a lookup against storage.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Number of hex characters kept from the digest.
pub const DATASET_ID_LEN: usize = 16;

static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

/// Opaque key identifying one ingested upload across all derived artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Accept an externally supplied id (CLI argument, metadata file stem).
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted so an id can never address a path outside
    /// the storage roots.
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = !raw.is_empty()
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        ok.then(|| Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a fresh id for `filename`. Always succeeds.
pub fn generate(filename: &str) -> DatasetId {
    generate_at(filename, monotonic_nanos())
}

/// Deterministic variant of [`generate`] for a caller-supplied timestamp.
pub fn generate_at(filename: &str, nanos: u64) -> DatasetId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{filename}-{nanos}").as_bytes());
    let digest = hex::encode(hasher.finalize());
    DatasetId(digest[..DATASET_ID_LEN].to_owned())
}

/// Wall-clock nanoseconds, bumped so successive calls in this process are strictly increasing.
fn monotonic_nanos() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let prev = LAST_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    now.max(prev.saturating_add(1))
}
