//! Durable storage for ingested datasets.
//!
//! Two disjoint roots, both keyed by [`crate::ids::DatasetId`]:
//!
//! - [`raw`]: `<upload-root>/<id>/raw.<ext>` holds the unmodified uploaded bytes.
//! - [`meta`]: `<meta-root>/<id>.json` holds the [`crate::types::DatasetMetadata`] record.
//!
//! Different ids never share a path, so ingestions of different datasets need no coordination.
//! Nothing here locks; concurrent writers to the same id are unsupported.

pub mod meta;
pub mod raw;

use std::fs;
use std::io;
use std::path::Path;

pub use meta::MetadataStore;
pub use raw::{PersistedRaw, RawStore};

/// Remove everything under `root` and recreate it empty.
fn reset_dir(root: &Path) -> io::Result<()> {
    match fs::remove_dir_all(root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(root)
}
