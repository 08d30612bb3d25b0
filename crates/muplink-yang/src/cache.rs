//! On-disk cache of the resolved schema.
//!
//! Loading and resolving a full set of YANG inputs is the slowest part of
//! tool startup, so the resolved arena is persisted as CBOR, keyed by the
//! sorted `(path, mtime)` list of the inputs. Any mismatch, read failure, or
//! decode failure falls back to a rebuild; the cache can never make a
//! command fail.

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::schema::Schema;

/// Identity of a schema input set: sorted `(path, mtime-seconds)` pairs.
pub type CacheKey = Vec<(String, u64)>;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    key: CacheKey,
    schema: Schema,
}

/// Compute the cache key for a set of input files.
pub fn cache_key<P: AsRef<Path>>(paths: &[P]) -> std::io::Result<CacheKey> {
    let mut key = Vec::with_capacity(paths.len());
    for p in paths {
        let meta = std::fs::metadata(p)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        key.push((p.as_ref().to_string_lossy().into_owned(), mtime));
    }
    key.sort();
    Ok(key)
}

/// Load a cached schema if `cache_path` holds one for exactly `key`.
#[must_use]
pub fn load(cache_path: &Path, key: &CacheKey) -> Option<Schema> {
    let bytes = match std::fs::read(cache_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %cache_path.display(), error = %e, "schema cache unreadable");
            return None;
        },
    };
    let file: CacheFile = match ciborium::de::from_reader(&bytes[..]) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %cache_path.display(), error = %e, "schema cache corrupt, rebuilding");
            return None;
        },
    };
    if &file.key != key {
        debug!(path = %cache_path.display(), "schema inputs changed, rebuilding");
        return None;
    }
    Some(file.schema)
}

/// Persist a schema under `key`. Failures are logged, not propagated.
pub fn store(cache_path: &Path, key: &CacheKey, schema: &Schema) {
    if let Some(dir) = cache_path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        warn!(path = %cache_path.display(), error = %e, "cannot create cache directory");
        return;
    }
    let file = CacheFile { key: key.clone(), schema: schema.clone() };
    let mut bytes = Vec::new();
    if let Err(e) = ciborium::ser::into_writer(&file, &mut bytes) {
        warn!(error = %e, "schema cache serialization failed");
        return;
    }
    if let Err(e) = std::fs::write(cache_path, bytes) {
        warn!(path = %cache_path.display(), error = %e, "schema cache write failed");
    }
}
