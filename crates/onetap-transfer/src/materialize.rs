//! Writing a received file to disk
//!
//! The filename comes from the link fragment and is untrusted: only its
//! final component is used, and existing files are never overwritten.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use onetap_core::OnetapResult;
use tracing::info;

use crate::link::DEFAULT_FILENAME;

/// Reduce an untrusted filename to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let base: String = base.chars().filter(|c| !c.is_control()).collect();
    let base = base.trim();
    if base.is_empty() || base == "." || base == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        base.to_string()
    }
}

/// `name`, then `name (1)`, `name (2)`, ... with the counter before the
/// extension.
fn numbered(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

/// Write to a uniquely named temp file in `dir`, then link it to the first
/// free numbered name. Persisting never replaces an existing file, so
/// concurrent saves of one name each land on their own path.
fn write_unique(dir: &Path, name: &str, plaintext: &[u8]) -> io::Result<PathBuf> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".onetap-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(plaintext)?;
    tmp.as_file().sync_all()?;

    let mut n = 0u32;
    loop {
        let target = dir.join(numbered(name, n));
        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                n += 1;
            }
            Err(e) => return Err(e.error),
        }
    }
}

/// Atomically write `plaintext` into `dir` under the sanitized `filename`.
///
/// Returns the path written.
pub async fn materialize(dir: &Path, filename: &str, plaintext: &[u8]) -> OnetapResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let name = sanitize_filename(filename);
    let dir_owned = dir.to_path_buf();
    let data = plaintext.to_vec();
    let target = tokio::task::spawn_blocking(move || write_unique(&dir_owned, &name, &data))
        .await
        .map_err(io::Error::other)??;

    info!(path = %target.display(), bytes = plaintext.len(), "materialized");
    Ok(target)
}
