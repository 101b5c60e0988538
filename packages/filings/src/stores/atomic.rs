//! Atomic file replacement.

use atomic_write_file::AtomicWriteFile;
use std::io::{self, Write};
use std::path::PathBuf;

/// Replace `path` with `bytes` so readers see either the old or the new
/// content, never a mix. Runs on the blocking pool.
pub(crate) async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut file = AtomicWriteFile::open(&path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.commit()
    })
    .await
    .map_err(io::Error::other)?
}

/// Whether a directory entry is one of our `.json` files rather than an
/// in-progress temporary.
pub(crate) fn is_json_file(path: &std::path::Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden && path.extension().and_then(|e| e.to_str()) == Some("json")
}
