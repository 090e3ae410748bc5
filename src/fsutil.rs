use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

/// Error that occurs when listing a directory fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to list directory `{path}`: {source}")]
pub struct ListDirError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Lists the rotated segments of a log file, oldest first.
///
/// A rotated segment is any file in `dir` whose name starts with `canonical_name` but is
/// not `canonical_name` itself (e.g. `<id>-json.log.1`). Segments are ordered by file name,
/// which only matches their age if the rotation scheme uses fixed-width suffixes.
///
/// # Errors
///
/// Returns a [`ListDirError`] if the directory cannot be read.
///
/// # Example
/// ```no_run
/// # use creo_log_forwarder::fsutil;
/// # async fn segments() -> Result<(), fsutil::ListDirError> {
/// let segments = fsutil::rotated_segments("/var/lib/docker/containers/abc", "abc-json.log").await?;
/// # Ok(())
/// # }
/// ```
pub async fn rotated_segments(
    dir: impl AsRef<Path>,
    canonical_name: &str,
) -> Result<Vec<PathBuf>, ListDirError> {
    let dir = dir.as_ref();
    let map_err = |source| ListDirError {
        path: dir.to_path_buf(),
        source,
    };

    let mut segments = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(map_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(map_err)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == canonical_name || !name.starts_with(canonical_name) {
            continue;
        }
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => segments.push(entry.path()),
            Ok(_) => {}
            Err(err) => log::warn!(
                "failed to read file type of `{}`: {}",
                entry.path().display(),
                err
            ),
        }
    }

    segments.sort();
    Ok(segments)
}

/// Returns an identifier of the file behind `metadata`, stable across renames.
///
/// Two metadata values with different identities describe different files. Returns
/// `None` on platforms without inode numbers.
#[cfg(unix)]
pub fn file_identity(metadata: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
pub fn file_identity(_metadata: &Metadata) -> Option<(u64, u64)> {
    None
}
