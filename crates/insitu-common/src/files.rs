//! Local file helpers used by the ingestion pipeline
//!
//! Deletion helpers treat a missing path as already cleaned up, so callers
//! can run them unconditionally on every exit path.

use crate::error::{CommonError, Result};
use flate2::read::MultiGzDecoder;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const GZIP_SUFFIX: &str = ".gz";

/// Whether `path` points at an existing regular file
pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::metadata(path.as_ref())
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Size of a file in bytes
pub async fn file_size(path: impl AsRef<Path>) -> Result<u64> {
    Ok(tokio::fs::metadata(path.as_ref()).await?.len())
}

/// Create a directory and all of its parents
pub async fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

/// Delete a file; a missing file is a no-op
pub async fn delete_file(path: impl AsRef<Path>) -> Result<()> {
    match tokio::fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Recursively delete a directory; a missing directory is a no-op
pub async fn remove_dir(path: impl AsRef<Path>) -> Result<()> {
    match tokio::fs::remove_dir_all(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether the file name marks a gzip artifact (case-insensitive `.gz`)
pub fn is_gzip(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(GZIP_SUFFIX))
        .unwrap_or(false)
}

/// Decompress a `.gz` file next to itself and remove the compressed original
///
/// Returns the path of the decompressed file (the input with its `.gz`
/// suffix stripped), mirroring what `gunzip` does on the command line.
pub async fn gunzip_in_place(path: impl AsRef<Path>) -> Result<PathBuf> {
    let source = path.as_ref().to_path_buf();
    if !file_exists(&source).await {
        return Err(CommonError::MissingFile(source));
    }
    if !is_gzip(&source) {
        return Err(CommonError::NotCompressed(source));
    }

    let target = match (source.file_stem(), source.extension()) {
        (Some(stem), Some(_)) if !stem.is_empty() && stem != "." && stem != ".." => {
            source.with_file_name(stem)
        },
        _ => return Err(CommonError::InvalidFileName(source)),
    };

    let (src, dst) = (source.clone(), target.clone());
    let written = tokio::task::spawn_blocking(move || -> Result<u64> {
        let input = std::fs::File::open(&src)?;
        let mut decoder = MultiGzDecoder::new(std::io::BufReader::new(input));
        let mut output = std::io::BufWriter::new(std::fs::File::create(&dst)?);
        Ok(std::io::copy(&mut decoder, &mut output)?)
    })
    .await
    .map_err(|e| CommonError::Task(e.to_string()))??;

    delete_file(&source).await?;
    debug!(
        source = %source.display(),
        target = %target.display(),
        bytes = written,
        "Decompressed gzip artifact"
    );
    Ok(target)
}
