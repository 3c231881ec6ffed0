use super::{ObjectStore, ObjectStoreError, Result, MAX_SMALL_TEXT_BYTES};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Serves plain file system paths and `file://` URLs
#[derive(Debug, Clone, Default)]
pub struct LocalObjectStore;

impl LocalObjectStore {
    pub fn new() -> Self {
        Self
    }

    fn resolve(locator: &str) -> Result<PathBuf> {
        if locator.trim().is_empty() {
            return Err(ObjectStoreError::invalid(locator, "empty locator"));
        }
        if locator.starts_with("file://") {
            let url =
                Url::parse(locator).map_err(|e| ObjectStoreError::invalid(locator, e.to_string()))?;
            return url
                .to_file_path()
                .map_err(|_| ObjectStoreError::invalid(locator, "not a local file URL"));
        }
        if locator.contains("://") {
            return Err(ObjectStoreError::invalid(locator, "unsupported scheme"));
        }
        Ok(PathBuf::from(locator))
    }
}

fn not_found(locator: &str) -> impl FnOnce(std::io::Error) -> ObjectStoreError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            ObjectStoreError::NotFound(locator.to_string())
        } else {
            ObjectStoreError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download(&self, locator: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source = Self::resolve(locator)?;
        let name = source
            .file_name()
            .ok_or_else(|| ObjectStoreError::invalid(locator, "missing file name"))?;
        let target = dest_dir.join(name);

        let bytes = tokio::fs::copy(&source, &target)
            .await
            .map_err(not_found(locator))?;
        debug!(bytes, target = %target.display(), "Copied local object");
        Ok(target)
    }

    async fn read_small_text_file(&self, locator: &str) -> Result<String> {
        let size = self.size_of(locator).await?;
        if size > MAX_SMALL_TEXT_BYTES {
            return Err(ObjectStoreError::TooLarge {
                locator: locator.to_string(),
                size,
                limit: MAX_SMALL_TEXT_BYTES,
            });
        }
        tokio::fs::read_to_string(Self::resolve(locator)?)
            .await
            .map_err(not_found(locator))
    }

    async fn size_of(&self, locator: &str) -> Result<u64> {
        let metadata = tokio::fs::metadata(Self::resolve(locator)?)
            .await
            .map_err(not_found(locator))?;
        if !metadata.is_file() {
            return Err(ObjectStoreError::NotFound(locator.to_string()));
        }
        Ok(metadata.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_copies_under_basename() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let path = source.path().join("obs.json");
        tokio::fs::write(&path, b"{\"observations\": []}").await.unwrap();

        let store = LocalObjectStore::new();
        let out = store
            .download(path.to_str().unwrap(), dest.path())
            .await
            .unwrap();

        assert_eq!(out, dest.path().join("obs.json"));
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"{\"observations\": []}");
    }

    #[tokio::test]
    async fn test_file_url_locator() {
        let source = tempfile::tempdir().unwrap();
        let path = source.path().join("obs.json.sha512");
        tokio::fs::write(&path, "abc  obs.json\n").await.unwrap();
        let locator = Url::from_file_path(&path).unwrap().to_string();

        let store = LocalObjectStore::new();
        assert_eq!(store.size_of(&locator).await.unwrap(), 14);
        assert_eq!(
            store.read_small_text_file(&locator).await.unwrap(),
            "abc  obs.json\n"
        );
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let store = LocalObjectStore::new();

        assert!(matches!(
            store.size_of(missing.to_str().unwrap()).await,
            Err(ObjectStoreError::NotFound(_))
        ));
        assert!(matches!(
            store.download(missing.to_str().unwrap(), dir.path()).await,
            Err(ObjectStoreError::NotFound(_))
        ));
        assert!(matches!(
            store.size_of(dir.path().to_str().unwrap()).await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_remote_schemes() {
        let store = LocalObjectStore::new();
        assert!(matches!(
            store.size_of("https://example.com/obs.json").await,
            Err(ObjectStoreError::InvalidLocator { .. })
        ));
        assert!(matches!(
            store.size_of("").await,
            Err(ObjectStoreError::InvalidLocator { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_rejects_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.sha512");
        tokio::fs::write(&path, vec![b'a'; MAX_SMALL_TEXT_BYTES as usize + 1])
            .await
            .unwrap();

        let store = LocalObjectStore::new();
        assert!(matches!(
            store.read_small_text_file(path.to_str().unwrap()).await,
            Err(ObjectStoreError::TooLarge { .. })
        ));
    }
}
