use super::{basename, ObjectStore, ObjectStoreError, Result, S3Config, MAX_SMALL_TEXT_BYTES};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    Client,
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

/// Bucket and key of an `s3://bucket/key` locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn parse(locator: &str) -> Result<Self> {
        let url = Url::parse(locator).map_err(|e| ObjectStoreError::invalid(locator, e.to_string()))?;
        if url.scheme() != "s3" {
            return Err(ObjectStoreError::invalid(locator, "expected an s3:// locator"));
        }
        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ObjectStoreError::invalid(locator, "missing bucket"))?
            .to_string();

        // Url percent-encodes the path, so take the key from the raw text
        let key = locator
            .strip_prefix("s3://")
            .and_then(|rest| rest.split_once('/'))
            .map(|(_, key)| key.to_string())
            .unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            return Err(ObjectStoreError::invalid(locator, "missing object key"));
        }

        Ok(Self { bucket, key })
    }
}

fn sdk_failure<E>(locator: &str, err: SdkError<E>) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ObjectStoreError::Transfer(format!("{}: {}", locator, DisplayErrorContext(&err)))
}

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Self {
        debug!(?config, "Initializing S3 object store");

        let client = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                let credentials = Credentials::new(access, secret, None, None, "insitu-ingest");
                let mut builder = aws_sdk_s3::Config::builder()
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
                    .force_path_style(config.path_style);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }
                Client::from_conf(builder.build())
            },
            _ => {
                let mut loader =
                    aws_config::defaults(aws_config::BehaviorVersion::latest())
                        .region(Region::new(config.region.clone()));
                if let Some(endpoint) = &config.endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared = loader.load().await;
                let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                    .force_path_style(config.path_style)
                    .build();
                Client::from_conf(s3_config)
            },
        };

        info!(region = %config.region, endpoint = ?config.endpoint, "S3 object store initialized");
        Self { client }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, dest_dir))]
    async fn download(&self, locator: &str, dest_dir: &Path) -> Result<PathBuf> {
        let location = S3Location::parse(locator)?;
        let target = dest_dir.join(basename(&location.key));

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                    ObjectStoreError::NotFound(locator.to_string())
                } else {
                    sdk_failure(locator, e)
                }
            })?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(&target).await?;
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| ObjectStoreError::Transfer(format!("{}: {}", locator, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bytes = written, target = %target.display(), "Downloaded object");
        Ok(target)
    }

    #[instrument(skip(self))]
    async fn read_small_text_file(&self, locator: &str) -> Result<String> {
        let size = self.size_of(locator).await?;
        if size > MAX_SMALL_TEXT_BYTES {
            return Err(ObjectStoreError::TooLarge {
                locator: locator.to_string(),
                size,
                limit: MAX_SMALL_TEXT_BYTES,
            });
        }

        let location = S3Location::parse(locator)?;
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| sdk_failure(locator, e))?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Transfer(format!("{}: {}", locator, e)))?
            .into_bytes();

        String::from_utf8(bytes.to_vec())
            .map_err(|e| ObjectStoreError::Transfer(format!("{} is not UTF-8: {}", locator, e)))
    }

    #[instrument(skip(self))]
    async fn size_of(&self, locator: &str) -> Result<u64> {
        let location = S3Location::parse(locator)?;
        let head = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_not_found()) {
                    ObjectStoreError::NotFound(locator.to_string())
                } else {
                    sdk_failure(locator, e)
                }
            })?;

        Ok(head.content_length().unwrap_or(0).max(0) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locator() {
        let location = S3Location::parse("s3://insitu-data/2024/01/obs.json.gz").unwrap();
        assert_eq!(location.bucket, "insitu-data");
        assert_eq!(location.key, "2024/01/obs.json.gz");
    }

    #[test]
    fn test_parse_keeps_raw_key() {
        let location = S3Location::parse("s3://bucket/dir with space/obs.json").unwrap();
        assert_eq!(location.key, "dir with space/obs.json");
    }

    #[test]
    fn test_parse_rejects_bad_locators() {
        for locator in [
            "https://bucket/obs.json",
            "s3://bucket",
            "s3://bucket/",
            "s3://bucket/dir/",
            "not a url",
        ] {
            assert!(
                matches!(S3Location::parse(locator), Err(ObjectStoreError::InvalidLocator { .. })),
                "{} should be rejected",
                locator
            );
        }
    }

    #[tokio::test]
    async fn test_new_with_static_credentials() {
        let store = S3ObjectStore::new(S3Config::for_minio("http://localhost:9000")).await;
        let err = store.size_of("s3://bucket").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::InvalidLocator { .. }));
    }
}
