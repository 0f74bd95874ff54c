//! S3 (or S3-compatible) artifact store.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};

use crate::error::StorageError;
use crate::ArtifactStore;

/// Error codes S3 returns when the bucket itself is absent.
const NO_SUCH_BUCKET: &str = "NoSuchBucket";
const NO_SUCH_KEY: &str = "NoSuchKey";
const BUCKET_ALREADY_OWNED: &str = "BucketAlreadyOwnedByYou";

/// Region that rejects an explicit location constraint on bucket creation.
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: Option<String>,
    public_base_url: Option<String>,
}

impl S3ArtifactStore {
    /// Build a store from the ambient AWS configuration (env vars, profile,
    /// instance metadata). `endpoint` targets S3-compatible services such
    /// as MinIO and switches to path-style addressing.
    pub async fn connect(
        bucket: String,
        endpoint: Option<String>,
        public_base_url: Option<String>,
    ) -> Self {
        let shared = aws_config::load_from_env().await;
        let region = shared.region().map(|r| r.to_string());

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket,
            region,
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }
}

/// Map an SDK error onto [`StorageError`] using its S3 error code.
fn classify<E>(code: Option<&str>, context: E, key: &str, bucket: &str) -> StorageError
where
    E: std::fmt::Display,
{
    match code {
        Some(NO_SUCH_BUCKET) => StorageError::ContainerMissing(bucket.to_string()),
        Some(NO_SUCH_KEY) => StorageError::NotFound(key.to_string()),
        _ => StorageError::Backend(context.to_string()),
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| {
                let code = e.as_service_error().and_then(|se| se.code());
                classify(code, DisplayErrorContext(&e), key, &self.bucket)
            })?;

        tracing::debug!(bucket = %self.bucket, key, bytes = bytes.len(), "Artifact uploaded to S3");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let code = e.as_service_error().and_then(|se| se.code());
                classify(code, DisplayErrorContext(&e), key, &self.bucket)
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn provision(&self) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if let Some(region) = self.region.as_deref().filter(|r| *r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Provisioned S3 bucket");
                Ok(())
            }
            Err(e) => {
                let code = e.as_service_error().and_then(|se| se.code());
                if code == Some(BUCKET_ALREADY_OWNED) {
                    Ok(())
                } else {
                    Err(StorageError::Backend(DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }

    fn location(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("s3://{}/{key}", self.bucket),
        }
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn classify_maps_bucket_and_key_codes() {
        assert_matches!(
            classify(Some("NoSuchBucket"), "boom", "k", "b"),
            StorageError::ContainerMissing(b) if b == "b"
        );
        assert_matches!(
            classify(Some("NoSuchKey"), "boom", "k", "b"),
            StorageError::NotFound(k) if k == "k"
        );
        assert_matches!(
            classify(Some("SlowDown"), "throttled", "k", "b"),
            StorageError::Backend(msg) if msg == "throttled"
        );
        assert_matches!(classify(None, "io", "k", "b"), StorageError::Backend(_));
    }
}
