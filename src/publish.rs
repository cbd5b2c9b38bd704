//! Object-storage publishing for batch artifacts.
//!
//! Publishing is best-effort relative to the local artifact: it runs only
//! after a successful local write, a failure is logged and never retried,
//! and it never aborts the harvest. The local file remains the source of
//! truth either way.

use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

/// The publishing capability the harvest loop consumes.
pub trait Publish {
    /// Upload one local file under the given remote object name.
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<(), Box<dyn Error>>;
}

/// Publisher backed by an S3-compatible bucket.
///
/// Credentials and region come from the ambient AWS environment (env vars,
/// profile, instance role). An explicit endpoint supports S3-compatible
/// services outside AWS.
#[derive(Debug, Clone)]
pub struct S3Publisher {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Publisher {
    /// Build a publisher for the given bucket.
    ///
    /// # Arguments
    ///
    /// * `bucket` - Target bucket name
    /// * `endpoint` - Optional custom endpoint URL for S3-compatible services
    pub async fn new(bucket: impl Into<String>, endpoint: Option<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&config)
            .retry_config(aws_sdk_s3::config::retry::RetryConfig::standard())
            // Path-style addressing for compatibility with non-AWS services.
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            builder = builder.endpoint_url(endpoint_url);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

impl Publish for S3Publisher {
    #[instrument(level = "info", skip_all, fields(bucket = %self.bucket, remote_name))]
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<(), Box<dyn Error>> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path).await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(remote_name)
            .body(body)
            .send()
            .await?;
        info!(
            local = %local_path.display(),
            remote = %format!("{}/{}", self.bucket, remote_name),
            "published batch artifact"
        );
        Ok(())
    }
}
