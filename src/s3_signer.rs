//! Presigned avatar URLs from an S3-compatible bucket.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{Client, presigning::PresigningConfig};
use log::info;

use crate::config::S3Config;
use crate::error::Result;
use crate::signer::ObjectSigner;
use crate::types::AvatarPath;

/// Signs avatar keys with SigV4 presigned `GetObject` requests.
///
/// Presigning is local, so there is no bulk variant.
#[derive(Debug, Clone)]
pub struct S3AvatarSigner {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3AvatarSigner {
    /// Build a signer from configuration, loading AWS credentials from the environment.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared_config)
                .force_path_style(true)
                .build(),
        );

        info!(
            "Signing avatars from s3://{}/{}",
            config.bucket, config.prefix
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        }
    }

    fn object_key(&self, path: &AvatarPath) -> String {
        if self.prefix.is_empty() {
            return path.to_string();
        }
        format!("{}/{}", self.prefix.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ObjectSigner for S3AvatarSigner {
    async fn sign(&self, path: &AvatarPath, ttl_seconds: u64) -> Result<String> {
        let config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(ttl_seconds))
            .build()?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(path))
            .presigned(config)
            .await?;

        Ok(presigned.uri().to_string())
    }
}
