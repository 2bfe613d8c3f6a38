//! Supabase storage and PostgREST backend.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SupabaseConfig;
use crate::error::{AvatarError, Result};
use crate::profiles::ProfileStore;
use crate::signer::{ObjectSigner, SignedObject};
use crate::types::{AvatarPath, ProfileAvatarRef};

/// Columns read from the profile table.
const PROFILE_COLUMNS: &str = "id,avatar_path,avatar_updated_at";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkSignRequest<'a> {
    expires_in: u64,
    paths: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkSignEntry {
    #[serde(default)]
    path: Option<String>,
    #[serde(rename = "signedURL", default)]
    signed_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AvatarRefsRpc<'a> {
    user_ids: &'a [String],
}

/// Client for the storage signing API and the profile table of one Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: Url,
    api_key: String,
    bucket: String,
    table: String,
    privileged_rpc: String,
    bulk_signing: bool,
}

impl SupabaseClient {
    /// # Errors
    ///
    /// Returns an error if the project URL is invalid or the HTTP client cannot be built.
    pub fn from_config(config: &SupabaseConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            return Err(AvatarError::Config(format!(
                "SUPABASE_URL is not a base URL: {}",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
            table: config.profiles_table.clone(),
            privileged_rpc: config.privileged_rpc.clone(),
            bulk_signing: config.bulk_signing,
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AvatarError::Config(format!("Invalid project URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn sign_endpoint(&self, path: Option<&AvatarPath>) -> Result<Url> {
        let object = path.map(|path| path.as_str().split('/')).into_iter().flatten();
        self.endpoint(
            ["storage", "v1", "object", "sign", self.bucket.as_str()]
                .into_iter()
                .chain(object),
        )
    }

    fn table_endpoint(&self) -> Result<Url> {
        self.endpoint(["rest", "v1", self.table.as_str()])
    }

    fn rpc_endpoint(&self) -> Result<Url> {
        self.endpoint(["rest", "v1", "rpc", self.privileged_rpc.as_str()])
    }

    /// Storage returns signed URLs relative to `/storage/v1`.
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            return signed.to_string();
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let signed = signed.trim_start_matches('/');
        format!("{base}/storage/v1/{signed}")
    }

    /// Keeps the echoed path, drops empty URLs and makes the rest absolute.
    fn signed_object(&self, entry: BulkSignEntry) -> SignedObject {
        if let Some(ref error) = entry.error {
            debug!(
                "Storage could not sign {}: {error}",
                entry.path.as_deref().unwrap_or("<unknown>")
            );
        }
        SignedObject {
            signed_url: entry
                .signed_url
                .filter(|signed| !signed.is_empty())
                .map(|signed| self.absolute_signed_url(&signed)),
            path: entry.path,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn fetch_rows(&self, request: RequestBuilder) -> Result<Vec<ProfileAvatarRef>> {
        let response = check_status(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
    Err(AvatarError::Api { status, message })
}

/// PostgREST `in.(...)` filter with every id quoted.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl ObjectSigner for SupabaseClient {
    async fn sign(&self, path: &AvatarPath, ttl_seconds: u64) -> Result<String> {
        let request = self
            .client
            .post(self.sign_endpoint(Some(path))?)
            .json(&SignRequest {
                expires_in: ttl_seconds,
            });

        let response = check_status(self.authorized(request).send().await?).await?;
        let body: SignResponse = response.json().await?;

        body.signed_url
            .filter(|signed| !signed.is_empty())
            .map(|signed| self.absolute_signed_url(&signed))
            .ok_or_else(|| AvatarError::Response(format!("No signed URL returned for {path}")))
    }

    fn supports_bulk(&self) -> bool {
        self.bulk_signing
    }

    async fn sign_many(&self, paths: &[AvatarPath], ttl_seconds: u64) -> Result<Vec<SignedObject>> {
        debug!("Bulk signing {} avatar paths", paths.len());

        let request = self
            .client
            .post(self.sign_endpoint(None)?)
            .json(&BulkSignRequest {
                expires_in: ttl_seconds,
                paths: paths.iter().map(AvatarPath::as_str).collect(),
            });

        let response = check_status(self.authorized(request).send().await?).await?;
        let entries: Vec<BulkSignEntry> = response.json().await?;

        Ok(entries
            .into_iter()
            .map(|entry| self.signed_object(entry))
            .collect())
    }
}

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn by_ids(&self, ids: &[String]) -> Result<Vec<ProfileAvatarRef>> {
        let request = self.client.get(self.table_endpoint()?).query(&[
            ("select", PROFILE_COLUMNS.to_string()),
            ("id", in_filter(ids)),
        ]);
        self.fetch_rows(request).await
    }

    async fn privileged_by_ids(&self, ids: &[String]) -> Result<Vec<ProfileAvatarRef>> {
        let request = self
            .client
            .post(self.rpc_endpoint()?)
            .json(&AvatarRefsRpc { user_ids: ids });
        self.fetch_rows(request).await
    }

    async fn page(&self, offset: usize, limit: usize) -> Result<Vec<ProfileAvatarRef>> {
        let request = self.client.get(self.table_endpoint()?).query(&[
            ("select", PROFILE_COLUMNS.to_string()),
            ("order", "id.asc".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        self.fetch_rows(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::normalize_avatar_path;

    fn config() -> SupabaseConfig {
        SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            service_key: "service-key".to_string(),
            bucket: "avatars".to_string(),
            profiles_table: "profiles".to_string(),
            privileged_rpc: "get_avatar_refs".to_string(),
            bulk_signing: true,
            http_timeout_secs: 30,
        }
    }

    #[test]
    fn builds_storage_and_rest_endpoints() -> Result<()> {
        let client = SupabaseClient::from_config(&config())?;
        let path = normalize_avatar_path(Some("avatars/u 1/pic.png"))
            .ok_or_else(|| AvatarError::Config("empty path".to_string()))?;

        assert_eq!(
            client.sign_endpoint(Some(&path))?.as_str(),
            "https://project.supabase.co/storage/v1/object/sign/avatars/u%201/pic.png"
        );
        assert_eq!(
            client.sign_endpoint(None)?.as_str(),
            "https://project.supabase.co/storage/v1/object/sign/avatars"
        );
        assert_eq!(
            client.table_endpoint()?.as_str(),
            "https://project.supabase.co/rest/v1/profiles"
        );
        assert_eq!(
            client.rpc_endpoint()?.as_str(),
            "https://project.supabase.co/rest/v1/rpc/get_avatar_refs"
        );
        Ok(())
    }

    #[test]
    fn relative_signed_urls_become_absolute() -> Result<()> {
        let client = SupabaseClient::from_config(&config())?;
        assert_eq!(
            client.absolute_signed_url("/object/sign/avatars/u1/pic.png?token=abc"),
            "https://project.supabase.co/storage/v1/object/sign/avatars/u1/pic.png?token=abc"
        );
        assert_eq!(
            client.absolute_signed_url("https://cdn.example/x?token=abc"),
            "https://cdn.example/x?token=abc"
        );
        Ok(())
    }

    #[test]
    fn bulk_entries_decode_with_errors() -> serde_json::Result<()> {
        let entries: Vec<BulkSignEntry> = serde_json::from_str(
            r#"[
                {"path": "u1/pic.png", "signedURL": "/object/sign/avatars/u1/pic.png?token=a", "error": null},
                {"path": "u2/pic.png", "signedURL": null, "error": "Either the object does not exist or you do not have access to it"}
            ]"#,
        )?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path.as_deref(), Some("u1/pic.png"));
        assert!(entries[0].signed_url.is_some());
        assert!(entries[1].signed_url.is_none());
        assert!(entries[1].error.is_some());
        Ok(())
    }

    #[test]
    fn bulk_entries_map_to_signed_objects() -> Result<()> {
        let client = SupabaseClient::from_config(&config())?;
        let entries: Vec<BulkSignEntry> = serde_json::from_str(
            r#"[
                {"path": "u1/pic.png", "signedURL": "/object/sign/avatars/u1/pic.png?token=a", "error": null},
                {"path": "u2/pic.png", "signedURL": "", "error": null},
                {"path": "u3/pic.png", "signedURL": null, "error": "not found"},
                {"signedURL": "https://cdn.example/u4/pic.png?token=d"}
            ]"#,
        )?;

        let signed: Vec<SignedObject> = entries
            .into_iter()
            .map(|entry| client.signed_object(entry))
            .collect();

        assert_eq!(
            signed,
            vec![
                SignedObject {
                    path: Some("u1/pic.png".to_string()),
                    signed_url: Some(
                        "https://project.supabase.co/storage/v1/object/sign/avatars/u1/pic.png?token=a"
                            .to_string()
                    ),
                },
                SignedObject {
                    path: Some("u2/pic.png".to_string()),
                    signed_url: None,
                },
                SignedObject {
                    path: Some("u3/pic.png".to_string()),
                    signed_url: None,
                },
                SignedObject {
                    path: None,
                    signed_url: Some("https://cdn.example/u4/pic.png?token=d".to_string()),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn in_filter_quotes_ids() {
        let ids = vec!["a1".to_string(), "b,2".to_string(), "c\"3".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a1","b,2","c\"3")"#);
    }

    #[test]
    fn rejects_non_base_project_url() {
        let mut config = config();
        config.url = "mailto:ops@athletrack.test".to_string();
        assert!(matches!(
            SupabaseClient::from_config(&config),
            Err(AvatarError::Config(_))
        ));
    }
}
