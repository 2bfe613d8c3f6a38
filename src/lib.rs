pub mod avatars;
pub mod cache;
pub mod config;
pub mod error;
pub mod path;
pub mod prober;
pub mod profiles;
pub mod s3_signer;
pub mod signer;
pub mod supabase;
pub mod types;
pub mod version;

use std::sync::Arc;

use log::{debug, info};

pub use avatars::AvatarService;
use config::Config;
use error::{AvatarError, Result};
use s3_signer::S3AvatarSigner;
use signer::ObjectSigner;
use supabase::SupabaseClient;
use types::StorageBackend;

/// Wire the avatar service to the backends named in `config`.
///
/// # Errors
///
/// Returns an error if a backend client cannot be built.
pub async fn build_service(config: &Config) -> Result<AvatarService> {
    debug!("Initializing Supabase client");
    let supabase = Arc::new(SupabaseClient::from_config(&config.supabase)?);

    let signer: Arc<dyn ObjectSigner> = match config.backend {
        StorageBackend::Supabase => supabase.clone(),
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                AvatarError::Config("S3 backend selected without S3 settings".to_string())
            })?;
            Arc::new(S3AvatarSigner::from_config(s3).await)
        }
    };

    let service = AvatarService::new(signer, supabase)
        .with_bulk_signing(config.supabase.bulk_signing)
        .with_cache_capacity(config.cache_capacity);

    info!(
        "Avatar service ready ({} backend, bulk signing {})",
        config.backend,
        if service.bulk_signing() { "on" } else { "off" }
    );
    Ok(service)
}
