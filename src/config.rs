use std::env;
use std::str::FromStr;

use log::{debug, error, info};

use crate::cache::MAX_CACHE_ENTRIES;
use crate::error::{AvatarError, Result};
use crate::types::{DEFAULT_TTL_SECONDS, StorageBackend};

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub profiles_table: String,
    pub privileged_rpc: String,
    pub bulk_signing: bool,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase: SupabaseConfig,
    pub backend: StorageBackend,
    pub s3: Option<S3Config>,
    pub ttl_seconds: u64,
    pub cache_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        dotenvy::dotenv().ok();

        let supabase = SupabaseConfig {
            url: required("SUPABASE_URL")?,
            service_key: required("SUPABASE_SERVICE_KEY")?,
            bucket: optional("AVATAR_BUCKET").unwrap_or_else(|| "avatars".to_string()),
            profiles_table: optional("AVATAR_PROFILES_TABLE")
                .unwrap_or_else(|| "profiles".to_string()),
            privileged_rpc: optional("AVATAR_PRIVILEGED_RPC")
                .unwrap_or_else(|| "get_avatar_refs".to_string()),
            bulk_signing: parsed_flag("AVATAR_BULK_SIGNING", true)?,
            http_timeout_secs: parsed("AVATAR_HTTP_TIMEOUT_SECS", 30)?,
        };

        let backend: StorageBackend = parsed("AVATAR_BACKEND", StorageBackend::Supabase)?;
        let s3 = match backend {
            StorageBackend::S3 => Some(S3Config {
                bucket: required("S3_BUCKET")?,
                region: required("S3_REGION")?,
                endpoint: optional("S3_ENDPOINT"),
                prefix: optional("S3_PREFIX").unwrap_or_default(),
            }),
            StorageBackend::Supabase => None,
        };

        let ttl_seconds = parsed("AVATAR_TTL_SECONDS", DEFAULT_TTL_SECONDS)?;
        let cache_capacity = parsed("AVATAR_CACHE_CAPACITY", MAX_CACHE_ENTRIES)?;

        info!("Configuration loaded successfully");
        debug!("Supabase URL: {}", supabase.url);
        debug!(
            "Supabase service key length: {} characters",
            supabase.service_key.len()
        );
        debug!("Avatar bucket: {}", supabase.bucket);
        debug!("Storage backend: {backend}");
        debug!("Bulk signing enabled: {}", supabase.bulk_signing);
        debug!("Default TTL: {ttl_seconds}s, cache capacity: {cache_capacity}");

        Ok(Self {
            supabase,
            backend,
            s3,
            ttl_seconds,
            cache_capacity,
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|e| {
        error!("Failed to load {name} from environment: {e}");
        AvatarError::from(e)
    })
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AvatarError::Config(format!("Invalid {name} value '{raw}': {e}"))),
        None => Ok(default),
    }
}

fn parsed_flag(name: &str, default: bool) -> Result<bool> {
    match optional(name) {
        Some(raw) => parse_flag(&raw)
            .ok_or_else(|| AvatarError::Config(format!("Invalid {name} value '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
