use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Supabase API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("S3 presigning config error: {0}")]
    PresigningConfig(#[from] aws_sdk_s3::presigning::PresigningConfigError),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Bulk signing is not supported by this storage backend")]
    BulkSigningUnsupported,

    #[error("No avatar available for {0}")]
    NoAvatar(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl<E, R> From<aws_sdk_s3::error::SdkError<E, R>> for AvatarError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: aws_sdk_s3::error::SdkError<E, R>) -> Self {
        AvatarError::S3(aws_sdk_s3::error::DisplayErrorContext(err).to_string())
    }
}

impl AvatarError {
    /// Whether the error suggests the remote operation does not exist or is not permitted,
    /// rather than a transient failure.
    #[must_use]
    pub fn is_capability_missing(&self) -> bool {
        match self {
            AvatarError::Api { status, .. } => matches!(
                *status,
                StatusCode::NOT_FOUND
                    | StatusCode::UNAUTHORIZED
                    | StatusCode::FORBIDDEN
                    | StatusCode::NOT_IMPLEMENTED
            ),
            AvatarError::BulkSigningUnsupported => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AvatarError>;
