use http::StatusCode;
use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("config deserialization error: {0}")]
    ConfigError(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("registry authentication failed for {0}")]
    RegistryAuthError(String),

    #[error("invalid manifest {reference}: {reason}")]
    InvalidManifest { reference: String, reason: String },
}
