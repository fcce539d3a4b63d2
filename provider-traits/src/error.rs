use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Credential rejected or expired: {0}")]
    AuthInvalid(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Capability not supported by this backend: {0}")]
    NotSupported(String),

    #[error("Unexpected provider response: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// True when re-trying with the same credential cannot succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::AuthInvalid(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
