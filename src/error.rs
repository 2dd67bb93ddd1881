use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by the pluggable collaborators (launcher, transport,
/// session data store).
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared cause carried by [`OAuthError`] so results can be broadcast.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Error)]
pub enum OAuthError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),

    #[error("authorization failed: {0}")]
    AuthError(#[source] SharedError),

    #[error("missing authorization code in callback url")]
    CodeNotFound,

    #[error("token request failed: {0}")]
    TransportError(#[source] SharedError),

    #[error("token endpoint returned http status {status}")]
    ServerError { status: u16 },

    #[error("invalid token response: {0}")]
    DecodeError(#[source] SharedError),
}

/// Fieldless discriminant of [`OAuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfiguration,
    InvalidRedirectUri,
    AuthError,
    CodeNotFound,
    TransportError,
    ServerError,
    DecodeError,
}

impl OAuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::InvalidRedirectUri(_) => ErrorKind::InvalidRedirectUri,
            Self::AuthError(_) => ErrorKind::AuthError,
            Self::CodeNotFound => ErrorKind::CodeNotFound,
            Self::TransportError(_) => ErrorKind::TransportError,
            Self::ServerError { .. } => ErrorKind::ServerError,
            Self::DecodeError(_) => ErrorKind::DecodeError,
        }
    }

    pub(crate) fn auth(cause: impl Into<BoxError>) -> Self {
        Self::AuthError(Arc::from(cause.into()))
    }

    pub(crate) fn transport(cause: impl Into<BoxError>) -> Self {
        Self::TransportError(Arc::from(cause.into()))
    }

    pub(crate) fn decode(cause: impl Into<BoxError>) -> Self {
        Self::DecodeError(Arc::from(cause.into()))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidConfiguration => "invalid_configuration",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::AuthError => "auth_error",
            Self::CodeNotFound => "code_not_found",
            Self::TransportError => "transport_error",
            Self::ServerError => "server_error",
            Self::DecodeError => "decode_error",
        };
        f.write_str(name)
    }
}

/// Failure of the key-value layer behind [`crate::CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, OAuthError};

    #[test]
    fn refresh_wrapping_keeps_inner_error_as_source() {
        let inner = OAuthError::ServerError { status: 400 };
        let wrapped = OAuthError::auth(inner);

        assert_eq!(wrapped.kind(), ErrorKind::AuthError);
        let source = std::error::Error::source(&wrapped).unwrap();
        assert_eq!(source.to_string(), "token endpoint returned http status 400");
    }
}
