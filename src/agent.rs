//! Capabilities the flow needs from the platform's user agent.

use async_trait::async_trait;
use url::Url;

use crate::BoxError;

/// Opens the authorization page and reports where the user agent was finally
/// redirected to.
///
/// A launch is one-shot: it resolves once with the redirect URL whose scheme
/// matches `callback_scheme`, or with an error when the user cancels or the
/// user agent fails.
#[async_trait]
pub trait UserAgentLauncher: Send + Sync {
    async fn launch(&self, url: &Url, callback_scheme: &str) -> Result<Url, BoxError>;
}

/// Browser-session state shared with the launcher (cookies, local and
/// session storage, databases).
#[async_trait]
pub trait SessionDataStore: Send + Sync {
    async fn clear_all(&self) -> Result<(), BoxError>;
}

/// For user agents that keep no session state the flow can reach.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionData;

#[async_trait]
impl SessionDataStore for NoSessionData {
    async fn clear_all(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
