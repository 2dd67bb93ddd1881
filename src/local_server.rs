//! Loopback redirect capture for desktop and CLI sign-in.
//!
//! [`LocalServerLauncher`] opens the authorization page through a caller
//! supplied opener (usually the system browser) and listens on the redirect
//! URI's host and port for the user agent to come back.

mod http;
mod server;
mod target;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{BoxError, UserAgentLauncher};

pub use server::LocalServer;

#[derive(Debug, Error)]
pub enum LocalServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),

    #[error("callback scheme {requested:?} cannot be served by a {served:?} loopback server")]
    SchemeMismatch { requested: String, served: String },

    #[error("local server timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("local server stopped: {0}")]
    Closed(String),
}

type Opener = Box<dyn Fn(&Url) -> Result<(), BoxError> + Send + Sync>;

pub struct LocalServerLauncher {
    server: LocalServer,
    opener: Opener,
}

impl LocalServerLauncher {
    /// `opener` is handed the authorization URL once the loopback listener is
    /// bound; it usually opens the system browser.
    pub fn new<F>(server: LocalServer, opener: F) -> Self
    where
        F: Fn(&Url) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            server,
            opener: Box::new(opener),
        }
    }
}

#[async_trait]
impl UserAgentLauncher for LocalServerLauncher {
    async fn launch(&self, url: &Url, callback_scheme: &str) -> Result<Url, BoxError> {
        if callback_scheme != self.server.scheme() {
            return Err(LocalServerError::SchemeMismatch {
                requested: callback_scheme.to_string(),
                served: self.server.scheme().to_string(),
            }
            .into());
        }

        // Bind before opening so a fast redirect cannot miss the listener.
        let listener = self.server.bind()?;
        (self.opener)(url)?;
        debug!("authorization page opened, waiting for loopback redirect");

        Ok(self.server.listen_with(listener).await?)
    }
}

impl std::fmt::Debug for LocalServerLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalServerLauncher")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
