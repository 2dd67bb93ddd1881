//! OAuth 2.0 authorization-code client flow.
//!
//! The crate drives a user through an external user agent, exchanges the
//! returned authorization code for a [`Credential`] and refreshes it later.
//! Platform pieces (the user agent, its session data, the HTTP stack and the
//! persistence medium) are capabilities the caller plugs in.

mod agent;
mod credential;
mod error;
mod flow;
pub mod form;
mod http;
#[cfg(feature = "local-server")]
mod local_server;
mod pkce;
mod request;
mod store;

pub use agent::{NoSessionData, SessionDataStore, UserAgentLauncher};
pub use credential::Credential;
pub use error::{BoxError, ErrorKind, OAuthError, SharedError, StoreError};
pub use flow::{FlowState, OAuth2Client, Operation};
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
#[cfg(feature = "local-server")]
pub use local_server::{LocalServer, LocalServerError, LocalServerLauncher};
pub use pkce::PkcePair;
pub use request::{
    ClientConfig, build_authorize_url, build_refresh_request, build_token_exchange_request,
    extract_code, resolve_callback_scheme,
};
pub use store::{CredentialStore, FileStore, KeyValueStore, MemoryStore};
