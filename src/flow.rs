//! Orchestrates sign-in, sign-out and refresh.
//!
//! Every public operation runs on its own Tokio task and hands back an
//! [`Operation`]. The operation resolves exactly once; all clones of it see
//! the same outcome. When every clone is dropped before the outcome is known
//! the task stops and the user-agent session or HTTP call is torn down.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::request::{
    build_authorize_url, build_refresh_request, build_token_exchange_request, extract_code,
    resolve_callback_scheme,
};
use crate::{
    ClientConfig, Credential, CredentialStore, HttpRequest, HttpTransport, NoSessionData,
    OAuthError, PkcePair, SessionDataStore, UserAgentLauncher,
};

#[derive(Debug, Clone)]
pub enum FlowState {
    Idle,
    AwaitingUserInteraction,
    ExchangingCode,
    ExchangingRefreshToken,
    Completed(Credential),
    Failed(OAuthError),
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    fn outcome(&self) -> Option<Result<Credential, OAuthError>> {
        match self {
            Self::Completed(credential) => Some(Ok(credential.clone())),
            Self::Failed(err) => Some(Err(err.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("operation abandoned before completion")]
struct FlowAbandoned;

#[derive(Debug, thiserror::Error)]
#[error("user interaction timed out after {0:?}")]
struct InteractionTimedOut(Duration);

/// Handle to one in-flight flow.
#[derive(Debug, Clone)]
pub struct Operation {
    rx: watch::Receiver<FlowState>,
}

impl Operation {
    pub fn state(&self) -> FlowState {
        self.rx.borrow().clone()
    }

    /// Waits for the terminal outcome. Resolves to an `AuthError` if the flow
    /// was cancelled before it finished.
    pub async fn result(&self) -> Result<Credential, OAuthError> {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(FlowState::is_terminal)
            .await
            .ok()
            .and_then(|state| state.outcome());
        outcome.unwrap_or_else(|| Err(OAuthError::auth(FlowAbandoned)))
    }
}

impl IntoFuture for Operation {
    type Output = Result<Credential, OAuthError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.result().await })
    }
}

#[derive(Clone)]
struct Progress(Arc<watch::Sender<FlowState>>);

impl Progress {
    fn set(&self, state: FlowState) {
        self.0.send_replace(state);
    }

    async fn abandoned(&self) {
        self.0.closed().await
    }
}

/// Abort handles of the tasks that are still running.
#[derive(Default)]
struct InFlight {
    next_id: AtomicU64,
    handles: Mutex<HashMap<u64, AbortHandle>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn abort_all(&self) {
        for (_, handle) in self.lock().drain() {
            handle.abort();
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[derive(Clone)]
struct FlowContext {
    launcher: Arc<dyn UserAgentLauncher>,
    session_data: Arc<dyn SessionDataStore>,
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    interaction_timeout: Option<Duration>,
}

/// OAuth 2.0 authorization-code client.
///
/// Dropping the client aborts every operation it still has in flight.
pub struct OAuth2Client {
    context: FlowContext,
    in_flight: Arc<InFlight>,
}

impl OAuth2Client {
    pub fn new(launcher: Arc<dyn UserAgentLauncher>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            context: FlowContext {
                launcher,
                session_data: Arc::new(NoSessionData),
                transport,
                store: CredentialStore::in_memory(),
                interaction_timeout: None,
            },
            in_flight: Arc::default(),
        }
    }

    pub fn with_session_data(mut self, session_data: Arc<dyn SessionDataStore>) -> Self {
        self.context.session_data = session_data;
        self
    }

    pub fn with_credential_store(mut self, store: CredentialStore) -> Self {
        self.context.store = store;
        self
    }

    /// Bounds how long the user may take in the user agent. Unbounded by
    /// default.
    pub fn with_interaction_timeout(mut self, timeout: Duration) -> Self {
        self.context.interaction_timeout = Some(timeout);
        self
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.context.store
    }

    /// Number of operations that have not reached a terminal state.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn cancel_all(&self) {
        self.in_flight.abort_all();
    }

    /// Runs the user through the authorization page and exchanges the
    /// returned code. The credential is not persisted.
    ///
    /// Must be called within a Tokio runtime.
    pub fn sign_in(&self, config: &ClientConfig) -> Operation {
        let config = config.clone();
        self.spawn("sign_in", FlowState::Idle, move |context, progress| {
            run_sign_in(context, progress, config)
        })
    }

    /// Clears the user agent's session data, then signs in again. A failure
    /// to clear is logged and otherwise ignored.
    pub fn sign_out(&self, config: &ClientConfig) -> Operation {
        let config = config.clone();
        self.spawn("sign_out", FlowState::Idle, move |context, progress| {
            run_sign_out(context, progress, config)
        })
    }

    /// Exchanges `refresh_token` for a new credential and saves it to the
    /// credential store. Every failure is reported as `AuthError`.
    pub fn refresh(&self, config: &ClientConfig, refresh_token: impl Into<String>) -> Operation {
        let config = config.clone();
        let refresh_token = refresh_token.into();
        self.spawn(
            "refresh",
            FlowState::ExchangingRefreshToken,
            move |context, _| run_refresh(context, config, refresh_token),
        )
    }

    fn spawn<F, Fut>(&self, operation: &'static str, initial: FlowState, work: F) -> Operation
    where
        F: FnOnce(FlowContext, Progress) -> Fut,
        Fut: Future<Output = Result<Credential, OAuthError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(initial);
        let progress = Progress(Arc::new(tx));
        let work = work(self.context.clone(), progress.clone());
        let registry = Arc::downgrade(&self.in_flight);

        // Held until the abort handle is registered so a fast task cannot
        // release its id first.
        let mut handles = self.in_flight.lock();
        let id = self.in_flight.next_id.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = work => Some(outcome),
                () = progress.abandoned() => None,
            };
            release(&registry, id);

            match outcome {
                Some(Ok(credential)) => {
                    debug!(operation, "flow completed");
                    progress.set(FlowState::Completed(credential));
                }
                Some(Err(err)) => {
                    error!(operation, kind = %err.kind(), error = %err, "flow failed");
                    progress.set(FlowState::Failed(err));
                }
                None => debug!(operation, "flow abandoned by every subscriber"),
            }
        });
        handles.insert(id, task.abort_handle());

        Operation { rx }
    }
}

impl std::fmt::Debug for OAuth2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("interaction_timeout", &self.context.interaction_timeout)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn release(registry: &Weak<InFlight>, id: u64) {
    if let Some(in_flight) = registry.upgrade() {
        in_flight.release(id);
    }
}

async fn run_sign_in(
    context: FlowContext,
    progress: Progress,
    config: ClientConfig,
) -> Result<Credential, OAuthError> {
    let callback_scheme = resolve_callback_scheme(&config)?;
    let pkce = if config.use_pkce {
        Some(PkcePair::generate()?)
    } else {
        None
    };
    let authorize_url = build_authorize_url(&config, pkce.as_ref())?;

    progress.set(FlowState::AwaitingUserInteraction);
    debug!(%callback_scheme, "waiting for user agent");
    let redirect = context
        .await_user_agent(&authorize_url, &callback_scheme)
        .await?;
    let code = extract_code(&redirect)?;

    progress.set(FlowState::ExchangingCode);
    let request = build_token_exchange_request(&config, &code, pkce.as_ref())?;
    context.exchange(request).await
}

async fn run_sign_out(
    context: FlowContext,
    progress: Progress,
    config: ClientConfig,
) -> Result<Credential, OAuthError> {
    if let Err(err) = context.session_data.clear_all().await {
        warn!(error = %err, "failed to clear session data, signing in anyway");
    }
    run_sign_in(context, progress, config).await
}

async fn run_refresh(
    context: FlowContext,
    config: ClientConfig,
    refresh_token: String,
) -> Result<Credential, OAuthError> {
    let credential = match build_refresh_request(&config, &refresh_token) {
        Ok(request) => context.exchange(request).await,
        Err(err) => Err(err),
    }
    .map_err(OAuthError::auth)?;

    if let Err(err) = context.store.save(&credential) {
        warn!(error = %err, "failed to persist refreshed credential");
    }
    Ok(credential)
}

impl FlowContext {
    async fn await_user_agent(&self, url: &Url, callback_scheme: &str) -> Result<Url, OAuthError> {
        let launch = self.launcher.launch(url, callback_scheme);
        let redirect = match self.interaction_timeout {
            Some(timeout) => tokio::time::timeout(timeout, launch)
                .await
                .map_err(|_| OAuthError::auth(InteractionTimedOut(timeout)))?,
            None => launch.await,
        };
        redirect.map_err(OAuthError::auth)
    }

    #[instrument(skip_all, fields(url = %request.url))]
    async fn exchange(&self, request: HttpRequest) -> Result<Credential, OAuthError> {
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(OAuthError::transport)?;

        if !response.is_success() {
            warn!(status = response.status, "token endpoint rejected request");
            return Err(OAuthError::ServerError {
                status: response.status,
            });
        }

        Credential::decode(&response.body)
    }
}
