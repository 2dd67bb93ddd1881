use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::oneshot;
use url::Url;

use super::LocalServerError;
use super::http::{
    LocalServerState, callback_handler, fallback_handler, send_response, wait_for_response,
};
use super::target::RedirectTarget;

/// One-shot loopback HTTP server that waits for the authorization redirect.
#[derive(Debug, Clone)]
pub struct LocalServer {
    target: RedirectTarget,
    timeout: Option<Duration>,
}

impl LocalServer {
    /// Serves the host, port and path of an `http` loopback redirect URI.
    pub fn from_redirect_uri(redirect_uri: &str) -> Result<Self, LocalServerError> {
        Ok(Self {
            target: RedirectTarget::parse(redirect_uri)?,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn scheme(&self) -> &str {
        &self.target.scheme
    }

    pub fn bind(&self) -> Result<TcpListener, LocalServerError> {
        TcpListener::bind((self.target.host.as_str(), self.target.port))
            .map_err(LocalServerError::from)
    }

    /// Serves the callback path on `listener` until the first redirect
    /// arrives, then shuts the server down and returns the full redirect URL.
    pub async fn listen_with(&self, listener: TcpListener) -> Result<Url, LocalServerError> {
        let (response_tx, response_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let response_tx = Arc::new(Mutex::new(Some(response_tx)));

        let state = LocalServerState {
            target: self.target.clone(),
            response_tx: response_tx.clone(),
        };

        let app = Router::new()
            .route(&state.target.path, get(callback_handler))
            .fallback(fallback_handler)
            .with_state(state);

        listener.set_nonblocking(true)?;
        let listener = TokioTcpListener::from_std(listener)?;

        // Dropping `shutdown_tx` (including when this future is dropped)
        // stops the server.
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        let server_handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                send_response(
                    &response_tx,
                    Err(LocalServerError::Closed(err.to_string())),
                );
            }
        });

        let response = wait_for_response(response_rx, self.timeout).await;

        let _ = shutdown_tx.send(());
        let _ = server_handle.await;

        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::LocalServer;
    use crate::LocalServerError;

    #[tokio::test]
    async fn times_out_without_redirect() {
        let server = LocalServer::from_redirect_uri("http://127.0.0.1:0/callback")
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let listener = server.bind().unwrap();
        let result = server.listen_with(listener).await;
        assert!(matches!(result, Err(LocalServerError::Timeout { .. })));
    }

    #[tokio::test]
    async fn redirect_without_code_still_ends_the_wait() {
        let server = LocalServer::from_redirect_uri("http://127.0.0.1:0/cb")
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        let listener = server.bind().unwrap();
        let port = listener.local_addr().unwrap().port();

        let browser = tokio::spawn(async move {
            reqwest::get(format!("http://127.0.0.1:{port}/cb?error=access_denied"))
                .await
                .map(|response| response.status().as_u16())
        });
        let redirect = server.listen_with(listener).await.unwrap();

        assert_eq!(redirect.query(), Some("error=access_denied"));
        assert_eq!(browser.await.unwrap().unwrap(), 400);
    }

    #[test]
    fn rejects_non_loopback_scheme() {
        let err = LocalServer::from_redirect_uri("app://cb").unwrap_err();
        assert!(matches!(err, LocalServerError::InvalidRedirectUri(_)));
    }
}
