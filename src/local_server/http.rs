use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use super::LocalServerError;
use super::target::RedirectTarget;

const SUCCESS_HTML: &str = include_str!("html/success.html");
const ERROR_HTML: &str = include_str!("html/error.html");

type ResponseResult = Result<Url, LocalServerError>;
type ResponseSender = oneshot::Sender<ResponseResult>;
type ResponseReceiver = oneshot::Receiver<ResponseResult>;
pub(super) type SharedResponseSender = Arc<Mutex<Option<ResponseSender>>>;

#[derive(Clone)]
pub(super) struct LocalServerState {
    pub(super) target: RedirectTarget,
    pub(super) response_tx: SharedResponseSender,
}

pub(super) fn send_response(response_tx: &SharedResponseSender, response: ResponseResult) {
    if let Ok(mut guard) = response_tx.lock() {
        if let Some(sender) = guard.take() {
            let _ = sender.send(response);
        }
    }
}

/// Any hit on the callback path ends the interaction; whether the redirect
/// carries a code is for the flow to decide.
pub(super) async fn callback_handler(
    State(state): State<LocalServerState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let query = query.unwrap_or_default();
    match state.target.callback_url(&query) {
        Ok(url) => {
            let has_code = url.query_pairs().any(|(key, _)| key == "code");
            debug!(has_code, "received redirect on loopback callback");
            send_response(&state.response_tx, Ok(url));
            if has_code {
                (StatusCode::OK, Html(SUCCESS_HTML))
            } else {
                (StatusCode::BAD_REQUEST, Html(ERROR_HTML))
            }
        }
        Err(error) => {
            send_response(&state.response_tx, Err(error));
            (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_HTML))
        }
    }
}

pub(super) async fn fallback_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(ERROR_HTML))
}

pub(super) async fn wait_for_response(
    response_rx: ResponseReceiver,
    timeout: Option<Duration>,
) -> Result<Url, LocalServerError> {
    let closed = |_: oneshot::error::RecvError| LocalServerError::Closed("response channel closed".to_string());
    if let Some(timeout) = timeout {
        let result = tokio::time::timeout(timeout, response_rx)
            .await
            .map_err(|_| LocalServerError::Timeout { timeout })?;
        result.map_err(closed)?
    } else {
        response_rx.await.map_err(closed)?
    }
}
