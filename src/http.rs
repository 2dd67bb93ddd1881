use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder,
    header::{HeaderName, HeaderValue},
};
use url::Url;

use crate::BoxError;

/// A fully built token-endpoint request. Produced by the request builders and
/// handed to an [`HttpTransport`] unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes token-endpoint requests. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BoxError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, BoxError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http })
    }

    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BoxError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let builder = apply_headers(self.http.request(method, url), &headers)?;
        let response = builder.body(body).send().await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid header: {name}={value}")]
struct InvalidHeader {
    name: String,
    value: String,
}

fn apply_headers(
    mut builder: RequestBuilder,
    headers: &[(String, String)],
) -> Result<RequestBuilder, InvalidHeader> {
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| InvalidHeader {
            name: name.clone(),
            value: value.clone(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| InvalidHeader {
            name: name.to_string(),
            value: value.clone(),
        })?;
        builder = builder.header(name, value);
    }
    Ok(builder)
}
