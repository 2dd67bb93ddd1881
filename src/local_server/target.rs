use url::Url;

use super::LocalServerError;

#[derive(Debug, Clone)]
pub(super) struct RedirectTarget {
    pub(super) scheme: String,
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) path: String,
}

impl RedirectTarget {
    pub(super) fn parse(redirect_uri: &str) -> Result<Self, LocalServerError> {
        let url = Url::parse(redirect_uri)?;
        if url.scheme() != "http" {
            return Err(LocalServerError::InvalidRedirectUri(
                "redirect uri must use http scheme".to_string(),
            ));
        }

        let host = url.host_str().ok_or_else(|| {
            LocalServerError::InvalidRedirectUri("redirect uri is missing host".to_string())
        })?;

        let port = url.port_or_known_default().ok_or_else(|| {
            LocalServerError::InvalidRedirectUri("redirect uri is missing port".to_string())
        })?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
            path: url.path().to_string(),
        })
    }

    /// Rebuilds the URL the user agent was redirected to from the raw query.
    pub(super) fn callback_url(&self, query: &str) -> Result<Url, LocalServerError> {
        let base = format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path);

        if query.is_empty() {
            return Ok(Url::parse(&base)?);
        }

        Ok(Url::parse(&format!("{base}?{query}"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::RedirectTarget;
    use crate::LocalServerError;

    #[test]
    fn parses_redirect_target() {
        let target = RedirectTarget::parse("http://localhost:8765/callback").unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, 8765);
        assert_eq!(target.path, "/callback");
    }

    #[test]
    fn rejects_custom_schemes() {
        let result = RedirectTarget::parse("app://cb");
        assert!(matches!(result, Err(LocalServerError::InvalidRedirectUri(_))));
    }

    #[test]
    fn callback_url_keeps_query() {
        let target = RedirectTarget::parse("http://127.0.0.1:9000/cb").unwrap();
        let url = target.callback_url("code=abc&state=xyz").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/cb?code=abc&state=xyz");
    }
}
