use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::form::{encode_form_body, encode_query_value};
use crate::{HttpRequest, OAuthError, PkcePair};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_ACCEPT: &str = "application/json";

/// Static description of an OAuth 2.0 client registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Overrides the scheme derived from `redirect_uri` when waiting for the
    /// user agent to come back.
    #[serde(default)]
    pub callback_scheme: Option<String>,
    /// Generate a fresh PKCE pair for every sign-in attempt.
    #[serde(default)]
    pub use_pkce: bool,
}

impl ClientConfig {
    pub fn new(
        authorize_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authorize_endpoint: authorize_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            callback_scheme: None,
            use_pkce: false,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn with_callback_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.callback_scheme = Some(scheme.into());
        self
    }

    pub fn with_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }
}

/// The scheme the user agent should watch for: the explicit override, or the
/// scheme of `redirect_uri`.
pub fn resolve_callback_scheme(config: &ClientConfig) -> Result<String, OAuthError> {
    if let Some(scheme) = &config.callback_scheme {
        return Ok(scheme.clone());
    }
    Url::parse(&config.redirect_uri)
        .map(|url| url.scheme().to_string())
        .map_err(|err| {
            OAuthError::InvalidRedirectUri(format!("{}: {err}", config.redirect_uri))
        })
}

/// Builds the authorization endpoint URL the user agent is sent to.
///
/// Parameters are emitted as `client_id`, `redirect_uri`, `response_type`,
/// `scope`, followed by `code_challenge` and `code_challenge_method` when a
/// PKCE pair is given. Scopes are joined with a literal `+`.
pub fn build_authorize_url(
    config: &ClientConfig,
    pkce: Option<&PkcePair>,
) -> Result<Url, OAuthError> {
    let mut url = parse_endpoint("authorize", &config.authorize_endpoint)?;

    let scope = config
        .scopes
        .iter()
        .map(|scope| encode_query_value(scope))
        .collect::<Vec<_>>()
        .join("+");

    let mut params = vec![
        ("client_id", encode_query_value(&config.client_id)),
        ("redirect_uri", encode_query_value(&config.redirect_uri)),
        ("response_type", "code".to_string()),
        ("scope", scope),
    ];
    if let Some(pkce) = pkce {
        params.push(("code_challenge", encode_query_value(&pkce.code_challenge)));
        params.push((
            "code_challenge_method",
            encode_query_value(&pkce.code_challenge_method),
        ));
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    url.set_query(Some(&query));
    Ok(url)
}

pub fn build_token_exchange_request(
    config: &ClientConfig,
    code: &str,
    pkce: Option<&PkcePair>,
) -> Result<HttpRequest, OAuthError> {
    let mut pairs = vec![
        ("redirect_uri", config.redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
        ("client_id", config.client_id.as_str()),
        ("code", code),
        ("client_secret", config.client_secret.as_str()),
    ];
    if let Some(pkce) = pkce {
        pairs.push(("code_verifier", pkce.code_verifier.as_str()));
    }
    token_request(config, encode_form_body(pairs))
}

pub fn build_refresh_request(
    config: &ClientConfig,
    refresh_token: &str,
) -> Result<HttpRequest, OAuthError> {
    let pairs = [
        ("client_id", config.client_id.as_str()),
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_secret", config.client_secret.as_str()),
    ];
    token_request(config, encode_form_body(pairs))
}

/// Pulls the authorization code out of the redirect the user agent landed on.
pub fn extract_code(redirect: &Url) -> Result<String, OAuthError> {
    redirect
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or(OAuthError::CodeNotFound)
}

fn token_request(config: &ClientConfig, body: String) -> Result<HttpRequest, OAuthError> {
    Ok(HttpRequest {
        method: Method::POST,
        url: parse_endpoint("token", &config.token_endpoint)?,
        headers: vec![
            ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("Accept".to_string(), JSON_ACCEPT.to_string()),
        ],
        body,
    })
}

fn parse_endpoint(name: &str, endpoint: &str) -> Result<Url, OAuthError> {
    Url::parse(endpoint).map_err(|err| {
        OAuthError::InvalidConfiguration(format!("{name} endpoint {endpoint:?}: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::ErrorKind;
    use crate::form::decode_form_value;

    fn config() -> ClientConfig {
        ClientConfig::new(
            "https://idp/authorize",
            "https://idp/token",
            "abc",
            "shh",
            "app://cb",
        )
    }

    #[test]
    fn authorize_url_has_fixed_parameter_order() {
        let config = config().with_scopes(["openid", "profile"]);
        let url = build_authorize_url(&config, None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://idp/authorize?client_id=abc&redirect_uri=app://cb&response_type=code&scope=openid+profile"
        );
    }

    #[test]
    fn authorize_url_is_deterministic() {
        let config = config().with_scopes(["read", "write"]);
        let first = build_authorize_url(&config, None).unwrap();
        let second = build_authorize_url(&config, None).unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn pkce_appends_challenge_and_method() {
        let config = config().with_scope("read");
        let pkce = PkcePair::from_verifier("verifier");
        let plain = build_authorize_url(&config, None).unwrap();
        let with_pkce = build_authorize_url(&config, Some(&pkce)).unwrap();

        let expected = format!(
            "{}&code_challenge={}&code_challenge_method=S256",
            plain.as_str(),
            pkce.code_challenge
        );
        assert_eq!(with_pkce.as_str(), expected);

        let keys: Vec<_> = with_pkce
            .query_pairs()
            .map(|(key, _)| key.into_owned())
            .collect();
        assert_eq!(
            keys,
            [
                "client_id",
                "redirect_uri",
                "response_type",
                "scope",
                "code_challenge",
                "code_challenge_method"
            ]
        );
    }

    #[test]
    fn authorize_url_replaces_existing_query() {
        let mut config = config();
        config.authorize_endpoint = "https://idp/authorize?stale=1".to_string();
        let url = build_authorize_url(&config, None).unwrap();
        assert!(url.query_pairs().all(|(key, _)| key != "stale"));
    }

    #[test]
    fn authorize_url_rejects_relative_endpoint() {
        let mut config = config();
        config.authorize_endpoint = "/authorize".to_string();
        let err = build_authorize_url(&config, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn token_exchange_body_is_exact() {
        let request = build_token_exchange_request(&config(), "XYZ", None).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://idp/token");
        assert_eq!(
            request.body,
            "redirect_uri=app%3A%2F%2Fcb&grant_type=authorization_code&client_id=abc&code=XYZ&client_secret=shh"
        );
        assert_eq!(
            request.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.header("Accept"), Some("application/json"));
    }

    #[test]
    fn token_exchange_carries_code_verifier() {
        let pkce = PkcePair::from_verifier("my verifier");
        let request = build_token_exchange_request(&config(), "XYZ", Some(&pkce)).unwrap();
        assert!(request.body.ends_with("&client_secret=shh&code_verifier=my+verifier"));
    }

    #[test]
    fn builders_are_pure() {
        let a = build_token_exchange_request(&config(), "c o/de", None).unwrap();
        let b = build_token_exchange_request(&config(), "c o/de", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn refresh_body_is_exact() {
        let request = build_refresh_request(&config(), "r/t+1").unwrap();
        assert_eq!(
            request.body,
            "client_id=abc&grant_type=refresh_token&refresh_token=r%2Ft%2B1&client_secret=shh"
        );
        assert_eq!(request.method, Method::POST);
    }

    #[test]
    fn token_request_rejects_bad_endpoint() {
        let mut config = config();
        config.token_endpoint = "not a url".to_string();
        let err = build_refresh_request(&config, "rt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn callback_scheme_prefers_explicit_value() {
        let config = config().with_callback_scheme("custom");
        assert_eq!(resolve_callback_scheme(&config).unwrap(), "custom");
        assert_eq!(resolve_callback_scheme(&self::config()).unwrap(), "app");
    }

    #[test]
    fn callback_scheme_requires_parseable_redirect() {
        let mut config = config();
        config.redirect_uri = "not-a-uri".to_string();
        let err = resolve_callback_scheme(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRedirectUri);
    }

    #[test]
    fn extracts_code_from_redirect() {
        let redirect = Url::parse("app://cb?code=ABC123&state=xyz").unwrap();
        assert_eq!(extract_code(&redirect).unwrap(), "ABC123");
    }

    #[test]
    fn missing_code_is_reported() {
        for redirect in ["app://cb?state=xyz", "app://cb", "app://cb?code="] {
            let redirect = Url::parse(redirect).unwrap();
            assert!(matches!(
                extract_code(&redirect),
                Err(OAuthError::CodeNotFound)
            ));
        }
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "authorize_endpoint": "https://idp/authorize",
                "token_endpoint": "https://idp/token",
                "client_id": "abc",
                "client_secret": "shh",
                "redirect_uri": "app://cb"
            }"#,
        )
        .unwrap();
        assert_eq!(config, self::config());
    }

    proptest! {
        #[test]
        fn builders_are_deterministic(
            client_id in "[^\\x00]{0,24}",
            client_secret in "[^\\x00]{0,24}",
            code in "[^\\x00]{0,24}",
            scopes in prop::collection::vec("[^\\x00 ]{1,12}", 0..4),
        ) {
            let mut config = config().with_scopes(scopes);
            config.client_id = client_id;
            config.client_secret = client_secret;

            prop_assert_eq!(
                build_authorize_url(&config, None).ok(),
                build_authorize_url(&config, None).ok()
            );
            prop_assert_eq!(
                build_token_exchange_request(&config, &code, None).ok(),
                build_token_exchange_request(&config, &code, None).ok()
            );
            prop_assert_eq!(
                build_refresh_request(&config, &code).ok(),
                build_refresh_request(&config, &code).ok()
            );
        }

        #[test]
        fn token_body_values_decode_to_inputs(
            client_id in "[^\\x00]{0,24}",
            code in "[^\\x00]{0,24}",
        ) {
            let mut config = config();
            config.client_id = client_id.clone();
            let request = build_token_exchange_request(&config, &code, None).unwrap();

            let fields: Vec<(&str, String)> = request
                .body
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(key, value)| (key, decode_form_value(value)))
                .collect();
            prop_assert_eq!(
                fields,
                vec![
                    ("redirect_uri", "app://cb".to_string()),
                    ("grant_type", "authorization_code".to_string()),
                    ("client_id", client_id),
                    ("code", code),
                    ("client_secret", "shh".to_string()),
                ]
            );
        }
    }
}
