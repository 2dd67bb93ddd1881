use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::{Map, Value};

use crate::OAuthError;

/// Result of a successful token exchange or refresh.
///
/// Authorization servers disagree on field naming, so decoding accepts both
/// snake_case and camelCase keys and reads the lifetime from either
/// `expires` or `expires_in`. Only `access_token` and `token_type` are
/// required; a missing or mistyped optional field is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            sub: None,
            token_type: token_type.into(),
            refresh_token: None,
            scope: None,
            expires_in: None,
            id_token: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_in(mut self, expires_in: i64) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    pub fn with_sub(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OAuthError> {
        serde_json::from_slice(bytes).map_err(OAuthError::decode)
    }

    /// Pretty JSON with snake_case keys; `None` fields are omitted.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Value for an `Authorization` header, e.g. `Bearer abc`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;

        let access_token =
            required_string(&fields, &["access_token", "accessToken"]).map_err(D::Error::custom)?;
        let token_type =
            required_string(&fields, &["token_type", "tokenType"]).map_err(D::Error::custom)?;

        Ok(Self {
            access_token,
            sub: optional_string(&fields, &["sub"]),
            token_type,
            refresh_token: optional_string(&fields, &["refresh_token", "refreshToken"]),
            scope: optional_string(&fields, &["scope"]),
            expires_in: integer(&fields, &["expires", "expires_in", "expiresIn"]),
            id_token: optional_string(&fields, &["id_token", "idToken"]),
        })
    }
}

// Each lookup takes its keys in priority order and uses the first one whose
// value has the expected type.

fn required_string(fields: &Map<String, Value>, keys: &[&str]) -> Result<String, String> {
    if let Some(value) = optional_string(fields, keys) {
        return Ok(value);
    }
    match keys.iter().find_map(|key| fields.get(*key).map(|value| (key, value))) {
        Some((key, other)) => Err(format!("field `{key}` must be a string, got {other}")),
        None => Err(format!("missing field `{}`", keys[0])),
    }
}

fn optional_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn integer(fields: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_i64))
}
