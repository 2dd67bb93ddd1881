//! `application/x-www-form-urlencoded` values, following the WHATWG
//! encoding algorithm: alphanumerics and `*-._` pass through, space becomes
//! `+`, every other byte is percent-encoded.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::form_urlencoded;

/// Bytes escaped inside a URL query value. Everything a query may carry
/// literally stays as is; `&`, `=`, `+` and `#` are escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b':')
    .remove(b'@')
    .remove(b'/')
    .remove(b'?');

pub fn encode_form_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Reverses [`encode_form_value`]. When percent-decoding does not yield
/// UTF-8 the value is returned with only `+` replaced.
pub fn decode_form_value(value: &str) -> String {
    let replaced = value.replace('+', " ");
    match percent_decode_str(&replaced).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => replaced,
    }
}

/// Joins `key=value` pairs with `&`, form-encoding each value. Keys are
/// emitted verbatim and in the given order.
pub fn encode_form_body<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={}", encode_form_value(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}
