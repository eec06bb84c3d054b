//! Header names relayed by the front-end proxy and lookup helpers.

use http::header::{HeaderMap, HeaderName};

/// Shared secret proving the request came through the proxy.
pub const PAIRING_TOKEN: HeaderName = HeaderName::from_static("ms-platform-handler-token");

/// Base64 DER client certificate negotiated by the proxy.
pub const CLIENT_CERTIFICATE: HeaderName =
    HeaderName::from_static("ms-platform-handler-clientcert");

/// Hex-encoded Windows token handle duplicated into this process.
pub const WINDOWS_AUTH_TOKEN: HeaderName =
    HeaderName::from_static("ms-platform-handler-winauthtoken");

/// Legacy name for [`WINDOWS_AUTH_TOKEN`] sent by older proxy modules.
pub const LEGACY_WINDOWS_AUTH_TOKEN: HeaderName =
    HeaderName::from_static("x-iis-windowsauthtoken");

/// Returns the header value as text, or `""` when it is missing or not
/// visible ASCII/UTF-8.
pub(crate) fn value_or_empty<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Returns the forwarded Windows token header, preferring the primary name.
pub(crate) fn windows_auth_token(headers: &HeaderMap) -> &str {
    let primary = value_or_empty(headers, &WINDOWS_AUTH_TOKEN);
    if primary.is_empty() {
        value_or_empty(headers, &LEGACY_WINDOWS_AUTH_TOKEN)
    } else {
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"MS-PLATFORM-HANDLER-TOKEN").unwrap(),
            HeaderValue::from_static("abc"),
        );
        assert_eq!(value_or_empty(&headers, &PAIRING_TOKEN), "abc");
    }

    #[test]
    fn missing_header_is_empty() {
        let headers = HeaderMap::new();
        assert_eq!(value_or_empty(&headers, &CLIENT_CERTIFICATE), "");
    }

    #[test]
    fn opaque_bytes_read_as_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLIENT_CERTIFICATE,
            HeaderValue::from_bytes(b"\xffcert").unwrap(),
        );
        assert_eq!(value_or_empty(&headers, &CLIENT_CERTIFICATE), "");
    }

    #[test]
    fn primary_windows_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(WINDOWS_AUTH_TOKEN, HeaderValue::from_static("10"));
        headers.insert(LEGACY_WINDOWS_AUTH_TOKEN, HeaderValue::from_static("20"));
        assert_eq!(windows_auth_token(&headers), "10");
    }

    #[test]
    fn empty_primary_falls_back_to_legacy() {
        let mut headers = HeaderMap::new();
        headers.insert(WINDOWS_AUTH_TOKEN, HeaderValue::from_static(""));
        headers.insert(LEGACY_WINDOWS_AUTH_TOKEN, HeaderValue::from_static("20"));
        assert_eq!(windows_auth_token(&headers), "20");
    }
}
