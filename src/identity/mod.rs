//! Materialization of forwarded Windows identities.
//!
//! The proxy duplicates the caller's logon token into this process and
//! sends the handle value as hex. This module parses that value, takes
//! ownership of a duplicate through a [`TokenSource`], and turns it into a
//! [`Principal`] for the request.

mod token;
#[cfg(windows)]
#[allow(unsafe_code)]
mod win32;

use std::sync::Arc;

use http::HeaderMap;

use crate::auth::AuthenticationFeature;
use crate::headers;
use crate::principal::Principal;
use crate::resources::ResponseResources;

pub use token::{acquire_identity, RawToken, TokenAccount, TokenSource, WindowsIdentity};
#[cfg(windows)]
pub use win32::Win32TokenSource;

#[cfg(test)]
pub(crate) use token::testing;

/// Returns the platform's token source, if it has one.
pub fn default_token_source() -> Option<Arc<dyn TokenSource>> {
    #[cfg(windows)]
    {
        Some(Arc::new(Win32TokenSource))
    }
    #[cfg(not(windows))]
    {
        None
    }
}

/// Pointer-width handles need at most this many hex digits.
const MAX_HANDLE_DIGITS: usize = 16;

/// Parses a forwarded handle value.
///
/// Accepts 1 to 16 hex digits of either case, with optional surrounding
/// ASCII whitespace. Signs, `0x` prefixes and anything else yield `None`.
///
/// # Examples
///
/// ```
/// use platform_handler::identity::{parse_token_handle, RawToken};
///
/// assert_eq!(parse_token_handle("1A2B"), Some(RawToken::new(0x1A2B)));
/// assert_eq!(parse_token_handle(" 1a2b "), Some(RawToken::new(0x1A2B)));
/// assert_eq!(parse_token_handle("0x1A2B"), None);
/// assert_eq!(parse_token_handle("-1"), None);
/// ```
pub fn parse_token_handle(value: &str) -> Option<RawToken> {
    let digits = value.trim_matches(|c: char| c.is_ascii_whitespace());
    if digits.is_empty()
        || digits.len() > MAX_HANDLE_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }
    u64::from_str_radix(digits, 16).ok().map(RawToken::new)
}

/// Builds the Windows principal for a trusted request.
///
/// Returns `None` when no usable handle was forwarded or it could not be
/// acquired; the request then continues without a Windows identity. A
/// materialized identity is registered with `resources` for disposal at
/// end of response. With `automatic` set, the principal also becomes the
/// request user, merged with any user already on `feature`.
pub(crate) fn materialize_user(
    headers: &HeaderMap,
    source: Option<&Arc<dyn TokenSource>>,
    resources: &ResponseResources,
    feature: &AuthenticationFeature,
    automatic: bool,
) -> Option<Principal> {
    let raw = parse_token_handle(headers::windows_auth_token(headers))?;

    let Some(source) = source else {
        tracing::warn!(handle = %raw, "forwarded Windows token ignored, no token source on this platform");
        return None;
    };

    let identity = match acquire_identity(source, raw) {
        Ok(identity) => Arc::new(identity),
        Err(e) => {
            tracing::warn!(handle = %raw, error = %e, "forwarded Windows token could not be acquired");
            return None;
        }
    };
    resources.register(identity.clone());

    let principal = Principal::windows(identity);
    if automatic {
        let user = match feature.user() {
            Some(existing) => Principal::merge(Some(&existing), principal.clone()),
            None => principal.clone(),
        };
        feature.set_user(Some(user));
    }

    Some(principal)
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeTokens, DUPLICATE_OFFSET};
    use super::*;
    use crate::principal::Identity;
    use http::HeaderValue;

    fn headers_with(name: http::HeaderName, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    fn fake_source() -> (Arc<FakeTokens>, Arc<dyn TokenSource>) {
        let fake = Arc::new(FakeTokens::default());
        let source: Arc<dyn TokenSource> = fake.clone();
        (fake, source)
    }

    #[test]
    fn parse_accepts_both_cases() {
        assert_eq!(parse_token_handle("ff"), Some(RawToken::new(0xFF)));
        assert_eq!(parse_token_handle("FF"), Some(RawToken::new(0xFF)));
    }

    #[test]
    fn parse_rejects_garbage() {
        for value in ["", "   ", "xyz", "+1A", "0x10", "1A 2B", "١٢"] {
            assert_eq!(parse_token_handle(value), None, "{value:?}");
        }
    }

    #[test]
    fn parse_bounds_width() {
        assert_eq!(
            parse_token_handle("FFFFFFFFFFFFFFFF"),
            Some(RawToken::new(u64::MAX))
        );
        assert_eq!(parse_token_handle("10000000000000000"), None);
    }

    #[test]
    fn garbage_header_leaves_everything_alone() {
        let (fake, source) = fake_source();
        let feature = AuthenticationFeature::new();
        let resources = ResponseResources::new();
        let headers = headers_with(headers::WINDOWS_AUTH_TOKEN, "not-hex");

        let principal = materialize_user(&headers, Some(&source), &resources, &feature, true);

        assert!(principal.is_none());
        assert!(feature.user().is_none());
        assert!(resources.is_empty());
        assert!(fake.events().is_empty());
    }

    #[test]
    fn missing_source_skips_materialization() {
        let feature = AuthenticationFeature::new();
        let resources = ResponseResources::new();
        let headers = headers_with(headers::WINDOWS_AUTH_TOKEN, "1A2B");

        assert!(materialize_user(&headers, None, &resources, &feature, true).is_none());
        assert!(feature.user().is_none());
    }

    #[test]
    fn acquisition_failure_skips_materialization() {
        let fake = Arc::new(FakeTokens {
            fail_duplicate: true,
            ..FakeTokens::default()
        });
        let source: Arc<dyn TokenSource> = fake.clone();
        let feature = AuthenticationFeature::new();
        let resources = ResponseResources::new();
        let headers = headers_with(headers::WINDOWS_AUTH_TOKEN, "1A2B");

        assert!(materialize_user(&headers, Some(&source), &resources, &feature, true).is_none());
        assert_eq!(fake.closed(0x1A2B), 1);
        assert!(resources.is_empty());
    }

    #[test]
    fn sets_user_when_none_exists() {
        let (_fake, source) = fake_source();
        let feature = AuthenticationFeature::new();
        let resources = ResponseResources::new();
        let headers = headers_with(headers::WINDOWS_AUTH_TOKEN, "1A2B");

        let principal =
            materialize_user(&headers, Some(&source), &resources, &feature, true).unwrap();

        assert_eq!(feature.user(), Some(principal.clone()));
        assert_eq!(resources.len(), 1);
        let windows = principal.identity().unwrap().windows_identity().unwrap();
        assert_eq!(windows.token(), Some(RawToken::new(0x1A2B + DUPLICATE_OFFSET)));
    }

    #[test]
    fn merges_with_existing_user() {
        let (_fake, source) = fake_source();
        let feature = AuthenticationFeature::new();
        let existing = Principal::new(Identity::new("alice", "Cookies"));
        feature.set_user(Some(existing.clone()));
        let resources = ResponseResources::new();
        let headers = headers_with(headers::WINDOWS_AUTH_TOKEN, "1A2B");

        let principal =
            materialize_user(&headers, Some(&source), &resources, &feature, true).unwrap();

        let user = feature.user().unwrap();
        assert_eq!(user.identities().len(), 2);
        assert_eq!(user.identities()[0], principal.identities()[0]);
        assert_eq!(user.identities()[1], existing.identities()[0]);
    }

    #[test]
    fn without_automatic_user_is_untouched_but_principal_returned() {
        let (_fake, source) = fake_source();
        let feature = AuthenticationFeature::new();
        let resources = ResponseResources::new();
        let headers = headers_with(headers::LEGACY_WINDOWS_AUTH_TOKEN, "1A2B");

        let principal = materialize_user(&headers, Some(&source), &resources, &feature, false);

        assert!(principal.is_some());
        assert!(feature.user().is_none());
        assert_eq!(resources.len(), 1);
    }
}
