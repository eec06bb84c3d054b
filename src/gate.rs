use std::fmt;

use http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::headers::PAIRING_TOKEN;

/// Environment variable the hosting proxy uses to hand over the pairing token.
pub const PAIRING_TOKEN_VAR: &str = "HTTP_PLATFORM_TOKEN";

/// The shared secret the proxy attaches to every request it forwards.
///
/// Debug and Display output is always `[REDACTED]`; the value is only
/// reachable through [`expose_secret`](Self::expose_secret).
// Do NOT derive Debug or Display: the token must never reach a log line.
#[derive(Clone, Default)]
pub struct PairingToken {
    inner: String,
}

impl PairingToken {
    /// Wraps a token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Returns `true` when no token was configured.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Explicitly exposes the token value.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for PairingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for PairingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Decides whether a request's forwarded headers can be trusted.
///
/// The gate is built once at startup and never changes afterwards. A gate
/// without a token rejects every request, which leaves the whole platform
/// handler inert.
///
/// # Examples
///
/// ```
/// use http::{HeaderMap, HeaderValue};
/// use platform_handler::{headers, TrustGate};
///
/// let gate = TrustGate::new("secret");
///
/// let mut forwarded = HeaderMap::new();
/// forwarded.insert(headers::PAIRING_TOKEN, HeaderValue::from_static("secret"));
/// assert!(gate.is_trusted(&forwarded));
///
/// let mut spoofed = HeaderMap::new();
/// spoofed.insert(headers::PAIRING_TOKEN, HeaderValue::from_static("SECRET"));
/// assert!(!gate.is_trusted(&spoofed));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TrustGate {
    token: PairingToken,
}

impl TrustGate {
    /// Creates a gate expecting the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: PairingToken::new(token),
        }
    }

    /// Creates a gate that never trusts anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Reads the token from [`PAIRING_TOKEN_VAR`].
    pub fn from_env() -> Self {
        Self::from_env_var(PAIRING_TOKEN_VAR)
    }

    /// Reads the token from the named environment variable.
    ///
    /// A missing or non-Unicode variable yields a disabled gate.
    pub fn from_env_var(name: &str) -> Self {
        match std::env::var(name) {
            Ok(token) => {
                tracing::debug!(var = name, empty = token.is_empty(), "pairing token loaded");
                Self::new(token)
            }
            Err(_) => {
                tracing::debug!(var = name, "pairing token not set, forwarding disabled");
                Self::disabled()
            }
        }
    }

    /// Returns `true` when the gate has a token and can ever pass a request.
    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }

    /// Checks the pairing header against the configured token.
    ///
    /// The comparison is exact over the bytes: no trimming, no case folding.
    /// A repeated header is never trusted.
    pub fn is_trusted(&self, headers: &HeaderMap) -> bool {
        if self.token.is_empty() {
            tracing::trace!("no pairing token configured, skipping forwarded headers");
            return false;
        }

        let mut values = headers.get_all(PAIRING_TOKEN).iter();
        let presented = match (values.next(), values.next()) {
            (Some(value), None) => value.as_bytes(),
            (None, _) => &[][..],
            (Some(_), Some(_)) => {
                tracing::trace!(header = %PAIRING_TOKEN, "pairing header repeated, skipping forwarded headers");
                return false;
            }
        };

        let expected = self.token.expose_secret().as_bytes();
        let trusted = bool::from(presented.ct_eq(expected));
        if !trusted {
            tracing::trace!(
                header = %PAIRING_TOKEN,
                present = !presented.is_empty(),
                "pairing header does not match, skipping forwarded headers"
            );
        }
        trusted
    }
}
