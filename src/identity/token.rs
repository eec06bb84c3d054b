//! Ownership of forwarded OS token handles.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::IdentityError;
use crate::resources::Dispose;

/// A raw token handle value as relayed by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawToken(u64);

impl RawToken {
    /// Wraps a handle value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the handle value.
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#X}", self.0)
    }
}

/// The account a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    /// Account name, usually `DOMAIN\user`
    pub name: String,
    /// Scheme that produced the logon, e.g. `Negotiate` or `NTLM`
    pub authentication_type: String,
}

/// Narrow access to the OS token API.
///
/// Implementations must not close anything on their own; ownership is
/// managed by [`acquire_identity`] and [`WindowsIdentity`].
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Duplicates `raw` and returns the new handle.
    fn duplicate(&self, raw: RawToken) -> Result<RawToken, IdentityError>;

    /// Closes a handle.
    fn close(&self, raw: RawToken);

    /// Resolves the account a token belongs to.
    fn account(&self, token: RawToken) -> Result<TokenAccount, IdentityError>;
}

/// Closes a handle when dropped.
struct CloseOnDrop<'a> {
    source: &'a dyn TokenSource,
    raw: RawToken,
}

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.source.close(self.raw);
    }
}

/// A duplicated handle this process owns.
struct OwnedToken {
    raw: RawToken,
    source: Arc<dyn TokenSource>,
}

impl Drop for OwnedToken {
    fn drop(&mut self) {
        tracing::trace!(handle = %self.raw, "closing duplicated token");
        self.source.close(self.raw);
    }
}

/// Duplicates a forwarded handle into an owned identity.
///
/// The forwarded handle `raw` is closed before this returns on every path,
/// including when duplication or the account lookup fails. The duplicate is
/// owned by the returned identity, or closed here if the lookup fails.
pub fn acquire_identity(
    source: &Arc<dyn TokenSource>,
    raw: RawToken,
) -> Result<WindowsIdentity, IdentityError> {
    let _original = CloseOnDrop {
        source: source.as_ref(),
        raw,
    };

    let duplicate = OwnedToken {
        raw: source.duplicate(raw)?,
        source: Arc::clone(source),
    };
    let account = source.account(duplicate.raw)?;

    tracing::debug!(handle = %raw, duplicate = %duplicate.raw, account = %account.name, "acquired forwarded identity");

    Ok(WindowsIdentity {
        account,
        token: Mutex::new(Some(duplicate)),
    })
}

/// An identity bound to a duplicated Windows token.
///
/// The token is closed by [`dispose`](Dispose::dispose) or on drop,
/// whichever happens first. Name and authentication type stay readable
/// after disposal.
pub struct WindowsIdentity {
    account: TokenAccount,
    token: Mutex<Option<OwnedToken>>,
}

impl WindowsIdentity {
    /// Returns the account name.
    pub fn name(&self) -> &str {
        &self.account.name
    }

    /// Returns the authentication scheme of the logon.
    pub fn authentication_type(&self) -> &str {
        &self.account.authentication_type
    }

    /// Returns the duplicated handle, or `None` once disposed.
    pub fn token(&self) -> Option<RawToken> {
        self.lock().as_ref().map(|t| t.raw)
    }

    /// Returns `true` once the token has been closed.
    pub fn is_disposed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OwnedToken>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispose for WindowsIdentity {
    fn dispose(&self) {
        // Take under the lock, close outside it.
        let token = self.lock().take();
        drop(token);
    }
}

impl fmt::Debug for WindowsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowsIdentity")
            .field("name", &self.account.name)
            .field("authentication_type", &self.account.authentication_type)
            .field("token", &self.token())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Event, FakeTokens, DUPLICATE_OFFSET};
    use super::*;

    fn source(fake: FakeTokens) -> (Arc<FakeTokens>, Arc<dyn TokenSource>) {
        let fake = Arc::new(fake);
        let source: Arc<dyn TokenSource> = fake.clone();
        (fake, source)
    }

    #[test]
    fn original_is_closed_after_duplication() {
        let (fake, source) = source(FakeTokens::default());

        let identity = acquire_identity(&source, RawToken::new(0x1A2B)).unwrap();

        assert_eq!(
            fake.events(),
            vec![
                Event::Duplicated {
                    from: 0x1A2B,
                    to: 0x1A2B + DUPLICATE_OFFSET
                },
                Event::Closed(0x1A2B),
            ]
        );
        assert_eq!(identity.name(), "CORP\\user1a2b");
        assert_eq!(identity.token(), Some(RawToken::new(0x1A2B + DUPLICATE_OFFSET)));
    }

    #[test]
    fn original_is_closed_when_duplication_fails() {
        let (fake, source) = source(FakeTokens {
            fail_duplicate: true,
            ..FakeTokens::default()
        });

        let err = acquire_identity(&source, RawToken::new(0x10)).unwrap_err();

        assert_eq!(err.code, Some(6));
        assert_eq!(fake.events(), vec![Event::Closed(0x10)]);
    }

    #[test]
    fn both_handles_closed_when_account_lookup_fails() {
        let (fake, source) = source(FakeTokens {
            fail_account: true,
            ..FakeTokens::default()
        });

        assert!(acquire_identity(&source, RawToken::new(0x10)).is_err());

        assert_eq!(fake.duplicates(), 1);
        assert_eq!(fake.closed(0x10), 1);
        assert_eq!(fake.closed(0x10 + DUPLICATE_OFFSET), 1);
    }

    #[test]
    fn dispose_closes_duplicate_exactly_once() {
        let (fake, source) = source(FakeTokens::default());
        let identity = acquire_identity(&source, RawToken::new(0x20)).unwrap();

        identity.dispose();
        identity.dispose();
        drop(identity);

        assert_eq!(fake.closed(0x20 + DUPLICATE_OFFSET), 1);
    }

    #[test]
    fn drop_closes_undisposed_duplicate() {
        let (fake, source) = source(FakeTokens::default());
        let identity = acquire_identity(&source, RawToken::new(0x30)).unwrap();
        assert!(!identity.is_disposed());

        drop(identity);

        assert_eq!(fake.closed(0x30 + DUPLICATE_OFFSET), 1);
    }

    #[test]
    fn disposed_identity_keeps_account() {
        let (_fake, source) = source(FakeTokens::default());
        let identity = acquire_identity(&source, RawToken::new(0x40)).unwrap();

        identity.dispose();

        assert!(identity.is_disposed());
        assert_eq!(identity.token(), None);
        assert_eq!(identity.authentication_type(), "Negotiate");
    }

    #[test]
    fn raw_token_displays_as_hex() {
        assert_eq!(RawToken::new(0x1A2B).to_string(), "0x1A2B");
    }
}
