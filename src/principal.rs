//! Identities and principals exposed to downstream handlers.

use std::sync::Arc;

use crate::identity::WindowsIdentity;

/// A single authenticated (or anonymous) identity.
///
/// An identity is authenticated when it carries an authentication type.
/// Identities materialized from a forwarded Windows token keep a reference
/// to the [`WindowsIdentity`] so handlers can reach the token.
#[derive(Debug, Clone)]
pub struct Identity {
    name: Option<String>,
    authentication_type: Option<String>,
    windows: Option<Arc<WindowsIdentity>>,
}

impl Identity {
    /// Creates an identity authenticated by the given scheme.
    pub fn new(name: impl Into<String>, authentication_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            authentication_type: Some(authentication_type.into()),
            windows: None,
        }
    }

    /// Creates the unauthenticated placeholder identity.
    pub fn anonymous() -> Self {
        Self {
            name: None,
            authentication_type: None,
            windows: None,
        }
    }

    /// Creates an identity backed by a forwarded Windows token.
    pub fn windows(identity: Arc<WindowsIdentity>) -> Self {
        Self {
            name: Some(identity.name().to_string()),
            authentication_type: Some(identity.authentication_type().to_string()),
            windows: Some(identity),
        }
    }

    /// Returns the account name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the scheme that authenticated this identity.
    pub fn authentication_type(&self) -> Option<&str> {
        self.authentication_type.as_deref()
    }

    /// Returns `true` if the identity was authenticated by some scheme.
    pub fn is_authenticated(&self) -> bool {
        self.authentication_type
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Returns the Windows identity behind this identity, if any.
    pub fn windows_identity(&self) -> Option<&Arc<WindowsIdentity>> {
        self.windows.as_ref()
    }
}

// Windows-backed identities compare by token ownership, everything else by value.
impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        match (&self.windows, &other.windows) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => {
                self.name == other.name && self.authentication_type == other.authentication_type
            }
            _ => false,
        }
    }
}

impl Eq for Identity {}

/// The set of identities considered "the user" of a request.
///
/// # Examples
///
/// ```
/// use platform_handler::{Identity, Principal};
///
/// let cookie = Principal::new(Identity::new("alice", "Cookies"));
/// let bearer = Principal::new(Identity::new("alice@corp", "Bearer"));
///
/// let merged = Principal::merge(Some(&cookie), bearer.clone());
/// assert_eq!(merged.identities().len(), 2);
/// assert_eq!(merged.identity(), bearer.identity());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    identities: Vec<Identity>,
}

impl Principal {
    /// Creates a principal with a single identity.
    pub fn new(identity: Identity) -> Self {
        Self {
            identities: vec![identity],
        }
    }

    /// Creates a principal from several identities; the first is primary.
    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            identities: identities.into_iter().collect(),
        }
    }

    /// The principal of a request nobody authenticated.
    pub fn anonymous() -> Self {
        Self::new(Identity::anonymous())
    }

    /// Builds the principal for a materialized Windows identity.
    pub fn windows(identity: Arc<WindowsIdentity>) -> Self {
        Self::new(Identity::windows(identity))
    }

    /// Returns the primary identity.
    pub fn identity(&self) -> Option<&Identity> {
        self.identities.first()
    }

    /// Returns every identity in order.
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Returns `true` if any identity is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.identities.iter().any(Identity::is_authenticated)
    }

    /// Combines an existing principal with a newly authenticated one.
    ///
    /// The additional identities come first so they become primary; the
    /// existing identities follow. Without an existing principal the result
    /// is `additional` unchanged.
    pub fn merge(existing: Option<&Principal>, additional: Principal) -> Principal {
        let Some(existing) = existing else {
            return additional;
        };

        let mut identities = additional.identities;
        identities.extend(existing.identities.iter().cloned());
        Principal { identities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_is_not_authenticated() {
        let principal = Principal::anonymous();
        assert!(!principal.is_authenticated());
        assert_eq!(principal.identities().len(), 1);
        assert!(principal.identity().unwrap().name().is_none());
    }

    #[test]
    fn empty_authentication_type_is_not_authenticated() {
        assert!(!Identity::new("bob", "").is_authenticated());
        assert!(Identity::new("bob", "NTLM").is_authenticated());
    }

    #[test]
    fn merge_without_existing_returns_additional() {
        let additional = Principal::new(Identity::new("CORP\\bob", "Negotiate"));
        assert_eq!(Principal::merge(None, additional.clone()), additional);
    }

    #[test]
    fn merge_is_union_with_additional_first() {
        let existing = Principal::from_identities([
            Identity::new("bob", "Cookies"),
            Identity::new("bob@corp", "Bearer"),
        ]);
        let additional = Principal::new(Identity::new("CORP\\bob", "Negotiate"));

        let merged = Principal::merge(Some(&existing), additional);

        let names: Vec<_> = merged.identities().iter().map(|i| i.name()).collect();
        assert_eq!(
            names,
            vec![Some("CORP\\bob"), Some("bob"), Some("bob@corp")]
        );
    }
}
