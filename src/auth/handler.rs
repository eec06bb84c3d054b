use std::fmt;

use serde::Deserialize;

use crate::principal::Principal;

/// Scheme name that asks whichever handlers authenticate automatically.
pub const AUTOMATIC_SCHEME: &str = "Automatic";

/// A scheme an authentication handler answers for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationDescription {
    /// Scheme name, compared ordinally
    pub authentication_scheme: String,
    /// Optional name for sign-in pickers
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AuthenticationDescription {
    /// Describes a scheme without a display name.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            authentication_scheme: scheme.into(),
            display_name: None,
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// How a challenge should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeBehavior {
    /// Unauthorized without a user, forbidden with one
    Automatic,
    /// Ask the client to authenticate
    Unauthorized,
    /// The user is known but not allowed
    Forbidden,
}

/// One link in a request's chain of authentication handlers.
///
/// Every operation gets a mutable context; handlers accept what they own
/// and pass the context on to the handler that was active before them.
pub trait AuthenticationHandler: Send + Sync + fmt::Debug {
    /// Lists the schemes this handler answers for.
    fn describe_schemes(&self, context: &mut DescribeSchemesContext);

    /// Reports the user for a scheme.
    fn authenticate(&self, context: &mut AuthenticateContext);

    /// Challenges the client for a scheme.
    fn challenge(&self, context: &mut ChallengeContext);

    /// Signs a principal in.
    fn sign_in(&self, context: &mut SignInContext);

    /// Signs the current user out.
    fn sign_out(&self, context: &mut SignOutContext);
}

/// Collects scheme descriptions from the chain.
#[derive(Debug, Default)]
pub struct DescribeSchemesContext {
    descriptions: Vec<AuthenticationDescription>,
}

impl DescribeSchemesContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a description.
    pub fn accept(&mut self, description: AuthenticationDescription) {
        self.descriptions.push(description);
    }

    /// Returns the collected descriptions.
    pub fn descriptions(&self) -> &[AuthenticationDescription] {
        &self.descriptions
    }

    /// Consumes the context.
    pub fn into_descriptions(self) -> Vec<AuthenticationDescription> {
        self.descriptions
    }
}

/// Result of asking the chain who the user is for a scheme.
#[derive(Debug)]
pub struct AuthenticateContext {
    scheme: String,
    accepted: bool,
    principal: Option<Principal>,
    description: Option<AuthenticationDescription>,
}

impl AuthenticateContext {
    /// Creates a context for the given scheme.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            accepted: false,
            principal: None,
            description: None,
        }
    }

    /// The scheme being authenticated.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Records an authenticated user.
    pub fn authenticated(
        &mut self,
        principal: Principal,
        description: Option<AuthenticationDescription>,
    ) {
        self.accepted = true;
        self.principal = Some(principal);
        self.description = description;
    }

    /// Records that the scheme is handled but nobody is signed in.
    pub fn not_authenticated(&mut self) {
        self.accepted = true;
    }

    /// Returns `true` if any handler answered.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// The authenticated user, if any.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The description of the scheme that authenticated the user.
    pub fn description(&self) -> Option<&AuthenticationDescription> {
        self.description.as_ref()
    }

    /// Consumes the context, returning the user.
    pub fn into_principal(self) -> Option<Principal> {
        self.principal
    }
}

/// A challenge travelling down the chain.
#[derive(Debug)]
pub struct ChallengeContext {
    scheme: String,
    behavior: ChallengeBehavior,
    accepted: bool,
}

impl ChallengeContext {
    /// Creates a challenge for the given scheme.
    pub fn new(scheme: impl Into<String>, behavior: ChallengeBehavior) -> Self {
        Self {
            scheme: scheme.into(),
            behavior,
            accepted: false,
        }
    }

    /// The scheme being challenged.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The requested behavior.
    pub fn behavior(&self) -> ChallengeBehavior {
        self.behavior
    }

    /// Marks the challenge handled.
    pub fn accept(&mut self) {
        self.accepted = true;
    }

    /// Returns `true` if any handler answered.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }
}

/// A sign-in travelling down the chain.
#[derive(Debug)]
pub struct SignInContext {
    scheme: String,
    principal: Principal,
    accepted: bool,
}

impl SignInContext {
    /// Creates a sign-in for the given scheme and user.
    pub fn new(scheme: impl Into<String>, principal: Principal) -> Self {
        Self {
            scheme: scheme.into(),
            principal,
            accepted: false,
        }
    }

    /// The scheme being signed in to.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The user being signed in.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Marks the sign-in handled.
    pub fn accept(&mut self) {
        self.accepted = true;
    }

    /// Returns `true` if any handler answered.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }
}

/// A sign-out travelling down the chain.
#[derive(Debug)]
pub struct SignOutContext {
    scheme: String,
    accepted: bool,
}

impl SignOutContext {
    /// Creates a sign-out for the given scheme.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            accepted: false,
        }
    }

    /// The scheme being signed out of.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Marks the sign-out handled.
    pub fn accept(&mut self) {
        self.accepted = true;
    }

    /// Returns `true` if any handler answered.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }
}
