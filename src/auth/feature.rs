use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use http::Extensions;

use super::handler::{
    AuthenticateContext, AuthenticationDescription, AuthenticationHandler, ChallengeBehavior,
    ChallengeContext, DescribeSchemesContext, SignInContext, SignOutContext,
};
use crate::error::Error;
use crate::principal::Principal;

type HandlerRef = Arc<dyn AuthenticationHandler>;

#[derive(Default)]
struct FeatureState {
    user: Option<Principal>,
    handler: Option<HandlerRef>,
}

/// Per-request authentication slot: the user and the active handler.
///
/// Lives in the request's [`Extensions`]. Clones share the same slot, so a
/// handle taken before the request moves downstream observes every change
/// made there.
///
/// # Examples
///
/// ```
/// use http::Request;
/// use platform_handler::{AuthenticationFeature, Identity, Principal};
///
/// let mut request = Request::new(());
/// let feature = AuthenticationFeature::get_or_insert(request.extensions_mut());
/// feature.set_user(Some(Principal::new(Identity::new("alice", "Cookies"))));
///
/// let seen = AuthenticationFeature::get(request.extensions()).unwrap();
/// assert_eq!(seen.user().unwrap().identity().unwrap().name(), Some("alice"));
/// ```
#[derive(Clone, Default)]
pub struct AuthenticationFeature {
    inner: Arc<Mutex<FeatureState>>,
}

impl AuthenticationFeature {
    /// Creates an empty slot not yet attached to any request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request's slot, if one was installed.
    pub fn get(extensions: &Extensions) -> Option<Self> {
        extensions.get::<Self>().cloned()
    }

    /// Returns the request's slot, installing an empty one when missing.
    pub fn get_or_insert(extensions: &mut Extensions) -> Self {
        extensions.get_or_insert_with(Self::new).clone()
    }

    /// Returns the authenticated user, if one was set.
    pub fn user(&self) -> Option<Principal> {
        self.lock().user.clone()
    }

    /// Replaces the authenticated user.
    pub fn set_user(&self, user: Option<Principal>) {
        self.lock().user = user;
    }

    /// Returns the active handler.
    pub fn handler(&self) -> Option<HandlerRef> {
        self.lock().handler.clone()
    }

    /// Replaces the active handler, returning the previous one.
    pub fn set_handler(&self, handler: Option<HandlerRef>) -> Option<HandlerRef> {
        std::mem::replace(&mut self.lock().handler, handler)
    }

    /// Makes a new handler active for the lifetime of the returned guard.
    ///
    /// `make` receives the currently active handler so the new one can
    /// delegate to it. Dropping the guard restores that handler.
    pub fn attach<F>(&self, make: F) -> HandlerAttachment
    where
        F: FnOnce(Option<HandlerRef>) -> HandlerRef,
    {
        let mut state = self.lock();
        let prior = state.handler.clone();
        state.handler = Some(make(prior.clone()));
        HandlerAttachment {
            slot: Arc::downgrade(&self.inner),
            prior,
        }
    }

    /// Collects the schemes the handler chain answers for.
    pub fn schemes(&self) -> Vec<AuthenticationDescription> {
        let mut context = DescribeSchemesContext::new();
        if let Some(handler) = self.handler() {
            handler.describe_schemes(&mut context);
        }
        context.into_descriptions()
    }

    /// Asks the handler chain who the user is for `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledScheme`] if no handler answered.
    pub fn authenticate(&self, scheme: &str) -> Result<AuthenticateContext, Error> {
        let mut context = AuthenticateContext::new(scheme);
        if let Some(handler) = self.handler() {
            handler.authenticate(&mut context);
        }
        accepted(context.is_accepted(), scheme)?;
        Ok(context)
    }

    /// Challenges the client through the handler chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledScheme`] if no handler answered.
    pub fn challenge(
        &self,
        scheme: &str,
        behavior: ChallengeBehavior,
    ) -> Result<ChallengeContext, Error> {
        let mut context = ChallengeContext::new(scheme, behavior);
        if let Some(handler) = self.handler() {
            handler.challenge(&mut context);
        }
        accepted(context.is_accepted(), scheme)?;
        Ok(context)
    }

    /// Signs `principal` in through the handler chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledScheme`] if no handler answered.
    pub fn sign_in(&self, scheme: &str, principal: Principal) -> Result<SignInContext, Error> {
        let mut context = SignInContext::new(scheme, principal);
        if let Some(handler) = self.handler() {
            handler.sign_in(&mut context);
        }
        accepted(context.is_accepted(), scheme)?;
        Ok(context)
    }

    /// Signs the user out through the handler chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnhandledScheme`] if no handler answered.
    pub fn sign_out(&self, scheme: &str) -> Result<SignOutContext, Error> {
        let mut context = SignOutContext::new(scheme);
        if let Some(handler) = self.handler() {
            handler.sign_out(&mut context);
        }
        accepted(context.is_accepted(), scheme)?;
        Ok(context)
    }

    fn lock(&self) -> MutexGuard<'_, FeatureState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn accepted(accepted: bool, scheme: &str) -> Result<(), Error> {
    if accepted {
        Ok(())
    } else {
        Err(Error::UnhandledScheme {
            scheme: scheme.to_string(),
        })
    }
}

impl fmt::Debug for AuthenticationFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AuthenticationFeature")
            .field("user", &state.user)
            .field("handler", &state.handler)
            .finish()
    }
}

/// Keeps a handler attached until dropped.
///
/// Dropping restores the handler that was active at attach time. If the
/// request and its slot are already gone, dropping does nothing.
#[must_use = "the handler is detached as soon as the attachment is dropped"]
pub struct HandlerAttachment {
    slot: Weak<Mutex<FeatureState>>,
    prior: Option<HandlerRef>,
}

impl Drop for HandlerAttachment {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
            state.handler = self.prior.take();
        }
    }
}

impl fmt::Debug for HandlerAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerAttachment")
            .field("prior", &self.prior)
            .finish()
    }
}

/// Returns the request user, or an anonymous principal when nobody is
/// signed in.
///
/// This never returns "no user", so it cannot tell an anonymous request
/// from one without authentication; use [`AuthenticationFeature::user`]
/// for that.
pub fn current_user(extensions: &Extensions) -> Principal {
    AuthenticationFeature::get(extensions)
        .and_then(|feature| feature.user())
        .unwrap_or_else(Principal::anonymous)
}
