use std::sync::{Arc, Mutex, PoisonError};

use http::StatusCode;

use super::handler::{
    AuthenticateContext, AuthenticationHandler, ChallengeBehavior, ChallengeContext,
    DescribeSchemesContext, SignInContext, SignOutContext, AUTOMATIC_SCHEME,
};
use crate::options::PlatformHandlerOptions;
use crate::principal::Principal;

/// Response status requested by a challenge during the downstream call.
///
/// Shared between the handler node and the service, which applies it to
/// the response once the downstream call returns.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChallengeStatus {
    inner: Arc<Mutex<Option<StatusCode>>>,
}

impl ChallengeStatus {
    pub(crate) fn set(&self, status: StatusCode) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub(crate) fn take(&self) -> Option<StatusCode> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Handler node the platform handler pushes for each trusted request.
///
/// Answers for the configured Windows schemes on behalf of the proxy and
/// hands everything else to the handler that was active before it.
#[derive(Debug)]
pub struct PlatformAuthenticationHandler {
    options: Arc<PlatformHandlerOptions>,
    user: Option<Principal>,
    status: ChallengeStatus,
    prior: Option<Arc<dyn AuthenticationHandler>>,
}

impl PlatformAuthenticationHandler {
    pub(crate) fn new(
        options: Arc<PlatformHandlerOptions>,
        user: Option<Principal>,
        status: ChallengeStatus,
        prior: Option<Arc<dyn AuthenticationHandler>>,
    ) -> Self {
        Self {
            options,
            user,
            status,
            prior,
        }
    }

    /// The Windows user forwarded with this request, if any.
    pub fn user(&self) -> Option<&Principal> {
        self.user.as_ref()
    }

    /// The handler this node delegates to.
    pub fn prior(&self) -> Option<&Arc<dyn AuthenticationHandler>> {
        self.prior.as_ref()
    }

    fn handles(&self, scheme: &str) -> bool {
        (self.options.automatic_authentication && scheme == AUTOMATIC_SCHEME)
            || self
                .options
                .authentication_descriptions
                .iter()
                .any(|d| d.authentication_scheme == scheme)
    }
}

impl AuthenticationHandler for PlatformAuthenticationHandler {
    fn describe_schemes(&self, context: &mut DescribeSchemesContext) {
        for description in &self.options.authentication_descriptions {
            context.accept(description.clone());
        }
        if let Some(prior) = &self.prior {
            prior.describe_schemes(context);
        }
    }

    fn authenticate(&self, context: &mut AuthenticateContext) {
        if self.handles(context.scheme()) {
            match &self.user {
                Some(user) => {
                    let kind = user.identity().and_then(|i| i.authentication_type());
                    let description = self
                        .options
                        .authentication_descriptions
                        .iter()
                        .find(|d| Some(d.authentication_scheme.as_str()) == kind)
                        .cloned();
                    context.authenticated(user.clone(), description);
                }
                None => context.not_authenticated(),
            }
        }
        if let Some(prior) = &self.prior {
            prior.authenticate(context);
        }
    }

    fn challenge(&self, context: &mut ChallengeContext) {
        let mut handled = false;
        if self.handles(context.scheme()) {
            let behavior = match context.behavior() {
                ChallengeBehavior::Automatic if self.user.is_none() => {
                    ChallengeBehavior::Unauthorized
                }
                ChallengeBehavior::Automatic => ChallengeBehavior::Forbidden,
                other => other,
            };
            match behavior {
                // The proxy adds the WWW-Authenticate headers itself.
                ChallengeBehavior::Unauthorized => self.status.set(StatusCode::UNAUTHORIZED),
                _ => {
                    self.status.set(StatusCode::FORBIDDEN);
                    handled = true;
                }
            }
            tracing::debug!(scheme = context.scheme(), ?behavior, "challenge answered for proxy");
            context.accept();
        }
        if !handled {
            if let Some(prior) = &self.prior {
                prior.challenge(context);
            }
        }
    }

    fn sign_in(&self, context: &mut SignInContext) {
        if let Some(prior) = &self.prior {
            prior.sign_in(context);
        }
    }

    fn sign_out(&self, context: &mut SignOutContext) {
        if let Some(prior) = &self.prior {
            prior.sign_out(context);
        }
    }
}
