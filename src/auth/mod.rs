//! Per-request authentication handler chain.
//!
//! Downstream code reaches authentication through the request's
//! [`AuthenticationFeature`]: it asks who the user is, challenges the
//! client, or signs users in and out. Each call goes to the currently
//! active [`AuthenticationHandler`], which answers for its own schemes and
//! forwards to the handler that was active before it.
//!
//! The platform handler pushes a [`PlatformAuthenticationHandler`] for the
//! duration of the downstream call so challenges for the Windows schemes
//! are answered on behalf of the proxy:
//!
//! ```text
//! feature.handler ──▶ PlatformAuthenticationHandler ──prior──▶ (outer handler) ──▶ …
//! ```

mod feature;
mod handler;
mod platform;

pub use feature::{current_user, AuthenticationFeature, HandlerAttachment};
pub use handler::{
    AuthenticateContext, AuthenticationDescription, AuthenticationHandler, ChallengeBehavior,
    ChallengeContext, DescribeSchemesContext, SignInContext, SignOutContext, AUTOMATIC_SCHEME,
};
pub use platform::PlatformAuthenticationHandler;

pub(crate) use platform::ChallengeStatus;
