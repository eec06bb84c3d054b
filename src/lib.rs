//! Trust and relay the request context a fronting platform proxy forwards.
//!
//! A reverse proxy that terminates TLS and Windows authentication in front
//! of this process forwards what it learned in request headers: the client
//! certificate, and a handle to the caller's logon token duplicated into
//! this process. A pairing token, shared through the environment, proves
//! the headers came from the proxy and not from the client.
//!
//! [`PlatformHandlerLayer`] is a tower layer that, for trusted requests:
//!
//! - installs a [`TlsConnection`] whose certificate is decoded on first use
//! - materializes the forwarded Windows identity as the request [`Principal`]
//! - attaches a [`PlatformAuthenticationHandler`] that answers challenges
//!   for the Windows schemes on behalf of the proxy
//! - releases the identity's token once the response body is finished
//!
//! Untrusted requests pass through untouched.
//!
//! # Examples
//!
//! ```
//! use http::{Request, Response};
//! use platform_handler::{current_user, PlatformHandlerLayer, PlatformHandlerOptions, TrustGate};
//! use tower::{service_fn, Layer};
//!
//! let layer = PlatformHandlerLayer::new(TrustGate::new("secret"), PlatformHandlerOptions::default());
//! let service = layer.layer(service_fn(|request: Request<()>| async move {
//!     let user = current_user(request.extensions());
//!     Ok::<_, std::convert::Infallible>(Response::new(user.is_authenticated()))
//! }));
//! # let _ = service;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod body;
mod error;
mod gate;
pub mod headers;
pub mod identity;
mod options;
mod principal;
mod resources;
mod service;
mod tls;

pub use auth::{
    current_user, AuthenticateContext, AuthenticationDescription, AuthenticationFeature,
    AuthenticationHandler, ChallengeBehavior, ChallengeContext, DescribeSchemesContext,
    HandlerAttachment, PlatformAuthenticationHandler, SignInContext, SignOutContext,
    AUTOMATIC_SCHEME,
};
pub use body::ReleaseBody;
pub use error::{CertificateError, Error, IdentityError, TokenOperation};
pub use gate::{PairingToken, TrustGate, PAIRING_TOKEN_VAR};
pub use options::PlatformHandlerOptions;
pub use principal::{Identity, Principal};
pub use resources::{Dispose, ResponseResources};
pub use service::{PlatformHandlerLayer, PlatformHandlerService};
pub use tls::{
    CertificateParser, ClientCertificate, ForwardedTlsConnection, TlsConnection,
    TlsConnectionFeature,
};
