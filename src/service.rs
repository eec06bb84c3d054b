//! Tower middleware that trusts and relays what the proxy forwarded.
//!
//! # Request flow
//!
//! ```text
//! request
//!   ↓
//! TrustGate::is_trusted ──no──▶ inner.call(request)            (untouched)
//!   ↓ yes
//! forward_client_certificate?   ──▶ install TlsConnection     (lazy parse)
//!   ↓
//! forward_windows_authentication? ─no─▶ inner.call(request)
//!   ↓ yes
//! materialize Windows user, register identity for disposal
//! attach PlatformAuthenticationHandler
//! inner.call(request).await
//! detach handler                                             (always)
//! release identity when the response body ends or is dropped
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use tower::{Layer, Service};

use crate::auth::{
    AuthenticationFeature, AuthenticationHandler, ChallengeStatus, PlatformAuthenticationHandler,
};
use crate::body::ReleaseBody;
use crate::gate::TrustGate;
use crate::identity::{self, TokenSource};
use crate::options::PlatformHandlerOptions;
use crate::resources::{ReleaseGuard, ResponseResources};
use crate::tls;

struct Shared {
    gate: TrustGate,
    options: Arc<PlatformHandlerOptions>,
    tokens: Option<Arc<dyn TokenSource>>,
}

/// Layer that wraps services with [`PlatformHandlerService`].
///
/// # Examples
///
/// ```
/// use platform_handler::{PlatformHandlerLayer, PlatformHandlerOptions, TrustGate};
///
/// let layer = PlatformHandlerLayer::new(TrustGate::from_env(), PlatformHandlerOptions::default());
/// # let _ = layer;
/// ```
#[derive(Clone)]
pub struct PlatformHandlerLayer {
    shared: Arc<Shared>,
}

impl PlatformHandlerLayer {
    /// Creates the layer using the platform's default token source.
    pub fn new(gate: TrustGate, options: PlatformHandlerOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate,
                options: Arc::new(options),
                tokens: identity::default_token_source(),
            }),
        }
    }

    /// Replaces the source used to take ownership of forwarded tokens.
    pub fn with_token_source(self, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate: self.shared.gate.clone(),
                options: Arc::clone(&self.shared.options),
                tokens: Some(tokens),
            }),
        }
    }

    /// The options this layer was built with.
    pub fn options(&self) -> &PlatformHandlerOptions {
        &self.shared.options
    }
}

impl std::fmt::Debug for PlatformHandlerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformHandlerLayer")
            .field("gate", &self.shared.gate)
            .field("options", &self.shared.options)
            .field("tokens", &self.shared.tokens)
            .finish()
    }
}

impl<S> Layer<S> for PlatformHandlerLayer {
    type Service = PlatformHandlerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PlatformHandlerService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Service that enriches trusted requests before calling `S`.
///
/// The inner service is called exactly once per request. Its errors pass
/// through unchanged. Its response body is wrapped in a [`ReleaseBody`] that
/// keeps the forwarded identity alive until the body is finished, and a
/// challenge answered by the platform handler sets the response status.
#[derive(Clone)]
pub struct PlatformHandlerService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for PlatformHandlerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<ReleaseBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let not_ready_inner = self.inner.clone();
        let mut ready_inner = std::mem::replace(&mut self.inner, not_ready_inner);

        Box::pin(async move {
            if !shared.gate.is_trusted(request.headers()) {
                return passthrough(ready_inner.call(request).await);
            }

            let options = &shared.options;
            if options.forward_client_certificate {
                let (mut parts, body) = request.into_parts();
                tls::install_forwarded_certificate(&parts.headers, &mut parts.extensions);
                request = Request::from_parts(parts, body);
            }

            if !options.forward_windows_authentication {
                return passthrough(ready_inner.call(request).await);
            }

            // Dropped on error or cancellation, otherwise moved into the body.
            let (resources, release) = response_resources(&mut request);

            let status = ChallengeStatus::default();
            let _attachment = {
                let feature = AuthenticationFeature::get_or_insert(request.extensions_mut());
                let user = identity::materialize_user(
                    request.headers(),
                    shared.tokens.as_ref(),
                    &resources,
                    &feature,
                    options.automatic_authentication,
                );
                let options = Arc::clone(options);
                let status = status.clone();
                feature.attach(move |prior| {
                    let node: Arc<dyn AuthenticationHandler> =
                        Arc::new(PlatformAuthenticationHandler::new(options, user, status, prior));
                    node
                })
            };

            let mut response = ready_inner.call(request).await?;
            if let Some(code) = status.take() {
                *response.status_mut() = code;
            }
            Ok(response.map(|body| ReleaseBody::new(body, release)))
        })
    }
}

fn passthrough<B, E>(result: Result<Response<B>, E>) -> Result<Response<ReleaseBody<B>>, E> {
    result.map(|response| response.map(ReleaseBody::passthrough))
}

/// Returns the request's disposal list, installing one when missing.
///
/// Only a list installed here is released here; an outer layer that
/// installed its own list releases it itself.
fn response_resources<B>(request: &mut Request<B>) -> (ResponseResources, Option<ReleaseGuard>) {
    if let Some(existing) = request.extensions().get::<ResponseResources>() {
        return (existing.clone(), None);
    }
    let resources = ResponseResources::new();
    request.extensions_mut().insert(resources.clone());
    let guard = resources.release_on_drop();
    (resources, Some(guard))
}
