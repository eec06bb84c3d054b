//! Response body that holds request resources until it is finished.

use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::resources::ReleaseGuard;

pin_project! {
    /// Body of responses produced by
    /// [`PlatformHandlerService`](crate::PlatformHandlerService).
    ///
    /// Wraps the inner service's body. Resources the platform handler
    /// registered for the request, such as a forwarded Windows token, stay
    /// alive while the body streams and are released once it yields its
    /// last frame or is dropped, whichever comes first.
    pub struct ReleaseBody<B> {
        #[pin]
        inner: B,
        release: Option<ReleaseGuard>,
    }
}

impl<B> ReleaseBody<B> {
    pub(crate) fn new(inner: B, release: Option<ReleaseGuard>) -> Self {
        Self { inner, release }
    }

    /// Wraps a body that holds nothing.
    pub(crate) fn passthrough(inner: B) -> Self {
        Self::new(inner, None)
    }

    /// Returns the wrapped body.
    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    /// Returns `true` once the request resources have been released, or if
    /// this body never held any.
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Releases the request resources and returns the wrapped body.
    pub fn into_inner(self) -> B {
        let Self { inner, release } = self;
        drop(release);
        inner
    }
}

impl<B: Body> Body for ReleaseBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));
        if frame.is_none() {
            drop(this.release.take());
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: fmt::Debug> fmt::Debug for ReleaseBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseBody")
            .field("inner", &self.inner)
            .field("released", &self.is_released())
            .finish()
    }
}
