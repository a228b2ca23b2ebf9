//! Cancellation utilities
//!
//! One [`CancelHandle`] threads through a whole turn: HTTP send, body read, decoding and
//! re-assembly all stop once it fires.

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::streaming::SegmentStream;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Wrapped streams drop their inner stream, which closes the
    /// underlying HTTP connection, and end with [`LlmError::Cancelled`].
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// A handle cancelled together with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Fail fast with [`LlmError::Cancelled`] if cancellation was already requested.
    pub fn check(&self) -> Result<(), LlmError> {
        if self.is_cancelled() {
            Err(LlmError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Await `fut` unless cancellation fires first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, LlmError>
    where
        F: std::future::Future<Output = Result<T, LlmError>>,
    {
        tokio::select! {
            _ = self.token.cancelled() => Err(LlmError::Cancelled),
            res = fut => res,
        }
    }
}

/// Stop `stream` as soon as `cancel` fires.
///
/// Once cancellation is observed the inner stream is dropped, releasing its connection,
/// and a single [`LlmError::Cancelled`] ends the stream.
pub fn make_cancellable_stream(stream: SegmentStream, cancel: &CancelHandle) -> SegmentStream {
    let token = cancel.token.clone();
    let mut inner = stream;
    let s = async_stream::stream! {
        use futures::StreamExt;
        if token.is_cancelled() {
            drop(inner);
            yield Err(LlmError::Cancelled);
            return;
        }
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    drop(inner);
                    yield Err(LlmError::Cancelled);
                    return;
                }
                item = inner.next() => {
                    let Some(item) = item else { break };
                    yield item;
                }
            }
        }
    };
    Box::pin(s)
}
