//! Usage: Exactly-once resolution handle for an intercepted request.
//!
//! The content view keeps the [`PendingResponse`]; the async sequence owns the
//! [`Deferral`]. Completing consumes the deferral, and dropping it unresolved
//! resolves the pending side as cancelled, so a request can never hang or be
//! answered twice.

use super::error_code::InterceptErrorCode;
use super::response::WebResourceResponse;
use crate::shared::error::AppResult;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub type InterceptResult = AppResult<WebResourceResponse>;

pub fn deferral(request_id: u64) -> (Deferral, PendingResponse) {
    let (tx, rx) = oneshot::channel();
    (
        Deferral {
            request_id,
            tx: Some(tx),
        },
        PendingResponse { request_id, rx },
    )
}

#[derive(Debug)]
pub struct Deferral {
    request_id: u64,
    tx: Option<oneshot::Sender<InterceptResult>>,
}

impl Deferral {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Resolves the pending request. Returns `false` when the content view
    /// already stopped waiting for it.
    pub fn complete(mut self, result: InterceptResult) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    pub fn cancel(self, reason: &str) -> bool {
        self.complete(Err(InterceptErrorCode::Cancelled.error(reason.to_string())))
    }
}

impl Drop for Deferral {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::debug!(
                request_id = self.request_id,
                "deferral released without a response; cancelling"
            );
            let _ = tx.send(Err(InterceptErrorCode::Cancelled
                .error("request released before a response was produced")));
        }
    }
}

#[derive(Debug)]
pub struct PendingResponse {
    request_id: u64,
    rx: oneshot::Receiver<InterceptResult>,
}

impl PendingResponse {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl Future for PendingResponse {
    type Output = InterceptResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(
                InterceptErrorCode::Cancelled.error("deferral channel closed")
            )),
            Poll::Pending => Poll::Pending,
        }
    }
}
