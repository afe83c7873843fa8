//! Usage: Request interceptor: defer matching requests, inject the bearer token on the UI
//! context, forward, and hand the translated response back.

use super::bearer::attach_bearer;
use super::deferral::{deferral, Deferral, InterceptResult, PendingResponse};
use super::dispatcher::{UiDispatcher, UiTask};
use super::filter::{RequestFilter, ResourceContext};
use super::forwarder::HttpForwarder;
use super::request::WebResourceRequest;
use super::translate;
use crate::auth::provider::{InteractiveContext, TokenSupplier};
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// Outcome of offering a request to the interceptor.
#[derive(Debug)]
pub enum Interception {
    /// Not matched by the filter; handed back untouched.
    Passthrough(WebResourceRequest),
    /// Matched and suspended; resolves exactly once with the response or a failure.
    Deferred(PendingResponse),
}

/// Per-request progress, reported through tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptStage {
    Matched,
    Deferred,
    Dispatching,
    TokenPending,
    Forwarding,
    Translating,
    Completed,
    Failed,
    Cancelled,
}

impl InterceptStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Deferred => "deferred",
            Self::Dispatching => "dispatching",
            Self::TokenPending => "token_pending",
            Self::Forwarding => "forwarding",
            Self::Translating => "translating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn after_failure(err: &AppError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Failed
        }
    }
}

#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<Inner>,
}

struct Inner {
    filter: RequestFilter,
    supplier: Arc<dyn TokenSupplier>,
    forwarder: Arc<dyn HttpForwarder>,
    dispatcher: Arc<dyn UiDispatcher>,
    interactive: InteractiveContext,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("filter", &self.inner.filter)
            .field("interactive", &self.inner.interactive)
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    pub fn new(
        filter: RequestFilter,
        supplier: Arc<dyn TokenSupplier>,
        forwarder: Arc<dyn HttpForwarder>,
        dispatcher: Arc<dyn UiDispatcher>,
        interactive: InteractiveContext,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                filter,
                supplier,
                forwarder,
                dispatcher,
                interactive,
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn filter(&self) -> &RequestFilter {
        &self.inner.filter
    }

    /// Offers one outbound content-view request.
    ///
    /// Never blocks: a matching request is deferred and its token/forward sequence is
    /// queued on the UI dispatcher. If the dispatcher refuses the work, the returned
    /// pending response resolves as cancelled.
    pub fn intercept(&self, request: WebResourceRequest, context: ResourceContext) -> Interception {
        if !self.inner.filter.matches(&request.uri, context) {
            return Interception::Passthrough(request);
        }

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!(
            "intercept",
            request_id,
            method = %request.method,
            uri = %request.uri,
            context = context.as_str(),
        );
        span.in_scope(|| tracing::debug!(stage = InterceptStage::Matched.as_str(), "request matched filter"));

        let (deferral, pending) = deferral(request_id);
        span.in_scope(|| tracing::trace!(stage = InterceptStage::Deferred.as_str(), "deferral taken"));

        let inner = Arc::clone(&self.inner);
        let task: UiTask = Box::pin(
            async move {
                inner.run(deferral, request).await;
            }
            .instrument(span.clone()),
        );

        if !self.inner.dispatcher.try_enqueue(task) {
            // The rejected task owned the deferral; dropping it resolved the request as cancelled.
            span.in_scope(|| {
                tracing::warn!(
                    stage = InterceptStage::Cancelled.as_str(),
                    "ui dispatcher unavailable; request cancelled"
                )
            });
        }

        Interception::Deferred(pending)
    }
}

impl Inner {
    async fn run(&self, deferral: Deferral, request: WebResourceRequest) {
        let result = self.forward(request).await;
        let stage = match &result {
            Ok(_) => InterceptStage::Completed,
            Err(err) => InterceptStage::after_failure(err),
        };

        match &result {
            Ok(response) => tracing::debug!(
                stage = stage.as_str(),
                status = response.status(),
                "intercepted request completed"
            ),
            Err(err) => tracing::warn!(
                stage = stage.as_str(),
                error_code = err.code(),
                "intercepted request failed: {}",
                err.message()
            ),
        }

        if !deferral.complete(result) {
            tracing::debug!("content view stopped waiting before the response was ready");
        }
    }

    async fn forward(&self, request: WebResourceRequest) -> InterceptResult {
        tracing::trace!(stage = InterceptStage::Dispatching.as_str(), "running on ui context");
        let mut http_request = translate::to_http_request(request)?;

        tracing::trace!(stage = InterceptStage::TokenPending.as_str(), "acquiring token");
        let token = self.supplier.get_token(&self.interactive).await?;
        attach_bearer(http_request.headers_mut(), &token)?;

        tracing::trace!(stage = InterceptStage::Forwarding.as_str(), "forwarding request");
        let response = self.forwarder.send(http_request).await?;

        tracing::trace!(stage = InterceptStage::Translating.as_str(), "translating response");
        translate::to_web_resource_response(response).await
    }
}
