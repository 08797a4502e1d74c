//! Explicit per-call context.
//!
//! Every lifecycle phase receives a [`CallCtx`] as an ordinary argument. It
//! carries the tracing span for the call, the cancellation token the platform
//! uses to abort an in-flight call, and the sink that forwards human readable
//! status lines back to the platform. There is no ambient logger: code that
//! needs one of these gets it from the context it was handed.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Receives status lines meant for the platform's log view.
pub trait StatusSink: Send + Sync {
    fn forward(&self, source: &str, line: &str);
}

/// Default sink: status lines become INFO events tagged `status = true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn forward(&self, source: &str, line: &str) {
        tracing::info!(source = %source, status = true, "{line}");
    }
}

#[derive(Clone)]
pub struct CallCtx {
    span: tracing::Span,
    cancel: CancellationToken,
    status: Arc<dyn StatusSink>,
}

impl fmt::Debug for CallCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCtx")
            .field("span", &self.span)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for CallCtx {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl CallCtx {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            span: tracing::Span::none(),
            cancel,
            status: Arc::new(TracingStatusSink),
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    /// Child context for one phase: same token and sink, nested span.
    #[must_use]
    pub fn for_phase(&self, service: &str, phase: &str) -> Self {
        let span = self
            .span
            .in_scope(|| tracing::info_span!("phase", service = %service, phase = %phase));
        Self {
            span,
            cancel: self.cancel.clone(),
            status: Arc::clone(&self.status),
        }
    }

    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forward a status line to the platform.
    pub fn status(&self, source: &str, line: &str) {
        self.status.forward(source, line);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl StatusSink for Collect {
        fn forward(&self, source: &str, line: &str) {
            self.0.lock().push(format!("{source}: {line}"));
        }
    }

    #[test]
    fn phase_context_shares_token_and_sink() {
        let sink = Arc::new(Collect::default());
        let root = CallCtx::default().with_status_sink(sink.clone());
        let phase = root.for_phase("shop/cache", "start");

        phase.status("shop/cache", "will run on: localhost:7000");
        root.cancellation().cancel();

        assert!(phase.is_cancelled());
        assert_eq!(
            sink.0.lock().as_slice(),
            ["shop/cache: will run on: localhost:7000"]
        );
    }
}
