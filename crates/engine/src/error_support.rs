//! Error/event support - routing of processing errors and pipeline events
//!
//! Dispatch order for a [`ProcessingError`]:
//! 1. registered handlers, in registration order, via `can_handle`
//! 2. the first handler that claims the error and returns `Ok` owns it
//! 3. a handler returning `Err` or panicking is reported as a warning to
//!    listeners and dispatch falls through to the policy
//! 4. otherwise the current [`ErrorPolicy`] is applied
//!
//! Listener notifications raised during a dispatch are queued per thread
//! and delivered once the outermost dispatch has released the read lock.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{ErrorCause, ErrorPolicy, MessageCause, ProcessingError, Severity};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::stats::PipelineStats;

/// Handler tried before the default policy
pub trait ProcessingErrorHandler: Send + Sync {
    /// Whether this handler wants the error
    fn can_handle(&self, error: &ProcessingError) -> bool;

    /// Handle a claimed error
    ///
    /// # Errors
    /// A failure here, returned or panicked, never aborts dispatch; it is
    /// reported as a warning and the default policy runs.
    fn handle(&self, error: &ProcessingError) -> Result<(), ErrorCause>;
}

/// Pipeline-specific retry logic used by [`ErrorPolicy::Retry`]
pub trait RetryHandler: Send + Sync {
    /// Retry the failed work
    ///
    /// # Errors
    /// Returning an error propagates the original failure to listeners.
    fn retry(&self, error: &ProcessingError) -> Result<(), ErrorCause>;
}

/// Pipeline-level listener
///
/// Both callbacks run with no pipeline lock held, so a listener may
/// reconfigure the pipeline it observes. `on_error` runs on the
/// dispatching thread after the outermost dispatch returns; `on_relink`
/// runs after the write lock is released.
pub trait PipelineListener: Send + Sync {
    fn on_error(&self, _pipeline: &str, _error: &ProcessingError) {}

    /// Called with the active processor names after every relink
    fn on_relink(&self, _pipeline: &str, _active: &[String]) {}
}

/// Outcome of dispatching one processing error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A registered handler took ownership
    Handled,
    /// Delivered to listeners (or logged when there are none)
    Propagated,
    /// Logged only
    Suppressed,
    /// Retry hook succeeded
    Retried,
    /// Escalated as fatal, pipeline terminated
    Terminated,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Propagated => "propagated",
            Self::Suppressed => "suppressed",
            Self::Retried => "retried",
            Self::Terminated => "terminated",
        }
    }
}

/// Error policy state, handlers and listeners of one pipeline
pub struct ErrorSupport {
    pipeline: String,
    policy: RwLock<ErrorPolicy>,
    handlers: RwLock<Vec<Arc<dyn ProcessingErrorHandler>>>,
    listeners: RwLock<Vec<Arc<dyn PipelineListener>>>,
    retry: RwLock<Option<Arc<dyn RetryHandler>>>,
    terminated: AtomicBool,
    stats: Arc<PipelineStats>,
}

impl fmt::Debug for ErrorSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSupport")
            .field("pipeline", &self.pipeline)
            .field("policy", &*self.policy.read())
            .field("handlers", &self.handlers.read().len())
            .field("listeners", &self.listeners.read().len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl ErrorSupport {
    pub(crate) fn new(pipeline: impl Into<String>, stats: Arc<PipelineStats>) -> Self {
        Self {
            pipeline: pipeline.into(),
            policy: RwLock::new(ErrorPolicy::default()),
            handlers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            retry: RwLock::new(None),
            terminated: AtomicBool::new(false),
            stats,
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        *self.policy.read()
    }

    pub fn set_policy(&self, policy: ErrorPolicy) {
        *self.policy.write() = policy;
    }

    pub fn add_handler(&self, handler: Arc<dyn ProcessingErrorHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn add_listener(&self, listener: Arc<dyn PipelineListener>) {
        self.listeners.write().push(listener);
    }

    pub fn set_retry_handler(&self, handler: Arc<dyn RetryHandler>) {
        *self.retry.write() = Some(handler);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Route one processing error
    pub fn dispatch(&self, error: ProcessingError) -> Disposition {
        self.stats.inc_processing_errors();

        let disposition = match self.try_handlers(&error) {
            Some(disposition) => disposition,
            None => self.apply_policy(error.clone()),
        };

        observability::record_processing_error(
            &self.pipeline,
            error.source_processor(),
            disposition.as_str(),
        );
        disposition
    }

    fn try_handlers(&self, error: &ProcessingError) -> Option<Disposition> {
        // Snapshot so handlers may register further handlers
        let handlers = self.handlers.read().clone();

        for handler in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                handler.can_handle(error).then(|| handler.handle(error))
            }));
            let result = match outcome {
                Ok(None) => continue,
                Ok(Some(result)) => result,
                Err(payload) => Err(MessageCause::shared(format!(
                    "error handler panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };
            match result {
                Ok(()) => {
                    debug!(
                        pipeline = %self.pipeline,
                        processor = error.source_processor(),
                        "Processing error handled"
                    );
                    return Some(Disposition::Handled);
                }
                Err(cause) => {
                    warn!(
                        pipeline = %self.pipeline,
                        processor = error.source_processor(),
                        error = %cause,
                        "Error handler failed, falling back to policy"
                    );
                    let report = ProcessingError::new(error.source_processor(), cause)
                        .with_severity(Severity::Warning)
                        .with_invocation_args(error.invocation_args().iter().cloned());
                    self.notify_error(&report);
                    return None;
                }
            }
        }
        None
    }

    fn apply_policy(&self, error: ProcessingError) -> Disposition {
        match self.policy() {
            ErrorPolicy::Propagate => self.propagate(&error),
            ErrorPolicy::Suppress => {
                warn!(
                    pipeline = %self.pipeline,
                    processor = error.source_processor(),
                    error = %error.cause(),
                    failed_data = ?error.failed_data(),
                    "Processing error suppressed"
                );
                Disposition::Suppressed
            }
            ErrorPolicy::Retry => {
                let retry = self.retry.read().clone();
                match retry {
                    Some(retry) => match retry.retry(&error) {
                        Ok(()) => Disposition::Retried,
                        Err(cause) => {
                            warn!(
                                pipeline = %self.pipeline,
                                processor = error.source_processor(),
                                error = %cause,
                                "Retry failed"
                            );
                            self.propagate(&error)
                        }
                    },
                    None => {
                        warn!(
                            pipeline = %self.pipeline,
                            "Retry policy without a retry handler, propagating"
                        );
                        self.propagate(&error)
                    }
                }
            }
            ErrorPolicy::Terminate => {
                self.terminated.store(true, Ordering::Release);
                let fatal = error.with_severity(Severity::Fatal);
                error!(
                    pipeline = %self.pipeline,
                    processor = fatal.source_processor(),
                    error = %fatal.cause(),
                    "Fatal processing error, pipeline terminated"
                );
                self.notify_error(&fatal);
                Disposition::Terminated
            }
        }
    }

    fn propagate(&self, error: &ProcessingError) -> Disposition {
        if !self.notify_error(error) {
            // Never swallowed: without listeners the error still surfaces
            error!(
                pipeline = %self.pipeline,
                processor = error.source_processor(),
                severity = %error.severity(),
                error = %error.cause(),
                failed_data = ?error.failed_data(),
                "Unhandled processing error"
            );
        }
        Disposition::Propagated
    }

    /// Returns false when no listener is registered
    fn notify_error(&self, error: &ProcessingError) -> bool {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return false;
        }

        let immediate = DEFERRED.with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            if deferred.depth == 0 {
                return Some(listeners);
            }
            deferred
                .pending
                .push((listeners, self.pipeline.clone(), error.clone()));
            None
        });
        if let Some(listeners) = immediate {
            for listener in &listeners {
                listener.on_error(&self.pipeline, error);
            }
        }
        true
    }

    pub(crate) fn notify_relink(&self, active: &[String]) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_relink(&self.pipeline, active);
        }
    }
}

type PendingError = (Vec<Arc<dyn PipelineListener>>, String, ProcessingError);

#[derive(Default)]
struct DeferredErrors {
    depth: usize,
    pending: Vec<PendingError>,
}

thread_local! {
    static DEFERRED: RefCell<DeferredErrors> = RefCell::new(DeferredErrors::default());
}

/// Marks the current thread as dispatching under a pipeline read lock
///
/// Must be entered before the lock is taken so that it is dropped after
/// the guard. Error notifications queued inside the outermost scope are
/// delivered when it ends.
pub(crate) struct DispatchScope(());

impl DispatchScope {
    pub(crate) fn enter() -> Self {
        DEFERRED.with(|deferred| deferred.borrow_mut().depth += 1);
        Self(())
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        let pending = DEFERRED.with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            deferred.depth -= 1;
            if deferred.depth == 0 {
                std::mem::take(&mut deferred.pending)
            } else {
                Vec::new()
            }
        });
        // a listener panicking during unwinding would abort
        if std::thread::panicking() {
            return;
        }
        for (listeners, pipeline, error) in pending {
            for listener in &listeners {
                listener.on_error(&pipeline, &error);
            }
        }
    }
}

/// Reports failures raised by one stage
///
/// Handed to stages through `StageContext::reporter`; cheap to clone into
/// the values a stage builds.
#[derive(Clone)]
pub struct ErrorReporter {
    processor: Arc<str>,
    support: Arc<ErrorSupport>,
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("processor", &self.processor)
            .finish()
    }
}

impl ErrorReporter {
    pub(crate) fn new(processor: &str, support: Arc<ErrorSupport>) -> Self {
        Self {
            processor: Arc::from(processor),
            support,
        }
    }

    pub fn processor(&self) -> &str {
        &self.processor
    }

    /// Dispatch a fully built error
    pub fn report(&self, error: ProcessingError) -> Disposition {
        self.support.dispatch(error)
    }

    /// Dispatch `cause` raised while processing `failed_data`
    pub fn fail<E, T>(&self, cause: E, failed_data: &T) -> Disposition
    where
        E: std::error::Error + Send + Sync + 'static,
        T: fmt::Debug + ?Sized,
    {
        let rendered = format!("{failed_data:?}");
        let error = ProcessingError::new(self.processor.as_ref(), Arc::new(cause))
            .with_invocation_args([rendered.clone()])
            .with_failed_data(rendered);
        self.report(error)
    }

    /// Whether the pipeline has been terminated by a fatal error
    pub fn is_terminated(&self) -> bool {
        self.support.is_terminated()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn support() -> Arc<ErrorSupport> {
        Arc::new(ErrorSupport::new("test", Arc::new(PipelineStats::new())))
    }

    fn sample_error() -> ProcessingError {
        ProcessingError::new("parse", MessageCause::shared("bad input")).with_failed_data("x")
    }

    #[derive(Default)]
    struct RecordingListener {
        errors: Mutex<Vec<(String, Severity)>>,
    }

    impl PipelineListener for RecordingListener {
        fn on_error(&self, _pipeline: &str, error: &ProcessingError) {
            self.errors
                .lock()
                .push((error.cause().to_string(), error.severity()));
        }
    }

    struct ClaimAll {
        fail: bool,
        seen: Mutex<u32>,
    }

    impl ProcessingErrorHandler for ClaimAll {
        fn can_handle(&self, _error: &ProcessingError) -> bool {
            true
        }

        fn handle(&self, _error: &ProcessingError) -> Result<(), ErrorCause> {
            *self.seen.lock() += 1;
            if self.fail {
                Err(MessageCause::shared("handler broke"))
            } else {
                Ok(())
            }
        }
    }

    struct ClaimNone;

    impl ProcessingErrorHandler for ClaimNone {
        fn can_handle(&self, _error: &ProcessingError) -> bool {
            false
        }

        fn handle(&self, _error: &ProcessingError) -> Result<(), ErrorCause> {
            panic!("must not be called");
        }
    }

    #[test]
    fn test_default_policy_propagates_to_listeners() {
        let support = support();
        let listener = Arc::new(RecordingListener::default());
        support.add_listener(listener.clone());

        assert_eq!(support.dispatch(sample_error()), Disposition::Propagated);
        assert_eq!(
            *listener.errors.lock(),
            [("bad input".to_string(), Severity::Error)]
        );
    }

    #[test]
    fn test_propagate_without_listeners_still_reports() {
        let support = support();
        assert_eq!(support.dispatch(sample_error()), Disposition::Propagated);
        assert_eq!(support.stats.processing_errors(), 1);
    }

    #[test]
    fn test_first_claiming_handler_wins() {
        let support = support();
        let first = Arc::new(ClaimAll {
            fail: false,
            seen: Mutex::new(0),
        });
        let second = Arc::new(ClaimAll {
            fail: false,
            seen: Mutex::new(0),
        });
        support.add_handler(Arc::new(ClaimNone));
        support.add_handler(first.clone());
        support.add_handler(second.clone());

        assert_eq!(support.dispatch(sample_error()), Disposition::Handled);
        assert_eq!(*first.seen.lock(), 1);
        assert_eq!(*second.seen.lock(), 0);
    }

    #[test]
    fn test_failing_handler_falls_back_to_policy() {
        let support = support();
        support.set_policy(ErrorPolicy::Suppress);
        let listener = Arc::new(RecordingListener::default());
        support.add_listener(listener.clone());
        support.add_handler(Arc::new(ClaimAll {
            fail: true,
            seen: Mutex::new(0),
        }));

        assert_eq!(support.dispatch(sample_error()), Disposition::Suppressed);
        // the handler failure itself reaches listeners as a warning
        assert_eq!(
            *listener.errors.lock(),
            [("handler broke".to_string(), Severity::Warning)]
        );
    }

    struct Panicking;

    impl ProcessingErrorHandler for Panicking {
        fn can_handle(&self, _error: &ProcessingError) -> bool {
            true
        }

        fn handle(&self, _error: &ProcessingError) -> Result<(), ErrorCause> {
            panic!("handler exploded");
        }
    }

    #[test]
    fn test_panicking_handler_falls_back_to_policy() {
        let support = support();
        support.set_policy(ErrorPolicy::Suppress);
        let listener = Arc::new(RecordingListener::default());
        support.add_listener(listener.clone());
        support.add_handler(Arc::new(Panicking));

        assert_eq!(support.dispatch(sample_error()), Disposition::Suppressed);
        assert_eq!(support.stats.processing_errors(), 1);
        assert_eq!(
            *listener.errors.lock(),
            [(
                "error handler panicked: handler exploded".to_string(),
                Severity::Warning
            )]
        );
    }

    #[test]
    fn test_notifications_wait_for_outermost_scope() {
        let support = support();
        let listener = Arc::new(RecordingListener::default());
        support.add_listener(listener.clone());

        let outer = DispatchScope::enter();
        let inner = DispatchScope::enter();
        assert_eq!(support.dispatch(sample_error()), Disposition::Propagated);
        drop(inner);
        assert!(listener.errors.lock().is_empty());

        drop(outer);
        assert_eq!(
            *listener.errors.lock(),
            [("bad input".to_string(), Severity::Error)]
        );
    }

    #[test]
    fn test_retry_policy() {
        struct Retry(bool);
        impl RetryHandler for Retry {
            fn retry(&self, _error: &ProcessingError) -> Result<(), ErrorCause> {
                if self.0 {
                    Ok(())
                } else {
                    Err(MessageCause::shared("still broken"))
                }
            }
        }

        let support = support();
        support.set_policy(ErrorPolicy::Retry);
        assert_eq!(support.dispatch(sample_error()), Disposition::Propagated);

        support.set_retry_handler(Arc::new(Retry(true)));
        assert_eq!(support.dispatch(sample_error()), Disposition::Retried);

        support.set_retry_handler(Arc::new(Retry(false)));
        assert_eq!(support.dispatch(sample_error()), Disposition::Propagated);
    }

    #[test]
    fn test_terminate_policy_escalates() {
        let support = support();
        support.set_policy(ErrorPolicy::Terminate);
        let listener = Arc::new(RecordingListener::default());
        support.add_listener(listener.clone());

        assert!(!support.is_terminated());
        assert_eq!(support.dispatch(sample_error()), Disposition::Terminated);
        assert!(support.is_terminated());
        assert_eq!(listener.errors.lock()[0].1, Severity::Fatal);
    }

    #[test]
    fn test_reporter_fail_renders_data() {
        let support = support();
        let listener = Arc::new(RecordingListener::default());
        support.add_listener(listener.clone());
        let reporter = ErrorReporter::new("upper", Arc::clone(&support));

        let disposition = reporter.fail(MessageCause("boom".into()), "payload");
        assert_eq!(disposition, Disposition::Propagated);
        assert_eq!(reporter.processor(), "upper");
        assert_eq!(listener.errors.lock().len(), 1);
    }
}
