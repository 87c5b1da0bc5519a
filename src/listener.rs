//! Captures unhandled errors during a request or command and reports them when it completes.
//!
//! A host adapter creates one [`Lifecycle`] per request or command, forwards error
//! notifications to [`Lifecycle::on_error`] and finishes with [`Lifecycle::on_complete`].
//! Lifecycles own a clone of the reporter, so they can move into the task serving the request.
//! Wrap reporters which are expensive to clone in an [`Arc`](std::sync::Arc):
//!
//! ```
//! use google_cloud_error_reporting::{
//!     CapturedError, CompletionEvent, ErrorEvent, ErrorReporter, HttpRequestInfo,
//!     ReportErrorListener, ReportOptions,
//! };
//! use http::{Method, Uri};
//!
//! #[derive(Clone)]
//! struct PrintReporter;
//!
//! impl ErrorReporter for PrintReporter {
//!     fn report(&self, error: &CapturedError, _options: ReportOptions) -> bool {
//!         println!("{}", error);
//!         true
//!     }
//! }
//!
//! let listener = ReportErrorListener::new(PrintReporter);
//! let mut lifecycle = listener.lifecycle();
//! lifecycle.on_error(ErrorEvent::Exception(CapturedError::from_parts("app::Error", "boom")));
//! let reported = lifecycle.on_complete(CompletionEvent::Http {
//!     request: HttpRequestInfo::new(Method::GET, Uri::from_static("https://x/y")),
//!     status: 500,
//! });
//! assert!(reported);
//! ```

use crate::{CapturedError, Config, ErrorReporter, HttpRequestInfo, ReportOptions, RequestSource};

/// Priority of the error channels. Runs before listeners which turn errors into responses.
pub const EXCEPTION_PRIORITY: i32 = 2048;

/// Priority of the completion channels.
pub const TERMINATE_PRIORITY: i32 = 0;

/// Notification channels a host adapter subscribes the listener to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// An exception escaped a request handler.
    KernelException,
    /// An error escaped a request handler. Hosts which distinguish errors from exceptions send
    /// both.
    KernelError,
    /// The response was sent.
    KernelTerminate,
    /// A command failed with an error.
    ConsoleError,
    /// A command finished.
    ConsoleTerminate,
}

impl Channel {
    /// Name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::KernelException => "kernel.exception",
            Channel::KernelError => "kernel.error",
            Channel::KernelTerminate => "kernel.terminate",
            Channel::ConsoleError => "console.error",
            Channel::ConsoleTerminate => "console.terminate",
        }
    }
}

/// An error observed during a lifecycle.
#[derive(Debug)]
pub enum ErrorEvent {
    /// From [`Channel::KernelException`].
    Exception(CapturedError),
    /// From [`Channel::KernelError`].
    Error(CapturedError),
    /// From [`Channel::ConsoleError`].
    Console(CapturedError),
}

impl ErrorEvent {
    /// The captured error.
    pub fn into_error(self) -> CapturedError {
        match self {
            ErrorEvent::Exception(error) | ErrorEvent::Error(error) | ErrorEvent::Console(error) => {
                error
            }
        }
    }
}

/// The end of a lifecycle.
#[derive(Debug)]
pub enum CompletionEvent {
    /// A response was sent for the request.
    Http {
        /// The request.
        request: HttpRequestInfo,
        /// Status code of the response.
        status: u16,
    },
    /// A command finished.
    Console {
        /// Exit code of the command.
        exit_code: i32,
    },
}

/// Reports the last error captured during a request or command.
#[derive(Debug)]
pub struct ReportErrorListener<R> {
    reporter: R,
}

impl<R: ErrorReporter> ReportErrorListener<R> {
    /// Create a listener reporting with the given reporter.
    pub fn new(reporter: R) -> Self {
        ReportErrorListener { reporter }
    }

    /// Channels and priorities to subscribe to.
    pub fn subscribed_events() -> [(Channel, i32); 5] {
        [
            (Channel::KernelException, EXCEPTION_PRIORITY),
            (Channel::KernelError, EXCEPTION_PRIORITY),
            (Channel::KernelTerminate, TERMINATE_PRIORITY),
            (Channel::ConsoleError, EXCEPTION_PRIORITY),
            (Channel::ConsoleTerminate, TERMINATE_PRIORITY),
        ]
    }

    /// The reporter.
    pub fn reporter(&self) -> &R {
        &self.reporter
    }
}

impl<R: ErrorReporter + Clone> ReportErrorListener<R> {
    /// Start capturing errors for a new request or command.
    pub fn lifecycle(&self) -> Lifecycle<R> {
        Lifecycle {
            reporter: self.reporter.clone(),
            error: None,
        }
    }
}

/// Create the listener unless [`Config::use_listeners`] is off.
pub fn listener_from_config<R: ErrorReporter>(
    config: &Config,
    reporter: R,
) -> Option<ReportErrorListener<R>> {
    if config.use_listeners {
        Some(ReportErrorListener::new(reporter))
    } else {
        None
    }
}

/// Error capture for a single request or command.
#[derive(Debug)]
pub struct Lifecycle<R> {
    reporter: R,
    error: Option<CapturedError>,
}

impl<R: ErrorReporter> Lifecycle<R> {
    /// Remember the error. Replaces any error captured before.
    pub fn on_error(&mut self, event: ErrorEvent) {
        self.error = Some(event.into_error());
    }

    /// The captured error, if any.
    pub fn error(&self) -> Option<&CapturedError> {
        self.error.as_ref()
    }

    /// Report the captured error. Returns `false` without reporting if nothing was captured.
    pub fn on_complete(self, event: CompletionEvent) -> bool {
        let error = match self.error {
            Some(error) => error,
            None => return false,
        };
        let options = match event {
            CompletionEvent::Http { request, status } => ReportOptions::default()
                .with_http_request(request)
                .with_http_response_status_code(status),
            CompletionEvent::Console { .. } => {
                ReportOptions::default().with_http_request(RequestSource::None)
            }
        };
        self.reporter.report(&error, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientOptions, JsonOrPath};
    use http::{Method, Uri};
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    #[derive(Debug, Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<(String, ReportOptions)>>,
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, error: &CapturedError, options: ReportOptions) -> bool {
            self.reports
                .lock()
                .unwrap()
                .push((error.message().to_string(), options));
            true
        }
    }

    impl RecordingReporter {
        fn reports(&self) -> Vec<(String, ReportOptions)> {
            self.reports.lock().unwrap().clone()
        }
    }

    fn error(message: &str) -> CapturedError {
        CapturedError::from_parts("app::Error", message)
    }

    fn request() -> HttpRequestInfo {
        HttpRequestInfo::new(Method::GET, Uri::from_static("https://x/y"))
    }

    fn recording_listener() -> ReportErrorListener<Arc<RecordingReporter>> {
        ReportErrorListener::new(Arc::new(RecordingReporter::default()))
    }

    #[test]
    fn nothing_captured() {
        let listener = recording_listener();
        let lifecycle = listener.lifecycle();
        assert!(!lifecycle.on_complete(CompletionEvent::Http {
            request: request(),
            status: 200
        }));
        assert!(listener.reporter().reports().is_empty());
    }

    #[test]
    fn reports_http_context() {
        let listener = recording_listener();
        let mut lifecycle = listener.lifecycle();
        lifecycle.on_error(ErrorEvent::Exception(error("boom")));
        assert!(lifecycle.on_complete(CompletionEvent::Http {
            request: request(),
            status: 500
        }));

        let reports = listener.reporter().reports();
        assert_eq!(1, reports.len());
        let (message, options) = &reports[0];
        assert_eq!("boom", message);
        assert_eq!(RequestSource::Given(request()), options.http_request);
        assert_eq!(Some(500), options.http_response_status_code);
        assert_eq!(None, options.user);
    }

    #[test]
    fn reports_console_without_request() {
        let listener = recording_listener();
        let mut lifecycle = listener.lifecycle();
        lifecycle.on_error(ErrorEvent::Console(error("exit")));
        assert!(lifecycle.on_complete(CompletionEvent::Console { exit_code: 1 }));

        let (_, options) = &listener.reporter().reports()[0];
        assert_eq!(RequestSource::None, options.http_request);
        assert_eq!(None, options.http_response_status_code);
    }

    #[test]
    fn last_error_wins() {
        let listener = recording_listener();
        let mut lifecycle = listener.lifecycle();
        lifecycle.on_error(ErrorEvent::Exception(error("first")));
        lifecycle.on_error(ErrorEvent::Error(error("second")));
        assert_eq!(Some("second"), lifecycle.error().map(CapturedError::message));
        lifecycle.on_complete(CompletionEvent::Console { exit_code: 1 });
        assert_eq!("second", listener.reporter().reports()[0].0);
    }

    #[test]
    fn lifecycles_are_independent() {
        let listener = recording_listener();
        let mut failing = listener.lifecycle();
        let healthy = listener.lifecycle();
        failing.on_error(ErrorEvent::Error(error("boom")));
        assert!(!healthy.on_complete(CompletionEvent::Http {
            request: request(),
            status: 200
        }));
        assert!(failing.on_complete(CompletionEvent::Http {
            request: request(),
            status: 500
        }));
        assert_eq!(1, listener.reporter().reports().len());
    }

    #[test]
    fn lifecycle_moves_into_worker_thread() {
        let listener = recording_listener();
        let mut lifecycle = listener.lifecycle();
        let worker = thread::spawn(move || {
            lifecycle.on_error(ErrorEvent::Exception(error("in worker")));
            lifecycle.on_complete(CompletionEvent::Http {
                request: request(),
                status: 500,
            })
        });
        assert!(worker.join().unwrap());
        assert_eq!("in worker", listener.reporter().reports()[0].0);
    }

    #[test]
    fn subscriptions() {
        let events = ReportErrorListener::<Arc<RecordingReporter>>::subscribed_events();
        assert!(events.contains(&(Channel::KernelException, 2048)));
        assert!(events.contains(&(Channel::KernelError, 2048)));
        assert!(events.contains(&(Channel::ConsoleError, 2048)));
        assert!(events.contains(&(Channel::KernelTerminate, 0)));
        assert!(events.contains(&(Channel::ConsoleTerminate, 0)));
        assert_eq!("kernel.exception", Channel::KernelException.as_str());
    }

    #[test]
    fn disabled_listeners() {
        let mut config = Config::new(
            "p",
            "s",
            ClientOptions::new(JsonOrPath::Path("key.json".into())),
        );
        assert!(listener_from_config(&config, RecordingReporter::default()).is_some());
        config.use_listeners = false;
        assert!(listener_from_config(&config, RecordingReporter::default()).is_none());
    }
}
