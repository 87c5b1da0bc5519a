use crate::{
    client::{project_name, ClientFactory, ClientGuard, ReportErrorsClient},
    models::{ErrorContext, HttpRequestContext, ReportedErrorEvent, ServiceContext, Timestamp},
    uploader::RestClientFactory,
    CallOptions, CapturedError, Config, Error, HttpClient, NoContext, ReportOptions,
    RequestProvider, ResolvedOptions, Transport, UserProvider,
};
use http::header::{REFERER, USER_AGENT};
use log::{debug, error};
use std::{backtrace::Backtrace, sync::Arc};

/// Prefix of every reported message. Error Reporting groups events by it.
pub const MESSAGE_PREFIX: &str = "PHP Fatal error: ";

/// Reports captured errors to a remote service.
///
/// Implementations never panic and never return errors. Failures are logged and turned into
/// `false`.
pub trait ErrorReporter {
    /// Report the error. Returns `true` if the report was accepted.
    fn report(&self, error: &CapturedError, options: ReportOptions) -> bool;
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for &T {
    fn report(&self, error: &CapturedError, options: ReportOptions) -> bool {
        (**self).report(error, options)
    }
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for Box<T> {
    fn report(&self, error: &CapturedError, options: ReportOptions) -> bool {
        (**self).report(error, options)
    }
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for Arc<T> {
    fn report(&self, error: &CapturedError, options: ReportOptions) -> bool {
        (**self).report(error, options)
    }
}

/// [`ErrorReporter`] for Google Cloud Error Reporting.
///
/// Every report creates a fresh client from the configured [`ClientFactory`] and closes it
/// before returning.
///
/// ```no_run
/// # #[cfg(feature = "reqwest-blocking-client")]
/// # fn main() -> Result<(), google_cloud_error_reporting::Error> {
/// use google_cloud_error_reporting::{
///     CapturedError, Config, ErrorReporter, GoogleCloudErrorReporter, ReportOptions,
/// };
///
/// let config = Config::from_env()?;
/// let reporter = GoogleCloudErrorReporter::new(config, reqwest::blocking::Client::new())?;
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
/// reporter.report(&CapturedError::new(error), ReportOptions::default());
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "reqwest-blocking-client"))]
/// # fn main() {}
/// ```
#[derive(Debug)]
pub struct GoogleCloudErrorReporter<F> {
    config: Config,
    client_factory: F,
    user_provider: Arc<dyn UserProvider>,
    request_provider: Arc<dyn RequestProvider>,
}

impl<C: HttpClient> GoogleCloudErrorReporter<RestClientFactory<C>> {
    /// Create a reporter which sends reports with the bundled REST client.
    ///
    /// Fails with [`Error::UnsupportedTransport`] if reporting is enabled and the configured
    /// transport is not [`Transport::Rest`].
    pub fn new(config: Config, http_client: C) -> Result<Self, Error> {
        let transport = config.client_options.transport;
        if config.enabled && transport != Transport::Rest {
            return Err(Error::UnsupportedTransport(transport.as_str()));
        }
        Ok(GoogleCloudErrorReporter::from_client_factory(
            config,
            RestClientFactory::new(http_client),
        ))
    }
}

impl<F: ClientFactory> GoogleCloudErrorReporter<F> {
    /// Create a reporter which sends reports with clients from the given factory.
    pub fn from_client_factory(config: Config, client_factory: F) -> Self {
        GoogleCloudErrorReporter {
            config,
            client_factory,
            user_provider: Arc::new(NoContext),
            request_provider: Arc::new(NoContext),
        }
    }

    /// Replace the client factory.
    pub fn with_client_factory<G: ClientFactory>(
        self,
        client_factory: G,
    ) -> GoogleCloudErrorReporter<G> {
        GoogleCloudErrorReporter {
            config: self.config,
            client_factory,
            user_provider: self.user_provider,
            request_provider: self.request_provider,
        }
    }

    /// Look up the session user with the given provider.
    pub fn with_user_provider(mut self, user_provider: impl UserProvider + 'static) -> Self {
        self.user_provider = Arc::new(user_provider);
        self
    }

    /// Look up the in-flight request with the given provider.
    pub fn with_request_provider(
        mut self,
        request_provider: impl RequestProvider + 'static,
    ) -> Self {
        self.request_provider = Arc::new(request_provider);
        self
    }

    /// The reporter configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the event sent for the error.
    pub fn build_event(
        &self,
        error: &CapturedError,
        options: &ResolvedOptions,
    ) -> ReportedErrorEvent {
        let mut context = ErrorContext::default();
        if let Some(request) = &options.http_request {
            context.http_request = Some(HttpRequestContext {
                method: request.method.to_string(),
                url: request.url(),
                user_agent: request.header(USER_AGENT).unwrap_or_default().into(),
                referrer: request.header(REFERER).unwrap_or_default().into(),
                response_status_code: options.http_response_status_code.map(i32::from),
                remote_ip: request.remote_ip.map(|ip| ip.to_string()),
            });
        }
        context.user = match (&options.user, &options.http_request) {
            (Some(user), _) => Some(user.clone()),
            (None, Some(_)) => Some(self.user_provider.current_username().unwrap_or_default()),
            (None, None) => None,
        };

        ReportedErrorEvent {
            event_time: Timestamp::now(),
            service_context: ServiceContext {
                service: self.config.service.clone(),
                version: None,
            },
            message: format!("{}{}", MESSAGE_PREFIX, error),
            context: Some(context),
        }
    }

    fn is_ignored(&self, error: &CapturedError) -> bool {
        self.config
            .ignored_errors
            .iter()
            .any(|name| error.is_instance_of(name))
    }

    fn submit(&self, event: &ReportedErrorEvent, options: &CallOptions) -> Result<(), Error> {
        let mut guard = ClientGuard::new(self.client_factory.create(&self.config.client_options)?);
        guard
            .client()
            .report_error_event(&project_name(&self.config.project_id), event, options)
    }
}

impl<F: ClientFactory> ErrorReporter for GoogleCloudErrorReporter<F> {
    fn report(&self, error: &CapturedError, options: ReportOptions) -> bool {
        if !self.config.enabled {
            debug!("Error reporting is disabled, dropping {}", error.type_name());
            return false;
        }
        if self.is_ignored(error) {
            return false;
        }

        let options = options.resolve(self.request_provider.as_ref());
        let event = self.build_event(error, &options);
        match self.submit(&event, &options.request_options) {
            Ok(()) => true,
            Err(err) => {
                let message = err.to_string();
                let trace = Backtrace::force_capture().to_string();
                let causes = err.causes();
                error!(
                    error_type = err.kind(),
                    error_message = message.as_str(),
                    trace = trace.as_str(),
                    causes = causes.as_str(),
                    reported_error_type = error.type_name();
                    "{}: {}", err.kind(), message
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientOptions, HttpRequestInfo, JsonOrPath, RequestSource};
    use http::{Method, Uri};
    use log::{kv::Key, Level, LevelFilter, Log, Metadata, Record};
    use once_cell::sync::Lazy;
    use test_case::test_case;
    use std::{
        collections::HashMap,
        fmt, io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    #[derive(Debug, Clone)]
    struct LogRecord {
        level: Level,
        message: String,
        key_values: HashMap<&'static str, String>,
    }

    #[derive(Default)]
    struct CapturingLogger {
        records: Mutex<HashMap<String, Vec<LogRecord>>>,
    }

    const KEYS: [&str; 5] = [
        "error_type",
        "error_message",
        "trace",
        "causes",
        "reported_error_type",
    ];

    impl Log for CapturingLogger {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            let thread = match std::thread::current().name() {
                Some(name) => name.to_string(),
                None => return,
            };
            let key_values = KEYS
                .iter()
                .filter_map(|key| {
                    record
                        .key_values()
                        .get(Key::from_str(key))
                        .map(|value| (*key, value.to_string()))
                })
                .collect();
            self.records
                .lock()
                .unwrap()
                .entry(thread)
                .or_default()
                .push(LogRecord {
                    level: record.level(),
                    message: record.args().to_string(),
                    key_values,
                });
        }

        fn flush(&self) {}
    }

    static LOGGER: Lazy<&'static CapturingLogger> = Lazy::new(|| {
        let logger: &'static CapturingLogger = Box::leak(Box::default());
        log::set_logger(logger).unwrap();
        log::set_max_level(LevelFilter::Trace);
        logger
    });

    /// Records logged by the current test.
    fn error_records() -> Vec<LogRecord> {
        let thread = std::thread::current().name().unwrap().to_string();
        LOGGER
            .records
            .lock()
            .unwrap()
            .get(&thread)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|record| record.level == Level::Error)
            .collect()
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Outcome {
        Accept,
        FailCreate,
        FailSubmit,
        FailConnect,
    }

    #[derive(Debug)]
    struct FakeFactory {
        outcome: Outcome,
        events: Mutex<Vec<(String, ReportedErrorEvent)>>,
        created: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    struct FakeClient<'a> {
        factory: &'a FakeFactory,
    }

    impl FakeFactory {
        fn new(outcome: Outcome) -> Self {
            Lazy::force(&LOGGER);
            FakeFactory {
                outcome,
                events: Mutex::new(Vec::new()),
                created: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn events(&self) -> Vec<(String, ReportedErrorEvent)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl<'a> ClientFactory for &'a FakeFactory {
        type Client = FakeClient<'a>;

        fn create(&self, _: &ClientOptions) -> Result<Self::Client, Error> {
            if self.outcome == Outcome::FailCreate {
                return Err(Error::UnsupportedTransport("grpc"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeClient { factory: *self })
        }
    }

    impl ReportErrorsClient for FakeClient<'_> {
        fn report_error_event(
            &mut self,
            project_name: &str,
            event: &ReportedErrorEvent,
            _: &CallOptions,
        ) -> Result<(), Error> {
            match self.factory.outcome {
                Outcome::FailSubmit => {
                    return Err(Error::Upload {
                        status: 503,
                        code: "UNAVAILABLE".into(),
                        message: "try later".into(),
                    })
                }
                Outcome::FailConnect => {
                    let refused = io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "Connection refused (os error 111)",
                    );
                    return Err(Error::UploadConnection(Box::new(SendFailed(refused))));
                }
                Outcome::Accept | Outcome::FailCreate => {}
            }
            self.factory
                .events
                .lock()
                .unwrap()
                .push((project_name.to_string(), event.clone()));
            Ok(())
        }

        fn close(&mut self) {
            self.factory.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct Session(Option<&'static str>);

    impl UserProvider for Session {
        fn current_username(&self) -> Option<String> {
            self.0.map(Into::into)
        }
    }

    #[derive(Debug)]
    struct InFlight;

    impl RequestProvider for InFlight {
        fn current_request(&self) -> Option<HttpRequestInfo> {
            Some(HttpRequestInfo::new(
                Method::POST,
                Uri::from_static("https://x/current"),
            ))
        }
    }

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    #[derive(Debug, thiserror::Error)]
    #[error("error sending request")]
    struct SendFailed(#[source] io::Error);

    fn config() -> Config {
        Config::new(
            "my-project",
            "checkout",
            ClientOptions::new(JsonOrPath::Path("key.json".into())),
        )
    }

    fn reporter(factory: &FakeFactory) -> GoogleCloudErrorReporter<&FakeFactory> {
        GoogleCloudErrorReporter::from_client_factory(config(), factory)
    }

    fn get_request() -> HttpRequestInfo {
        HttpRequestInfo::new(Method::GET, Uri::from_static("https://x/y"))
    }

    #[test]
    fn reports_without_http_context() {
        let factory = FakeFactory::new(Outcome::Accept);
        let error = CapturedError::new(Boom);
        assert!(reporter(&factory).report(&error, ReportOptions::default()));

        let events = factory.events();
        assert_eq!(1, events.len());
        let (project, event) = &events[0];
        assert_eq!("projects/my-project", project);
        assert_eq!(format!("PHP Fatal error: {}", error), event.message);
        assert!(event
            .message
            .starts_with("PHP Fatal error: google_cloud_error_reporting::reporter::tests::Boom: boom"));
        assert_eq!("checkout", event.service_context.service);
        assert_eq!(None, event.service_context.version);
        assert_eq!(Some(ErrorContext::default()), event.context);
        assert_eq!(1, factory.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn reports_http_context_and_session_user() {
        let factory = FakeFactory::new(Outcome::Accept);
        let reporter = reporter(&factory).with_user_provider(Session(Some("alice")));
        let options = ReportOptions::default()
            .with_http_request(get_request())
            .with_http_response_status_code(500);
        assert!(reporter.report(&CapturedError::new(Boom), options));

        let context = factory.events()[0].1.context.clone().unwrap();
        assert_eq!(
            Some(HttpRequestContext {
                method: "GET".into(),
                url: "https://x/y".into(),
                user_agent: "".into(),
                referrer: "".into(),
                response_status_code: Some(500),
                remote_ip: None,
            }),
            context.http_request
        );
        assert_eq!(Some("alice".to_string()), context.user);
    }

    #[test]
    fn reports_headers_and_remote_ip() {
        let factory = FakeFactory::new(Outcome::Accept);
        let request = get_request()
            .with_header(USER_AGENT, "curl/8.0".parse().unwrap())
            .with_header(REFERER, "https://x/".parse().unwrap())
            .with_remote_ip("10.0.0.1".parse().unwrap());
        let options = ReportOptions::default().with_http_request(request);
        assert!(reporter(&factory).report(&CapturedError::new(Boom), options));

        let http_request = factory.events()[0]
            .1
            .context
            .clone()
            .unwrap()
            .http_request
            .unwrap();
        assert_eq!("curl/8.0", http_request.user_agent);
        assert_eq!("https://x/", http_request.referrer);
        assert_eq!(Some("10.0.0.1".to_string()), http_request.remote_ip);
        assert_eq!(None, http_request.response_status_code);
    }

    #[test]
    fn explicit_user_wins() {
        let factory = FakeFactory::new(Outcome::Accept);
        let reporter = reporter(&factory).with_user_provider(Session(Some("alice")));
        let options = ReportOptions::default()
            .with_http_request(get_request())
            .with_user("bob");
        assert!(reporter.report(&CapturedError::new(Boom), options));
        assert_eq!(
            Some("bob".to_string()),
            factory.events()[0].1.context.clone().unwrap().user
        );
    }

    #[test]
    fn anonymous_session_user_is_empty() {
        let factory = FakeFactory::new(Outcome::Accept);
        let reporter = reporter(&factory).with_user_provider(Session(None));
        let options = ReportOptions::default().with_http_request(get_request());
        assert!(reporter.report(&CapturedError::new(Boom), options));
        assert_eq!(
            Some(String::new()),
            factory.events()[0].1.context.clone().unwrap().user
        );
    }

    #[test]
    fn uses_current_request() {
        let factory = FakeFactory::new(Outcome::Accept);
        let reporter = reporter(&factory).with_request_provider(InFlight);
        assert!(reporter.report(&CapturedError::new(Boom), ReportOptions::default()));
        let context = factory.events()[0].1.context.clone().unwrap();
        assert_eq!("https://x/current", context.http_request.unwrap().url);
        assert_eq!(Some(String::new()), context.user);

        let options = ReportOptions::default().with_http_request(RequestSource::None);
        assert!(reporter.report(&CapturedError::new(Boom), options));
        assert_eq!(None, factory.events()[1].1.context.clone().unwrap().http_request);
    }

    #[test]
    fn disabled_reports_nothing() {
        let factory = FakeFactory::new(Outcome::Accept);
        let mut config = config();
        config.enabled = false;
        let reporter = GoogleCloudErrorReporter::from_client_factory(config, &factory);
        assert!(!reporter.report(&CapturedError::new(Boom), ReportOptions::default()));
        assert_eq!(0, factory.created.load(Ordering::SeqCst));
        assert!(error_records().is_empty());
    }

    #[test]
    fn ignored_errors_are_dropped_silently() {
        let factory = FakeFactory::new(Outcome::FailSubmit);
        let config = config().with_ignored_error("google_cloud_error_reporting::reporter::*");
        let reporter = GoogleCloudErrorReporter::from_client_factory(config, &factory);
        assert!(!reporter.report(&CapturedError::new(Boom), ReportOptions::default()));
        assert_eq!(0, factory.created.load(Ordering::SeqCst));
        assert!(error_records().is_empty());

        let other = CapturedError::from_parts("other::Error", "nope");
        assert!(!reporter.report(&other, ReportOptions::default()));
        assert_eq!(1, factory.created.load(Ordering::SeqCst));
    }

    #[test]
    fn submit_failure_is_logged_and_client_closed_once() {
        let factory = FakeFactory::new(Outcome::FailSubmit);
        assert!(!reporter(&factory).report(&CapturedError::new(Boom), ReportOptions::default()));
        assert_eq!(1, factory.closed.load(Ordering::SeqCst));

        let records = error_records();
        assert_eq!(1, records.len());
        let record = &records[0];
        assert_eq!(
            "Upload: report failed with 503 UNAVAILABLE: try later",
            record.message
        );
        assert_eq!("Upload", record.key_values["error_type"]);
        assert_eq!(
            "report failed with 503 UNAVAILABLE: try later",
            record.key_values["error_message"]
        );
        assert!(!record.key_values["trace"].is_empty());
        assert!(!record.key_values["trace"].contains("{main}"));
        assert_eq!("", record.key_values["causes"]);
        assert_eq!(
            "google_cloud_error_reporting::reporter::tests::Boom",
            record.key_values["reported_error_type"]
        );
    }

    #[test]
    fn connection_failure_logs_root_cause() {
        let factory = FakeFactory::new(Outcome::FailConnect);
        assert!(!reporter(&factory).report(&CapturedError::new(Boom), ReportOptions::default()));

        let records = error_records();
        assert_eq!(1, records.len());
        let record = &records[0];
        assert_eq!("UploadConnection", record.key_values["error_type"]);
        assert_eq!(
            "#0 error sending request\n#1 Connection refused (os error 111)",
            record.key_values["causes"]
        );
        assert!(!record.key_values["trace"].is_empty());
    }

    #[test]
    fn create_failure_is_logged() {
        let factory = FakeFactory::new(Outcome::FailCreate);
        assert!(!reporter(&factory).report(&CapturedError::new(Boom), ReportOptions::default()));
        assert_eq!(0, factory.closed.load(Ordering::SeqCst));

        let records = error_records();
        assert_eq!(1, records.len());
        assert_eq!("UnsupportedTransport", records[0].key_values["error_type"]);
    }

    #[derive(Debug)]
    struct Offline;

    impl HttpClient for Offline {
        fn send(
            &self,
            _: http::Request<Vec<u8>>,
        ) -> Result<http::Response<bytes::Bytes>, crate::HttpError> {
            Err("offline".into())
        }
    }

    #[test_case(Transport::Grpc ; "grpc")]
    #[test_case(Transport::GrpcFallback ; "grpc fallback")]
    fn rest_reporter_rejects_other_transports(transport: Transport) {
        let mut config = config();
        config.client_options.transport = transport;
        let error = GoogleCloudErrorReporter::new(config, Offline).unwrap_err();
        assert!(matches!(error, Error::UnsupportedTransport(name) if name == transport.as_str()));
    }

    #[test]
    fn rest_reporter_accepts_rest_and_disabled_configs() {
        let mut rest = config();
        rest.client_options.transport = Transport::Rest;
        assert!(GoogleCloudErrorReporter::new(rest, Offline).is_ok());

        let mut disabled = config();
        disabled.enabled = false;
        assert_eq!(Transport::Grpc, disabled.client_options.transport);
        assert!(GoogleCloudErrorReporter::new(disabled, Offline).is_ok());
    }

    #[test]
    fn reporter_behind_pointers() {
        let factory = FakeFactory::new(Outcome::Accept);
        let reporter: Box<dyn ErrorReporter + '_> = Box::new(reporter(&factory));
        let shared = Arc::new(reporter);
        assert!((&shared).report(&CapturedError::new(Boom), ReportOptions::default()));
        assert_eq!(1, factory.events().len());
    }
}
