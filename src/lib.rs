//! Report unhandled errors to [Google Cloud Error Reporting].
//!
//! [Google Cloud Error Reporting]: https://cloud.google.com/error-reporting
//!
//! # Usage
//!
//! Load the configuration and create a reporter:
//!
//! ```rust,no_run
//! # #[cfg(feature = "reqwest-blocking-client")]
//! # fn main() -> Result<(), google_cloud_error_reporting::Error> {
//! use google_cloud_error_reporting::{
//!     CapturedError, Config, ErrorReporter, GoogleCloudErrorReporter, ReportOptions,
//! };
//!
//! let config: Config = r#"{
//!     "enabled": true,
//!     "project_id": "my-project",
//!     "service": "checkout",
//!     "client_options": {
//!         "credentials": "/etc/gcp/service-account.json",
//!         "transport": "rest"
//!     }
//! }"#
//! .parse()?;
//! let reporter = GoogleCloudErrorReporter::new(config, reqwest::blocking::Client::new())?;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
//! let reported = reporter.report(&CapturedError::new(error), ReportOptions::default());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "reqwest-blocking-client"))]
//! # fn main() {}
//! ```
//!
//! Reporting never fails the caller. [`ErrorReporter::report`] returns `false` if reporting is
//! disabled, the error type is ignored or the API call failed. Failures are logged with the
//! [`log`] crate at error level.
//!
//! To report errors automatically, wrap the reporter in a [`ReportErrorListener`] and feed it the
//! errors and completions of each request or command, or install [`install_panic_hook`].
//!
//! # Reported events
//!
//! | Event field                  | Source                                                  |
//! | ---------------------------- | ------------------------------------------------------- |
//! | `message`                    | `"PHP Fatal error: "` + the [`CapturedError`] string form |
//! | `eventTime`                  | Time of the report                                      |
//! | `serviceContext.service`     | [`Config::service`]                                     |
//! | `context.httpRequest`        | [`ReportOptions::http_request`]                         |
//! | `context.user`               | [`ReportOptions::user`], else the [`UserProvider`] user if a request is present |
//!
//! # HTTP client
//!
//! The bundled REST client sends requests through an [`HttpClient`]. Enable the
//! `reqwest-blocking-client` (or `reqwest-blocking-client-rustls`) feature to use
//! `reqwest::blocking::Client`, or implement the trait for your HTTP stack. To talk to the API
//! over a different transport, implement [`ClientFactory`] and pass it to
//! [`GoogleCloudErrorReporter::from_client_factory`].
#![doc(html_root_url = "https://docs.rs/google-cloud-error-reporting/0.1.0")]
#![deny(missing_docs, unreachable_pub, missing_debug_implementations)]
#![cfg_attr(test, deny(warnings))]

mod captured;
mod client;
mod client_config;
mod config;
mod credentials;
mod error;
mod http_client;
mod listener;
pub mod models;
mod options;
mod panic;
mod reporter;
mod request;
mod uploader;

pub use captured::{CapturedError, PANIC_TYPE_NAME};
pub use client::{project_name, ClientFactory, ReportErrorsClient};
pub use client_config::RetrySettings;
pub use config::{
    ClientOptions, Config, CredentialsConfig, JsonOrPath, Transport, TransportConfig,
    CONFIG_PATH_ENV,
};
pub use error::{Error, HttpError};
pub use http_client::{HttpClient, RequestTimeout};
pub use listener::{
    listener_from_config, Channel, CompletionEvent, ErrorEvent, Lifecycle, ReportErrorListener,
    EXCEPTION_PRIORITY, TERMINATE_PRIORITY,
};
pub use options::{CallOptions, ReportOptions, RequestSource, ResolvedOptions};
pub use panic::install_panic_hook;
pub use reporter::{ErrorReporter, GoogleCloudErrorReporter, MESSAGE_PREFIX};
pub use request::{HttpRequestInfo, NoContext, RequestProvider, UserProvider};
pub use uploader::{RestClient, RestClientFactory};

#[cfg(doctest)]
doc_comment::doctest!("../README.md", readme);
