use crate::{client_config::RetrySettings, HttpRequestInfo, RequestProvider};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Where the HTTP request for a report comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestSource {
    /// The request currently processed according to the reporter's
    /// [`RequestProvider`], if any.
    #[default]
    Current,
    /// No HTTP request, e.g. when reporting from a command.
    None,
    /// This request.
    Given(HttpRequestInfo),
}

impl From<HttpRequestInfo> for RequestSource {
    fn from(request: HttpRequestInfo) -> Self {
        RequestSource::Given(request)
    }
}

impl From<Option<HttpRequestInfo>> for RequestSource {
    fn from(request: Option<HttpRequestInfo>) -> Self {
        request.map_or(RequestSource::None, RequestSource::Given)
    }
}

/// Options for a single [`report`](crate::ErrorReporter::report) call.
///
/// Every field has a default, so `ReportOptions::default()` reports the error with the current
/// request (if any) and the session user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportOptions {
    /// HTTP request to attach. Default: [`RequestSource::Current`].
    pub http_request: RequestSource,
    /// Status code of the response sent for the request. Default: none.
    pub http_response_status_code: Option<u16>,
    /// User to attach. Overrides the session user. Default: none.
    pub user: Option<String>,
    /// Options passed to the remote client call. Default: empty.
    pub request_options: CallOptions,
}

/// [`ReportOptions`] with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    /// HTTP request to attach.
    pub http_request: Option<HttpRequestInfo>,
    /// Status code of the response sent for the request.
    pub http_response_status_code: Option<u16>,
    /// Explicitly given user.
    pub user: Option<String>,
    /// Options passed to the remote client call.
    pub request_options: CallOptions,
}

impl ReportOptions {
    /// Attach the given HTTP request.
    pub fn with_http_request(mut self, request: impl Into<RequestSource>) -> Self {
        self.http_request = request.into();
        self
    }

    /// Attach the response status code.
    pub fn with_http_response_status_code(mut self, status_code: u16) -> Self {
        self.http_response_status_code = Some(status_code);
        self
    }

    /// Attach the given user instead of the session user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set options for the remote client call.
    pub fn with_request_options(mut self, request_options: CallOptions) -> Self {
        self.request_options = request_options;
        self
    }

    /// Apply defaults. [`RequestSource::Current`] asks the `requests` provider for the in-flight
    /// request; all other fields are taken as they are.
    pub fn resolve(self, requests: &dyn RequestProvider) -> ResolvedOptions {
        let http_request = match self.http_request {
            RequestSource::Current => requests.current_request(),
            RequestSource::None => None,
            RequestSource::Given(request) => Some(request),
        };
        ResolvedOptions {
            http_request,
            http_response_status_code: self.http_response_status_code,
            user: self.user,
            request_options: self.request_options,
        }
    }
}

/// Per-call options for the remote client.
///
/// Deserializing rejects unknown keys:
///
/// ```
/// # use google_cloud_error_reporting::CallOptions;
/// let options: CallOptions = serde_json::from_str(r#"{"timeoutMillis": 5000}"#).unwrap();
/// assert_eq!(Some(5000), options.timeout_millis);
/// assert!(serde_json::from_str::<CallOptions>(r#"{"timeout": 5000}"#).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallOptions {
    /// Timeout of a single attempt, overriding the client configuration.
    #[serde(default)]
    pub timeout_millis: Option<u64>,

    /// Retry settings, overriding the client configuration.
    #[serde(default)]
    pub retry_settings: Option<RetrySettings>,

    /// Additional request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}
