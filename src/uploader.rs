use crate::{
    client::{ClientFactory, ReportErrorsClient},
    client_config::RetryPolicy,
    credentials::{Credentials, TokenCache, DEFAULT_SCOPE},
    http_client::RequestTimeout,
    models::ReportedErrorEvent,
    CallOptions, ClientOptions, Error, HttpClient, Transport,
};
use backon::{BlockingRetryable, ExponentialBuilder};
use bytes::Bytes;
use http::{header, Request, Response, StatusCode, Uri};
use log::debug;
use serde::Deserialize;
use std::{borrow::Cow, fs, sync::Arc, time::Instant};

const API_VERSION: &str = "v1beta1";
const X_GOOG_API_CLIENT: &str = "x-goog-api-client";
const X_GOOG_USER_PROJECT: &str = "x-goog-user-project";

const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_UNAUTHORIZED: u16 = 401;
const STATUS_FORBIDDEN: u16 = 403;
const STATUS_NOT_FOUND: u16 = 404;
const STATUS_CONFLICT: u16 = 409;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;
const STATUS_NOT_IMPLEMENTED: u16 = 501;
const STATUS_SERVICE_UNAVAILABLE: u16 = 503;
const STATUS_GATEWAY_TIMEOUT: u16 = 504;

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Creates [`RestClient`]s which talk JSON over HTTP/1.1 to the Error Reporting API.
///
/// Only [`Transport::Rest`] is supported. Creating a client for any other transport fails with
/// [`Error::UnsupportedTransport`].
///
/// Clients of one factory, and of its clones, share access tokens until they expire.
#[derive(Debug)]
pub struct RestClientFactory<C> {
    client: Arc<C>,
    tokens: Arc<TokenCache>,
}

impl<C: HttpClient> RestClientFactory<C> {
    /// Create a factory whose clients send requests with the given HTTP client.
    pub fn new(client: C) -> Self {
        RestClientFactory {
            client: Arc::new(client),
            tokens: Arc::default(),
        }
    }
}

impl<C: HttpClient> Clone for RestClientFactory<C> {
    fn clone(&self) -> Self {
        RestClientFactory {
            client: Arc::clone(&self.client),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<C: HttpClient> ClientFactory for RestClientFactory<C> {
    type Client = RestClient<C>;

    fn create(&self, options: &ClientOptions) -> Result<Self::Client, Error> {
        if options.transport != Transport::Rest {
            return Err(Error::UnsupportedTransport(options.transport.as_str()));
        }

        let credentials = Credentials::from_json(options.credentials.load()?)?;
        let mut retry = match &options.client_config {
            Some(client_config) => RetryPolicy::from_client_config(client_config.load()?)?,
            None => RetryPolicy::default(),
        };
        if options.disable_retries {
            retry = retry.disabled();
        }
        let credentials_config = options.credentials_config.clone().unwrap_or_default();
        let scopes = credentials_config
            .scopes
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.into()]);
        let quota_project = credentials_config
            .quota_project
            .or_else(|| credentials.quota_project_id().map(Into::into));

        Ok(RestClient {
            http: Arc::clone(&self.client),
            tokens: Arc::clone(&self.tokens),
            endpoint: sanitize_endpoint(options.service_address())?,
            credentials,
            retry,
            scopes,
            quota_project,
            api_client_header: api_client_header(options)?,
            closed: false,
        })
    }
}

/// Client for the Error Reporting REST API.
#[derive(Debug)]
pub struct RestClient<C> {
    http: Arc<C>,
    tokens: Arc<TokenCache>,
    endpoint: Uri,
    credentials: Credentials,
    retry: RetryPolicy,
    scopes: Vec<String>,
    quota_project: Option<String>,
    api_client_header: String,
    closed: bool,
}

impl<C: HttpClient> ReportErrorsClient for RestClient<C> {
    fn report_error_event(
        &mut self,
        project_name: &str,
        event: &ReportedErrorEvent,
        options: &CallOptions,
    ) -> Result<(), Error> {
        if self.closed {
            return Err(Error::ClientClosed);
        }

        let uri = append_path(
            &self.endpoint,
            &format!("{}/{}/events:report", API_VERSION, project_name),
        )
        .map_err(Error::InvalidEndpoint)?;
        let body = serde_json::to_vec(event).map_err(Error::UploadSerializeRequest)?;
        let policy = self
            .retry
            .clone()
            .with_overrides(options.retry_settings.as_ref(), options.timeout_millis);
        let token = self.tokens.access_token(
            &self.credentials,
            self.http.as_ref(),
            &self.scopes,
            policy.timeout,
        )?;

        let send = || self.send(&uri, &body, &token, options, &policy);
        if !policy.retries() {
            return send();
        }

        let started = Instant::now();
        let backoff = ExponentialBuilder::default()
            .with_min_delay(policy.initial_delay)
            .with_max_delay(policy.max_delay)
            .with_factor(policy.multiplier)
            .without_max_times();
        send.retry(backoff)
            .sleep(std::thread::sleep)
            .when(|err: &Error| {
                err.is_retryable(&policy.retryable_codes)
                    && started.elapsed() < policy.total_timeout
            })
            .notify(|err: &Error, delay| {
                debug!("Retrying error report in {:?} after {}", delay, err);
            })
            .call()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl<C: HttpClient> RestClient<C> {
    fn send(
        &self,
        uri: &Uri,
        body: &[u8],
        token: &str,
        options: &CallOptions,
        policy: &RetryPolicy,
    ) -> Result<(), Error> {
        let mut builder = Request::post(uri.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(X_GOOG_API_CLIENT, self.api_client_header.as_str());
        if let Some(quota_project) = &self.quota_project {
            builder = builder.header(X_GOOG_USER_PROJECT, quota_project.as_str());
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut request = builder
            .body(body.to_vec())
            .map_err(|err| Error::Config(format!("invalid request: {}", err)))?;
        if let Some(timeout) = policy.timeout {
            request.extensions_mut().insert(RequestTimeout(timeout));
        }

        let response = self.http.send(request).map_err(Error::UploadConnection)?;
        handle_response(response)
    }
}

fn handle_response(response: Response<Bytes>) -> Result<(), Error> {
    let status = response.status();
    if status.is_success() {
        // The response is an empty message. Anything else means we talked to the wrong server.
        if !response.body().is_empty() {
            serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(response.body())
                .map_err(Error::UploadDeserializeResponse)?;
        }
        return Ok(());
    }

    let (code, message) = match serde_json::from_slice::<ErrorResponse>(response.body()) {
        Ok(ErrorResponse { error }) => (
            error
                .status
                .unwrap_or_else(|| canonical_code(status).into()),
            error.message,
        ),
        Err(_) => (
            canonical_code(status).into(),
            String::from_utf8_lossy(response.body()).into_owned(),
        ),
    };
    Err(Error::Upload {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Canonical error code for an HTTP status, following `google.rpc.Code`.
fn canonical_code(status: StatusCode) -> &'static str {
    match status.as_u16() {
        STATUS_BAD_REQUEST => "INVALID_ARGUMENT",
        STATUS_UNAUTHORIZED => "UNAUTHENTICATED",
        STATUS_FORBIDDEN => "PERMISSION_DENIED",
        STATUS_NOT_FOUND => "NOT_FOUND",
        STATUS_CONFLICT => "ABORTED",
        STATUS_TOO_MANY_REQUESTS => "RESOURCE_EXHAUSTED",
        STATUS_CLIENT_CLOSED_REQUEST => "CANCELLED",
        STATUS_NOT_IMPLEMENTED => "UNIMPLEMENTED",
        STATUS_SERVICE_UNAVAILABLE => "UNAVAILABLE",
        STATUS_GATEWAY_TIMEOUT => "DEADLINE_EXCEEDED",
        _ if status.is_server_error() => "INTERNAL",
        _ => "UNKNOWN",
    }
}

/// Endpoint for a service address. Addresses without a scheme use `https`.
fn sanitize_endpoint(address: &str) -> Result<Uri, Error> {
    let address = address.trim();
    let url: Cow<str> = if address.contains("://") {
        address.into()
    } else {
        format!("https://{}", address).into()
    };

    Uri::try_from(url.trim_end_matches('/')).map_err(Error::InvalidEndpoint)
}

pub(crate) fn append_path(uri: &Uri, path: &str) -> Result<Uri, http::uri::InvalidUri> {
    let base = uri.to_string();
    Uri::try_from(format!("{}/{}", base.trim_end_matches('/'), path))
}

fn api_client_header(options: &ClientOptions) -> Result<String, Error> {
    let gapic_version = match (&options.gapic_version, &options.version_file) {
        (Some(version), _) => Some(version.clone()),
        (None, Some(path)) => Some(
            fs::read_to_string(path)
                .map_err(|source| Error::ConfigRead {
                    path: path.clone(),
                    source,
                })?
                .trim()
                .to_string(),
        ),
        (None, None) => None,
    };

    let mut parts = vec![
        "gl-rust".to_string(),
        format!("gax/{}", env!("CARGO_PKG_VERSION")),
        format!("rest/{}", env!("CARGO_PKG_VERSION")),
    ];
    if let Some(gapic_version) = gapic_version {
        parts.push(format!("gapic/{}", gapic_version));
    }
    if let (Some(name), Some(version)) = (&options.lib_name, &options.lib_version) {
        parts.push(format!("{}/{}", name, version));
    }
    Ok(parts.join(" "))
}
