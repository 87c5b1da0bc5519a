use http::{header, HeaderMap, Method, Uri};
use std::{
    fmt::Debug,
    net::{IpAddr, SocketAddr},
};

/// Snapshot of the HTTP request that was processed when an error occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequestInfo {
    /// Request method.
    pub method: Method,
    /// Request URI, either absolute or origin-form (`/path?query`).
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Address of the client, if known.
    pub remote_ip: Option<IpAddr>,
}

impl HttpRequestInfo {
    /// Create a request snapshot without headers.
    pub fn new(method: Method, uri: Uri) -> Self {
        HttpRequestInfo {
            method,
            uri,
            headers: HeaderMap::new(),
            remote_ip: None,
        }
    }

    /// Take a snapshot of an [`http::Request`].
    ///
    /// The remote address is taken from the request extensions, where servers commonly store it
    /// as [`SocketAddr`] or [`IpAddr`].
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        let extensions = request.extensions();
        let remote_ip = extensions
            .get::<SocketAddr>()
            .map(SocketAddr::ip)
            .or_else(|| extensions.get::<IpAddr>().copied());
        HttpRequestInfo {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            remote_ip,
        }
    }

    /// Set the client address.
    pub fn with_remote_ip(mut self, remote_ip: IpAddr) -> Self {
        self.remote_ip = Some(remote_ip);
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, name: header::HeaderName, value: header::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// The full URL of the request.
    ///
    /// Origin-form URIs are completed with the `Host` header and the `http` scheme.
    pub fn url(&self) -> String {
        if self.uri.authority().is_some() {
            return self.uri.to_string();
        }
        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        match self.header(header::HOST) {
            Some(host) if !host.is_empty() => {
                let scheme = self.uri.scheme_str().unwrap_or("http");
                format!("{}://{}{}", scheme, host, path_and_query)
            }
            _ => path_and_query.to_string(),
        }
    }

    /// Value of the given header, if present and valid UTF-8 text.
    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

impl<B> From<&http::Request<B>> for HttpRequestInfo {
    fn from(request: &http::Request<B>) -> Self {
        HttpRequestInfo::from_request(request)
    }
}

/// Looks up the request that is currently being processed.
///
/// Used when [`ReportOptions`](crate::ReportOptions) leave the HTTP request unset.
pub trait RequestProvider: Debug + Send + Sync {
    /// The in-flight request, if any.
    fn current_request(&self) -> Option<HttpRequestInfo>;
}

/// Looks up the user of the current authenticated session.
pub trait UserProvider: Debug + Send + Sync {
    /// Name of the authenticated user, or `None` if there is no session or no authenticated
    /// principal.
    fn current_username(&self) -> Option<String>;
}

/// Provider used when the host has no notion of requests or users.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl RequestProvider for NoContext {
    fn current_request(&self) -> Option<HttpRequestInfo> {
        None
    }
}

impl UserProvider for NoContext {
    fn current_username(&self) -> Option<String> {
        None
    }
}
