use crate::HttpError;
use bytes::Bytes;
use http::{Request, Response};
use std::time::Duration;

/// Minimal blocking HTTP client used by the bundled REST client.
///
/// Implemented for `reqwest::blocking::Client` with the `reqwest-blocking-client` or
/// `reqwest-blocking-client-rustls` features. Implement it yourself to use a different HTTP
/// stack.
pub trait HttpClient: std::fmt::Debug + Send + Sync {
    /// Send the request and return the full response.
    ///
    /// Implementations should honor a [`RequestTimeout`] found in the request extensions.
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError>;
}

impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError> {
        (**self).send(request)
    }
}

/// Timeout for a single request, attached as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout(pub Duration);

#[cfg(any(
    feature = "reqwest-blocking-client",
    feature = "reqwest-blocking-client-rustls"
))]
mod reqwest {
    use super::{Bytes, HttpClient, HttpError, Request, RequestTimeout, Response};

    impl HttpClient for reqwest::blocking::Client {
        fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError> {
            let timeout = request.extensions().get::<RequestTimeout>().copied();
            let mut request: reqwest::blocking::Request = request.try_into()?;
            if let Some(RequestTimeout(timeout)) = timeout {
                *request.timeout_mut() = Some(timeout);
            }
            let response = self.execute(request)?;
            Ok(Response::builder()
                .status(response.status())
                .body(response.bytes()?)?)
        }
    }
}
