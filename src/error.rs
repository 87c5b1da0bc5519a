use std::{error::Error as StdError, fmt::Debug, path::PathBuf};

/// Boxed error returned by [`HttpClient`](crate::HttpClient) implementations.
pub type HttpError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that occurred while configuring the reporter or reporting an error.
///
/// [`ErrorReporter::report`](crate::ErrorReporter::report) never returns these. They are logged
/// and turned into a `false` result. Configuration loading returns them directly.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configuration is invalid, e.g. a required field is missing or empty.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A configuration file (or a file it references) could not be read.
    #[error("reading {path} failed with {source}")]
    ConfigRead {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A configuration document is not valid JSON or does not match the expected shape.
    #[error("parsing configuration failed with {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// The credentials are not usable, e.g. of an unsupported type or with a malformed key.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// Requesting an access token from the OAuth 2.0 token endpoint failed.
    #[error("fetching access token failed with {0}")]
    Token(String),

    /// The configured transport is not implemented by the client factory.
    #[error("transport \"{0}\" is not supported by this client")]
    UnsupportedTransport(&'static str),

    /// The service address does not form a valid endpoint URI.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[source] http::uri::InvalidUri),

    /// The error event failed to serialize to JSON.
    ///
    /// Note: This is an error in this crate. If you spot this, please open an issue.
    #[error("serializing report request failed with {0}")]
    UploadSerializeRequest(#[source] serde_json::Error),

    /// Could not complete the HTTP request to the Error Reporting API.
    #[error("sending report request failed with {0}")]
    UploadConnection(#[source] HttpError),

    /// The Error Reporting API response failed to deserialize from JSON.
    #[error("deserializing report response failed with {0}")]
    UploadDeserializeResponse(#[source] serde_json::Error),

    /// The Error Reporting API rejected the report.
    #[error("report failed with {status} {code}: {message}")]
    Upload {
        /// HTTP status code of the response.
        status: u16,
        /// Canonical error code, e.g. `UNAVAILABLE`.
        code: String,
        /// Error message returned by the API.
        message: String,
    },

    /// The client was used after it was closed.
    #[error("client is closed")]
    ClientClosed,
}

impl Error {
    /// Name of the failure, used as the error type in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "Config",
            Error::ConfigRead { .. } => "ConfigRead",
            Error::ConfigParse(_) => "ConfigParse",
            Error::Credentials(_) => "Credentials",
            Error::Token(_) => "Token",
            Error::UnsupportedTransport(_) => "UnsupportedTransport",
            Error::InvalidEndpoint(_) => "InvalidEndpoint",
            Error::UploadSerializeRequest(_) => "UploadSerializeRequest",
            Error::UploadConnection(_) => "UploadConnection",
            Error::UploadDeserializeResponse(_) => "UploadDeserializeResponse",
            Error::Upload { .. } => "Upload",
            Error::ClientClosed => "ClientClosed",
        }
    }

    /// Canonical code of this error as used in retry code lists.
    ///
    /// Connection errors count as `UNAVAILABLE`. Errors raised before anything was sent have no
    /// code.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::UploadConnection(_) => Some("UNAVAILABLE"),
            Error::Upload { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if the error carries one of the given retry codes.
    pub fn is_retryable(&self, retry_codes: &[String]) -> bool {
        self.code()
            .map(|code| retry_codes.iter().any(|c| c == code))
            .unwrap_or(false)
    }

    /// Source chain of this error as text, one cause per line. Empty if there is no source.
    pub(crate) fn causes(&self) -> String {
        let mut causes = Vec::new();
        let mut source = self.source();
        while let Some(err) = source {
            causes.push(format!("#{} {}", causes.len(), err));
            source = err.source();
        }
        causes.join("\n")
    }
}
