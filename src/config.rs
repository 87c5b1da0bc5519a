use crate::Error;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeSet,
    fs,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Environment variable naming the configuration file read by [`Config::from_env`].
pub const CONFIG_PATH_ENV: &str = "GOOGLE_CLOUD_ERROR_REPORTING_CONFIG";

pub(crate) const DEFAULT_SERVICE_ADDRESS: &str = "clouderrorreporting.googleapis.com:443";

/// Reporter configuration.
///
/// Loaded once at startup. The JSON representation looks like this:
///
/// ```json
/// {
///   "enabled": true,
///   "project_id": "my-project",
///   "service": "checkout",
///   "ignored_errors": ["my_app::NotFound"],
///   "client_options": {
///     "credentials": "/etc/gcp/service-account.json",
///     "transport": "rest"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Enables error reporting.
    ///
    /// Default: `false`
    #[serde(default)]
    pub enabled: bool,

    /// Google Cloud Platform project ID.
    pub project_id: String,

    /// Name of app/service to group errors by.
    pub service: String,

    /// Enable automatic error reporting by using [`ReportErrorListener`](crate::ReportErrorListener).
    ///
    /// Default: `true`
    #[serde(default = "default_true")]
    pub use_listeners: bool,

    /// Type names of errors which are never reported.
    ///
    /// See [`CapturedError::is_instance_of`](crate::CapturedError::is_instance_of) for how names
    /// are matched.
    #[serde(default)]
    pub ignored_errors: BTreeSet<String>,

    /// Error reporting client connection options.
    pub client_options: ClientOptions,
}

/// Error reporting client connection options.
///
/// Unknown keys are ignored so options meant for other client implementations can be passed
/// through.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// The address of the API remote host, e.g. `example.googleapis.com` or
    /// `example.googleapis.com:443`.
    #[serde(default)]
    pub service_address: Option<String>,

    /// Determines whether or not retries defined by the client configuration should be disabled.
    ///
    /// Default: `false`
    #[serde(default)]
    pub disable_retries: bool,

    /// Client method configuration, including retry settings. Either a path to a JSON file or
    /// the decoded JSON data.
    #[serde(default)]
    pub client_config: Option<JsonOrPath>,

    /// The credentials to be used by the client to authorize API calls. Either a path to a
    /// credentials file or the decoded credentials file.
    pub credentials: JsonOrPath,

    /// Options used to configure credentials.
    #[serde(default)]
    pub credentials_config: Option<CredentialsConfig>,

    /// Transport used to talk to the API.
    ///
    /// Default: [`Transport::Grpc`]
    #[serde(default)]
    pub transport: Transport,

    /// Options used to construct the transport, keyed by transport.
    #[serde(default)]
    pub transport_config: Option<TransportConfig>,

    /// The path to a file which contains the current version of the client.
    #[serde(default)]
    pub version_file: Option<PathBuf>,

    /// The path to a descriptor configuration file.
    #[serde(default)]
    pub descriptors_config_path: Option<PathBuf>,

    /// The name of the service.
    #[serde(default)]
    pub service_name: Option<String>,

    /// The name of the client application.
    #[serde(default)]
    pub lib_name: Option<String>,

    /// The version of the client application.
    #[serde(default)]
    pub lib_version: Option<String>,

    /// The code generator version of the client library.
    #[serde(default)]
    pub gapic_version: Option<String>,
}

/// Value that is either a path to a JSON file or the decoded JSON data itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JsonOrPath {
    /// Path to a JSON file.
    Path(PathBuf),
    /// Decoded JSON object.
    Json(Map<String, Value>),
}

/// Options used to configure credentials.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    /// OAuth 2.0 scopes to request.
    ///
    /// Default: `https://www.googleapis.com/auth/cloud-platform`
    #[serde(default)]
    pub scopes: Option<Vec<String>>,

    /// Project billed for quota, sent as `x-goog-user-project`.
    #[serde(default)]
    pub quota_project: Option<String>,
}

/// Transport used to talk to the Error Reporting API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// JSON over HTTP/1.1.
    Rest,
    /// gRPC over HTTP/2.
    #[default]
    Grpc,
    /// Protobuf over HTTP/1.1.
    GrpcFallback,
}

impl Transport {
    /// Name of the transport as used in the configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Rest => "rest",
            Transport::Grpc => "grpc",
            Transport::GrpcFallback => "grpc-fallback",
        }
    }
}

/// Transport specific options.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Options for [`Transport::Rest`].
    #[serde(default)]
    pub rest: Option<Map<String, Value>>,
    /// Options for [`Transport::Grpc`].
    #[serde(default)]
    pub grpc: Option<Map<String, Value>>,
    /// Options for [`Transport::GrpcFallback`].
    #[serde(default, rename = "grpc-fallback")]
    pub grpc_fallback: Option<Map<String, Value>>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Create a configuration with reporting enabled and all other options at their defaults.
    pub fn new(
        project_id: impl Into<String>,
        service: impl Into<String>,
        client_options: ClientOptions,
    ) -> Self {
        Config {
            enabled: true,
            project_id: project_id.into(),
            service: service.into(),
            use_listeners: true,
            ignored_errors: BTreeSet::new(),
            client_options,
        }
    }

    /// Never report errors of the given type. See [`Config::ignored_errors`].
    pub fn with_ignored_error(mut self, type_name: impl Into<String>) -> Self {
        self.ignored_errors.insert(type_name.into());
        self
    }

    /// Read and validate a JSON configuration.
    pub fn from_reader(reader: impl Read) -> Result<Self, Error> {
        let config: Config = serde_json::from_reader(reader).map_err(Error::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|source| Error::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        Config::from_reader(std::io::BufReader::new(file))
    }

    /// Read and validate the configuration file named by the
    /// `GOOGLE_CLOUD_ERROR_REPORTING_CONFIG` environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .ok_or_else(|| Error::Config(format!("{} is not set", CONFIG_PATH_ENV)))?;
        Config::from_file(path)
    }

    /// Check constraints serde can't express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("\"project_id\" must not be empty".into()));
        }
        if self.service.trim().is_empty() {
            return Err(Error::Config("\"service\" must not be empty".into()));
        }
        if self.ignored_errors.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::Config(
                "\"ignored_errors\" must not contain empty type names".into(),
            ));
        }
        self.client_options.validate()
    }
}

impl FromStr for Config {
    type Err = Error;

    /// Parse and validate a JSON configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = serde_json::from_str(s).map_err(Error::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }
}

impl ClientOptions {
    /// Create client options with the given credentials and all other options at their defaults.
    pub fn new(credentials: JsonOrPath) -> Self {
        ClientOptions {
            service_address: None,
            disable_retries: false,
            client_config: None,
            credentials,
            credentials_config: None,
            transport: Transport::default(),
            transport_config: None,
            version_file: None,
            descriptors_config_path: None,
            service_name: None,
            lib_name: None,
            lib_version: None,
            gapic_version: None,
        }
    }

    /// Set the transport.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set the address of the API remote host.
    pub fn with_service_address(mut self, service_address: impl Into<String>) -> Self {
        self.service_address = Some(service_address.into());
        self
    }

    /// Set the client method configuration.
    pub fn with_client_config(mut self, client_config: JsonOrPath) -> Self {
        self.client_config = Some(client_config);
        self
    }

    /// Address of the API remote host, falling back to the public endpoint.
    pub fn service_address(&self) -> &str {
        self.service_address
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_ADDRESS)
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(address) = self.service_address.as_deref() {
            if address.trim().is_empty() {
                return Err(Error::Config(
                    "\"serviceAddress\" must not be empty".into(),
                ));
            }
        }
        if let JsonOrPath::Path(path) = &self.credentials {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "\"credentials\" must be a path to a credentials file, or a decoded credentials file".into(),
                ));
            }
        }
        Ok(())
    }
}

impl JsonOrPath {
    /// Return the decoded JSON, reading the file first if this is a path.
    pub fn load(&self) -> Result<Value, Error> {
        match self {
            JsonOrPath::Json(map) => Ok(Value::Object(map.clone())),
            JsonOrPath::Path(path) => {
                let content = fs::read(path).map_err(|source| Error::ConfigRead {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_slice(&content).map_err(Error::ConfigParse)
            }
        }
    }
}

impl TryFrom<Value> for JsonOrPath {
    type Error = Error;

    /// Objects become [`JsonOrPath::Json`]; strings become [`JsonOrPath::Path`]. Any other
    /// value fails with [`Error::Config`].
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(JsonOrPath::Json(map)),
            Value::String(path) => Ok(JsonOrPath::Path(path.into())),
            other => Err(Error::Config(format!(
                "expected a JSON object or a path, got {}",
                other
            ))),
        }
    }
}
