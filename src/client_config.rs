//! Retry policy from GAPIC client configuration.
//!
//! The client configuration is the JSON document Google publishes for every API client:
//!
//! ```json
//! {
//!   "interfaces": {
//!     "google.devtools.clouderrorreporting.v1beta1.ReportErrorsService": {
//!       "retry_codes": { "idempotent": ["DEADLINE_EXCEEDED", "UNAVAILABLE"], "non_idempotent": [] },
//!       "retry_params": {
//!         "default": {
//!           "initial_retry_delay_millis": 100,
//!           "retry_delay_multiplier": 1.3,
//!           "max_retry_delay_millis": 60000,
//!           "total_timeout_millis": 600000
//!         }
//!       },
//!       "methods": {
//!         "ReportErrorEvent": {
//!           "timeout_millis": 60000,
//!           "retry_codes_name": "non_idempotent",
//!           "retry_params_name": "default"
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::Error;
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, time::Duration};

pub(crate) const SERVICE_INTERFACE: &str =
    "google.devtools.clouderrorreporting.v1beta1.ReportErrorsService";
pub(crate) const METHOD: &str = "ReportErrorEvent";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Retry settings for a single call, overriding the client configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetrySettings {
    /// Turn retries on or off.
    #[serde(default)]
    pub retries_enabled: Option<bool>,
    /// Canonical error codes to retry, e.g. `UNAVAILABLE`.
    #[serde(default)]
    pub retryable_codes: Option<Vec<String>>,
    /// Delay before the first retry.
    #[serde(default)]
    pub initial_retry_delay_millis: Option<u64>,
    /// Factor applied to the delay after each retry.
    #[serde(default)]
    pub retry_delay_multiplier: Option<f32>,
    /// Upper bound for the delay between retries.
    #[serde(default)]
    pub max_retry_delay_millis: Option<u64>,
    /// Time after which no further retry is started.
    #[serde(default)]
    pub total_timeout_millis: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClientConfig {
    #[serde(default)]
    interfaces: HashMap<String, InterfaceConfig>,
}

#[derive(Debug, Deserialize)]
struct InterfaceConfig {
    #[serde(default)]
    retry_codes: HashMap<String, Vec<String>>,
    #[serde(default)]
    retry_params: HashMap<String, RetryParams>,
    #[serde(default)]
    methods: HashMap<String, MethodConfig>,
}

#[derive(Debug, Deserialize)]
struct RetryParams {
    initial_retry_delay_millis: u64,
    retry_delay_multiplier: f32,
    max_retry_delay_millis: u64,
    total_timeout_millis: u64,
}

#[derive(Debug, Deserialize)]
struct MethodConfig {
    #[serde(default)]
    timeout_millis: Option<u64>,
    #[serde(default)]
    retry_codes_name: Option<String>,
    #[serde(default)]
    retry_params_name: Option<String>,
}

/// How the `ReportErrorEvent` call is retried.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RetryPolicy {
    pub(crate) enabled: bool,
    pub(crate) retryable_codes: Vec<String>,
    pub(crate) initial_delay: Duration,
    pub(crate) multiplier: f32,
    pub(crate) max_delay: Duration,
    pub(crate) total_timeout: Duration,
    pub(crate) timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    /// The published configuration treats `ReportErrorEvent` as non-idempotent: no retries.
    fn default() -> Self {
        RetryPolicy {
            enabled: true,
            retryable_codes: Vec::new(),
            initial_delay: Duration::from_millis(100),
            multiplier: 1.3,
            max_delay: Duration::from_secs(60),
            total_timeout: DEFAULT_TIMEOUT,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl RetryPolicy {
    /// Read the policy for `ReportErrorEvent` from a client configuration document.
    pub(crate) fn from_client_config(config: Value) -> Result<Self, Error> {
        let config: ClientConfig = serde_json::from_value(config).map_err(Error::ConfigParse)?;
        let mut policy = RetryPolicy::default();
        let interface = match config.interfaces.get(SERVICE_INTERFACE) {
            Some(interface) => interface,
            None => return Ok(policy),
        };
        let method = match interface.methods.get(METHOD) {
            Some(method) => method,
            None => return Ok(policy),
        };

        if let Some(timeout_millis) = method.timeout_millis {
            policy.timeout = Some(Duration::from_millis(timeout_millis));
        }
        if let Some(name) = method.retry_codes_name.as_deref() {
            policy.retryable_codes = interface
                .retry_codes
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Config(format!("unknown retry_codes_name \"{}\"", name)))?;
        }
        if let Some(name) = method.retry_params_name.as_deref() {
            let params = interface.retry_params.get(name).ok_or_else(|| {
                Error::Config(format!("unknown retry_params_name \"{}\"", name))
            })?;
            policy.initial_delay = Duration::from_millis(params.initial_retry_delay_millis);
            policy.multiplier = params.retry_delay_multiplier;
            policy.max_delay = Duration::from_millis(params.max_retry_delay_millis);
            policy.total_timeout = Duration::from_millis(params.total_timeout_millis);
        }
        Ok(policy)
    }

    pub(crate) fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Apply per-call overrides.
    pub(crate) fn with_overrides(
        mut self,
        settings: Option<&RetrySettings>,
        timeout_millis: Option<u64>,
    ) -> Self {
        if let Some(timeout_millis) = timeout_millis {
            self.timeout = Some(Duration::from_millis(timeout_millis));
        }
        let settings = match settings {
            Some(settings) => settings,
            None => return self,
        };
        if let Some(enabled) = settings.retries_enabled {
            self.enabled = enabled;
        }
        if let Some(codes) = &settings.retryable_codes {
            self.retryable_codes = codes.clone();
        }
        if let Some(millis) = settings.initial_retry_delay_millis {
            self.initial_delay = Duration::from_millis(millis);
        }
        if let Some(multiplier) = settings.retry_delay_multiplier {
            self.multiplier = multiplier;
        }
        if let Some(millis) = settings.max_retry_delay_millis {
            self.max_delay = Duration::from_millis(millis);
        }
        if let Some(millis) = settings.total_timeout_millis {
            self.total_timeout = Duration::from_millis(millis);
        }
        self
    }

    /// Returns `true` if a failed call may be retried at all.
    pub(crate) fn retries(&self) -> bool {
        self.enabled && !self.retryable_codes.is_empty()
    }
}
