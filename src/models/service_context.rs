use serde::Serialize;

/// Describes a running service that sends errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContext {
    /// An identifier of the service, such as the name of the executable, job, or Google App
    /// Engine service name.
    pub service: String,

    /// Represents the source code version that the developer provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
