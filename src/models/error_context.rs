use crate::models::HttpRequestContext;
use serde::Serialize;

/// A description of the context in which an error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// The HTTP request which was processed when the error was triggered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestContext>,

    /// The user who caused or was affected by the crash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}
