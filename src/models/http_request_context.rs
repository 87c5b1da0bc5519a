use serde::Serialize;

/// HTTP request data that is related to a reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestContext {
    /// The type of HTTP request, such as `GET`, `POST`, etc.
    pub method: String,

    /// The URL of the request.
    pub url: String,

    /// The user agent information that is provided with the request.
    pub user_agent: String,

    /// The referrer information that is provided with the request.
    pub referrer: String,

    /// The HTTP response status code for the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status_code: Option<i32>,

    /// The IP address from which the request originated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
}
