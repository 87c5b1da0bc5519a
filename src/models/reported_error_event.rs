use crate::models::{ErrorContext, ServiceContext, Timestamp};
use serde::Serialize;

/// An error event which is reported to the Error Reporting system.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedErrorEvent {
    /// Time when the event occurred.
    pub event_time: Timestamp,

    /// The service context in which this error has occurred.
    pub service_context: ServiceContext,

    /// The error message.
    ///
    /// The message contains the error type, its message and its stack trace.
    pub message: String,

    /// A description of the context in which the error occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
}
