//! Request types of the Error Reporting API `events:report` method.

mod error_context;
mod http_request_context;
mod reported_error_event;
mod service_context;
mod timestamp;

pub use error_context::*;
pub use http_request_context::*;
pub use reported_error_event::*;
pub use service_context::*;
pub use timestamp::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_format() {
        let event = ReportedErrorEvent {
            event_time: Timestamp {
                seconds: 1_592_736_000,
                nanos: 123_456_000,
            },
            service_context: ServiceContext {
                service: "checkout".into(),
                version: None,
            },
            message: "PHP Fatal error: app::Error: boom".into(),
            context: Some(ErrorContext {
                http_request: Some(HttpRequestContext {
                    method: "GET".into(),
                    url: "https://x/y".into(),
                    user_agent: "".into(),
                    referrer: "".into(),
                    response_status_code: Some(500),
                    remote_ip: None,
                }),
                user: Some("alice".into()),
            }),
        };
        let serialized = serde_json::to_string(&event).unwrap();
        let expected = "{\"eventTime\":\"2020-06-21T10:40:00.123456000Z\",\"serviceContext\":{\"service\":\"checkout\"},\"message\":\"PHP Fatal error: app::Error: boom\",\"context\":{\"httpRequest\":{\"method\":\"GET\",\"url\":\"https://x/y\",\"userAgent\":\"\",\"referrer\":\"\",\"responseStatusCode\":500},\"user\":\"alice\"}}";
        assert_eq!(expected, serialized);
    }

    #[test]
    fn empty_context_is_omitted() {
        let event = ReportedErrorEvent {
            event_time: Timestamp {
                seconds: 0,
                nanos: 0,
            },
            service_context: ServiceContext {
                service: "svc".into(),
                version: None,
            },
            message: "m".into(),
            context: Some(ErrorContext::default()),
        };
        let serialized = serde_json::to_string(&event).unwrap();
        assert_eq!(
            "{\"eventTime\":\"1970-01-01T00:00:00.000000000Z\",\"serviceContext\":{\"service\":\"svc\"},\"message\":\"m\",\"context\":{}}",
            serialized
        );
    }
}
