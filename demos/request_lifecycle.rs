use google_cloud_error_reporting::{
    listener_from_config, models::ReportedErrorEvent, CallOptions, CapturedError, ClientFactory,
    ClientOptions, CompletionEvent, Config, Error, ErrorEvent, GoogleCloudErrorReporter,
    HttpRequestInfo, JsonOrPath, ReportErrorListener, ReportErrorsClient, UserProvider,
};
use http::{header, Method, Request};
use std::sync::Arc;

/// Prints events instead of sending them.
#[derive(Debug)]
struct StdoutFactory;

struct StdoutClient;

impl ClientFactory for StdoutFactory {
    type Client = StdoutClient;

    fn create(&self, _options: &ClientOptions) -> Result<Self::Client, Error> {
        Ok(StdoutClient)
    }
}

impl ReportErrorsClient for StdoutClient {
    fn report_error_event(
        &mut self,
        project_name: &str,
        event: &ReportedErrorEvent,
        _options: &CallOptions,
    ) -> Result<(), Error> {
        let event = serde_json::to_string_pretty(event).map_err(Error::UploadSerializeRequest)?;
        println!("{}: {}", project_name, event);
        Ok(())
    }

    fn close(&mut self) {}
}

#[derive(Debug)]
struct Session;

impl UserProvider for Session {
    fn current_username(&self) -> Option<String> {
        Some("alice".into())
    }
}

fn main() {
    env_logger::init();

    let config = Config::new(
        "my-project",
        "checkout",
        ClientOptions::new(JsonOrPath::Path("unused.json".into())),
    );
    let reporter = GoogleCloudErrorReporter::from_client_factory(config.clone(), StdoutFactory)
        .with_user_provider(Session);
    let listener =
        listener_from_config(&config, Arc::new(reporter)).expect("listeners are enabled");

    type Listener = ReportErrorListener<Arc<GoogleCloudErrorReporter<StdoutFactory>>>;
    for (channel, priority) in Listener::subscribed_events() {
        println!("subscribe {} with priority {}", channel.as_str(), priority);
    }

    let request = Request::get("https://shop.example.com/checkout?cart=7")
        .header(header::USER_AGENT, "demo/1.0")
        .body(())
        .expect("request is well formed");

    let mut lifecycle = listener.lifecycle();
    let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "inventory service timed out");
    lifecycle.on_error(ErrorEvent::Exception(CapturedError::new(error)));
    let reported = lifecycle.on_complete(CompletionEvent::Http {
        request: HttpRequestInfo::from_request(&request),
        status: 504,
    });
    println!("reported: {}", reported);

    let lifecycle = listener.lifecycle();
    let reported = lifecycle.on_complete(CompletionEvent::Http {
        request: HttpRequestInfo::new(Method::GET, "/health".parse().expect("uri is valid")),
        status: 200,
    });
    println!("reported without error: {}", reported);
}
