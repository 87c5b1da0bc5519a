use google_cloud_error_reporting::{
    install_panic_hook, CapturedError, Config, ErrorReporter, GoogleCloudErrorReporter,
    ReportOptions,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("payment declined for order {0}")]
struct PaymentDeclined(u32);

fn main() {
    env_logger::init();

    let config = Config::from_env()
        .expect("env var GOOGLE_CLOUD_ERROR_REPORTING_CONFIG should name a valid config file");
    let reporter = Arc::new(
        GoogleCloudErrorReporter::new(config, reqwest::blocking::Client::new())
            .expect("client_options.transport should be \"rest\""),
    );

    let reported = reporter.report(
        &CapturedError::new(PaymentDeclined(42)),
        ReportOptions::default().with_user("alice"),
    );
    println!("reported: {}", reported);

    install_panic_hook(reporter);
    panic!("unrecoverable");
}
