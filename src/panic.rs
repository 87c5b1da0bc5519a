use crate::{CapturedError, ErrorReporter, ReportOptions};
use std::panic;

/// Report every panic with the given reporter.
///
/// The panic is reported with default [`ReportOptions`] before the previously installed hook
/// runs, so the default panic message is still printed.
pub fn install_panic_hook<R>(reporter: R)
where
    R: ErrorReporter + Send + Sync + 'static,
{
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        reporter.report(&CapturedError::from_panic(info), ReportOptions::default());
        previous(info);
    }));
}
