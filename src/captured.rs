use std::{
    backtrace::{Backtrace, BacktraceStatus},
    error::Error as StdError,
    fmt,
    panic::PanicHookInfo,
};

/// Type name used for errors captured from panics.
pub const PANIC_TYPE_NAME: &str = "panic";

/// An error captured at the moment it was observed.
///
/// Holds everything needed to report the error later: its type name, message, cause chain and a
/// backtrace. The backtrace is only captured if enabled with `RUST_BACKTRACE` or
/// `RUST_LIB_BACKTRACE`.
///
/// The [`Display`](fmt::Display) implementation renders the string form sent to Error Reporting:
///
/// ```text
/// my_app::Error: something failed
/// Caused by: connection refused
/// Stack trace:
///    0: my_app::handler
///    ...
/// ```
#[derive(Debug)]
pub struct CapturedError {
    type_name: String,
    message: String,
    causes: Vec<String>,
    backtrace: Option<String>,
}

impl CapturedError {
    /// Capture an error of a concrete type.
    pub fn new<E: StdError + 'static>(error: E) -> Self {
        Self::from_dyn(std::any::type_name::<E>(), &error)
    }

    /// Capture a type-erased error under the given type name.
    pub fn from_dyn(type_name: impl Into<String>, error: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(err) = source {
            causes.push(err.to_string());
            source = err.source();
        }
        CapturedError {
            type_name: type_name.into(),
            message: error.to_string(),
            causes,
            backtrace: capture_backtrace(),
        }
    }

    /// Capture an error from its parts, e.g. an error reported by a non-Rust component.
    pub fn from_parts(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        CapturedError {
            type_name: type_name.into(),
            message: message.into(),
            causes: Vec::new(),
            backtrace: capture_backtrace(),
        }
    }

    /// Capture a panic from within a panic hook.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".into());
        let message = match info.location() {
            Some(location) => format!("{} at {}", payload, location),
            None => payload,
        };
        CapturedError {
            type_name: PANIC_TYPE_NAME.into(),
            message,
            causes: Vec::new(),
            backtrace: Some(Backtrace::force_capture().to_string()),
        }
    }

    /// Replace the captured backtrace, e.g. with one provided by the error itself.
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    /// Fully qualified type name of the error.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of the error's sources, outermost first.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// The rendered backtrace, if one was captured.
    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    /// Returns `true` if the error is of the named type.
    ///
    /// The name matches if it is
    /// - the error's type name, e.g. `std::io::error::Error`,
    /// - the error's type name without generic arguments, e.g. `my_app::Wrapper` matches
    ///   `my_app::Wrapper<my_app::Inner>`,
    /// - a module wildcard such as `my_app::http::*`, which matches every type declared in that
    ///   module or any of its submodules.
    pub fn is_instance_of(&self, name: &str) -> bool {
        let name = name.trim();
        let type_name = self.type_name.as_str();
        if let Some(module) = name.strip_suffix("::*") {
            return base_name(type_name)
                .strip_prefix(module)
                .map_or(false, |rest| rest.starts_with("::"));
        }
        type_name == name || base_name(type_name) == name
    }
}

fn base_name(type_name: &str) -> &str {
    type_name
        .split_once('<')
        .map_or(type_name, |(base, _)| base)
}

fn capture_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)?;
        for cause in &self.causes {
            write!(f, "\nCaused by: {}", cause)?;
        }
        if let Some(backtrace) = &self.backtrace {
            write!(f, "\nStack trace:\n{}", backtrace)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failed")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn captures_type_message_and_causes() {
        let error = CapturedError::new(Outer(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )));
        assert!(error.type_name().ends_with("::Outer"));
        assert_eq!("outer failed", error.message());
        assert_eq!(&["disk full".to_string()], error.causes());
    }

    #[test]
    fn display() {
        let error = CapturedError::from_parts("app::Error", "boom").with_backtrace("   0: main");
        assert_eq!("app::Error: boom\nStack trace:\n   0: main", error.to_string());

        let mut error = CapturedError::from_dyn(
            "app::Error",
            &Outer(std::io::Error::new(std::io::ErrorKind::Other, "disk full")),
        );
        error.backtrace = None;
        assert_eq!(
            "app::Error: outer failed\nCaused by: disk full",
            error.to_string()
        );
    }

    #[test_case("app::Error", "app::Error", true ; "exact")]
    #[test_case("app::Error", "app::Err", false ; "prefix is no match")]
    #[test_case("app::Wrapper<app::Inner>", "app::Wrapper", true ; "generic erased")]
    #[test_case("app::Wrapper<app::Inner>", "app::Inner", false ; "generic argument")]
    #[test_case("app::http::NotFound", "app::*", true ; "module wildcard")]
    #[test_case("app::http::NotFound", "app::http::*", true ; "submodule wildcard")]
    #[test_case("application::Error", "app::*", false ; "wildcard respects path segments")]
    #[test_case("app::Error", "other::*", false ; "other module")]
    #[test_case("std::io::error::Error", " std::io::error::Error ", true ; "surrounding whitespace")]
    fn is_instance_of(type_name: &str, ignored: &str, expected: bool) {
        let error = CapturedError::from_parts(type_name, "m");
        assert_eq!(expected, error.is_instance_of(ignored));
    }
}
