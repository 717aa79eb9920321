/// Record an exception to the currently active span, making sure the record location is added to the stacktrace.
/// Matches oltp spec so it shows up correctly as an exception in observers
/// <https://opentelemetry.io/docs/specs/semconv/exceptions/exceptions-spans/>
///
/// Arguments:
/// - `message`: Information about the exception e.g. `Failed to get connection to instance`.
/// - `stacktrace`: All of the location information for the exception, (maybe also the exception itself if e.g. from `Report<T>`).
#[track_caller]
pub fn record_exception(message: impl Into<String>, stacktrace: impl Into<String>) {
    let caller = std::panic::Location::caller();
    let mut stacktrace = stacktrace.into();
    stacktrace = if stacktrace.trim().is_empty() {
        format!("╰╴at {}", caller)
    } else {
        format!("{}\n╰╴at {}", stacktrace, caller)
    };
    tracing::event!(
        tracing::Level::ERROR,
        name = "exception", // Must be named this for observers to recognise it as an exception
        exception.message = message.into(),
        exception.stacktrace = stacktrace,
        "exception.type" = "Err"
    );
}
