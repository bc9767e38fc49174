/// Failures surfaced by the telemetry layer.
///
/// Only `MissingConfig` (at construction) and `InvalidArgument` (before
/// an emission) ever reach callers. The rest are reported to the sink
/// and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("a value for '{field}' was not passed")]
    MissingConfig { field: &'static str },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("telemetry sink failed: {0}")]
    Sink(String),
    #[error("telemetry operation panicked: {0}")]
    Panicked(String),
}

pub(crate) fn ensure_not_empty(value: &str, message: &str) -> Result<(), TelemetryError> {
    if value.is_empty() {
        return Err(TelemetryError::InvalidArgument(message.to_string()));
    }
    Ok(())
}
