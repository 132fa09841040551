//! Observability for kvguard
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Security audit sinks
//!
//! Observability never fails the operation being observed.

mod events;
mod logger;
pub mod audit;

pub use audit::{
    AuditSink, FileAuditSink, LogAuditSink, MemoryAuditSink, SecurityEvent, SecurityEventType,
    UserContext,
};
pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event with fields.
///
/// Warning events are logged at WARN, everything else at INFO.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::StoreOpened, &[]);
        log_event(Event::CorruptionDetected, &[("key", "tasks")]);
    }
}
