//! JSON-lines logger
//!
//! Each call emits exactly one line: `event`, then `severity`, then the
//! caller's fields in key order. Output is written and flushed immediately.
//! Anything below the process-wide threshold is discarded before rendering.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Trace = 0,
    Info = 1,
    /// Healed corruption, quota pressure
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    const ALL: [Severity; 5] = [
        Severity::Trace,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_level(level: u8) -> Self {
        Self::ALL
            .get(level as usize)
            .copied()
            .unwrap_or(Severity::Fatal)
    }

    /// ERROR and FATAL are written to stderr
    fn uses_stderr(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Builds one log line
struct LogLine<'a> {
    severity: Severity,
    event: &'a str,
    fields: Vec<(&'a str, &'a str)>,
}

impl<'a> LogLine<'a> {
    fn new(severity: Severity, event: &'a str, fields: &[(&'a str, &'a str)]) -> Self {
        let mut fields = fields.to_vec();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        Self {
            severity,
            event,
            fields,
        }
    }

    fn render(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|(k, v)| format!(",{}:{}", json_str(k), json_str(v)))
            .collect::<String>();
        format!(
            "{{\"event\":{},\"severity\":\"{}\"{}}}\n",
            json_str(self.event),
            self.severity,
            body
        )
    }

    fn write_to<W: Write>(&self, out: &mut W) {
        // write errors are dropped
        let _ = out
            .write_all(self.render().as_bytes())
            .and_then(|_| out.flush());
    }
}

fn json_str(s: &str) -> String {
    Value::from(s).to_string()
}

/// Process-wide structured logger
pub struct Logger;

impl Logger {
    pub fn set_min_severity(severity: Severity) {
        THRESHOLD.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_level(THRESHOLD.load(Ordering::Relaxed))
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < Self::min_severity() {
            return;
        }
        let line = LogLine::new(severity, event, fields);
        if severity.uses_stderr() {
            line.write_to(&mut io::stderr().lock());
        } else {
            line.write_to(&mut io::stdout().lock());
        }
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    LogLine::new(severity, event, fields).write_to(&mut buffer);
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_round_trip_through_threshold_encoding() {
        for severity in Severity::ALL {
            assert_eq!(Severity::from_level(severity as u8), severity);
        }
        assert_eq!(Severity::from_level(200), Severity::Fatal);
        assert!(Severity::Error.uses_stderr());
        assert!(!Severity::Warn.uses_stderr());
    }

    #[test]
    fn test_line_is_valid_json() {
        let output = capture_log(Severity::Warn, "CORRUPTION_DETECTED", &[("key", "tasks")]);
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "CORRUPTION_DETECTED");
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["key"], "tasks");
    }

    #[test]
    fn test_field_order_is_stable() {
        let a = capture_log(Severity::Info, "E", &[("zebra", "1"), ("apple", "2")]);
        let b = capture_log(Severity::Info, "E", &[("apple", "2"), ("zebra", "1")]);
        assert_eq!(a, b);
        assert!(a.starts_with("{\"event\":\"E\",\"severity\":\"INFO\""));
        assert!(a.find("apple").unwrap() < a.find("zebra").unwrap());
    }

    #[test]
    fn test_control_characters_stay_on_one_line() {
        let output = capture_log(Severity::Info, "E", &[("message", "say \"hi\"\nbye")]);
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["message"], "say \"hi\"\nbye");
        assert_eq!(output.matches('\n').count(), 1);
    }
}
