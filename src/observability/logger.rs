//! Structured JSON logger.
//!
//! One log line per event, synchronous, with deterministic key ordering
//! so log output is stable across runs.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail.
    Trace = 0,
    /// Normal operations.
    Info = 1,
    /// Recoverable issues.
    Warn = 2,
    /// Operation failures.
    Error = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured logger writing one JSON object per event.
pub struct Logger;

impl Logger {
    /// Logs an event with the given severity and fields.
    ///
    /// Fields are written in alphabetical key order.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        Self::log_to_writer(severity, event, fields, &mut io::stderr());
    }

    fn log_to_writer<W: Write>(severity: Severity, event: &str, fields: &[(&str, &str)], writer: &mut W) {
        let mut output = String::with_capacity(128);
        output.push('{');
        push_field(&mut output, "event", event);
        output.push(',');
        push_field(&mut output, "severity", severity.as_str());

        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, value) in sorted {
            output.push(',');
            push_field(&mut output, key, value);
        }
        output.push('}');
        output.push('\n');

        // Logging must never fail the operation being logged.
        let _ = writer.write_all(output.as_bytes());
    }
}

fn push_field(output: &mut String, key: &str, value: &str) {
    output.push('"');
    escape_into(output, key);
    output.push_str("\":\"");
    escape_into(output, value);
    output.push('"');
}

fn escape_into(output: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}
