//! Invocation report line parsing.

use regex::{Captures, Regex};
use snafu::Snafu;

const REPORT_LINE_PATTERN: &str = r"REPORT RequestId: ([\w-]+)\s+Duration: (\d+(?:\.\d+)?) ms\s+Billed Duration: (\d+) ms\s+Memory Size: (\d+) MB\s+Max Memory Used: (\d+(?:\.\d+)?) MB";

/// Line parsing error.
#[derive(Debug, Snafu, Eq, PartialEq)]
#[snafu(context(suffix(false)))]
pub enum ParseError {
    /// The line is not an invocation report.
    #[snafu(display("line is not an invocation report"))]
    NoMatch,

    /// The line is an invocation report, but one of its numeric fields could not be converted.
    #[snafu(display("invalid value '{}' for field '{}'", value, field))]
    MalformedField {
        /// Name of the field.
        field: &'static str,

        /// Raw value of the field.
        value: String,
    },
}

/// A single parsed invocation report.
///
/// Records borrow from the line they were parsed from, and are meant to be consumed immediately.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvocationRecord<'a> {
    /// Request identifier.
    pub request_id: &'a str,

    /// Execution duration, in milliseconds.
    pub duration_ms: f64,

    /// Billed duration, in milliseconds.
    pub billed_duration_ms: u32,

    /// Configured memory size, in megabytes.
    pub memory_size_mb: u32,

    /// Maximum memory used, in megabytes.
    pub max_memory_used_mb: f64,
}

/// Parser for invocation report lines.
///
/// Fields must appear in a fixed order: request identifier, duration, billed duration, configured memory size, and
/// maximum memory used. Anything before or after the report itself, such as a timestamp prefix or trailing fields, is
/// ignored.
#[derive(Clone, Debug)]
pub struct LineParser {
    pattern: Regex,
}

impl LineParser {
    /// Creates a new `LineParser`.
    ///
    /// # Errors
    ///
    /// If the report line pattern can't be compiled, an error is returned.
    pub fn new() -> Result<Self, regex::Error> {
        let pattern = Regex::new(REPORT_LINE_PATTERN)?;
        Ok(Self { pattern })
    }

    /// Parses a single line.
    ///
    /// # Errors
    ///
    /// If the line is not an invocation report, `ParseError::NoMatch` is returned. If it is, but a numeric field is
    /// out of range for its type, `ParseError::MalformedField` is returned.
    pub fn parse<'a>(&self, line: &'a str) -> Result<InvocationRecord<'a>, ParseError> {
        let captures = self.pattern.captures(line).ok_or(ParseError::NoMatch)?;

        Ok(InvocationRecord {
            request_id: captures.get(1).map_or("", |m| m.as_str()),
            duration_ms: parse_decimal_field(&captures, 2, "duration")?,
            billed_duration_ms: parse_field(&captures, 3, "billed_duration")?,
            memory_size_mb: parse_field(&captures, 4, "memory_size")?,
            max_memory_used_mb: parse_decimal_field(&captures, 5, "max_memory_used")?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(captures: &Captures<'_>, group: usize, field: &'static str) -> Result<T, ParseError> {
    let raw = captures.get(group).map_or("", |m| m.as_str());
    raw.parse().map_err(|_| ParseError::MalformedField {
        field,
        value: raw.to_string(),
    })
}

// Digit strings too long for `f64` parse to infinity rather than failing.
fn parse_decimal_field(captures: &Captures<'_>, group: usize, field: &'static str) -> Result<f64, ParseError> {
    let value: f64 = parse_field(captures, group, field)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::MalformedField {
            field,
            value: captures.get(group).map_or("", |m| m.as_str()).to_string(),
        })
    }
}
