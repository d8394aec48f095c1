use std::{fmt, str::FromStr as _};

use chrono::{SecondsFormat, Utc};
use chrono_tz::Tz;
use tracing::{field, Event, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, Layer, MakeWriter},
    layer,
    registry::LookupSpan,
    Layer as _,
};

use super::LoggingConfiguration;

pub fn build_formatting_layer<S, W>(config: &LoggingConfiguration, writer: W) -> Box<dyn layer::Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    if config.log_format_json() {
        Layer::new()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_target(true)
            .with_writer(writer)
            .boxed()
    } else {
        Layer::new()
            .event_format(ConsoleFormatter::new(system_timezone()))
            .with_writer(writer)
            .boxed()
    }
}

/// Resolves the local timezone, falling back to UTC.
fn system_timezone() -> Tz {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| Tz::from_str(&name).ok())
        .unwrap_or(Tz::UTC)
}

/// Formats events on a single line as `<timestamp> <LEVEL> <target>: <message> key=value ...`.
///
/// Timestamps are RFC 3339 with millisecond precision, in the given timezone.
struct ConsoleFormatter {
    timezone: Tz,
}

impl ConsoleFormatter {
    fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let metadata = event.metadata();
        let timestamp = Utc::now()
            .with_timezone(&self.timezone)
            .to_rfc3339_opts(SecondsFormat::Millis, false);

        write!(
            writer,
            "{} {:>5} {}: ",
            timestamp,
            metadata.level().as_str(),
            metadata.target()
        )?;

        let mut visitor = ConsoleFieldVisitor::default();
        event.record(&mut visitor);
        writer.write_str(&visitor.message)?;
        writer.write_str(&visitor.fields)?;

        writeln!(writer)
    }
}

/// Collects the message and the remaining fields of an event.
///
/// Fields are rendered as ` key=value`, with string values quoted when they are empty or contain whitespace, `=`, or
/// quotes.
#[derive(Default)]
struct ConsoleFieldVisitor {
    message: String,
    fields: String,
}

impl ConsoleFieldVisitor {
    fn push_field(&mut self, field: &field::Field, value: fmt::Arguments<'_>) {
        use std::fmt::Write as _;

        // Writing to a `String` can't fail.
        let _ = write!(self.fields, " {}={}", field.name(), value);
    }

    fn push_str(&mut self, field: &field::Field, value: &str) {
        if needs_quoting(value) {
            self.push_field(field, format_args!("{:?}", value));
        } else {
            self.push_field(field, format_args!("{}", value));
        }
    }
}

impl field::Visit for ConsoleFieldVisitor {
    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.push_str(field, &rendered);
        }
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_str(field, value);
        }
    }

    fn record_f64(&mut self, field: &field::Field, value: f64) {
        self.push_field(field, format_args!("{}", value));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.push_field(field, format_args!("{}", value));
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.push_field(field, format_args!("{}", value));
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.push_field(field, format_args!("{}", value));
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '=' || c == '"')
}
