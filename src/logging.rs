use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Event formatter that colors each log line by severity.
///
/// The binary talks to a person at a terminal, so lines carry no timestamps
/// or level tags; severity is conveyed by color alone. Errors stand out in
/// red, warnings in yellow, and the debug/trace chatter enabled by
/// `--verbose` is dimmed so the payload output stays readable.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Render the fields into a buffer first; color applies to whole
        // lines, and the field formatter writes piecemeal.
        let mut line = String::new();
        let mut line_writer = Writer::new(&mut line);
        ctx.format_fields(line_writer.by_ref(), event)?;

        let colored_line = match *event.metadata().level() {
            Level::ERROR => line.red().bold(),
            Level::WARN => line.yellow(),
            Level::INFO => line.normal(),
            Level::DEBUG => line.dimmed(),
            Level::TRACE => line.dimmed().italic(),
        };

        writeln!(writer, "{colored_line}")
    }
}
