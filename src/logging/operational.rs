use std::fmt::Write as _;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::config::UdpPingConfig;
use crate::logging::rotating_writer::RotatingFileWriter;

/// `<timestamp> <level> [PID=<pid>] <message>` - one line per event
pub struct OperationalFormat {
    pid: u32,
}
impl OperationalFormat {
    pub fn new() -> OperationalFormat {
        OperationalFormat {
            pid: std::process::id(),
        }
    }
}
impl Default for OperationalFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for OperationalFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        write!(writer, "{} {} [PID={}] ",
               Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
               event.metadata().level(),
               self.pid,
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}


/// Installs the global tracing subscriber, writing the operational log to a daily rotated
///  file in the configured log directory
pub fn init_operational_log(config: &UdpPingConfig, level: Level) -> anyhow::Result<()> {
    let path = config.operational_log_file();
    let writer = RotatingFileWriter::open(&path, config.log_rotation_interval, None)
        .with_context(|| format!("error opening log file {:?}", path))?;

    tracing_subscriber::fmt()
        .with_ansi(false)
        .event_format(OperationalFormat::new())
        .with_writer(Mutex::new(writer))
        .with_max_level(level)
        .try_init()
        .map_err(|e| anyhow!("error installing log subscriber: {}", e))
}
