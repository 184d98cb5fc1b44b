//! Tracing subscriber setup, custom formatters, dynamic log level reload.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::fmt::writer::{MakeWriter, OptionalWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{reload, EnvFilter};

// Global reload handle for dynamic log level changes (SIGHUP)
pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
pub static RELOAD_HANDLE: OnceLock<ReloadHandle> = OnceLock::new();

/// Map a user-facing level name onto a tracing filter. CRITICAL maps to ERROR.
pub fn parse_level(level: &str) -> Option<&'static str> {
    match level.trim().to_lowercase().as_str() {
        "critical" => Some("error"),
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}

/// Pick the effective filter: `--log-level`, then `LOG_LEVEL`, then the config file, then INFO.
pub fn resolve_filter(flag: Option<&str>, env: Option<&str>, config: &str) -> &'static str {
    let requested = flag.or(env).unwrap_or(config);
    parse_level(requested).unwrap_or_else(|| {
        eprintln!(
            "Invalid log level '{}'. Using INFO. Valid levels: TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL",
            requested
        );
        "info"
    })
}

// "YYYY-MM-DD HH:MM:SS" (local time)
pub struct LocalTimeFormatter;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

// "YYYY-MM-DD HH:MM:SS [LEVEL] message"; colored level on the console only
pub struct CustomEventFormat {
    pub ansi: bool,
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomEventFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use tracing_subscriber::fmt::time::FormatTime;

        LocalTimeFormatter.format_time(&mut writer)?;
        write!(writer, " ")?;

        let level = event.metadata().level();
        if self.ansi {
            let level_color = match *level {
                tracing::Level::TRACE => "\x1b[2m",  // Dim/gray
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::ERROR => "\x1b[31m", // Red
            };
            write!(writer, "{}[{}]\x1b[0m ", level_color, level)?;
        } else {
            write!(writer, "[{}] ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// File sink that can be attached after the subscriber is installed.
/// Events emitted before `attach` are not written to any file.
#[derive(Clone, Default)]
pub struct DeferredFile {
    slot: Arc<OnceLock<NonBlocking>>,
}

impl DeferredFile {
    /// Open `path` for appending. Keep the returned guard alive to flush buffered lines.
    pub fn attach(&self, path: &Path) -> Result<WorkerGuard> {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .with_context(|| format!("Log file path {:?} has no file name", path))?;
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {:?}", dir))?;

        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if self.slot.set(writer).is_err() {
            bail!("A log file is already attached");
        }
        Ok(guard)
    }
}

impl<'a> MakeWriter<'a> for DeferredFile {
    type Writer = OptionalWriter<NonBlocking>;

    fn make_writer(&'a self) -> Self::Writer {
        match self.slot.get() {
            Some(writer) => OptionalWriter::some(writer.clone()),
            None => OptionalWriter::none(),
        }
    }
}

static LOG_FILE: OnceLock<DeferredFile> = OnceLock::new();

fn file_layer<S>(file: DeferredFile) -> tracing_subscriber::fmt::Layer<S, DefaultFields, CustomEventFormat, DeferredFile>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .event_format(CustomEventFormat { ansi: false })
}

/// Initialize the tracing subscriber with reload capability.
/// Console output starts immediately; a log file can be added later with `attach_log_file`.
pub fn init_tracing(filter: &str) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let (filter_layer, reload_handle) = reload::Layer::new(EnvFilter::new(filter));
    let file = LOG_FILE.get_or_init(DeferredFile::default).clone();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .fmt_fields(DefaultFields::new())
                .event_format(CustomEventFormat { ansi: true }),
        )
        .with(file_layer(file))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let _ = RELOAD_HANDLE.set(reload_handle);
    Ok(())
}

/// Start appending events to `path`. Fails before `init_tracing` or when called twice.
pub fn attach_log_file(path: &Path) -> Result<WorkerGuard> {
    match LOG_FILE.get() {
        Some(file) => file.attach(path),
        None => bail!("Tracing is not initialized"),
    }
}

/// Swap the active filter at runtime. Returns false before `init_tracing` has run.
pub fn reload_level(filter: &str) -> Result<bool> {
    match RELOAD_HANDLE.get() {
        Some(handle) => {
            handle.reload(EnvFilter::new(filter)).context("Failed to reload log level")?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// In-memory log sink for asserting on emitted records.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedLogs {
    /// Subscriber writing INFO and above into this buffer; install with `set_default`.
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .event_format(CustomEventFormat { ansi: false })
            .finish()
    }

    pub(crate) fn lines_containing(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).lines().filter(|line| line.contains(needle)).count()
    }
}

#[cfg(test)]
impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
