//! Named application loggers handed to components through the `logger` handler.
//!
//! A [`Logger`] owns three transports: console (stdout), a rotating file and
//! a rotating error-only file. Each transport is a `tracing-subscriber` fmt
//! layer behind a reloadable threshold filter, on top of the logger-wide level.

use crate::rotate::RotWriter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::subscriber::Interest;
use tracing::{Dispatch, Event, Level, Metadata, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::{Context, Filter, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::{reload, Layer};

pub const DEFAULT_FILE_LOG_NAME: &str = "wirekit-core.log";
pub const DEFAULT_ERROR_LOG_NAME: &str = "common-error.log";
pub const DEFAULT_MAX_SIZE_MB: u64 = 200;
pub const DEFAULT_MAX_FILES: usize = 31;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
const LEVEL_TARGET_PREFIX: &str = "wirekit::logger::";
const RAW_TARGET: &str = "wirekit::logger_raw";

/// Severity, most severe first. `None` silences a transport, `All` lets everything through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LoggerLevel {
    None,
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Silly,
    All,
}

impl LoggerLevel {
    pub fn as_upper(&self) -> &'static str {
        match self {
            LoggerLevel::None => "NONE",
            LoggerLevel::Error => "ERROR",
            LoggerLevel::Warn => "WARN",
            LoggerLevel::Info => "INFO",
            LoggerLevel::Verbose => "VERBOSE",
            LoggerLevel::Debug => "DEBUG",
            LoggerLevel::Silly => "SILLY",
            LoggerLevel::All => "ALL",
        }
    }

    fn from_target(target: &str) -> Option<Self> {
        match target.strip_prefix(LEVEL_TARGET_PREFIX)? {
            "error" => Some(LoggerLevel::Error),
            "warn" => Some(LoggerLevel::Warn),
            "info" => Some(LoggerLevel::Info),
            "verbose" => Some(LoggerLevel::Verbose),
            "debug" => Some(LoggerLevel::Debug),
            "silly" => Some(LoggerLevel::Silly),
            "all" => Some(LoggerLevel::All),
            _ => None,
        }
    }

    /// Whether a record at `self` passes a `threshold`.
    fn passes(self, threshold: LoggerLevel) -> bool {
        self != LoggerLevel::None && threshold != LoggerLevel::None && self <= threshold
    }
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upper())
    }
}

/// Serializable logger options; every field is optional so client sections
/// can be layered over the `logger.default` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_log_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LoggerLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_level: Option<LoggerLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_level: Option<LoggerLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_console: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_file: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_label: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub default_meta: Map<String, Value>,
}

impl LoggerConfig {
    /// Field-wise overlay: values set in `over` win, `default_meta` merges per key.
    pub fn overlay(&self, over: &LoggerConfig) -> LoggerConfig {
        let mut default_meta = self.default_meta.clone();
        default_meta.extend(over.default_meta.clone());
        LoggerConfig {
            dir: over.dir.clone().or_else(|| self.dir.clone()),
            file_log_name: over
                .file_log_name
                .clone()
                .or_else(|| self.file_log_name.clone()),
            error_log_name: over
                .error_log_name
                .clone()
                .or_else(|| self.error_log_name.clone()),
            level: over.level.or(self.level),
            console_level: over.console_level.or(self.console_level),
            file_level: over.file_level.or(self.file_level),
            max_size_mb: over.max_size_mb.or(self.max_size_mb),
            max_files: over.max_files.or(self.max_files),
            disable_console: over.disable_console.or(self.disable_console),
            disable_file: over.disable_file.or(self.disable_file),
            disable_error: over.disable_error.or(self.disable_error),
            default_label: over
                .default_label
                .clone()
                .or_else(|| self.default_label.clone()),
            default_meta,
        }
    }

    fn dir_path(&self) -> PathBuf {
        PathBuf::from(self.dir.as_deref().unwrap_or("logs"))
    }
}

/// `logger` section of the configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerServiceConfig {
    pub default: LoggerConfig,
    pub clients: HashMap<String, LoggerConfig>,
}

/// One log event as seen by the format hook and the info handler.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: LoggerLevel,
    pub pid: u32,
    pub labels: Vec<String>,
    pub message: String,
    pub meta: Map<String, Value>,
}

impl LogRecord {
    /// `[a:b] ` or the empty string when there are no labels.
    pub fn label_text(&self) -> String {
        if self.labels.is_empty() {
            String::new()
        } else {
            format!("[{}] ", self.labels.join(":"))
        }
    }
}

pub type PrintFormat = Arc<dyn Fn(&LogRecord) -> String + Send + Sync>;
pub type InfoHandler = Arc<dyn Fn(&mut LogRecord) + Send + Sync>;

/// Code-level options that cannot live in configuration.
#[derive(Clone, Default)]
pub struct LoggerOptions {
    pub config: LoggerConfig,
    pub print_format: Option<PrintFormat>,
}

impl From<LoggerConfig> for LoggerOptions {
    fn from(config: LoggerConfig) -> Self {
        Self {
            config,
            print_format: None,
        }
    }
}

pub fn default_format(record: &LogRecord) -> String {
    format!(
        "{} {} {} {}{}",
        record.timestamp,
        record.level.as_upper(),
        record.pid,
        record.label_text(),
        record.message
    )
}

/// Per-transport threshold, swapped at runtime through a reload handle.
#[derive(Debug, Clone, Copy)]
struct Threshold {
    level: LoggerLevel,
    enabled: bool,
}

impl Threshold {
    fn new(level: LoggerLevel, enabled: bool) -> Self {
        Self { level, enabled }
    }
}

impl<S> Filter<S> for Threshold {
    fn enabled(&self, meta: &Metadata<'_>, _: &Context<'_, S>) -> bool {
        if !self.enabled {
            return false;
        }
        if meta.target() == RAW_TARGET {
            return true;
        }
        LoggerLevel::from_target(meta.target()).is_some_and(|l| l.passes(self.level))
    }

    // thresholds change at runtime, so never let a callsite cache the answer
    fn callsite_enabled(&self, _: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }
}

type ThresholdHandle = reload::Handle<Threshold, Registry>;
type TransportLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Writes the pre-formatted line carried in the event message.
struct LineOnly;

impl<S, N> FormatEvent<S, N> for LineOnly
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
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Rotating file opened on first enable; writes are dropped until then.
#[derive(Clone)]
struct FileSink {
    path: PathBuf,
    max_bytes: usize,
    max_files: usize,
    writer: Arc<OnceLock<RotWriter>>,
}

impl FileSink {
    fn new(config: &LoggerConfig, name: &str) -> Self {
        Self {
            path: config.dir_path().join(name),
            max_bytes: config.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024,
            max_files: config.max_files.unwrap_or(DEFAULT_MAX_FILES),
            writer: Arc::new(OnceLock::new()),
        }
    }

    fn open(&self) -> std::io::Result<()> {
        if self.writer.get().is_none() {
            let writer = RotWriter::open(&self.path, self.max_bytes, None, Some(self.max_files))?;
            let _ = self.writer.set(writer);
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter(self.writer.get().cloned())
    }
}

/// Flushes after every line so readers see complete records.
struct LineWriter(Option<RotWriter>);

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => {
                w.write_all(buf)?;
                w.flush()?;
                Ok(buf.len())
            }
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

fn transport<W>(writer: W, threshold: Threshold) -> (TransportLayer, ThresholdHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(threshold);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .event_format(LineOnly)
        .with_filter(filter)
        .boxed();
    (layer, handle)
}

struct LoggerInner {
    name: String,
    config: LoggerConfig,
    level: RwLock<LoggerLevel>,
    dispatch: Dispatch,
    console: ThresholdHandle,
    file: ThresholdHandle,
    file_sink: FileSink,
    error: ThresholdHandle,
    error_sink: FileSink,
    default_label: RwLock<Option<String>>,
    default_meta: RwLock<Map<String, Value>>,
    print_format: RwLock<Option<PrintFormat>>,
    info_handler: RwLock<Option<InfoHandler>>,
}

/// Cheap to clone; clones share transports and settings.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("level", &*self.inner.level.read())
            .finish()
    }
}

impl Logger {
    /// Build a logger, opening the file transports its options enable.
    ///
    /// Each logger owns a private `tracing` dispatcher with one `fmt` layer
    /// per transport; records never reach the global subscriber.
    pub fn new(name: impl Into<String>, options: impl Into<LoggerOptions>) -> std::io::Result<Self> {
        let LoggerOptions {
            config,
            print_format,
        } = options.into();
        let level = config.level.unwrap_or_default();

        let file_sink = FileSink::new(
            &config,
            config.file_log_name.as_deref().unwrap_or(DEFAULT_FILE_LOG_NAME),
        );
        let error_sink = FileSink::new(
            &config,
            config.error_log_name.as_deref().unwrap_or(DEFAULT_ERROR_LOG_NAME),
        );
        let file_on = !config.disable_file.unwrap_or(false);
        let error_on = !config.disable_error.unwrap_or(false);
        if file_on {
            file_sink.open()?;
        }
        if error_on {
            error_sink.open()?;
        }

        let (console_layer, console) = transport(
            std::io::stdout,
            Threshold::new(
                config.console_level.unwrap_or(level),
                !config.disable_console.unwrap_or(false),
            ),
        );
        let (file_layer, file) = transport(
            file_sink.clone(),
            Threshold::new(config.file_level.unwrap_or(level), file_on),
        );
        let (error_layer, error) = transport(
            error_sink.clone(),
            Threshold::new(LoggerLevel::Error, error_on),
        );
        let dispatch = Dispatch::new(
            Registry::default().with(vec![console_layer, file_layer, error_layer]),
        );

        Ok(Self {
            inner: Arc::new(LoggerInner {
                name: name.into(),
                level: RwLock::new(level),
                dispatch,
                console,
                file,
                file_sink,
                error,
                error_sink,
                default_label: RwLock::new(config.default_label.clone()),
                default_meta: RwLock::new(config.default_meta.clone()),
                print_format: RwLock::new(print_format),
                info_handler: RwLock::new(None),
                config,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn level(&self) -> LoggerLevel {
        *self.inner.level.read()
    }

    /// Directory the file transports write into.
    pub fn dir(&self) -> PathBuf {
        self.inner.config.dir_path()
    }

    pub fn log(&self, level: LoggerLevel, message: impl Into<String>, meta: Option<&Map<String, Value>>) {
        self.emit(level, message.into(), meta, None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Error, message, None);
    }

    /// Write a line as-is to every enabled transport, bypassing levels and formatting.
    pub fn write(&self, line: &str) {
        tracing::dispatcher::with_default(&self.inner.dispatch, || {
            tracing::event!(target: RAW_TARGET, Level::ERROR, "{line}");
        });
    }

    /// A view of this logger that tags every record with an extra label.
    pub fn with_label(&self, label: impl Into<String>) -> ContextLogger {
        ContextLogger {
            logger: self.clone(),
            label: label.into(),
        }
    }

    pub fn enable_console(&self) {
        adjust(&self.inner.console, |t| t.enabled = true);
    }

    pub fn disable_console(&self) {
        adjust(&self.inner.console, |t| t.enabled = false);
    }

    pub fn enable_file(&self) -> std::io::Result<()> {
        self.inner.file_sink.open()?;
        adjust(&self.inner.file, |t| t.enabled = true);
        Ok(())
    }

    pub fn disable_file(&self) {
        adjust(&self.inner.file, |t| t.enabled = false);
    }

    pub fn enable_error(&self) -> std::io::Result<()> {
        self.inner.error_sink.open()?;
        adjust(&self.inner.error, |t| t.enabled = true);
        Ok(())
    }

    pub fn disable_error(&self) {
        adjust(&self.inner.error, |t| t.enabled = false);
    }

    /// Sets the logger-wide level together with the console and file levels.
    pub fn update_level(&self, level: LoggerLevel) {
        *self.inner.level.write() = level;
        self.update_console_level(level);
        self.update_file_level(level);
    }

    pub fn update_console_level(&self, level: LoggerLevel) {
        adjust(&self.inner.console, |t| t.level = level);
    }

    pub fn update_file_level(&self, level: LoggerLevel) {
        adjust(&self.inner.file, |t| t.level = level);
    }

    pub fn update_default_label(&self, label: impl Into<String>) {
        *self.inner.default_label.write() = Some(label.into());
    }

    pub fn update_default_meta(&self, meta: Map<String, Value>) {
        *self.inner.default_meta.write() = meta;
    }

    pub fn set_print_format(&self, format: PrintFormat) {
        *self.inner.print_format.write() = Some(format);
    }

    /// Hook run on every record before it is formatted.
    pub fn set_info_handler(&self, handler: InfoHandler) {
        *self.inner.info_handler.write() = Some(handler);
    }

    fn emit(
        &self,
        level: LoggerLevel,
        message: String,
        meta: Option<&Map<String, Value>>,
        extra_label: Option<&str>,
    ) {
        if !level.passes(self.level()) {
            return;
        }

        let mut labels = Vec::new();
        if let Some(label) = self.inner.default_label.read().as_ref() {
            labels.push(label.clone());
        }
        if let Some(label) = extra_label {
            labels.push(label.to_string());
        }

        let mut all_meta = self.inner.default_meta.read().clone();
        if let Some(meta) = meta {
            all_meta.extend(meta.clone());
        }

        let mut record = LogRecord {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            level,
            pid: std::process::id(),
            labels,
            message,
            meta: all_meta,
        };

        if let Some(handler) = self.inner.info_handler.read().as_ref() {
            handler(&mut record);
        }

        let line = match self.inner.print_format.read().as_ref() {
            Some(format) => format(&record),
            None => default_format(&record),
        };

        tracing::dispatcher::with_default(&self.inner.dispatch, || {
            dispatch_line(record.level, &line)
        });
    }
}

/// One callsite per level; the target carries the exact [`LoggerLevel`].
fn dispatch_line(level: LoggerLevel, line: &str) {
    match level {
        LoggerLevel::None => {}
        LoggerLevel::Error => tracing::event!(target: "wirekit::logger::error", Level::ERROR, "{line}"),
        LoggerLevel::Warn => tracing::event!(target: "wirekit::logger::warn", Level::WARN, "{line}"),
        LoggerLevel::Info => tracing::event!(target: "wirekit::logger::info", Level::INFO, "{line}"),
        LoggerLevel::Verbose => {
            tracing::event!(target: "wirekit::logger::verbose", Level::DEBUG, "{line}")
        }
        LoggerLevel::Debug => tracing::event!(target: "wirekit::logger::debug", Level::DEBUG, "{line}"),
        LoggerLevel::Silly => tracing::event!(target: "wirekit::logger::silly", Level::TRACE, "{line}"),
        LoggerLevel::All => tracing::event!(target: "wirekit::logger::all", Level::TRACE, "{line}"),
    }
}

fn adjust(handle: &ThresholdHandle, change: impl FnOnce(&mut Threshold)) {
    if let Err(e) = handle.modify(change) {
        tracing::debug!(error = %e, "logger transport threshold not updated");
    }
}

/// A logger bound to an extra label, e.g. a request or a component name.
#[derive(Clone, Debug)]
pub struct ContextLogger {
    logger: Logger,
    label: String,
}

impl ContextLogger {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn log(&self, level: LoggerLevel, message: impl Into<String>, meta: Option<&Map<String, Value>>) {
        self.logger
            .emit(level, message.into(), meta, Some(&self.label));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LoggerLevel::Error, message, None);
    }
}

/// Resolve a logger directory against a base directory.
pub fn resolve_dir(dir: Option<&str>, base_dir: &Path) -> String {
    let dir = Path::new(dir.unwrap_or("logs"));
    if dir.is_absolute() {
        dir.to_string_lossy().into_owned()
    } else {
        base_dir.join(dir).to_string_lossy().into_owned()
    }
}
