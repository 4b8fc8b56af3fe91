//! Named loggers shared by the tracker, navigation and provider subsystems.
//!
//! Every subsystem owns a `LazyLock<Logger>`; the global level and the optional user callback
//! apply to all live loggers at once and to loggers created afterwards.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INSTANCES: LazyLock<Mutex<Vec<Weak<LoggerInner>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));
static USER_LOG_HANDLER: LazyLock<RwLock<Option<SharedLogHandler>>> =
    LazyLock::new(|| RwLock::new(None));

type SharedLogHandler = Arc<dyn Fn(&Logger, LogLevel, &[LogArgument]) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        // Registered under the instance lock so a concurrent `set_user_log_handler` reaches it.
        let mut instances = INSTANCES.lock().unwrap();
        let inner = Arc::new(LoggerInner::new(name.into()));
        instances.push(Arc::downgrade(&inner));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.log_level.load(Ordering::SeqCst))
    }

    pub fn set_log_level<L>(&self, level: L) -> Result<(), LogError>
    where
        L: IntoLogLevel,
    {
        let level = level.into_log_level()?;
        self.inner.log_level.store(level as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Replaces the handler that writes records for this logger (stdout/stderr by default).
    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(&Logger, LogLevel, &[LogArgument]) + Send + Sync + 'static,
    {
        *self.inner.log_handler.write().unwrap() = Arc::new(handler);
    }

    pub fn reset_log_handler(&self) {
        *self.inner.log_handler.write().unwrap() = Arc::new(default_log_handler);
    }

    pub fn has_user_log_handler(&self) -> bool {
        self.inner.user_log_handler.read().unwrap().is_some()
    }

    pub fn debug(&self, arg: impl IntoLogArgument) {
        self.dispatch(LogLevel::Debug, vec![arg.into_log_argument()]);
    }

    pub fn log(&self, arg: impl IntoLogArgument) {
        self.dispatch(LogLevel::Verbose, vec![arg.into_log_argument()]);
    }

    pub fn info(&self, arg: impl IntoLogArgument) {
        self.dispatch(LogLevel::Info, vec![arg.into_log_argument()]);
    }

    pub fn warn(&self, arg: impl IntoLogArgument) {
        self.dispatch(LogLevel::Warn, vec![arg.into_log_argument()]);
    }

    pub fn error(&self, arg: impl IntoLogArgument) {
        self.dispatch(LogLevel::Error, vec![arg.into_log_argument()]);
    }

    /// Emits a single record built from several arguments, joined by spaces.
    pub fn debug_with<I, T>(&self, args: I)
    where
        I: IntoIterator<Item = T>,
        T: IntoLogArgument,
    {
        let arguments = args
            .into_iter()
            .map(IntoLogArgument::into_log_argument)
            .collect();
        self.dispatch(LogLevel::Debug, arguments);
    }

    fn dispatch(&self, level: LogLevel, arguments: Vec<LogArgument>) {
        let user_handler = self.inner.user_log_handler.read().unwrap().clone();
        if let Some(handler) = user_handler {
            handler(self, level, &arguments);
        }
        let handler = self.inner.log_handler.read().unwrap().clone();
        handler(self, level, &arguments);
    }
}

struct LoggerInner {
    name: String,
    log_level: AtomicU8,
    log_handler: RwLock<SharedLogHandler>,
    user_log_handler: RwLock<Option<SharedLogHandler>>,
}

impl LoggerInner {
    fn new(name: String) -> Self {
        Self {
            name,
            log_level: AtomicU8::new(GLOBAL_LOG_LEVEL.load(Ordering::SeqCst)),
            log_handler: RwLock::new(Arc::new(default_log_handler)),
            user_log_handler: RwLock::new(USER_LOG_HANDLER.read().unwrap().clone()),
        }
    }
}

fn default_log_handler(logger: &Logger, level: LogLevel, args: &[LogArgument]) {
    if level < logger.log_level() || level == LogLevel::Silent {
        return;
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let message = build_message(args);
    let line = format!("[{now}]  {}: {message}", logger.name());

    match level {
        LogLevel::Warn | LogLevel::Error => eprintln!("{}", line.trim_end()),
        _ => println!("{}", line.trim_end()),
    }
}

fn build_message(args: &[LogArgument]) -> String {
    args.iter()
        .filter_map(LogArgument::to_message_fragment)
        .collect::<Vec<_>>()
        .join(" ")
}

fn for_each_instance<F>(mut f: F)
where
    F: FnMut(Logger),
{
    let mut instances = INSTANCES.lock().unwrap();
    instances.retain(|weak| match weak.upgrade() {
        Some(inner) => {
            f(Logger { inner });
            true
        }
        None => false,
    });
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Silent = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Verbose,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

pub trait IntoLogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError>;
}

impl IntoLogLevel for LogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        Ok(self)
    }
}

impl IntoLogLevel for &str {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(self)
    }
}

impl IntoLogLevel for String {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(&self)
    }
}

/// Record delivered to the process-wide callback installed with [`set_user_log_handler`].
#[derive(Debug, Clone)]
pub struct LogCallbackParams {
    pub level: LogLevel,
    pub message: String,
    pub args: Vec<Value>,
    pub logger_name: String,
}

pub type LogCallback = Arc<dyn Fn(LogCallbackParams) + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq)]
pub enum LogArgument {
    Text(String),
    Value(Value),
}

impl LogArgument {
    pub fn to_message_fragment(&self) -> Option<String> {
        match self {
            LogArgument::Text(text) => Some(text.clone()),
            LogArgument::Value(Value::Null) => None,
            LogArgument::Value(Value::String(text)) => Some(text.clone()),
            LogArgument::Value(other) => Some(other.to_string()),
        }
    }

    pub fn to_callback_value(&self) -> Value {
        match self {
            LogArgument::Text(text) => Value::String(text.clone()),
            LogArgument::Value(value) => value.clone(),
        }
    }
}

pub trait IntoLogArgument {
    fn into_log_argument(self) -> LogArgument;
}

impl IntoLogArgument for LogArgument {
    fn into_log_argument(self) -> LogArgument {
        self
    }
}

impl IntoLogArgument for String {
    fn into_log_argument(self) -> LogArgument {
        LogArgument::Text(self)
    }
}

impl IntoLogArgument for &str {
    fn into_log_argument(self) -> LogArgument {
        LogArgument::Text(self.to_owned())
    }
}

impl IntoLogArgument for Value {
    fn into_log_argument(self) -> LogArgument {
        LogArgument::Value(self)
    }
}

impl IntoLogArgument for bool {
    fn into_log_argument(self) -> LogArgument {
        LogArgument::Value(Value::Bool(self))
    }
}

impl IntoLogArgument for usize {
    fn into_log_argument(self) -> LogArgument {
        LogArgument::Value(Value::from(self as u64))
    }
}

#[derive(Debug, Clone)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => write!(f, "Invalid log level \"{level}\""),
        }
    }
}

impl std::error::Error for LogError {}

/// Sets the level of every existing logger and of loggers created afterwards.
pub fn set_log_level<L>(level: L) -> Result<(), LogError>
where
    L: IntoLogLevel,
{
    let level = level.into_log_level()?;
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    for_each_instance(|logger| {
        let _ = logger.set_log_level(level);
    });
    Ok(())
}

/// Installs (or with `None`, removes) a callback that observes records from every logger,
/// including loggers created later.
///
/// `threshold` overrides each logger's own level for the callback only.
pub fn set_user_log_handler(callback: Option<LogCallback>, threshold: Option<LogLevel>) {
    let handler = callback.map(|cb| {
        Arc::new(move |instance: &Logger, level: LogLevel, args: &[LogArgument]| {
            let minimum = threshold.unwrap_or_else(|| instance.log_level());
            if level < minimum {
                return;
            }
            cb(LogCallbackParams {
                level,
                message: build_message(args),
                args: args.iter().map(LogArgument::to_callback_value).collect(),
                logger_name: instance.name().to_owned(),
            });
        }) as SharedLogHandler
    });
    *USER_LOG_HANDLER.write().unwrap() = handler.clone();
    for_each_instance(|logger| {
        *logger.inner.user_log_handler.write().unwrap() = handler.clone();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    fn reset_logging() {
        set_log_level(LogLevel::Info).unwrap();
        set_user_log_handler(None, None);
    }

    fn capture(logger: &Logger) -> Arc<Mutex<Vec<(LogLevel, String)>>> {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        logger.set_log_handler(move |instance, level, args| {
            if level < instance.log_level() {
                return;
            }
            sink.lock().unwrap().push((level, build_message(args)));
        });
        records
    }

    #[test]
    fn global_level_filters_records() {
        let _guard = TEST_GUARD.lock().unwrap();
        reset_logging();
        let logger = Logger::new("@fathom/logger-level-test");
        let records = capture(&logger);

        set_log_level("warn").unwrap();
        logger.debug("debug message");
        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");

        let stored = records.lock().unwrap();
        let levels: Vec<_> = stored.iter().map(|(level, _)| *level).collect();
        assert_eq!(levels, [LogLevel::Warn, LogLevel::Error]);
        assert_eq!(stored[0].1, "warn message");
        drop(stored);
        reset_logging();
    }

    #[test]
    fn invalid_level_is_rejected() {
        let err = set_log_level("chatty").unwrap_err();
        assert!(err.to_string().contains("chatty"));
    }

    #[test]
    fn user_handler_receives_joined_arguments() {
        let _guard = TEST_GUARD.lock().unwrap();
        reset_logging();
        let logger = Logger::new("@fathom/logger-callback-test");
        logger.set_log_level(LogLevel::Debug).unwrap();

        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let name = logger.name().to_owned();
        set_user_log_handler(
            Some(Arc::new(move |params: LogCallbackParams| {
                if params.logger_name == name {
                    sink.lock().unwrap().push(params);
                }
            })),
            None,
        );
        assert!(logger.has_user_log_handler());

        logger.debug_with([
            LogArgument::Text("sent".into()),
            LogArgument::Value(serde_json::json!({"sid": "ABCDEF"})),
        ]);

        let records = captured.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Debug);
        assert_eq!(records[0].message, "sent {\"sid\":\"ABCDEF\"}");
        assert_eq!(records[0].args.len(), 2);
        reset_logging();
    }

    #[test]
    fn user_handler_threshold_overrides_logger_level() {
        let _guard = TEST_GUARD.lock().unwrap();
        reset_logging();
        let logger = Logger::new("@fathom/logger-threshold-test");

        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let name = logger.name().to_owned();
        set_user_log_handler(
            Some(Arc::new(move |params: LogCallbackParams| {
                if params.logger_name == name {
                    sink.lock().unwrap().push(params.level);
                }
            })),
            Some(LogLevel::Error),
        );

        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");

        assert_eq!(captured.lock().unwrap().as_slice(), &[LogLevel::Error]);
        reset_logging();
    }

    #[test]
    fn user_handler_reaches_loggers_created_later() {
        let _guard = TEST_GUARD.lock().unwrap();
        reset_logging();

        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        set_user_log_handler(
            Some(Arc::new(move |params: LogCallbackParams| {
                if params.logger_name == "@fathom/logger-late-test" {
                    sink.lock().unwrap().push(params.message);
                }
            })),
            Some(LogLevel::Debug),
        );

        let logger = Logger::new("@fathom/logger-late-test");
        assert!(logger.has_user_log_handler());
        logger.debug("page view sent");

        assert_eq!(captured.lock().unwrap().as_slice(), &["page view sent".to_string()]);

        reset_logging();
        let after_reset = Logger::new("@fathom/logger-late-test");
        assert!(!after_reset.has_user_log_handler());
    }
}
