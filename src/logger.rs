//! Structured logging for pspf-tools
//!
//! Every record is a `(domain, action, status, message)` tuple plus free-form
//! key/value fields. The console rendering is selected by
//! `PYVIDER_LOG_CONSOLE_FORMATTER` (`emoji`, `text`, or `json`) and the level
//! by `PYVIDER_LOG_LEVEL`. All output goes to stderr, one line per record.

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde_json::json;
use std::env;
use std::io::{self, Write};

/// Environment variable selecting the log level (TRACE..ERROR)
pub const LOG_LEVEL_ENV: &str = "PYVIDER_LOG_LEVEL";

/// Environment variable selecting the console format
pub const LOG_FORMAT_ENV: &str = "PYVIDER_LOG_CONSOLE_FORMATTER";

/// Console output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Emoji,
    Text,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match env::var(LOG_FORMAT_ENV)
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => LogFormat::Emoji,
        }
    }
}

fn level_from_env() -> LevelFilter {
    match env::var(LOG_LEVEL_ENV)
        .unwrap_or_default()
        .to_uppercase()
        .as_str()
    {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Stderr sink behind the `log` facade. Lines are fully rendered by
/// [`Logbowl`] before they get here.
struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(io::stderr(), "{}", record.args());
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Structured logger handle, constructed once in `main` and passed to the
/// engines.
#[derive(Debug, Clone)]
pub struct Logbowl {
    name: String,
    format: LogFormat,
}

impl Logbowl {
    /// Create a logger and install the stderr sink if none is installed yet.
    pub fn create(name: &str) -> Self {
        let level = level_from_env();
        if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
            log::set_max_level(level);
        }

        Logbowl {
            name: name.to_string(),
            format: LogFormat::from_env(),
        }
    }

    pub fn trace(&self, domain: &str, action: &str, status: &str, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::Trace, domain, action, status, message, fields);
    }

    pub fn debug(&self, domain: &str, action: &str, status: &str, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::Debug, domain, action, status, message, fields);
    }

    pub fn info(&self, domain: &str, action: &str, status: &str, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::Info, domain, action, status, message, fields);
    }

    pub fn warn(&self, domain: &str, action: &str, status: &str, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::Warn, domain, action, status, message, fields);
    }

    pub fn error(&self, domain: &str, action: &str, status: &str, message: &str, fields: &[(&str, String)]) {
        self.emit(Level::Error, domain, action, status, message, fields);
    }

    fn emit(
        &self,
        level: Level,
        domain: &str,
        action: &str,
        status: &str,
        message: &str,
        fields: &[(&str, String)],
    ) {
        let line = match self.format {
            LogFormat::Emoji => format!(
                "{} {} {} {}{}",
                domain_emoji(domain),
                action_emoji(action),
                status_emoji(status),
                message,
                render_fields(fields)
            ),
            LogFormat::Text => format!(
                "[{}] {}{}",
                domain.to_uppercase(),
                message,
                render_fields(fields)
            ),
            LogFormat::Json => {
                let mut record = json!({
                    "@timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
                    "@level": level.to_string().to_lowercase(),
                    "logger": self.name,
                    "domain": domain,
                    "action": action,
                    "status": status,
                    "message": message,
                });
                if let Some(map) = record.as_object_mut() {
                    for (key, value) in fields {
                        map.insert((*key).to_string(), json!(value));
                    }
                }
                record.to_string()
            }
        };

        log::log!(level, "{line}");
    }
}

/// Render key/value fields as a ` key=value` suffix
fn render_fields(fields: &[(&str, String)]) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        out.push(' ');
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

fn domain_emoji(domain: &str) -> &'static str {
    match domain {
        "system" => "⚙️",
        "launcher" => "🚀",
        "builder" => "🛠️",
        "signing" => "✍️",
        "archive" => "📦",
        "keymgmt" => "🔑",
        "verify" => "🔍",
        "io" => "💾",
        "env" => "🌿",
        "package" => "📦",
        "config" => "🔩",
        _ => "❓",
    }
}

fn action_emoji(action: &str) -> &'static str {
    match action {
        "init" => "🌱",
        "start" => "🚀",
        "stop" => "🛑",
        "read" => "📖",
        "write" => "📝",
        "process" => "⚙️",
        "validate" => "🛡️",
        "execute" => "▶️",
        "build" => "🏗️",
        "verify" => "🔍",
        "pack" => "📦",
        "generate" => "✨",
        "clean" => "🧹",
        "install" => "🧩",
        "extract" => "🗃️",
        "finish" => "🏁",
        "version" => "🔢",
        "load" => "💡",
        "assemble" => "🧱",
        "deps" => "🧩",
        _ => "⚙️",
    }
}

fn status_emoji(status: &str) -> &'static str {
    match status {
        "success" => "✅",
        "failure" => "❌",
        "error" => "🔥",
        "warning" => "⚠️",
        "info" => "ℹ️",
        "skip" => "⏭️",
        "progress" => "➡️",
        "ok" => "✅",
        _ => "➡️",
    }
}

#[cfg(test)]
mod tests {
    use super::{render_fields, LogFormat};

    #[test]
    fn fields_render_as_key_value_pairs() {
        let fields = [("path", "/tmp/out".to_string()), ("size", "42".to_string())];
        assert_eq!(render_fields(&fields), " path=/tmp/out size=42");
        assert_eq!(render_fields(&[]), "");
    }

    #[test]
    fn unknown_formatter_falls_back_to_emoji() {
        // from_env reads the process environment; the default (unset) case
        // must be emoji per the console contract.
        if std::env::var(super::LOG_FORMAT_ENV).is_err() {
            assert_eq!(LogFormat::from_env(), LogFormat::Emoji);
        }
    }
}
