// src/logger.rs
// Operator-facing output: colored console lines, the address box and the access log

use chrono::{DateTime, Local, Utc};
use colored::{ColoredString, Colorize};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

pub const ACCESS_LOG_FILE: &str = "access.log";

const CONSOLE_TIME_FORMAT: &str = "%H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Http,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn badge(self) -> ColoredString {
        match self {
            LogLevel::Http => " HTTP ".on_blue().bold().white(),
            LogLevel::Info => " INFO ".on_magenta().bold().white(),
            LogLevel::Warn => " WARN ".on_yellow().bold().black(),
            LogLevel::Error => " ERROR ".on_red().bold().white(),
        }
    }
}

/// One served request, as recorded by the access-log middleware.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub client_ip: String,
    pub time: DateTime<Utc>,
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub proto: String,
    pub status: u16,
    pub latency: Duration,
    pub user_agent: String,
}

impl AccessRecord {
    /// `ip - [RFC 1123 time] request-id METHOD path proto status latency "agent"`
    pub fn to_line(&self) -> String {
        format!(
            "{} - [{}] {} {} {} {} {} {:?} \"{}\"",
            self.client_ip,
            self.time.format("%a, %d %b %Y %H:%M:%S UTC"),
            self.request_id,
            self.method,
            self.path,
            self.proto,
            self.status,
            self.latency,
            self.user_agent
        )
    }

    fn console_summary(&self) -> String {
        let status = match self.status {
            s if s >= 500 => s.to_string().red().bold(),
            s if s >= 400 => s.to_string().yellow(),
            s => s.to_string().green(),
        };
        format!(
            "{} {} {} {} in {:?}",
            self.client_ip.dimmed(),
            self.method.cyan(),
            self.path,
            status,
            self.latency
        )
    }
}

/// Append-only `access.log`; lines from concurrent workers never interleave.
struct AccessSink {
    file: Mutex<File>,
}

impl AccessSink {
    fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(ACCESS_LOG_FILE))?;
        Ok(AccessSink {
            file: Mutex::new(file),
        })
    }

    fn write(&self, line: &str) -> io::Result<()> {
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{}", line)
    }
}

pub struct Logger {
    request_logging: bool,
    timestamps: bool,
    sink: Option<AccessSink>,
}

impl Logger {
    pub const fn new() -> Self {
        Logger {
            request_logging: true,
            timestamps: true,
            sink: None,
        }
    }

    pub fn with_request_logging(mut self, enable: bool) -> Self {
        self.request_logging = enable;
        self
    }

    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.timestamps = enable;
        self
    }

    /// Also append access lines to `<dir>/access.log`, creating `dir` if needed.
    pub fn with_access_log_dir(mut self, dir: &Path) -> io::Result<Self> {
        self.sink = Some(AccessSink::open(dir)?);
        Ok(self)
    }

    fn prefix(&self, level: LogLevel) -> String {
        if self.timestamps {
            let now: DateTime<Local> = Local::now();
            format!("{} {}", now.format(CONSOLE_TIME_FORMAT).to_string().dimmed(), level.badge())
        } else {
            level.badge().to_string()
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let line = format!("{} {}", self.prefix(level), message);
        if level == LogLevel::Error {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn access(&self, record: &AccessRecord) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.write(&record.to_line()) {
                log::warn!("failed to write access log: {}", err);
            }
        }
        if self.request_logging {
            self.log(LogLevel::Http, &record.console_summary());
        }
    }

    pub fn startup_info(&self, name: &str, version: &str, authors: &str) {
        self.info(&format!("{} {} by {}", name.bold(), version, authors));
    }

    /// Listening addresses, boxed when attached to a terminal.
    pub fn server_info(&self, signature: &str, urls: &[(String, Option<String>)]) {
        if !atty::is(atty::Stream::Stdout) {
            for (local, _) in urls {
                self.info(&format!("{} listening on {}", signature, local));
            }
            return;
        }

        let mut lines = vec![format!("{} {}", "Serving with".green(), signature.green().bold())];
        for (local, network) in urls {
            lines.push(String::new());
            lines.push(format!("{} {}", "Local:  ".bold(), local.bright_cyan()));
            if let Some(network) = network {
                lines.push(format!("{} {}", "Network:".bold(), network.bright_cyan()));
            }
        }
        for line in boxed(&lines) {
            println!("{}", line);
        }
        println!();
    }

    pub fn shutdown_message(&self) {
        self.info("Stopping, waiting for open requests to finish...");
    }

    pub fn force_shutdown_message(&self) {
        self.warn("Second signal received, exiting now");
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_colors(text: &str) -> String {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    match ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok()) {
        Some(ansi) => ansi.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Printable width, ignoring color escapes.
fn visible_width(text: &str) -> usize {
    strip_colors(text).chars().count()
}

/// Frame `lines` in a box, left-aligned behind a two-column margin.
fn boxed(lines: &[String]) -> Vec<String> {
    let inner = lines.iter().map(|l| visible_width(l)).max().unwrap_or(0) + 4;
    let mut framed = Vec::with_capacity(lines.len() + 4);
    framed.push(format!("┌{}┐", "─".repeat(inner)));
    framed.push(format!("│{}│", " ".repeat(inner)));
    for line in lines {
        let pad = inner - 2 - visible_width(line);
        framed.push(format!("│  {}{}│", line, " ".repeat(pad)));
    }
    framed.push(format!("│{}│", " ".repeat(inner)));
    framed.push(format!("└{}┘", "─".repeat(inner)));
    framed
}

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();
static FALLBACK_LOGGER: Logger = Logger::new();

/// Install the process-wide logger. Later calls are ignored.
pub fn init_logger(logger: Logger) {
    let _ = GLOBAL_LOGGER.set(logger);
}

pub fn get_logger() -> &'static Logger {
    GLOBAL_LOGGER.get().unwrap_or(&FALLBACK_LOGGER)
}
