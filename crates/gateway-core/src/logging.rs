//! Process-wide structured logger, configured once at startup from
//! [`crate::config::LogLevel`]. Lines carry a timestamp, level, and
//! `file:line`, in the style this codebase's logger has always used.

use crate::config::LogLevel;
use chrono::Local;
use env_logger::Builder;
use std::io::Write;

const LEVEL_FIELD_WIDTH: usize = 7;
const FILE_LINE_FIELD_WIDTH: usize = 24;

/// Configures the global `log` facade. Safe to call once; a second call
/// within the same process is a logged no-op (`env_logger` returns an error
/// that we swallow rather than panic on, since test binaries may initialize
/// it more than once).
pub fn configure_logger(level: LogLevel) {
    let no_color = std::env::var("NO_COLOR").is_ok();

    let result = Builder::new()
        .format(move |buf, record| {
            let level_display = format!("[{}]", record.level());
            let level_str = if no_color {
                level_display
            } else {
                colorize(record.level(), &level_display)
            };
            let level_pad = pad_to(visible_len(&level_str), LEVEL_FIELD_WIDTH);

            let file_line = format!(
                "{}:{}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0)
            );
            let file_pad = pad_to(file_line.len(), FILE_LINE_FIELD_WIDTH);

            writeln!(
                buf,
                "{} | {}{} | {}{} | {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                level_str,
                " ".repeat(level_pad),
                file_line,
                " ".repeat(file_pad),
                record.args(),
            )
        })
        .filter_level(level.as_level_filter())
        .try_init();

    if let Err(e) = result {
        log::debug!("logger already initialized: {e}");
    }
}

fn pad_to(visible_width: usize, target: usize) -> usize {
    target.saturating_sub(visible_width).max(1)
}

fn colorize(level: log::Level, text: &str) -> String {
    let code = match level {
        log::Level::Error => "31",
        log::Level::Warn => "33",
        log::Level::Info => "32",
        log::Level::Debug => "34",
        log::Level::Trace => "35",
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn visible_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut visible = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b {
            i += 1;
            while i < bytes.len() && bytes[i] != b'm' {
                i += 1;
            }
            i += 1;
        } else {
            visible += 1;
            i += 1;
        }
    }
    visible
}
