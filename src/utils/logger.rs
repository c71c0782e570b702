//! File-backed logging for extraction runs. Everything goes to debug.log,
//! errors additionally to error.log, so a failed batch conversion can be
//! diagnosed after the fact. A panic hook captures crashes with a
//! backtrace.

use crate::shared::constants;
use lazy_static::lazy_static;
use std::backtrace::Backtrace;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic;
use std::path::PathBuf;
use std::sync::Mutex;

struct LogFiles {
    error: File,
    debug: File,
}

lazy_static! {
    static ref LOGGER: Mutex<Option<LogFiles>> = Mutex::new(None);
}

fn open_truncated(path: &PathBuf, title: &str) -> Option<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .ok()?;
    let _ = writeln!(file, "=== {} Started: {} ===", title, chrono::Local::now());
    Some(file)
}

pub fn init() {
    let cwd = std::env::current_dir().unwrap_or_default();
    let error_path = cwd.join(constants::ERROR_LOG_FILE);
    let debug_path = cwd.join(constants::DEBUG_LOG_FILE);

    let files = match (
        open_truncated(&error_path, "Error Log"),
        open_truncated(&debug_path, "Debug Log"),
    ) {
        (Some(error), Some(debug)) => LogFiles { error, debug },
        // Read-only working directory; run without logs rather than abort
        _ => return,
    };

    if let Ok(mut slot) = LOGGER.lock() {
        *slot = Some(files);
    }

    panic::set_hook(Box::new(move |info| {
        let backtrace = Backtrace::capture();
        let msg = match info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => match info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<Any>",
            },
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());

        log(
            "ERROR",
            &format!("PANIC at {}: {}\nBacktrace:\n{:?}", location, msg, backtrace),
        );
        println!(
            "Application crashed. See {} for details.",
            constants::ERROR_LOG_FILE
        );
    }));
}

pub fn log(level: &str, msg: &str) {
    if let Ok(mut slot) = LOGGER.lock() {
        if let Some(files) = slot.as_mut() {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let line = format!("[{}][{}] {}", timestamp, level, msg);
            let _ = writeln!(files.debug, "{}", line);
            if level == "ERROR" {
                let _ = writeln!(files.error, "{}", line);
            }
        }
    }
}

pub fn info(msg: &str) {
    log("INFO", msg);
}

pub fn error(msg: &str) {
    log("ERROR", msg);
}

pub fn debug(msg: &str) {
    log("DEBUG", msg);
}
