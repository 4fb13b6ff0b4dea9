use crate::shared::constants;
use anyhow::{Context, Result};
use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn append_line(path: &Path, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", line);
    }
}

/// Installs the global subscriber: human-readable lines on stderr plus a
/// plain-text copy in `debug.log`. Panics are appended to `error.log`.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init(log_dir: &Path) -> Result<()> {
    let debug_path = log_dir.join(constants::DEBUG_LOG_FILE);
    let error_path = log_dir.join(constants::ERROR_LOG_FILE);

    let mut debug_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&debug_path)
        .with_context(|| format!("Failed to open log file: {}", debug_path.display()))?;
    writeln!(debug_file, "=== Debug Log Started: {} ===", chrono::Local::now())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(debug_file)))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    install_panic_hook(error_path);
    Ok(())
}

fn install_panic_hook(error_path: PathBuf) {
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

        let error_msg = format!(
            "\n[{}] CRITICAL PANIC at {}:\nMessage: {}\nBacktrace:\n{:?}\n",
            chrono::Local::now(),
            location,
            msg,
            backtrace
        );

        append_line(&error_path, &error_msg);
        eprintln!("{} crashed. See {} for details.", constants::APP_NAME, error_path.display());
    }));
}
