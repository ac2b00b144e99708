use anyhow::{Context, Result};
use chrono::Local;
use log::LevelFilter;
use std::io::{self, Write};

use env_logger::{Builder, Target};

use crate::utils::Shutdown;

/// Environment variable that overrides `[logging] file`.
pub const LOG_FILE_ENV: &str = "WISUN_METER_LOG_FILE";

/// Multi-writer for logging to both file and stdout
struct DualWriter {
    file: std::fs::File,
    stdout: io::Stdout,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        self.stdout.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.stdout.flush()?;
        Ok(())
    }
}

/// Initialize logging to stdout, and also to a file when one is configured.
///
/// `RUST_LOG` still overrides the default `info` level.
pub fn init_logging(configured_file: Option<&str>) {
    let log_file = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty())
        .or_else(|| configured_file.map(str::to_string));

    let mut builder = base_builder();
    match log_file {
        Some(path) => match open_log_file(&path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(DualWriter {
                    file,
                    stdout: io::stdout(),
                })));
                builder.init();
                log::info!("Logging to {path} and terminal");
            }
            Err(err) => {
                eprintln!("Failed to initialize file logger at '{path}': {err:#}");
                builder.init();
            }
        },
        None => builder.init(),
    }
}

fn base_builder() -> Builder {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stdout)
        .filter_level(LevelFilter::Info)
        .parse_default_env();
    builder
}

fn open_log_file(path: &str) -> Result<std::fs::File> {
    if let Some(parent) = std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {parent:?}"))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {path}"))
}

/// Route Ctrl-C / SIGTERM to `shutdown`.
///
/// The scan and join phases do not poll the flag, so a second signal exits
/// immediately.
pub fn install_signal_handler(shutdown: Shutdown) -> Result<()> {
    ctrlc::set_handler(move || {
        if shutdown.is_triggered() {
            eprintln!("Forced exit");
            std::process::exit(130);
        }
        log::warn!("Shutdown requested, finishing current step ...");
        shutdown.trigger();
    })
    .context("Failed to install Ctrl-C handler")
}
