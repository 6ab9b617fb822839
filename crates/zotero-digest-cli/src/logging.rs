use std::io::Write;
use std::path::Path;

use indicatif::ProgressBar;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const LOG_FILE_PREFIX: &str = "zotero-digest.log";

/// Filter directives for a level name, keeping HTTP internals quiet.
fn directives(level: &str) -> String {
    format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
        level.to_ascii_lowercase()
    )
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)))
}

/// Writes each log event to stderr with `bar` cleared from the terminal.
#[derive(Clone)]
pub struct BarAwareStderr(ProgressBar);

impl<'a> MakeWriter<'a> for BarAwareStderr {
    type Writer = BarLine;

    fn make_writer(&'a self) -> Self::Writer {
        BarLine {
            bar: self.0.clone(),
            buf: Vec::new(),
        }
    }
}

/// One buffered event; flushed to stderr on drop.
pub struct BarLine {
    bar: ProgressBar,
    buf: Vec<u8>,
}

impl Write for BarLine {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for BarLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let buf = std::mem::take(&mut self.buf);
        self.bar.suspend(|| {
            let _ = std::io::stderr().write_all(&buf);
        });
    }
}

/// Install the global subscriber: a daily-rotated file in `log_dir` at
/// `level`, and stderr at `warn` (or at `level` when `verbose`). `RUST_LOG`
/// overrides both filters. Console lines are printed around `bar`. The
/// returned guard flushes the file on drop.
pub fn init(
    level: &str,
    verbose: bool,
    log_dir: &Path,
    bar: &ProgressBar,
) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let stderr_level = if verbose { level } else { "WARN" };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(BarAwareStderr(bar.clone()))
                .with_target(false)
                .with_filter(filter(stderr_level)),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(filter(level)),
        )
        .try_init()?;

    Ok(guard)
}
