//! Logging and tracing configuration
//!
//! Console output (verdict lines, summaries) is printed directly by the runner;
//! tracing carries diagnostics and goes to stderr, plus an optional log file.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies; `verbose`
/// raises the crate to DEBUG.
pub fn init_cli(verbose: bool, log_file: Option<&Path>) {
    let default = if verbose {
        "itsm_harness=debug,warn"
    } else {
        "itsm_harness=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    // Full detail in the file, it is read after the fact
    let file_layer = log_file.and_then(|path| {
        let file_name = path.file_name()?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let appender = tracing_appender::rolling::never(dir, file_name);
        Some(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}
