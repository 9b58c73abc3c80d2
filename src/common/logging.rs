//! Logging and tracing configuration
//!
//! Scenario output goes to stdout; tracing goes to stderr and, for long
//! unattended runs, optionally to a log file as well.

use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use super::paths;

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("infra_harness=debug,warn")
        } else {
            EnvFilter::new("infra_harness=info,warn")
        }
    })
}

fn stderr_layer<S>() -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .boxed()
}

/// Initialize tracing (stderr logging, optional log file)
///
/// Logs are controlled by the `RUST_LOG` environment variable. When
/// `log_to_file` is set, a full-detail copy is appended to
/// `~/.local/share/infra-harness/logs/harness.log`; the path is returned.
pub fn init(verbose: bool, log_to_file: bool) -> Option<PathBuf> {
    if log_to_file {
        if let Some(log_file) = harness_log_path() {
            let opened = log_file
                .parent()
                .map(std::fs::create_dir_all)
                .transpose()
                .and_then(|_| {
                    std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_file)
                });

            match opened {
                Ok(file) => {
                    let file_layer = fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_span_events(FmtSpan::CLOSE);

                    tracing_subscriber::registry()
                        .with(default_filter(verbose))
                        .with(file_layer)
                        .with(stderr_layer())
                        .init();

                    return Some(log_file);
                }
                Err(e) => {
                    eprintln!("Warning: Could not open log file: {}", e);
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(stderr_layer())
        .init();

    None
}

/// Get the path to the harness log file
pub fn harness_log_path() -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join("harness.log"))
}
