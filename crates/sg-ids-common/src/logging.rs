//! ---
//! ids_section: "01-core-functionality"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Tracing subscriber setup shared by SG-IDS binaries."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "SG_IDS_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Flush guards for the non-blocking writers; dropped only at process exit.
struct WriterGuards {
    _file: WorkerGuard,
    _console: WorkerGuard,
}

static GUARDS: OnceCell<WriterGuards> = OnceCell::new();

/// Console log rendering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global subscriber for `service_name`.
///
/// The filter comes from `SG_IDS_LOG`, then `RUST_LOG`, then `info`. Console
/// output goes to stderr in the configured format so stdout stays free for
/// command output; a daily rolling JSON file is written under
/// `config.directory`. A second call is a no-op.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "failed to create log directory {}",
            config.directory.display()
        )
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&config.directory)
        .with_context(|| {
            format!(
                "failed to open rolling log file in {}",
                config.directory.display()
            )
        })?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());

    let installed = tracing_subscriber::registry()
        .with(resolve_filter(std::env::var(LOG_ENV).ok()))
        .with(console_layer(config.format, console_writer))
        .with(
            fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_current_span(true)
                .with_writer(file_writer),
        )
        .try_init()
        .is_ok();
    if !installed {
        return Ok(());
    }

    let _ = GUARDS.set(WriterGuards {
        _file: file_guard,
        _console: console_guard,
    });
    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

fn console_layer<S>(
    format: LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(writer)
            .boxed(),
    }
}

fn resolve_filter(directive: Option<String>) -> EnvFilter {
    if let Some(directive) = directive {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => {
                eprintln!("ignoring invalid {LOG_ENV} directive '{directive}': {err}");
            }
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_uses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str(r#"format = "structured-json""#).unwrap();
        assert_eq!(parsed.format, LogFormat::StructuredJson);
        let parsed: Wrapper = toml::from_str(r#"format = "pretty""#).unwrap();
        assert_eq!(parsed.format, LogFormat::Pretty);
    }

    #[test]
    fn explicit_directive_is_honoured() {
        let filter = resolve_filter(Some("sg_ids_sim=debug".to_owned()));
        assert!(filter.to_string().contains("sg_ids_sim=debug"));
    }

    #[test]
    fn initialisation_creates_directory_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("unit".to_owned()),
        };
        init_tracing("sg-ids-test", &config).unwrap();
        init_tracing("sg-ids-test", &config).unwrap();
        assert!(config.directory.is_dir());
    }
}
