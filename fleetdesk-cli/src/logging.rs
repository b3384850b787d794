use shared::config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

/// Installs the global subscriber. Diagnostics go to stderr so stdout stays
/// reserved for conversation output.
pub fn initialize_tracing(config: &Config) {
    let fmt_builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// `RUST_LOG` wins; otherwise the configured level, which may itself be a
/// full filter directive such as `client=debug,warn`.
fn build_env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.logging.level.trim();
        match level.parse::<LevelFilter>() {
            Ok(default_level) => EnvFilter::builder()
                .with_default_directive(default_level.into())
                .parse_lossy(""),
            Err(_) => EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .parse_lossy(level),
        }
    })
}
