use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) enum Level {
    Quiet,
    Default,
    Verbose,
}

/// Configure logging to stderr. `RUST_LOG` overrides the flag-derived
/// default level.
pub(crate) fn setup(level: Level) {
    let default_level = match level {
        Level::Quiet => LevelFilter::OFF,
        Level::Default => LevelFilter::WARN,
        Level::Verbose => LevelFilter::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
