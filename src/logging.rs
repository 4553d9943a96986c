use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// An explicit `level` (any `EnvFilter` directive) wins over `RUST_LOG`;
/// with neither, `info` is used.
pub fn init(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
