use tracing_subscriber::EnvFilter;

/// Installs the compact stdout subscriber shared by the server, worker and
/// maintenance binaries. `RUST_LOG` wins over `fallback` when set.
pub fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
