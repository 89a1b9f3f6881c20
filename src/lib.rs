pub mod combat;
pub mod config;
pub mod constants;
pub mod critters;
pub mod engine;
pub mod error;
pub mod sandbox;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod strategy;
pub mod types;
pub mod world;

/// Installs the `tracing` subscriber used by the binaries. `RUST_LOG` overrides
/// the default `info` filter.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
