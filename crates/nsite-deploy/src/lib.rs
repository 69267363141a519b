//! The deploy engine: discovers endpoints, diffs local files against remote
//! state, uploads blobs with bounded concurrency, and publishes signed
//! events describing the result.

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod publisher;
pub mod remote_state;
pub mod scanner;
pub mod signer;

pub use aggregator::DeployReport;
pub use cancel::CancelToken;
pub use config::DeployConfig;
pub use engine::DeployEngine;
pub use error::{DeployError, Result};
pub use observer::{DeployState, NullObserver, Observer, ProgressEvent, TracingObserver};
pub use signer::{LocalSigner, Signer};

/// Log output shape, mirroring `gossipd`'s `--log-format` flag (`pretty` or
/// `json`) without the CLI parser that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Initialize `tracing` the way `gossipd::main` does: an `EnvFilter` seeded
/// from the environment plus this crate's own default directive, and either
/// a pretty or JSON `fmt` layer.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::from_default_env().add_directive("nsite_deploy=info".parse().unwrap());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
