pub mod config;
pub mod error;
pub mod grader;
pub mod service;
pub mod store;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{GraderConfig, StudyConfig};
pub use error::{ErrorResponse, GradingError, Result, StoreError, StudyError};
pub use grader::{extract_grade, grading_prompt, GradingOracle, HttpGrader};
pub use service::{SessionEvent, StudyService};
pub use store::{ItemStore, MemoryStore};

/// Install the global tracing subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = installed {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

/// Build a service from environment configuration, using the HTTP grader.
pub fn from_env(store: std::sync::Arc<dyn ItemStore>) -> anyhow::Result<StudyService> {
    let config = StudyConfig::from_env()?;
    let grader = HttpGrader::new(config.grader.clone())?;
    Ok(StudyService::new(store, std::sync::Arc::new(grader), config))
}
