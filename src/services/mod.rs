pub mod drift_detector;
pub mod migration_orchestrator;
pub mod migration_service;
pub mod progress_reporter;
pub mod retry;

pub use drift_detector::DriftDetector;
pub use migration_orchestrator::{MigrationOrchestrator, OrchestratorConfig};
pub use migration_service::{MigrationService, StartupReport};
pub use progress_reporter::ProgressReporter;
pub use retry::{RetryExhausted, RetryPolicy};
