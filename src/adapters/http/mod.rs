//! HTTP surface.

pub mod migration_http;

pub use migration_http::{ErrorResponse, MigrationHttpServer};
