//! Infrastructure adapters for external systems.

pub mod embeddings;
pub mod http;
pub mod model_config;
pub mod sqlite;
