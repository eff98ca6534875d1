//! Wayfarer Common Library
//!
//! Shared code for the Wayfarer travel assistant including:
//! - City dataset and structured matching
//! - Embedding, vector store and generative model clients
//! - Context fusion and prompt composition
//! - Chat orchestration with buffered and streamed replies
//! - Error types, configuration, authentication and metrics

pub mod auth;
pub mod chat;
pub mod config;
pub mod context;
pub mod dataset;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod vector_store;

// Re-export commonly used types
pub use chat::{StreamEvent, TravelAssistant};
pub use config::AppConfig;
pub use dataset::{CityCatalog, CityRecord};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::ModelProvider;
pub use vector_store::VectorStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
