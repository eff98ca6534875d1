//! Generative model providers
//!
//! A provider receives the conversation seed plus the caller's query and
//! answers either in one piece or as an ordered stream of text increments.
//! The end of a [`TextStream`] is the completion marker.

mod gemini;
mod mock;
mod sse;

pub use gemini::GeminiModel;
pub use mock::MockModel;
#[cfg(any(test, feature = "testing"))]
pub use mock::ScriptedModel;

use crate::config::ModelConfig;
use crate::context::ConversationSeed;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Ordered text increments; dropping it cancels the upstream request
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Wait for the complete answer
    async fn generate(&self, seed: &ConversationSeed, query: &str) -> Result<String>;

    /// Open an incremental answer
    async fn generate_stream(&self, seed: &ConversationSeed, query: &str) -> Result<TextStream>;

    fn model_name(&self) -> &str;
}

/// Create a model provider based on configuration
pub fn create_model_provider(config: &ModelConfig) -> Result<Arc<dyn ModelProvider>> {
    match config.provider.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "model.api_key required for provider 'gemini'".to_string(),
            })?;
            Ok(Arc::new(GeminiModel::new(config, api_key)?))
        }
        "mock" => Ok(Arc::new(MockModel::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown model provider '{}'", other),
        }),
    }
}
