//! Offline model providers
//!
//! `MockModel` answers without any API key, the way local development runs.
//! `ScriptedModel` replays fixed increments and can fail at a chosen point;
//! it is only built for tests and the `testing` feature.

use super::{ModelProvider, TextStream};
use crate::context::ConversationSeed;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic stand-in used when no model API key is configured
#[derive(Debug, Default)]
pub struct MockModel;

impl MockModel {
    pub fn new() -> Self {
        Self
    }

    fn answer(&self, query: &str) -> String {
        format!(
            "Here is a trip outline for \"{}\" based on the travel data provided. \
            Start with the main sights, keep meals local to stay within budget, \
            and leave the last evening free.\n\n\
            [Mock response - model API key not configured]",
            query.trim()
        )
    }
}

#[async_trait]
impl ModelProvider for MockModel {
    async fn generate(&self, _seed: &ConversationSeed, query: &str) -> Result<String> {
        Ok(self.answer(query))
    }

    async fn generate_stream(&self, _seed: &ConversationSeed, query: &str) -> Result<TextStream> {
        let increments: Vec<Result<String>> = self
            .answer(query)
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(stream::iter(increments).boxed())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Replays a fixed list of increments, optionally failing on the way
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct ScriptedModel {
    increments: Vec<String>,
    fail_on_open: Option<String>,
    fail_after: Option<(usize, String)>,
    calls: AtomicUsize,
}

#[cfg(any(test, feature = "testing"))]
impl ScriptedModel {
    pub fn new<I, S>(increments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            increments: increments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Every call fails before producing output
    pub fn failing_on_open(message: impl Into<String>) -> Self {
        Self {
            fail_on_open: Some(message.into()),
            ..Self::default()
        }
    }

    /// Streams yield `count` increments and then fail
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Number of generate / generate_stream calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_on_open {
            Some(message) => Err(AppError::ModelCall {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn generate(&self, _seed: &ConversationSeed, _query: &str) -> Result<String> {
        self.open()?;
        if let Some((_, message)) = &self.fail_after {
            return Err(AppError::ModelCall {
                message: message.clone(),
            });
        }
        Ok(self.increments.concat())
    }

    async fn generate_stream(&self, _seed: &ConversationSeed, _query: &str) -> Result<TextStream> {
        self.open()?;

        let mut items: Vec<Result<String>> = Vec::new();
        match &self.fail_after {
            Some((count, message)) => {
                items.extend(self.increments.iter().take(*count).cloned().map(Ok));
                items.push(Err(AppError::ModelCall {
                    message: message.clone(),
                }));
            }
            None => items.extend(self.increments.iter().cloned().map(Ok)),
        }

        Ok(stream::iter(items).boxed())
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PromptComposer;

    fn seed() -> ConversationSeed {
        PromptComposer::default().compose("ctx").unwrap()
    }

    #[tokio::test]
    async fn test_mock_stream_matches_buffered_answer() {
        let model = MockModel::new();
        let full = model.generate(&seed(), "Goa in June").await.unwrap();
        let streamed: Vec<String> = model
            .generate_stream(&seed(), "Goa in June")
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert!(streamed.len() > 1);
        assert_eq!(streamed.concat(), full);
        assert!(full.contains("Goa in June"));
    }

    #[tokio::test]
    async fn test_scripted_failure_after_increments() {
        let model = ScriptedModel::new(["a", "b", "c"]).failing_after(2, "upstream reset");
        let items: Vec<Result<String>> = model
            .generate_stream(&seed(), "q")
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_ref().unwrap(), "b");
        assert!(items[2].is_err());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_on_open() {
        let model = ScriptedModel::failing_on_open("quota");
        assert!(model.generate(&seed(), "q").await.is_err());
        assert!(model.generate_stream(&seed(), "q").await.is_err());
        assert_eq!(model.calls(), 2);
    }
}
