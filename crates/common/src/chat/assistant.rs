//! Travel assistant: one chat request from query to answer

use super::lifecycle::{ChatPhase, RequestLifecycle, ResponseMode};
use super::streamer::{committed_stream, EventStream};
use crate::context::{best_match, fuse, ConversationSeed, FusedContext, PromptComposer, SemanticRetriever};
use crate::dataset::CityCatalog;
use crate::errors::{AppError, Result};
use crate::llm::ModelProvider;
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Deadline for a buffered answer unless configured otherwise
const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything produced before the model is called
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub city: Option<String>,
    pub snippet_count: usize,
    pub context: FusedContext,
    pub seed: ConversationSeed,
}

pub struct TravelAssistant {
    catalog: CityCatalog,
    retriever: SemanticRetriever,
    composer: PromptComposer,
    model: Arc<dyn ModelProvider>,
    answer_timeout: Duration,
}

impl TravelAssistant {
    pub fn new(
        catalog: CityCatalog,
        retriever: SemanticRetriever,
        composer: PromptComposer,
        model: Arc<dyn ModelProvider>,
    ) -> Self {
        Self {
            catalog,
            retriever,
            composer,
            model,
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
        }
    }

    /// Bound the buffered model call; expiry is a pre-send model failure
    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &CityCatalog {
        &self.catalog
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Readiness: the vector store must answer
    pub async fn check_ready(&self) -> Result<()> {
        self.retriever.check_store().await
    }

    /// Retrieval, fusion and composition; every failure here is pre-send
    async fn prepare(&self, query: &str, lifecycle: &mut RequestLifecycle) -> Result<PreparedPrompt> {
        lifecycle.advance(ChatPhase::Retrieving)?;
        let start = Instant::now();

        let city = best_match(query, self.catalog.records());
        let snippets = match self.retriever.retrieve(query, self.retriever.top_k()).await {
            Ok(snippets) => snippets,
            Err(e) => return Err(lifecycle.fail(e)),
        };
        metrics::record_retrieval(start.elapsed().as_secs_f64(), city.is_some(), snippets.len());

        lifecycle.advance(ChatPhase::Composing)?;
        let context = fuse(city, &snippets);
        let seed = match self.composer.compose(context.as_str()) {
            Ok(seed) => seed,
            Err(e) => return Err(lifecycle.fail(e)),
        };

        info!(
            city = city.map(|c| c.name.as_str()).unwrap_or("-"),
            snippets = snippets.len(),
            "Context prepared"
        );

        Ok(PreparedPrompt {
            city: city.map(|c| c.name.clone()),
            snippet_count: snippets.len(),
            context,
            seed,
        })
    }

    /// Buffered reply: the whole answer or an error, never partial output
    #[instrument(skip(self, query), fields(mode = "buffered", model = %self.model.model_name()))]
    pub async fn answer(&self, query: &str) -> Result<String> {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Buffered);
        let prepared = self.prepare(query, &mut lifecycle).await?;

        lifecycle.advance(ChatPhase::ModelCall)?;
        lifecycle.advance(ChatPhase::Buffering)?;

        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.answer_timeout,
            self.model.generate(&prepared.seed, query),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.answer_timeout.as_millis() as u64, "Model call timed out");
                Err(AppError::ModelCall {
                    message: format!("no answer within {:?}", self.answer_timeout),
                })
            }
        };
        metrics::record_model_call(
            start.elapsed().as_secs_f64(),
            self.model.model_name(),
            ResponseMode::Buffered.as_str(),
            result.is_ok(),
        );

        let reply = match result {
            Ok(reply) if reply.trim().is_empty() => {
                return Err(lifecycle.fail(AppError::ModelCall {
                    message: "model returned an empty answer".to_string(),
                }))
            }
            Ok(reply) => reply,
            Err(e) => return Err(lifecycle.fail(e)),
        };

        lifecycle.complete()?;
        Ok(reply)
    }

    /// Streaming reply.
    ///
    /// `Err` means nothing has been sent and the caller still owns the status
    /// code. `Ok` commits the request: from then on failures only surface as
    /// an error event. The model is called when the stream is first polled.
    #[instrument(skip(self, query), fields(mode = "streaming", model = %self.model.model_name()))]
    pub async fn stream(&self, query: &str) -> Result<EventStream> {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Streaming);
        let prepared = self.prepare(query, &mut lifecycle).await?;

        lifecycle.commit()?;
        Ok(committed_stream(
            self.model.clone(),
            prepared.seed,
            query.to_string(),
            lifecycle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::StreamEvent;
    use crate::dataset::{CityRecord, Place};
    use crate::embeddings::{Embedder, MockEmbedder};
    use crate::errors::RetrievalStage;
    use crate::llm::{MockModel, ScriptedModel};
    use crate::vector_store::{InMemoryVectorStore, StoredDocument, VectorRow, VectorStore};
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;

    fn jaipur() -> CityRecord {
        CityRecord {
            name: "Jaipur".to_string(),
            region: "Rajasthan".to_string(),
            average_lodging_cost: 2500.0,
            average_food_cost: 800.0,
            fuel_cost_per_km: 9.5,
            places: vec![Place {
                name: "Amber Fort".to_string(),
                category: "fort".to_string(),
                rating: 4.7,
            }],
            reviews: vec![],
        }
    }

    fn notes_store(embedder: &MockEmbedder) -> InMemoryVectorStore {
        let notes = [
            ("Jaipur budget stays cluster around MI Road", "jaipur-budget.md"),
            ("Three days in Jaipur cover the forts and bazaars", "jaipur-itinerary.md"),
        ];
        InMemoryVectorStore::new(
            notes
                .iter()
                .map(|(content, source)| StoredDocument {
                    content: content.to_string(),
                    metadata: json!({ "source": source }),
                    embedding: embedder.embed_text(content),
                })
                .collect(),
        )
    }

    async fn preview(assistant: &TravelAssistant, query: &str) -> Result<PreparedPrompt> {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Buffered);
        assistant.prepare(query, &mut lifecycle).await
    }

    fn assistant(store: Arc<dyn VectorStore>, model: Arc<dyn ModelProvider>) -> TravelAssistant {
        let catalog = CityCatalog::new(vec![jaipur()]).unwrap();
        let retriever = SemanticRetriever::new(Arc::new(MockEmbedder::new(64)), store, 2);
        TravelAssistant::new(catalog, retriever, PromptComposer::default(), model)
    }

    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn search(&self, _embedding: &[f32], _k: usize) -> Result<Vec<VectorRow>> {
            Err(AppError::VectorSearch {
                message: "relation does not exist".to_string(),
            })
        }

        async fn ping(&self) -> Result<()> {
            Err(AppError::DatabaseConnection {
                message: "refused".to_string(),
            })
        }

        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_jaipur_scenario() {
        let embedder = MockEmbedder::new(64);
        let assistant = assistant(Arc::new(notes_store(&embedder)), Arc::new(MockModel::new()));

        let prepared = preview(&assistant, "3 days in Jaipur under budget").await.unwrap();
        assert_eq!(prepared.city.as_deref(), Some("Jaipur"));
        assert_eq!(prepared.snippet_count, 2);
        assert!(prepared.context.as_str().contains("Jaipur (Rajasthan)"));
        assert_eq!(prepared.context.as_str().matches("[from ").count(), 2);

        let reply = assistant.answer("3 days in Jaipur under budget").await.unwrap();
        assert!(!reply.is_empty());

        let events: Vec<StreamEvent> = assistant
            .stream("3 days in Jaipur under budget")
            .await
            .unwrap()
            .collect()
            .await;
        assert!(events.len() > 1);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_unrelated_query_still_reaches_model() {
        let model = Arc::new(ScriptedModel::new(["I can only help with travel."]));
        let assistant = assistant(Arc::new(InMemoryVectorStore::default()), model.clone());

        let prepared = preview(&assistant, "how do quantum computers work").await.unwrap();
        assert!(prepared.city.is_none());
        assert!(prepared.context.as_str().contains(crate::context::NO_MATCH_SENTENCE));
        assert!(prepared.context.as_str().contains(crate::context::NO_SNIPPETS_SENTENCE));

        let reply = assistant.answer("how do quantum computers work").await.unwrap();
        assert_eq!(reply, "I can only help with travel.");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_pre_send() {
        let model = Arc::new(ScriptedModel::new(["never"]));
        let assistant = assistant(Arc::new(BrokenStore), model.clone());

        let err = assistant.stream("Jaipur forts").await.err().unwrap();
        assert!(matches!(
            err,
            AppError::Retrieval {
                stage: RetrievalStage::SimilaritySearch,
                ..
            }
        ));
        assert!(assistant.answer("Jaipur forts").await.is_err());
        assert_eq!(model.calls(), 0);
        assert!(assistant.check_ready().await.is_err());
    }

    #[tokio::test]
    async fn test_buffered_model_failures() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::default());

        let failing = assistant(store.clone(), Arc::new(ScriptedModel::failing_on_open("quota")));
        assert!(matches!(
            failing.answer("Jaipur").await,
            Err(AppError::ModelCall { .. })
        ));

        let partial = assistant(
            store.clone(),
            Arc::new(ScriptedModel::new(["half an ans"]).failing_after(1, "reset")),
        );
        assert!(partial.answer("Jaipur").await.is_err());

        let empty = assistant(store, Arc::new(ScriptedModel::new(["  "])));
        assert!(matches!(
            empty.answer("Jaipur").await,
            Err(AppError::ModelCall { .. })
        ));
    }

    struct SlowModel;

    #[async_trait]
    impl ModelProvider for SlowModel {
        async fn generate(&self, _seed: &ConversationSeed, _query: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }

        async fn generate_stream(
            &self,
            _seed: &ConversationSeed,
            _query: &str,
        ) -> Result<crate::llm::TextStream> {
            Err(AppError::ModelCall {
                message: "not used".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "slow-model"
        }
    }

    #[tokio::test]
    async fn test_buffered_timeout_is_model_failure() {
        let assistant = assistant(Arc::new(InMemoryVectorStore::default()), Arc::new(SlowModel))
            .with_answer_timeout(Duration::from_millis(20));

        let err = assistant.answer("Jaipur").await.unwrap_err();
        assert!(matches!(err, AppError::ModelCall { .. }));
        assert_eq!(err.public_message(), crate::errors::GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_streaming_model_failure_is_mid_send() {
        let model = Arc::new(ScriptedModel::new(["Day 1", "Day 2"]).failing_after(1, "reset"));
        let assistant = assistant(Arc::new(InMemoryVectorStore::default()), model);

        let events: Vec<StreamEvent> = assistant.stream("Jaipur").await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::TextDelta("Day 1".to_string()));
        assert!(matches!(events[1], StreamEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_model_name_and_catalog() {
        let assistant = assistant(Arc::new(InMemoryVectorStore::default()), Arc::new(MockModel::new()));
        assert_eq!(assistant.model_name(), "mock-model");
        assert_eq!(assistant.catalog().len(), 1);
        assert!(assistant.check_ready().await.is_ok());
    }
}
