//! Google Generative Language client
//!
//! The API has no separate system channel here: the persona travels as the
//! first `user` turn of the seed and the model's acknowledgement as the
//! second.

use super::sse::SseDecoder;
use super::{ModelProvider, TextStream};
use crate::config::ModelConfig;
use crate::context::{ConversationSeed, Role};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, instrument};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini chat client
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GenerateResponse {
    /// Text of the first candidate, or the reason there is none
    fn into_text(self) -> Result<String> {
        if let Some(error) = self.error {
            return Err(AppError::ModelCall {
                message: error.message,
            });
        }

        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AppError::ModelCall {
                message: format!("prompt blocked: {}", reason),
            });
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Ok(String::new());
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"))
                if text.is_empty() =>
            {
                Err(AppError::ModelCall {
                    message: format!("response stopped: {}", reason),
                })
            }
            _ => Ok(text),
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

impl GeminiModel {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| GEMINI_API_BASE.to_string()),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn build_request<'a>(&self, seed: &'a ConversationSeed, query: &'a str) -> GenerateRequest<'a> {
        let mut contents: Vec<Content<'a>> = seed
            .turns()
            .iter()
            .map(|turn| Content {
                role: role_name(turn.role),
                parts: [Part { text: &turn.text }],
            })
            .collect();

        contents.push(Content {
            role: role_name(Role::User),
            parts: [Part { text: query }],
        });

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    async fn send(&self, url: &str, request: &GenerateRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::ModelCall {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelCall {
                message: format!("API error {}: {}", status, body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelProvider for GeminiModel {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, seed: &ConversationSeed, query: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self.build_request(seed, query);

        let response: GenerateResponse = self
            .send(&url, &request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::ModelCall {
                message: format!("Failed to parse response: {}", e),
            })?;

        response.into_text()
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate_stream(&self, seed: &ConversationSeed, query: &str) -> Result<TextStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let request = self.build_request(seed, query);

        let response = self.send(&url, &request).await?;
        debug!("Model stream opened");

        Ok(text_increments(response.bytes_stream()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

struct IncrementState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn an SSE response body into text increments.
///
/// Empty increments are skipped. The first error ends the stream.
fn text_increments<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = IncrementState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.pending.pop_front() {
                match parse_increment(&data) {
                    Ok(Some(text)) => return Some((Ok(text), st)),
                    Ok(None) => continue,
                    Err(e) => {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
            }

            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.push(chunk.as_ref());
                    st.pending.extend(events);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((
                        Err(AppError::ModelCall {
                            message: format!("stream interrupted: {}", e),
                        }),
                        st,
                    ));
                }
                None => {
                    st.finished = true;
                    let events = st.decoder.finish();
                    st.pending.extend(events);
                }
            }
        }
    })
    .boxed()
}

fn parse_increment(data: &str) -> Result<Option<String>> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }

    let chunk: GenerateResponse = serde_json::from_str(data).map_err(|e| AppError::ModelCall {
        message: format!("Malformed stream chunk: {}", e),
    })?;

    let text = chunk.into_text()?;
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PromptComposer;

    fn model() -> GeminiModel {
        GeminiModel::new(&ModelConfig::default(), "key".to_string()).unwrap()
    }

    fn chunk(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{}\"}}],\"role\":\"model\"}}}}]}}\n\n",
            text
        )
    }

    async fn collect(body: Vec<std::result::Result<Vec<u8>, String>>) -> Vec<Result<String>> {
        text_increments(stream::iter(body)).collect().await
    }

    #[test]
    fn test_request_shape() {
        let seed = PromptComposer::default().compose("CTX").unwrap();
        let model = model();
        let request = model.build_request(&seed, "Plan 3 days in Jaipur");
        let json = serde_json::to_value(&request).unwrap();

        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "Plan 3 days in Jaipur");
        assert!(contents[0]["parts"][0]["text"].as_str().unwrap().contains("CTX"));
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Day 1: "},{"text":"Amber Fort"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Day 1: Amber Fort");
    }

    #[test]
    fn test_blocked_prompt() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("prompt blocked: SAFETY"));
    }

    #[test]
    fn test_safety_stop_without_text() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"SAFETY"}]}"#,
        )
        .unwrap();
        assert!(response.into_text().is_err());
    }

    #[tokio::test]
    async fn test_increments_in_order_across_chunk_boundaries() {
        let raw = format!("{}{}{}", chunk("Day 1"), chunk(", Day 2"), chunk(", Day 3"));
        let (a, b) = raw.as_bytes().split_at(raw.len() / 2);

        let items = collect(vec![Ok(a.to_vec()), Ok(b.to_vec())]).await;
        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Day 1", ", Day 2", ", Day 3"]);
    }

    #[tokio::test]
    async fn test_empty_increments_skipped() {
        let raw = format!(
            "{}data: {{\"candidates\":[{{\"finishReason\":\"STOP\"}}]}}\n\n",
            chunk("only")
        );
        let items = collect(vec![Ok(raw.into_bytes())]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "only");
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let items = collect(vec![
            Ok(chunk("partial").into_bytes()),
            Err("connection reset".to_string()),
            Ok(chunk("never").into_bytes()),
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_malformed_chunk_ends_stream() {
        let raw = format!("data: not json\n\n{}", chunk("after"));
        let items = collect(vec![Ok(raw.into_bytes())]).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn test_error_payload_in_stream() {
        let raw = "data: {\"error\":{\"code\":429,\"message\":\"Resource exhausted\"}}\n\n";
        let items = collect(vec![Ok(raw.as_bytes().to_vec())]).await;
        assert_eq!(items.len(), 1);
        assert!(items[0]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("Resource exhausted"));
    }
}
