//! Context assembly for a travel question
//!
//! - Structured lookup against the city catalog
//! - Semantic retrieval of travel notes
//! - Fusion of both into one context block
//! - Prompt composition into a conversation seed

mod fuser;
mod matcher;
mod prompt;
mod retriever;

pub use fuser::{fuse, FusedContext, NO_MATCH_SENTENCE, NO_SNIPPETS_SENTENCE};
pub use matcher::{best_match, match_cities};
pub use prompt::{ConversationSeed, PromptComposer, Role, Turn, CONTEXT_PLACEHOLDER};
pub use retriever::SemanticRetriever;
pub use crate::vector_store::RetrievedSnippet;
