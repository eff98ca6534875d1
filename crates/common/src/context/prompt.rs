//! Conversation seed construction
//!
//! The persona template carries exactly one placeholder which is replaced by
//! the fused context. The result becomes the first user turn, followed by a
//! short model acknowledgement. The caller's query is sent as the next turn.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Substitution token inside the persona template
pub const CONTEXT_PLACEHOLDER: &str = "{{CONTEXT}}";

const DEFAULT_PERSONA: &str = "You are Wayfarer, a friendly travel planner for trips in India. \
Answer the traveller's questions using the information below. Prefer the structured data for \
costs, quote the retrieved notes when they help, and say so plainly when the data does not \
cover something instead of guessing.\n\n{{CONTEXT}}";

const DEFAULT_ACKNOWLEDGEMENT: &str =
    "Understood. I will plan using the travel data provided. What would you like to know?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Priming turns placed before the caller's query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSeed {
    turns: Vec<Turn>,
}

impl ConversationSeed {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// Builds a [`ConversationSeed`] from a persona template
#[derive(Debug, Clone)]
pub struct PromptComposer {
    template: String,
    acknowledgement: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self {
            template: DEFAULT_PERSONA.to_string(),
            acknowledgement: DEFAULT_ACKNOWLEDGEMENT.to_string(),
        }
    }
}

impl PromptComposer {
    /// Custom persona; `template` must contain [`CONTEXT_PLACEHOLDER`] exactly once
    pub fn new(template: impl Into<String>, acknowledgement: impl Into<String>) -> Result<Self> {
        let composer = Self {
            template: template.into(),
            acknowledgement: acknowledgement.into(),
        };
        composer.check_template()?;
        Ok(composer)
    }

    fn check_template(&self) -> Result<()> {
        let count = self.template.matches(CONTEXT_PLACEHOLDER).count();
        if count != 1 {
            return Err(AppError::Composition {
                message: format!(
                    "persona template must contain {} exactly once, found {}",
                    CONTEXT_PLACEHOLDER, count
                ),
            });
        }
        Ok(())
    }

    /// Substitute `context` into the template and seed the two priming turns
    pub fn compose(&self, context: &str) -> Result<ConversationSeed> {
        self.check_template()?;

        if context.trim().is_empty() {
            return Err(AppError::Composition {
                message: "fused context is empty".to_string(),
            });
        }
        if context.contains(CONTEXT_PLACEHOLDER) {
            return Err(AppError::Composition {
                message: "fused context contains the template placeholder".to_string(),
            });
        }

        Ok(ConversationSeed {
            turns: vec![
                Turn {
                    role: Role::User,
                    text: self.template.replacen(CONTEXT_PLACEHOLDER, context, 1),
                },
                Turn {
                    role: Role::Model,
                    text: self.acknowledgement.clone(),
                },
            ],
        })
    }
}
