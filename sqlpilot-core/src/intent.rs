//! Intent extraction: question text to [`IntentAnalysis`].

use crate::Result;
use crate::llm::{TextGenerator, ask_structured, decode_json_reply};
use crate::models::IntentAnalysis;
use crate::prompts::{INTENT_SYSTEM_PROMPT, intent_user_prompt};
use crate::resilience::LlmHandler;
use std::sync::Arc;

const DEFAULT_CLARIFICATION: &str =
    "Could you rephrase the question with more detail about what you want to see?";

/// Asks the LLM for the operation, target table, metrics and filters of a
/// question.
#[derive(Clone)]
pub struct IntentExtractor {
    llm: Arc<dyn TextGenerator>,
    handler: Arc<LlmHandler>,
}

impl std::fmt::Debug for IntentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentExtractor").finish_non_exhaustive()
    }
}

impl IntentExtractor {
    /// Creates an extractor sharing `handler`'s rate-limit clock.
    pub fn new(llm: Arc<dyn TextGenerator>, handler: Arc<LlmHandler>) -> Self {
        Self { llm, handler }
    }

    /// Extracts the intent of `question`, restricted to `table_names`.
    ///
    /// A clarification request without a question text gets a generic one.
    ///
    /// # Errors
    /// Returns [`crate::SqlPilotError::LlmResponse`] when the reply does not
    /// decode after one re-ask, or a handler error when the LLM call fails.
    pub async fn extract(&self, question: &str, table_names: &[String]) -> Result<IntentAnalysis> {
        let user_prompt = intent_user_prompt(question, table_names);
        let mut intent: IntentAnalysis = ask_structured(
            self.llm.as_ref(),
            &self.handler,
            "intent",
            INTENT_SYSTEM_PROMPT,
            &user_prompt,
            |reply| decode_json_reply(reply).map_err(|e| e.to_string()),
        )
        .await?;

        if intent.needs_clarification
            && intent
                .clarification_question
                .as_deref()
                .is_none_or(|q| q.trim().is_empty())
        {
            intent.clarification_question = Some(DEFAULT_CLARIFICATION.to_string());
        }

        tracing::debug!(
            operation = %intent.operation,
            target = intent.target_entity.as_deref().unwrap_or("-"),
            needs_clarification = intent.needs_clarification,
            "Extracted intent"
        );
        Ok(intent)
    }
}
