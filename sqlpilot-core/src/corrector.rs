//! LLM-driven correction of failed SQL.

use crate::Result;
use crate::diagnostics::SqlError;
use crate::llm::{TextGenerator, ask_structured, decode_json_reply, strip_code_fences};
use crate::models::{IntentAnalysis, RetrievedSchemaContext};
use crate::prompts::{CORRECTION_SYSTEM_PROMPT, correction_user_prompt};
use crate::resilience::LlmHandler;
use serde::Deserialize;
use std::sync::Arc;

/// A corrected statement and the model's explanation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Correction {
    #[serde(alias = "correctedSql", alias = "sql")]
    pub corrected_sql: String,
    #[serde(default, alias = "explanation")]
    pub reasoning: String,
}

/// Everything the corrector is told about one failure.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionRequest<'a> {
    pub question: &'a str,
    pub failed_sql: &'a str,
    pub raw_error: &'a str,
    pub classified: &'a SqlError,
    pub context: &'a RetrievedSchemaContext,
    pub intent: &'a IntentAnalysis,
}

/// Decodes a correction reply: a JSON object, or bare SQL.
fn decode_correction(reply: &str) -> std::result::Result<Correction, String> {
    let json_error = match decode_json_reply::<Correction>(reply) {
        Ok(correction) if !correction.corrected_sql.trim().is_empty() => {
            return Ok(Correction {
                corrected_sql: strip_code_fences(&correction.corrected_sql),
                reasoning: correction.reasoning,
            });
        }
        Ok(_) => "corrected_sql is empty".to_string(),
        Err(error) => error.to_string(),
    };

    let text = strip_code_fences(reply);
    let upper = text.trim_start().to_ascii_uppercase();
    if upper.starts_with("SELECT") || upper.starts_with("WITH") {
        return Ok(Correction {
            corrected_sql: text,
            reasoning: String::new(),
        });
    }

    Err(json_error)
}

/// Asks the LLM to repair a failed statement given its diagnosis.
#[derive(Clone)]
pub struct SqlCorrector {
    llm: Arc<dyn TextGenerator>,
    handler: Arc<LlmHandler>,
}

impl std::fmt::Debug for SqlCorrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCorrector").finish_non_exhaustive()
    }
}

impl SqlCorrector {
    /// Creates a corrector sharing `handler`'s rate-limit clock.
    pub fn new(llm: Arc<dyn TextGenerator>, handler: Arc<LlmHandler>) -> Self {
        Self { llm, handler }
    }

    /// Proposes a corrected statement.
    ///
    /// # Errors
    /// Returns an error when the LLM call fails or no usable SQL comes back
    /// after one re-ask.
    pub async fn correct(&self, request: CorrectionRequest<'_>) -> Result<Correction> {
        let user_prompt = correction_user_prompt(
            request.question,
            request.failed_sql,
            request.raw_error,
            request.classified,
            request.context,
            request.intent,
        );

        let correction = ask_structured(
            self.llm.as_ref(),
            &self.handler,
            "correction",
            CORRECTION_SYSTEM_PROMPT,
            &user_prompt,
            decode_correction,
        )
        .await?;

        tracing::debug!(
            error_type = ?request.classified.error_type,
            corrected_sql = %correction.corrected_sql,
            "Proposed correction"
        );
        Ok(correction)
    }
}
