//! SQL generation from intent and schema context.
//!
//! # Module Structure
//! - `safety`: SELECT-only allow-list and the default row cap

mod safety;

use crate::Result;
use crate::error::SqlPilotError;
use crate::llm::{TextGenerator, complete, strip_code_fences};
use crate::models::{DatabaseType, IntentAnalysis, RetrievedSchemaContext};
use crate::prompts::{sql_system_prompt, sql_user_prompt};
use crate::resilience::LlmHandler;
use std::sync::Arc;

pub use safety::{
    FORBIDDEN_KEYWORDS, ensure_limit, is_aggregate_query, rejection_reason, validate_sql,
};

/// Generates one SELECT statement per question.
///
/// The reply is stripped of code fences and a trailing semicolon; safety
/// validation is left to the caller so the rejected text can be reported.
#[derive(Clone)]
pub struct SqlGenerator {
    llm: Arc<dyn TextGenerator>,
    handler: Arc<LlmHandler>,
}

impl std::fmt::Debug for SqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGenerator").finish_non_exhaustive()
    }
}

impl SqlGenerator {
    /// Creates a generator sharing `handler`'s rate-limit clock.
    pub fn new(llm: Arc<dyn TextGenerator>, handler: Arc<LlmHandler>) -> Self {
        Self { llm, handler }
    }

    /// Generates SQL for `question` in the dialect of `database_type`.
    ///
    /// # Errors
    /// Returns an error when the LLM call fails or the reply is empty.
    pub async fn generate(
        &self,
        question: &str,
        intent: &IntentAnalysis,
        context: &RetrievedSchemaContext,
        database_type: DatabaseType,
    ) -> Result<String> {
        let reply = complete(
            self.llm.as_ref(),
            &self.handler,
            &sql_system_prompt(database_type),
            &sql_user_prompt(question, intent, context),
        )
        .await?;

        let sql = strip_code_fences(&reply);
        if sql.is_empty() {
            return Err(SqlPilotError::llm_response("SQL generation returned an empty reply"));
        }

        tracing::debug!(sql = %sql, "Generated SQL");
        Ok(sql)
    }
}
