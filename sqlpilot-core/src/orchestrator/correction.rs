//! Bounded execute-classify-correct loop.

use super::steps;
use crate::adapters::DatabaseAdapter;
use crate::corrector::{CorrectionRequest, SqlCorrector};
use crate::diagnostics::{ErrorSeverity, SqlErrorAnalyzer};
use crate::error::SqlPilotError;
use crate::executor::SqlExecutor;
use crate::generator::{ensure_limit, rejection_reason};
use crate::models::{CorrectionAttempt, IntentAnalysis, RetrievedSchemaContext, SqlExecutionResult};
use chrono::Utc;

/// Where the loop ended up.
#[derive(Debug, Clone)]
pub(crate) struct LoopOutcome {
    /// Last statement executed
    pub sql: String,
    pub result: SqlExecutionResult,
    pub history: Vec<CorrectionAttempt>,
    /// Critical LLM failure that ended the loop, such as a rejected key or
    /// an exhausted quota
    pub llm_failure: Option<String>,
}

pub(crate) struct CorrectionLoop<'a> {
    pub adapter: &'a dyn DatabaseAdapter,
    pub executor: &'a SqlExecutor,
    pub corrector: &'a SqlCorrector,
    pub analyzer: &'a SqlErrorAnalyzer,
    pub max_attempts: u32,
    pub row_limit: u32,
}

impl CorrectionLoop<'_> {
    /// Executes `initial_sql`, correcting failures until one succeeds or the
    /// loop has to stop.
    ///
    /// At most `max_attempts` statements are executed and at most
    /// `max_attempts - 1` corrections requested.
    pub(crate) async fn run(
        &self,
        initial_sql: String,
        question: &str,
        context: &RetrievedSchemaContext,
        intent: &IntentAnalysis,
        trail: &mut Vec<String>,
    ) -> LoopOutcome {
        let max_attempts = self.max_attempts.max(1);
        let database_type = self.adapter.database_type();
        let mut current = initial_sql;
        let mut history: Vec<CorrectionAttempt> = Vec::new();
        let mut executions = 0u32;
        let mut llm_failure: Option<String> = None;

        loop {
            executions += 1;
            trail.push(steps::EXECUTE.to_string());
            let result = self.executor.execute(self.adapter, &current).await;

            if result.success {
                if let Some(last) = history.last_mut() {
                    last.success = true;
                }
                return LoopOutcome {
                    sql: current,
                    result,
                    history,
                    llm_failure,
                };
            }

            let raw_error = result.error_message.clone().unwrap_or_default();
            let classified = result
                .error_details
                .clone()
                .unwrap_or_else(|| self.analyzer.analyze_error(&raw_error, &current));

            if executions >= max_attempts {
                tracing::warn!(
                    attempts = executions,
                    error_type = ?classified.error_type,
                    "Correction budget exhausted"
                );
                return LoopOutcome {
                    sql: current,
                    result,
                    history,
                    llm_failure,
                };
            }

            let attempt_number = executions;
            trail.push(format!("{}:{}", steps::CORRECT_SQL, attempt_number));
            tracing::info!(
                attempt = attempt_number,
                error_type = ?classified.error_type,
                "Requesting SQL correction"
            );

            let correction = self
                .corrector
                .correct(CorrectionRequest {
                    question,
                    failed_sql: &current,
                    raw_error: &raw_error,
                    classified: &classified,
                    context,
                    intent,
                })
                .await;

            let (corrected_sql, reasoning, usable) = match correction {
                Ok(correction) => {
                    let capped = ensure_limit(&correction.corrected_sql, self.row_limit, database_type);
                    match rejection_reason(&capped) {
                        None => (Some(capped), correction.reasoning, true),
                        Some(reason) => {
                            tracing::warn!(reason = %reason, "Corrected SQL rejected as unsafe");
                            (Some(capped), SqlPilotError::unsafe_sql(reason).to_string(), false)
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Correction failed");
                    if error
                        .classified()
                        .is_some_and(|c| c.severity == ErrorSeverity::Critical)
                    {
                        llm_failure = Some(error.to_string());
                    }
                    (None, error.to_string(), false)
                }
            };

            let repeated = history
                .last()
                .and_then(|previous| previous.corrected_sql.as_deref())
                .zip(corrected_sql.as_deref())
                .is_some_and(|(previous, latest)| previous == latest);

            history.push(CorrectionAttempt {
                attempt_number,
                original_sql: current.clone(),
                error: classified.clone(),
                corrected_sql: corrected_sql.clone(),
                reasoning,
                success: false,
                timestamp: Utc::now(),
            });

            let stop_reason = if !usable {
                Some("corrector produced no usable SQL")
            } else if repeated {
                Some("correction repeated the previous attempt")
            } else if !classified.is_recoverable {
                Some("error is not recoverable")
            } else {
                None
            };

            match (stop_reason, corrected_sql) {
                (None, Some(next)) => current = next,
                (reason, _) => {
                    tracing::info!(
                        reason = reason.unwrap_or("no corrected SQL"),
                        attempts = executions,
                        "Stopping correction loop"
                    );
                    return LoopOutcome {
                        sql: current,
                        result,
                        history,
                        llm_failure,
                    };
                }
            }
        }
    }
}
