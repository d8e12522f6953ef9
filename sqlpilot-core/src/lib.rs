//! Core of sqlpilot: natural-language questions to read-only SQL.
//!
//! This crate turns a question into a safe, row-capped SELECT statement using
//! retrieved schema context and an LLM, executes it, and repairs failing SQL
//! in a bounded self-correction loop driven by classified error diagnostics.
//! Every external dependency (database, vector store, LLM) is wrapped in a
//! resilience handler chosen by the failure's classification.
//!
//! # Read-Only Guarantees
//! - Generated SQL passes a SELECT-only keyword allow-list before execution
//! - Every statement runs on its own short-lived, read-only connection
//! - Connection strings and API keys are redacted from logs and errors
//!
//! # Architecture
//! - [`adapters`]: one [`DatabaseAdapter`] per engine, selected by a factory
//! - [`diagnostics`]: error taxonomy and [`SqlErrorAnalyzer`]
//! - [`resilience`]: retry, backoff, cooldown and circuit-breaker handlers
//! - [`index`] and [`retrieval`]: schema embeddings and context selection
//! - [`intent`], [`generator`], [`executor`], [`corrector`]: pipeline stages
//! - [`orchestrator`]: the [`QueryOrchestrator`] state machine

pub mod adapters;
pub mod config;
pub mod corrector;
pub mod diagnostics;
pub mod embeddings;
pub mod error;
pub mod executor;
pub mod generator;
pub mod index;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod resilience;
pub mod retrieval;

// Re-export commonly used types
pub use adapters::{ConnectionConfig, DatabaseAdapter, create_adapter};
pub use config::AgentConfig;
pub use diagnostics::{RetryStrategy, SqlError, SqlErrorAnalyzer, SqlErrorType};
pub use error::{Result, SqlPilotError};
pub use generator::{ensure_limit, validate_sql};
pub use models::{
    AgentResponse, CorrectionAttempt, DatabaseSchema, DatabaseType, IntentAnalysis,
    QueryOperation, RetrievedSchemaContext, SqlExecutionResult,
};
pub use orchestrator::{Collaborators, QueryOrchestrator};
