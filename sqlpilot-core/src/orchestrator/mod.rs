//! Question-to-answer pipeline.
//!
//! [`QueryOrchestrator::process_query`] runs the steps below strictly in
//! order and records the label of every step it reaches:
//!
//! | Label | Step |
//! |---|---|
//! | `normalize` | collapse whitespace |
//! | `resolve_namespace` | index namespace from the connection descriptor |
//! | `scan_schema` / `index_schema` | populate the schema cache (first question only) |
//! | `retrieve_context` | similarity search over the schema index |
//! | `extract_intent` | LLM intent extraction |
//! | `fallback_context` | target table plus one-hop neighbours when retrieval found nothing |
//! | `clarification` | stop and ask the user |
//! | `generate_sql` / `validate_sql` / `apply_row_limit` | produce a safe, capped statement |
//! | `execute` / `correct_sql:<n>` | bounded self-correction loop |
//! | `format_answer` | natural-language answer |
//!
//! Failures never escape `process_query`: they become a non-success
//! [`AgentResponse`] carrying the steps reached and the SQL attempted.
//!
//! # Module Structure
//! - `cache`: Session schema cache with single-flight population
//! - `correction`: Execute-classify-correct loop
//! - `answer`: Answer formatting

mod answer;
mod cache;
mod correction;

use crate::Result;
use crate::adapters::{ConnectionConfig, DatabaseAdapter, create_adapter};
use crate::config::{AgentConfig, VectorStoreConfig};
use crate::corrector::SqlCorrector;
use crate::diagnostics::SqlErrorAnalyzer;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbedder};
use crate::error::SqlPilotError;
use crate::executor::SqlExecutor;
use crate::generator::{SqlGenerator, ensure_limit, rejection_reason};
use crate::index::{InMemoryVectorIndex, QdrantIndex, SchemaIndex, VectorIndex, collection_name};
use crate::intent::IntentExtractor;
use crate::llm::{OpenAiChatClient, OpenAiClient, TextGenerator};
use crate::models::{
    AgentResponse, DatabaseSchema, DatabaseType, IntentAnalysis, RelationshipInfo,
    RetrievedSchemaContext,
};
use crate::resilience::{ConnectionHandler, LlmHandler};
use crate::retrieval::SchemaRetriever;
use correction::CorrectionLoop;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub use answer::format_answer;
pub use cache::{CachedSchema, SchemaCache};

/// Namespace used when the connection descriptor names no database.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Processing-step labels recorded on every [`AgentResponse`].
pub mod steps {
    pub const NORMALIZE: &str = "normalize";
    pub const RESOLVE_NAMESPACE: &str = "resolve_namespace";
    pub const SCAN_SCHEMA: &str = "scan_schema";
    pub const INDEX_SCHEMA: &str = "index_schema";
    pub const RETRIEVE_CONTEXT: &str = "retrieve_context";
    pub const FALLBACK_CONTEXT: &str = "fallback_context";
    pub const EXTRACT_INTENT: &str = "extract_intent";
    pub const CLARIFICATION: &str = "clarification";
    pub const GENERATE_SQL: &str = "generate_sql";
    pub const VALIDATE_SQL: &str = "validate_sql";
    pub const APPLY_ROW_LIMIT: &str = "apply_row_limit";
    pub const EXECUTE: &str = "execute";
    /// Suffixed with `:<attempt>`
    pub const CORRECT_SQL: &str = "correct_sql";
    pub const FORMAT_ANSWER: &str = "format_answer";
}

/// Derives the index namespace from a connection descriptor.
///
/// Falls back to [`DEFAULT_NAMESPACE`] when no database name can be parsed.
pub fn resolve_namespace(connection_string: &str) -> String {
    match ConnectionConfig::from_connection_string(connection_string) {
        Ok(config) => config
            .database
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        Err(error) => {
            tracing::warn!(error = %error, "Could not derive index namespace, using default");
            DEFAULT_NAMESPACE.to_string()
        }
    }
}

/// Context built around the intent's target table when retrieval found
/// nothing: the target plus up to `max_neighbors` tables one foreign-key hop
/// away, in schema order.
///
/// Without a known target the whole schema is used.
pub fn fallback_context(
    schema: &DatabaseSchema,
    intent: &IntentAnalysis,
    max_neighbors: usize,
) -> RetrievedSchemaContext {
    let Some(target) = intent
        .target_entity
        .as_deref()
        .and_then(|name| schema.table(name))
    else {
        return RetrievedSchemaContext::full(schema);
    };

    let mut tables = vec![target.clone()];
    tables.extend(
        schema
            .neighbors_of(&target.name)
            .into_iter()
            .take(max_neighbors)
            .cloned(),
    );
    let relationships: Vec<RelationshipInfo> =
        schema.relationships_within(&tables).cloned().collect();

    RetrievedSchemaContext::from_tables(tables, relationships, Vec::new())
}

/// External services the orchestrator talks to besides the database.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_index: Arc<dyn VectorIndex>,
}

struct Session {
    adapter: Arc<dyn DatabaseAdapter>,
    namespace: String,
}

/// Steps reached and SQL attempted so far for one question.
#[derive(Debug, Default)]
struct Trail {
    steps: Vec<String>,
    sql: Option<String>,
}

impl Trail {
    fn step(&mut self, label: &str) {
        tracing::debug!(step = label, "Pipeline step");
        self.steps.push(label.to_string());
    }
}

/// Answers natural-language questions against one database at a time.
pub struct QueryOrchestrator {
    session: RwLock<Session>,
    config: AgentConfig,
    cache: SchemaCache,
    schema_index: Arc<SchemaIndex>,
    retriever: SchemaRetriever,
    intent: IntentExtractor,
    generator: SqlGenerator,
    corrector: SqlCorrector,
    executor: SqlExecutor,
    connection_handler: Arc<ConnectionHandler>,
    analyzer: SqlErrorAnalyzer,
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryOrchestrator {
    /// Creates an orchestrator over an existing adapter and collaborators.
    ///
    /// `connection_string` is only used to derive the index namespace.
    ///
    /// # Errors
    /// Returns a configuration error when `config` is invalid.
    pub fn new(
        adapter: Arc<dyn DatabaseAdapter>,
        connection_string: &str,
        collaborators: Collaborators,
        config: AgentConfig,
    ) -> Result<Self> {
        config.validate()?;

        let llm_handler = Arc::new(LlmHandler::new(config.llm.rate_limit_cooldown));
        let connection_handler = Arc::new(ConnectionHandler::new(&config.circuit_breaker));
        let schema_index = Arc::new(SchemaIndex::new(
            collaborators.vector_index,
            collaborators.embedder,
        ));

        Ok(Self {
            session: RwLock::new(Session {
                adapter,
                namespace: resolve_namespace(connection_string),
            }),
            cache: SchemaCache::new(),
            retriever: SchemaRetriever::new(Arc::clone(&schema_index), config.retrieval.clone()),
            schema_index,
            intent: IntentExtractor::new(Arc::clone(&collaborators.llm), Arc::clone(&llm_handler)),
            generator: SqlGenerator::new(Arc::clone(&collaborators.llm), Arc::clone(&llm_handler)),
            corrector: SqlCorrector::new(collaborators.llm, llm_handler),
            executor: SqlExecutor::new(
                Arc::clone(&connection_handler),
                config.max_transient_retries,
                config.query_timeout,
            ),
            connection_handler,
            analyzer: SqlErrorAnalyzer::new(),
            config,
        })
    }

    /// Connects to `connection_string` and wires the OpenAI-compatible LLM
    /// and embedding clients and the configured vector store.
    ///
    /// # Errors
    /// Returns an error when the API key is missing, a client cannot be built
    /// or the database type is unsupported.
    pub async fn connect(connection_string: &str, config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config.llm.api_key.clone().ok_or_else(|| {
            SqlPilotError::configuration("OPENAI_API_KEY is not set")
        })?;

        let chat_client = OpenAiClient::new(api_key.clone(), config.llm.base_url.as_str())?;
        let llm: Arc<dyn TextGenerator> = Arc::new(OpenAiChatClient::new(
            chat_client,
            config.llm.model.as_str(),
            config.llm.temperature,
        ));

        let embedding_client = OpenAiClient::new(api_key, config.embedding.base_url.as_str())?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(
            embedding_client,
            config.embedding.model.as_str(),
        ));

        let vector_index: Arc<dyn VectorIndex> = match &config.vector_store {
            VectorStoreConfig::Memory => Arc::new(InMemoryVectorIndex::new()),
            VectorStoreConfig::Qdrant { url, api_key } => {
                Arc::new(QdrantIndex::new(url.as_str(), api_key.clone())?)
            }
        };

        let adapter = create_adapter(connection_string, &config.connection_config()).await?;
        tracing::info!(
            target_db = %adapter.connection_descriptor(),
            database_type = %adapter.database_type(),
            "Connected orchestrator"
        );

        Self::new(
            adapter,
            connection_string,
            Collaborators {
                llm,
                embedder,
                vector_index,
            },
            config,
        )
    }

    /// The active configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Engine of the current database.
    pub async fn database_type(&self) -> DatabaseType {
        self.session.read().await.adapter.database_type()
    }

    /// Credential-free description of the current database.
    pub async fn connection_descriptor(&self) -> String {
        self.session.read().await.adapter.connection_descriptor()
    }

    async fn current_session(&self) -> (Arc<dyn DatabaseAdapter>, String) {
        let session = self.session.read().await;
        (Arc::clone(&session.adapter), session.namespace.clone())
    }

    /// Returns the cached schema, scanning and indexing on first use.
    async fn load_schema(
        &self,
        adapter: &dyn DatabaseAdapter,
        collection: &str,
    ) -> Result<CachedSchema> {
        self.cache
            .get_or_load(
                || self.connection_handler.guard(|| adapter.scan_schema()),
                |schema| async move {
                    match self.schema_index.ensure_indexed(collection, &schema).await {
                        Ok(points) => {
                            tracing::debug!(collection, points, "Schema index ready");
                            true
                        }
                        Err(error) => {
                            tracing::warn!(
                                collection,
                                error = %error,
                                "Schema indexing failed, using the full schema"
                            );
                            false
                        }
                    }
                },
            )
            .await
    }

    /// Answers `question`.
    ///
    /// Never fails: every error becomes a non-success response.
    pub async fn process_query(&self, question: &str) -> AgentResponse {
        let start_time = std::time::Instant::now();
        let mut trail = Trail::default();

        match self.run_pipeline(question, &mut trail).await {
            Ok(response) => {
                tracing::info!(
                    success = response.success,
                    corrections = response.correction_attempts,
                    "Answered question in {:.2}s",
                    start_time.elapsed().as_secs_f64()
                );
                response
            }
            Err(error) => {
                tracing::error!(error = %error, steps = trail.steps.len(), "Question failed");
                let mut response = AgentResponse::failure(error.to_string(), trail.steps);
                response.sql = trail.sql;
                response
            }
        }
    }

    /// Answers `question` unless `cancellation` fires first.
    ///
    /// # Errors
    /// Returns [`SqlPilotError::Cancelled`] when cancelled; the pipeline is
    /// dropped at its current await point.
    pub async fn process_query_with_cancellation(
        &self,
        question: &str,
        cancellation: &CancellationToken,
    ) -> Result<AgentResponse> {
        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                tracing::info!("Question cancelled");
                Err(SqlPilotError::Cancelled)
            }
            response = self.process_query(question) => Ok(response),
        }
    }

    async fn run_pipeline(&self, question: &str, trail: &mut Trail) -> Result<AgentResponse> {
        trail.step(steps::NORMALIZE);
        let question = question.split_whitespace().collect::<Vec<_>>().join(" ");
        if question.is_empty() {
            return Ok(AgentResponse::failure(
                "Please enter a question.",
                std::mem::take(&mut trail.steps),
            ));
        }

        trail.step(steps::RESOLVE_NAMESPACE);
        let (adapter, namespace) = self.current_session().await;
        let collection = collection_name(&namespace);
        let database_type = adapter.database_type();

        let cached = self
            .load_schema(adapter.as_ref(), &collection)
            .await
            .inspect_err(|_| trail.step(steps::SCAN_SCHEMA))?;
        if cached.scanned {
            trail.step(steps::SCAN_SCHEMA);
        }
        if cached.indexed {
            trail.step(steps::INDEX_SCHEMA);
        }
        let schema = cached.schema;

        trail.step(steps::RETRIEVE_CONTEXT);
        let retrieved = if cached.index_available {
            match self.retriever.retrieve(&question, &schema, &collection).await {
                Ok(context) => context,
                Err(error) => {
                    tracing::warn!(error = %error, "Schema retrieval failed, using the full schema");
                    RetrievedSchemaContext::full(&schema)
                }
            }
        } else {
            RetrievedSchemaContext::full(&schema)
        };

        let (intent, context) = if retrieved.is_empty() {
            trail.step(steps::EXTRACT_INTENT);
            let intent = self.intent.extract(&question, &schema.table_names()).await?;
            trail.step(steps::FALLBACK_CONTEXT);
            let context = fallback_context(&schema, &intent, self.config.max_fallback_neighbors);
            tracing::info!(
                table_count = context.tables.len(),
                "Retrieval found no tables, using fallback context"
            );
            (intent, context)
        } else {
            trail.step(steps::EXTRACT_INTENT);
            let intent = self.intent.extract(&question, &retrieved.table_names()).await?;
            (intent, retrieved)
        };

        if intent.requires_clarification() {
            trail.step(steps::CLARIFICATION);
            let clarification = intent.clarification_question.clone().unwrap_or_default();
            let mut response =
                AgentResponse::failure(clarification, std::mem::take(&mut trail.steps));
            response.error_message = Some("The question needs clarification".to_string());
            return Ok(response);
        }

        trail.step(steps::GENERATE_SQL);
        let sql = self
            .generator
            .generate(&question, &intent, &context, database_type)
            .await?;
        trail.sql = Some(sql.clone());

        trail.step(steps::VALIDATE_SQL);
        if let Some(reason) = rejection_reason(&sql) {
            tracing::warn!(reason = %reason, "Generated SQL rejected as unsafe");
            let mut response = AgentResponse::failure(
                SqlPilotError::unsafe_sql(reason).to_string(),
                std::mem::take(&mut trail.steps),
            );
            response.sql = Some(sql);
            return Ok(response);
        }

        trail.step(steps::APPLY_ROW_LIMIT);
        let sql = ensure_limit(&sql, self.config.default_row_limit, database_type);
        trail.sql = Some(sql.clone());

        let correction_loop = CorrectionLoop {
            adapter: adapter.as_ref(),
            executor: &self.executor,
            corrector: &self.corrector,
            analyzer: &self.analyzer,
            max_attempts: self.config.max_correction_attempts,
            row_limit: self.config.default_row_limit,
        };
        let outcome = correction_loop
            .run(sql, &question, &context, &intent, &mut trail.steps)
            .await;

        trail.step(steps::FORMAT_ANSWER);
        let corrections = outcome.history.len();
        let answer = format_answer(&intent, &outcome.result, corrections);
        let success = outcome.result.success;
        let error_message = if success {
            None
        } else {
            outcome
                .llm_failure
                .clone()
                .or_else(|| outcome.result.error_message.clone())
        };

        Ok(AgentResponse {
            success,
            answer,
            sql: Some(outcome.sql),
            execution_result: Some(outcome.result),
            error_message,
            processing_steps: std::mem::take(&mut trail.steps),
            correction_history: outcome.history,
            was_corrected: corrections > 0,
            correction_attempts: u32::try_from(corrections).unwrap_or(u32::MAX),
        })
    }

    /// Forgets the cached schema and indexed flag; the next question scans
    /// and indexes again.
    pub async fn clear_schema_cache(&self) {
        self.cache.clear().await;
        tracing::info!("Schema cache cleared");
    }

    /// Points the orchestrator at another database and clears the cache.
    ///
    /// # Errors
    /// Returns an error when no adapter can be created for the descriptor;
    /// the current database stays active in that case.
    pub async fn switch_database(&self, connection_string: &str) -> Result<()> {
        let adapter = create_adapter(connection_string, &self.config.connection_config()).await?;
        let namespace = resolve_namespace(connection_string);
        tracing::info!(
            target_db = %adapter.connection_descriptor(),
            namespace = %namespace,
            "Switching database"
        );

        {
            let mut session = self.session.write().await;
            *session = Session { adapter, namespace };
        }
        self.cache.clear().await;
        Ok(())
    }

    /// Drops the namespace collection and indexes the schema again.
    ///
    /// Returns the number of indexed points.
    ///
    /// # Errors
    /// Returns an error when the schema cannot be scanned or indexing fails;
    /// questions then run on the full schema.
    pub async fn rebuild_index(&self) -> Result<u64> {
        let (adapter, namespace) = self.current_session().await;
        let collection = collection_name(&namespace);

        let cached = self
            .cache
            .get_or_load(
                || self.connection_handler.guard(|| adapter.scan_schema()),
                |_| async { false },
            )
            .await?;

        match self.schema_index.rebuild(&collection, &cached.schema).await {
            Ok(points) => {
                self.cache.mark_indexed(true).await;
                Ok(points)
            }
            Err(error) => {
                self.cache.mark_indexed(false).await;
                Err(error)
            }
        }
    }

    /// The current database's schema, scanned and indexed on first use.
    ///
    /// # Errors
    /// Returns the scan error.
    pub async fn schema_summary(&self) -> Result<Arc<DatabaseSchema>> {
        let (adapter, namespace) = self.current_session().await;
        let collection = collection_name(&namespace);
        Ok(self.load_schema(adapter.as_ref(), &collection).await?.schema)
    }

    /// Checks that the current database is reachable.
    ///
    /// # Errors
    /// Returns the connection error, or a handler error when the circuit is
    /// open.
    pub async fn test_connection(&self) -> Result<bool> {
        let (adapter, _) = self.current_session().await;
        self.connection_handler
            .guard(|| adapter.test_connection())
            .await
    }
}
