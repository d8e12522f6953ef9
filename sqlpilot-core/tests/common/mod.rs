//! Shared fixtures for the SQLite-backed integration tests.
//!
//! Provides a small shop database on disk, a scripted LLM that answers per
//! pipeline stage, and a keyword embedder so similarity search is
//! deterministic.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlpilot_core::embeddings::EmbeddingProvider;
use sqlpilot_core::index::{InMemoryVectorIndex, VectorIndex};
use sqlpilot_core::llm::{LlmError, TextGenerator};
use sqlpilot_core::{AgentConfig, Collaborators, ConnectionConfig, QueryOrchestrator, Result};
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SHOP_SCHEMA: &str = r#"
CREATE TABLE Customers (
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL,
    City TEXT
);
CREATE TABLE Orders (
    Id INTEGER PRIMARY KEY,
    CustomerId INTEGER NOT NULL REFERENCES Customers(Id),
    Total REAL NOT NULL
);
CREATE TABLE Products (
    Id INTEGER PRIMARY KEY,
    Title TEXT NOT NULL
);
INSERT INTO Customers (Id, Name, City) VALUES
    (1, 'Alice', 'Berlin'),
    (2, 'Bob', 'Madrid'),
    (3, 'Carol', 'Berlin');
INSERT INTO Orders (Id, CustomerId, Total) VALUES
    (1, 1, 20.0),
    (2, 1, 15.5),
    (3, 2, 7.25),
    (4, 3, 40.0);
INSERT INTO Products (Id, Title) VALUES
    (1, 'Lamp'),
    (2, 'Desk');
"#;

/// Creates a database file at `path` from `script` and returns its URL.
pub async fn create_database(path: &Path, script: &str) -> Result<String> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(sqlpilot_core::SqlPilotError::connection_failed)?;
    sqlx::raw_sql(script)
        .execute(&mut conn)
        .await
        .map_err(sqlpilot_core::SqlPilotError::connection_failed)?;
    conn.close()
        .await
        .map_err(sqlpilot_core::SqlPilotError::connection_failed)?;

    Ok(format!("sqlite://{}", path.display()))
}

/// Creates the shop database (Customers, Orders, Products) in `dir`.
pub async fn create_shop_database(dir: &Path) -> Result<String> {
    create_database(&dir.join("shop.db"), SHOP_SCHEMA).await
}

// =============================================================================
// Scripted LLM
// =============================================================================

/// Pipeline stage a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intent,
    Sql,
    Correction,
}

fn stage_of(system: &str) -> Stage {
    if system.starts_with("You fix failing") {
        Stage::Correction
    } else if system.starts_with("You analyse questions") {
        Stage::Intent
    } else {
        Stage::Sql
    }
}

/// Answers each stage from its own queue; the last reply of a queue repeats.
#[derive(Default)]
pub struct ScriptedLlm {
    intent: Mutex<VecDeque<String>>,
    sql: Mutex<VecDeque<String>>,
    correction: Mutex<VecDeque<String>>,
    quota_exhausted: Option<Stage>,
    calls: Mutex<Vec<(Stage, String)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(self, reply: &str) -> Self {
        self.push(Stage::Intent, reply)
    }

    pub fn sql(self, reply: &str) -> Self {
        self.push(Stage::Sql, reply)
    }

    pub fn correction(self, reply: &str) -> Self {
        self.push(Stage::Correction, reply)
    }

    /// Every call for `stage` fails with a quota error.
    pub fn quota_exhausted(mut self, stage: Stage) -> Self {
        self.quota_exhausted = Some(stage);
        self
    }

    fn push(self, stage: Stage, reply: &str) -> Self {
        self.queue(stage).lock().unwrap().push_back(reply.to_string());
        self
    }

    fn queue(&self, stage: Stage) -> &Mutex<VecDeque<String>> {
        match stage {
            Stage::Intent => &self.intent,
            Stage::Sql => &self.sql,
            Stage::Correction => &self.correction,
        }
    }

    /// User prompts sent for `stage`, in order.
    pub fn prompts(&self, stage: Stage) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn complete(&self, system: &str, user: &str) -> std::result::Result<String, LlmError> {
        let stage = stage_of(system);
        self.calls.lock().unwrap().push((stage, user.to_string()));
        if self.quota_exhausted == Some(stage) {
            return Err(LlmError::new("You exceeded your current quota").with_status(429));
        }

        let mut queue = self.queue(stage).lock().unwrap();
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.ok_or_else(|| LlmError::new(format!("no scripted {:?} reply", stage)).with_status(400))
    }
}

// =============================================================================
// Keyword embedder
// =============================================================================

const KEYWORDS: [&str; 4] = ["customer", "order", "product", "widget"];

/// One dimension per keyword; a text without keywords embeds to zero.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        KEYWORDS
            .iter()
            .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len()
    }
}

// =============================================================================
// Orchestrator wiring
// =============================================================================

/// Builds an orchestrator over `url` with the given doubles.
pub async fn orchestrator(
    url: &str,
    llm: Arc<ScriptedLlm>,
    vector_index: Arc<dyn VectorIndex>,
) -> Result<QueryOrchestrator> {
    let adapter = sqlpilot_core::create_adapter(url, &ConnectionConfig::default()).await?;
    QueryOrchestrator::new(
        adapter,
        url,
        Collaborators {
            llm,
            embedder: Arc::new(KeywordEmbedder),
            vector_index,
        },
        AgentConfig::default(),
    )
}

/// Orchestrator with an in-memory vector index.
pub async fn memory_orchestrator(url: &str, llm: Arc<ScriptedLlm>) -> Result<QueryOrchestrator> {
    orchestrator(url, llm, Arc::new(InMemoryVectorIndex::new())).await
}
