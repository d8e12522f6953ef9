//! Session-scoped schema cache with single-flight population.

use crate::Result;
use crate::models::DatabaseSchema;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct CacheState {
    schema: Option<Arc<DatabaseSchema>>,
    indexed: bool,
    index_available: bool,
}

/// A schema snapshot handed to one question.
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub schema: Arc<DatabaseSchema>,
    /// Whether similarity search can be used for this schema
    pub index_available: bool,
    /// The schema was scanned by this call
    pub scanned: bool,
    /// Indexing was attempted by this call
    pub indexed: bool,
}

/// Cached schema and indexed flag for the current database.
///
/// The read-check-populate sequence runs under one async lock, so concurrent
/// questions scan and index at most once between two [`SchemaCache::clear`]
/// calls.
#[derive(Debug, Default)]
pub struct SchemaCache {
    state: Mutex<CacheState>,
}

impl SchemaCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached schema, scanning and indexing it first if needed.
    ///
    /// `index` reports whether the index is usable. Its outcome is recorded
    /// either way so a failing index is not retried on every question.
    ///
    /// # Errors
    /// Returns the scan error; nothing is cached in that case.
    pub async fn get_or_load<S, SFut, I, IFut>(&self, scan: S, index: I) -> Result<CachedSchema>
    where
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<DatabaseSchema>>,
        I: FnOnce(Arc<DatabaseSchema>) -> IFut,
        IFut: Future<Output = bool>,
    {
        let mut state = self.state.lock().await;

        let mut scanned = false;
        let schema = match state.schema.clone() {
            Some(schema) => schema,
            None => {
                let schema = Arc::new(scan().await?);
                state.schema = Some(Arc::clone(&schema));
                scanned = true;
                schema
            }
        };

        let mut indexed = false;
        if !state.indexed {
            state.index_available = index(Arc::clone(&schema)).await;
            state.indexed = true;
            indexed = true;
        }

        Ok(CachedSchema {
            schema,
            index_available: state.index_available,
            scanned,
            indexed,
        })
    }

    /// The cached schema, if any.
    pub async fn snapshot(&self) -> Option<Arc<DatabaseSchema>> {
        self.state.lock().await.schema.clone()
    }

    /// Records the outcome of an explicit index rebuild.
    pub async fn mark_indexed(&self, available: bool) {
        let mut state = self.state.lock().await;
        state.indexed = true;
        state.index_available = available;
    }

    /// Forgets the schema and the indexed flag.
    pub async fn clear(&self) {
        *self.state.lock().await = CacheState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlPilotError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn empty_schema() -> DatabaseSchema {
        DatabaseSchema::new(Vec::new(), Vec::new())
    }

    #[tokio::test]
    async fn test_scans_and_indexes_once_until_cleared() {
        let cache = SchemaCache::new();
        let scans = AtomicU32::new(0);
        let indexes = AtomicU32::new(0);

        for expected_first in [true, false, false] {
            let cached = cache
                .get_or_load(
                    || async {
                        scans.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, SqlPilotError>(empty_schema())
                    },
                    |_| async {
                        indexes.fetch_add(1, Ordering::SeqCst);
                        true
                    },
                )
                .await
                .unwrap();
            assert_eq!(cached.scanned, expected_first);
            assert_eq!(cached.indexed, expected_first);
            assert!(cached.index_available);
        }
        assert_eq!(scans.load(Ordering::SeqCst), 1);
        assert_eq!(indexes.load(Ordering::SeqCst), 1);

        cache.clear().await;
        assert!(cache.snapshot().await.is_none());

        let cached = cache
            .get_or_load(|| async { Ok::<_, SqlPilotError>(empty_schema()) }, |_| async { true })
            .await
            .unwrap();
        assert!(cached.scanned);
        assert!(cached.indexed);
    }

    #[tokio::test]
    async fn test_failed_index_is_remembered() {
        let cache = SchemaCache::new();
        let cached = cache
            .get_or_load(|| async { Ok::<_, SqlPilotError>(empty_schema()) }, |_| async { false })
            .await
            .unwrap();
        assert!(!cached.index_available);

        let cached = cache
            .get_or_load(|| async { Ok::<_, SqlPilotError>(empty_schema()) }, |_| async { true })
            .await
            .unwrap();
        assert!(!cached.indexed);
        assert!(!cached.index_available);

        cache.mark_indexed(true).await;
        let cached = cache
            .get_or_load(|| async { Ok::<_, SqlPilotError>(empty_schema()) }, |_| async { false })
            .await
            .unwrap();
        assert!(cached.index_available);
    }

    #[tokio::test]
    async fn test_scan_failure_caches_nothing() {
        let cache = SchemaCache::new();
        let result = cache
            .get_or_load(
                || async { Err::<DatabaseSchema, _>(SqlPilotError::insufficient_privileges("catalog access")) },
                |_| async { true },
            )
            .await;
        assert!(result.is_err());
        assert!(cache.snapshot().await.is_none());
    }
}
