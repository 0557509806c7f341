//! The `MemoryStore` seam plus an in-memory implementation used for tests
//! and the no-Postgres dev path.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::similarity::cosine_similarity;
use super::{memory_id, MemoryEntry, MemoryError, MemoryResult};

/// Storage backend for the vector memory service. `add_memory` is
/// idempotent on `(app_name, user_id, content)`: calling it twice with the
/// same triple updates the existing row rather than creating a second one.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn add_memory(
        &self,
        app_name: &str,
        user_id: &str,
        content: &str,
        topics: Vec<String>,
        embedding: Vec<f32>,
        per_user_limit: Option<usize>,
    ) -> MemoryResult<MemoryEntry>;

    async fn update_memory(
        &self,
        memory_id: &str,
        content: &str,
        topics: Vec<String>,
        embedding: Vec<f32>,
    ) -> MemoryResult<()>;

    async fn delete_memory(&self, memory_id: &str) -> MemoryResult<bool>;

    async fn clear_memories(&self, app_name: &str, user_id: &str) -> MemoryResult<u64>;

    /// Ordered by `updated_at desc, created_at desc`.
    async fn read_memories(
        &self,
        app_name: &str,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> MemoryResult<Vec<MemoryEntry>>;

    /// Ordered by similarity-descending.
    async fn search_memories(
        &self,
        app_name: &str,
        user_id: &str,
        query_embedding: &[f32],
        max_results: usize,
    ) -> MemoryResult<Vec<(MemoryEntry, f32)>>;
}

/// Brute-force, cosine-only `MemoryStore` over a `HashMap` guarded by a
/// single lock — there's no separate read/write traffic pattern here worth
/// splitting, unlike the session store's events/summaries split.
pub struct InMemoryMemoryStore {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    soft_delete: bool,
}

impl InMemoryMemoryStore {
    pub fn new(soft_delete: bool) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            soft_delete,
        }
    }

    fn active(entry: &MemoryEntry) -> bool {
        entry.deleted_at.is_none()
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn add_memory(
        &self,
        app_name: &str,
        user_id: &str,
        content: &str,
        topics: Vec<String>,
        embedding: Vec<f32>,
        per_user_limit: Option<usize>,
    ) -> MemoryResult<MemoryEntry> {
        let id = memory_id(app_name, user_id, content);
        let now = chrono::Utc::now();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get_mut(&id) {
            existing.content = content.to_string();
            existing.topics = topics;
            existing.embedding = embedding;
            existing.updated_at = now;
            if self.soft_delete {
                existing.deleted_at = None;
            }
            return Ok(existing.clone());
        }

        if let Some(limit) = per_user_limit {
            let active_count = entries
                .values()
                .filter(|e| e.app_name == app_name && e.user_id == user_id && Self::active(e))
                .count();
            if active_count >= limit {
                return Err(MemoryError::MemoryLimitExceeded);
            }
        }

        let entry = MemoryEntry {
            memory_id: id.clone(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            topics,
            embedding,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        entries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn update_memory(
        &self,
        memory_id: &str,
        content: &str,
        topics: Vec<String>,
        embedding: Vec<f32>,
    ) -> MemoryResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(memory_id)
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;
        entry.content = content.to_string();
        entry.topics = topics;
        entry.embedding = embedding;
        entry.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete_memory(&self, memory_id: &str) -> MemoryResult<bool> {
        let mut entries = self.entries.write().await;
        if self.soft_delete {
            let Some(entry) = entries.get_mut(memory_id) else {
                return Ok(false);
            };
            if entry.deleted_at.is_some() {
                return Ok(false);
            }
            entry.deleted_at = Some(chrono::Utc::now());
            Ok(true)
        } else {
            Ok(entries.remove(memory_id).is_some())
        }
    }

    async fn clear_memories(&self, app_name: &str, user_id: &str) -> MemoryResult<u64> {
        let mut entries = self.entries.write().await;
        if self.soft_delete {
            let now = chrono::Utc::now();
            let mut cleared = 0u64;
            for entry in entries.values_mut() {
                if entry.app_name == app_name && entry.user_id == user_id && Self::active(entry) {
                    entry.deleted_at = Some(now);
                    cleared += 1;
                }
            }
            Ok(cleared)
        } else {
            let before = entries.len();
            entries.retain(|_, e| !(e.app_name == app_name && e.user_id == user_id));
            Ok((before - entries.len()) as u64)
        }
    }

    async fn read_memories(
        &self,
        app_name: &str,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> MemoryResult<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        let mut matched: Vec<MemoryEntry> = entries
            .values()
            .filter(|e| e.app_name == app_name && e.user_id == user_id && Self::active(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn search_memories(
        &self,
        app_name: &str,
        user_id: &str,
        query_embedding: &[f32],
        max_results: usize,
    ) -> MemoryResult<Vec<(MemoryEntry, f32)>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(MemoryEntry, f32)> = entries
            .values()
            .filter(|e| e.app_name == app_name && e.user_id == user_id && Self::active(e))
            .map(|e| (e.clone(), cosine_similarity(&e.embedding, query_embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_memory_is_idempotent_by_content() {
        let store = InMemoryMemoryStore::new(true);
        let a = store
            .add_memory("app", "user-1", "likes rust", vec![], vec![1.0, 0.0], None)
            .await
            .unwrap();
        let b = store
            .add_memory("app", "user-1", "likes rust", vec!["lang".into()], vec![0.5, 0.5], None)
            .await
            .unwrap();
        assert_eq!(a.memory_id, b.memory_id);
        assert_eq!(b.topics, vec!["lang".to_string()]);
    }

    #[tokio::test]
    async fn add_memory_respects_per_user_limit() {
        let store = InMemoryMemoryStore::new(true);
        store
            .add_memory("app", "user-1", "one", vec![], vec![1.0], Some(1))
            .await
            .unwrap();
        let result = store
            .add_memory("app", "user-1", "two", vec![], vec![1.0], Some(1))
            .await;
        assert!(matches!(result, Err(MemoryError::MemoryLimitExceeded)));
    }

    #[tokio::test]
    async fn update_memory_changes_content_and_topics() {
        let store = InMemoryMemoryStore::new(true);
        let entry = store
            .add_memory("app", "user-1", "old", vec![], vec![1.0], None)
            .await
            .unwrap();
        store
            .update_memory(&entry.memory_id, "new", vec!["t".into()], vec![0.0])
            .await
            .unwrap();
        let fetched = store.read_memories("app", "user-1", 10, 0).await.unwrap();
        assert_eq!(fetched[0].content, "new");
    }

    #[tokio::test]
    async fn soft_delete_hides_without_removing() {
        let store = InMemoryMemoryStore::new(true);
        let entry = store
            .add_memory("app", "user-1", "gone", vec![], vec![1.0], None)
            .await
            .unwrap();
        assert!(store.delete_memory(&entry.memory_id).await.unwrap());
        assert!(!store.delete_memory(&entry.memory_id).await.unwrap());
        assert!(store.read_memories("app", "user-1", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hard_delete_removes_entirely() {
        let store = InMemoryMemoryStore::new(false);
        let entry = store
            .add_memory("app", "user-1", "gone", vec![], vec![1.0], None)
            .await
            .unwrap();
        assert!(store.delete_memory(&entry.memory_id).await.unwrap());
        assert!(!store.delete_memory(&entry.memory_id).await.unwrap());
    }

    #[tokio::test]
    async fn read_memories_orders_by_updated_at_desc() {
        let store = InMemoryMemoryStore::new(true);
        store.add_memory("app", "user-1", "first", vec![], vec![1.0], None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.add_memory("app", "user-1", "second", vec![], vec![1.0], None).await.unwrap();

        let rows = store.read_memories("app", "user-1", 10, 0).await.unwrap();
        assert_eq!(rows[0].content, "second");
        assert_eq!(rows[1].content, "first");
    }

    #[tokio::test]
    async fn search_memories_ranks_by_similarity() {
        let store = InMemoryMemoryStore::new(true);
        store
            .add_memory("app", "user-1", "close", vec![], vec![1.0, 0.0], None)
            .await
            .unwrap();
        store
            .add_memory("app", "user-1", "far", vec![], vec![0.0, 1.0], None)
            .await
            .unwrap();

        let results = store
            .search_memories("app", "user-1", &[1.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(results[0].0.content, "close");
        assert!(results[0].1 > results[1].1);
    }
}
