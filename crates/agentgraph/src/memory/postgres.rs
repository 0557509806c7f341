//! pgvector-backed `MemoryStore` — the production backend spec.md §4.8
//! describes. Embeddings are passed to Postgres as `"[f1,f2,...]"` text
//! cast to `::vector` (this stack has no `pgvector`-rust dependency; the
//! teacher's own `PostgresStore` casts JSON through `serde_json::Value`
//! the same way for its own `jsonb` columns, so this follows the same
//! cast-at-the-query-boundary idiom).

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::{memory_id, MemoryEntry, MemoryError, MemoryResult};
use crate::memory::store::MemoryStore;
use crate::persistence::PersistenceError;

/// HNSW index parameters and the dimension new rows are validated against.
#[derive(Debug, Clone)]
pub struct MemorySchemaConfig {
    pub dimension: usize,
    pub m: u32,
    pub ef_construction: u32,
}

impl Default for MemorySchemaConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            m: 16,
            ef_construction: 64,
        }
    }
}

pub struct PostgresMemoryStore {
    pool: PgPool,
    soft_delete: bool,
}

fn vector_literal(embedding: &[f32]) -> String {
    let mut s = String::with_capacity(embedding.len() * 8 + 2);
    s.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&v.to_string());
    }
    s.push(']');
    s
}

fn parse_vector_literal(text: &str) -> Vec<f32> {
    text.trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f32>().unwrap_or(0.0))
        .collect()
}

impl PostgresMemoryStore {
    pub async fn connect(database_url: &str, soft_delete: bool) -> MemoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;
        Ok(Self { pool, soft_delete })
    }

    pub fn from_pool(pool: PgPool, soft_delete: bool) -> Self {
        Self { pool, soft_delete }
    }

    /// Creates the `vector` extension, the `memories` table, and its
    /// indexes, unless the current role lacks schema-level `CREATE`
    /// privilege — in which case the store still works against an
    /// already-provisioned schema, it just can't provision one itself.
    pub async fn init_schema(&self, config: &MemorySchemaConfig) -> MemoryResult<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let can_create: bool = sqlx::query_scalar(
            "SELECT has_schema_privilege(current_user, current_schema(), 'CREATE')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        if !can_create {
            tracing::warn!("missing CREATE privilege, operating in read/use-existing mode");
            return Ok(());
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS memories (
                memory_id TEXT PRIMARY KEY,
                app_name TEXT NOT NULL,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                topics TEXT[] NOT NULL DEFAULT '{{}}',
                embedding vector({dim}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                deleted_at TIMESTAMPTZ
            )",
            dim = config.dimension
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS memories_app_user_idx ON memories (app_name, user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS memories_updated_at_idx ON memories (updated_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS memories_deleted_at_idx ON memories (deleted_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS memories_embedding_hnsw_idx ON memories
             USING hnsw (embedding vector_cosine_ops)
             WITH (m = {m}, ef_construction = {ef})",
            m = config.m,
            ef = config.ef_construction
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(())
    }

    fn parse_row(row: &PgRow) -> MemoryResult<MemoryEntry> {
        let embedding_text: String = row
            .try_get("embedding_text")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(MemoryEntry {
            memory_id: row
                .try_get("memory_id")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            app_name: row
                .try_get("app_name")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            content: row
                .try_get("content")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            topics: row
                .try_get::<Vec<String>, _>("topics")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            embedding: parse_vector_literal(&embedding_text),
            created_at: row
                .try_get("created_at")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            deleted_at: row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("deleted_at")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "memory_id, app_name, user_id, content, topics, embedding::text AS embedding_text, created_at, updated_at, deleted_at";

#[async_trait]
impl MemoryStore for PostgresMemoryStore {
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
        let vector = vector_literal(&embedding);

        let row = if let Some(limit) = per_user_limit {
            let deleted_clause = if self.soft_delete { "AND deleted_at IS NULL" } else { "" };
            sqlx::query(&format!(
                "INSERT INTO memories (memory_id, app_name, user_id, content, topics, embedding, created_at, updated_at, deleted_at)
                 SELECT $1, $2, $3, $4, $5, $6::vector, now(), now(), NULL
                 WHERE EXISTS (SELECT 1 FROM memories WHERE memory_id = $1)
                    OR (SELECT count(*) FROM memories WHERE app_name = $2 AND user_id = $3 {deleted_clause}) < $7
                 ON CONFLICT (memory_id) DO UPDATE SET
                    content = EXCLUDED.content, topics = EXCLUDED.topics,
                    embedding = EXCLUDED.embedding, updated_at = now(), deleted_at = NULL
                 RETURNING {cols}",
                deleted_clause = deleted_clause,
                cols = SELECT_COLUMNS
            ))
            .bind(&id)
            .bind(app_name)
            .bind(user_id)
            .bind(content)
            .bind(&topics)
            .bind(&vector)
            .bind(limit as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?
        } else {
            sqlx::query(&format!(
                "INSERT INTO memories (memory_id, app_name, user_id, content, topics, embedding, created_at, updated_at, deleted_at)
                 VALUES ($1, $2, $3, $4, $5, $6::vector, now(), now(), NULL)
                 ON CONFLICT (memory_id) DO UPDATE SET
                    content = EXCLUDED.content, topics = EXCLUDED.topics,
                    embedding = EXCLUDED.embedding, updated_at = now(), deleted_at = NULL
                 RETURNING {cols}",
                cols = SELECT_COLUMNS
            ))
            .bind(&id)
            .bind(app_name)
            .bind(user_id)
            .bind(content)
            .bind(&topics)
            .bind(&vector)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?
        };

        match row {
            Some(row) => Self::parse_row(&row),
            None => Err(MemoryError::MemoryLimitExceeded),
        }
    }

    async fn update_memory(
        &self,
        memory_id: &str,
        content: &str,
        topics: Vec<String>,
        embedding: Vec<f32>,
    ) -> MemoryResult<()> {
        let vector = vector_literal(&embedding);
        let result = sqlx::query(
            "UPDATE memories SET content = $2, topics = $3, embedding = $4::vector, updated_at = now()
             WHERE memory_id = $1",
        )
        .bind(memory_id)
        .bind(content)
        .bind(&topics)
        .bind(&vector)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(memory_id.to_string()));
        }
        Ok(())
    }

    async fn delete_memory(&self, memory_id: &str) -> MemoryResult<bool> {
        let result = if self.soft_delete {
            sqlx::query("UPDATE memories SET deleted_at = now() WHERE memory_id = $1 AND deleted_at IS NULL")
                .bind(memory_id)
                .execute(&self.pool)
                .await
        } else {
            sqlx::query("DELETE FROM memories WHERE memory_id = $1")
                .bind(memory_id)
                .execute(&self.pool)
                .await
        }
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_memories(&self, app_name: &str, user_id: &str) -> MemoryResult<u64> {
        let result = if self.soft_delete {
            sqlx::query(
                "UPDATE memories SET deleted_at = now()
                 WHERE app_name = $1 AND user_id = $2 AND deleted_at IS NULL",
            )
            .bind(app_name)
            .bind(user_id)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query("DELETE FROM memories WHERE app_name = $1 AND user_id = $2")
                .bind(app_name)
                .bind(user_id)
                .execute(&self.pool)
                .await
        }
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn read_memories(
        &self,
        app_name: &str,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> MemoryResult<Vec<MemoryEntry>> {
        let deleted_clause = if self.soft_delete { "AND deleted_at IS NULL" } else { "" };
        let rows = sqlx::query(&format!(
            "SELECT {cols} FROM memories
             WHERE app_name = $1 AND user_id = $2 {deleted_clause}
             ORDER BY updated_at DESC, created_at DESC
             LIMIT $3 OFFSET $4",
            cols = SELECT_COLUMNS,
            deleted_clause = deleted_clause
        ))
        .bind(app_name)
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn search_memories(
        &self,
        app_name: &str,
        user_id: &str,
        query_embedding: &[f32],
        max_results: usize,
    ) -> MemoryResult<Vec<(MemoryEntry, f32)>> {
        let deleted_clause = if self.soft_delete { "AND deleted_at IS NULL" } else { "" };
        let vector = vector_literal(query_embedding);
        let rows = sqlx::query(&format!(
            "SELECT {cols}, 1 - (embedding <=> $3::vector) AS similarity FROM memories
             WHERE app_name = $1 AND user_id = $2 {deleted_clause}
             ORDER BY embedding <=> $3::vector
             LIMIT $4",
            cols = SELECT_COLUMNS,
            deleted_clause = deleted_clause
        ))
        .bind(app_name)
        .bind(user_id)
        .bind(&vector)
        .bind(max_results as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let entry = Self::parse_row(row)?;
                let similarity: f32 = row
                    .try_get("similarity")
                    .map_err(|e| PersistenceError::Query(e.to_string()))?;
                Ok((entry, similarity))
            })
            .collect()
    }
}
