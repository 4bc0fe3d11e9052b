//! Record of successfully answered structured questions.
//!
//! Every structured resolution that executes cleanly is upserted here,
//! keyed by question text; repeats bump a usage counter. The reads are
//! plain pass-throughs surfaced by the CLI and HTTP layers for popularity
//! and recency reporting.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row as _;

use crate::models::Intent;
use crate::store::DataAccessError;

#[derive(Debug, Clone, Serialize)]
pub struct LearnedQuery {
    pub question: String,
    pub generated_sql: String,
    pub intent: Intent,
    pub result_count: i64,
    pub usage_count: i64,
    /// Unix timestamp (seconds) of the last successful use.
    pub last_used: i64,
}

pub struct LearningStore {
    pool: SqlitePool,
}

impl LearningStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a successful resolution; repeats increment `usage_count` and
    /// refresh `last_used`.
    pub async fn record_success(
        &self,
        question: &str,
        generated_sql: &str,
        intent: Intent,
        result_count: i64,
    ) -> Result<(), DataAccessError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO learned_queries (question, generated_sql, intent, result_count, usage_count, last_used) \
             VALUES (?, ?, ?, ?, 1, ?) \
             ON CONFLICT(question) DO UPDATE SET \
             usage_count = usage_count + 1, \
             generated_sql = excluded.generated_sql, \
             result_count = excluded.result_count, \
             last_used = excluded.last_used",
        )
        .bind(question)
        .bind(generated_sql)
        .bind(intent.to_string())
        .bind(result_count)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DataAccessError(e.to_string()))?;

        Ok(())
    }

    /// Most-used learned queries, descending.
    pub async fn popular(&self, limit: i64) -> Result<Vec<LearnedQuery>, DataAccessError> {
        self.fetch("ORDER BY usage_count DESC, last_used DESC", limit)
            .await
    }

    /// Most recently used learned queries, descending.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LearnedQuery>, DataAccessError> {
        self.fetch("ORDER BY last_used DESC", limit).await
    }

    async fn fetch(&self, order: &str, limit: i64) -> Result<Vec<LearnedQuery>, DataAccessError> {
        let sql = format!(
            "SELECT question, generated_sql, intent, result_count, usage_count, last_used \
             FROM learned_queries {} LIMIT ?",
            order
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataAccessError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| LearnedQuery {
                question: row.get("question"),
                generated_sql: row.get("generated_sql"),
                intent: parse_intent(&row.get::<String, _>("intent")),
                result_count: row.get("result_count"),
                usage_count: row.get("usage_count"),
                last_used: row.get("last_used"),
            })
            .collect())
    }
}

fn parse_intent(text: &str) -> Intent {
    match text {
        "STRUCTURED" => Intent::Structured,
        "KNOWLEDGE" => Intent::Knowledge,
        _ => Intent::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use crate::store::SqliteStore;

    async fn setup() -> (SqliteStore, LearningStore) {
        let store = SqliteStore::in_memory().await.unwrap();
        seed::run_migrations(store.pool()).await.unwrap();
        let learning = LearningStore::new(store.pool().clone());
        (store, learning)
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let (_store, learning) = setup().await;
        learning
            .record_success("cuántas aplicaciones hay", "SELECT COUNT(*) FROM aplicacion", Intent::Structured, 1)
            .await
            .unwrap();

        let popular = learning.popular(5).await.unwrap();
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].question, "cuántas aplicaciones hay");
        assert_eq!(popular[0].usage_count, 1);
        assert_eq!(popular[0].intent, Intent::Structured);
    }

    #[tokio::test]
    async fn test_repeat_increments_usage() {
        let (_store, learning) = setup().await;
        for _ in 0..3 {
            learning
                .record_success("q", "SELECT 1", Intent::Structured, 1)
                .await
                .unwrap();
        }

        let popular = learning.popular(5).await.unwrap();
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].usage_count, 3);
    }

    #[tokio::test]
    async fn test_popular_orders_by_usage() {
        let (_store, learning) = setup().await;
        learning
            .record_success("rare", "SELECT 1", Intent::Structured, 1)
            .await
            .unwrap();
        for _ in 0..2 {
            learning
                .record_success("common", "SELECT 2", Intent::Structured, 1)
                .await
                .unwrap();
        }

        let popular = learning.popular(5).await.unwrap();
        assert_eq!(popular[0].question, "common");
        assert_eq!(popular[1].question, "rare");
    }
}
