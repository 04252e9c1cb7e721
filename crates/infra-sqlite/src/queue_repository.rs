// SQLite QueueRepository Implementation

use async_trait::async_trait;
use siphon_core::domain::{queue::validate_concurrency_limit, QueueRecord};
use siphon_core::error::{AppError, Result};
use siphon_core::port::QueueRepository;
use sqlx::SqlitePool;

use crate::error::map_sqlx_error;

pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn insert(&self, queue: &QueueRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queues (id, name, queue_ref, concurrency_limit, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&queue.id)
        .bind(&queue.name)
        .bind(&queue.queue_ref)
        .bind(queue.concurrency_limit)
        .bind(queue.created_at)
        .bind(queue.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<QueueRecord>> {
        let row: Option<QueueRow> = sqlx::query_as("SELECT * FROM queues WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn find_by_queue_ref(&self, queue_ref: &str) -> Result<Option<QueueRecord>> {
        let row: Option<QueueRow> = sqlx::query_as("SELECT * FROM queues WHERE queue_ref = ?")
            .bind(queue_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn find_all(&self) -> Result<Vec<QueueRecord>> {
        let rows: Vec<QueueRow> = sqlx::query_as("SELECT * FROM queues ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn set_concurrency(&self, name: &str, limit: i32, now_millis: i64) -> Result<()> {
        validate_concurrency_limit(limit)?;

        let result =
            sqlx::query("UPDATE queues SET concurrency_limit = ?, updated_at = ? WHERE name = ?")
                .bind(limit)
                .bind(now_millis)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Queue {} not found", name)));
        }
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queues WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    name: String,
    queue_ref: String,
    concurrency_limit: i32,
    created_at: i64,
    updated_at: i64,
}

impl QueueRow {
    fn into_record(self) -> QueueRecord {
        QueueRecord {
            id: self.id,
            name: self.name,
            queue_ref: self.queue_ref,
            concurrency_limit: self.concurrency_limit,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_repo() -> SqliteQueueRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQueueRepository::new(pool)
    }

    fn record(name: &str, limit: i32) -> QueueRecord {
        QueueRecord::new(
            format!("q-{}", name),
            name,
            format!("memory://{}", name),
            limit,
            1000,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let repo = setup_repo().await;
        repo.insert(&record("orders", 3)).await.unwrap();

        let by_name = repo.find_by_name("orders").await.unwrap().unwrap();
        assert_eq!(by_name.concurrency_limit, 3);

        let by_ref = repo
            .find_by_queue_ref("memory://orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.name, "orders");

        assert!(repo.find_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let repo = setup_repo().await;
        repo.insert(&record("orders", 3)).await.unwrap();

        let mut dup = record("orders", 2);
        dup.id = "q-other".to_string();
        dup.queue_ref = "memory://other".to_string();
        let result = repo.insert(&dup).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_set_concurrency_validates_range() {
        let repo = setup_repo().await;
        repo.insert(&record("orders", 5)).await.unwrap();

        repo.set_concurrency("orders", 2, 2000).await.unwrap();
        let updated = repo.find_by_name("orders").await.unwrap().unwrap();
        assert_eq!(updated.concurrency_limit, 2);
        assert_eq!(updated.updated_at, 2000);

        assert!(repo.set_concurrency("orders", 0, 3000).await.is_err());
        assert!(repo.set_concurrency("orders", 6, 3000).await.is_err());
        assert!(matches!(
            repo.set_concurrency("missing", 3, 3000).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_name() {
        let repo = setup_repo().await;
        repo.insert(&record("orders", 5)).await.unwrap();

        assert!(repo.delete_by_name("orders").await.unwrap());
        assert!(!repo.delete_by_name("orders").await.unwrap());
    }
}
