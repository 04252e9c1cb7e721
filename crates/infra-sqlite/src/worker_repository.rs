// SQLite WorkerRepository Implementation

use async_trait::async_trait;
use siphon_core::domain::WorkerRecord;
use siphon_core::error::Result;
use siphon_core::port::WorkerRepository;
use sqlx::SqlitePool;

use crate::error::map_sqlx_error;

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn insert(&self, worker: &WorkerRecord) -> Result<()> {
        sqlx::query("INSERT INTO workers (id, started_at) VALUES (?, ?)")
            .bind(&worker.id)
            .bind(worker.started_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<WorkerRecord>> {
        let rows: Vec<WorkerRow> =
            sqlx::query_as("SELECT id, started_at FROM workers ORDER BY started_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM workers")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WorkerRow {
    id: String,
    started_at: i64,
}

impl WorkerRow {
    fn into_record(self) -> WorkerRecord {
        WorkerRecord {
            id: self.id,
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use siphon_core::error::AppError;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let repo = SqliteWorkerRepository::new(setup_test_db().await);

        repo.insert(&WorkerRecord::new("w-1", 1000)).await.unwrap();
        repo.insert(&WorkerRecord::new("w-2", 2000)).await.unwrap();

        let workers = repo.find_all().await.unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].id, "w-1");
        assert_eq!(workers[1].id, "w-2");
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let repo = SqliteWorkerRepository::new(setup_test_db().await);

        repo.insert(&WorkerRecord::new("w-1", 1000)).await.unwrap();
        let result = repo.insert(&WorkerRecord::new("w-1", 2000)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_all_clears_registry() {
        let repo = SqliteWorkerRepository::new(setup_test_db().await);

        repo.insert(&WorkerRecord::new("w-1", 1000)).await.unwrap();
        repo.insert(&WorkerRecord::new("w-2", 2000)).await.unwrap();

        let removed = repo.delete_all().await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo.find_all().await.unwrap().is_empty());
    }
}
