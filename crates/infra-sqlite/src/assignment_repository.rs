// SQLite AssignmentRepository Implementation

use async_trait::async_trait;
use siphon_core::domain::{Assignment, AssignmentId, WorkerId};
use siphon_core::error::Result;
use siphon_core::port::AssignmentRepository;
use sqlx::SqlitePool;

use crate::error::map_sqlx_error;

pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn insert(&self, assignment: &Assignment) -> Result<()> {
        // The UNIQUE index on queue_ref turns a lost claim race into
        // AppError::Conflict via map_sqlx_error
        sqlx::query(
            "INSERT INTO assignments (id, queue_ref, worker_id, queue_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&assignment.id)
        .bind(&assignment.queue_ref)
        .bind(&assignment.worker_id)
        .bind(&assignment.queue_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_by_queue_ref(&self, queue_ref: &str) -> Result<Option<Assignment>> {
        let row: Option<AssignmentRow> =
            sqlx::query_as("SELECT * FROM assignments WHERE queue_ref = ?")
                .bind(queue_ref)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_assignment()))
    }

    async fn find_by_worker(&self, worker_id: &str) -> Result<Vec<Assignment>> {
        let rows: Vec<AssignmentRow> =
            sqlx::query_as("SELECT * FROM assignments WHERE worker_id = ? ORDER BY id ASC")
                .bind(worker_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_assignment()).collect())
    }

    async fn count_by_worker(&self) -> Result<Vec<(WorkerId, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT worker_id, COUNT(*) as count FROM assignments GROUP BY worker_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows)
    }

    async fn delete(&self, id: &AssignmentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    queue_ref: String,
    worker_id: String,
    queue_id: Option<String>,
}

impl AssignmentRow {
    fn into_assignment(self) -> Assignment {
        Assignment {
            id: self.id,
            queue_ref: self.queue_ref,
            worker_id: self.worker_id,
            queue_id: self.queue_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use siphon_core::error::AppError;

    async fn setup_repo() -> SqliteAssignmentRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteAssignmentRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_repo().await;
        let assignment = Assignment::new("as-1", "memory://orders", "w-1", Some("q-1".into()));
        repo.insert(&assignment).await.unwrap();

        let found = repo
            .find_by_queue_ref("memory://orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, assignment);
        assert!(repo
            .find_by_queue_ref("memory://missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_second_claim_for_same_queue_conflicts() {
        let repo = setup_repo().await;
        repo.insert(&Assignment::new("as-1", "memory://orders", "w-1", None))
            .await
            .unwrap();

        let result = repo
            .insert(&Assignment::new("as-2", "memory://orders", "w-2", None))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // The winner's record survives untouched
        let winner = repo
            .find_by_queue_ref("memory://orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(winner.worker_id, "w-1");
    }

    #[tokio::test]
    async fn test_find_by_worker_and_counts() {
        let repo = setup_repo().await;
        for i in 0..3 {
            repo.insert(&Assignment::new(
                format!("as-a{}", i),
                format!("memory://a{}", i),
                "w-1",
                None,
            ))
            .await
            .unwrap();
        }
        repo.insert(&Assignment::new("as-b0", "memory://b0", "w-2", None))
            .await
            .unwrap();

        assert_eq!(repo.find_by_worker("w-1").await.unwrap().len(), 3);
        assert_eq!(repo.find_by_worker("w-3").await.unwrap().len(), 0);

        let mut counts = repo.count_by_worker().await.unwrap();
        counts.sort();
        assert_eq!(
            counts,
            vec![("w-1".to_string(), 3), ("w-2".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_delete_frees_the_queue_for_reclaim() {
        let repo = setup_repo().await;
        repo.insert(&Assignment::new("as-1", "memory://orders", "w-1", None))
            .await
            .unwrap();

        assert!(repo.delete(&"as-1".to_string()).await.unwrap());
        assert!(!repo.delete(&"as-1".to_string()).await.unwrap());

        // Same queue_ref is claimable again
        repo.insert(&Assignment::new("as-2", "memory://orders", "w-2", None))
            .await
            .unwrap();
    }
}
