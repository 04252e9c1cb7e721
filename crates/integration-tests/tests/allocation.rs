//! Allocation invariants against the real SQLite store: claim uniqueness,
//! idempotence, least-loaded fairness and race recovery.

use std::sync::Arc;

use siphon_core::application::{AllocatorConfig, MasterAllocator, QueueDescriptor};
use siphon_core::domain::{Assignment, WorkerRecord};
use siphon_core::error::AppError;
use siphon_core::port::id_provider::UuidProvider;
use siphon_core::port::{AssignmentRepository, WorkerRepository};
use siphon_infra_sqlite::{
    create_pool, run_migrations, SqliteAssignmentRepository, SqliteWorkerRepository,
};

struct Fixture {
    worker_repo: Arc<SqliteWorkerRepository>,
    assignment_repo: Arc<SqliteAssignmentRepository>,
    allocator: Arc<MasterAllocator>,
}

async fn fixture(max_worker_load: i64) -> Fixture {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let worker_repo = Arc::new(SqliteWorkerRepository::new(pool.clone()));
    let assignment_repo = Arc::new(SqliteAssignmentRepository::new(pool));
    let allocator = Arc::new(MasterAllocator::new(
        worker_repo.clone(),
        assignment_repo.clone(),
        Arc::new(UuidProvider),
        AllocatorConfig { max_worker_load },
    ));

    Fixture {
        worker_repo,
        assignment_repo,
        allocator,
    }
}

fn descriptor(name: &str) -> QueueDescriptor {
    QueueDescriptor {
        name: name.to_string(),
        queue_ref: format!("memory://{}", name),
        queue_id: None,
    }
}

#[tokio::test]
async fn two_calls_create_exactly_one_assignment() {
    let fx = fixture(5).await;
    fx.worker_repo
        .insert(&WorkerRecord::new("w-1", 1000))
        .await
        .unwrap();

    let first = fx.allocator.assign_queue(descriptor("orders")).await.unwrap();
    let second = fx.allocator.assign_queue(descriptor("orders")).await.unwrap();

    assert!(!first.already_assigned);
    assert!(second.already_assigned);
    assert_eq!(first.worker_id, second.worker_id);

    // One live claim for the queue_ref in the store
    let claim = fx
        .assignment_repo
        .find_by_queue_ref("memory://orders")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claim.worker_id, first.worker_id);
    let counts = fx.assignment_repo.count_by_worker().await.unwrap();
    assert_eq!(counts, vec![(first.worker_id.clone(), 1)]);
}

#[tokio::test]
async fn least_loaded_worker_wins() {
    let fx = fixture(5).await;
    for (i, id) in ["w-a", "w-b", "w-c"].iter().enumerate() {
        fx.worker_repo
            .insert(&WorkerRecord::new(*id, 1000 + i as i64))
            .await
            .unwrap();
    }

    // Loads [0, 2, 4]
    for i in 0..2 {
        fx.assignment_repo
            .insert(&Assignment::new(
                format!("pre-b{}", i),
                format!("memory://pre-b{}", i),
                "w-b",
                None,
            ))
            .await
            .unwrap();
    }
    for i in 0..4 {
        fx.assignment_repo
            .insert(&Assignment::new(
                format!("pre-c{}", i),
                format!("memory://pre-c{}", i),
                "w-c",
                None,
            ))
            .await
            .unwrap();
    }

    let outcome = fx.allocator.assign_queue(descriptor("orders")).await.unwrap();
    assert_eq!(outcome.worker_id, "w-a");
}

#[tokio::test]
async fn saturated_cluster_rejects_new_queues() {
    let fx = fixture(5).await;
    for id in ["w-a", "w-b", "w-c"] {
        fx.worker_repo
            .insert(&WorkerRecord::new(id, 1000))
            .await
            .unwrap();
        for i in 0..5 {
            fx.assignment_repo
                .insert(&Assignment::new(
                    format!("{}-{}", id, i),
                    format!("memory://{}-{}", id, i),
                    id,
                    None,
                ))
                .await
                .unwrap();
        }
    }

    let result = fx.allocator.assign_queue(descriptor("orders")).await;
    assert!(matches!(result, Err(AppError::NoEligibleWorker)));
}

#[tokio::test]
async fn no_workers_is_a_typed_failure() {
    let fx = fixture(5).await;
    let result = fx.allocator.assign_queue(descriptor("orders")).await;
    assert!(matches!(result, Err(AppError::NoWorkersAvailable)));
}

#[tokio::test]
async fn concurrent_claims_resolve_to_one_worker() {
    let fx = fixture(5).await;
    fx.worker_repo
        .insert(&WorkerRecord::new("w-1", 1000))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let allocator = fx.allocator.clone();
        handles.push(tokio::spawn(async move {
            allocator.assign_queue(descriptor("orders")).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    // Every caller observes the same worker, exactly one writer won
    let winner = &outcomes[0].worker_id;
    assert!(outcomes.iter().all(|o| &o.worker_id == winner));
    assert_eq!(outcomes.iter().filter(|o| !o.already_assigned).count(), 1);

    let counts = fx.assignment_repo.count_by_worker().await.unwrap();
    assert_eq!(counts, vec![("w-1".to_string(), 1)]);
}

#[tokio::test]
async fn completed_queue_is_reclaimable() {
    let fx = fixture(5).await;
    fx.worker_repo
        .insert(&WorkerRecord::new("w-1", 1000))
        .await
        .unwrap();

    let first = fx.allocator.assign_queue(descriptor("orders")).await.unwrap();
    let claim = fx
        .assignment_repo
        .find_by_queue_ref(&first.queue_ref)
        .await
        .unwrap()
        .unwrap();

    // The owning manager deletes the claim once drained
    assert!(fx.assignment_repo.delete(&claim.id).await.unwrap());

    let second = fx.allocator.assign_queue(descriptor("orders")).await.unwrap();
    assert!(!second.already_assigned, "drained queue can be claimed again");
}
