use casabricks::{
    config::AppConfig,
    db::{self, ImageStore, PgImageStore},
    models::image::{EnhancementStatus, ImageType, NewImage, Resolution},
    services::reconciler::TimeoutReconciler,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

async fn connect() -> PgImageStore {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    PgImageStore::new(pool)
}

async fn create_property(store: &PgImageStore) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO properties (title, property_type) VALUES ('Integration villa', 'villa') RETURNING id",
    )
    .fetch_one(store.pool())
    .await
    .expect("Failed to create property")
}

fn new_image(property_id: Uuid) -> NewImage {
    NewImage {
        property_id,
        original_url: "https://cdn.test/original/front.jpg".to_string(),
        original_key: "original/front.jpg".to_string(),
        image_type: ImageType::FrontExterior,
        is_primary: true,
    }
}

/// Guarded transitions against a live PostgreSQL.
///
/// Run with: cargo test --test integration_test -- --ignored
#[tokio::test]
#[ignore]
async fn test_postgres_transitions() {
    let store = connect().await;
    let property_id = create_property(&store).await;
    assert!(store.property_exists(property_id).await.unwrap());

    let image = store.insert(new_image(property_id)).await.unwrap();
    assert_eq!(image.status, EnhancementStatus::Pending);

    let processing = store
        .begin_processing(image.id, "it-job-1", Utc::now())
        .await
        .unwrap()
        .expect("pending image should start processing");
    assert_eq!(processing.job_id.as_deref(), Some("it-job-1"));

    // Second request loses the guard.
    assert!(store
        .begin_processing(image.id, "it-job-2", Utc::now())
        .await
        .unwrap()
        .is_none());

    let found = store.find_by_job_id("it-job-1").await.unwrap().unwrap();
    assert_eq!(found.id, image.id);

    let completed = Resolution::Completed {
        url: "https://cdn.test/enhanced/front.jpg".to_string(),
        key: "enhanced/front.jpg".to_string(),
    };
    let (first, second) = futures::join!(
        store.resolve(image.id, "it-job-1", completed.clone(), Utc::now()),
        store.resolve(image.id, "it-job-1", completed, Utc::now()),
    );
    let applied = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(applied, 1, "exactly one resolve may win");

    let stored = store.get(image.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EnhancementStatus::Completed);
    assert!(stored.enhanced_url.is_some());

    assert!(store.delete(image.id).await.unwrap());
    assert!(store.get(image.id).await.unwrap().is_none());

    sqlx::query("DELETE FROM properties WHERE id = $1")
        .bind(property_id)
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_postgres_timeout_sweep() {
    let store = connect().await;
    let property_id = create_property(&store).await;

    let image = store.insert(new_image(property_id)).await.unwrap();
    store
        .begin_processing(image.id, "it-stuck", Utc::now() - Duration::hours(49))
        .await
        .unwrap();

    let store = Arc::new(store);
    let reconciler = TimeoutReconciler::new(store.clone(), Duration::hours(48));
    let report = reconciler.sweep(Utc::now()).await.unwrap();
    assert!(report.timed_out.contains(&image.id));

    let stored = store.get(image.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EnhancementStatus::Timeout);

    // A late callback for the abandoned job no longer applies.
    let late = store
        .resolve(
            image.id,
            "it-stuck",
            Resolution::Failed {
                reason: "late".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(late.is_none());

    sqlx::query("DELETE FROM properties WHERE id = $1")
        .bind(property_id)
        .execute(store.pool())
        .await
        .unwrap();
}
