//! Configuration lifecycle across restarts: persistence, fallback, rollback.

use serde_json::json;
use tempfile::TempDir;

use field_cleaner::bootstrap;
use field_cleaner::config::{ConfigEventKind, ConfigSource, FieldRule};

mod common;

#[tokio::test]
async fn test_accepted_configuration_survives_restart() {
    let dir = TempDir::new().unwrap();
    common::write_custom(dir.path(), &common::customer_rules("1.0.0"));

    let services = bootstrap(common::options(dir.path(), true)).await.unwrap();
    services.manager.update(common::customer_rules("1.1.0")).await.unwrap();
    services.shutdown().await;
    assert!(dir.path().join("rules.active.json").exists());

    // The snapshot wins over the conventional file on the next start.
    let restarted = bootstrap(common::options(dir.path(), true)).await.unwrap();
    let current = restarted.manager.current_version().unwrap();
    assert_eq!(current.version, "1.1.0");
    assert!(matches!(current.source, ConfigSource::Persisted(_)));
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_invalid_custom_file_falls_back_to_generated_default() {
    let dir = TempDir::new().unwrap();
    let mut broken = common::customer_rules("9.9.9");
    broken.global_settings.max_errors = 0;
    common::write_custom(dir.path(), &broken);

    let services = bootstrap(common::options(dir.path(), false)).await.unwrap();
    let current = services.manager.current_version().unwrap();

    assert!(current.version.starts_with("1.0.0-default-"));
    assert_eq!(services.manager.stats().validation_failures, 1);
    services.shutdown().await;
}

#[tokio::test]
async fn test_malformed_custom_file_falls_through_to_default_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("rules.custom.json"), "{ not json").unwrap();
    std::fs::write(
        dir.path().join("rules.default.json"),
        serde_json::to_string(&common::customer_rules("0.5.0")).unwrap(),
    )
    .unwrap();

    let services = bootstrap(common::options(dir.path(), false)).await.unwrap();
    let current = services.manager.current_version().unwrap();

    assert_eq!(current.version, "0.5.0");
    assert!(matches!(current.source, ConfigSource::Default(_)));
    services.shutdown().await;
}

#[tokio::test]
async fn test_rollback_restores_previous_rules() {
    let dir = TempDir::new().unwrap();
    common::write_custom(dir.path(), &common::customer_rules("1.0.0"));
    let services = bootstrap(common::options(dir.path(), false)).await.unwrap();
    let mut events = services.manager.subscribe();

    let mut stricter = common::customer_rules("1.1.0");
    stricter.field_rules.insert(
        "age".into(),
        vec![FieldRule::new("adult", "range", json!({"min": 18, "max": 120})).required()],
    );
    services.manager.update(stricter).await.unwrap();

    let result = services.manager.rollback(None).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.from_version.as_deref(), Some("1.1.0"));
    assert_eq!(result.to_version.as_deref(), Some("1.0.0"));

    let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ConfigEventKind::Updated, ConfigEventKind::RolledBack]);

    let row = services
        .engine
        .clean_row(common::row(json!({"age": 10})), &Default::default())
        .await;
    assert!(row.success);
    services.shutdown().await;
}

#[tokio::test]
async fn test_history_deduplicates_identical_content() {
    let dir = TempDir::new().unwrap();
    common::write_custom(dir.path(), &common::customer_rules("1.0.0"));
    let services = bootstrap(common::options(dir.path(), false)).await.unwrap();

    services.manager.update(common::customer_rules("1.0.0")).await.unwrap();
    services.manager.update(common::customer_rules("1.2.0")).await.unwrap();

    let versions: Vec<_> = services.manager.history().into_iter().map(|v| v.version).collect();
    assert_eq!(versions, vec!["1.0.0", "1.2.0"]);
    services.shutdown().await;
}
