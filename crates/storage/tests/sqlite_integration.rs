use exam_core::cooldown::CooldownRecord;
use exam_core::model::{AssessmentKind, TestResult};
use exam_core::time::fixed_now;
use storage::repository::{JsonStoreExt, KeyValueStore, Storage};
use storage::sqlite::SqliteStore;

#[tokio::test]
async fn sqlite_set_get_remove() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_basic?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");

    assert_eq!(store.get("missing").await.unwrap(), None);

    store.set("greeting", "hello").await.unwrap();
    store.set("greeting", "namaste").await.unwrap();
    assert_eq!(
        store.get("greeting").await.unwrap().as_deref(),
        Some("namaste")
    );

    store.remove("greeting").await.unwrap();
    store.remove("greeting").await.unwrap();
    assert_eq!(store.get("greeting").await.unwrap(), None);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("first migrate");
    store.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn sqlite_storage_round_trips_domain_json() {
    let storage = Storage::sqlite("sqlite:file:memdb_kv_json?mode=memory&cache=shared")
        .await
        .expect("storage");

    let results = vec![
        TestResult::new(
            AssessmentKind::DailyQuiz,
            vec!["Operating Systems".into()],
            42.4,
            100,
            fixed_now(),
        )
        .unwrap(),
    ];
    storage.kv.set_json("history", &results).await.unwrap();
    storage
        .kv
        .set_json("cooldown", &CooldownRecord::new(fixed_now()))
        .await
        .unwrap();

    let back: Vec<TestResult> = storage.kv.get_json("history").await.unwrap().unwrap();
    assert_eq!(back, results);
    let record: CooldownRecord = storage.kv.get_json("cooldown").await.unwrap().unwrap();
    assert_eq!(record.last_taken_at, fixed_now());
}
