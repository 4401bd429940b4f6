//! Integration tests for the write and read path

use nsdb::bit::{Bit, NsdbValue};
use nsdb::config::NsdbConfig;
use nsdb::engine::{Nsdb, StatementResult};
use nsdb::ingester::NamespaceDataActor;
use std::time::Duration;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(dir: &TempDir) -> NsdbConfig {
    NsdbConfig {
        base_path: dir.path().to_path_buf(),
        write_scheduler_interval: Duration::from_millis(50),
        ..NsdbConfig::default()
    }
}

#[tokio::test]
async fn scheduled_flush_makes_counts_visible() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let data = NamespaceDataActor::spawn(
        "node-1",
        dir.path(),
        Duration::from_millis(50),
        Duration::from_secs(1),
    );

    data.add_record(
        "db",
        "ns",
        "x",
        Bit::new(1, 0.5).with_dimension("content", "c"),
    )
    .await
    .unwrap();

    // Wait out the write scheduler instead of forcing a flush.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(data.get_count("db", "ns", "x").await.unwrap(), 1);
}

#[tokio::test]
async fn count_tracks_adds_and_deletes() {
    let dir = TempDir::new().unwrap();
    let data = NamespaceDataActor::spawn(
        "node-1",
        dir.path(),
        Duration::from_secs(3600),
        Duration::from_secs(1),
    );

    let bit = Bit::new(1, 0.5).with_dimension("content", "c");
    data.add_record("db", "ns", "x", bit.clone()).await.unwrap();
    data.flush("db", "ns", "x").await.unwrap();
    assert_eq!(data.get_count("db", "ns", "x").await.unwrap(), 1);

    assert!(data.delete_record("db", "ns", "x", bit).await.unwrap());
    assert_eq!(data.get_count("db", "ns", "x").await.unwrap(), 0);
}

#[tokio::test]
async fn delete_namespace_leaves_no_children_and_zero_counts() {
    let dir = TempDir::new().unwrap();
    let data = NamespaceDataActor::spawn(
        "node-1",
        dir.path(),
        Duration::from_secs(3600),
        Duration::from_secs(1),
    );

    for metric in ["a", "b"] {
        data.add_record("db", "ns", metric, Bit::new(1, 1i64))
            .await
            .unwrap();
        data.flush("db", "ns", metric).await.unwrap();
    }

    data.delete_namespace("db", "ns").await.unwrap();

    assert!(data.get_namespaces("db").await.unwrap().is_empty());
    assert_eq!(data.get_count("db", "ns", "a").await.unwrap(), 0);
    assert_eq!(data.get_count("db", "ns", "b").await.unwrap(), 0);
}

#[tokio::test]
async fn insert_select_delete_drop_via_sql() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Nsdb::start(config(&dir)).await.unwrap();

    for sql in [
        "INSERT INTO people TS = 10 DIM (city = 'rome') VAL = 0.5",
        "INSERT INTO people TS = 20 DIM (city = 'paris') VAL = 1.5",
        "INSERT INTO people TS = 30 DIM (city = 'rome') VAL = 2.5",
    ] {
        let result = engine.execute_sql("db", "registry", sql).await.unwrap();
        assert!(matches!(result, StatementResult::InputMapped(_)));
    }
    engine.flush_metric("db", "registry", "people").await.unwrap();

    let result = engine
        .execute_sql(
            "db",
            "registry",
            "SELECT * FROM people WHERE city = 'rome' ORDER BY timestamp DESC",
        )
        .await
        .unwrap();
    let StatementResult::Rows(rows) = result else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp, 30);
    assert_eq!(rows[1].timestamp, 10);

    let result = engine
        .execute_sql(
            "db",
            "registry",
            "DELETE FROM people WHERE timestamp IN (0, 15)",
        )
        .await
        .unwrap();
    let StatementResult::Deleted(deleted) = result else {
        panic!("expected a delete count");
    };
    assert_eq!(deleted, 1);

    let result = engine
        .execute_sql("db", "registry", "DROP people")
        .await
        .unwrap();
    assert!(matches!(result, StatementResult::MetricDropped { .. }));

    // The schema is gone with the metric.
    let err = engine
        .execute_sql("db", "registry", "SELECT * FROM people")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No schema found for metric people");
}

#[tokio::test]
async fn grouped_aggregation_via_sql() {
    let dir = TempDir::new().unwrap();
    let engine = Nsdb::start(config(&dir)).await.unwrap();

    for (ts, city, value) in [(10, "rome", 1.0), (20, "rome", 2.0), (30, "paris", 5.0)] {
        let sql = format!("INSERT INTO speed TS = {ts} DIM (city = '{city}') VAL = {value:.1}");
        engine.execute_sql("db", "ns", &sql).await.unwrap();
    }
    engine.flush_metric("db", "ns", "speed").await.unwrap();

    let result = engine
        .execute_sql("db", "ns", "SELECT SUM(value) FROM speed GROUP BY city")
        .await
        .unwrap();
    let StatementResult::Rows(rows) = result else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 2);
    let rome = rows
        .iter()
        .find(|bit| bit.dimensions["city"] == NsdbValue::from("rome"))
        .unwrap();
    assert_eq!(rome.value, NsdbValue::Double(3.0));
}

#[tokio::test]
async fn writes_allocate_interval_aligned_locations() {
    let dir = TempDir::new().unwrap();
    let engine = Nsdb::start(config(&dir)).await.unwrap();

    engine
        .execute_sql("db", "ns", "INSERT INTO m TS = 1 VAL = 1")
        .await
        .unwrap();
    engine
        .execute_sql("db", "ns", "INSERT INTO m TS = 60001 VAL = 2")
        .await
        .unwrap();

    let locations = engine.metadata().get_locations("db", "ns", "m").await.unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!((locations[0].from, locations[0].to), (0, 60_000));
    assert_eq!((locations[1].from, locations[1].to), (60_000, 120_000));
}

#[tokio::test]
async fn conflicting_insert_is_rejected_via_sql() {
    let dir = TempDir::new().unwrap();
    let engine = Nsdb::start(config(&dir)).await.unwrap();

    engine
        .execute_sql("db", "ns", "INSERT INTO m TS = 1 VAL = 0.5")
        .await
        .unwrap();
    // Long value against a Double-pinned schema.
    let err = engine
        .execute_sql("db", "ns", "INSERT INTO m TS = 2 VAL = 7")
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("value"),
        "rejection names the conflicting field: {err}"
    );
}

#[tokio::test]
async fn parse_errors_never_reach_the_coordinators() {
    let dir = TempDir::new().unwrap();
    let engine = Nsdb::start(config(&dir)).await.unwrap();

    let err = engine
        .execute_sql("db", "ns", "SELEC * FROM m")
        .await
        .unwrap_err();
    assert!(matches!(err, nsdb::Error::Parse { .. }));

    // Nothing was created by the failed parse.
    assert!(engine.read().get_namespaces("db").await.unwrap().is_empty());
}
