use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use detseed::config::{ExistingDataPolicy, LoadMode, SeedConfig};
use detseed::error::SeedError;
use detseed::pipeline::{self, RunSummary};

fn write_csv(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("input.csv");
    fs::write(&path, contents).unwrap();
    path
}

fn config(source: PathBuf, target: &Path, mode: LoadMode) -> SeedConfig {
    SeedConfig {
        source,
        target: target.to_str().unwrap().to_string(),
        batch_size: 2,
        mode,
        if_exists: ExistingDataPolicy::Append,
    }
}

async fn run(config: &SeedConfig) -> detseed::error::Result<RunSummary> {
    pipeline::run(config, Arc::new(AtomicBool::new(false))).await
}

#[tokio::test]
async fn mixed_quality_rows_load_only_the_valid_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(
        dir.path(),
        "id,type,timestamp,x,y\n\
         a1,ped,1700000000,1.0,2.0\n\
         a2,veh,1700000001000,bad,3.0\n\
         a3,ped,not-a-date,4.0,5.0\n",
    );
    let target = dir.path().join("detections.sqlite");

    let summary = run(&config(source, &target, LoadMode::Replace)).await?;

    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_loaded, 1);
    assert_eq!(summary.rejections.invalid_coordinates, 1);
    assert_eq!(summary.rejections.invalid_timestamp, 1);
    assert!(summary.succeeded());

    let stats = summary.verification.expect("verification should have run");
    assert_eq!(stats.total_rows, 1);
    assert_eq!(stats.distinct_classes, 1);
    // The timestamp column is mixed (text present), so a1's value parses
    // individually as an epoch in seconds
    assert_eq!(stats.min_t.unwrap().timestamp(), 1_700_000_000);
    Ok(())
}

#[tokio::test]
async fn replace_mode_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(
        dir.path(),
        "id,class,t,x,y,area\n\
         a1,ped,1700000000,1.0,2.0,north\n\
         a2,veh,1700000100,3.0,4.0,south\n\
         a3,ped,1700000200,5.0,6.0,\n",
    );
    let target = dir.path().join("detections.sqlite");
    let cfg = config(source, &target, LoadMode::Replace);

    let first = run(&cfg).await?;
    let second = run(&cfg).await?;

    assert_eq!(first.rows_loaded, 3);
    assert_eq!(second.rows_loaded, 3);
    assert_eq!(first.verification, second.verification);
    Ok(())
}

#[tokio::test]
async fn replace_mode_reloads_regardless_of_existing_data_policy() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(
        dir.path(),
        "id,class,t,x,y\n\
         a1,ped,1700000000,1.0,2.0\n\
         a2,veh,1700000100,3.0,4.0\n",
    );
    let target = dir.path().join("detections.sqlite");
    let mut cfg = config(source, &target, LoadMode::Replace);
    // The policy only governs append mode; replace drops the table even
    // when the target already has rows and the policy says fail
    cfg.if_exists = ExistingDataPolicy::Fail;

    let first = run(&cfg).await?;
    let second = run(&cfg).await?;
    assert_eq!(first.rows_loaded, 2);
    assert_eq!(second.rows_loaded, 2);
    assert_eq!(second.verification.unwrap().total_rows, 2);
    Ok(())
}

#[tokio::test]
async fn append_mode_skips_natural_key_duplicates() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(
        dir.path(),
        "id,class,t,x,y\n\
         a1,ped,1700000000,1.0,2.0\n\
         a2,veh,1700000100,3.0,4.0\n",
    );
    let target = dir.path().join("detections.sqlite");

    let first = run(&config(source.clone(), &target, LoadMode::Replace)).await?;
    assert_eq!(first.rows_loaded, 2);

    // SQLite enforces the (id, t) primary key, so re-seeding the same input
    // in append mode inserts nothing
    let second = run(&config(source, &target, LoadMode::Append)).await?;
    assert_eq!(second.rows_loaded, 0);
    assert_eq!(second.duplicates_skipped, 2);
    assert_eq!(second.verification.unwrap().total_rows, 2);
    Ok(())
}

#[tokio::test]
async fn append_mode_fail_policy_aborts_before_writing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(dir.path(), "id,class,t,x,y\na1,ped,1700000000,1.0,2.0\n");
    let target = dir.path().join("detections.sqlite");

    run(&config(source.clone(), &target, LoadMode::Replace)).await?;

    let mut cfg = config(source, &target, LoadMode::Append);
    cfg.if_exists = ExistingDataPolicy::Fail;
    let err = run(&cfg).await.unwrap_err();
    assert!(matches!(err, SeedError::Store { .. }));
    Ok(())
}

#[tokio::test]
async fn append_mode_truncate_policy_reloads_from_scratch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(
        dir.path(),
        "id,class,t,x,y\n\
         a1,ped,1700000000,1.0,2.0\n\
         a2,veh,1700000100,3.0,4.0\n",
    );
    let target = dir.path().join("detections.sqlite");

    run(&config(source.clone(), &target, LoadMode::Replace)).await?;

    let mut cfg = config(source, &target, LoadMode::Append);
    cfg.if_exists = ExistingDataPolicy::Truncate;
    let summary = run(&cfg).await?;
    assert_eq!(summary.rows_loaded, 2);
    assert_eq!(summary.verification.unwrap().total_rows, 2);
    Ok(())
}

#[tokio::test]
async fn round_trip_returns_known_natural_key_exactly_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(
        dir.path(),
        "id,class,t,x,y\n\
         a1,ped,1700000000,1.5,2.5\n\
         a1,ped,1700000060,1.6,2.6\n",
    );
    let target = dir.path().join("detections.sqlite");
    run(&config(source, &target, LoadMode::Replace)).await?;

    let conn = rusqlite::Connection::open(&target)?;
    let t = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM detections WHERE id = 'a1' AND t = ?1",
        rusqlite::params![t],
        |row| row.get(0),
    )?;
    assert_eq!(count, 1);
    Ok(())
}

#[tokio::test]
async fn numeric_seconds_column_loads_with_second_scale() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // Uniform numeric column, max below 10^10: seconds for every row
    let source = write_csv(
        dir.path(),
        "id,class,time,x,y\n\
         a1,ped,1700000000,1.0,2.0\n\
         a2,veh,1700000300,3.0,4.0\n",
    );
    let target = dir.path().join("detections.sqlite");
    let summary = run(&config(source, &target, LoadMode::Replace)).await?;

    let stats = summary.verification.unwrap();
    assert_eq!(stats.min_t.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(stats.max_t.unwrap().timestamp(), 1_700_000_300);
    Ok(())
}

#[tokio::test]
async fn numeric_millis_column_loads_with_milli_scale() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // One value above 10^10 flips the whole column to milliseconds
    let source = write_csv(
        dir.path(),
        "id,class,t,x,y\n\
         a1,ped,1700000000000,1.0,2.0\n\
         a2,veh,1700000300000,3.0,4.0\n",
    );
    let target = dir.path().join("detections.sqlite");
    let summary = run(&config(source, &target, LoadMode::Replace)).await?;

    let stats = summary.verification.unwrap();
    assert_eq!(stats.min_t.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(stats.max_t.unwrap().timestamp(), 1_700_000_300);
    Ok(())
}

#[tokio::test]
async fn missing_required_column_fails_before_any_write() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_csv(dir.path(), "id,class,t,x\na1,ped,1700000000,1.0\n");
    let target = dir.path().join("detections.sqlite");

    let err = run(&config(source, &target, LoadMode::Replace))
        .await
        .unwrap_err();
    assert!(matches!(err, SeedError::Schema(_)));
    // The store was never opened, so no database file exists
    assert!(!target.exists());
    Ok(())
}

#[tokio::test]
async fn missing_source_is_an_input_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = config(
        dir.path().join("nope.csv"),
        &dir.path().join("detections.sqlite"),
        LoadMode::Replace,
    );
    let err = run(&cfg).await.unwrap_err();
    assert!(matches!(err, SeedError::Input(_)));
    Ok(())
}
