//! End-to-end scenarios at full scale.
//!
//! These run only when `OMNI_RUN_INTEGRATION_TESTS` is truthy;
//! `OMNI_UNIT_TESTS_ONLY` takes precedence and keeps them off.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use omni::{CIRCULAR_SENTINEL, Config, FieldValue, Fields, Format, Level, Logger};

fn truthy(var: &str) -> bool {
    std::env::var(var)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn integration_enabled() -> bool {
    truthy("OMNI_RUN_INTEGRATION_TESTS") && !truthy("OMNI_UNIT_TESTS_ONLY")
}

fn line_count(path: &Path) -> usize {
    fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}

fn rotated_files(path: &Path) -> Vec<std::path::PathBuf> {
    let dir = path.parent().unwrap();
    let prefix = format!("{}.", path.file_name().unwrap().to_string_lossy());
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

// Throughput baseline: a single producer with ample channel capacity.
#[test]
fn scenario_throughput_baseline() {
    if !integration_enabled() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baseline.log");
    let logger = Logger::new(
        Config::new()
            .with_path(path.to_str().unwrap())
            .with_channel_size(1000),
    )
    .unwrap();

    for i in 0..1000 {
        logger.info(&format!("baseline record {i}"));
    }
    logger.close().unwrap();

    let snap = logger.metrics();
    assert_eq!(snap.messages_logged, 1000);
    assert_eq!(snap.messages_dropped, 0);
    assert_eq!(line_count(&path), 1000);
}

// Channel overflow under many producers: accounting still balances.
#[test]
fn scenario_channel_overflow() {
    if !integration_enabled() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overflow.log");
    let logger = Logger::new(
        Config::new()
            .with_path(path.to_str().unwrap())
            .with_channel_size(10),
    )
    .unwrap();

    let mut handles = Vec::new();
    for producer in 0..50 {
        let logger = logger.clone();
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                logger.info(&format!("p{producer} m{i}"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    logger.close().unwrap();

    let snap = logger.metrics();
    assert_eq!(snap.messages_logged + snap.messages_dropped, 5000);
    assert!(snap.messages_dropped > 0);
    assert_eq!(line_count(&path) as u64, snap.messages_logged);
}

// Rotation on size with a retention cap.
#[test]
fn scenario_rotation_on_size() {
    if !integration_enabled() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotation.log");
    let logger = Logger::new(
        Config::new()
            .with_path(path.to_str().unwrap())
            .with_channel_size(2048)
            .with_max_size(1024)
            .with_max_files(3),
    )
    .unwrap();

    let payload = "x".repeat(180);
    let mut handles = Vec::new();
    for producer in 0..5 {
        let logger = logger.clone();
        let payload = payload.clone();
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                logger.info(&format!("p{producer} r{i:03} {payload}"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    logger.close().unwrap();

    let rotated = rotated_files(&path);
    assert!(rotated.len() >= 2, "got {}", rotated.len());
    assert!(rotated.len() <= 3, "retention cap exceeded: {}", rotated.len());
    assert!(path.exists(), "active file present");
}

// Cyclic structured fields serialise with the sentinel, promptly.
#[test]
fn scenario_structured_cycles() {
    if !integration_enabled() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycles.log");
    let logger = Logger::new(
        Config::new()
            .with_path(path.to_str().unwrap())
            .with_format(Format::Json),
    )
    .unwrap();

    let (shared, value) = FieldValue::shared(Fields::new());
    shared.write().insert("me".into(), value.clone());
    let mut fields = Fields::new();
    fields.insert("loop".into(), value);

    let started = Instant::now();
    logger.log_structured(Level::Info, "cyclic", fields);
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(10), "took {elapsed:?}");

    logger.sync().unwrap();
    logger.close().unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains(CIRCULAR_SENTINEL));
}

// Graceful close while producers are still writing.
#[test]
fn scenario_graceful_close_under_load() {
    if !integration_enabled() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("closing.log");
    let logger = Logger::new(
        Config::new()
            .with_path(path.to_str().unwrap())
            .with_channel_size(100),
    )
    .unwrap();

    let mut handles = Vec::new();
    for producer in 0..10 {
        let logger = logger.clone();
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                logger.info(&format!("p{producer} m{i}"));
            }
        }));
    }

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    logger.close().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(logger.is_closed());

    for handle in handles {
        handle.join().unwrap();
    }

    let written = line_count(&path);
    assert!(written >= 1);
    assert!(written <= 10_000);

    let before = line_count(&path);
    logger.info("after close");
    assert_eq!(line_count(&path), before);
}

// Adding and removing a second destination mid-stream.
#[test]
fn scenario_multi_destination() {
    if !integration_enabled() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("multi-first.log");
    let second = dir.path().join("multi-second.log");
    let logger = Logger::new(
        Config::new()
            .with_path(first.to_str().unwrap())
            .with_channel_size(2048),
    )
    .unwrap();

    for i in 0..500 {
        logger.info(&format!("phase1 {i}"));
    }
    logger.sync().unwrap();

    logger.add_destination(second.to_str().unwrap()).unwrap();
    for i in 0..500 {
        logger.info(&format!("phase2 {i}"));
    }
    logger.sync().unwrap();

    logger.remove_destination(second.to_str().unwrap()).unwrap();
    for i in 0..500 {
        logger.info(&format!("phase3 {i}"));
    }
    logger.close().unwrap();

    assert_eq!(line_count(&first), 1500);
    assert_eq!(line_count(&second), 500);
}
