//! Rotated-file naming, retention, and the periodic cleanup ticker.
//!
//! Rotated files are named `<original>.<YYYYMMDD-HHMMSS.mmm>` (local wall
//! clock, millisecond precision), which makes lexicographic order match
//! chronological order. Compressed artefacts add a `.gz` suffix on top.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use crossbeam_channel::{Receiver, select, tick};

/// chrono directive producing `YYYYMMDD-HHMMSS.mmm`.
pub(crate) const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

pub(crate) fn rotation_stamp(now: DateTime<Local>) -> String {
    now.format(STAMP_FORMAT).to_string()
}

pub(crate) fn rotated_path(base: &Path, stamp: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", base.display(), stamp))
}

/// Parse the timestamp out of a rotated file name suffix (the part after
/// `<original>.`), tolerating a trailing `.gz`.
pub(crate) fn parse_stamp(suffix: &str) -> Option<DateTime<Local>> {
    let stamp = suffix.strip_suffix(".gz").unwrap_or(suffix);
    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// All rotated files for `base` (`<name>.*` in its directory, the active file
/// excluded), sorted oldest first by the timestamp in the name.
pub(crate) fn list_rotated(base: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = base.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let base_name = match base.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => return Ok(Vec::new()),
    };
    let prefix = format!("{}.", base_name);

    let mut rotated = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let Ok(dir_entry) = dir_entry else { continue };
        let path = dir_entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(&prefix) && name.len() > prefix.len() {
            rotated.push(path);
        }
    }
    // Names embed a sortable stamp, so byte order is chronological order.
    rotated.sort();
    Ok(rotated)
}

/// Delete the oldest rotated files so at most `max_files` remain. Files the
/// `skip` predicate claims (e.g. queued for compression) are left alone.
pub(crate) fn apply_count_retention(
    base: &Path,
    max_files: usize,
    skip: &dyn Fn(&Path) -> bool,
) -> io::Result<Vec<PathBuf>> {
    if max_files == 0 {
        return Ok(Vec::new());
    }
    let rotated = list_rotated(base)?;
    let mut removed = Vec::new();
    if rotated.len() <= max_files {
        return Ok(removed);
    }
    let excess = rotated.len() - max_files;
    for path in rotated.into_iter().take(excess) {
        if skip(&path) {
            continue;
        }
        if fs::remove_file(&path).is_ok() {
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Delete rotated files older than `max_age`, judged by the timestamp in the
/// name (falling back to mtime for names that do not parse).
pub(crate) fn apply_age_retention(
    base: &Path,
    max_age: Duration,
    skip: &dyn Fn(&Path) -> bool,
) -> io::Result<Vec<PathBuf>> {
    if max_age.is_zero() {
        return Ok(Vec::new());
    }
    let now = Local::now();
    let base_name = base
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let prefix = format!("{}.", base_name);

    let mut removed = Vec::new();
    for path in list_rotated(base)? {
        if skip(&path) {
            continue;
        }
        let age = rotated_file_age(&path, &prefix, now);
        if age.map(|a| a >= max_age).unwrap_or(false) && fs::remove_file(&path).is_ok() {
            removed.push(path);
        }
    }
    Ok(removed)
}

pub(crate) fn rotated_file_age(
    path: &Path,
    prefix: &str,
    now: DateTime<Local>,
) -> Option<Duration> {
    let name = path.file_name().and_then(|n| n.to_str())?;
    let suffix = name.strip_prefix(prefix)?;
    if let Some(stamp) = parse_stamp(suffix) {
        return (now - stamp).to_std().ok();
    }
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}

/// Run `job` every `interval` until the stop channel fires (or is dropped).
pub(crate) fn spawn_cleanup_ticker(
    interval: Duration,
    stop: Receiver<()>,
    job: impl Fn() + Send + 'static,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("omni-cleanup".to_string())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => job(),
                    recv(stop) -> _ => break,
                }
            }
        })
        .expect("failed to spawn cleanup thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_stamp_is_sortable() {
        let earlier = Local.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let later = Local.with_ymd_and_hms(2026, 3, 1, 10, 0, 1).unwrap();
        assert!(rotation_stamp(earlier) < rotation_stamp(later));
    }

    #[test]
    fn test_stamp_round_trip() {
        let now = Local::now();
        let stamp = rotation_stamp(now);
        let parsed = parse_stamp(&stamp).expect("stamp parses");
        // Millisecond precision survives the round trip.
        assert_eq!(
            parsed.timestamp_millis() / 10,
            now.timestamp_millis() / 10
        );
        assert!(parse_stamp(&format!("{stamp}.gz")).is_some());
        assert!(parse_stamp("garbage").is_none());
    }

    #[test]
    fn test_rotated_path_shape() {
        let p = rotated_path(Path::new("/var/log/app.log"), "20260301-100000.123");
        assert_eq!(
            p,
            PathBuf::from("/var/log/app.log.20260301-100000.123")
        );
    }

    #[test]
    fn test_list_and_count_retention() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        File::create(&base).unwrap().write_all(b"active\n").unwrap();
        for stamp in [
            "20260301-100000.000",
            "20260301-100001.000",
            "20260301-100002.000",
            "20260301-100003.000",
        ] {
            File::create(rotated_path(&base, stamp)).unwrap();
        }
        // Unrelated file must not match.
        File::create(dir.path().join("other.log.20260301-100000.000")).unwrap();

        let rotated = list_rotated(&base).unwrap();
        assert_eq!(rotated.len(), 4);

        let removed = apply_count_retention(&base, 2, &|_| false).unwrap();
        assert_eq!(removed.len(), 2);
        let left = list_rotated(&base).unwrap();
        assert_eq!(left.len(), 2);
        // The oldest two are gone; the newest two remain.
        assert!(left[0].to_string_lossy().contains("100002"));
        assert!(base.exists());
    }

    #[test]
    fn test_retention_skips_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        File::create(&base).unwrap();
        let oldest = rotated_path(&base, "20260301-100000.000");
        File::create(&oldest).unwrap();
        File::create(rotated_path(&base, "20260301-100001.000")).unwrap();
        File::create(rotated_path(&base, "20260301-100002.000")).unwrap();

        let protected = oldest.clone();
        let removed =
            apply_count_retention(&base, 1, &move |p| p == protected.as_path()).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(oldest.exists(), "in-flight file must survive retention");
    }

    #[test]
    fn test_age_retention() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        File::create(&base).unwrap();
        let old = rotated_path(&base, "20200101-000000.000");
        File::create(&old).unwrap();
        let fresh_stamp = rotation_stamp(Local::now());
        let fresh = rotated_path(&base, &fresh_stamp);
        File::create(&fresh).unwrap();

        let removed =
            apply_age_retention(&base, Duration::from_secs(3600), &|_| false).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_cleanup_ticker_stops() {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let handle = spawn_cleanup_ticker(Duration::from_secs(3600), stop_rx, || {});
        stop_tx.send(()).unwrap();
        handle.join().unwrap();
    }
}
