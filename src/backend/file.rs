//! File backend: buffered append writes, advisory locking, rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use fs2::FileExt;

use crate::backend::{Backend, BackendKind, BackendStats, closed_error};
use crate::errors::{ErrorSeverity, LogError};
use crate::rotation::{rotated_path, rotation_stamp};

/// Rotation and buffering knobs for one file backend.
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Buffered writer capacity.
    pub buffer_size: usize,
    /// Size rotation trigger in bytes; 0 disables.
    pub max_size: u64,
    /// Age rotation trigger; zero disables.
    pub max_age: Duration,
}

impl Default for FileOptions {
    fn default() -> Self {
        FileOptions {
            buffer_size: crate::config::DEFAULT_BUFFER_SIZE,
            max_size: crate::config::DEFAULT_MAX_SIZE,
            max_age: Duration::ZERO,
        }
    }
}

/// Callbacks wired in by the logger so the backend never needs a reference
/// back into it.
pub(crate) struct FileHooks {
    /// Called with the rotated path after a successful rotation (compression
    /// hand-off, retention, rotation accounting).
    pub(crate) on_rotated: Box<dyn Fn(PathBuf) + Send>,
    /// Non-fatal failures, e.g. the copy+truncate rename fallback.
    pub(crate) report: Box<dyn Fn(LogError) + Send>,
}

impl FileHooks {
    pub(crate) fn noop() -> FileHooks {
        FileHooks {
            on_rotated: Box::new(|_| {}),
            report: Box::new(|_| {}),
        }
    }
}

/// Append-mode file sink with size/age rotation.
pub struct FileBackend {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    size: u64,
    opened_at: Instant,
    opts: FileOptions,
    hooks: FileHooks,
    stats: BackendStats,
}

impl FileBackend {
    pub(crate) fn create(
        path: PathBuf,
        opts: FileOptions,
        hooks: FileHooks,
    ) -> io::Result<FileBackend> {
        let (writer, size) = open_writer(&path, opts.buffer_size)?;
        Ok(FileBackend {
            path,
            writer: Some(writer),
            size,
            opened_at: Instant::now(),
            opts,
            hooks,
            stats: BackendStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    fn should_rotate(&self) -> bool {
        if self.opts.max_size > 0 && self.size >= self.opts.max_size {
            return true;
        }
        !self.opts.max_age.is_zero() && self.opened_at.elapsed() >= self.opts.max_age
    }

    /// Turn the active file over to a timestamped rotated file and reopen.
    /// The sink is reopened even when the turnover itself fails, so writes
    /// keep landing in the active file.
    fn rotate(&mut self) -> io::Result<()> {
        // Hold the advisory lock across the turnover so another process
        // appending to the same file cannot interleave with the rename.
        let mut guard = self.writer.take();
        if let Some(writer) = guard.as_mut() {
            let _ = writer.get_ref().lock_exclusive();
            if let Err(e) = writer.flush() {
                let _ = FileExt::unlock(writer.get_ref());
                drop(guard);
                self.reopen()?;
                return Err(e);
            }
        }

        let stamp = rotation_stamp(Local::now());
        let mut rotated = rotated_path(&self.path, &stamp);
        // Several turnovers can land in the same millisecond; a rename must
        // never clobber an earlier rotated file.
        let mut seq = 1;
        while rotated.exists() {
            rotated = rotated_path(&self.path, &format!("{stamp}-{seq}"));
            seq += 1;
        }

        let turnover = match fs::rename(&self.path, &rotated) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                // Cross-device or similar; fall back to copy + truncate.
                let fallback = fs::copy(&self.path, &rotated).and_then(|_| {
                    OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .open(&self.path)
                        .map(|_| ())
                });
                if fallback.is_ok() {
                    (self.hooks.report)(LogError::new(
                        "rotate",
                        self.path.display().to_string(),
                        "rename failed, used copy+truncate fallback",
                        rename_err.to_string(),
                        ErrorSeverity::Warn,
                    ));
                }
                fallback
            }
        };

        if let Some(writer) = guard.as_ref() {
            let _ = FileExt::unlock(writer.get_ref());
        }
        drop(guard);

        self.reopen()?;
        turnover?;
        (self.hooks.on_rotated)(rotated);
        Ok(())
    }

    fn reopen(&mut self) -> io::Result<()> {
        let (writer, size) = open_writer(&self.path, self.opts.buffer_size)?;
        self.writer = Some(writer);
        self.size = size;
        self.opened_at = Instant::now();
        Ok(())
    }
}

impl Backend for FileBackend {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(writer) = self.writer.as_mut() else {
            self.stats.record_error();
            return Err(closed_error());
        };
        // Advisory exclusive lock for the duration of this write; uncontended
        // in the single-process case.
        writer.get_ref().lock_exclusive()?;
        let result = writer.write_all(buf);
        let _ = FileExt::unlock(writer.get_ref());
        match result {
            Ok(()) => {
                self.size += buf.len() as u64;
                self.stats.record_write(buf.len() as u64);
                Ok(buf.len())
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn supports_atomic(&self) -> bool {
        // O_APPEND writes of one buffered record.
        true
    }

    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn after_write(&mut self) -> io::Result<()> {
        if self.writer.is_some() && self.should_rotate() {
            // The record itself was written; a failed turnover is reported,
            // not surfaced as a write failure.
            if let Err(e) = self.rotate() {
                (self.hooks.report)(LogError::new(
                    "rotate",
                    self.path.display().to_string(),
                    "rotation failed",
                    e.to_string(),
                    ErrorSeverity::Warn,
                ));
            }
        }
        Ok(())
    }

    fn force_rotate(&mut self) -> io::Result<bool> {
        if self.writer.is_none() {
            return Ok(false);
        }
        self.rotate()?;
        Ok(true)
    }
}

/// Open the path append-mode, creating missing directories with 0755 and the
/// file with 0644. Returns the writer and the current file size.
fn open_writer(path: &Path, buffer_size: usize) -> io::Result<(BufWriter<File>, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dirs(parent)?;
    }
    let file = open_append(path)?;
    let size = file.metadata()?.len();
    Ok((BufWriter::with_capacity(buffer_size, file), size))
}

#[cfg(unix)]
fn create_dirs(parent: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if parent.exists() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o755).create(parent)
}

#[cfg(not(unix))]
fn create_dirs(parent: &Path) -> io::Result<()> {
    fs::create_dir_all(parent)
}

#[cfg(unix)]
fn open_append(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(true)
        .mode(0o644)
        .open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).write(true).append(true).open(path)
}
