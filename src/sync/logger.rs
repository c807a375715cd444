//! Guarded loggers over a shared sink
//!
//! A logger appends one record per call: the line, with embedded line
//! breaks escaped, plus a terminating `\n`.
//!
//! Fragmented variants (Unguarded, Exclusive, CrossProcess) emit each
//! record as several small sink writes with a yield in between, the way a
//! buffered writer flushing a long line would. Without a guard, concurrent
//! records interleave mid-line. The exclusive guards serialize whole records.
//!
//! The Bounded variant admits up to N appenders at once and therefore emits
//! each record as a single sink write. Both sinks apply a single write
//! atomically, so bounded appends may reorder but never garble lines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use super::error::SyncError;
use super::guard::GuardExt;
use super::metrics::ContentionMetrics;
use super::process::ProcessGuard;
use super::slots::SlotGuard;

/// Bytes per sink write for fragmented records.
const FRAGMENT_LEN: usize = 8;

/// Destination of log records.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Write `chunk` in one operation.
    fn write_chunk(&self, chunk: &[u8]) -> io::Result<()>;
}

/// Append-mode log file. Each chunk is one `write_all` on the shared handle.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Create `path` empty, discarding previous contents.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        File::create(path.as_ref())?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        (&self.file).write_all(chunk)
    }
}

/// In-memory sink, used by tests and demonstrations.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl LogSink for MemorySink {
    fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
        Ok(())
    }
}

#[derive(Debug)]
enum LogGuard {
    Unguarded,
    Exclusive(Arc<SlotGuard>),
    Bounded(Arc<SlotGuard>),
    CrossProcess(Arc<ProcessGuard>),
}

/// A logger that appends lines to a shared sink under one guard policy.
#[derive(Debug)]
pub struct GuardedLogger {
    sink: Arc<dyn LogSink>,
    guard: LogGuard,
    appends: AtomicU64,
}

impl GuardedLogger {
    /// No guard: concurrent appends interleave.
    pub fn unguarded(sink: Arc<dyn LogSink>) -> Self {
        Self::build(sink, LogGuard::Unguarded)
    }

    /// One writer at a time.
    pub fn exclusive(sink: Arc<dyn LogSink>) -> Self {
        Self::build(sink, LogGuard::Exclusive(Arc::new(SlotGuard::exclusive())))
    }

    /// Up to `permits` concurrent writers.
    pub fn bounded(sink: Arc<dyn LogSink>, permits: usize) -> Result<Self, SyncError> {
        let guard = SlotGuard::bounded(permits)?;
        Ok(Self::build(sink, LogGuard::Bounded(Arc::new(guard))))
    }

    /// One writer at a time across every process sharing `guard`'s lock file.
    pub fn cross_process(sink: Arc<dyn LogSink>, guard: ProcessGuard) -> Self {
        Self::build(sink, LogGuard::CrossProcess(Arc::new(guard)))
    }

    fn build(sink: Arc<dyn LogSink>, guard: LogGuard) -> Self {
        Self {
            sink,
            guard,
            appends: AtomicU64::new(0),
        }
    }

    /// Append `line` as one record.
    pub fn append(&self, line: &str) -> Result<(), SyncError> {
        let record = format_record(line);
        match &self.guard {
            LogGuard::Unguarded => self.write_fragmented(&record)?,
            LogGuard::Exclusive(guard) => guard.with_slot(|| self.write_fragmented(&record))?,
            LogGuard::Bounded(guard) => guard.with_slot(|| self.sink.write_chunk(&record))?,
            LogGuard::CrossProcess(guard) => {
                guard.scoped_try(|| self.write_fragmented(&record).map_err(SyncError::from))?
            }
        }
        self.appends.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_fragmented(&self, record: &[u8]) -> io::Result<()> {
        for fragment in record.chunks(FRAGMENT_LEN) {
            self.sink.write_chunk(fragment)?;
            thread::yield_now();
        }
        Ok(())
    }

    /// Completed `append` calls.
    pub fn appends(&self) -> u64 {
        self.appends.load(Ordering::Relaxed)
    }

    /// Contention metrics for the logger's guard, if it has one.
    pub fn metrics(&self) -> Option<ContentionMetrics> {
        match &self.guard {
            LogGuard::Unguarded => None,
            LogGuard::Exclusive(guard) | LogGuard::Bounded(guard) => {
                Some(ContentionMetrics::new(guard.clone()))
            }
            LogGuard::CrossProcess(guard) => Some(ContentionMetrics::new(guard.clone())),
        }
    }
}

/// Escape line breaks so that one append produces exactly one line.
pub fn escape_line(line: &str) -> String {
    line.replace('\\', "\\\\")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

fn format_record(line: &str) -> Vec<u8> {
    let mut record = escape_line(line).into_bytes();
    record.push(b'\n');
    record
}

/// Integrity check of a log against the lines that were appended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAudit {
    /// Lines that were appended.
    pub appends: u64,
    /// Lines found in the log.
    pub lines: u64,
    /// Found lines that match an expected line.
    pub intact: u64,
    /// Found lines that match nothing expected (garbled or merged).
    pub corrupted: u64,
    /// Expected lines never found intact.
    pub missing: u64,
}

impl LogAudit {
    /// Compare `contents` with the `expected` lines, ignoring order.
    pub fn inspect<S: AsRef<str>>(contents: &str, expected: &[S]) -> Self {
        let mut outstanding: HashMap<String, u64> = HashMap::new();
        for line in expected {
            *outstanding.entry(escape_line(line.as_ref())).or_default() += 1;
        }

        let mut audit = LogAudit {
            appends: expected.len() as u64,
            ..LogAudit::default()
        };
        for line in contents.lines() {
            audit.lines += 1;
            match outstanding.get_mut(line) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    audit.intact += 1;
                }
                _ => audit.corrupted += 1,
            }
        }
        audit.missing = outstanding.values().sum();
        audit
    }

    /// Read a log file and inspect it.
    pub fn inspect_file<S: AsRef<str>>(path: &Path, expected: &[S]) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::inspect(&String::from_utf8_lossy(&bytes), expected))
    }

    /// Every append arrived as exactly one complete line.
    pub fn is_clean(&self) -> bool {
        self.corrupted == 0 && self.missing == 0 && self.lines == self.appends
    }
}

impl fmt::Display for LogAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} appends, {} lines ({} intact, {} corrupted, {} missing)",
            self.appends, self.lines, self.intact, self.corrupted, self.missing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn expected(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("worker-{i:03} finished item-{i:03} checksum={:08x}", i * 7919))
            .collect()
    }

    fn append_concurrently(logger: &GuardedLogger, lines: &[String]) {
        thread::scope(|s| {
            for line in lines {
                s.spawn(move || logger.append(line).unwrap());
            }
        });
    }

    #[test]
    fn test_escape_keeps_one_record_per_line() {
        let sink = Arc::new(MemorySink::new());
        let logger = GuardedLogger::exclusive(sink.clone());
        logger.append("first\nsecond").unwrap();
        logger.append("back\\slash").unwrap();

        assert_eq!(sink.lines(), vec!["first\\nsecond", "back\\\\slash"]);
        let audit = LogAudit::inspect(&sink.contents(), &["first\nsecond", "back\\slash"]);
        assert!(audit.is_clean(), "{audit}");
    }

    #[test]
    fn test_exclusive_logger_keeps_lines_intact() {
        let sink = Arc::new(MemorySink::new());
        let logger = GuardedLogger::exclusive(sink.clone());
        let lines = expected(32);
        append_concurrently(&logger, &lines);

        let audit = LogAudit::inspect(&sink.contents(), &lines);
        assert!(audit.is_clean(), "{audit}");
        assert_eq!(logger.appends(), 32);
        assert_eq!(logger.metrics().unwrap().snapshot().unwrap().acquisitions, 32);
    }

    #[test]
    fn test_bounded_logger_keeps_lines_intact() {
        let sink = Arc::new(MemorySink::new());
        let logger = GuardedLogger::bounded(sink.clone(), 4).unwrap();
        let lines = expected(32);
        append_concurrently(&logger, &lines);

        assert!(LogAudit::inspect(&sink.contents(), &lines).is_clean());
    }

    #[test]
    fn test_bounded_logger_rejects_zero_permits() {
        let sink = Arc::new(MemorySink::new());
        assert!(GuardedLogger::bounded(sink, 0).is_err());
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let sink = Arc::new(FileSink::create(&path).unwrap());
        let logger = GuardedLogger::exclusive(sink.clone());
        let lines = expected(16);
        append_concurrently(&logger, &lines);

        assert_eq!(sink.path(), path.as_path());
        let audit = LogAudit::inspect_file(&path, &lines).unwrap();
        assert!(audit.is_clean(), "{audit}");
    }

    #[test]
    fn test_cross_process_logger_within_one_process() {
        let dir = TempDir::new().unwrap();
        let guard = ProcessGuard::create(dir.path().join("log.lock")).unwrap();
        let sink = Arc::new(FileSink::create(dir.path().join("run.log")).unwrap());
        let logger = GuardedLogger::cross_process(sink, guard);
        let lines = expected(8);
        append_concurrently(&logger, &lines);

        let audit = LogAudit::inspect_file(&dir.path().join("run.log"), &lines).unwrap();
        assert!(audit.is_clean(), "{audit}");
        assert_eq!(logger.metrics().unwrap().snapshot().unwrap().acquisitions, 8);
    }

    #[test]
    fn test_audit_counts_corruption() {
        let lines = ["alpha", "beta", "gamma"];
        let audit = LogAudit::inspect("alpha\nbegamma\nta\n", &lines);
        assert_eq!(audit.lines, 3);
        assert_eq!(audit.intact, 1);
        assert_eq!(audit.corrupted, 2);
        assert_eq!(audit.missing, 2);
        assert!(!audit.is_clean());
    }

    #[test]
    fn test_audit_counts_duplicates_once() {
        let audit = LogAudit::inspect("same\nsame\nsame\n", &["same", "same"]);
        assert_eq!(audit.intact, 2);
        assert_eq!(audit.corrupted, 1);
        assert_eq!(audit.missing, 0);
    }
}
