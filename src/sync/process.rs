//! Cross-process exclusive guard
//!
//! Exclusion comes from an OS advisory lock on a shared lock file. The guard's
//! accounting lives in a sidecar file next to it (`<lock>.stats`) as a fixed
//! little-endian record, so every participating process reads and updates
//! one set of counters:
//!
//! ```text
//! offset  field
//!   0     holders
//!   8     peak_holders
//!  16     acquisitions
//!  24     contended
//!  32     wait_ns
//!  40     max_wait_ns
//!  48     hold_ns
//!  56     owner ticket (0 = free)
//! ```
//!
//! The record has its own lock, taken exclusively for each update and shared
//! for reads. Readers never touch the holder lock, so taking a snapshot
//! neither delays nor contends with acquisitions, and the current holder
//! may read its own guard's stats.
//!
//! Each acquisition opens its own handle on the lock file. Advisory locks
//! belong to the open file description, so two threads of one process
//! exclude each other exactly like two processes do.

use std::collections::HashMap;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::error::SyncError;
use super::guard::{Guard, GuardKind, GuardStats, Ticket};

const RECORD_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Record {
    stats: GuardStats,
    owner: u64,
}

impl Record {
    fn decode(bytes: &[u8; RECORD_LEN]) -> Self {
        let field = |index: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[index * 8..index * 8 + 8]);
            u64::from_le_bytes(word)
        };
        Record {
            stats: GuardStats {
                holders: field(0),
                peak_holders: field(1),
                acquisitions: field(2),
                contended: field(3),
                wait_ns: field(4),
                max_wait_ns: field(5),
                hold_ns: field(6),
            },
            owner: field(7),
        }
    }

    fn encode(&self) -> [u8; RECORD_LEN] {
        let s = &self.stats;
        let fields = [
            s.holders,
            s.peak_holders,
            s.acquisitions,
            s.contended,
            s.wait_ns,
            s.max_wait_ns,
            s.hold_ns,
            self.owner,
        ];
        let mut bytes = [0u8; RECORD_LEN];
        for (index, value) in fields.iter().enumerate() {
            bytes[index * 8..index * 8 + 8].copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Read the record; a short or empty file reads as a fresh record.
    fn load(mut file: &File) -> std::io::Result<Self> {
        if file.metadata()?.len() < RECORD_LEN as u64 {
            return Ok(Record::default());
        }
        let mut bytes = [0u8; RECORD_LEN];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut bytes)?;
        Ok(Record::decode(&bytes))
    }

    fn store(&self, mut file: &File) -> std::io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.encode())?;
        file.flush()
    }
}

#[derive(Debug)]
struct Hold {
    file: File,
    since: Instant,
}

/// Exclusive guard valid across independent OS processes.
#[derive(Debug)]
pub struct ProcessGuard {
    path: PathBuf,
    stats_path: PathBuf,
    /// Holds taken by this process, keyed by ticket.
    local: Mutex<HashMap<Ticket, Hold>>,
    next_seq: AtomicU64,
}

impl ProcessGuard {
    /// Create (or reset) the shared lock file at `path` and its stats record.
    ///
    /// Call once, from the coordinating process, before workers open it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let guard = Self::handle(path.as_ref());
        guard.open_file()?;
        guard.update_record(|record| *record = Record::default())?;
        tracing::debug!("Created cross-process guard at {}", guard.path.display());
        Ok(guard)
    }

    /// Attach to an existing lock file without resetting its accounting.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let guard = Self::handle(path.as_ref());
        for file in [&guard.path, &guard.stats_path] {
            if !file.exists() {
                return Err(SyncError::InvalidConfig(format!(
                    "lock file {} does not exist",
                    file.display()
                )));
            }
        }
        Ok(guard)
    }

    fn handle(path: &Path) -> Self {
        let mut stats_path = path.as_os_str().to_owned();
        stats_path.push(".stats");
        Self {
            path: path.to_path_buf(),
            stats_path: PathBuf::from(stats_path),
            local: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&self) -> std::io::Result<File> {
        open_rw(&self.path)
    }

    /// Apply `change` to the shared record under the record's own lock.
    fn update_record<R>(&self, change: impl FnOnce(&mut Record) -> R) -> std::io::Result<R> {
        let file = open_rw(&self.stats_path)?;
        file.lock()?;
        let result = Record::load(&file).and_then(|mut record| {
            let out = change(&mut record);
            record.store(&file).map(|()| out)
        });
        file.unlock()?;
        result
    }

    /// Path of the sidecar file holding the accounting record.
    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }

    // Unique across processes: pid in the high half, a local sequence in the low half.
    fn next_ticket(&self) -> Ticket {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) & 0xFFFF_FFFF;
        Ticket((u64::from(std::process::id()) << 32) | seq)
    }

    fn lock_local(&self) -> std::sync::MutexGuard<'_, HashMap<Ticket, Hold>> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill in the record for a freshly granted lock.
    fn grant(&self, ticket: Ticket, waited: Option<Duration>) -> std::io::Result<()> {
        let stale = self.update_record(|record| {
            // Only the holder lock's owner writes `holders`, so a non-zero
            // count here was left by a holder that died without releasing.
            let stale = (record.stats.holders != 0).then_some(record.owner);
            record.stats.holders = 0;
            record.stats.record_occupied();
            record.stats.record_grant(waited);
            record.owner = ticket.id();
            stale
        })?;
        if let Some(owner) = stale {
            tracing::warn!(
                "Recovered stale holder (ticket #{}) in {}",
                owner,
                self.path.display()
            );
        }
        Ok(())
    }
}

fn open_rw(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

impl Guard for ProcessGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::CrossProcess
    }

    fn capacity(&self) -> usize {
        1
    }

    fn acquire(&self) -> Result<Ticket, SyncError> {
        let file = self.open_file()?;
        let ticket = self.next_ticket();
        let started = Instant::now();

        let waited = match file.try_lock() {
            Ok(()) => None,
            Err(TryLockError::WouldBlock) => {
                tracing::trace!("cross-process guard: {} blocking", ticket);
                file.lock()?;
                Some(started.elapsed())
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        };

        if let Err(e) = self.grant(ticket, waited) {
            file.unlock()?;
            return Err(e.into());
        }
        self.lock_local().insert(
            ticket,
            Hold {
                file,
                since: Instant::now(),
            },
        );
        Ok(ticket)
    }

    fn release(&self, ticket: Ticket) -> Result<(), SyncError> {
        let hold = self
            .lock_local()
            .remove(&ticket)
            .ok_or_else(|| SyncError::not_held(ticket))?;

        let held = hold.since.elapsed();
        let stored = self.update_record(|record| {
            if record.owner != ticket.id() {
                tracing::warn!(
                    "Lock record names #{} as owner while {} releases",
                    record.owner,
                    ticket
                );
            }
            record.stats.record_vacated(held);
            record.owner = 0;
        });
        hold.file.unlock()?;
        stored?;
        Ok(())
    }

    fn stats(&self) -> Result<GuardStats, SyncError> {
        let file = open_rw(&self.stats_path)?;
        file.lock_shared()?;
        let record = Record::load(&file);
        file.unlock()?;
        Ok(record?.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::guard::GuardExt;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_record_layout_roundtrip() {
        let record = Record {
            stats: GuardStats {
                holders: 1,
                peak_holders: 1,
                acquisitions: 42,
                contended: 7,
                wait_ns: 1_234,
                max_wait_ns: 999,
                hold_ns: 5_555,
            },
            owner: 0xABCD,
        };
        let bytes = record.encode();
        assert_eq!(&bytes[16..24], &42u64.to_le_bytes());
        assert_eq!(Record::decode(&bytes), record);
    }

    #[test]
    fn test_uncontended_acquire_release() {
        let dir = TempDir::new().unwrap();
        let guard = ProcessGuard::create(dir.path().join("log.lock")).unwrap();

        let ticket = guard.acquire().unwrap();
        assert_eq!(ticket.id() >> 32, u64::from(std::process::id()));
        guard.release(ticket).unwrap();

        let stats = guard.stats().unwrap();
        assert_eq!(stats.acquisitions, 1);
        assert_eq!(stats.contended, 0);
        assert_eq!(stats.wait_ns, 0);
        assert_eq!(stats.holders, 0);
    }

    #[test]
    fn test_release_without_acquire_fails() {
        let dir = TempDir::new().unwrap();
        let guard = ProcessGuard::create(dir.path().join("log.lock")).unwrap();
        let ticket = guard.acquire().unwrap();
        guard.release(ticket).unwrap();

        assert!(matches!(
            guard.release(ticket),
            Err(SyncError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_open_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let err = ProcessGuard::open(dir.path().join("missing.lock")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_accounting_is_shared_between_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.lock");
        let creator = ProcessGuard::create(&path).unwrap();
        let attached = ProcessGuard::open(&path).unwrap();

        creator.scoped(|| ()).unwrap();
        attached.scoped(|| ()).unwrap();

        assert_eq!(creator.stats().unwrap().acquisitions, 2);
        assert_eq!(attached.stats().unwrap().acquisitions, 2);
    }

    #[test]
    fn test_separate_handles_exclude_each_other() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("excl.lock");
        let first = Arc::new(ProcessGuard::create(&path).unwrap());
        let second = Arc::new(ProcessGuard::open(&path).unwrap());

        let held = first.acquire().unwrap();
        let contender = {
            let second = Arc::clone(&second);
            thread::spawn(move || second.scoped(|| Instant::now()).unwrap())
        };
        thread::sleep(Duration::from_millis(30));
        let released_at = Instant::now();
        first.release(held).unwrap();
        let entered_at = contender.join().unwrap();

        assert!(entered_at >= released_at);
        let stats = first.stats().unwrap();
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.contended, 1);
        assert!(stats.wait_ns >= 20_000_000);
        assert_eq!(stats.peak_holders, 1);
    }

    #[test]
    fn test_create_resets_previous_accounting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reset.lock");
        let guard = ProcessGuard::create(&path).unwrap();
        guard.scoped(|| ()).unwrap();

        let fresh = ProcessGuard::create(&path).unwrap();
        assert_eq!(fresh.stats().unwrap(), GuardStats::default());
    }

    #[test]
    fn test_open_requires_stats_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.lock");
        std::fs::write(&path, b"").unwrap();

        let err = ProcessGuard::open(&path).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.to_string().contains("bare.lock.stats"));
    }

    #[test]
    fn test_holder_can_read_its_own_stats() {
        let dir = TempDir::new().unwrap();
        let guard = ProcessGuard::create(dir.path().join("self.lock")).unwrap();

        let ticket = guard.acquire().unwrap();
        let stats = guard.stats().unwrap();
        assert_eq!(stats.holders, 1);
        assert_eq!(stats.acquisitions, 1);
        guard.release(ticket).unwrap();
    }

    #[test]
    fn test_stats_readers_do_not_cause_contention() {
        let dir = TempDir::new().unwrap();
        let guard = Arc::new(ProcessGuard::create(dir.path().join("polled.lock")).unwrap());
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let reader = {
            let guard = Arc::clone(&guard);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0u64;
                while !done.load(Ordering::Relaxed) {
                    guard.stats().unwrap();
                    reads += 1;
                }
                reads
            })
        };

        for _ in 0..2000 {
            let ticket = guard.acquire().unwrap();
            guard.release(ticket).unwrap();
        }
        done.store(true, Ordering::Relaxed);
        assert!(reader.join().unwrap() > 0);

        let stats = guard.stats().unwrap();
        assert_eq!(stats.acquisitions, 2000);
        assert_eq!(stats.contended, 0);
        assert_eq!(stats.wait_ns, 0);
        assert_eq!(stats.holders, 0);
    }
}
