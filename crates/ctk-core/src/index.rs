use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::IndexError;
use crate::ir::{IrDocument, IrOperation};

/// `format` field of the persisted index.
pub const INDEX_FORMAT: &str = "json";
/// `version` field of the persisted index.
pub const INDEX_VERSION: &str = "1.0";

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);
/// A lock file untouched for this long belongs to a dead writer.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Description words this short or shorter are not indexed.
const MIN_DESCRIPTION_WORD: usize = 3;

/// One searchable operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub service: String,
    pub version: String,
    #[serde(default)]
    pub protocol: String,
    pub operation: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub keywords: BTreeSet<String>,
}

/// Composite key of an [`IndexEntry`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryKey {
    pub service: String,
    pub version: String,
    pub operation: String,
}

impl IndexEntry {
    pub fn from_operation(ir: &IrDocument, op: &IrOperation) -> Self {
        Self {
            service: ir.service.clone(),
            version: ir.version.clone(),
            protocol: ir.protocol.clone(),
            operation: op.operation_id.clone(),
            method: op.method.to_string(),
            path: op.path.clone(),
            description: op.headline().map(str::to_string),
            keywords: keywords(&ir.service, op),
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey {
            service: self.service.clone(),
            version: self.version.clone(),
            operation: self.operation.clone(),
        }
    }

    fn matches(&self, term: &str) -> bool {
        self.keywords.iter().any(|k| k.contains(term))
    }
}

/// Index entries for every operation of a document, in document order.
pub fn entries(ir: &IrDocument) -> Vec<IndexEntry> {
    ir.operations
        .iter()
        .map(|op| IndexEntry::from_operation(ir, op))
        .collect()
}

/// Search tokens of an operation: service words, operation-name words, the
/// method, literal path segments and the longer words of its headline.
pub fn keywords(service: &str, op: &IrOperation) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    words.extend(service.split_whitespace().map(str::to_lowercase));
    words.extend(op.operation_id.split_whitespace().map(str::to_lowercase));
    words.insert(op.method.as_str().to_lowercase());
    words.extend(
        op.path
            .split('/')
            .filter(|s| !s.is_empty() && !s.starts_with('{'))
            .map(str::to_lowercase),
    );
    if let Some(headline) = op.headline() {
        words.extend(
            headline
                .split_whitespace()
                .map(str::to_lowercase)
                .filter(|w| w.chars().count() > MIN_DESCRIPTION_WORD),
        );
    }
    words
}

/// The catalog: entries keyed by (service, version, operation).
///
/// Adding an entry whose key exists replaces it, so merging the same
/// document twice changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<EntryKey, IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    format: String,
    version: String,
    total_operations: usize,
    contracts: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.key(), entry);
    }

    pub fn merge<I: IntoIterator<Item = IndexEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.upsert(entry);
        }
    }

    pub fn add_document(&mut self, ir: &IrDocument) {
        self.merge(entries(ir));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by key.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn get(&self, service: &str, version: &str, operation: &str) -> Option<&IndexEntry> {
        self.entries.get(&EntryKey {
            service: service.to_string(),
            version: version.to_string(),
            operation: operation.to_string(),
        })
    }

    /// Entries whose keywords contain every term (case-insensitive,
    /// substring match), ordered by key. No terms matches everything.
    pub fn search<S: AsRef<str>>(&self, terms: &[S]) -> Vec<&IndexEntry> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.entries
            .values()
            .filter(|entry| terms.iter().all(|t| entry.matches(t)))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let persisted = PersistedIndex {
            format: INDEX_FORMAT.to_string(),
            version: INDEX_VERSION.to_string(),
            total_operations: self.entries.len(),
            contracts: self.entries.values().cloned().collect(),
        };
        serde_json::to_string_pretty(&persisted)
    }

    pub fn from_json(input: &str) -> Result<Self, IndexError> {
        let persisted: PersistedIndex = serde_json::from_str(input)?;
        if persisted.total_operations != persisted.contracts.len() {
            warn!(
                "index declares {} operations but lists {}",
                persisted.total_operations,
                persisted.contracts.len()
            );
        }
        let mut index = Index::new();
        index.merge(persisted.contracts);
        Ok(index)
    }
}

/// An index file on disk.
///
/// Reads are lock-free; [`IndexStore::merge`] holds `<index>.lock` for its
/// read-merge-write cycle and replaces the file atomically. The lock file
/// records its holder's pid and start time, and a lock older than the stale
/// bound is broken.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
    lock_attempts: u32,
    retry_delay: Duration,
    stale_after: Duration,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_attempts: LOCK_ATTEMPTS,
            retry_delay: LOCK_RETRY_DELAY,
            stale_after: LOCK_STALE_AFTER,
        }
    }

    /// Override how long a merge waits for the lock.
    pub fn with_lock_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.lock_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Override the age past which an existing lock is broken.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Load the index; a missing file is an empty index.
    pub fn load(&self) -> Result<Index, IndexError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Index::from_json(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Index::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Merge entries into the stored index under the lock and persist it.
    pub fn merge<I: IntoIterator<Item = IndexEntry>>(&self, entries: I) -> Result<Index, IndexError> {
        let _lock = self.lock()?;
        let mut index = self.load()?;
        index.merge(entries);
        self.write(&index)?;
        debug!(
            "index {} now holds {} operations",
            self.path.display(),
            index.len()
        );
        Ok(index)
    }

    fn write(&self, index: &Index) -> Result<(), IndexError> {
        let content = index.to_json()?;
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }

    fn lock(&self) -> Result<LockGuard, IndexError> {
        let lock_path = self.lock_path();
        if let Some(parent) = non_empty_parent(&lock_path) {
            fs::create_dir_all(parent)?;
        }
        for attempt in 1..=self.lock_attempts {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let guard = LockGuard { path: lock_path };
                    writeln!(file, "pid={} at={}", process::id(), unix_now())?;
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.break_if_stale(&lock_path)? {
                        continue;
                    }
                    debug!(
                        "{} is held, attempt {attempt}/{}",
                        lock_path.display(),
                        self.lock_attempts
                    );
                    if attempt < self.lock_attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(IndexError::IndexLocked(lock_path.display().to_string()))
    }

    /// Remove the lock if it was last written more than `stale_after` ago.
    fn break_if_stale(&self, lock_path: &Path) -> Result<bool, IndexError> {
        let modified = match fs::metadata(lock_path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            // Released between our open and this check.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        let Ok(age) = SystemTime::now().duration_since(modified) else {
            return Ok(false);
        };
        if age < self.stale_after {
            return Ok(false);
        }

        let holder = fs::read_to_string(lock_path).unwrap_or_default();
        warn!(
            "breaking stale lock {} ({}), last written {}s ago",
            lock_path.display(),
            holder.trim(),
            age.as_secs()
        );
        match fs::remove_file(lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to release {}: {e}", self.path.display());
        }
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Write to a temporary file next to `path`, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match non_empty_parent(path) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
