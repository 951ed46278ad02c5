use super::{find_in, find_token_in, lock_records, CachedHashRecord, RecordError, RecordStore};
use crate::ContentDigest;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Append-only JSON-lines file, mirrored in memory.
///
/// The whole file is read once at open; each insert appends one line and
/// flushes before the in-memory copy is updated. Lines that do not parse
/// (a torn append after a crash, say) are skipped with a warning.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: Mutex<Vec<CachedHashRecord>>,
    writer: Mutex<Appender>,
}

#[derive(Debug)]
struct Appender {
    file: File,
    /// The file may end mid-line; the next append starts a fresh one.
    torn: bool,
}

impl FileRecordStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut torn = false;

        if path.exists() {
            let contents = std::fs::read(&path)?;
            torn = contents.last().is_some_and(|&b| b != b'\n');
            for (index, line) in contents.split(|&b| b == b'\n').enumerate() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<CachedHashRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(path = %path.display(), line = index + 1, error = %e, "skipping unreadable record");
                        skipped += 1;
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), records = records.len(), skipped, "opened record store");

        Ok(Self { path, records: Mutex::new(records), writer: Mutex::new(Appender { file, torn }) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        lock_records(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for FileRecordStore {
    fn insert(&self, record: CachedHashRecord) -> Result<(), RecordError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        {
            let mut writer = match self.writer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    warn!("record file mutex was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            if writer.torn {
                line.insert(0, '\n');
            }
            // A failed write may leave part of the line behind.
            writer.torn = true;
            writer.file.write_all(line.as_bytes())?;
            writer.file.flush()?;
            writer.torn = false;
        }
        lock_records(&self.records).push(record);
        Ok(())
    }

    fn find(&self, digest: &ContentDigest, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError> {
        Ok(find_in(&lock_records(&self.records), digest, token_id))
    }

    fn find_by_token(&self, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError> {
        Ok(find_token_in(&lock_records(&self.records), token_id, false))
    }

    fn find_confirmed_by_token(&self, token_id: &str) -> Result<Option<CachedHashRecord>, RecordError> {
        Ok(find_token_in(&lock_records(&self.records), token_id, true))
    }
}
