use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

#[cfg(test)]
use std::io;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::AppConfig;
#[cfg(test)]
use crate::errors::AppError;
use crate::errors::AppResult;

pub const JOURNAL_FILE_NAME: &str = "ingest-journal.jsonl";
const ROLLED_PREFIX: &str = "ingest-journal-";

/// Append-only JSONL record of a run: stage boundaries, table loads and
/// rejected batches. Events queue in memory until `flush`.
#[derive(Clone)]
pub struct RunJournal {
    run_id: String,
    queue: Arc<Mutex<Vec<JournalEvent>>>,
    path: PathBuf,
    max_file_bytes: u64,
    max_file_count: usize,
    #[cfg(test)]
    write_faults: Option<Arc<WriteFaults>>,
}

impl RunJournal {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(
            &config.journal_dir,
            config.journal_max_bytes,
            config.journal_max_files,
        )
    }

    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_file_bytes: u64,
        max_file_count: usize,
    ) -> AppResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE_NAME);
        OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            run_id: Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string(),
            queue: Arc::new(Mutex::new(Vec::new())),
            path,
            max_file_bytes,
            max_file_count: max_file_count.max(1),
            #[cfg(test)]
            write_faults: None,
        })
    }

    pub fn record(&self, name: impl Into<String>, payload: serde_json::Value) {
        let event = JournalEvent {
            run_id: self.run_id.clone(),
            name: name.into(),
            timestamp: Utc::now(),
            payload,
        };
        self.queue.lock().push(event);
    }

    /// A batch the loader rolled back. Rows are counted, not copied.
    pub fn record_rejected_batch(&self, table: &str, batch_index: usize, rows: usize, error: &str) {
        self.record(
            "batch_rejected",
            json!({
                "table": table,
                "batch_index": batch_index,
                "rows": rows,
                "error": error,
            }),
        );
    }

    /// A row that still failed on its own after reprocessing.
    pub fn record_rejected_row<R: Serialize>(
        &self,
        table: &str,
        batch_index: usize,
        error: &str,
        row: &R,
    ) {
        self.record(
            "row_rejected",
            json!({
                "table": table,
                "batch_index": batch_index,
                "error": error,
                "row": serde_json::to_value(row).unwrap_or_default(),
            }),
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Writes queued events. On failure the events stay queued.
    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::new();
        for event in queue.iter() {
            serde_json::to_writer(&mut buffer, event)?;
            buffer.push(b'\n');
        }
        self.append(&buffer)?;
        queue.clear();
        Ok(())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, buffer: &[u8]) -> AppResult<()> {
        let written = fs::metadata(&self.path).map(|meta| meta.len()).unwrap_or(0);
        if written > 0 && written + buffer.len() as u64 > self.max_file_bytes {
            self.roll_over()?;
        }

        #[cfg(test)]
        if self.write_faults.as_ref().is_some_and(|faults| faults.take()) {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::Other,
                "journal write refused",
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buffer)?;
        file.flush()?;
        Ok(())
    }

    /// Moves the live file aside as `ingest-journal-<stamp>.jsonl` and starts
    /// an empty one. With a single-file budget the live file is truncated.
    fn roll_over(&self) -> AppResult<()> {
        if self.max_file_count > 1 {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.9f");
            let rolled = self
                .path
                .with_file_name(format!("{ROLLED_PREFIX}{stamp}.jsonl"));
            fs::rename(&self.path, rolled)?;
            self.retain_newest(self.max_file_count - 1)?;
        }
        fs::File::create(&self.path)?;
        Ok(())
    }

    fn retain_newest(&self, keep: usize) -> AppResult<()> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        let mut rolled = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(ROLLED_PREFIX))
            })
            .collect::<Vec<_>>();

        // Newest first; stamps sort lexically.
        rolled.sort_unstable_by(|a, b| b.cmp(a));
        for stale in rolled.into_iter().skip(keep) {
            if let Err(err) = fs::remove_file(&stale) {
                tracing::debug!(?err, path = %stale.display(), "could not prune journal file");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct JournalEvent {
    pub run_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Makes the next journal write fail once.
#[cfg(test)]
#[derive(Default)]
pub struct WriteFaults {
    armed: AtomicBool,
}

#[cfg(test)]
impl WriteFaults {
    pub fn fail_next_write(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RunJournal {
    pub fn inject_write_faults(&mut self) -> Arc<WriteFaults> {
        let faults = Arc::new(WriteFaults::default());
        self.write_faults = Some(faults.clone());
        faults
    }
}
