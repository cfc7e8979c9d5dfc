//! File-based storage implementation.
//!
//! Each board is a JSON Lines log `<base>/<board>.jsonl`. Accepted segments
//! and removals are appended as records; loading replays them in order.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::history::History;
use crate::segment::{SegmentId, StrokeSegment};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOG_EXTENSION: &str = "jsonl";

/// One line of a board log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Append { segment: StrokeSegment },
    Remove { ids: Vec<SegmentId> },
}

/// File-based storage.
pub struct FileStorage {
    /// Base directory for board logs.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Get the log path for a board name.
    fn board_path(&self, board: &str) -> PathBuf {
        let safe: String = board
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.{}", safe, LOG_EXTENSION))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn encode(records: &[LogRecord]) -> StorageResult<String> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Whether a non-empty log was cut off partway through its last line.
fn ends_mid_record(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn append_records(path: &Path, records: &[LogRecord]) -> StorageResult<()> {
    let mut text = encode(records)?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    // Never glue a record onto a torn line.
    let torn = ends_mid_record(&mut file)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    if torn {
        log::warn!("Log {} ends mid-record, starting a new line", path.display());
        text.insert(0, '\n');
    }
    file.write_all(text.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

/// Replay a board log. Corrupt lines are skipped.
fn replay(path: &Path, text: &str) -> Vec<StrokeSegment> {
    let mut history = History::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(LogRecord::Append { segment }) => {
                history.insert(segment);
            }
            Ok(LogRecord::Remove { ids }) => {
                history.remove_many(&ids);
            }
            Err(e) => log::warn!(
                "Skipping corrupt record {}:{}: {}",
                path.display(),
                index + 1,
                e
            ),
        }
    }
    history.to_vec()
}

impl Storage for FileStorage {
    fn load(&self, board: &str) -> BoxFuture<'_, StorageResult<Vec<StrokeSegment>>> {
        let path = self.board_path(board);
        Box::pin(async move {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => {
                    return Err(StorageError::Io(format!(
                        "Failed to read {}: {}",
                        path.display(),
                        e
                    )));
                }
            };
            Ok(replay(&path, &text))
        })
    }

    fn append_many(
        &self,
        board: &str,
        segments: &[StrokeSegment],
    ) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(board);
        let records: Vec<_> = segments
            .iter()
            .map(|segment| LogRecord::Append {
                segment: segment.clone(),
            })
            .collect();
        Box::pin(async move { append_records(&path, &records) })
    }

    fn remove(&self, board: &str, ids: &[SegmentId]) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(board);
        let record = LogRecord::Remove { ids: ids.to_vec() };
        Box::pin(async move { append_records(&path, &[record]) })
    }

    fn replace(&self, board: &str, segments: &[StrokeSegment]) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.board_path(board);
        let records: Vec<_> = segments
            .iter()
            .map(|segment| LogRecord::Append {
                segment: segment.clone(),
            })
            .collect();
        Box::pin(async move {
            let text = encode(&records)?;
            let tmp = path.with_extension(format!("{}.tmp", LOG_EXTENSION));
            fs::write(&tmp, text).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e))
            })?;
            fs::rename(&tmp, &path).map_err(|e| {
                StorageError::Io(format!("Failed to replace {}: {}", path.display(), e))
            })
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            let entries = match fs::read_dir(&base) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
                Err(e) => {
                    return Err(StorageError::Io(format!("Failed to read directory: {}", e)));
                }
            };

            let mut boards = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == LOG_EXTENSION) {
                    if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                        boards.push(name.to_string());
                    }
                }
            }
            Ok(boards)
        })
    }
}
