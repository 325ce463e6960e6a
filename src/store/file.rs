//! File-backed record storage
//!
//! Records live in a single append-only log file of CRC-checked frames:
//!
//! ```text
//! [position: u64 BE][len: u32 BE][crc32(payload): u32 BE][payload bytes]
//! ```
//!
//! Appends are flushed (and fsynced, by default) before `put` returns, so an
//! `Ok` means the record survives a crash. Compaction rewrites the surviving
//! suffix to a temporary file and renames it over the log, so a crash at any
//! point leaves either the old log or the new one, never a mix. A torn frame
//! at the tail of the log is the signature of a crash during an
//! unacknowledged append and is truncated away on open; corruption anywhere
//! else fails the open rather than silently dropping records.

use crate::error::{Result, StoreError};
use crate::store::{Position, RecordStore};
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, trace, warn};

const LOG_FILE: &str = "records.log";
const TMP_FILE: &str = "records.log.tmp";
const META_FILE: &str = "meta.json";

/// Bytes of frame header preceding each payload: position + length + crc32
const FRAME_HEADER_LEN: u64 = 8 + 4 + 4;

/// When to fsync the log after an append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsyncMode {
    /// fsync before every `put` returns; an `Ok` is crash-durable
    #[default]
    Always,
    /// Leave flushing to the OS; a crash may lose acknowledged records
    Never,
}

/// What to do when an append would exceed `max_storage_bytes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityPolicy {
    /// Fail the `put` and leave the log as-is
    #[default]
    Reject,
    /// Drop oldest records, read or not, until the new record fits.
    ///
    /// Sacrifices the at-least-once guarantee for bounded storage; every
    /// eviction is logged.
    EvictOldest,
}

/// Configuration for [`FileRecordStore`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Directory holding the record log
    pub dir: PathBuf,

    /// Maximum size of a single record payload (bytes)
    pub max_record_bytes: usize,

    /// Total on-disk budget for the log file; `None` leaves growth to an
    /// external quota policy
    pub max_storage_bytes: Option<u64>,

    /// Behavior when `max_storage_bytes` would be exceeded
    pub capacity: CapacityPolicy,

    /// Append durability mode
    pub fsync: FsyncMode,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/record-spool"),
            max_record_bytes: 4 * 1024 * 1024,
            max_storage_bytes: None,
            capacity: CapacityPolicy::Reject,
            fsync: FsyncMode::Always,
        }
    }
}

impl FileStoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_record_bytes == 0 {
            return Err(StoreError::Config(
                "max_record_bytes must be non-zero".to_string(),
            ));
        }
        if self.max_record_bytes > u32::MAX as usize {
            return Err(StoreError::Config(format!(
                "max_record_bytes {} exceeds the u32 frame encoding limit",
                self.max_record_bytes
            )));
        }
        if let Some(limit) = self.max_storage_bytes {
            if limit < FRAME_HEADER_LEN {
                return Err(StoreError::Config(format!(
                    "max_storage_bytes {} cannot hold a single frame header",
                    limit
                )));
            }
        }
        Ok(())
    }
}

/// Sidecar metadata keeping `next_position` recoverable when the log is empty
#[derive(Debug, Default, Serialize, Deserialize)]
struct SpoolMeta {
    next_position: u64,
}

#[derive(Debug)]
struct LogState {
    file: File,
    file_len: u64,
    records: VecDeque<(Position, String)>,
    next: u64,
    boundary: u64,
}

/// Durable file-backed implementation of record storage
#[derive(Debug)]
pub struct FileRecordStore {
    config: FileStoreConfig,
    state: Mutex<LogState>,
}

impl FileRecordStore {
    /// Open or create a record log at `config.dir`.
    ///
    /// Scans the log to rebuild the committed record set. Fails with
    /// [`StoreError::Corrupt`] if any interior frame cannot be parsed back
    /// into a record; a torn frame at the tail is truncated away instead.
    pub fn open(config: FileStoreConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir)?;

        // A leftover tmp file means a compaction died before its rename; the
        // log file is still the authoritative copy.
        let tmp_path = config.dir.join(TMP_FILE);
        if tmp_path.exists() {
            debug!(path = %tmp_path.display(), "Removing stale compaction tmp file");
            fs::remove_file(&tmp_path)?;
        }

        let meta = Self::load_meta(&config)?;
        let log_path = config.dir.join(LOG_FILE);
        let (records, scanned_len) = Self::scan_log(&config, &log_path)?;

        let next = records
            .back()
            .map(|(pos, _)| pos.get() + 1)
            .unwrap_or(0)
            .max(meta.next_position);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        info!(
            dir = %config.dir.display(),
            records = records.len(),
            next_position = next,
            "Opened file record store"
        );

        Ok(Self {
            config,
            state: Mutex::new(LogState {
                file,
                file_len: scanned_len,
                records,
                next,
                boundary: 0,
            }),
        })
    }

    fn load_meta(config: &FileStoreConfig) -> Result<SpoolMeta> {
        let meta_path = config.dir.join(META_FILE);
        if !meta_path.exists() {
            return Ok(SpoolMeta::default());
        }
        let data = fs::read_to_string(&meta_path)?;
        serde_json::from_str(&data)
            .map_err(|e| StoreError::corrupt(0, format!("failed to parse {}: {}", META_FILE, e)))
    }

    fn write_meta_locked(&self, state: &LogState) -> Result<()> {
        let meta = SpoolMeta {
            next_position: state.next,
        };
        let data = serde_json::to_string(&meta)
            .map_err(|e| StoreError::AppendFailed(format!("failed to serialize meta: {}", e)))?;
        fs::write(self.config.dir.join(META_FILE), data)?;
        Ok(())
    }

    /// Parse every frame of the log, truncating a torn tail if present.
    fn scan_log(
        config: &FileStoreConfig,
        log_path: &std::path::Path,
    ) -> Result<(VecDeque<(Position, String)>, u64)> {
        let data = match fs::read(log_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((VecDeque::new(), 0))
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = VecDeque::new();
        let mut offset = 0usize;
        let mut last_pos: Option<u64> = None;
        let mut torn = false;

        while offset < data.len() {
            let remaining = &data[offset..];
            if remaining.len() < FRAME_HEADER_LEN as usize {
                torn = true;
                break;
            }

            let pos = u64::from_be_bytes(remaining[0..8].try_into().unwrap());
            let len = u32::from_be_bytes(remaining[8..12].try_into().unwrap()) as usize;
            let crc = u32::from_be_bytes(remaining[12..16].try_into().unwrap());

            if len > config.max_record_bytes {
                return Err(StoreError::corrupt(
                    offset as u64,
                    format!(
                        "frame length {} exceeds max_record_bytes {}",
                        len, config.max_record_bytes
                    ),
                ));
            }
            if let Some(prev) = last_pos {
                if pos <= prev {
                    return Err(StoreError::corrupt(
                        offset as u64,
                        format!("position {} not above predecessor {}", pos, prev),
                    ));
                }
            }

            let payload_start = FRAME_HEADER_LEN as usize;
            if remaining.len() < payload_start + len {
                torn = true;
                break;
            }

            let payload = &remaining[payload_start..payload_start + len];
            if crc32fast::hash(payload) != crc {
                return Err(StoreError::corrupt(
                    offset as u64,
                    "payload crc mismatch".to_string(),
                ));
            }
            let record = std::str::from_utf8(payload)
                .map_err(|e| {
                    StoreError::corrupt(offset as u64, format!("payload is not utf-8: {}", e))
                })?
                .to_string();

            records.push_back((Position::new(pos), record));
            last_pos = Some(pos);
            offset += payload_start + len;
        }

        if torn {
            let dropped = data.len() - offset;
            warn!(
                offset,
                dropped_bytes = dropped,
                "Truncating torn frame at log tail (crash during unacknowledged append)"
            );
            let file = OpenOptions::new().write(true).open(log_path)?;
            file.set_len(offset as u64)?;
            file.sync_data()?;
        }

        Ok((records, offset as u64))
    }

    fn encode_frame(buf: &mut BytesMut, pos: Position, record: &str) {
        buf.put_u64(pos.get());
        buf.put_u32(record.len() as u32);
        buf.put_u32(crc32fast::hash(record.as_bytes()));
        buf.put_slice(record.as_bytes());
    }

    fn frame_len(record: &str) -> u64 {
        FRAME_HEADER_LEN + record.len() as u64
    }

    /// Rewrite the log without its `drop_count` oldest records.
    ///
    /// tmp -> sync -> close -> rename, so the swap is atomic and the handle
    /// is released before the rename (required on Windows). The meta sidecar
    /// is written first: if the rewrite empties the log and the process dies,
    /// `next_position` must still be recoverable.
    fn rewrite_locked(&self, state: &mut LogState, drop_count: usize) -> Result<u64> {
        self.write_meta_locked(state)?;

        let mut buf = BytesMut::new();
        for (pos, record) in state.records.iter().skip(drop_count) {
            Self::encode_frame(&mut buf, *pos, record);
        }

        let tmp_path = self.config.dir.join(TMP_FILE);
        let log_path = self.config.dir.join(LOG_FILE);
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_data()?;
        }
        fs::rename(&tmp_path, &log_path)?;
        self.sync_dir()?;

        state.file = OpenOptions::new().append(true).open(&log_path)?;
        state.file_len = buf.len() as u64;
        for _ in 0..drop_count {
            state.records.pop_front();
        }
        Ok(drop_count as u64)
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> Result<()> {
        File::open(&self.config.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> Result<()> {
        Ok(())
    }

    /// Make room for `frame_len` more bytes under the configured budget.
    fn enforce_capacity_locked(&self, state: &mut LogState, frame_len: u64) -> Result<()> {
        let Some(limit) = self.config.max_storage_bytes else {
            return Ok(());
        };
        if state.file_len + frame_len <= limit {
            return Ok(());
        }

        match self.config.capacity {
            CapacityPolicy::Reject => Err(StoreError::CapacityExceeded {
                needed: state.file_len + frame_len,
                limit,
            }),
            CapacityPolicy::EvictOldest => {
                let mut reclaimed = 0u64;
                let mut drop_count = 0usize;
                for (_, record) in state.records.iter() {
                    if state.file_len - reclaimed + frame_len <= limit {
                        break;
                    }
                    reclaimed += Self::frame_len(record);
                    drop_count += 1;
                }
                if state.file_len - reclaimed + frame_len > limit {
                    return Err(StoreError::CapacityExceeded {
                        needed: frame_len,
                        limit,
                    });
                }

                warn!(
                    evicted = drop_count,
                    reclaimed_bytes = reclaimed,
                    "Evicting oldest records to stay within storage budget"
                );
                self.rewrite_locked(state, drop_count)?;
                Ok(())
            }
        }
    }
}

impl RecordStore for FileRecordStore {
    fn put(&self, record: &str) -> Result<Position> {
        if record.len() > self.config.max_record_bytes {
            return Err(StoreError::RecordTooLarge {
                size: record.len(),
                limit: self.config.max_record_bytes,
            });
        }

        let mut state = self.state.lock();
        self.enforce_capacity_locked(&mut state, Self::frame_len(record))?;

        let pos = Position::new(state.next);
        let mut buf = BytesMut::with_capacity(Self::frame_len(record) as usize);
        Self::encode_frame(&mut buf, pos, record);

        let committed_len = state.file_len;
        let write_result = state
            .file
            .write_all(&buf)
            .and_then(|_| match self.config.fsync {
                FsyncMode::Always => state.file.sync_data(),
                FsyncMode::Never => Ok(()),
            });
        if let Err(e) = write_result {
            // Roll the partial frame back so it can never be observed by a
            // later scan; if the truncate fails too, the torn-tail recovery
            // on the next open drops it.
            if let Err(trunc_err) = state.file.set_len(committed_len) {
                warn!(error = %trunc_err, "Failed to truncate partial append");
            }
            return Err(e.into());
        }

        state.file_len += buf.len() as u64;
        state.next += 1;
        state.records.push_back((pos, record.to_string()));

        trace!(position = %pos, bytes = record.len(), "Appended record to log");
        Ok(pos)
    }

    fn read_from(&self, pos: Position) -> Option<(Position, String)> {
        let state = self.state.lock();
        let idx = state.records.partition_point(|(p, _)| *p < pos);
        state.records.get(idx).cloned()
    }

    fn read_boundary(&self) -> Position {
        Position::new(self.state.lock().boundary)
    }

    fn mark_read(&self, upto: Position) -> Result<()> {
        let mut state = self.state.lock();
        if upto.get() > state.boundary {
            state.boundary = upto.get();
            trace!(boundary = %upto, "Advanced read boundary");
        }
        Ok(())
    }

    fn compact(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let boundary = state.boundary;
        let drop_count = state
            .records
            .partition_point(|(p, _)| p.get() < boundary);
        if drop_count == 0 {
            return Ok(0);
        }

        let removed = self.rewrite_locked(&mut state, drop_count)?;
        debug!(removed, boundary, "Compacted record log");
        Ok(removed)
    }

    fn wipe(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let drop_count = state.records.len();
        let removed = self.rewrite_locked(&mut state, drop_count)?;

        debug!(removed, "Wiped record log");
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    fn next_position(&self) -> Position {
        Position::new(self.state.lock().next)
    }
}

impl Drop for FileRecordStore {
    fn drop(&mut self) {
        // Keep next_position recoverable even if the log is empty at exit.
        let state = self.state.lock();
        if let Err(e) = self.write_meta_locked(&state) {
            warn!(error = %e, "Failed to write spool meta on drop");
        }
    }
}
