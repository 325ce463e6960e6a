use crate::error::Result;
use crate::store::{Position, RecordStore};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct MemoryLog {
    records: VecDeque<(Position, String)>,
    next: u64,
    boundary: u64,
}

/// In-memory implementation of record storage
///
/// Same contract as the file-backed store minus durability: records vanish
/// with the process. Intended for tests and ephemeral deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    log: Arc<Mutex<MemoryLog>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        debug!("Initializing in-memory record store");
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn put(&self, record: &str) -> Result<Position> {
        let mut log = self.log.lock();
        let pos = Position::new(log.next);
        log.next += 1;
        log.records.push_back((pos, record.to_string()));

        trace!(position = %pos, bytes = record.len(), "Appended record to memory");
        Ok(pos)
    }

    fn read_from(&self, pos: Position) -> Option<(Position, String)> {
        let log = self.log.lock();
        let idx = log.records.partition_point(|(p, _)| *p < pos);
        log.records.get(idx).cloned()
    }

    fn read_boundary(&self) -> Position {
        Position::new(self.log.lock().boundary)
    }

    fn mark_read(&self, upto: Position) -> Result<()> {
        let mut log = self.log.lock();
        if upto.get() > log.boundary {
            log.boundary = upto.get();
            trace!(boundary = %upto, "Advanced read boundary");
        }
        Ok(())
    }

    fn compact(&self) -> Result<u64> {
        let mut log = self.log.lock();
        let boundary = log.boundary;
        let before = log.records.len();
        while log
            .records
            .front()
            .is_some_and(|(p, _)| p.get() < boundary)
        {
            log.records.pop_front();
        }
        let removed = (before - log.records.len()) as u64;

        if removed > 0 {
            debug!(removed, boundary, "Compacted in-memory record log");
        }
        Ok(removed)
    }

    fn wipe(&self) -> Result<u64> {
        let mut log = self.log.lock();
        let removed = log.records.len() as u64;
        log.records.clear();

        debug!(removed, "Wiped in-memory record log");
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    fn next_position(&self) -> Position {
        Position::new(self.log.lock().next)
    }
}
