use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::CodeFilter;
use crate::model::{AirportRecord, AirportSummary};
use crate::storage::{LogEntry, Segment};

const FILTER_CAPACITY: usize = 100_000;
const FILTER_FP_RATE: f64 = 0.01;

/// The document repository the catalog writes airport records to.
///
/// References are assigned by the store on insert and never reused.
pub trait DocumentStore: Send + Sync {
    fn insert(&self, record: AirportRecord) -> Result<Uuid, StoreError>;
    fn get(&self, reference: Uuid) -> Result<Option<AirportRecord>, StoreError>;
    /// Replaces the record. Returns `false` when nothing changed (or the
    /// reference is unknown), in which case nothing is written.
    fn put(&self, reference: Uuid, record: AirportRecord) -> Result<bool, StoreError>;
    fn delete(&self, reference: Uuid) -> Result<bool, StoreError>;
    fn scan(&self) -> Result<Vec<(Uuid, AirportRecord)>, StoreError>;

    /// Projection of every record onto the list-all fields.
    fn scan_summaries(&self) -> Result<Vec<AirportSummary>, StoreError> {
        Ok(self.scan()?.into_iter().map(|(_, r)| r.summary()).collect())
    }

    /// Matches `code` against the iata_code field, then the icao_code field,
    /// then the canonical identifier.
    fn find_by_identifier(&self, code: &str) -> Result<Option<(Uuid, AirportRecord)>, StoreError>;

    fn find_by_canonical(&self, identifier: &str) -> Result<Option<(Uuid, AirportRecord)>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

struct Slot {
    seq: u64,
    record: AirportRecord,
}

struct StoreState {
    records: HashMap<Uuid, Slot>,
    codes: CodeFilter,
    segment: Option<Segment>,
    next_seq: u64,
}

impl StoreState {
    fn empty(segment: Option<Segment>) -> Self {
        Self {
            records: HashMap::new(),
            codes: CodeFilter::new(FILTER_CAPACITY, FILTER_FP_RATE),
            segment,
            next_seq: 0,
        }
    }

    fn apply(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Put { reference, record } => {
                let reference = Uuid::from_u128(reference);
                self.remember_codes(&record);
                match self.records.get_mut(&reference) {
                    Some(slot) => slot.record = record,
                    None => {
                        let seq = self.next_seq;
                        self.next_seq += 1;
                        self.records.insert(reference, Slot { seq, record });
                    }
                }
            }
            LogEntry::Delete { reference } => {
                self.records.remove(&Uuid::from_u128(reference));
            }
        }
    }

    fn log(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        if let Some(segment) = self.segment.as_mut() {
            segment.append(entry)?;
        }
        Ok(())
    }

    fn remember_codes(&mut self, record: &AirportRecord) {
        self.codes.insert(&record.identifier);
        if let Some(code) = &record.iata_code {
            self.codes.insert(code);
        }
        if let Some(code) = &record.icao_code {
            self.codes.insert(code);
        }
    }

    // Earliest inserted record whose field matches.
    fn first_match<F>(&self, pred: F) -> Option<(Uuid, AirportRecord)>
    where
    F: Fn(&AirportRecord) -> bool,
    {
        self.records
        .iter()
        .filter(|(_, slot)| pred(&slot.record))
        .min_by_key(|(_, slot)| slot.seq)
        .map(|(r, slot)| (*r, slot.record.clone()))
    }
}

/// In-memory document store, optionally made durable by an append-only
/// segment that is replayed on open.
pub struct AirportStore {
    state: RwLock<StoreState>,
}

impl AirportStore {
    pub fn in_memory() -> Self {
        Self { state: RwLock::new(StoreState::empty(None)) }
    }

    pub fn open(path: &Path, strict_durability: bool) -> Result<Self, StoreError> {
        let (segment, entries) = Segment::open(path, strict_durability)?;
        let frames = entries.len();
        let mut state = StoreState::empty(Some(segment));
        for entry in entries {
            state.apply(entry);
        }
        info!(path = %path.display(), frames, records = state.records.len(), "Document store opened");
        Ok(Self { state: RwLock::new(state) })
    }

    /// Number of segment frames that no longer describe a live record.
    pub fn dead_entries(&self) -> Result<u64, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let frames = state.segment.as_ref().map(|s| s.frames()).unwrap_or(0);
        Ok(frames.saturating_sub(state.records.len() as u64))
    }

    /// Rewrites the segment with one frame per live record and rebuilds the
    /// code filter so deleted codes stop producing false hits.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;

        let mut live: Vec<(u64, Uuid, AirportRecord)> = state
        .records
        .iter()
        .map(|(r, slot)| (slot.seq, *r, slot.record.clone()))
        .collect();
        live.sort_by_key(|(seq, _, _)| *seq);

        let mut codes = CodeFilter::new(FILTER_CAPACITY, FILTER_FP_RATE);
        for (_, _, record) in &live {
            codes.insert(&record.identifier);
            for code in [&record.iata_code, &record.icao_code].into_iter().flatten() {
                codes.insert(code);
            }
        }
        state.codes = codes;

        if let Some(segment) = state.segment.as_mut() {
            let before = segment.frames();
            segment.rewrite(live.into_iter().map(|(_, r, record)| LogEntry::Put { reference: r.as_u128(), record }))?;
            info!(before, after = segment.frames(), "Segment compacted");
        }
        Ok(())
    }
}

impl DocumentStore for AirportStore {
    fn insert(&self, record: AirportRecord) -> Result<Uuid, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut reference = Uuid::new_v4();
        while state.records.contains_key(&reference) {
            reference = Uuid::new_v4();
        }

        let entry = LogEntry::Put { reference: reference.as_u128(), record };
        state.log(&entry)?;
        state.apply(entry);
        Ok(reference)
    }

    fn get(&self, reference: Uuid) -> Result<Option<AirportRecord>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.records.get(&reference).map(|s| s.record.clone()))
    }

    fn put(&self, reference: Uuid, record: AirportRecord) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        match state.records.get(&reference) {
            Some(slot) if slot.record != record => {}
            _ => return Ok(false),
        }

        let entry = LogEntry::Put { reference: reference.as_u128(), record };
        state.log(&entry)?;
        state.apply(entry);
        Ok(true)
    }

    fn delete(&self, reference: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        if !state.records.contains_key(&reference) {
            return Ok(false);
        }

        let entry = LogEntry::Delete { reference: reference.as_u128() };
        state.log(&entry)?;
        state.apply(entry);
        Ok(true)
    }

    fn scan(&self) -> Result<Vec<(Uuid, AirportRecord)>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut all: Vec<(u64, Uuid, AirportRecord)> = state
        .records
        .iter()
        .map(|(r, slot)| (slot.seq, *r, slot.record.clone()))
        .collect();
        all.sort_by_key(|(seq, _, _)| *seq);
        Ok(all.into_iter().map(|(_, r, record)| (r, record)).collect())
    }

    fn find_by_identifier(&self, code: &str) -> Result<Option<(Uuid, AirportRecord)>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        if !state.codes.might_contain(code) {
            return Ok(None);
        }

        let found = state
        .first_match(|r| r.iata_code.as_deref() == Some(code))
        .or_else(|| state.first_match(|r| r.icao_code.as_deref() == Some(code)))
        .or_else(|| state.first_match(|r| r.identifier == code));
        Ok(found)
    }

    fn find_by_canonical(&self, identifier: &str) -> Result<Option<(Uuid, AirportRecord)>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        if !state.codes.might_contain(identifier) {
            return Ok(None);
        }
        Ok(state.first_match(|r| r.identifier == identifier))
    }

    fn len(&self) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.records.len())
    }
}
