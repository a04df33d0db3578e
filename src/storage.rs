use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use memmap2::Mmap;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::AirportRecord;

/// One mutation of the document store.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum LogEntry {
    Put { reference: u128, record: AirportRecord },
    Delete { reference: u128 },
}

/// Append-only log file. Frame format: [Length u32 LE][rkyv bytes].
#[derive(Debug)]
pub struct Segment {
    pub file_path: PathBuf,
    file: File,
    current_offset: u64,
    frames: u64,
    strict: bool,
}

impl Segment {
    /// Opens (or creates) the segment and replays every intact frame.
    /// A torn frame at the tail is cut off; a frame that fails validation
    /// anywhere else is reported as corruption.
    pub fn open(path: &Path, strict: bool) -> Result<(Self, Vec<LogEntry>), StoreError> {
        let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;

        let (entries, valid_len) = replay(&file)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "Truncating torn frame at segment tail"
            );
            file.set_len(valid_len)?;
        }

        debug!(path = %path.display(), frames = entries.len(), "Segment replayed");
        let segment = Self {
            file_path: path.to_path_buf(),
            file,
            current_offset: valid_len,
            frames: entries.len() as u64,
            strict,
        };
        Ok((segment, entries))
    }

    pub fn append(&mut self, entry: &LogEntry) -> Result<u64, StoreError> {
        let bytes = rkyv::to_bytes::<_, 4096>(entry)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let start = self.current_offset;
        let mut frame = Vec::with_capacity(4 + bytes.len());
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(&bytes);
        self.file.write_all(&frame)?;
        if self.strict {
            self.file.sync_data()?;
        }

        self.current_offset += frame.len() as u64;
        self.frames += 1;
        Ok(start)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn len_bytes(&self) -> u64 {
        self.current_offset
    }

    /// Writes `entries` into a sibling file and atomically swaps it in.
    pub fn rewrite<I>(&mut self, entries: I) -> Result<(), StoreError>
    where
    I: IntoIterator<Item = LogEntry>,
    {
        let tmp_path = self.file_path.with_extension("compacted");
        let _ = fs::remove_file(&tmp_path);
        {
            let (mut tmp, _) = Segment::open(&tmp_path, false)?;
            for entry in entries {
                tmp.append(&entry)?;
            }
            tmp.file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.file_path)?;

        // Re-open at the original path so the handle points at the new file
        let (fresh, _) = Segment::open(&self.file_path, self.strict)?;
        *self = fresh;
        Ok(())
    }
}

fn replay(file: &File) -> Result<(Vec<LogEntry>, u64), StoreError> {
    if file.metadata()?.len() == 0 {
        return Ok((Vec::new(), 0));
    }
    // SAFETY: the segment is only written through `Segment`, which this
    // process holds exclusively while the map is alive.
    let map = unsafe { Mmap::map(file)? };
    let data = &map[..];

    let mut entries = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        let Some(len_bytes) = data.get(offset..offset + 4) else { break };
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        let Some(body) = data.get(offset + 4..offset + 4 + len) else { break };

        let mut aligned = rkyv::AlignedVec::with_capacity(len);
        aligned.extend_from_slice(body);
        let archived = rkyv::check_archived_root::<LogEntry>(&aligned).map_err(|e| StoreError::Corrupt {
            offset: offset as u64,
            reason: format!("{:?}", e),
        })?;
        let entry: LogEntry = archived.deserialize(&mut rkyv::Infallible).map_err(|e| -> StoreError { match e {} })?;

        entries.push(entry);
        offset += 4 + len;
    }
    Ok((entries, offset as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;
    use std::io::Write as _;

    fn record(code: &str) -> AirportRecord {
        AirportRecord {
            identifier: code.into(),
            iata_code: Some(code.into()),
            icao_code: None,
            name: format!("{} Airport", code),
            city: "Somewhere, Nowhere".into(),
            country: "Nowhere".into(),
            location: Location::point(1.0, 2.0),
            altitude: None,
            timezone: None,
        }
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airports.seg");
        {
            let (mut seg, entries) = Segment::open(&path, true).unwrap();
            assert!(entries.is_empty());
            seg.append(&LogEntry::Put { reference: 7, record: record("JFK") }).unwrap();
            seg.append(&LogEntry::Delete { reference: 7 }).unwrap();
        }

        let (seg, entries) = Segment::open(&path, true).unwrap();
        assert_eq!(seg.frames(), 2);
        assert_eq!(entries[0], LogEntry::Put { reference: 7, record: record("JFK") });
        assert_eq!(entries[1], LogEntry::Delete { reference: 7 });
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airports.seg");
        let good_len = {
            let (mut seg, _) = Segment::open(&path, false).unwrap();
            seg.append(&LogEntry::Put { reference: 1, record: record("LAX") }).unwrap();
            seg.len_bytes()
        };
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&200u32.to_le_bytes()).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }

        let (mut seg, entries) = Segment::open(&path, false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        seg.append(&LogEntry::Delete { reference: 1 }).unwrap();
        let (_, entries) = Segment::open(&path, false).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airports.seg");
        let (mut seg, _) = Segment::open(&path, false).unwrap();
        for i in 0..5u128 {
            seg.append(&LogEntry::Put { reference: i, record: record("ORD") }).unwrap();
        }

        seg.rewrite(vec![LogEntry::Put { reference: 4, record: record("ORD") }]).unwrap();
        assert_eq!(seg.frames(), 1);
        seg.append(&LogEntry::Delete { reference: 4 }).unwrap();

        let (_, entries) = Segment::open(&path, false).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!path.with_extension("compacted").exists());
    }
}
