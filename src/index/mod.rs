//! Shard index
//!
//! The storage unit behind each (db, namespace, metric). Appends are
//! buffered and reach a segment on flush; flush deduplicates by record
//! identity, so redelivery of the same record is idempotent. Segments are
//! JSON-lines files under the metric directory and are reloaded on open.

pub(crate) mod eval;

use crate::bit::Bit;
use crate::sql::Expression;
use crate::Result;
use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".jsonl";

/// An inverted-index shard for one metric.
#[derive(Debug)]
pub struct ShardIndex {
    path: PathBuf,
    flushed: HashSet<Bit>,
    pending: Vec<Bit>,
    segment_seq: u64,
}

impl ShardIndex {
    /// Open (or create) the index rooted at `path`, reloading any
    /// persisted segments.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;

        let mut flushed = HashSet::new();
        let mut segment_seq = 0u64;
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(seq) = segment_seq_of(&name) else {
                continue;
            };
            segment_seq = segment_seq.max(seq);

            let reader = BufReader::new(fs::File::open(entry.path())?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Bit>(&line) {
                    Ok(bit) => {
                        flushed.insert(bit);
                    }
                    Err(e) => {
                        warn!(segment = %name, error = %e, "skipping corrupt record");
                    }
                }
            }
        }

        Ok(Self {
            path,
            flushed,
            pending: Vec::new(),
            segment_seq,
        })
    }

    /// Enqueue a record. It becomes visible to reads after the next flush.
    pub fn append(&mut self, bit: Bit) {
        self.pending.push(bit);
    }

    /// Persist pending records, skipping ones already indexed.
    ///
    /// Returns the number of records that reached the new segment.
    pub fn flush(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let fresh: Vec<Bit> = self
            .pending
            .drain(..)
            .filter(|bit| !self.flushed.contains(bit))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        self.segment_seq += 1;
        let segment = self.segment_path(self.segment_seq);
        let mut writer = BufWriter::new(fs::File::create(&segment)?);
        for bit in &fresh {
            serde_json::to_writer(&mut writer, bit)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let written = fresh.len();
        self.flushed.extend(fresh);
        debug!(segment = %segment.display(), records = written, "flushed segment");
        Ok(written)
    }

    /// Remove a record by exact identity, from the pending queue and the
    /// indexed set alike.
    pub fn delete(&mut self, bit: &Bit) -> Result<bool> {
        let pending_before = self.pending.len();
        self.pending.retain(|b| b != bit);
        let removed_pending = self.pending.len() < pending_before;

        let removed_flushed = self.flushed.remove(bit);
        if removed_flushed {
            self.rewrite()?;
        }
        Ok(removed_pending || removed_flushed)
    }

    /// Remove every record matching the condition. Returns how many were
    /// removed from the indexed set.
    pub fn delete_matching(&mut self, condition: &Expression) -> Result<usize> {
        self.pending.retain(|bit| !eval::matches(condition, bit));

        let before = self.flushed.len();
        self.flushed.retain(|bit| !eval::matches(condition, bit));
        let removed = before - self.flushed.len();
        if removed > 0 {
            self.rewrite()?;
        }
        Ok(removed)
    }

    /// Number of indexed records (pending appends excluded).
    pub fn count(&self) -> usize {
        self.flushed.len()
    }

    /// Number of records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Indexed records, in no particular order.
    pub fn bits(&self) -> impl Iterator<Item = &Bit> {
        self.flushed.iter()
    }

    fn segment_path(&self, seq: u64) -> PathBuf {
        self.path
            .join(format!("{SEGMENT_PREFIX}{seq:06}{SEGMENT_SUFFIX}"))
    }

    /// Compact the surviving records into a single fresh segment.
    fn rewrite(&mut self) -> Result<()> {
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if segment_seq_of(&entry.file_name().to_string_lossy()).is_some() {
                fs::remove_file(entry.path())?;
            }
        }

        self.segment_seq += 1;
        if self.flushed.is_empty() {
            return Ok(());
        }
        let segment = self.segment_path(self.segment_seq);
        let mut writer = BufWriter::new(fs::File::create(&segment)?);
        for bit in &self.flushed {
            serde_json::to_writer(&mut writer, bit)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn segment_seq_of(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}
