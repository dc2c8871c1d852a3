//! The authoritative, ordered record of what was drawn in a room.
//!
//! Replaying every entry in order onto a cleared surface reproduces the
//! room's current image. Once the log reaches its threshold it is collapsed
//! into a single `WholeImage` entry carrying the encoded image, which keeps
//! replay cost and memory bounded.

use easel_raster::{Operation, Surface};

/// Default number of entries that triggers compaction.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub author: String,
    pub operation: Operation,
}

#[derive(Debug, Clone)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
    threshold: usize,
}

impl OperationLog {
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: Vec::with_capacity(threshold),
            threshold: threshold.max(1),
        }
    }

    pub fn push(&mut self, author: impl Into<String>, operation: Operation) {
        self.entries.push(LogEntry { author: author.into(), operation });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn needs_compaction(&self) -> bool {
        self.entries.len() >= self.threshold
    }

    /// Collapse the log into one `WholeImage` entry attributed to the last author.
    ///
    /// `encoded` must be the encoding of the surface the current log replays to.
    pub fn compact(&mut self, encoded: String) {
        let author = self
            .entries
            .last()
            .map(|entry| entry.author.clone())
            .unwrap_or_default();
        self.entries.clear();
        self.push(author, Operation::WholeImage { url: encoded });
    }

    /// Clear `surface` and apply every entry in order.
    ///
    /// Entries that fail to apply (an undecodable whole image) are skipped;
    /// returns how many were.
    pub fn replay(&self, surface: &mut Surface) -> usize {
        surface.clear();
        let mut skipped = 0;
        for entry in &self.entries {
            if let Err(e) = surface.apply_operation(&entry.operation) {
                log::warn!(
                    "skipping {} by {:?} during replay: {e}",
                    entry.operation.kind(),
                    entry.author
                );
                skipped += 1;
            }
        }
        skipped
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(DEFAULT_COMPACTION_THRESHOLD)
    }
}
