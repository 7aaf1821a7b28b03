//! Debouncing of per-frame recognitions.
//!
//! A single matching frame is not enough to mark someone present: each
//! identity accumulates a hit count and is only confirmed once the count
//! reaches the configured number of frames. Any face that matches nobody
//! wipes every count, so stray partial streaks cannot combine.

use std::collections::HashMap;

/// Outcome of feeding one face observation to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Seen often enough to trust.
    Confirmed { identity: usize, hits: u32 },
    /// Matched, but not yet enough times.
    Pending { identity: usize, hits: u32 },
    /// Matched nobody.
    Unknown,
}

#[derive(Debug)]
pub struct RecognitionTracker {
    required_hits: u32,
    hits: HashMap<usize, u32>,
}

impl RecognitionTracker {
    /// `required_hits` of 0 is treated as 1.
    pub fn new(required_hits: u32) -> Self {
        Self {
            required_hits: required_hits.max(1),
            hits: HashMap::new(),
        }
    }

    /// Record a face that matched `identity`.
    pub fn observe_match(&mut self, identity: usize) -> Verdict {
        let hits = self.hits.entry(identity).or_insert(0);
        *hits = hits.saturating_add(1);
        let hits = *hits;

        if hits >= self.required_hits {
            Verdict::Confirmed { identity, hits }
        } else {
            Verdict::Pending { identity, hits }
        }
    }

    /// Record a face that matched nobody. Every streak starts over.
    pub fn observe_unmatched(&mut self) -> Verdict {
        for hits in self.hits.values_mut() {
            *hits = 0;
        }
        Verdict::Unknown
    }

    pub fn hits(&self, identity: usize) -> u32 {
        self.hits.get(&identity).copied().unwrap_or(0)
    }
}
