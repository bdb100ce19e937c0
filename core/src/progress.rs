use crate::ids::ClientId;
use crate::records::ProgressRecord;

/// Percentage of placed pieces, rounded to two decimals. Exactly 100 only
/// when every piece is placed.
pub fn derived_percent(placed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    if placed >= total {
        return 100.0;
    }
    let scaled = (placed as f64 * 10_000.0 / total as f64).round();
    // never let rounding present an unfinished board as complete
    (scaled / 100.0).min(99.99)
}

/// Merges the locally derived progress with the broadcast scalar into one
/// monotonic display value per board generation.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressAggregator {
    generation: u32,
    placed: usize,
    total: usize,
    broadcast: Option<f64>,
    high_water: f64,
}

impl ProgressAggregator {
    pub fn new(generation: u32, total: usize) -> Self {
        Self {
            generation,
            placed: 0,
            total,
            broadcast: None,
            high_water: 0.0,
        }
    }

    pub fn reset(&mut self, generation: u32, total: usize) {
        *self = Self::new(generation, total);
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn placed(&self) -> usize {
        self.placed
    }

    pub fn derived(&self) -> f64 {
        derived_percent(self.placed, self.total)
    }

    pub fn broadcast(&self) -> Option<f64> {
        self.broadcast
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.placed == self.total
    }

    /// Updates the local count and returns the new display value.
    pub fn set_placed(&mut self, placed: usize) -> f64 {
        self.placed = placed.min(self.total);
        self.refresh()
    }

    /// Applies a broadcast record. Records from another generation are
    /// ignored; returns whether the record was accepted.
    pub fn apply_broadcast(&mut self, record: &ProgressRecord) -> bool {
        if record.generation != self.generation {
            return false;
        }
        let percent = record.percent.clamp(0.0, 100.0);
        self.broadcast = Some(self.broadcast.map_or(percent, |prev| prev.max(percent)));
        self.refresh();
        true
    }

    pub fn display(&self) -> f64 {
        self.high_water
    }

    pub fn record(&self, written_by: ClientId) -> ProgressRecord {
        ProgressRecord {
            generation: self.generation,
            percent: self.derived(),
            written_by,
        }
    }

    fn refresh(&mut self) -> f64 {
        let derived = self.derived();
        let candidate = match self.broadcast {
            Some(broadcast) => broadcast.max(derived),
            None => derived,
        };
        if candidate > self.high_water {
            self.high_water = candidate;
        }
        self.high_water
    }
}
