use crate::config::ScoringRules;

/// Per-client counters. Never replicated; only the final score leaves the
/// process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientGameStats {
    pub move_count: u32,
    pub accurate_drops: u32,
    pub points: u64,
    pub combo_count: u32,
    pub session_start: i64,
    pub last_placement_at: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementScore {
    pub awarded: u64,
    pub quick: bool,
    pub combo_count: u32,
}

#[derive(Clone, Debug)]
pub struct ScoringEngine {
    rules: ScoringRules,
    stats: ClientGameStats,
}

impl ScoringEngine {
    pub fn new(rules: ScoringRules, session_start: i64) -> Self {
        Self {
            rules,
            stats: ClientGameStats {
                session_start,
                ..ClientGameStats::default()
            },
        }
    }

    pub fn reset(&mut self, session_start: i64) {
        self.stats = ClientGameStats {
            session_start,
            ..ClientGameStats::default()
        };
    }

    pub fn stats(&self) -> &ClientGameStats {
        &self.stats
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    /// A drop that did not snap.
    pub fn record_miss(&mut self) {
        self.stats.move_count = self.stats.move_count.saturating_add(1);
    }

    pub fn record_placement(&mut self, drag_started_at: i64, now: i64) -> PlacementScore {
        let stats = &mut self.stats;
        stats.move_count = stats.move_count.saturating_add(1);
        stats.accurate_drops = stats.accurate_drops.saturating_add(1);

        let mut awarded = self.rules.accurate_placement_base;
        let drag_ms = elapsed_ms(drag_started_at, now);
        let quick = drag_ms < self.rules.quick_placement_ms;
        if quick {
            awarded += self.rules.quick_placement_bonus;
        }

        let in_window = stats
            .last_placement_at
            .map(|last| elapsed_ms(last, now) < self.rules.combo_window_ms)
            .unwrap_or(false);
        if in_window {
            stats.combo_count = stats.combo_count.saturating_add(1);
            awarded += self.rules.combo_base * stats.combo_count as u64;
        } else {
            stats.combo_count = 0;
        }
        stats.last_placement_at = Some(now);
        stats.points += awarded;

        PlacementScore {
            awarded,
            quick,
            combo_count: stats.combo_count,
        }
    }

    pub fn time_bonus(&self, total_elapsed_ms: u64) -> u64 {
        let elapsed_s = total_elapsed_ms / 1_000;
        self.rules
            .time_bonus_max
            .saturating_sub(elapsed_s.saturating_mul(self.rules.time_bonus_decay_per_s))
    }

    pub fn accuracy_bonus(&self) -> u64 {
        if self.stats.move_count == 0 {
            return 0;
        }
        let ratio = self.stats.accurate_drops as f64 / self.stats.move_count as f64;
        (ratio * self.rules.accuracy_bonus_max as f64).round() as u64
    }

    pub fn final_score(&self, total_elapsed_ms: u64) -> u64 {
        self.stats.points
            + self.rules.completion_bonus
            + self.time_bonus(total_elapsed_ms)
            + self.accuracy_bonus()
    }
}

fn elapsed_ms(from: i64, to: i64) -> u64 {
    to.saturating_sub(from).max(0) as u64
}
