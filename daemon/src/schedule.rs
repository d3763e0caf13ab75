/// Edge-triggered hour-of-day scheduling for update checks.
///
/// Each configured hour owns a latch that is either armed or fired. Observing
/// the hour while armed fires it (one trigger); observing any other hour rearms
/// it. However often [`HourSchedule::observe`] is called, a check fires at most
/// once per continuous stretch of a matching wall-clock hour.
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    Armed,
    Fired,
}

#[derive(Debug, Clone, Default)]
pub struct HourSchedule {
    latches: BTreeMap<u32, Latch>,
}

impl HourSchedule {
    /// Builds a schedule from configured hours. Duplicates collapse into one
    /// latch; hours above 23 are kept but can never match.
    pub fn new(hours: &[u32]) -> Self {
        Self {
            latches: hours.iter().map(|&h| (h, Latch::Armed)).collect(),
        }
    }

    /// Feeds the current hour of day. Returns `true` exactly when a latch moves
    /// from armed to fired.
    pub fn observe(&mut self, hour: u32) -> bool {
        let mut fire = false;
        for (&h, latch) in self.latches.iter_mut() {
            match (*latch, h == hour) {
                (Latch::Armed, true) => {
                    *latch = Latch::Fired;
                    fire = true;
                }
                (Latch::Fired, false) => *latch = Latch::Armed,
                _ => {}
            }
        }
        fire
    }

    /// Replaces the configured hours, keeping the state of hours present in both.
    /// A reload during a matching hour therefore does not trigger a second check.
    pub fn reconfigure(&mut self, hours: &[u32]) {
        let mut next = Self::new(hours);
        for (h, latch) in next.latches.iter_mut() {
            if let Some(prev) = self.latches.get(h) {
                *latch = *prev;
            }
        }
        *self = next;
    }

    pub fn is_empty(&self) -> bool {
        self.latches.is_empty()
    }

    #[cfg(test)]
    pub fn latch(&self, hour: u32) -> Option<Latch> {
        self.latches.get(&hour).copied()
    }
}
