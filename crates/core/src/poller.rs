use std::time::Duration;

use soundboard_store::Store;

use crate::reconcile::LiveTable;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Samples playing instances and publishes their positions to the store.
#[derive(Debug, Clone, Copy)]
pub struct PositionPoller {
    interval: Duration,
}

impl Default for PositionPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PositionPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sample. Paused instances keep their last recorded position.
    /// Returns how many positions were written.
    pub fn tick(&self, live: &LiveTable, store: &Store) -> usize {
        live.iter()
            .filter(|(_, entry)| entry.instance.is_playing())
            .filter(|(id, entry)| store.record_position(*id, entry.instance.position()))
            .count()
    }
}
