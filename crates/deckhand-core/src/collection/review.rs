use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::models::{Card, CardId, CardQueue, CardType, Ease};

/// In-memory review state that lives next to an open collection.
#[derive(Debug, Default)]
pub struct ReviewQueue {
    timers: HashMap<CardId, Instant>,
    generation: u64,
    deferred_reset: Option<CardId>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&mut self, card: CardId) {
        self.timers.insert(card, Instant::now());
    }

    pub fn stop_timer(&mut self, card: CardId) -> Option<Instant> {
        self.timers.remove(&card)
    }

    pub fn timer_started(&self, card: CardId) -> Option<Instant> {
        self.timers.get(&card).copied()
    }

    /// Drops derived queue state; counted so callers can observe that a reset happened.
    pub fn reset(&mut self) {
        self.generation = self.generation.saturating_add(1);
        self.deferred_reset = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Records the one card whose queue position must be re-derived before the next review.
    pub fn defer_reset(&mut self, card: CardId) {
        self.deferred_reset = Some(card);
    }

    pub fn deferred_reset(&self) -> Option<CardId> {
        self.deferred_reset
    }
}

pub fn today() -> i64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    i64::try_from(seconds / 86_400).unwrap_or(i64::MAX)
}

pub(crate) fn apply_answer(card: &mut Card, ease: Ease, today: i64) {
    card.reps = card.reps.saturating_add(1);
    match ease {
        Ease::Again => {
            card.card_type = CardType::Learning;
            card.queue = CardQueue::Learning;
            card.interval = 0;
            card.due = today;
        }
        Ease::Hard | Ease::Good | Ease::Easy => {
            let interval = next_interval(card.interval, ease);
            card.card_type = CardType::Review;
            card.queue = CardQueue::Review;
            card.interval = interval;
            card.due = today.saturating_add(interval);
        }
    }
}

fn next_interval(current: i64, ease: Ease) -> i64 {
    let base = current.max(1);
    let scaled = match ease {
        Ease::Again => 0,
        Ease::Hard => base.saturating_mul(6) / 5,
        Ease::Good => base.saturating_mul(5) / 2,
        Ease::Easy => base.saturating_mul(7) / 2,
    };
    scaled.max(current.saturating_add(1))
}
