//! Cooperative scheduler for timer ticks and DMA steps.
//!
//! Every event owns a single slot: scheduling an event that is already pending
//! moves it, cancelling it frees the slot at once. Events are delivered one at a
//! time in due-time order; events due at the same time come out in the order
//! they were scheduled.

use serde::{Deserialize, Serialize};

use crate::registers::TIMER_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Timer(usize),
    Dma,
}

impl Event {
    const fn slot(self) -> usize {
        match self {
            Self::Timer(id) => id,
            Self::Dma => TIMER_COUNT,
        }
    }

    const fn from_slot(slot: usize) -> Self {
        if slot < TIMER_COUNT {
            Self::Timer(slot)
        } else {
            Self::Dma
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    due: u64,
    /// Interval between deliveries, `None` for a one-off event.
    period: Option<u64>,
    /// Scheduling order, breaks ties between events due together.
    sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheduler {
    /// Current time in nanoseconds.
    now: u64,
    sequence: u64,
    slots: [Option<Slot>; TIMER_COUNT + 1],
}

impl Scheduler {
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Schedules `event` after `delay`, then every `period` if one is given.
    pub fn schedule(&mut self, event: Event, delay: u64, period: Option<u64>) {
        self.sequence += 1;
        self.slots[event.slot()] = Some(Slot {
            due: self.now.saturating_add(delay),
            period,
            sequence: self.sequence,
        });
    }

    pub fn cancel(&mut self, event: Event) {
        self.slots[event.slot()] = None;
    }

    #[must_use]
    pub const fn is_scheduled(&self, event: Event) -> bool {
        self.slots[event.slot()].is_some()
    }

    /// Removes and returns the next event due at or before `limit`, advancing
    /// the clock to its due time. Periodic events are put back one period later.
    pub fn pop_due(&mut self, limit: u64) -> Option<Event> {
        let (index, slot) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|slot| (index, slot)))
            .filter(|(_, slot)| slot.due <= limit)
            .min_by_key(|(_, slot)| (slot.due, slot.sequence))?;

        self.now = slot.due;
        let next = slot.period.map(|period| {
            self.sequence += 1;
            Slot {
                due: slot.due.saturating_add(period),
                period: Some(period),
                sequence: self.sequence,
            }
        });
        self.slots[index] = next;

        Some(Event::from_slot(index))
    }

    /// Moves the clock forward once every event up to `time` has been delivered.
    pub fn advance_to(&mut self, time: u64) {
        self.now = self.now.max(time);
    }

    pub fn clear(&mut self) {
        self.slots = [None; TIMER_COUNT + 1];
    }
}
