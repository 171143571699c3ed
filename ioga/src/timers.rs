//! # Timer bank
//!
//! | Timer | Clock              | Register layout                          | Source |
//! |-------|--------------------|------------------------------------------|--------|
//! | 0     | heartbeat (60 Hz)  | tick counter, always running             | 14     |
//! | 1     | prescaler          | count 0-15, start 16, expired 17         | 15     |
//! | 2     | prescaler          | count 0-29, start 30, expired 31         | 0      |
//! | 3     | 25 MHz             | count 0-29, start 30, expired 31         | 1      |
//!
//! Timers 1-3 are one-shot: armed by writing the start bit, they tick once
//! immediately and then once per interval, and stop with the expired latch set
//! when the count reaches zero.

use serde::{Deserialize, Serialize};

use crate::config::IogaConfig;
use crate::error::IogaError;
use crate::registers::{
    IRQ_TIMER0, IRQ_TIMER1, IRQ_TIMER2, IRQ_TIMER3, TIMER_COUNT, TIMER1_EXPIRED, TIMER1_START,
    TIMER1_VMASK, TIMER3_EXPIRED, TIMER3_START, TIMER3_VMASK,
};
use crate::scheduler::{Event, Scheduler};

/// Count field and status bits of a one-shot timer register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    value_mask: u32,
    start: u32,
    expired: u32,
}

const TIMER1_LAYOUT: Layout = Layout {
    value_mask: TIMER1_VMASK,
    start: TIMER1_START,
    expired: TIMER1_EXPIRED,
};

const TIMER3_LAYOUT: Layout = Layout {
    value_mask: TIMER3_VMASK,
    start: TIMER3_START,
    expired: TIMER3_EXPIRED,
};

const fn layout(timer: usize) -> Option<Layout> {
    match timer {
        1 => Some(TIMER1_LAYOUT),
        2 | 3 => Some(TIMER3_LAYOUT),
        _ => None,
    }
}

const fn interrupt_source(timer: usize) -> usize {
    match timer {
        0 => IRQ_TIMER0,
        1 => IRQ_TIMER1,
        2 => IRQ_TIMER2,
        _ => IRQ_TIMER3,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    count: u32,
    running: bool,
    expired: bool,
}

impl TimerState {
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub const fn running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn expired(&self) -> bool {
        self.expired
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerBank {
    prescaler: u32,
    timers: [TimerState; TIMER_COUNT],
}

impl TimerBank {
    /// Stops timers 1-3, keeping their counts, and restarts the heartbeat
    /// from now.
    pub fn reset(&mut self, config: &IogaConfig, scheduler: &mut Scheduler) {
        for (id, state) in self.timers.iter_mut().enumerate() {
            scheduler.cancel(Event::Timer(id));
            state.running = false;
            state.expired = false;
        }
        self.timers[0] = TimerState {
            running: true,
            ..TimerState::default()
        };

        scheduler.schedule(Event::Timer(0), 0, Some(config.heartbeat_period()));
    }

    /// # Errors
    ///
    /// Returns [`IogaError::InvalidTimer`] if `timer` is out of range.
    pub fn state(&self, timer: usize) -> Result<&TimerState, IogaError> {
        self.timers.get(timer).ok_or(IogaError::InvalidTimer(timer))
    }

    #[must_use]
    pub const fn prescaler(&self) -> u32 {
        self.prescaler
    }

    /// Takes effect the next time a prescaler-clocked timer is armed.
    pub fn write_prescaler(&mut self, value: u32) {
        self.prescaler = value;
    }

    fn period(&self, timer: usize, config: &IogaConfig) -> u64 {
        match timer {
            0 => config.heartbeat_period(),
            1 | 2 => config.prescaled_period(self.prescaler),
            _ => config.timer3_period(),
        }
    }

    /// Timer register write. With the start bit set the timer is (re)armed
    /// with the written count, without it the timer stops and keeps the count.
    ///
    /// # Errors
    ///
    /// Returns [`IogaError::InvalidTimer`] if `timer` is out of range.
    pub fn write_control(
        &mut self,
        timer: usize,
        value: u32,
        config: &IogaConfig,
        scheduler: &mut Scheduler,
    ) -> Result<(), IogaError> {
        if timer >= TIMER_COUNT {
            return Err(IogaError::InvalidTimer(timer));
        }

        let Some(layout) = layout(timer) else {
            // heartbeat: the written value reloads the tick counter
            self.timers[timer].count = value;
            return Ok(());
        };

        // stop first so a pending tick can't land while the count changes
        scheduler.cancel(Event::Timer(timer));
        let state = &mut self.timers[timer];
        state.running = false;
        state.count = value & layout.value_mask;

        if value & layout.start != 0 {
            let period = self.period(timer, config);
            let state = &mut self.timers[timer];
            state.running = true;
            state.expired = false;
            scheduler.schedule(Event::Timer(timer), 0, Some(period));

            tracing::debug!(timer, count = state.count, period, "timer: started");
        } else {
            tracing::debug!(timer, count = state.count, "timer: stopped");
        }

        Ok(())
    }

    /// Count, with the start bit while running or the expired bit once it ran out.
    ///
    /// # Errors
    ///
    /// Returns [`IogaError::InvalidTimer`] if `timer` is out of range.
    pub fn read_status(&self, timer: usize) -> Result<u32, IogaError> {
        let state = self.state(timer)?;

        let Some(layout) = layout(timer) else {
            return Ok(state.count);
        };

        let mut result = state.count & layout.value_mask;
        if state.running {
            result |= layout.start;
        } else if state.expired {
            result |= layout.expired;
        }

        Ok(result)
    }

    /// Scheduled tick of `timer`. Returns the interrupt source to raise, if any.
    pub fn on_tick(&mut self, timer: usize, scheduler: &mut Scheduler) -> Option<usize> {
        let state = self.timers.get_mut(timer)?;

        let Some(layout) = layout(timer) else {
            state.count = state.count.wrapping_add(1);
            return Some(interrupt_source(timer));
        };

        if !state.running {
            return None;
        }

        state.count = state.count.wrapping_sub(1) & layout.value_mask;
        tracing::trace!(timer, count = state.count, "timer: tick");

        if state.count != 0 {
            return None;
        }

        state.running = false;
        state.expired = true;
        scheduler.cancel(Event::Timer(timer));
        tracing::debug!(timer, "timer: expired");

        Some(interrupt_source(timer))
    }
}
