use serde::{Deserialize, Serialize};

/// Clock rates of the gate array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IogaConfig {
    /// Rate of the heartbeat timer (timer 0).
    pub heartbeat_hz: u64,

    /// Input clock of timer 3.
    pub timer3_clock_hz: u64,

    /// Timers 1 and 2 tick every `(prescaler & 0x7fff) / prescaler_divisor` microseconds.
    pub prescaler_divisor: u64,

    /// Delay between two DMA byte transfers.
    pub dma_step_ns: u64,
}

impl Default for IogaConfig {
    fn default() -> Self {
        Self {
            heartbeat_hz: 60,
            timer3_clock_hz: 25_000_000,
            prescaler_divisor: 50,
            dma_step_ns: 1,
        }
    }
}

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

impl IogaConfig {
    #[must_use]
    pub const fn heartbeat_period(&self) -> u64 {
        period_from_hz(self.heartbeat_hz)
    }

    #[must_use]
    pub const fn timer3_period(&self) -> u64 {
        period_from_hz(self.timer3_clock_hz)
    }

    /// Tick interval of the prescaler-clocked timers.
    #[must_use]
    pub const fn prescaled_period(&self, prescaler: u32) -> u64 {
        let divisor = if self.prescaler_divisor == 0 { 1 } else { self.prescaler_divisor };
        let micros = (prescaler & crate::registers::PRESCALER_MASK) as u64 / divisor;
        at_least_one(micros * 1000)
    }
}

const fn period_from_hz(hz: u64) -> u64 {
    if hz == 0 {
        return u64::MAX;
    }
    at_least_one(NANOS_PER_SECOND / hz)
}

// A zero period would deliver the same tick forever.
const fn at_least_one(ns: u64) -> u64 {
    if ns == 0 { 1 } else { ns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_periods() {
        let config = IogaConfig::default();

        assert_eq!(config.heartbeat_period(), 16_666_666);
        assert_eq!(config.timer3_period(), 40);
    }

    #[test]
    fn prescaled_period() {
        let config = IogaConfig::default();

        // 0x06da & 0x7fff = 1754, / 50 = 35 us
        assert_eq!(config.prescaled_period(0x05aa_06da), 35_000);
        assert_eq!(config.prescaled_period(0), 1);
    }
}
