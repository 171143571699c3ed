//! # DMA engine
//!
//! Single byte-wide channel serving the floppy controller.
//!
//! ```text
//!          drq, count > 0        first step
//!   Idle ─────────────────► Armed ─────────► Active ──┐ one byte per step
//!    ▲                                        │  ▲    │ while drq && count > 0
//!    │        count == 0: terminal count      │  └────┘
//!    └────────────────────────────────────────┘
//! ```
//!
//! With the request line low the channel parks in `Active` and resumes on
//! the next request.

use serde::{Deserialize, Serialize};

use crate::config::IogaConfig;
use crate::error::IogaError;
use crate::lines::{DmaPort, LineState};
use crate::registers::{DMA_CTRL_DECREMENT, DMA_CTRL_WRITE};
use crate::scheduler::{Event, Scheduler};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmaState {
    #[default]
    Idle,
    Armed,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaChannel {
    pub real_address: u32,
    pub virtual_address: u32,
    pub transfer_count: u32,
    pub control: u32,
    state: DmaState,
    drq_asserted: bool,
}

impl DmaChannel {
    #[must_use]
    pub const fn state(&self) -> DmaState {
        self.state
    }

    /// True from the first transfer step until the count runs out.
    #[must_use]
    pub fn active(&self) -> bool {
        self.state == DmaState::Active
    }

    #[must_use]
    pub const fn drq_asserted(&self) -> bool {
        self.drq_asserted
    }

    /// Memory to device when set, device to memory otherwise.
    #[must_use]
    pub const fn to_device(&self) -> bool {
        self.control & DMA_CTRL_WRITE != 0
    }

    /// Stops any transfer at once. Registers are kept.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        scheduler.cancel(Event::Dma);
        self.state = DmaState::Idle;
        self.drq_asserted = false;
    }

    /// Data request line from the device.
    pub fn drq(&mut self, state: LineState, scheduler: &mut Scheduler) {
        self.drq_asserted = state == LineState::Assert;
        if !self.drq_asserted {
            return;
        }

        match self.state {
            DmaState::Idle if self.transfer_count > 0 => {
                self.state = DmaState::Armed;
                scheduler.schedule(Event::Dma, 0, None);
            }
            DmaState::Idle => {
                tracing::debug!("dma: request ignored, no transfer count");
            }
            DmaState::Armed => {}
            DmaState::Active => {
                if !scheduler.is_scheduled(Event::Dma) {
                    scheduler.schedule(Event::Dma, 0, None);
                }
            }
        }
    }

    /// One scheduler opportunity: moves a single byte between device and memory.
    ///
    /// # Errors
    ///
    /// Returns [`IogaError::DmaFault`] if memory rejects the access. Address
    /// and count are left untouched and the channel waits for the next request.
    pub fn step(
        &mut self,
        port: &mut dyn DmaPort,
        scheduler: &mut Scheduler,
        config: &IogaConfig,
    ) -> Result<(), IogaError> {
        match self.state {
            DmaState::Idle => return Ok(()),
            DmaState::Armed => {
                tracing::debug!(
                    control = self.control,
                    real_address = self.real_address,
                    count = self.transfer_count,
                    "dma: transfer started"
                );
                self.state = DmaState::Active;
            }
            DmaState::Active => {}
        }

        if self.drq_asserted && self.transfer_count > 0 {
            self.transfer_byte(port)?;
        }

        if self.transfer_count == 0 {
            tracing::debug!(
                control = self.control,
                real_address = self.real_address,
                "dma: transfer complete, asserting terminal count"
            );
            self.state = DmaState::Idle;
            port.terminal_count_pulse();
        } else if self.drq_asserted {
            scheduler.schedule(Event::Dma, config.dma_step_ns, None);
        } else {
            tracing::trace!(count = self.transfer_count, "dma: parked");
        }

        Ok(())
    }

    fn transfer_byte(&mut self, port: &mut dyn DmaPort) -> Result<(), IogaError> {
        let address = self.real_address;
        let fault = |source| IogaError::DmaFault { address, source };

        if self.to_device() {
            let value = port.memory_read(address).map_err(fault)?;
            port.dma_write_byte(value);
            tracing::trace!(address, value, "dma: memory -> device");
        } else {
            let value = port.dma_read_byte();
            port.memory_write(address, value).map_err(fault)?;
            tracing::trace!(address, value, "dma: device -> memory");
        }

        self.real_address = if self.control & DMA_CTRL_DECREMENT != 0 {
            address.wrapping_sub(1)
        } else {
            address.wrapping_add(1)
        };
        self.transfer_count -= 1;

        Ok(())
    }
}
