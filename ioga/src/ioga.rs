//! # I/O gate array
//!
//! [`Ioga`] owns the interrupt arbiter, the timer bank, the DMA channel and
//! the scheduler driving them, plus the collaborators it was wired to.
//!
//! ```text
//!   devices ── irq / nmi / drq ──►┌──────────────────────────┐── irq / nmi ──► CPU
//!                                 │ Ioga                     │◄─ acknowledge ─
//!   bus ── read/write ───────────►│  arbiter  timers  dma    │
//!                                 │        scheduler         │── bytes, tc ──► device
//!                                 └──────────────────────────┘◄─ bytes ─────► memory
//! ```
//!
//! Every operation runs to completion before returning, time only moves in
//! [`Ioga::run_until`].

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::config::IogaConfig;
use crate::dma::DmaChannel;
use crate::error::IogaError;
use crate::interrupt::{ActiveSource, InterruptArbiter};
use crate::lines::{InterruptLine, LineState, Wiring};
use crate::registers::{Register, Width};
use crate::scheduler::{Event, Scheduler};
use crate::timers::TimerBank;

/// Everything needed to resume a gate array later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IogaState {
    pub config: IogaConfig,
    pub arbiter: InterruptArbiter,
    pub timers: TimerBank,
    pub dma: DmaChannel,
    pub scheduler: Scheduler,
}

pub struct Ioga<W: Wiring> {
    config: IogaConfig,
    arbiter: InterruptArbiter,
    timers: TimerBank,
    dma: DmaChannel,
    scheduler: Scheduler,
    wiring: W,
}

impl<W: Wiring> Ioga<W> {
    pub fn new(config: IogaConfig, wiring: W) -> Self {
        let mut ioga = Self {
            config,
            arbiter: InterruptArbiter::new(),
            timers: TimerBank::default(),
            dma: DmaChannel::default(),
            scheduler: Scheduler::default(),
            wiring,
        };
        ioga.reset();
        ioga
    }

    /// Drops pending interrupts, stops timers 1-3 and any DMA transfer and
    /// restarts the heartbeat.
    pub fn reset(&mut self) {
        self.arbiter.reset(&mut self.wiring);
        self.scheduler.clear();
        self.timers.reset(&self.config, &mut self.scheduler);
        self.dma.reset(&mut self.scheduler);
    }

    #[must_use]
    pub const fn config(&self) -> &IogaConfig {
        &self.config
    }

    #[must_use]
    pub const fn wiring(&self) -> &W {
        &self.wiring
    }

    pub const fn wiring_mut(&mut self) -> &mut W {
        &mut self.wiring
    }

    #[must_use]
    pub const fn arbiter(&self) -> &InterruptArbiter {
        &self.arbiter
    }

    #[must_use]
    pub const fn timers(&self) -> &TimerBank {
        &self.timers
    }

    #[must_use]
    pub const fn dma(&self) -> &DmaChannel {
        &self.dma
    }

    /// Current emulated time in nanoseconds.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.scheduler.now()
    }

    #[must_use]
    pub const fn active_source(&self) -> Option<ActiveSource> {
        self.arbiter.active()
    }

    #[must_use]
    pub fn is_irq_active(&self) -> bool {
        matches!(self.arbiter.active(), Some(source) if source != ActiveSource::Nmi)
    }

    pub fn set_nmi(&mut self, state: LineState) {
        self.arbiter.set_nmi(state, &mut self.wiring);
    }

    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSource`] if `source` is out of range.
    pub fn set_irq(&mut self, source: usize, state: LineState) -> Result<(), IogaError> {
        self.arbiter.set_irq(source, state, &mut self.wiring)
    }

    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSoftInterrupt`] if `index` is out of range.
    pub fn set_soft_irq(&mut self, index: usize, state: LineState) -> Result<(), IogaError> {
        self.arbiter.set_soft_irq(index, state, &mut self.wiring)
    }

    /// CPU interrupt acknowledge, returns the vector of the acknowledged source.
    pub fn acknowledge(&mut self, line: InterruptLine) -> u8 {
        self.arbiter.acknowledge(line, &mut self.wiring)
    }

    /// Vector of the active interrupt, without acknowledging it.
    #[must_use]
    pub fn peek_vector(&self) -> u8 {
        self.arbiter.peek_vector()
    }

    /// Data request line of the floppy controller.
    pub fn drq(&mut self, state: LineState) {
        self.dma.drq(state, &mut self.scheduler);
    }

    /// Delivers every timer tick and DMA step due up to `time`, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first [`IogaError::DmaFault`]; the clock stays at the time
    /// of the faulting step.
    pub fn run_until(&mut self, time: u64) -> Result<(), IogaError> {
        while let Some(event) = self.scheduler.pop_due(time) {
            match event {
                Event::Timer(timer) => self.timer_tick(timer)?,
                Event::Dma => self
                    .dma
                    .step(&mut self.wiring, &mut self.scheduler, &self.config)?,
            }
        }
        self.scheduler.advance_to(time);

        Ok(())
    }

    fn timer_tick(&mut self, timer: usize) -> Result<(), IogaError> {
        if let Some(source) = self.timers.on_tick(timer, &mut self.scheduler) {
            self.arbiter.set_irq(source, LineState::Assert, &mut self.wiring)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> IogaState {
        IogaState {
            config: self.config,
            arbiter: self.arbiter.clone(),
            timers: self.timers.clone(),
            dma: self.dma.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Reinstalls a snapshot. Output lines are not replayed, the wiring is
    /// expected to come from the same snapshot.
    pub fn restore(&mut self, state: IogaState) {
        self.config = state.config;
        self.arbiter = state.arbiter;
        self.timers = state.timers;
        self.dma = state.dma;
        self.scheduler = state.scheduler;
    }
}

// Bus side.
#[allow(clippy::cast_possible_truncation)]
impl<W: Wiring> Ioga<W> {
    pub fn read_byte(&self, offset: u32) -> u8 {
        let Some((register, base)) = Register::decode(offset) else {
            tracing::warn!(offset, "read on unmapped register");
            return 0;
        };

        self.read_register(register).get_byte((offset - base) as u8)
    }

    pub fn read_half_word(&self, offset: u32) -> u16 {
        u16::from_le_bytes([self.read_byte(offset), self.read_byte(offset.wrapping_add(1))])
    }

    pub fn read_word(&self, offset: u32) -> u32 {
        u32::from_le_bytes([
            self.read_byte(offset),
            self.read_byte(offset.wrapping_add(1)),
            self.read_byte(offset.wrapping_add(2)),
            self.read_byte(offset.wrapping_add(3)),
        ])
    }

    pub fn write_byte(&mut self, offset: u32, value: u8) {
        self.write_access(offset, u32::from(value), 1);
    }

    pub fn write_half_word(&mut self, offset: u32, value: u16) {
        self.write_access(offset, u32::from(value), 2);
    }

    pub fn write_word(&mut self, offset: u32, value: u32) {
        self.write_access(offset, value, 4);
    }

    /// Splits an access into the registers it covers. Each register sees one
    /// write; bytes outside the access keep their stored value.
    fn write_access(&mut self, offset: u32, data: u32, size: u32) {
        let mut cursor = 0;
        while cursor < size {
            let address = offset.wrapping_add(cursor);
            let Some((register, base)) = Register::decode(address) else {
                tracing::warn!(offset = address, "write on unmapped register");
                cursor += 1;
                continue;
            };

            let mut value = self.stored_register(register);
            let mut byte = address - base;
            while byte < register_bytes(register) && cursor < size {
                value.set_byte(byte as u8, data.get_byte(cursor as u8));
                byte += 1;
                cursor += 1;
            }

            self.write_register(register, value);
        }
    }

    fn read_register(&self, register: Register) -> u32 {
        match register {
            Register::InterruptVector(source) => self
                .arbiter
                .source(source)
                .map_or(0, |source| u32::from(source.read())),
            Register::SoftInterruptVector(index) => self
                .arbiter
                .soft_vector(index)
                .map_or(0, |source| u32::from(source.read())),
            Register::NmiControl => u32::from(self.arbiter.nmi_register()),
            Register::Timer(timer) => self.timers.read_status(timer).unwrap_or(0),
            _ => self.stored_register(register),
        }
    }

    /// Register contents without status bits, the base of partial writes.
    fn stored_register(&self, register: Register) -> u32 {
        match register {
            Register::DmaRealAddress => self.dma.real_address,
            Register::DmaVirtualAddress => self.dma.virtual_address,
            Register::DmaTransferCount => self.dma.transfer_count,
            Register::DmaControl => self.dma.control,
            Register::InterruptVector(source) => self
                .arbiter
                .source(source)
                .map_or(0, |source| u32::from(source.raw())),
            Register::SoftInterruptVector(index) => self
                .arbiter
                .soft_vector(index)
                .map_or(0, |source| u32::from(source.raw())),
            Register::SoftInterrupt => u32::from(self.arbiter.soft_register()),
            Register::NmiControl => u32::from(self.arbiter.nmi().control()),
            Register::TimerPrescaler => self.timers.prescaler(),
            Register::Timer(timer) => self.timers.state(timer).map_or(0, |state| state.count()),
        }
    }

    fn write_register(&mut self, register: Register, value: u32) {
        let result = match register {
            Register::DmaRealAddress => {
                self.dma.real_address = value;
                Ok(())
            }
            Register::DmaVirtualAddress => {
                self.dma.virtual_address = value;
                Ok(())
            }
            Register::DmaTransferCount => {
                self.dma.transfer_count = value;
                Ok(())
            }
            Register::DmaControl => {
                self.dma.control = value;
                Ok(())
            }
            Register::InterruptVector(source) => {
                self.arbiter
                    .write_vector(source, value as u16, &mut self.wiring)
            }
            Register::SoftInterruptVector(index) => {
                self.arbiter
                    .write_soft_vector(index, value as u16, &mut self.wiring)
            }
            Register::SoftInterrupt => {
                self.arbiter.write_soft_register(value as u8, &mut self.wiring);
                Ok(())
            }
            Register::NmiControl => {
                self.arbiter.write_nmi_register(value as u8, &mut self.wiring);
                Ok(())
            }
            Register::TimerPrescaler => {
                self.timers.write_prescaler(value);
                Ok(())
            }
            Register::Timer(timer) => {
                self.timers
                    .write_control(timer, value, &self.config, &mut self.scheduler)
            }
        };

        if let Err(error) = result {
            tracing::warn!(?register, %error, "register write rejected");
        }
    }
}

const fn register_bytes(register: Register) -> u32 {
    match register.width() {
        Width::Byte => 1,
        Width::HalfWord => 2,
        Width::Word => 4,
    }
}
