//! # Interrupt arbiter
//!
//! Collects the NMI, 19 vectored sources and 16 software interrupts and drives
//! the two CPU lines. At most one source is *active*: it has been presented to
//! the CPU and waits for its acknowledge. Other sources keep accumulating
//! pending bits meanwhile.
//!
//! Priority, highest first:
//!
//! ```text
//! NMI > vectored 0..18 > soft-low 0..7 > soft-high 8..15
//! ```
//!
//! Arbitration only happens when nothing is active, so a newly asserted higher
//! priority source waits for the current one to be acknowledged or cleared.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::error::IogaError;
use crate::lines::{InterruptLine, InterruptLines, LineState};
use crate::registers::{
    INTERRUPT_COUNT, INTERRUPT_PENDING, INTERRUPT_REGISTER_MASK, INTERRUPT_VECTOR_MASK,
    IRQ_ENABLE_MASK, NMI_EDGE, NMI_ENABLE, NMI_ENABLE_IN, NMI_PENDING, NMI_REGISTER_MASK,
    SOFT_GROUP_SIZE, soft_low_vector,
};

/// The source currently presented to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveSource {
    Nmi,
    Vectored(usize),
    SoftLow(usize),
    SoftHigh(usize),
}

impl ActiveSource {
    const fn line(self) -> InterruptLine {
        match self {
            Self::Nmi => InterruptLine::Nmi,
            _ => InterruptLine::Irq,
        }
    }
}

/// A source with a programmable vector register: the vectored interrupts and
/// the soft-high group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRegister {
    /// Register contents without the pending bit.
    value: u16,
    pending: bool,
    /// A write with the pending bit set was seen, the next write without it
    /// commits its vector and forces the interrupt.
    forced: bool,
}

impl VectorRegister {
    #[must_use]
    pub const fn vector(&self) -> u8 {
        (self.value & INTERRUPT_VECTOR_MASK) as u8
    }

    #[must_use]
    pub const fn pending(&self) -> bool {
        self.pending
    }

    #[must_use]
    pub const fn forced(&self) -> bool {
        self.forced
    }

    /// Register contents as seen by the bus.
    #[must_use]
    pub const fn read(&self) -> u16 {
        let pending = if self.pending { INTERRUPT_PENDING } else { 0 };
        (self.value | pending) & INTERRUPT_REGISTER_MASK
    }

    /// Raw register contents, without the pending bit.
    #[must_use]
    pub const fn raw(&self) -> u16 {
        self.value
    }

    /// Applies a bus write, returns true when a deferred write was committed.
    fn write(&mut self, data: u16) -> bool {
        if data & INTERRUPT_PENDING != 0 {
            // keep the old vector until the pending bit is written low
            self.forced = true;
            false
        } else if self.forced {
            self.value = data & INTERRUPT_REGISTER_MASK;
            self.forced = false;
            true
        } else {
            self.value = data & INTERRUPT_REGISTER_MASK;
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmiState {
    control: u8,
    pending: bool,
}

impl NmiState {
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.control & NMI_ENABLE == NMI_ENABLE
    }

    #[must_use]
    pub const fn edge_triggered(&self) -> bool {
        self.control & NMI_EDGE != 0
    }

    #[must_use]
    pub const fn pending(&self) -> bool {
        self.pending
    }

    #[must_use]
    pub const fn control(&self) -> u8 {
        self.control
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptArbiter {
    vectored: [VectorRegister; INTERRUPT_COUNT],
    /// One pending bit per soft-low interrupt, also the soft interrupt register.
    soft_low: u8,
    soft_high: [VectorRegister; SOFT_GROUP_SIZE],
    nmi: NmiState,
    active: Option<ActiveSource>,
}

impl Default for InterruptArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vectored: [VectorRegister::default(); INTERRUPT_COUNT],
            soft_low: 0,
            soft_high: [VectorRegister::default(); SOFT_GROUP_SIZE],
            nmi: NmiState::default(),
            active: None,
        }
    }

    /// Drops all pending, forced and active state and lowers the active line.
    /// Vectors and enables are kept, the NMI control register is cleared.
    pub fn reset(&mut self, lines: &mut dyn InterruptLines) {
        for source in self.vectored.iter_mut().chain(self.soft_high.iter_mut()) {
            source.pending = false;
            source.forced = false;
        }
        self.soft_low = 0;
        self.nmi = NmiState::default();
        self.update(LineState::Clear, lines);
    }

    #[must_use]
    pub const fn active(&self) -> Option<ActiveSource> {
        self.active
    }

    #[must_use]
    pub const fn nmi(&self) -> &NmiState {
        &self.nmi
    }

    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSource`] if `source` is out of range.
    pub fn source(&self, source: usize) -> Result<&VectorRegister, IogaError> {
        self.vectored
            .get(source)
            .ok_or(IogaError::InvalidSource(source))
    }

    /// Pending state of a soft interrupt, `index` in 0..16.
    #[must_use]
    pub fn soft_pending(&self, index: usize) -> bool {
        if index < SOFT_GROUP_SIZE {
            self.soft_low.get_bit(index as u8)
        } else {
            self.soft_high
                .get(index - SOFT_GROUP_SIZE)
                .is_some_and(VectorRegister::pending)
        }
    }

    fn is_enabled(&self, source: usize) -> bool {
        self.vectored[source].value & IRQ_ENABLE_MASK[source] != 0
    }

    pub fn set_nmi(&mut self, state: LineState, lines: &mut dyn InterruptLines) {
        match state {
            LineState::Assert => {
                if self.nmi.enabled() {
                    // edge triggered: disarm until software sets enable-in again
                    if self.nmi.edge_triggered() {
                        self.nmi.control &= !NMI_ENABLE_IN;
                    }
                    self.nmi.pending = true;
                    self.update(LineState::Assert, lines);
                } else {
                    tracing::debug!(control = self.nmi.control, "nmi: dropped, not enabled");
                }
            }
            LineState::Clear => {
                if self.nmi.pending {
                    self.nmi.pending = false;
                    // an NMI still waiting behind an irq leaves that irq alone
                    if self.active == Some(ActiveSource::Nmi) {
                        self.update(LineState::Clear, lines);
                    }
                }
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSource`] if `source` is out of range.
    pub fn set_irq(
        &mut self,
        source: usize,
        state: LineState,
        lines: &mut dyn InterruptLines,
    ) -> Result<(), IogaError> {
        if source >= INTERRUPT_COUNT {
            return Err(IogaError::InvalidSource(source));
        }

        match state {
            LineState::Assert => {
                if self.is_enabled(source) {
                    self.vectored[source].pending = true;
                    self.update(LineState::Assert, lines);
                } else {
                    tracing::debug!(
                        source,
                        register = self.vectored[source].read(),
                        "irq: dropped disabled interrupt"
                    );
                }
            }
            LineState::Clear => {
                if self.vectored[source].pending {
                    self.vectored[source].pending = false;
                    self.update(LineState::Clear, lines);
                }
            }
        }

        Ok(())
    }

    /// Soft interrupts 0..8 are the soft-low group, 8..16 the soft-high group.
    ///
    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSoftInterrupt`] if `index` is out of range.
    pub fn set_soft_irq(
        &mut self,
        index: usize,
        state: LineState,
        lines: &mut dyn InterruptLines,
    ) -> Result<(), IogaError> {
        if index >= 2 * SOFT_GROUP_SIZE {
            return Err(IogaError::InvalidSoftInterrupt(index));
        }

        let asserted = state == LineState::Assert;
        if state == LineState::Clear && !self.soft_pending(index) {
            return Ok(());
        }

        if index < SOFT_GROUP_SIZE {
            self.soft_low.set_bit(index as u8, asserted);
        } else {
            self.soft_high[index - SOFT_GROUP_SIZE].pending = asserted;
        }
        self.update(state, lines);

        Ok(())
    }

    /// Handles a bus write to the vector register of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSource`] if `source` is out of range.
    pub fn write_vector(
        &mut self,
        source: usize,
        data: u16,
        lines: &mut dyn InterruptLines,
    ) -> Result<(), IogaError> {
        let register = self
            .vectored
            .get_mut(source)
            .ok_or(IogaError::InvalidSource(source))?;

        tracing::trace!(source, data, "irq: vector register written");
        if data & !INTERRUPT_REGISTER_MASK != 0 {
            tracing::debug!(source, data, "irq: reserved vector register bits ignored");
        }

        let committed = register.write(data);
        if !self.is_enabled(source) {
            if committed {
                tracing::debug!(source, data, "irq: forced write dropped, not enabled");
            }
            self.drop_disabled(ActiveSource::Vectored(source), lines);
        } else if committed {
            tracing::debug!(source, vector = self.vectored[source].vector(), "irq: forced");
            self.vectored[source].pending = true;
            self.update(LineState::Assert, lines);
        }

        Ok(())
    }

    /// Bus write to a soft-high vector register, `index` in 0..8.
    ///
    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSoftInterrupt`] if `index` is out of range.
    pub fn write_soft_vector(
        &mut self,
        index: usize,
        data: u16,
        lines: &mut dyn InterruptLines,
    ) -> Result<(), IogaError> {
        let register = self
            .soft_high
            .get_mut(index)
            .ok_or(IogaError::InvalidSoftInterrupt(index + SOFT_GROUP_SIZE))?;

        if register.write(data) {
            tracing::debug!(index, vector = register.vector(), "soft irq: forced");
            register.pending = true;
            self.update(LineState::Assert, lines);
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`IogaError::InvalidSoftInterrupt`] if `index` is out of range.
    pub fn soft_vector(&self, index: usize) -> Result<&VectorRegister, IogaError> {
        self.soft_high
            .get(index)
            .ok_or(IogaError::InvalidSoftInterrupt(index + SOFT_GROUP_SIZE))
    }

    #[must_use]
    pub const fn soft_register(&self) -> u8 {
        self.soft_low
    }

    /// Stores the soft interrupt register. Every bit written from 1 to 0
    /// raises its soft interrupt, and a stored 1 is a pending request too.
    pub fn write_soft_register(&mut self, data: u8, lines: &mut dyn InterruptLines) {
        let previous = self.soft_low;
        let forced = previous.falling_edges(data);
        self.soft_low = data | forced;

        if forced != 0 || data & !previous != 0 {
            tracing::trace!(previous, data, forced, "soft irq: register written");
            self.update(LineState::Assert, lines);
        }
    }

    #[must_use]
    pub const fn nmi_register(&self) -> u8 {
        let pending = if self.nmi.pending { NMI_PENDING } else { 0 };
        (self.nmi.control | pending) & NMI_REGISTER_MASK
    }

    /// Stores the NMI control register; writing the pending bit from 1 to 0
    /// raises NMI.
    pub fn write_nmi_register(&mut self, data: u8, lines: &mut dyn InterruptLines) {
        if data & !NMI_REGISTER_MASK != 0 {
            tracing::debug!(data, "nmi: reserved control bits ignored");
        }

        let previous = self.nmi.control;
        self.nmi.control = data & NMI_REGISTER_MASK;

        if previous.falling_edges(data) & NMI_PENDING != 0 {
            self.set_nmi(LineState::Assert, lines);
        }
    }

    /// Interrupt acknowledge from the CPU. Clears the active source, lowers
    /// its line and presents the next pending source, returning the vector of
    /// the acknowledged one.
    pub fn acknowledge(&mut self, line: InterruptLine, lines: &mut dyn InterruptLines) -> u8 {
        let Some(active) = self.active.filter(|active| active.line() == line) else {
            tracing::debug!(?line, active = ?self.active, "spurious interrupt acknowledge");
            return 0;
        };

        let vector = self.vector_of(active);
        match active {
            ActiveSource::Nmi => self.nmi.pending = false,
            ActiveSource::Vectored(source) => self.vectored[source].pending = false,
            ActiveSource::SoftLow(index) => self.soft_low.set_bit(index as u8, false),
            ActiveSource::SoftHigh(index) => self.soft_high[index].pending = false,
        }
        tracing::trace!(?active, vector, "interrupt acknowledged");

        self.update(LineState::Clear, lines);

        vector
    }

    /// Vector of the active interrupt, without acknowledging it.
    #[must_use]
    pub fn peek_vector(&self) -> u8 {
        self.active.map_or(0, |active| self.vector_of(active))
    }

    fn vector_of(&self, active: ActiveSource) -> u8 {
        match active {
            ActiveSource::Nmi => 0,
            ActiveSource::Vectored(source) => self.vectored[source].vector(),
            ActiveSource::SoftLow(index) => soft_low_vector(index),
            ActiveSource::SoftHigh(index) => self.soft_high[index].vector(),
        }
    }

    /// Policy for a source disabled while pending: its pending bit goes, and if
    /// it is the one presented to the CPU its line is lowered immediately.
    fn drop_disabled(&mut self, source: ActiveSource, lines: &mut dyn InterruptLines) {
        if let ActiveSource::Vectored(index) = source {
            self.vectored[index].pending = false;
        }
        if self.active == Some(source) {
            tracing::debug!(?source, "irq: active source disabled");
            self.update(LineState::Clear, lines);
        }
    }

    /// Re-evaluates the output lines. `Clear` first lowers the line of the
    /// active source, then both fall through to selecting the highest
    /// pending source when nothing is active.
    fn update(&mut self, state: LineState, lines: &mut dyn InterruptLines) {
        if state == LineState::Clear {
            if let Some(active) = self.active.take() {
                match active.line() {
                    InterruptLine::Nmi => lines.nmi_line(LineState::Clear),
                    InterruptLine::Irq => lines.irq_line(LineState::Clear),
                }
            }
        }

        if self.active.is_some() {
            return;
        }

        let Some(next) = self.highest_pending() else {
            return;
        };

        self.active = Some(next);
        match next.line() {
            InterruptLine::Nmi => lines.nmi_line(LineState::Assert),
            InterruptLine::Irq => lines.irq_line(LineState::Assert),
        }
    }

    fn highest_pending(&self) -> Option<ActiveSource> {
        if self.nmi.pending {
            return Some(ActiveSource::Nmi);
        }

        if let Some(source) = self.vectored.iter().position(|source| source.pending) {
            return Some(ActiveSource::Vectored(source));
        }

        if self.soft_low != 0 {
            return Some(ActiveSource::SoftLow(self.soft_low.trailing_zeros() as usize));
        }

        self.soft_high
            .iter()
            .position(|source| source.pending)
            .map(ActiveSource::SoftHigh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{
        INTERRUPT_ENABLE_EXTERNAL, INTERRUPT_ENABLE_INTERNAL, IRQ_FLOPPY, IRQ_SCSI,
        IRQ_TIMER1, NMI_ENABLE1,
    };
    use crate::test_board::TestBoard;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    fn arbiter_with_enabled(sources: &[(usize, u8)], board: &mut TestBoard) -> InterruptArbiter {
        let mut arbiter = InterruptArbiter::new();
        for &(source, vector) in sources {
            arbiter
                .write_vector(source, INTERRUPT_ENABLE_EXTERNAL | u16::from(vector), board)
                .unwrap();
        }
        arbiter
    }

    #[test]
    fn assert_raises_irq_and_acknowledge_returns_vector() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(IRQ_FLOPPY, 0x21)], &mut board);

        arbiter.set_irq(IRQ_FLOPPY, LineState::Assert, &mut board).unwrap();

        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(IRQ_FLOPPY)));
        assert_eq!(board.irq, LineState::Assert);
        assert_eq!(arbiter.peek_vector(), 0x21);
        assert!(arbiter.source(IRQ_FLOPPY).unwrap().pending());

        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0x21);
        assert_eq!(arbiter.active(), None);
        assert_eq!(board.irq, LineState::Clear);
        assert!(!arbiter.source(IRQ_FLOPPY).unwrap().pending());
    }

    #[test]
    fn disabled_source_is_dropped() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();

        arbiter.set_irq(3, LineState::Assert, &mut board).unwrap();
        assert!(!arbiter.source(3).unwrap().pending());
        assert_eq!(arbiter.active(), None);
        assert_eq!(board.irq_transitions, 0);

        arbiter.write_vector(3, INTERRUPT_ENABLE_EXTERNAL | 0x21, &mut board).unwrap();
        arbiter.set_irq(3, LineState::Assert, &mut board).unwrap();
        assert!(arbiter.source(3).unwrap().pending());
        assert_eq!(board.irq_transitions, 1);
    }

    #[test]
    fn capability_mask_gates_internal_enable() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();

        // timer 1 only honours the external enable
        arbiter.write_vector(IRQ_TIMER1, INTERRUPT_ENABLE_INTERNAL | 0x12, &mut board).unwrap();
        arbiter.set_irq(IRQ_TIMER1, LineState::Assert, &mut board).unwrap();
        assert_eq!(arbiter.active(), None);

        // SCSI honours both
        arbiter.write_vector(IRQ_SCSI, INTERRUPT_ENABLE_INTERNAL | 0x20, &mut board).unwrap();
        arbiter.set_irq(IRQ_SCSI, LineState::Assert, &mut board).unwrap();
        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(IRQ_SCSI)));
    }

    #[test]
    fn acknowledge_activates_next_in_priority_order() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(2, 0x20), (5, 0x25), (11, 0x29)], &mut board);

        arbiter.set_irq(11, LineState::Assert, &mut board).unwrap();
        arbiter.set_irq(5, LineState::Assert, &mut board).unwrap();
        arbiter.set_irq(2, LineState::Assert, &mut board).unwrap();
        arbiter.set_soft_irq(3, LineState::Assert, &mut board).unwrap();
        arbiter.set_soft_irq(9, LineState::Assert, &mut board).unwrap();

        // no preemption: 11 was presented first
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0x29);
        assert_eq!(board.irq, LineState::Assert);
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0x20);
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0x25);
        assert_eq!(
            arbiter.acknowledge(InterruptLine::Irq, &mut board),
            soft_low_vector(3)
        );
        assert_eq!(arbiter.active(), Some(ActiveSource::SoftHigh(1)));
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0);
        assert_eq!(arbiter.active(), None);
        assert_eq!(board.irq, LineState::Clear);
    }

    #[test]
    fn nmi_has_top_priority() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(0, 0x10)], &mut board);
        arbiter.write_nmi_register(NMI_ENABLE, &mut board);

        arbiter.set_soft_irq(0, LineState::Assert, &mut board).unwrap();
        arbiter.set_irq(0, LineState::Assert, &mut board).unwrap();
        arbiter.set_nmi(LineState::Assert, &mut board);
        // clearing re-arbitrates, the NMI wins over everything pending
        arbiter.set_soft_irq(0, LineState::Clear, &mut board).unwrap();

        assert_eq!(arbiter.active(), Some(ActiveSource::Nmi));
        assert_eq!(board.nmi, LineState::Assert);
        assert_eq!(board.irq, LineState::Clear);

        assert_eq!(arbiter.acknowledge(InterruptLine::Nmi, &mut board), 0);
        assert_eq!(board.nmi, LineState::Clear);
        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(0)));
        assert_eq!(board.irq, LineState::Assert);
    }

    #[test]
    fn edge_triggered_nmi_disarms_itself() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();
        arbiter.write_nmi_register(NMI_ENABLE | NMI_EDGE, &mut board);

        arbiter.set_nmi(LineState::Assert, &mut board);
        assert!(arbiter.nmi().pending());
        assert!(!arbiter.nmi().enabled());
        assert_eq!(arbiter.nmi_register(), NMI_ENABLE1 | NMI_EDGE | NMI_PENDING);

        arbiter.acknowledge(InterruptLine::Nmi, &mut board);
        arbiter.set_nmi(LineState::Assert, &mut board);
        assert!(!arbiter.nmi().pending());
        assert_eq!(board.nmi_transitions, 2);

        // software re-arms
        arbiter.write_nmi_register(NMI_ENABLE | NMI_EDGE, &mut board);
        arbiter.set_nmi(LineState::Assert, &mut board);
        assert!(arbiter.nmi().pending());
    }

    #[test]
    fn level_nmi_stays_armed() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();
        arbiter.write_nmi_register(NMI_ENABLE, &mut board);

        arbiter.set_nmi(LineState::Assert, &mut board);
        assert!(arbiter.nmi().enabled());
        arbiter.set_nmi(LineState::Clear, &mut board);
        assert_eq!(arbiter.active(), None);
        assert_eq!(board.nmi, LineState::Clear);
    }

    #[test]
    fn nmi_pending_written_low_forces_nmi() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();
        arbiter.write_nmi_register(NMI_ENABLE | NMI_PENDING, &mut board);
        assert_eq!(arbiter.active(), None);

        arbiter.write_nmi_register(NMI_ENABLE, &mut board);

        assert_eq!(arbiter.active(), Some(ActiveSource::Nmi));
        assert_eq!(board.nmi, LineState::Assert);
    }

    #[test]
    fn reserved_nmi_bits_are_ignored() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();
        arbiter.write_nmi_register(0xff, &mut board);

        assert_eq!(arbiter.nmi_register(), NMI_REGISTER_MASK);
    }

    #[test]
    fn deferred_vector_write() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(IRQ_FLOPPY, 0x21)], &mut board);

        arbiter
            .write_vector(IRQ_FLOPPY, INTERRUPT_PENDING | INTERRUPT_ENABLE_EXTERNAL | 0x44, &mut board)
            .unwrap();
        assert!(arbiter.source(IRQ_FLOPPY).unwrap().forced());
        assert_eq!(arbiter.source(IRQ_FLOPPY).unwrap().vector(), 0x21);
        assert_eq!(arbiter.source(IRQ_FLOPPY).unwrap().read(), 0x0221);
        assert_eq!(arbiter.active(), None);

        arbiter
            .write_vector(IRQ_FLOPPY, INTERRUPT_ENABLE_EXTERNAL | 0x55, &mut board)
            .unwrap();
        assert!(!arbiter.source(IRQ_FLOPPY).unwrap().forced());
        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(IRQ_FLOPPY)));
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0x55);
    }

    #[test]
    fn deferred_soft_vector_write() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();
        arbiter.write_soft_vector(2, 0x00a0, &mut board).unwrap();

        arbiter.write_soft_vector(2, INTERRUPT_PENDING | 0xb0, &mut board).unwrap();
        assert_eq!(arbiter.soft_vector(2).unwrap().vector(), 0xa0);

        arbiter.write_soft_vector(2, 0x00c0, &mut board).unwrap();
        assert_eq!(arbiter.active(), Some(ActiveSource::SoftHigh(2)));
        assert!(arbiter.soft_pending(10));
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0xc0);
    }

    #[test]
    fn soft_register_stored_one_is_arbitrated() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();

        arbiter.write_soft_register(0b0000_0100, &mut board);

        assert_eq!(arbiter.active(), Some(ActiveSource::SoftLow(2)));
        assert_eq!(board.irq, LineState::Assert);
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0xaf);
        assert_eq!(arbiter.soft_register(), 0);
    }

    #[test]
    fn soft_register_falling_edge_forces_interrupt() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(IRQ_FLOPPY, 0x21)], &mut board);
        arbiter.set_irq(IRQ_FLOPPY, LineState::Assert, &mut board).unwrap();

        arbiter.write_soft_register(0b0000_0010, &mut board);
        arbiter.write_soft_register(0, &mut board);

        // the request written low stays pending behind the floppy
        assert_eq!(arbiter.soft_register(), 0b0000_0010);
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0x21);
        assert_eq!(arbiter.active(), Some(ActiveSource::SoftLow(1)));
        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), soft_low_vector(1));
        assert_eq!(board.irq, LineState::Clear);
    }

    #[test]
    fn forced_write_that_disables_is_dropped() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(5, 0x25)], &mut board);

        arbiter
            .write_vector(5, INTERRUPT_PENDING | INTERRUPT_ENABLE_EXTERNAL | 0x44, &mut board)
            .unwrap();
        arbiter.write_vector(5, 0x55, &mut board).unwrap();

        let source = arbiter.source(5).unwrap();
        assert!(!source.forced());
        assert!(!source.pending());
        assert_eq!(source.vector(), 0x55);
        assert_eq!(arbiter.active(), None);
        assert_eq!(board.irq_transitions, 0);
    }

    #[test]
    fn nmi_clear_behind_active_irq_keeps_irq_line() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(IRQ_FLOPPY, 0x21)], &mut board);
        arbiter.write_nmi_register(NMI_ENABLE, &mut board);
        arbiter.set_irq(IRQ_FLOPPY, LineState::Assert, &mut board).unwrap();
        arbiter.set_nmi(LineState::Assert, &mut board);
        let transitions = (board.irq_transitions, board.nmi_transitions);

        arbiter.set_nmi(LineState::Clear, &mut board);

        assert!(!arbiter.nmi().pending());
        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(IRQ_FLOPPY)));
        assert_eq!((board.irq_transitions, board.nmi_transitions), transitions);
        assert_eq!(board.irq, LineState::Assert);
    }

    #[test]
    fn disabling_active_source_deasserts() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(4, 0x22), (9, 0x30)], &mut board);
        arbiter.set_irq(4, LineState::Assert, &mut board).unwrap();
        arbiter.set_irq(9, LineState::Assert, &mut board).unwrap();

        arbiter.write_vector(4, 0x22, &mut board).unwrap();

        assert!(!arbiter.source(4).unwrap().pending());
        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(9)));
        // lowered for 4, raised again for 9
        assert_eq!(board.irq_transitions, 3);
    }

    #[test]
    fn spurious_acknowledge_returns_zero() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(1, 0x77)], &mut board);

        assert_eq!(arbiter.acknowledge(InterruptLine::Irq, &mut board), 0);
        assert_eq!(arbiter.acknowledge(InterruptLine::Nmi, &mut board), 0);

        arbiter.set_irq(1, LineState::Assert, &mut board).unwrap();
        // wrong class leaves the irq alone
        assert_eq!(arbiter.acknowledge(InterruptLine::Nmi, &mut board), 0);
        assert_eq!(arbiter.active(), Some(ActiveSource::Vectored(1)));
    }

    #[test]
    fn clearing_twice_is_idempotent() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(6, 0x24)], &mut board);
        arbiter.set_irq(6, LineState::Assert, &mut board).unwrap();

        arbiter.set_irq(6, LineState::Clear, &mut board).unwrap();
        let after_one = arbiter.clone();
        let transitions = board.irq_transitions;
        arbiter.set_irq(6, LineState::Clear, &mut board).unwrap();

        assert_eq!(arbiter, after_one);
        assert_eq!(board.irq_transitions, transitions);
    }

    #[test]
    fn reset_keeps_vectors_and_lowers_line() {
        let mut board = TestBoard::default();
        let mut arbiter = arbiter_with_enabled(&[(IRQ_SCSI, 0x20)], &mut board);
        arbiter.write_nmi_register(NMI_ENABLE, &mut board);
        arbiter.set_irq(IRQ_SCSI, LineState::Assert, &mut board).unwrap();
        arbiter.write_soft_vector(0, INTERRUPT_PENDING | 0x90, &mut board).unwrap();

        arbiter.reset(&mut board);

        assert_eq!(arbiter.active(), None);
        assert_eq!(board.irq, LineState::Clear);
        assert_eq!(arbiter.source(IRQ_SCSI).unwrap().read(), INTERRUPT_ENABLE_EXTERNAL | 0x20);
        assert!(!arbiter.soft_vector(0).unwrap().forced());
        assert_eq!(arbiter.nmi_register(), 0);
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let mut board = TestBoard::default();
        let mut arbiter = InterruptArbiter::new();

        assert_eq!(
            arbiter.set_irq(INTERRUPT_COUNT, LineState::Assert, &mut board),
            Err(IogaError::InvalidSource(INTERRUPT_COUNT))
        );
        assert_eq!(
            arbiter.set_soft_irq(16, LineState::Assert, &mut board),
            Err(IogaError::InvalidSoftInterrupt(16))
        );
    }

    #[test]
    fn idle_arbitration_picks_highest_pending() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut board = TestBoard::default();
            let all: Vec<(usize, u8)> = (0..INTERRUPT_COUNT).map(|s| (s, s as u8)).collect();
            let mut arbiter = arbiter_with_enabled(&all, &mut board);
            arbiter.write_nmi_register(NMI_ENABLE, &mut board);

            // pile up pending bits behind a held soft-high interrupt
            arbiter.set_soft_irq(15, LineState::Assert, &mut board).unwrap();
            let mut expected: Option<ActiveSource> = None;
            for _ in 0..rng.gen_range(1..8) {
                let candidate = match rng.gen_range(0..4) {
                    0 => {
                        arbiter.set_nmi(LineState::Assert, &mut board);
                        ActiveSource::Nmi
                    }
                    1 => {
                        let source = rng.gen_range(0..INTERRUPT_COUNT);
                        arbiter.set_irq(source, LineState::Assert, &mut board).unwrap();
                        ActiveSource::Vectored(source)
                    }
                    2 => {
                        let index = rng.gen_range(0..SOFT_GROUP_SIZE);
                        arbiter.set_soft_irq(index, LineState::Assert, &mut board).unwrap();
                        ActiveSource::SoftLow(index)
                    }
                    _ => {
                        let index = rng.gen_range(0..SOFT_GROUP_SIZE - 1);
                        arbiter
                            .set_soft_irq(index + SOFT_GROUP_SIZE, LineState::Assert, &mut board)
                            .unwrap();
                        ActiveSource::SoftHigh(index)
                    }
                };
                expected = Some(expected.map_or(candidate, |e| higher(e, candidate)));
            }

            // releasing the held one makes the arbiter choose among the rest
            arbiter.set_soft_irq(15, LineState::Clear, &mut board).unwrap();
            assert_eq!(arbiter.active(), expected);
        }
    }

    fn rank(source: ActiveSource) -> (u8, usize) {
        match source {
            ActiveSource::Nmi => (0, 0),
            ActiveSource::Vectored(i) => (1, i),
            ActiveSource::SoftLow(i) => (2, i),
            ActiveSource::SoftHigh(i) => (3, i),
        }
    }

    fn higher(a: ActiveSource, b: ActiveSource) -> ActiveSource {
        if rank(a) <= rank(b) { a } else { b }
    }
}
