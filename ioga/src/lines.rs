//! Signals exchanged with the collaborators wired to the gate array.

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Level of an input or output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineState {
    Assert,
    Clear,
}

impl From<bool> for LineState {
    fn from(asserted: bool) -> Self {
        if asserted { Self::Assert } else { Self::Clear }
    }
}

/// The two interrupt outputs towards the CPU, also used to select the
/// acknowledge protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptLine {
    Irq,
    Nmi,
}

/// Interrupt outputs, implemented by the CPU side.
pub trait InterruptLines {
    fn nmi_line(&mut self, state: LineState);

    fn irq_line(&mut self, state: LineState);
}

/// Everything the DMA engine touches: the requesting device and main memory.
pub trait DmaPort {
    /// Reads one byte from the device (device to memory transfers).
    fn dma_read_byte(&mut self) -> u8;

    /// Writes one byte to the device (memory to device transfers).
    fn dma_write_byte(&mut self, value: u8);

    /// Single terminal count pulse, sent once the transfer count reaches zero.
    fn terminal_count_pulse(&mut self);

    /// # Errors
    ///
    /// Returns a [`BusError`] if nothing answers at `address`.
    fn memory_read(&mut self, address: u32) -> Result<u8, BusError>;

    /// # Errors
    ///
    /// Returns a [`BusError`] if nothing answers at `address`.
    fn memory_write(&mut self, address: u32, value: u8) -> Result<(), BusError>;
}

/// The full set of collaborators a gate array is built with.
pub trait Wiring: InterruptLines + DmaPort {}

impl<T: InterruptLines + DmaPort> Wiring for T {}
