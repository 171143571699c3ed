//! Minimal board around the gate array: RAM, a floppy controller that streams
//! one sector, and the two CPU interrupt inputs.

use std::collections::VecDeque;

use ioga::{BusError, DmaPort, InterruptLines, LineState};

pub const RAM_SIZE: usize = 0x1_0000;
pub const SECTOR_SIZE: usize = 512;

/// Floppy controller stub. Hands out a sector and swallows written bytes.
#[derive(Debug, Default)]
pub struct Floppy {
    sector: VecDeque<u8>,
    written: Vec<u8>,
    terminal_counts: usize,
}

impl Floppy {
    /// Loads a sector filled with a recognisable pattern.
    pub fn load_sector(&mut self, track: u8) {
        self.sector = (0..SECTOR_SIZE)
            .map(|index| track ^ index.to_le_bytes()[0])
            .collect();
    }

    pub const fn terminal_counts(&self) -> usize {
        self.terminal_counts
    }
}

pub struct Board {
    pub ram: Vec<u8>,
    pub floppy: Floppy,
    pub irq: LineState,
    pub nmi: LineState,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            ram: vec![0; RAM_SIZE],
            floppy: Floppy::default(),
            irq: LineState::Clear,
            nmi: LineState::Clear,
        }
    }
}

impl InterruptLines for Board {
    fn nmi_line(&mut self, state: LineState) {
        tracing::trace!(?state, "cpu: nmi line");
        self.nmi = state;
    }

    fn irq_line(&mut self, state: LineState) {
        tracing::trace!(?state, "cpu: irq line");
        self.irq = state;
    }
}

impl DmaPort for Board {
    fn dma_read_byte(&mut self) -> u8 {
        self.floppy.sector.pop_front().unwrap_or(0xff)
    }

    fn dma_write_byte(&mut self, value: u8) {
        self.floppy.written.push(value);
    }

    fn terminal_count_pulse(&mut self) {
        self.floppy.terminal_counts += 1;
        tracing::debug!(
            remaining = self.floppy.sector.len(),
            written = self.floppy.written.len(),
            "floppy: terminal count"
        );
    }

    fn memory_read(&mut self, address: u32) -> Result<u8, BusError> {
        self.ram
            .get(address as usize)
            .copied()
            .ok_or(BusError { address })
    }

    fn memory_write(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        let byte = self
            .ram
            .get_mut(address as usize)
            .ok_or(BusError { address })?;
        *byte = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sector_pattern_and_bus_errors() {
        let mut board = Board::default();
        board.floppy.load_sector(0x5a);

        assert_eq!(board.dma_read_byte(), 0x5a);
        assert_eq!(board.dma_read_byte(), 0x5b);
        assert_eq!(
            board.memory_write(RAM_SIZE as u32, 1),
            Err(BusError {
                address: RAM_SIZE as u32
            })
        );
    }
}
