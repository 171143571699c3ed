//! Recording collaborator for the unit tests.

use std::collections::VecDeque;

use crate::error::BusError;
use crate::lines::{DmaPort, InterruptLines, LineState};

pub struct TestBoard {
    pub irq: LineState,
    pub nmi: LineState,
    pub irq_transitions: usize,
    pub nmi_transitions: usize,
    /// Bytes the device hands out, in order.
    pub device_data: VecDeque<u8>,
    /// Bytes the device received.
    pub device_written: Vec<u8>,
    pub terminal_counts: usize,
    pub memory: Vec<u8>,
}

impl Default for TestBoard {
    fn default() -> Self {
        Self {
            irq: LineState::Clear,
            nmi: LineState::Clear,
            irq_transitions: 0,
            nmi_transitions: 0,
            device_data: VecDeque::new(),
            device_written: Vec::new(),
            terminal_counts: 0,
            memory: vec![0; 0x1000],
        }
    }
}

impl TestBoard {
    pub fn with_device_data(data: &[u8]) -> Self {
        Self {
            device_data: data.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl InterruptLines for TestBoard {
    fn nmi_line(&mut self, state: LineState) {
        self.nmi = state;
        self.nmi_transitions += 1;
    }

    fn irq_line(&mut self, state: LineState) {
        self.irq = state;
        self.irq_transitions += 1;
    }
}

impl DmaPort for TestBoard {
    fn dma_read_byte(&mut self) -> u8 {
        // an empty device floats the bus
        self.device_data.pop_front().unwrap_or(0xff)
    }

    fn dma_write_byte(&mut self, value: u8) {
        self.device_written.push(value);
    }

    fn terminal_count_pulse(&mut self) {
        self.terminal_counts += 1;
    }

    fn memory_read(&mut self, address: u32) -> Result<u8, BusError> {
        self.memory
            .get(address as usize)
            .copied()
            .ok_or(BusError { address })
    }

    fn memory_write(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        let byte = self
            .memory
            .get_mut(address as usize)
            .ok_or(BusError { address })?;
        *byte = value;
        Ok(())
    }
}
