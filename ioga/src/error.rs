use thiserror::Error;

/// Fault reported by the memory subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus error at address 0x{address:08x}")]
pub struct BusError {
    pub address: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IogaError {
    #[error("interrupt source {0} does not exist")]
    InvalidSource(usize),

    #[error("soft interrupt {0} does not exist")]
    InvalidSoftInterrupt(usize),

    #[error("timer {0} does not exist")]
    InvalidTimer(usize),

    #[error("dma transfer faulted at address 0x{address:08x}")]
    DmaFault {
        address: u32,
        #[source]
        source: BusError,
    },
}
