//! InterPro I/O gate array: interrupt arbiter, timer bank and floppy DMA
//! channel, driven by a cooperative scheduler.

#[allow(clippy::cast_possible_truncation)]
pub mod bitwise;

pub mod config;
pub mod dma;
pub mod error;

#[allow(clippy::cast_possible_truncation)]
pub mod interrupt;

#[allow(clippy::module_name_repetitions)]
pub mod ioga;

pub mod lines;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::unreadable_literal)]
pub mod registers;

pub mod scheduler;
pub mod timers;

#[cfg(test)]
mod test_board;

pub use crate::config::IogaConfig;
pub use crate::error::{BusError, IogaError};
pub use crate::ioga::{Ioga, IogaState};
pub use crate::lines::{DmaPort, InterruptLine, InterruptLines, LineState, Wiring};
