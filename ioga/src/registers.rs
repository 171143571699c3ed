//! # Register file
//!
//! Offsets, bit layouts and interrupt source numbering of the gate array.
//!
//! ```text
//! 0x30 ┌──────────────────────────────┐
//!      │ floppy DMA (4 x 32 bit)      │ real addr, virtual addr, count, control
//! 0x5c ├──────────────────────────────┤
//!      │ interrupt vectors (19 x 16)  │ source n at 0x5c + 2n
//! 0x82 ├──────────────┬───────────────┤
//!      │ soft int (8) │ NMI ctrl (8)  │
//! 0x88 ├──────────────┴───────────────┤
//!      │ prescaler, timer 0, timer 1  │
//! 0xa0 │ timer 2 ...  0xa8 timer 3    │
//! 0xb0 ├──────────────────────────────┤
//!      │ soft int vectors 8..15 (16)  │
//! 0xbf └──────────────────────────────┘
//! ```

/// Number of vectored (external and internal) interrupt sources.
pub const INTERRUPT_COUNT: usize = 19;

/// Number of interrupts in each of the two software interrupt groups.
pub const SOFT_GROUP_SIZE: usize = 8;

/// Number of timer slots.
pub const TIMER_COUNT: usize = 4;

// Interrupt sources, by their position in the vector register table.
pub const IRQ_TIMER2: usize = 0;
pub const IRQ_TIMER3: usize = 1;
pub const IRQ_SCSI: usize = 2;
pub const IRQ_FLOPPY: usize = 3;
pub const IRQ_PLOTTER: usize = 4;
pub const IRQ_TIMER0: usize = 14;
pub const IRQ_TIMER1: usize = 15;
pub const IRQ_SERIAL_DMA: usize = 16;
pub const IRQ_ETHERNET: usize = 18;

// Vectored interrupt register layout.
pub const INTERRUPT_VECTOR_MASK: u16 = 0x00ff;
pub const INTERRUPT_PENDING: u16 = 0x0100;
pub const INTERRUPT_ENABLE_EXTERNAL: u16 = 0x0200;
pub const INTERRUPT_EDGE: u16 = 0x0400;
pub const INTERRUPT_NEGPOL: u16 = 0x0800;
pub const INTERRUPT_ENABLE_INTERNAL: u16 = 0x1000;
/// Bits 13-15 are not implemented and read back as zero.
pub const INTERRUPT_REGISTER_MASK: u16 = INTERRUPT_VECTOR_MASK
    | INTERRUPT_PENDING
    | INTERRUPT_ENABLE_EXTERNAL
    | INTERRUPT_EDGE
    | INTERRUPT_NEGPOL
    | INTERRUPT_ENABLE_INTERNAL;

/// Enable bits each source honours. A source asserted while none of these
/// bits is set in its register is dropped.
pub const IRQ_ENABLE_MASK: [u16; INTERRUPT_COUNT] = enable_masks();

const fn enable_masks() -> [u16; INTERRUPT_COUNT] {
    let mut masks = [INTERRUPT_ENABLE_EXTERNAL; INTERRUPT_COUNT];
    masks[IRQ_SCSI] |= INTERRUPT_ENABLE_INTERNAL;
    masks[IRQ_FLOPPY] |= INTERRUPT_ENABLE_INTERNAL;
    masks[IRQ_PLOTTER] |= INTERRUPT_ENABLE_INTERNAL;
    masks[IRQ_ETHERNET] |= INTERRUPT_ENABLE_INTERNAL;
    // one enable per serial DMA channel
    masks[IRQ_SERIAL_DMA] |= INTERRUPT_ENABLE_EXTERNAL << 1 | INTERRUPT_ENABLE_EXTERNAL << 2;
    masks
}

/// Vector returned for soft-low interrupt `index`.
#[must_use]
pub const fn soft_low_vector(index: usize) -> u8 {
    // index < 8, so the result stays below 0x100
    (0x8f + index * 0x10) as u8
}

// NMI control register layout.
pub const NMI_ENABLE1: u8 = 0x01;
pub const NMI_EDGE: u8 = 0x02;
pub const NMI_PENDING: u8 = 0x08;
pub const NMI_ENABLE_IN: u8 = 0x10;
pub const NMI_POLARITY: u8 = 0x20;
pub const NMI_ENABLE: u8 = NMI_ENABLE1 | NMI_ENABLE_IN;
pub const NMI_REGISTER_MASK: u8 = NMI_ENABLE1 | NMI_EDGE | NMI_PENDING | NMI_ENABLE_IN | NMI_POLARITY;

// Timer 1 layout.
pub const TIMER1_VMASK: u32 = 0x0000_ffff;
pub const TIMER1_START: u32 = 0x0001_0000;
pub const TIMER1_EXPIRED: u32 = 0x0002_0000;

// Timers 2 and 3 layout.
pub const TIMER3_VMASK: u32 = 0x3fff_ffff;
pub const TIMER3_START: u32 = 0x4000_0000;
pub const TIMER3_EXPIRED: u32 = 0x8000_0000;

/// Field of the prescaler register that clocks timers 1 and 2.
pub const PRESCALER_MASK: u32 = 0x7fff;

// DMA control layout.
/// Set: memory to device. Clear: device to memory.
pub const DMA_CTRL_WRITE: u32 = 0x4000_0000;
/// Set: the address counts down after each byte.
pub const DMA_CTRL_DECREMENT: u32 = 0x2000_0000;

// Register offsets.
pub const DMA_FDC_REAL_ADDRESS: u32 = 0x30;
pub const DMA_FDC_VIRTUAL_ADDRESS: u32 = 0x34;
pub const DMA_FDC_TRANSFER_COUNT: u32 = 0x38;
pub const DMA_FDC_CONTROL: u32 = 0x3c;
pub const ICR_BASE: u32 = 0x5c;
pub const ICR_END: u32 = ICR_BASE + 2 * INTERRUPT_COUNT as u32 - 1;
pub const SOFTINT: u32 = 0x82;
pub const NMICTRL: u32 = 0x83;
pub const TIMER_PRESCALER: u32 = 0x88;
pub const TIMER0: u32 = 0x8c;
pub const TIMER1: u32 = 0x90;
pub const TIMER2: u32 = 0xa0;
pub const TIMER3: u32 = 0xa8;
pub const SOFTINT_VECTOR_BASE: u32 = 0xb0;
pub const SOFTINT_VECTOR_END: u32 = SOFTINT_VECTOR_BASE + 2 * SOFT_GROUP_SIZE as u32 - 1;

/// Natural width of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    HalfWord,
    Word,
}

/// What lives at a register-aligned offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    DmaRealAddress,
    DmaVirtualAddress,
    DmaTransferCount,
    DmaControl,
    InterruptVector(usize),
    SoftInterrupt,
    NmiControl,
    TimerPrescaler,
    Timer(usize),
    SoftInterruptVector(usize),
}

impl Register {
    /// Decodes the register containing `offset`, returning it with its base offset.
    #[must_use]
    pub const fn decode(offset: u32) -> Option<(Self, u32)> {
        let reg = match offset {
            0x30..=0x33 => Self::DmaRealAddress,
            0x34..=0x37 => Self::DmaVirtualAddress,
            0x38..=0x3b => Self::DmaTransferCount,
            0x3c..=0x3f => Self::DmaControl,
            ICR_BASE..=ICR_END => Self::InterruptVector(((offset - ICR_BASE) / 2) as usize),
            SOFTINT => Self::SoftInterrupt,
            NMICTRL => Self::NmiControl,
            0x88..=0x8b => Self::TimerPrescaler,
            0x8c..=0x8f => Self::Timer(0),
            0x90..=0x93 => Self::Timer(1),
            0xa0..=0xa3 => Self::Timer(2),
            0xa8..=0xab => Self::Timer(3),
            SOFTINT_VECTOR_BASE..=SOFTINT_VECTOR_END => {
                Self::SoftInterruptVector(((offset - SOFTINT_VECTOR_BASE) / 2) as usize)
            }
            _ => return None,
        };
        let base = match reg.width() {
            Width::Byte => offset,
            Width::HalfWord => offset & !1,
            Width::Word => offset & !3,
        };

        Some((reg, base))
    }

    #[must_use]
    pub const fn width(self) -> Width {
        match self {
            Self::SoftInterrupt | Self::NmiControl => Width::Byte,
            Self::InterruptVector(_) | Self::SoftInterruptVector(_) => Width::HalfWord,
            _ => Width::Word,
        }
    }
}
