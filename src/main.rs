mod board;

use std::{env, path::PathBuf, process};

use ioga::registers::{
    DMA_FDC_CONTROL, DMA_FDC_REAL_ADDRESS, DMA_FDC_TRANSFER_COUNT, ICR_BASE,
    INTERRUPT_ENABLE_EXTERNAL, IRQ_FLOPPY, IRQ_TIMER0, IRQ_TIMER1, TIMER_PRESCALER, TIMER0,
    TIMER1, TIMER1_START,
};
use ioga::{Ioga, IogaConfig, IogaError, InterruptLine, LineState};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::board::{Board, SECTOR_SIZE};

/// Emulated time between two looks at the interrupt lines.
const SLICE_NS: u64 = 10_000;

/// Where the floppy sector lands in RAM.
const BUFFER_ADDRESS: u32 = 0x1000;

#[derive(Debug)]
struct Args {
    /// Heartbeat periods to run for.
    ticks: u64,
    /// Bytes moved by the floppy DMA transfer.
    bytes: u32,
    log_dir: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            ticks: 3,
            bytes: SECTOR_SIZE as u32,
            log_dir: None,
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut it = env::args().skip(1);

    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--ticks" => {
                args.ticks = value()?.parse().map_err(|e| format!("--ticks: {e}"))?;
            }
            "--bytes" => {
                args.bytes = value()?.parse().map_err(|e| format!("--bytes: {e}"))?;
            }
            "--log-file" => args.log_dir = Some(PathBuf::from(value()?)),
            _ => return Err(format!("unknown argument {arg}")),
        }
    }

    Ok(args)
}

/// Installs the subscriber, `RUST_LOG` overrides the default `info` level.
/// The returned guard flushes the log file when dropped.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(dir) = log_dir {
        let appender = tracing_appender::rolling::never(dir, "interpro.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

fn icr(source: usize) -> u32 {
    ICR_BASE + 2 * source as u32
}

/// Programs vectors and timers the way the boot PROM leaves them, then starts
/// a floppy read into RAM.
fn boot(ioga: &mut Ioga<Board>, bytes: u32) {
    ioga.write_half_word(icr(IRQ_TIMER0), INTERRUPT_ENABLE_EXTERNAL | 0x11);
    ioga.write_half_word(icr(IRQ_TIMER1), INTERRUPT_ENABLE_EXTERNAL | 0x12);
    ioga.write_half_word(icr(IRQ_FLOPPY), 0x0621);

    ioga.write_word(TIMER_PRESCALER, 0x05aa_06da);
    ioga.write_word(TIMER1, TIMER1_START | 100);

    ioga.wiring_mut().floppy.load_sector(0);
    ioga.write_word(DMA_FDC_REAL_ADDRESS, BUFFER_ADDRESS);
    ioga.write_word(DMA_FDC_TRANSFER_COUNT, bytes);
    ioga.write_word(DMA_FDC_CONTROL, 0);
    ioga.drq(LineState::Assert);
}

fn run(args: &Args) -> Result<(), IogaError> {
    let mut ioga = Ioga::new(IogaConfig::default(), Board::default());
    boot(&mut ioga, args.bytes);

    let end = args.ticks.saturating_mul(ioga.config().heartbeat_period());
    let mut terminal_counts = 0;
    let mut acknowledged = 0_usize;

    while ioga.now() < end {
        ioga.run_until(ioga.now().saturating_add(SLICE_NS).min(end))?;

        let floppy = &ioga.wiring().floppy;
        if floppy.terminal_counts() != terminal_counts {
            terminal_counts = floppy.terminal_counts();
            ioga.drq(LineState::Clear);
            ioga.set_irq(IRQ_FLOPPY, LineState::Assert)?;
        }

        while ioga.wiring().irq == LineState::Assert {
            let vector = ioga.acknowledge(InterruptLine::Irq);
            acknowledged += 1;
            tracing::debug!(now = ioga.now(), vector, "cpu: interrupt taken");
        }
    }

    let start = BUFFER_ADDRESS as usize;
    tracing::info!(
        now = ioga.now(),
        acknowledged,
        heartbeat = ioga.read_word(TIMER0),
        timer1 = %format!("{:#x}", ioga.read_word(TIMER1)),
        dma_count = ioga.read_word(DMA_FDC_TRANSFER_COUNT),
        first_bytes = ?&ioga.wiring().ram[start..start + 8],
        "run complete"
    );

    Ok(())
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("usage: interpro [--ticks N] [--bytes N] [--log-file DIR]");
            process::exit(2);
        }
    };

    let guard = init_tracing(args.log_dir.as_ref());
    tracing::info!("interpro v0.1.0");

    if let Err(e) = run(&args) {
        tracing::error!(%e, "gate array stopped");
        drop(guard);
        process::exit(1);
    }
}
