use clap::{Parser, ValueEnum};
use clap_num::number_range;
use interrupts::device_table::{DeviceTable, DeviceTableError};
use interrupts::simulator::{
    simulate, Accounting, EpilogueClock, SimConfig, DEFAULT_CONTEXT_TIME,
    DEFAULT_ISR_CHUNK,
};
use interrupts::timeline::LogFormat;
use interrupts::trace_file::{load_trace, TraceFileError};
use std::io;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Simulate interrupt handling for a single-process CPU trace
///
/// Each line of the trace file is an activity and a value:
///
/// CPU, <duration>     the process uses the CPU for duration ms
/// SYSCALL, <device>   the process requests I/O from device
/// END_IO, <device>    device has finished its I/O operation
///
/// The vector table file holds one ISR address per line, and the
/// device table file holds one I/O delay (ms) per line. In both, the
/// line order gives the device number, starting from 0.
///
/// The resulting timeline, one line per step of the interrupt
/// protocol, is written to the output file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the trace file
    trace: PathBuf,

    /// Path to the interrupt vector table
    vector_table: PathBuf,

    /// Path to the device (I/O delay) table
    device_table: PathBuf,

    /// Path to output file
    #[arg(short, long, default_value = "execution.txt")]
    output: PathBuf,

    /// Time (ms) to save or restore the context
    #[arg(long, default_value_t = DEFAULT_CONTEXT_TIME)]
    context_time: u64,

    /// Largest piece (ms) of ISR body work written on one line
    #[arg(long, value_parser = parse_isr_chunk, default_value_t = DEFAULT_ISR_CHUNK)]
    isr_chunk: NonZeroU64,

    /// Layout of the output lines
    #[arg(long, value_enum, default_value_t = Format::Legacy)]
    format: Format,

    /// How user and overhead time are totalled in the summary
    #[arg(long, value_enum, default_value_t = AccountingArg::Legacy)]
    accounting: AccountingArg,

    /// Clock value after each interrupt returns
    #[arg(long, value_enum, default_value_t = ClockReset::One)]
    clock_reset: ClockReset,

    /// Log more detail to stderr (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Compatible with existing execution logs
    Legacy,
    /// Comma and space between every field
    Uniform,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum AccountingArg {
    /// Fixed charge per interrupt type, as in existing summaries
    Legacy,
    /// Charge the duration of every interrupt line
    Measured,
    /// No summary
    Off,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ClockReset {
    /// Set the clock to 1
    One,
    /// Go back to the time the interrupt started
    Restore,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Legacy => Self::Legacy,
            Format::Uniform => Self::Uniform,
        }
    }
}

impl From<AccountingArg> for Accounting {
    fn from(accounting: AccountingArg) -> Self {
        match accounting {
            AccountingArg::Legacy => Self::Legacy,
            AccountingArg::Measured => Self::Measured,
            AccountingArg::Off => Self::Off,
        }
    }
}

impl From<ClockReset> for EpilogueClock {
    fn from(reset: ClockReset) -> Self {
        match reset {
            ClockReset::One => Self::ResetToOne,
            ClockReset::Restore => Self::RestorePreInterrupt,
        }
    }
}

fn parse_isr_chunk(s: &str) -> Result<NonZeroU64, String> {
    let chunk = number_range(s, 1, u64::MAX)?;
    NonZeroU64::new(chunk).ok_or_else(|| "must be at least 1".to_string())
}

#[derive(Debug, Error)]
enum Error {
    #[error("cannot load device tables: {0}")]
    DeviceTable(#[from] DeviceTableError),
    #[error("cannot load trace: {0}")]
    Trace(#[from] TraceFileError),
    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), Error> {
    let devices = DeviceTable::load(&args.vector_table, &args.device_table)?;
    let events = load_trace(&args.trace)?;

    let config = SimConfig {
        context_time: args.context_time,
        isr_chunk: args.isr_chunk,
        accounting: args.accounting.into(),
        epilogue_clock: args.clock_reset.into(),
    };
    tracing::debug!(?config, "starting simulation");

    let log = simulate(config, &devices, &events);
    log.write_to_file(&args.output, args.format.into())?;
    tracing::info!(
        records = log.len(),
        output = %args.output.display(),
        "wrote execution log"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}
