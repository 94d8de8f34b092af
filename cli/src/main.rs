#![deny(unsafe_code)]

use std::error::Error;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs;

use clap::ArgAction::Set;
use clap::{Args, Parser, Subcommand};
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use iosys::memory::MemoryConfiguration;
use iosys::timing::ChannelTiming;

mod demo;
mod devices;
mod report;
mod words;

use demo::{copy_deck_to_disc, RunReport, Settings, BUFFER};
use report::Reporter;
use words::parse_octal_words;

const ABOUT: &str = "Exercise the HP 3000 Series III I/O processor and channels";

#[derive(Parser, Debug)]
#[clap(version, about = ABOUT, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a deck of cards to disc, reading it through the
    /// multiplexer channel and writing it through the selector
    /// channel
    Run(RunArgs),
    /// Disassemble a channel program held in a file of octal words
    List(ListArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// File of octal words to place in the card reader (a short
    /// demonstration deck is used if this is omitted)
    #[clap(long, action=Set)]
    deck: Option<OsString>,
    /// Number of words for the channel programs to transfer
    /// (defaults to the size of the deck)
    #[clap(long)]
    words: Option<usize>,
    /// Number of installed 64K-word memory banks
    #[clap(long, default_value_t = 2)]
    banks: u8,
    /// Channel cycles per CPU clock tick
    #[clap(long, default_value_t = 1)]
    cycles_per_tick: u32,
    /// Clock ticks the selector channel waits for a device to
    /// request service
    #[clap(long, default_value_t = 1000)]
    chansr_timeout_ticks: u32,
    /// Clock ticks between channel service calls
    #[clap(long, default_value_t = 10)]
    ticks: u32,
    /// Give up after this many service calls
    #[clap(long, default_value_t = 100_000)]
    max_bursts: u32,
    /// Print the run report as JSON instead of text
    #[clap(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// File from which the channel program (octal words) is read
    #[clap(action=Set)]
    input: OsString,
    /// Address (octal) at which the first word is shown
    #[clap(long, default_value = "0")]
    origin: String,
}

#[derive(Debug)]
enum Fail {
    ReadFailed(String),
    Generic(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::Generic(message) | Fail::ReadFailed(message) => f.write_str(message),
        }
    }
}

impl Error for Fail {}

const DEMONSTRATION_DECK: [u16; 8] = [
    0o000001, 0o000002, 0o000004, 0o000010, 0o000020, 0o000040, 0o000100, 0o177777,
];

fn read_words(name: &OsString) -> Result<Vec<u16>, Fail> {
    let text = fs::read_to_string(name).map_err(|e| {
        Fail::ReadFailed(format!("failed to read {}: {e}", name.to_string_lossy()))
    })?;
    parse_octal_words(&text).map_err(|e| {
        Fail::Generic(format!("{}: {e}", name.to_string_lossy()))
    })
}

fn print_report(report: &RunReport) -> Result<(), Box<dyn Error>> {
    let mut out = Reporter::new();
    out.heading("Card reader program")?;
    for step in report.reader_program.iter() {
        out.line(&format!("  {step}"))?;
    }
    out.heading("Disc program")?;
    for step in report.disc_program.iter() {
        out.line(&format!("  {step}"))?;
    }
    out.heading("Interrupts")?;
    for interrupt in report.interrupts.iter() {
        out.line(&format!(
            "  burst {}: device {:o}, status {:06o}",
            interrupt.burst, interrupt.device_number, interrupt.status
        ))?;
    }
    out.line(&format!(
        "  card reader status {:06o}, residue {:06o}, disc status {:06o}",
        report.reader_status, report.residue, report.disc_status
    ))?;
    out.heading("Buffer")?;
    out.dump(BUFFER, &report.buffer)?;
    out.heading("Disc")?;
    out.dump(0, &report.disc)?;
    if report.buffer != report.disc {
        out.warning("the disc does not match the buffer")?;
    }
    out.heading("Channels")?;
    out.line(&format!(
        "  multiplexer: {} active slots, excess {} cycles",
        report.multiplexer.active_count, report.multiplexer.excess_cycles
    ))?;
    out.line(&format!(
        "  selector: {}",
        report.selector.sequencer
    ))?;
    if let Some(reason) = report.selector.last_abort.as_ref() {
        out.warning(&format!("  last selector abort: {reason}"))?;
    }
    out.line(&format!(
        "  finished after {} service bursts of {} ticks at {} cycles per tick",
        report.bursts, report.ticks_per_burst, report.timing.cycles_per_tick
    ))?;
    Ok(())
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let deck: Vec<u16> = match args.deck.as_ref() {
        Some(name) => read_words(name)?,
        None => {
            event!(Level::INFO, "No --deck option specified, using the demonstration deck");
            DEMONSTRATION_DECK.to_vec()
        }
    };
    let settings = Settings {
        memory: MemoryConfiguration { banks: args.banks },
        timing: ChannelTiming {
            cycles_per_tick: args.cycles_per_tick,
            chansr_timeout_ticks: args.chansr_timeout_ticks,
            ..ChannelTiming::default()
        },
        ticks_per_burst: args.ticks,
        max_bursts: args.max_bursts,
        words: args.words,
    };
    event!(Level::DEBUG, "run settings: {settings:?}");
    let report = copy_deck_to_disc(&deck, &settings)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    } else {
        print_report(&report)
    }
}

fn list(args: ListArgs) -> Result<(), Box<dyn Error>> {
    let origin = u16::from_str_radix(&args.origin, 8)
        .map_err(|e| Fail::Generic(format!("invalid origin '{}': {e}", args.origin)))?;
    let words = read_words(&args.input)?;
    if words.len() % 2 != 0 {
        event!(
            Level::WARN,
            "{} holds an odd number of words; the last one is ignored",
            args.input.to_string_lossy()
        );
    }
    for (address, step) in (origin..=u16::MAX)
        .step_by(2)
        .zip(ProgramStep::from_words(&words))
    {
        println!("{address:06o}  {:06o} {:06o}  {step}", step.iocw, step.ioaw);
    }
    Ok(())
}

fn run_command() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/filter/struct.EnvFilter.html
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Box::new(e));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match cli.command {
        Command::Run(args) => run(args),
        Command::List(args) => list(args),
    }
}

fn main() {
    match run_command() {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
