//! A card-to-disc copy which exercises both channels.
//!
//! The card reader runs a multiplexer channel program which reads
//! the deck into a memory buffer, stores the residue and ends with an
//! interrupt.  The interrupt handler (played here by the run loop)
//! then starts a selector channel program on the disc which seeks to
//! the start of the disc, writes the buffer out and also ends with an
//! interrupt.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::iocw::count_for_words;
use base::prelude::*;
use iosys::cpu::CpuState;
use iosys::device::Dib;
use iosys::iop::InterruptStatus;
use iosys::memory::{MemoryConfiguration, MemoryOpFailure};
use iosys::mpx::MultiplexerStatus;
use iosys::sel::SelectorStatus;
use iosys::timing::ChannelTiming;
use iosys::IoSystem;

use super::devices::{CardReader, DiscDrive};

pub const READER_NUMBER: DeviceNumber = u7!(0o10);
pub const DISC_NUMBER: DeviceNumber = u7!(0o11);
const READER_PRIORITY: InterruptPriority = u5!(4);
const DISC_PRIORITY: InterruptPriority = u5!(5);
const READER_SRN: ServiceRequestNumber = u4!(2);

const READER_PROGRAM: u16 = 0o1000;
const DISC_PROGRAM: u16 = 0o1100;
/// Return Residue, End and Sense store their result into the
/// address word of their own program step.
const READER_RESIDUE: u16 = READER_PROGRAM + 3;
const READER_STATUS: u16 = READER_PROGRAM + 5;
const DISC_STATUS: u16 = DISC_PROGRAM + 5;
pub const BUFFER: u16 = 0o2000;
/// The largest transfer a single Read or Write order can make.
const MAX_WORDS: usize = 0o10000;

#[derive(Debug)]
pub enum DemoFailure {
    EmptyDeck,
    TooManyWords(usize),
    Memory(MemoryOpFailure),
    /// A direct I/O instruction timed out.
    NoResponse(DeviceNumber),
    Stalled { bursts: u32 },
}

impl Display for DemoFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DemoFailure::EmptyDeck => f.write_str("there is nothing to transfer"),
            DemoFailure::TooManyWords(n) => {
                write!(f, "cannot transfer {n} words; the limit is {MAX_WORDS}")
            }
            DemoFailure::Memory(e) => write!(f, "failed to set up memory: {e}"),
            DemoFailure::NoResponse(number) => {
                write!(f, "device {number:o} did not respond to direct I/O")
            }
            DemoFailure::Stalled { bursts } => {
                write!(f, "the copy had not finished after {bursts} service bursts")
            }
        }
    }
}

impl Error for DemoFailure {}

impl From<MemoryOpFailure> for DemoFailure {
    fn from(e: MemoryOpFailure) -> DemoFailure {
        DemoFailure::Memory(e)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub memory: MemoryConfiguration,
    pub timing: ChannelTiming,
    /// Clock ticks between channel service calls.
    pub ticks_per_burst: u32,
    pub max_bursts: u32,
    /// Number of words to read; defaults to the size of the deck.
    pub words: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Interrupt {
    pub burst: u32,
    pub device_number: u16,
    /// The device status returned by TIO in the interrupt handler.
    pub status: u16,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub bursts: u32,
    pub ticks_per_burst: u32,
    pub timing: ChannelTiming,
    pub reader_program: Vec<ProgramStep>,
    pub disc_program: Vec<ProgramStep>,
    pub interrupts: Vec<Interrupt>,
    pub reader_status: u16,
    pub disc_status: u16,
    /// The residue stored by the reader's Return Residue order.
    pub residue: u16,
    pub buffer: Vec<u16>,
    pub disc: Vec<u16>,
    pub interrupt_status: InterruptStatus,
    pub multiplexer: MultiplexerStatus,
    pub selector: SelectorStatus,
}

fn program_words(steps: &[ProgramStep]) -> Vec<u16> {
    steps
        .iter()
        .flat_map(|step| [step.iocw, step.ioaw])
        .collect()
}

fn fetch_absolute(cpu: &CpuState, address: u16) -> Result<u16, MemoryOpFailure> {
    cpu.mem.fetch(PhysicalAddress::absolute(address))
}

fn direct_io(
    system: &mut IoSystem,
    cpu: &mut CpuState,
    number: DeviceNumber,
    command: IoCommand,
) -> Result<u16, DemoFailure> {
    cpu.cpx1.io_timer = false;
    let value = system.iop_direct_io(cpu, u16::from(number), command, 0);
    if cpu.cpx1.io_timer {
        Err(DemoFailure::NoResponse(number))
    } else {
        Ok(value)
    }
}

pub fn copy_deck_to_disc(deck: &[u16], settings: &Settings) -> Result<RunReport, DemoFailure> {
    let words = settings.words.unwrap_or(deck.len());
    if words > MAX_WORDS {
        return Err(DemoFailure::TooManyWords(words));
    }
    let count = u16::try_from(words)
        .ok()
        .and_then(count_for_words)
        .ok_or(DemoFailure::EmptyDeck)?;
    let count = u16::from(count);

    let reader_program = vec![
        ProgramStep::new(SioOrder::Read, count, BUFFER),
        ProgramStep::new(SioOrder::ReturnResidue, 0, 0),
        ProgramStep::new(SioOrder::EndWithInterrupt, 0, 0),
    ];
    let disc_program = vec![
        ProgramStep::new(SioOrder::Control, 0, 0),
        ProgramStep::new(SioOrder::Write, count, BUFFER),
        ProgramStep::new(SioOrder::EndWithInterrupt, 0, 0),
    ];

    let mut cpu = CpuState::new(&settings.memory);
    cpu.mem.load(READER_PROGRAM, &program_words(&reader_program))?;
    cpu.mem.load(DISC_PROGRAM, &program_words(&disc_program))?;
    cpu.mem.load(drt_address(READER_NUMBER), &[READER_PROGRAM])?;
    cpu.mem.load(drt_address(DISC_NUMBER), &[DISC_PROGRAM])?;

    let mut system = IoSystem::new(settings.timing);
    system.attach(
        Dib::new(READER_NUMBER)
            .with_interrupt_priority(READER_PRIORITY)
            .with_service_request_number(READER_SRN),
        Box::new(CardReader::new(deck)),
    );
    let (disc, disc_store) = DiscDrive::new(words);
    system.attach(
        Dib::new(DISC_NUMBER).with_interrupt_priority(DISC_PRIORITY),
        Box::new(disc),
    );
    system.initialize(&mut cpu);

    let span = span!(Level::INFO, "copy", words);
    let _enter = span.enter();
    direct_io(&mut system, &mut cpu, READER_NUMBER, IoCommand::SIO)?;

    let mut interrupts: Vec<Interrupt> = Vec::new();
    let mut finished_at: Option<u32> = None;
    for burst in 0..settings.max_bursts {
        system.mpx_service(&mut cpu, settings.ticks_per_burst);
        system.sel_service(&mut cpu, settings.ticks_per_burst);
        let device_number = system.iop_poll(&mut cpu);
        if device_number == 0 {
            continue;
        }
        // The CPU takes the interrupt.
        cpu.cpx1.external_interrupt = false;
        let Ok(number) = DeviceNumber::try_from(device_number) else {
            event!(Level::ERROR, "interrupt from impossible device number {device_number:o}");
            continue;
        };
        let status = direct_io(&mut system, &mut cpu, number, IoCommand::TIO)?;
        direct_io(&mut system, &mut cpu, number, IoCommand::RIN)?;
        event!(
            Level::INFO,
            "interrupt from device {device_number:o} with status {status:06o} after {burst} bursts"
        );
        interrupts.push(Interrupt {
            burst,
            device_number,
            status,
        });
        if number == READER_NUMBER {
            direct_io(&mut system, &mut cpu, DISC_NUMBER, IoCommand::SIO)?;
        } else if number == DISC_NUMBER {
            finished_at = Some(burst + 1);
            break;
        }
    }
    let Some(bursts) = finished_at else {
        return Err(DemoFailure::Stalled {
            bursts: settings.max_bursts,
        });
    };

    let buffer = (0..words)
        .zip(BUFFER..=u16::MAX)
        .map(|(_, address)| fetch_absolute(&cpu, address))
        .collect::<Result<Vec<u16>, MemoryOpFailure>>()?;
    let disc_contents = disc_store.borrow().clone();
    Ok(RunReport {
        bursts,
        ticks_per_burst: settings.ticks_per_burst,
        timing: *system.timing(),
        reader_program,
        disc_program,
        interrupts,
        reader_status: fetch_absolute(&cpu, READER_STATUS)?,
        disc_status: fetch_absolute(&cpu, DISC_STATUS)?,
        residue: fetch_absolute(&cpu, READER_RESIDUE)?,
        buffer,
        disc: disc_contents,
        interrupt_status: system.interrupt_status(),
        multiplexer: system.mpx_status(),
        selector: system.selector_status(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{STATUS_END_OF_MEDIUM, STATUS_READY};

    fn settings(words: Option<usize>) -> Settings {
        Settings {
            memory: MemoryConfiguration::default(),
            timing: ChannelTiming::default(),
            ticks_per_burst: 10,
            max_bursts: 10_000,
            words,
        }
    }

    #[test]
    fn test_deck_is_copied_to_disc() {
        let deck = [0o1, 0o22, 0o333, 0o4444, 0o55555];
        let report = copy_deck_to_disc(&deck, &settings(None)).expect("copy should finish");
        assert_eq!(report.buffer, deck.to_vec());
        assert_eq!(report.disc, deck.to_vec());
        assert_eq!(report.residue, 0);
        assert_eq!(report.timing, ChannelTiming::default());
        assert_eq!(report.reader_status, STATUS_READY);
        assert_eq!(report.disc_status, STATUS_READY);
        let devices: Vec<u16> = report
            .interrupts
            .iter()
            .map(|interrupt| interrupt.device_number)
            .collect();
        assert_eq!(
            devices,
            vec![u16::from(READER_NUMBER), u16::from(DISC_NUMBER)]
        );
        assert_eq!(report.multiplexer.active_count, 0);
        assert!(report.selector.is_idle);
        assert_eq!(report.interrupt_status.poll_set, 0);
    }

    #[test]
    fn test_short_deck_ends_the_read_early() {
        let deck = [0o7, 0o7];
        let report = copy_deck_to_disc(&deck, &settings(Some(4))).expect("copy should finish");
        assert_eq!(&report.buffer[..2], &[0o7, 0o7]);
        assert_eq!(report.reader_status, STATUS_READY | STATUS_END_OF_MEDIUM);
        // Two of the four words were never read.
        assert_eq!(report.residue, 0o177776);
    }

    #[test]
    fn test_empty_deck_is_rejected() {
        assert!(matches!(
            copy_deck_to_disc(&[], &settings(None)),
            Err(DemoFailure::EmptyDeck)
        ));
    }

    #[test]
    fn test_oversized_transfer_is_rejected() {
        assert!(matches!(
            copy_deck_to_disc(&[1], &settings(Some(MAX_WORDS + 1))),
            Err(DemoFailure::TooManyWords(_))
        ));
    }
}
