//! Simple devices for the demonstration harness.
//!
//! `CardReader` is a multiplexer channel device which reads words
//! from a deck held in memory.  `DiscDrive` is a selector channel
//! device with a small word-addressed store; a Control order seeks
//! and Read and Write orders transfer from the current position.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{event, Level};

use base::prelude::*;
use iosys::device::{acknowledge_poll, device_number_response, Device, Dib};

/// Status word bit: the device is ready.
pub const STATUS_READY: u16 = 0o100000;
/// Status word bit: the device ran out of data (or space) before the
/// transfer ended.
pub const STATUS_END_OF_MEDIUM: u16 = 0o040000;
/// Status word bit: a channel transfer was aborted.
pub const STATUS_TRANSFER_ERROR: u16 = 0o020000;

/// Signals a multiplexer channel device answers with a service
/// request.
const MPX_PROGRAM_SIGNALS: [InboundSignal; 12] = [
    InboundSignal::PCMD1,
    InboundSignal::SETJMP,
    InboundSignal::SETINT,
    InboundSignal::PSTATSTB,
    InboundSignal::TOGGLESIOOK,
    InboundSignal::PCONTSTB,
    InboundSignal::TOGGLEINXFER,
    InboundSignal::TOGGLEOUTXFER,
    InboundSignal::PREADSTB,
    InboundSignal::PWRITESTB,
    InboundSignal::EOT,
    InboundSignal::READNEXTWD,
];

/// The part of a device's behaviour which is the same for both
/// devices: interrupt polls, interrupt reset, the device number
/// register, SIO and interrupts set by the channel program.
fn common_response(dib: &mut Dib, inbound: InboundSet) -> SignalsData {
    let mut response = SignalsData::none();
    if inbound.contains(InboundSignal::INTPOLLIN) {
        response = acknowledge_poll(dib);
    }
    if inbound.contains(InboundSignal::DEVNODB) {
        response.data = device_number_response(dib).data;
    }
    if inbound.contains(InboundSignal::DRESETINT) {
        dib.interrupt_active = false;
        dib.interrupt_request = false;
    }
    if inbound.contains(InboundSignal::DSTARTIO) {
        response.signals |= OutboundSignal::REQ;
    }
    if inbound.contains(InboundSignal::SETINT) {
        dib.interrupt_request = true;
        response.signals |= OutboundSignal::INTREQ;
    }
    response
}

pub struct CardReader {
    deck: VecDeque<u16>,
    words_read: usize,
    status: u16,
}

impl CardReader {
    pub fn new(deck: &[u16]) -> CardReader {
        CardReader {
            deck: deck.iter().copied().collect(),
            words_read: 0,
            status: STATUS_READY,
        }
    }
}

impl Device for CardReader {
    fn io_interface(&mut self, dib: &mut Dib, inbound: InboundSet, _data: u16) -> SignalsData {
        let mut response = common_response(dib, inbound);
        if inbound.contains(InboundSignal::XFERERROR) {
            event!(Level::WARN, "card reader transfer aborted after {} words", self.words_read);
            self.status |= STATUS_TRANSFER_ERROR;
            return response;
        }
        if inbound.contains(InboundSignal::DSTATSTB) || inbound.contains(InboundSignal::PSTATSTB) {
            response.data = self.status;
        }
        if inbound.contains(InboundSignal::PREADSTB) {
            match self.deck.pop_front() {
                Some(word) => {
                    self.words_read += 1;
                    response.data = word;
                }
                None => {
                    event!(Level::DEBUG, "card reader deck is empty");
                    self.status |= STATUS_END_OF_MEDIUM;
                    response.signals |= OutboundSignal::DEVEND;
                }
            }
        }
        if MPX_PROGRAM_SIGNALS
            .iter()
            .any(|signal| inbound.contains(*signal))
        {
            response.signals |= OutboundSignal::SRn;
        }
        response
    }

    fn name(&self) -> String {
        "card reader".to_string()
    }
}

/// The contents of a disc, shared between the drive and whoever
/// wants to inspect it after a run.
pub type DiscStore = Rc<RefCell<Vec<u16>>>;

pub struct DiscDrive {
    store: DiscStore,
    position: usize,
    status: u16,
}

impl DiscDrive {
    pub fn new(capacity: usize) -> (DiscDrive, DiscStore) {
        let store: DiscStore = Rc::new(RefCell::new(vec![0; capacity]));
        (
            DiscDrive {
                store: Rc::clone(&store),
                position: 0,
                status: STATUS_READY,
            },
            store,
        )
    }

    /// Transfer one word at the current position.  Returns the word
    /// read (0 for a write), or `None` at the end of the medium.
    fn transfer(&mut self, write: Option<u16>) -> Option<u16> {
        let mut store = self.store.borrow_mut();
        let cell = store.get_mut(self.position)?;
        self.position += 1;
        match write {
            Some(value) => {
                *cell = value;
                Some(0)
            }
            None => Some(*cell),
        }
    }
}

impl Device for DiscDrive {
    fn io_interface(&mut self, dib: &mut Dib, inbound: InboundSet, data: u16) -> SignalsData {
        use InboundSignal::*;
        let mut response = common_response(dib, inbound);
        if inbound.contains(XFERERROR) {
            event!(Level::WARN, "disc transfer aborted at word {}", self.position);
            self.status |= STATUS_TRANSFER_ERROR;
            // Finishes the abort.
            response.signals |= OutboundSignal::REQ;
            return response;
        }
        if inbound.contains(CHANSO) {
            response.signals |= OutboundSignal::CHANACK;
        }
        if inbound.contains(DSTATSTB) || inbound.contains(PSTATSTB) {
            response.data = self.status;
        }
        if inbound.contains(PCONTSTB) {
            self.position = usize::from(data);
            event!(Level::DEBUG, "disc seek to {}", self.position);
        }

        let strobe = if inbound.contains(PREADSTB) {
            Some(None)
        } else if inbound.contains(PWRITESTB) {
            Some(Some(data))
        } else {
            None
        };
        let mut at_end = false;
        if let Some(write) = strobe {
            match self.transfer(write) {
                Some(word) => response.data = word,
                None => {
                    event!(Level::DEBUG, "disc transfer ran off the end of the medium");
                    self.status |= STATUS_END_OF_MEDIUM;
                    response.signals |= OutboundSignal::DEVEND;
                    at_end = true;
                }
            }
        }

        let starts_block =
            inbound.contains(TOGGLEINXFER) || inbound.contains(TOGGLEOUTXFER) || inbound.contains(PCMD1);
        let more_words = strobe.is_some()
            && !at_end
            && (!inbound.contains(EOT) || inbound.contains(READNEXTWD));
        if (starts_block && !inbound.contains(EOT)) || more_words {
            response.signals |= OutboundSignal::CHANSR;
        }
        response
    }

    fn name(&self) -> String {
        "disc drive".to_string()
    }
}
