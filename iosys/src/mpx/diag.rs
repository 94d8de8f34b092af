//! The multiplexer channel's diagnostic interface.
//!
//! The channel answers direct I/O at device number 127.  The control
//! word (written by CIO) selects one of the register RAMs and a slot
//! within it; WIO and RIO then write and read the selected word.
//! TIO returns the status word.
use tracing::{event, Level};

use base::prelude::*;

use super::super::system::IoSystem;
use super::{Aux, MpxState, SLOT_COUNT};

pub const DIAG_MASTER_RESET: u16 = 0o100000;
pub const DIAG_INCREMENT_AFTER_READ: u16 = 0o040000;
/// Store the address with bad parity.
pub const DIAG_BAD_PARITY: u16 = 0o020000;
pub const DIAG_REGISTER_SELECT: u16 = 0o007000;
const DIAG_REGISTER_SHIFT: u32 = 9;
pub const DIAG_RAM_ADDRESS: u16 = 0o000017;

pub const DIAG_STATUS_IDLE: u16 = 0o100000;
pub const DIAG_STATUS_STATE_PARITY: u16 = 0o040000;
pub const DIAG_STATUS_ADDRESS_PARITY: u16 = 0o020000;
pub const DIAG_STATUS_ROLLOVER: u16 = 0o010000;
pub const DIAG_STATUS_DEVICE_END: u16 = 0o004000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterSelect {
    Address,
    Order,
    Counter,
    State,
    Aux,
}

impl RegisterSelect {
    fn from_control_word(control_word: u16) -> Option<RegisterSelect> {
        match (control_word & DIAG_REGISTER_SELECT) >> DIAG_REGISTER_SHIFT {
            0 => Some(RegisterSelect::Address),
            1 => Some(RegisterSelect::Order),
            2 => Some(RegisterSelect::Counter),
            3 => Some(RegisterSelect::State),
            4 => Some(RegisterSelect::Aux),
            _ => None,
        }
    }
}

impl IoSystem {
    pub(crate) fn mpx_diagnostic_interface(&mut self, inbound: InboundSet, data: u16) -> SignalsData {
        let mut response = SignalsData::none();
        for signal in inbound.iter() {
            match signal {
                InboundSignal::DCONTSTB => {
                    if data & DIAG_MASTER_RESET != 0 {
                        self.mpx_reset();
                    }
                    self.mpx.control_word = data & !DIAG_MASTER_RESET;
                    self.mpx.rollover = false;
                    event!(
                        Level::DEBUG,
                        "multiplexer diagnostic control word {:06o}",
                        self.mpx.control_word
                    );
                }
                InboundSignal::DSTATSTB => {
                    response.data = self.mpx_diagnostic_status();
                }
                InboundSignal::DWRITESTB => {
                    self.mpx_diagnostic_write(data);
                }
                InboundSignal::DREADSTB => {
                    response.data = self.mpx_diagnostic_read();
                }
                InboundSignal::INTPOLLIN => {
                    response.signals |= OutboundSignal::INTPOLLOUT;
                }
                InboundSignal::DSETINT
                | InboundSignal::DSTARTIO
                | InboundSignal::DRESETINT
                | InboundSignal::DSETMASK
                | InboundSignal::DEVNODB
                | InboundSignal::PFWARN
                | InboundSignal::ACKSR
                | InboundSignal::TOGGLESR
                | InboundSignal::TOGGLESIOOK
                | InboundSignal::TOGGLEINXFER
                | InboundSignal::TOGGLEOUTXFER
                | InboundSignal::READNEXTWD
                | InboundSignal::SETINT
                | InboundSignal::SETJMP
                | InboundSignal::PCMD1
                | InboundSignal::PCONTSTB
                | InboundSignal::PSTATSTB
                | InboundSignal::PWRITESTB
                | InboundSignal::PREADSTB
                | InboundSignal::EOT
                | InboundSignal::CHANSO
                | InboundSignal::XFERERROR => {}
            }
        }
        response
    }

    fn mpx_diagnostic_slot(&self) -> usize {
        usize::from(self.mpx.control_word & DIAG_RAM_ADDRESS) % SLOT_COUNT
    }

    fn mpx_diagnostic_status(&self) -> u16 {
        let slot = self.mpx_diagnostic_slot();
        let regs = &self.mpx.ram[slot];
        let mut status = slot as u16;
        if self.mpx.is_idle {
            status |= DIAG_STATUS_IDLE;
        }
        if MpxState::decode(regs.state).is_none() {
            status |= DIAG_STATUS_STATE_PARITY;
        }
        if !regs.address_parity_ok() {
            status |= DIAG_STATUS_ADDRESS_PARITY;
        }
        if self.mpx.rollover {
            status |= DIAG_STATUS_ROLLOVER;
        }
        if self.mpx.device_end {
            status |= DIAG_STATUS_DEVICE_END;
        }
        status
    }

    fn mpx_diagnostic_read(&mut self) -> u16 {
        let control_word = self.mpx.control_word;
        let increment = control_word & DIAG_INCREMENT_AFTER_READ != 0;
        let slot = self.mpx_diagnostic_slot();
        let regs = &mut self.mpx.ram[slot];
        match RegisterSelect::from_control_word(control_word) {
            Some(RegisterSelect::Address) => {
                let value = regs.address;
                if increment {
                    regs.set_address(value.wrapping_add(1));
                }
                value
            }
            Some(RegisterSelect::Order) => u16::from(regs.order),
            Some(RegisterSelect::Counter) => {
                let value = regs.counter;
                if increment {
                    let (counter, rolled_over) = value.overflowing_increment();
                    regs.counter = counter;
                    if rolled_over {
                        self.mpx.rollover = true;
                    }
                }
                u16::from(value)
            }
            Some(RegisterSelect::State) => u16::from(regs.state),
            Some(RegisterSelect::Aux) => u16::from(regs.aux.pack()),
            None => 0,
        }
    }

    fn mpx_diagnostic_write(&mut self, data: u16) {
        let control_word = self.mpx.control_word;
        let slot = self.mpx_diagnostic_slot();
        let regs = &mut self.mpx.ram[slot];
        match RegisterSelect::from_control_word(control_word) {
            Some(RegisterSelect::Address) => {
                regs.set_address(data);
                if control_word & DIAG_BAD_PARITY != 0 {
                    regs.address_parity = !regs.address_parity;
                }
            }
            Some(RegisterSelect::Order) => regs.order = (data & 0o37) as u8,
            Some(RegisterSelect::Counter) => regs.counter = WordCount::truncating_from(data & 0o7777),
            Some(RegisterSelect::State) => regs.state = (data & 0o17) as u8,
            Some(RegisterSelect::Aux) => regs.aux = Aux::unpack((data & 0o177) as u8),
            None => {
                event!(
                    Level::DEBUG,
                    "diagnostic write of {data:06o} to an unimplemented register"
                );
            }
        }
    }
}
