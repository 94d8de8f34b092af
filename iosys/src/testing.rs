//! Scripted devices for exercising the channels.
use std::cell::RefCell;
use std::rc::Rc;

use base::prelude::*;

use super::cpu::CpuState;
use super::device::{acknowledge_poll, device_number_response, Device, Dib};
use super::memory::MemoryConfiguration;

/// Every call a scripted device received: the inbound signals and
/// the data word.
pub(crate) type CallLog = Rc<RefCell<Vec<(InboundSet, u16)>>>;

type Handler = Box<dyn FnMut(&mut Dib, InboundSet, u16) -> SignalsData>;

pub(crate) struct ScriptedDevice {
    name: String,
    handler: Handler,
    log: CallLog,
}

impl ScriptedDevice {
    pub(crate) fn new<F>(name: &str, handler: F) -> (ScriptedDevice, CallLog)
    where
        F: FnMut(&mut Dib, InboundSet, u16) -> SignalsData + 'static,
    {
        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        (
            ScriptedDevice {
                name: name.to_string(),
                handler: Box::new(handler),
                log: Rc::clone(&log),
            },
            log,
        )
    }

    pub(crate) fn boxed<F>(name: &str, handler: F) -> (Box<dyn Device>, CallLog)
    where
        F: FnMut(&mut Dib, InboundSet, u16) -> SignalsData + 'static,
    {
        let (device, log) = ScriptedDevice::new(name, handler);
        (Box::new(device), log)
    }
}

impl Device for ScriptedDevice {
    fn io_interface(&mut self, dib: &mut Dib, inbound: InboundSet, data: u16) -> SignalsData {
        self.log.borrow_mut().push((inbound, data));
        (self.handler)(dib, inbound, data)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// The calls in `log` which included `signal`.
pub(crate) fn calls_with(log: &CallLog, signal: InboundSignal) -> Vec<(InboundSet, u16)> {
    log.borrow()
        .iter()
        .filter(|(inbound, _)| inbound.contains(signal))
        .copied()
        .collect()
}

/// The responses common to every scripted device: interrupt polls,
/// the device number register, SIO and interrupts set by the channel
/// program.
fn common_response(dib: &mut Dib, inbound: InboundSet) -> SignalsData {
    let mut response = SignalsData::none();
    if inbound.contains(InboundSignal::INTPOLLIN) {
        response = acknowledge_poll(dib);
    }
    if inbound.contains(InboundSignal::DEVNODB) {
        response.data = device_number_response(dib).data;
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

/// A multiplexer channel device which supplies `read_data` to read
/// strobes, `status` to status strobes, and asks for service after
/// everything except an abort.
pub(crate) fn mpx_handler(
    read_data: u16,
    status: u16,
) -> impl FnMut(&mut Dib, InboundSet, u16) -> SignalsData {
    move |dib: &mut Dib, inbound: InboundSet, _data: u16| {
        let mut response = common_response(dib, inbound);
        if inbound.contains(InboundSignal::XFERERROR) {
            return response;
        }
        if inbound.contains(InboundSignal::PREADSTB) {
            response.data = read_data;
        }
        if inbound.contains(InboundSignal::PSTATSTB) {
            response.data = status;
        }
        response.signals |= OutboundSignal::SRn;
        response
    }
}

/// A selector channel device which acknowledges every order,
/// requests service for each word until the last of the chain, supplies
/// `read_data` to read strobes and `status` to status strobes, and
/// answers an abort with REQ.
pub(crate) fn sel_handler(
    read_data: u16,
    status: u16,
) -> impl FnMut(&mut Dib, InboundSet, u16) -> SignalsData {
    move |dib: &mut Dib, inbound: InboundSet, _data: u16| {
        use InboundSignal::*;
        let mut response = common_response(dib, inbound);
        if inbound.contains(XFERERROR) {
            response.signals |= OutboundSignal::REQ;
            return response;
        }
        if inbound.contains(CHANSO) {
            response.signals |= OutboundSignal::CHANACK;
        }
        if inbound.contains(PREADSTB) {
            response.data = read_data;
        }
        if inbound.contains(PSTATSTB) {
            response.data = status;
        }
        let wants_words = inbound.contains(TOGGLEINXFER)
            || inbound.contains(TOGGLEOUTXFER)
            || inbound.contains(PCMD1);
        let more_words = (inbound.contains(PREADSTB) || inbound.contains(PWRITESTB))
            && (!inbound.contains(EOT) || inbound.contains(READNEXTWD));
        if (wants_words && !inbound.contains(EOT)) || more_words {
            response.signals |= OutboundSignal::CHANSR;
        }
        response
    }
}

pub(crate) fn new_cpu() -> CpuState {
    CpuState::new(&MemoryConfiguration::default())
}
