//! The I/O subsystem of one simulated machine: the I/O processor, the
//! multiplexer channel, the selector channel and the devices attached
//! to them.
//!
//! `IoSystem` owns all of this state.  The entry points of each
//! component are implemented in that component's module (`iop`,
//! `mpx`, `sel`) as `impl IoSystem` blocks, because every component
//! calls the devices and most of them call each other.
use std::fmt::{self, Debug, Formatter};

use tracing::{event, Level};

use base::prelude::*;

use super::cpu::Cpu;
use super::device::{Device, DeviceId, DeviceManager, Dib};
use super::fault::AbortReason;
use super::iop::Iop;
use super::memory::AccessClass;
use super::mpx::Multiplexer;
use super::sel::Selector;
use super::timing::{ChannelTiming, CycleBudget};

pub struct IoSystem {
    pub(crate) devices: DeviceManager,
    pub(crate) iop: Iop,
    pub(crate) mpx: Multiplexer,
    pub(crate) sel: Selector,
    pub(crate) timing: ChannelTiming,
}

impl Debug for IoSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoSystem")
            .field("devices", &self.devices)
            .field("iop", &self.iop)
            .field("mpx", &self.mpx)
            .field("sel", &self.sel)
            .field("timing", &self.timing)
            .finish()
    }
}

impl IoSystem {
    pub fn new(timing: ChannelTiming) -> IoSystem {
        IoSystem {
            devices: DeviceManager::new(),
            iop: Iop::new(),
            mpx: Multiplexer::new(),
            sel: Selector::new(),
            timing,
        }
    }

    /// Attach a device.  The device is enabled, but it cannot be
    /// reached until the next call to [`IoSystem::initialize`].
    pub fn attach(&mut self, dib: Dib, device: Box<dyn Device>) -> DeviceId {
        self.devices.attach(dib, device)
    }

    /// Enable or disable a device.  Returns false if there is no
    /// such device.  Takes effect at the next initialization.
    pub fn set_enabled(&mut self, id: DeviceId, enabled: bool) -> bool {
        match self.devices.get_mut(id) {
            Some(attached) => {
                attached.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn dib(&self, id: DeviceId) -> Option<&Dib> {
        self.devices.dib(id)
    }

    /// Mutable access to a device's DIB, for reconfiguring it
    /// between runs.  Changes take effect at the next
    /// initialization.
    pub fn dib_mut(&mut self, id: DeviceId) -> Option<&mut Dib> {
        self.devices.dib_mut(id)
    }

    pub fn timing(&self) -> &ChannelTiming {
        &self.timing
    }

    /// Rebuild the dispatch tables of all three components from the
    /// current device configuration.  This must be done after
    /// configuration changes and before the CPU resumes.  Returns
    /// the I/O address register.
    pub fn initialize(&mut self, cpu: &mut dyn Cpu) -> u16 {
        let ioa = self.iop_initialize(cpu);
        self.mpx_initialize();
        self.sel_initialize();
        ioa
    }

    /// Act on the requests in a device's response.
    pub(crate) fn route_signals(&mut self, cpu: &mut dyn Cpu, id: DeviceId, signals: OutboundSet) {
        if signals.contains(OutboundSignal::INTREQ) {
            self.iop_assert_intreq(id);
        }
        if signals.contains(OutboundSignal::SRn) {
            self.mpx_assert_srn(id);
        }
        if signals.contains(OutboundSignal::CHANSR) {
            self.sel_assert_chansr(id);
        }
        if signals.contains(OutboundSignal::REQ) {
            self.channel_request(cpu, id);
        }
    }

    /// A device asked to start (or finish aborting) a channel
    /// program.  Devices with a service request number use the
    /// multiplexer channel, the others the selector channel.
    pub(crate) fn channel_request(&mut self, cpu: &mut dyn Cpu, id: DeviceId) {
        match self.devices.dib(id).map(|dib| dib.service_request_number) {
            Some(Some(_)) => self.mpx_assert_req(id),
            Some(None) => self.sel_assert_req(cpu, id),
            None => {
                event!(Level::ERROR, "channel request from unknown device {id}");
            }
        }
    }
}

/// Read a word on behalf of a channel, charging the read to the
/// burst's cycle budget.
pub(crate) fn read_word(
    cpu: &mut dyn Cpu,
    class: AccessClass,
    address: PhysicalAddress,
    budget: &mut CycleBudget,
    timing: &ChannelTiming,
) -> Result<u16, AbortReason> {
    budget.charge(timing.cycles_per_read);
    cpu.read_memory(class, address)
        .map_err(AbortReason::memory_read)
}

/// Write a word on behalf of a channel, charging the write to the
/// burst's cycle budget.
pub(crate) fn write_word(
    cpu: &mut dyn Cpu,
    class: AccessClass,
    address: PhysicalAddress,
    value: u16,
    budget: &mut CycleBudget,
    timing: &ChannelTiming,
) -> Result<(), AbortReason> {
    budget.charge(timing.cycles_per_write);
    cpu.write_memory(class, address, value)
        .map_err(AbortReason::memory_write)
}

/// The signals which accompany a data strobe.  `last` is true when
/// the word count is about to roll over.  The last word of an
/// unchained order also ends the block; a read which will be
/// followed by another word asks the device to fetch it.
pub(crate) fn strobe_signals(order: SioOrder, last: bool) -> InboundSet {
    let (strobe, end_block) = if order.is_read() {
        (InboundSignal::PREADSTB, InboundSignal::TOGGLEINXFER)
    } else {
        (InboundSignal::PWRITESTB, InboundSignal::TOGGLEOUTXFER)
    };
    let chained = order.is_chained();
    InboundSet::from(strobe)
        .with_if(last, InboundSignal::EOT)
        .with_if(last && !chained, end_block)
        .with_if(order.is_read() && (chained || !last), InboundSignal::READNEXTWD)
}

#[test]
fn test_strobe_signals() {
    use InboundSignal::*;
    assert_eq!(
        strobe_signals(SioOrder::Read, true),
        PREADSTB | EOT | TOGGLEINXFER
    );
    assert_eq!(
        strobe_signals(SioOrder::ReadChained, true),
        PREADSTB | EOT | READNEXTWD
    );
    assert_eq!(strobe_signals(SioOrder::Read, false), PREADSTB | READNEXTWD);
    assert_eq!(
        strobe_signals(SioOrder::Write, true),
        PWRITESTB | EOT | TOGGLEOUTXFER
    );
    assert_eq!(
        strobe_signals(SioOrder::WriteChained, true),
        InboundSet::from(PWRITESTB) | EOT
    );
    assert_eq!(
        strobe_signals(SioOrder::WriteChained, false),
        InboundSet::from(PWRITESTB)
    );
}
