//! The I/O processor.
//!
//! The IOP arbitrates interrupts between up to 32 priority levels and
//! carries the direct I/O instructions (SIN, CIO, SIO, WIO, RIN, TIO,
//! SMSK and RIO) from the CPU to the addressed device.
//!
//! ## Interrupts
//!
//! Two sets of flags indexed by interrupt priority hold the interrupt
//! state.  A bit in the request set means the device is asking for an
//! interrupt.  A bit in the poll set means the device is breaking the
//! priority poll chain, either because it is requesting or because its
//! interrupt has been granted and not yet reset.  A request bit is
//! never set without the poll bit; the poll bit alone holds off lower
//! priority devices while an interrupt handler runs.
//!
//! The poll grants the interrupt of the highest priority (lowest
//! numbered) device in the poll set, but only if that device is
//! actually requesting.
use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

use super::cpu::Cpu;
use super::device::DeviceId;
use super::flags::PrioritySet;
use super::system::IoSystem;


/// The device number reserved for the multiplexer channel's
/// diagnostic interface.
pub const MPX_DIAGNOSTIC_DEVICE_NUMBER: DeviceNumber = u7!(127);

/// What a device number is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Device(DeviceId),
    MultiplexerDiagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Iop {
    pub(crate) request_set: PrioritySet<InterruptPriority>,
    pub(crate) poll_set: PrioritySet<InterruptPriority>,
    /// I/O address register; the device number of the interrupt most
    /// recently granted.
    pub(crate) ioa: u16,
    by_number: [Option<Target>; 128],
    by_priority: [Option<DeviceId>; 32],
}

/// A snapshot of the interrupt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterruptStatus {
    pub request_set: u32,
    pub poll_set: u32,
    pub ioa: u16,
}

impl Iop {
    pub(crate) fn new() -> Iop {
        Iop {
            request_set: PrioritySet::new(),
            poll_set: PrioritySet::new(),
            ioa: 0,
            by_number: [None; 128],
            by_priority: [None; 32],
        }
    }
}

impl IoSystem {
    /// Rebuild the device number and interrupt priority dispatch
    /// tables and the interrupt flag sets from the device
    /// configuration.  Disabled devices, and devices whose number or
    /// priority is already taken, are left out.  Returns the I/O
    /// address register.
    pub fn iop_initialize(&mut self, cpu: &mut dyn Cpu) -> u16 {
        let iop = &mut self.iop;
        iop.by_number = [None; 128];
        iop.by_priority = [None; 32];
        iop.request_set.lower_all();
        iop.poll_set.lower_all();
        iop.by_number[usize::from(MPX_DIAGNOSTIC_DEVICE_NUMBER)] =
            Some(Target::MultiplexerDiagnostic);

        let mut any_active = false;
        for (id, attached) in self.devices.enabled() {
            let dib = &attached.dib;
            if let Some(number) = dib.device_number {
                let slot = &mut iop.by_number[usize::from(number)];
                if slot.is_none() {
                    *slot = Some(Target::Device(id));
                } else {
                    event!(
                        Level::WARN,
                        "device number {number:o} is already in use, so {} cannot be addressed",
                        attached.name()
                    );
                }
            }
            if let Some(priority) = dib.interrupt_priority {
                let slot = &mut iop.by_priority[usize::from(priority)];
                if slot.is_some() {
                    event!(
                        Level::WARN,
                        "interrupt priority {priority} of {} is already in use; its interrupts are ignored",
                        attached.name()
                    );
                    continue;
                }
                *slot = Some(id);
                if dib.interrupt_request {
                    iop.request_set.raise(priority);
                    iop.poll_set.raise(priority);
                }
                if dib.interrupt_active {
                    iop.poll_set.raise(priority);
                    any_active = true;
                }
            }
        }
        if !any_active {
            cpu.cpx1().external_interrupt = false;
        }
        event!(
            Level::DEBUG,
            "IOP initialized: request set {:#o}, poll set {:#o}, IOA {:o}",
            iop.request_set.bits(),
            iop.poll_set.bits(),
            iop.ioa
        );
        iop.ioa
    }

    /// Poll for an interrupt.  Returns the device number of the
    /// device whose interrupt was granted, or 0.  While a granted
    /// interrupt has not been taken by the CPU (the external
    /// interrupt flag is still set), no new poll happens and the same
    /// device number is returned.
    pub fn iop_poll(&mut self, cpu: &mut dyn Cpu) -> u16 {
        if cpu.cpx1().external_interrupt {
            return self.iop.ioa;
        }
        let mask = self.iop.poll_set.highest_priority_mask();
        if mask & self.iop.request_set.bits() == 0 {
            return 0;
        }
        let Some(priority) = self.iop.poll_set.highest_priority_raised_flag() else {
            return 0;
        };
        match self.iop.by_priority[usize::from(priority)] {
            Some(id) => {
                let response = self.devices.call(id, InboundSignal::INTPOLLIN.into(), 0);
                if response.has(OutboundSignal::INTACK) {
                    self.iop.ioa = response.data;
                    cpu.cpx1().external_interrupt = true;
                    event!(
                        Level::DEBUG,
                        "interrupt granted to device {:o} at priority {priority}",
                        response.data
                    );
                } else if response.has(OutboundSignal::INTPOLLOUT) {
                    self.iop.ioa = 0;
                    self.iop.poll_set.lower(priority);
                    event!(
                        Level::DEBUG,
                        "device at priority {priority} withdrew its interrupt request"
                    );
                }
            }
            None => {
                event!(
                    Level::WARN,
                    "interrupt requested at priority {priority} but no device has that priority"
                );
                self.iop.ioa = 0;
                self.iop.poll_set.lower(priority);
            }
        }
        self.iop.request_set.lower(priority);
        self.iop.ioa
    }

    /// Execute a direct I/O instruction against `device_number` (only
    /// the low seven bits are used).  Returns the data word supplied
    /// by the device.  An I/O bus timeout (no device answered) sets
    /// the CPU's I/O timer flag and returns 0.
    pub fn iop_direct_io(
        &mut self,
        cpu: &mut dyn Cpu,
        device_number: u16,
        command: IoCommand,
        write_value: u16,
    ) -> u16 {
        let number = DeviceNumber::truncating_from((device_number & 0o177) as u8);
        let span = span!(Level::TRACE, "direct_io", %command, device = %number);
        let _enter = span.enter();
        let inbound = InboundSet::from(command.signal());

        if command == IoCommand::SMSK {
            let mut found = false;
            for id in self.devices.enabled_by_number() {
                let has_mask = self
                    .devices
                    .dib(id)
                    .is_some_and(|dib| dib.interrupt_mask.is_some());
                if has_mask {
                    found = true;
                    let response = self.devices.call(id, inbound, write_value);
                    if response.has(OutboundSignal::INTREQ) {
                        self.iop_assert_intreq(id);
                    }
                }
            }
            if !found {
                event!(Level::DEBUG, "no device accepts the interrupt mask; I/O timeout");
                cpu.cpx1().io_timer = true;
            }
            return 0;
        }

        match self.iop.by_number[usize::from(number)] {
            None => {
                event!(Level::DEBUG, "no device {number:o}; I/O timeout");
                cpu.cpx1().io_timer = true;
                0
            }
            Some(Target::MultiplexerDiagnostic) => {
                self.mpx_diagnostic_interface(inbound, write_value).data
            }
            Some(Target::Device(id)) => {
                let response = self.devices.call(id, inbound, write_value);
                self.route_signals(cpu, id, response.signals);
                if command == IoCommand::RIN {
                    if let Some(priority) = self.devices.dib(id).and_then(|dib| dib.interrupt_priority) {
                        if !self.iop.request_set.is_raised(priority) {
                            self.iop.poll_set.lower(priority);
                        }
                    }
                }
                response.data
            }
        }
    }

    /// A device requests an interrupt.  Does nothing for a device
    /// which has no interrupt priority.
    pub fn iop_assert_intreq(&mut self, id: DeviceId) {
        if let Some(priority) = self.devices.dib(id).and_then(|dib| dib.interrupt_priority) {
            event!(Level::TRACE, "interrupt request at priority {priority}");
            self.iop.request_set.raise(priority);
            self.iop.poll_set.raise(priority);
        }
    }

    /// Warn every device that power is failing.
    pub fn iop_assert_pfwarn(&mut self) {
        event!(Level::INFO, "power fail warning");
        for id in self.devices.enabled_by_number() {
            let response = self
                .devices
                .call(id, InboundSignal::PFWARN.into(), 0);
            if response.has(OutboundSignal::INTREQ) {
                self.iop_assert_intreq(id);
            }
        }
    }

    /// The interrupt request set, as consulted by the CPU.
    pub fn iop_interrupt_request_set(&self) -> u32 {
        self.iop.request_set.bits()
    }

    pub fn interrupt_status(&self) -> InterruptStatus {
        InterruptStatus {
            request_set: self.iop.request_set.bits(),
            poll_set: self.iop.poll_set.bits(),
            ioa: self.iop.ioa,
        }
    }
}
