//! Device interfaces, as the I/O subsystem sees them.
//!
//! Each device has a Device Information Block (DIB) holding the
//! configuration and interrupt/service-request flip-flops which the
//! I/O processor and channels consult, and a single entry point,
//! [`Device::io_interface`], through which it receives signals and
//! returns its response.
//!
//! A device cannot call back into the I/O subsystem while it is
//! handling a signal.  Instead it asks for things by including
//! outbound signals in its response: INTREQ for an interrupt, SRn or
//! CHANSR for channel service and REQ to start (or finish aborting) a
//! channel program.
use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

/// Device Information Block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dib {
    /// Direct I/O address; `None` for a device which cannot be
    /// addressed.
    pub device_number: Option<DeviceNumber>,
    /// `None` for a device which does not interrupt.
    pub interrupt_priority: Option<InterruptPriority>,
    pub interrupt_request: bool,
    pub interrupt_active: bool,
    /// Multiplexer channel slot; `None` for devices which do not use
    /// the multiplexer channel.  Devices without one use the
    /// selector channel.
    pub service_request_number: Option<ServiceRequestNumber>,
    pub service_request: bool,
    /// The interrupt mask bit(s) the device answers to; `None` for a
    /// device which ignores SMSK.
    pub interrupt_mask: Option<u16>,
}

impl Dib {
    pub fn new(device_number: DeviceNumber) -> Dib {
        Dib {
            device_number: Some(device_number),
            ..Dib::default()
        }
    }

    pub fn with_interrupt_priority(self, priority: InterruptPriority) -> Dib {
        Dib {
            interrupt_priority: Some(priority),
            ..self
        }
    }

    pub fn with_service_request_number(self, srn: ServiceRequestNumber) -> Dib {
        Dib {
            service_request_number: Some(srn),
            ..self
        }
    }

    pub fn with_interrupt_mask(self, mask: u16) -> Dib {
        Dib {
            interrupt_mask: Some(mask),
            ..self
        }
    }
}

pub trait Device {
    /// Handle the inbound signals.  `data` is the word on the data
    /// bus (for example the value written by WIO or the word a
    /// channel is writing to the device).  The response carries the
    /// device's outbound signals and the word it places on the bus.
    fn io_interface(&mut self, dib: &mut Dib, inbound: InboundSet, data: u16) -> SignalsData;

    fn name(&self) -> String;
}

/// The standard response to INTPOLLIN: a device with a pending
/// request takes the poll and becomes active, any other passes it
/// on.
pub fn acknowledge_poll(dib: &mut Dib) -> SignalsData {
    if dib.interrupt_request {
        dib.interrupt_request = false;
        dib.interrupt_active = true;
        SignalsData::new(
            OutboundSignal::INTACK,
            dib.device_number.map(u16::from).unwrap_or(0),
        )
    } else {
        SignalsData::signals(OutboundSignal::INTPOLLOUT)
    }
}

/// The standard response to DEVNODB: the device number register
/// supplies the address of the device's Device Reference Table
/// entry.
pub fn device_number_response(dib: &Dib) -> SignalsData {
    SignalsData::new(
        OutboundSet::empty(),
        dib.device_number.map(drt_address).unwrap_or(0),
    )
}

/// Identifies an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceId(usize);

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct AttachedDevice {
    inner: Box<dyn Device>,
    pub(crate) dib: Dib,
    pub(crate) enabled: bool,
}

impl AttachedDevice {
    pub(crate) fn name(&self) -> String {
        self.inner.name()
    }
}

impl Debug for AttachedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("AttachedDevice")
            .field("inner", &format_args!("<device: {}>", self.name()))
            .field("dib", &self.dib)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Manages the collection of attached devices.  Does not correspond
/// to a physical component; the dispatch tables of the I/O processor
/// and the channels are rebuilt from it by their initializers.
#[derive(Debug, Default)]
pub(crate) struct DeviceManager {
    devices: Vec<AttachedDevice>,
}

impl DeviceManager {
    pub(crate) fn new() -> DeviceManager {
        DeviceManager::default()
    }

    pub(crate) fn attach(&mut self, dib: Dib, device: Box<dyn Device>) -> DeviceId {
        let id = DeviceId(self.devices.len());
        event!(
            Level::DEBUG,
            "attaching {} as {id} with {:?}",
            device.name(),
            dib
        );
        self.devices.push(AttachedDevice {
            inner: device,
            dib,
            enabled: true,
        });
        id
    }

    pub(crate) fn get(&self, id: DeviceId) -> Option<&AttachedDevice> {
        self.devices.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: DeviceId) -> Option<&mut AttachedDevice> {
        self.devices.get_mut(id.0)
    }

    pub(crate) fn dib(&self, id: DeviceId) -> Option<&Dib> {
        self.get(id).map(|attached| &attached.dib)
    }

    pub(crate) fn dib_mut(&mut self, id: DeviceId) -> Option<&mut Dib> {
        self.get_mut(id).map(|attached| &mut attached.dib)
    }

    /// The enabled devices ordered by device number.  Devices
    /// without a device number come last.
    pub(crate) fn enabled_by_number(&self) -> Vec<DeviceId> {
        let mut ids: Vec<(Option<DeviceNumber>, DeviceId)> = self
            .enabled()
            .map(|(id, attached)| (attached.dib.device_number, id))
            .collect();
        ids.sort_by_key(|(number, id)| (number.is_none(), *number, *id));
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// The enabled devices, in attachment order.
    pub(crate) fn enabled(&self) -> impl Iterator<Item = (DeviceId, &AttachedDevice)> + '_ {
        self.devices
            .iter()
            .enumerate()
            .filter(|(_, attached)| attached.enabled)
            .map(|(i, attached)| (DeviceId(i), attached))
    }

    /// Assert `inbound` to a device and collect its response.  An
    /// unknown device does not respond.
    pub(crate) fn call(&mut self, id: DeviceId, inbound: InboundSet, data: u16) -> SignalsData {
        match self.devices.get_mut(id.0) {
            Some(attached) => {
                let name = attached.inner.name();
                let span = span!(Level::TRACE, "device", device = %name);
                let _enter = span.enter();
                let response = attached.inner.io_interface(&mut attached.dib, inbound, data);
                event!(
                    Level::TRACE,
                    "received {} with data {:06o}, returned {} with data {:06o}",
                    inbound,
                    data,
                    response.signals,
                    response.data
                );
                response
            }
            None => {
                event!(Level::ERROR, "signals {inbound} sent to unknown device {id}");
                SignalsData::none()
            }
        }
    }
}

#[test]
fn test_acknowledge_poll() {
    let mut dib = Dib::new(u7!(12)).with_interrupt_priority(u5!(3));
    assert_eq!(
        acknowledge_poll(&mut dib),
        SignalsData::signals(OutboundSignal::INTPOLLOUT)
    );
    dib.interrupt_request = true;
    assert_eq!(
        acknowledge_poll(&mut dib),
        SignalsData::new(OutboundSignal::INTACK, 12)
    );
    assert!(dib.interrupt_active);
    assert!(!dib.interrupt_request);
}

#[test]
fn test_device_number_response() {
    let dib = Dib::new(u7!(10));
    assert_eq!(device_number_response(&dib).data, 40);
    assert_eq!(device_number_response(&Dib::default()).data, 0);
}

#[test]
fn test_unknown_device_does_not_respond() {
    let mut devices = DeviceManager::new();
    assert_eq!(
        devices.call(DeviceId(3), InboundSignal::DSTATSTB.into(), 0),
        SignalsData::none()
    );
}
