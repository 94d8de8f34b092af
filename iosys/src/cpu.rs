//! The parts of the CPU which the I/O subsystem uses: memory access
//! and two status bits in the CPX1 register.
//!
//! The I/O subsystem never owns the CPU.  Every entry point which
//! needs memory or the status bits takes a `&mut dyn Cpu`.
use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use super::memory::{AccessClass, MemoryConfiguration, MemoryOpFailure, MemoryUnit};

/// The CPX1 bits which the I/O subsystem reads and writes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cpx1 {
    /// An external interrupt has been granted and not yet taken
    /// (cpx1 EXTINTR).
    pub external_interrupt: bool,
    /// A direct I/O instruction timed out on the I/O bus (cpx1
    /// IOTIMER).
    pub io_timer: bool,
}

pub trait Cpu {
    fn read_memory(
        &mut self,
        class: AccessClass,
        address: PhysicalAddress,
    ) -> Result<u16, MemoryOpFailure>;

    fn write_memory(
        &mut self,
        class: AccessClass,
        address: PhysicalAddress,
        value: u16,
    ) -> Result<(), MemoryOpFailure>;

    fn cpx1(&mut self) -> &mut Cpx1;
}

/// A CPU which has memory and status bits but executes no
/// instructions.  This is enough to drive the I/O subsystem from a
/// test harness or a script.
#[derive(Debug)]
pub struct CpuState {
    pub mem: MemoryUnit,
    pub cpx1: Cpx1,
}

impl CpuState {
    pub fn new(config: &MemoryConfiguration) -> CpuState {
        CpuState {
            mem: MemoryUnit::new(config),
            cpx1: Cpx1::default(),
        }
    }
}

impl Cpu for CpuState {
    fn read_memory(
        &mut self,
        class: AccessClass,
        address: PhysicalAddress,
    ) -> Result<u16, MemoryOpFailure> {
        let result = self.mem.fetch(address);
        if let Ok(value) = result {
            event!(Level::TRACE, "{class} read {address} = {value:06o}");
        }
        result
    }

    fn write_memory(
        &mut self,
        class: AccessClass,
        address: PhysicalAddress,
        value: u16,
    ) -> Result<(), MemoryOpFailure> {
        event!(Level::TRACE, "{class} write {address} = {value:06o}");
        self.mem.store(address, value)
    }

    fn cpx1(&mut self) -> &mut Cpx1 {
        &mut self.cpx1
    }
}
