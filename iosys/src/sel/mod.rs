//! The selector channel.
//!
//! The selector channel is dedicated to one device at a time, from
//! the SIO which starts its channel program until the program ends.
//! Its sequencer fetches each program step (Fetch), tells the device
//! the order (Execute) and, for the orders which move words, waits
//! for the device to request service (Wait) and transfers one word
//! per request (Transfer).  When a block's word count runs out the
//! channel either fetches the next step or, for a chained order,
//! switches to the prefetched next step (Reload).
//!
//! REQ from a device means "start" when the channel is idle and
//! "stop" when it is busy.  A device answers XFERERROR with REQ, which
//! is how an aborted program ends.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::iocw::{is_illegal_chain, iocw_count, ioaw_bank, same_order_class, word_count, IOCW_CNTL};
use base::prelude::*;

use super::cpu::Cpu;
use super::device::DeviceId;
use super::fault::AbortReason;
use super::memory::AccessClass;
use super::system::{read_word, strobe_signals, write_word, IoSystem};
use super::timing::CycleBudget;

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SelState {
    Idle,
    Fetch,
    Execute,
    /// Waiting for the first service request of a block.  Reported
    /// as `Transfer`.
    Wait,
    Transfer,
    Reload,
}

impl SelState {
    /// The state as the hardware shows it.
    pub fn reported(self) -> SelState {
        match self {
            SelState::Wait => SelState::Transfer,
            other => other,
        }
    }
}

impl Display for SelState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self.reported() {
            SelState::Idle => "Idle",
            SelState::Fetch => "Fetch",
            SelState::Execute => "Execute",
            SelState::Wait | SelState::Transfer => "Transfer",
            SelState::Reload => "Reload",
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Selector {
    pub(crate) is_idle: bool,
    /// The sequencer may run a cycle.
    pub(crate) request: bool,
    pub(crate) sequencer: SelState,
    pub(crate) order: SioOrder,
    pub(crate) active: Option<DeviceId>,
    pub(crate) device_number: DeviceNumber,
    pub(crate) bank: Bank,
    pub(crate) word_count: WordCount,
    pub(crate) program_counter: u16,
    /// The current IOCW.
    pub(crate) control_word: u16,
    /// The current IOAW; for Read and Write, the address of the next
    /// word.
    pub(crate) address_word: u16,
    pub(crate) prefetch_control: Option<u16>,
    pub(crate) prefetch_address: Option<u16>,
    pub(crate) rollover: bool,
    pub(crate) excess_cycles: i32,
    /// Ticks left before the device must request service.
    pub(crate) timer: Option<u32>,
    pub(crate) last_abort: Option<AbortReason>,
}

impl Selector {
    pub(crate) fn new() -> Selector {
        Selector {
            is_idle: true,
            request: false,
            sequencer: SelState::Idle,
            order: SioOrder::End,
            active: None,
            device_number: DeviceNumber::ZERO,
            bank: Bank::ZERO,
            word_count: WordCount::ZERO,
            program_counter: 0,
            control_word: 0,
            address_word: 0,
            prefetch_control: None,
            prefetch_address: None,
            rollover: false,
            excess_cycles: 0,
            timer: None,
            last_abort: None,
        }
    }

    /// The hardware Clear Logic signal.  The cycle carry-over and the
    /// record of the last abort survive.
    fn clear_logic(&mut self) {
        *self = Selector {
            excess_cycles: self.excess_cycles,
            last_abort: self.last_abort,
            ..Selector::new()
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorStatus {
    pub is_idle: bool,
    pub sequencer: SelState,
    pub order: Option<SioOrder>,
    pub device: Option<DeviceId>,
    pub device_number: Option<DeviceNumber>,
    pub bank: Bank,
    pub word_count: WordCount,
    pub program_counter: u16,
    pub address: u16,
    pub request: bool,
    pub timer: Option<u32>,
    /// The word count has just rolled over.
    pub rollover: bool,
    pub last_abort: Option<AbortReason>,
}

impl IoSystem {
    /// Check that the device which owns the channel can still be
    /// reached, and recover its device number.
    pub fn sel_initialize(&mut self) {
        let Some(id) = self.sel.active else {
            return;
        };
        let enabled = self.devices.get(id).is_some_and(|attached| attached.enabled);
        if !enabled {
            event!(
                Level::WARN,
                "selector channel device {id} is no longer present; clearing the channel"
            );
            self.sel.clear_logic();
            return;
        }
        // Some controllers answer for several device numbers, so the
        // number in the DIB is not necessarily the one which started
        // the program.  Ask the device which Device Reference Table
        // entry it uses.
        let drt = self
            .devices
            .call(id, InboundSignal::DEVNODB.into(), 0)
            .data;
        let probed = DeviceNumber::try_from(drt / DRT_ENTRY_WORDS).ok().filter(|n| !n.is_zero());
        match probed.or_else(|| self.devices.dib(id).and_then(|dib| dib.device_number)) {
            Some(number) => self.sel.device_number = number,
            None => {
                event!(
                    Level::WARN,
                    "cannot determine the device number of selector channel device {id}"
                );
            }
        }
        event!(
            Level::DEBUG,
            "selector channel initialized for device {:o} in state {}",
            self.sel.device_number,
            self.sel.sequencer
        );
    }

    /// Clear the channel (the Clear Logic signal).
    pub fn sel_reset(&mut self) {
        event!(Level::DEBUG, "selector channel reset");
        if let Some(id) = self.sel.active {
            if let Some(dib) = self.devices.dib_mut(id) {
                dib.service_request = false;
            }
        }
        self.sel.clear_logic();
        self.sel.excess_cycles = 0;
    }

    pub fn sel_is_idle(&self) -> bool {
        self.sel.is_idle
    }

    /// A device asks to start a channel program, or, when the channel
    /// is already busy, to stop the one in progress.
    pub fn sel_assert_req(&mut self, cpu: &mut dyn Cpu, id: DeviceId) {
        if !self.sel.is_idle {
            event!(
                Level::DEBUG,
                "REQ from {id} while the selector channel is busy; ending the channel program"
            );
            self.sel_end_channel(cpu);
            return;
        }
        let Some(number) = self.devices.dib(id).and_then(|dib| dib.device_number) else {
            event!(
                Level::ERROR,
                "device {id} asked the selector channel to start but has no device number"
            );
            return;
        };
        self.sel.clear_logic();
        self.sel.is_idle = false;
        self.sel.active = Some(id);
        self.sel.device_number = number;
        self.sel.sequencer = SelState::Fetch;
        self.sel.request = true;
        let drt = PhysicalAddress::absolute(drt_address(number));
        match cpu.read_memory(AccessClass::AbsoluteSel, drt) {
            Ok(pointer) => {
                self.sel.program_counter = pointer;
                event!(
                    Level::DEBUG,
                    "selector channel started for device {number:o} at {pointer:06o}"
                );
            }
            Err(e) => {
                let signals = self.sel_abort_channel(AbortReason::memory_read(e));
                self.sel_route(cpu, id, signals);
            }
        }
    }

    /// A device requests service.
    pub fn sel_assert_chansr(&mut self, id: DeviceId) {
        if let Some(dib) = self.devices.dib_mut(id) {
            dib.service_request = true;
        }
        if self.sel.active == Some(id) {
            self.sel.request = true;
        } else {
            event!(
                Level::DEBUG,
                "CHANSR from {id}, which does not own the selector channel"
            );
        }
    }

    /// Run the channel for a burst of `ticks_elapsed` clock ticks.
    pub fn sel_service(&mut self, cpu: &mut dyn Cpu, ticks_elapsed: u32) {
        let span = span!(Level::TRACE, "sel_service", ticks_elapsed);
        let _enter = span.enter();
        if self.sel.request && self.sel.sequencer == SelState::Wait {
            // The device asked for service before the deadline.
            self.sel.timer = None;
        }
        if let Some(remaining) = self.sel.timer {
            if ticks_elapsed >= remaining {
                self.sel.timer = None;
                self.sel_timeout(cpu);
            } else {
                self.sel.timer = Some(remaining - ticks_elapsed);
            }
        }
        let allowance = self
            .timing
            .cycles_for(ticks_elapsed)
            .saturating_sub(self.sel.excess_cycles);
        let mut budget = CycleBudget::new(allowance);
        while self.sel.request && budget.is_available() {
            self.sel_cycle(cpu, &mut budget);
        }
        self.sel.excess_cycles = budget.excess();
        if self.sel.is_idle {
            self.sel.timer = None;
        }
    }

    /// Run one sequencer state, however many cycles it takes.
    /// Returns false if the sequencer was not ready to run.
    pub fn sel_step(&mut self, cpu: &mut dyn Cpu) -> bool {
        if !self.sel.request {
            return false;
        }
        self.sel_cycle(cpu, &mut CycleBudget::unlimited());
        if self.sel.is_idle {
            self.sel.timer = None;
        }
        true
    }

    /// The device did not request service in time.
    pub(crate) fn sel_timeout(&mut self, cpu: &mut dyn Cpu) {
        let Some(id) = self.sel.active else {
            return;
        };
        let signals = self.sel_abort_channel(AbortReason::ChansrTimeout);
        self.sel_route(cpu, id, signals);
    }

    fn sel_cycle(&mut self, cpu: &mut dyn Cpu, budget: &mut CycleBudget) {
        let Some(id) = self.sel.active else {
            self.sel.request = false;
            return;
        };
        budget.charge(self.timing.cycles_per_state);
        let before = self.sel.sequencer;
        let result = match self.sel.sequencer {
            SelState::Idle => {
                self.sel.request = false;
                Ok(OutboundSet::empty())
            }
            SelState::Fetch => self.sel_fetch(cpu, budget),
            SelState::Execute => self.sel_execute(cpu, id, budget),
            SelState::Wait => {
                self.sel.timer = None;
                self.sel.sequencer = SelState::Transfer;
                self.sel_transfer(cpu, id, budget)
            }
            SelState::Transfer => self.sel_transfer(cpu, id, budget),
            SelState::Reload => self.sel_reload(cpu, budget),
        };
        let signals = match result {
            Ok(signals) => signals,
            Err(reason) => self.sel_abort_channel(reason),
        };
        if before != self.sel.sequencer {
            event!(
                Level::DEBUG,
                "selector channel {before:?} -> {:?} ({})",
                self.sel.sequencer,
                self.sel.order
            );
        }
        self.sel_route(cpu, id, signals);
    }

    /// Act on a device's response.
    fn sel_route(&mut self, cpu: &mut dyn Cpu, id: DeviceId, signals: OutboundSet) {
        if signals.contains(OutboundSignal::INTREQ) {
            self.iop_assert_intreq(id);
        }
        if signals.contains(OutboundSignal::REQ) {
            self.channel_request(cpu, id);
        }
        if signals.contains(OutboundSignal::CHANSR) && !self.sel.is_idle {
            self.sel_assert_chansr(id);
        } else if self.sel.is_idle {
            if let Some(dib) = self.devices.dib_mut(id) {
                dib.service_request = false;
            }
        }
    }

    /// The program has finished.  Store the program counter into the
    /// device's Device Reference Table entry and clear the channel.
    fn sel_end_channel(&mut self, cpu: &mut dyn Cpu) {
        if let Some(id) = self.sel.active {
            let drt = PhysicalAddress::absolute(drt_address(self.sel.device_number));
            if let Err(e) = cpu.write_memory(AccessClass::AbsoluteSel, drt, self.sel.program_counter) {
                event!(
                    Level::WARN,
                    "could not store the selector channel program counter: {e}"
                );
            }
            if let Some(dib) = self.devices.dib_mut(id) {
                dib.service_request = false;
            }
            event!(
                Level::DEBUG,
                "selector channel program for device {:o} ended at {:06o}",
                self.sel.device_number,
                self.sel.program_counter
            );
        }
        self.sel.clear_logic();
    }

    /// Signal XFERERROR to the device.  The channel stays busy until
    /// the device answers with REQ.
    fn sel_abort_channel(&mut self, reason: AbortReason) -> OutboundSet {
        event!(
            Level::WARN,
            "selector channel program for device {:o} aborted after {reason}",
            self.sel.device_number
        );
        self.sel.last_abort = Some(reason);
        self.sel.request = false;
        self.sel.timer = None;
        match self.sel.active {
            Some(id) => {
                self.devices
                    .call(id, InboundSignal::XFERERROR | InboundSignal::CHANSO, 0)
                    .signals
            }
            None => OutboundSet::empty(),
        }
    }

    fn sel_read_program(&mut self, cpu: &mut dyn Cpu, offset: u16, budget: &mut CycleBudget) -> Result<u16, AbortReason> {
        read_word(
            cpu,
            AccessClass::AbsoluteSel,
            PhysicalAddress::absolute(offset),
            budget,
            &self.timing,
        )
    }

    fn sel_fetch(&mut self, cpu: &mut dyn Cpu, budget: &mut CycleBudget) -> Result<OutboundSet, AbortReason> {
        self.sel.timer = None;
        let pc = self.sel.program_counter;
        let iocw = match self.sel.prefetch_control.take() {
            Some(word) => word,
            None => self.sel_read_program(cpu, pc, budget)?,
        };
        let ioaw = match self.sel.prefetch_address.take() {
            Some(word) => word,
            None => self.sel_read_program(cpu, pc.wrapping_add(1), budget)?,
        };
        self.sel.program_counter = pc.wrapping_add(2);
        self.sel.control_word = iocw;
        self.sel.address_word = ioaw;
        self.sel.order = SioOrder::decode(iocw);
        if is_illegal_chain(iocw) {
            return Err(AbortReason::IllegalOrder(iocw));
        }
        self.sel.sequencer = SelState::Execute;
        Ok(OutboundSet::empty())
    }

    /// Read the next program step ahead of time, ignoring failures.
    fn sel_prefetch(&mut self, cpu: &mut dyn Cpu, budget: &mut CycleBudget) {
        let pc = self.sel.program_counter;
        if self.sel.prefetch_control.is_none() {
            self.sel.prefetch_control = self.sel_read_program(cpu, pc, budget).ok();
        } else if self.sel.prefetch_address.is_none() {
            self.sel.prefetch_address = self.sel_read_program(cpu, pc.wrapping_add(1), budget).ok();
        }
    }

    /// Store a result into the second word of the current step.
    fn sel_store_result(&mut self, cpu: &mut dyn Cpu, value: u16, budget: &mut CycleBudget) -> Result<(), AbortReason> {
        write_word(
            cpu,
            AccessClass::AbsoluteSel,
            PhysicalAddress::absolute(self.sel.program_counter.wrapping_sub(1)),
            value,
            budget,
            &self.timing,
        )
    }

    fn sel_execute(&mut self, cpu: &mut dyn Cpu, id: DeviceId, budget: &mut CycleBudget) -> Result<OutboundSet, AbortReason> {
        use InboundSignal::*;
        let order = self.sel.order;
        let (inbound, data) = match order {
            SioOrder::Jump | SioOrder::ReturnResidue | SioOrder::SetBank => (InboundSet::empty(), 0),
            SioOrder::JumpConditional => (InboundSet::from(SETJMP), 0),
            SioOrder::Interrupt => (InboundSet::from(SETINT), 0),
            SioOrder::End => (PSTATSTB | TOGGLESIOOK, 0),
            SioOrder::EndWithInterrupt => (PSTATSTB | TOGGLESIOOK | SETINT, 0),
            SioOrder::Sense => (InboundSet::from(PSTATSTB), 0),
            SioOrder::Control => (InboundSet::from(PCMD1), self.sel.control_word & IOCW_CNTL),
            SioOrder::Write | SioOrder::WriteChained => (InboundSet::from(TOGGLEOUTXFER), 0),
            SioOrder::Read | SioOrder::ReadChained => (InboundSet::from(TOGGLEINXFER), 0),
        };
        let response = if inbound.is_empty() {
            SignalsData::none()
        } else {
            let response = self.devices.call(id, inbound | CHANSO, data);
            if !response.has(OutboundSignal::CHANACK) {
                event!(
                    Level::DEBUG,
                    "device did not acknowledge {order}; ending the channel program"
                );
                self.sel_end_channel(cpu);
                return Ok(response.signals);
            }
            response
        };

        match order {
            SioOrder::Jump => {
                self.sel.program_counter = self.sel.address_word;
                self.sel.sequencer = SelState::Fetch;
            }
            SioOrder::JumpConditional => {
                if response.has(OutboundSignal::JMPMET) {
                    self.sel.program_counter = self.sel.address_word;
                }
                self.sel.sequencer = SelState::Fetch;
            }
            SioOrder::ReturnResidue => {
                self.sel_store_result(cpu, iocw_count(self.sel.word_count), budget)?;
                self.sel.sequencer = SelState::Fetch;
            }
            SioOrder::SetBank => {
                self.sel.bank = ioaw_bank(self.sel.address_word);
                self.sel.sequencer = SelState::Fetch;
            }
            SioOrder::Interrupt => {
                self.sel.sequencer = SelState::Fetch;
            }
            SioOrder::Sense => {
                self.sel_store_result(cpu, response.data, budget)?;
                self.sel.sequencer = SelState::Fetch;
            }
            SioOrder::End | SioOrder::EndWithInterrupt => {
                self.sel_store_result(cpu, response.data, budget)?;
                self.sel_end_channel(cpu);
            }
            SioOrder::Control
            | SioOrder::Write
            | SioOrder::WriteChained
            | SioOrder::Read
            | SioOrder::ReadChained => {
                self.sel.word_count = word_count(self.sel.control_word);
                self.sel.request = false;
                self.sel.timer = Some(self.timing.chansr_timeout_ticks);
                self.sel.sequencer = SelState::Wait;
                if order == SioOrder::ReadChained {
                    self.sel_prefetch(cpu, budget);
                }
            }
        }
        Ok(response.signals)
    }

    fn sel_transfer(&mut self, cpu: &mut dyn Cpu, id: DeviceId, budget: &mut CycleBudget) -> Result<OutboundSet, AbortReason> {
        let order = self.sel.order;
        if order == SioOrder::Control {
            self.sel.request = false;
            let response = self.devices.call(
                id,
                InboundSignal::PCONTSTB | InboundSignal::CHANSO,
                self.sel.address_word,
            );
            self.sel.sequencer = SelState::Reload;
            self.sel.request = true;
            return Ok(response.signals);
        }

        let address = PhysicalAddress::new(self.sel.bank, self.sel.address_word);
        let last = self.sel.word_count == WordCount::MAX;
        let strobe = strobe_signals(order, last) | InboundSignal::CHANSO;
        let word = if order.is_write() {
            read_word(cpu, AccessClass::DmaSel, address, budget, &self.timing)?
        } else {
            0
        };
        self.sel.request = false;
        if let Some(dib) = self.devices.dib_mut(id) {
            dib.service_request = false;
        }
        let response = self.devices.call(id, strobe, word);
        if !response.has(OutboundSignal::CHANSR) {
            self.sel_prefetch(cpu, budget);
        }

        if response.has(OutboundSignal::DEVEND) {
            let mut signals = response.signals;
            if !last {
                let end_block = if order.is_read() {
                    InboundSignal::TOGGLEINXFER
                } else {
                    InboundSignal::TOGGLEOUTXFER
                };
                let inbound = (InboundSignal::EOT | InboundSignal::CHANSO)
                    .with_if(!order.is_chained(), end_block);
                signals |= self.devices.call(id, inbound, 0).signals;
            }
            self.sel.sequencer = SelState::Reload;
            self.sel.request = true;
            return Ok(signals);
        }

        if order.is_read() {
            write_word(cpu, AccessClass::DmaSel, address, response.data, budget, &self.timing)?;
        }
        self.sel.address_word = self.sel.address_word.wrapping_add(1);
        let (count, rolled_over) = self.sel.word_count.overflowing_increment();
        self.sel.word_count = count;
        if rolled_over {
            self.sel.rollover = true;
            self.sel.sequencer = SelState::Reload;
            self.sel.request = true;
        }
        Ok(response.signals)
    }

    fn sel_reload(&mut self, cpu: &mut dyn Cpu, budget: &mut CycleBudget) -> Result<OutboundSet, AbortReason> {
        self.sel.rollover = false;
        if !self.sel.order.is_chained() {
            self.sel.sequencer = SelState::Fetch;
            return Ok(OutboundSet::empty());
        }
        let pc = self.sel.program_counter;
        let next_control = match self.sel.prefetch_control {
            Some(word) => word,
            None => self.sel_read_program(cpu, pc, budget)?,
        };
        self.sel.prefetch_control = Some(next_control);
        let next_address = match self.sel.prefetch_address {
            Some(word) => word,
            None => self.sel_read_program(cpu, pc.wrapping_add(1), budget)?,
        };
        self.sel.prefetch_address = Some(next_address);

        if !same_order_class(self.sel.control_word, next_control) {
            return Err(AbortReason::InvalidChainedOrder {
                current: self.sel.control_word,
                next: next_control,
            });
        }
        self.sel.control_word = next_control;
        self.sel.address_word = next_address;
        self.sel.order = SioOrder::decode(next_control);
        self.sel.word_count = word_count(next_control);
        self.sel.program_counter = pc.wrapping_add(2);
        self.sel.prefetch_control = None;
        self.sel.prefetch_address = None;
        self.sel.sequencer = SelState::Transfer;
        self.sel.request = self
            .sel
            .active
            .and_then(|id| self.devices.dib(id))
            .is_some_and(|dib| dib.service_request);
        Ok(OutboundSet::empty())
    }

    pub fn selector_status(&self) -> SelectorStatus {
        let busy = !self.sel.is_idle;
        SelectorStatus {
            is_idle: self.sel.is_idle,
            sequencer: self.sel.sequencer.reported(),
            order: busy.then_some(self.sel.order),
            device: self.sel.active,
            device_number: busy.then_some(self.sel.device_number),
            bank: self.sel.bank,
            word_count: self.sel.word_count,
            program_counter: self.sel.program_counter,
            address: self.sel.address_word,
            request: self.sel.request,
            timer: self.sel.timer,
            rollover: self.sel.rollover,
            last_abort: self.sel.last_abort,
        }
    }
}
