//! The multiplexer channel.
//!
//! The multiplexer channel runs up to 16 channel programs at once,
//! one per service request number.  Each program's registers live in
//! a small RAM indexed by service request number.  When a device
//! requests service the channel loads that slot's registers, runs one
//! sequencer state and stores them back.  The lowest numbered request
//! is served first, and priority is reconsidered after every state.
//!
//! A channel program step passes through these states:
//!
//! - C: find the device's Device Reference Table entry and fetch the
//!   program pointer from it (or use a jump target), advancing the
//!   pointer past the step.
//! - A: fetch the IOCW and decode the order.
//! - B: fetch the IOAW, or store a result into it, and tell the
//!   device what the order is.
//! - D: transfer data words (Read, Write) or set the bank (Set Bank).
//!
//! SIO starts a program in state C.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::iocw::{
    is_illegal_chain, iocw_count, ioaw_bank, order_prefix, same_order_class, word_count,
};
use base::prelude::*;

use super::cpu::Cpu;
use super::device::DeviceId;
use super::fault::AbortReason;
use super::flags::PrioritySet;
use super::memory::AccessClass;
use super::system::{read_word, strobe_signals, write_word, IoSystem};
use super::timing::CycleBudget;

mod diag;

pub const SLOT_COUNT: usize = 16;

/// The state of one multiplexer slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MpxState {
    Idle,
    A,
    B,
    C,
    D,
}

const STATE_A: u8 = 0o10;
const STATE_B: u8 = 0o04;
const STATE_C: u8 = 0o02;
const STATE_D: u8 = 0o01;

impl MpxState {
    /// The state RAM encoding: one bit per state, none for Idle.
    pub const fn encode(self) -> u8 {
        match self {
            MpxState::Idle => 0,
            MpxState::A => STATE_A,
            MpxState::B => STATE_B,
            MpxState::C => STATE_C,
            MpxState::D => STATE_D,
        }
    }

    /// Decode a state RAM value.  A value with more than one state
    /// bit set fails the parity check and decodes to `None`.
    pub const fn decode(raw: u8) -> Option<MpxState> {
        match raw & 0o17 {
            0 => Some(MpxState::Idle),
            STATE_A => Some(MpxState::A),
            STATE_B => Some(MpxState::B),
            STATE_C => Some(MpxState::C),
            STATE_D => Some(MpxState::D),
            _ => None,
        }
    }
}

impl Display for MpxState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MpxState::Idle => "Idle",
            MpxState::A => "A",
            MpxState::B => "B",
            MpxState::C => "C",
            MpxState::D => "D",
        })
    }
}

/// The state which follows `raw_state`.  `rollover` means the word
/// count reached zero during the state; `aborted` means the device
/// cut the transfer short with DEVEND, in which case the program
/// pointer has already been advanced and state C is skipped.
pub(crate) fn next_state(raw_state: u8, order: SioOrder, rollover: bool, aborted: bool) -> MpxState {
    match MpxState::decode(raw_state) {
        Some(MpxState::A) => match order {
            SioOrder::SetBank => MpxState::D,
            _ => MpxState::B,
        },
        Some(MpxState::B) => match order {
            SioOrder::End | SioOrder::EndWithInterrupt => MpxState::Idle,
            order if order.is_data_transfer() => MpxState::D,
            _ => MpxState::C,
        },
        Some(MpxState::C) => MpxState::A,
        Some(MpxState::D) => {
            if order == SioOrder::SetBank || rollover {
                MpxState::C
            } else if aborted {
                MpxState::A
            } else {
                MpxState::D
            }
        }
        Some(MpxState::Idle) | None => MpxState::Idle,
    }
}

const AUX_JUMP_MET: u8 = 0o100;
const AUX_IN_BLOCK: u8 = 0o040;
const AUX_TERMINAL_COUNT: u8 = 0o020;
const AUX_BANK: u8 = 0o017;

/// The auxiliary RAM word of a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Aux {
    /// A Conditional Jump's condition was met.
    pub(crate) jump_met: bool,
    /// A Read or Write block is in progress.
    pub(crate) in_block: bool,
    pub(crate) terminal_count: bool,
    pub(crate) bank: Bank,
}

impl Aux {
    pub(crate) fn pack(&self) -> u8 {
        let mut bits = self.bank.bits();
        if self.jump_met {
            bits |= AUX_JUMP_MET;
        }
        if self.in_block {
            bits |= AUX_IN_BLOCK;
        }
        if self.terminal_count {
            bits |= AUX_TERMINAL_COUNT;
        }
        bits
    }

    pub(crate) fn unpack(bits: u8) -> Aux {
        Aux {
            jump_met: bits & AUX_JUMP_MET != 0,
            in_block: bits & AUX_IN_BLOCK != 0,
            terminal_count: bits & AUX_TERMINAL_COUNT != 0,
            bank: Bank::truncating_from(bits & AUX_BANK),
        }
    }
}

/// One slot's worth of the channel's register RAMs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotRegisters {
    pub(crate) state: u8,
    /// IOCW bits 0 to 4.
    pub(crate) order: u8,
    pub(crate) counter: WordCount,
    pub(crate) address: u16,
    /// The address RAM's parity bit; the address and its parity bit
    /// together have an odd number of ones.
    pub(crate) address_parity: bool,
    pub(crate) aux: Aux,
}

impl Default for SlotRegisters {
    fn default() -> SlotRegisters {
        SlotRegisters {
            state: MpxState::Idle.encode(),
            order: 0,
            counter: WordCount::ZERO,
            address: 0,
            address_parity: true,
            aux: Aux::default(),
        }
    }
}

impl SlotRegisters {
    fn started() -> SlotRegisters {
        SlotRegisters {
            state: MpxState::C.encode(),
            order: order_prefix(SioOrder::End.iocw(0)),
            ..SlotRegisters::default()
        }
    }

    pub(crate) fn set_address(&mut self, address: u16) {
        self.address = address;
        self.address_parity = address.count_ones() % 2 == 0;
    }

    pub(crate) fn address_parity_ok(&self) -> bool {
        (self.address.count_ones() + u32::from(self.address_parity)) % 2 == 1
    }

    pub(crate) fn sio_order(&self) -> SioOrder {
        SioOrder::from_prefix(self.order)
    }

    fn data_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.aux.bank, self.address)
    }
}

#[derive(Debug)]
pub(crate) struct Multiplexer {
    pub(crate) ram: [SlotRegisters; SLOT_COUNT],
    pub(crate) request_set: PrioritySet<ServiceRequestNumber>,
    dispatch: [Option<DeviceId>; SLOT_COUNT],
    /// The number of slots running a channel program.
    pub(crate) active_count: usize,
    pub(crate) is_idle: bool,
    /// Cycles used beyond the previous burst's allowance.  Negative
    /// when SIO has granted extra cycles.
    pub(crate) excess_cycles: i32,
    pub(crate) rollover: bool,
    pub(crate) device_end: bool,
    pub(crate) control_word: u16,
}

impl Multiplexer {
    pub(crate) fn new() -> Multiplexer {
        Multiplexer {
            ram: [SlotRegisters::default(); SLOT_COUNT],
            request_set: PrioritySet::new(),
            dispatch: [None; SLOT_COUNT],
            active_count: 0,
            is_idle: true,
            excess_cycles: 0,
            rollover: false,
            device_end: false,
            control_word: 0,
        }
    }
}

/// The result of running one state for a slot.
#[derive(Debug, Default)]
struct StateOutcome {
    /// The device's response, which may carry INTREQ and other
    /// requests to be routed.
    signals: OutboundSet,
    /// The slot still needs service.
    renew: bool,
    /// The channel program has finished.
    ended: bool,
}

impl StateOutcome {
    /// The state needs nothing from the device before the next one
    /// can run.
    fn internal() -> StateOutcome {
        StateOutcome {
            renew: true,
            ..StateOutcome::default()
        }
    }

    fn from_device(response: &SignalsData) -> StateOutcome {
        StateOutcome {
            signals: response.signals,
            renew: response.has(OutboundSignal::SRn),
            ended: false,
        }
    }
}

/// The state of one slot, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub service_request_number: ServiceRequestNumber,
    /// `None` if the state RAM fails its parity check.
    pub state: Option<MpxState>,
    pub order: SioOrder,
    pub counter: WordCount,
    pub address: u16,
    pub bank: Bank,
    pub in_block: bool,
    pub terminal_count: bool,
    pub requesting: bool,
    pub device: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiplexerStatus {
    pub is_idle: bool,
    pub active_count: usize,
    pub request_set: u32,
    pub excess_cycles: i32,
    /// The slots which are not idle.
    pub slots: Vec<SlotStatus>,
}

impl IoSystem {
    /// Rebuild the service request dispatch table and the request
    /// set from the device configuration.
    pub fn mpx_initialize(&mut self) {
        let mpx = &mut self.mpx;
        mpx.dispatch = [None; SLOT_COUNT];
        mpx.request_set.lower_all();
        for (id, attached) in self.devices.enabled() {
            let Some(srn) = attached.dib.service_request_number else {
                continue;
            };
            let slot = &mut mpx.dispatch[usize::from(srn)];
            if slot.is_some() {
                event!(
                    Level::WARN,
                    "service request number {srn} is already in use, so {} cannot use the multiplexer channel",
                    attached.name()
                );
                continue;
            }
            *slot = Some(id);
            if attached.dib.service_request {
                mpx.request_set.raise(srn);
            }
        }
        mpx.active_count = mpx
            .ram
            .iter()
            .filter(|regs| regs.state != MpxState::Idle.encode())
            .count();
        mpx.is_idle = mpx.active_count == 0;
        event!(
            Level::DEBUG,
            "multiplexer initialized: {} active programs, request set {:#o}",
            mpx.active_count,
            mpx.request_set.bits()
        );
    }

    /// Reset the channel: every slot goes idle and all requests are
    /// dropped.
    pub fn mpx_reset(&mut self) {
        event!(Level::DEBUG, "multiplexer channel reset");
        for id in self.mpx.dispatch.iter().flatten() {
            if let Some(dib) = self.devices.dib_mut(*id) {
                dib.service_request = false;
            }
        }
        let dispatch = self.mpx.dispatch;
        self.mpx = Multiplexer::new();
        self.mpx.dispatch = dispatch;
    }

    /// A device starts a channel program (SIO).  The slot's program
    /// begins in state C at the next service, and the next burst gets
    /// enough extra cycles to reach state B.
    pub fn mpx_assert_req(&mut self, id: DeviceId) {
        let Some(srn) = self.devices.dib(id).and_then(|dib| dib.service_request_number) else {
            event!(
                Level::ERROR,
                "device {id} asked the multiplexer channel to start but has no service request number"
            );
            return;
        };
        let slot = usize::from(srn);
        if self.mpx.ram[slot].state == MpxState::Idle.encode() {
            self.mpx.active_count += 1;
        }
        self.mpx.ram[slot] = SlotRegisters::started();
        self.mpx.is_idle = false;
        self.mpx.excess_cycles = self.mpx.excess_cycles.saturating_sub(self.timing.sio_bias());
        self.mpx.request_set.raise(srn);
        if let Some(dib) = self.devices.dib_mut(id) {
            dib.service_request = true;
        }
        event!(Level::DEBUG, "channel program started for slot {srn}");
    }

    /// A device requests service for its slot.
    pub fn mpx_assert_srn(&mut self, id: DeviceId) {
        let Some(dib) = self.devices.dib_mut(id) else {
            event!(Level::ERROR, "service request from unknown device {id}");
            return;
        };
        match dib.service_request_number {
            Some(srn) => {
                dib.service_request = true;
                self.mpx.request_set.raise(srn);
            }
            None => {
                event!(
                    Level::WARN,
                    "device {id} requested multiplexer service but has no service request number"
                );
            }
        }
    }

    /// Run the channel for a burst of `ticks_elapsed` clock ticks.
    pub fn mpx_service(&mut self, cpu: &mut dyn Cpu, ticks_elapsed: u32) {
        let span = span!(Level::TRACE, "mpx_service", ticks_elapsed);
        let _enter = span.enter();
        let allowance = self
            .timing
            .cycles_for(ticks_elapsed)
            .saturating_sub(self.mpx.excess_cycles);
        let mut budget = CycleBudget::new(allowance);
        while budget.is_available() && self.mpx_cycle(cpu, &mut budget) {}
        self.mpx.excess_cycles = budget.excess();
    }

    /// Run one state for the highest priority request, however many
    /// cycles it takes.  Returns false if there was no request.
    pub fn mpx_step(&mut self, cpu: &mut dyn Cpu) -> bool {
        self.mpx_cycle(cpu, &mut CycleBudget::unlimited())
    }

    pub fn mpx_is_idle(&self) -> bool {
        self.mpx.is_idle
    }

    fn mpx_cycle(&mut self, cpu: &mut dyn Cpu, budget: &mut CycleBudget) -> bool {
        let Some(srn) = self.mpx.request_set.highest_priority_raised_flag() else {
            return false;
        };
        let slot = usize::from(srn);
        let Some(id) = self.mpx.dispatch[slot] else {
            event!(
                Level::WARN,
                "service request {srn} has no device; dropping it"
            );
            self.mpx.request_set.lower(srn);
            return true;
        };
        budget.charge(self.timing.cycles_per_state);

        let mut regs = self.mpx.ram[slot];
        let raw_state = regs.state;
        let was_running = raw_state != MpxState::Idle.encode();
        let result = match MpxState::decode(raw_state) {
            Some(MpxState::A) => self.mpx_state_a(cpu, id, &mut regs, budget),
            Some(MpxState::B) => self.mpx_state_b(cpu, id, &mut regs, budget),
            Some(MpxState::C) => self.mpx_state_c(cpu, id, &mut regs, budget),
            Some(MpxState::D) => self.mpx_state_d(cpu, id, &mut regs, budget),
            Some(MpxState::Idle) => {
                event!(Level::DEBUG, "service request {srn} for an idle slot");
                Ok(StateOutcome::default())
            }
            None => Err(AbortReason::StateParity(raw_state)),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(reason) => self.mpx_abort(id, srn, reason),
        };

        let next = if outcome.ended {
            MpxState::Idle
        } else {
            next_state(
                raw_state,
                regs.sio_order(),
                self.mpx.rollover,
                self.mpx.device_end,
            )
        };
        event!(
            Level::DEBUG,
            "slot {srn}: {} -> {next} ({})",
            MpxState::decode(raw_state).map_or_else(|| format!("{raw_state:02o}"), |s| s.to_string()),
            regs.sio_order()
        );
        regs.state = next.encode();
        self.mpx.ram[slot] = regs;
        if was_running && next == MpxState::Idle {
            self.mpx_end_channel(srn);
        }
        self.mpx.rollover = false;
        self.mpx.device_end = false;

        let renew = outcome.renew && next != MpxState::Idle;
        if !renew {
            self.mpx.request_set.lower(srn);
        }
        if let Some(dib) = self.devices.dib_mut(id) {
            dib.service_request = renew;
        }
        let mut signals = outcome.signals;
        signals.remove(OutboundSignal::SRn);
        self.route_signals(cpu, id, signals);
        true
    }

    fn mpx_end_channel(&mut self, srn: ServiceRequestNumber) {
        self.mpx.active_count = self.mpx.active_count.saturating_sub(1);
        if self.mpx.active_count == 0 {
            self.mpx.is_idle = true;
        }
        event!(
            Level::DEBUG,
            "channel program for slot {srn} ended; {} still active",
            self.mpx.active_count
        );
    }

    fn mpx_abort(&mut self, id: DeviceId, srn: ServiceRequestNumber, reason: AbortReason) -> StateOutcome {
        event!(
            Level::WARN,
            "channel program for slot {srn} aborted after {reason}"
        );
        let response = self
            .devices
            .call(id, InboundSignal::XFERERROR.into(), 0);
        StateOutcome {
            signals: response.signals,
            renew: false,
            ended: true,
        }
    }

    /// Find the device's DRT entry and advance its program pointer
    /// past the current step.  Returns the address of that step:
    /// `jump_target` if there is one, otherwise the pointer found in
    /// the DRT.
    fn mpx_advance_program_pointer(
        &mut self,
        cpu: &mut dyn Cpu,
        id: DeviceId,
        jump_target: Option<u16>,
        budget: &mut CycleBudget,
    ) -> Result<u16, AbortReason> {
        let drt = PhysicalAddress::absolute(
            self.devices
                .call(id, InboundSignal::DEVNODB.into(), 0)
                .data,
        );
        let pointer = match jump_target {
            Some(target) => target,
            None => read_word(cpu, AccessClass::AbsoluteMpx, drt, budget, &self.timing)?,
        };
        write_word(
            cpu,
            AccessClass::AbsoluteMpx,
            drt,
            pointer.wrapping_add(2),
            budget,
            &self.timing,
        )?;
        Ok(pointer)
    }

    fn mpx_state_c(
        &mut self,
        cpu: &mut dyn Cpu,
        id: DeviceId,
        regs: &mut SlotRegisters,
        budget: &mut CycleBudget,
    ) -> Result<StateOutcome, AbortReason> {
        let jump_target = match regs.sio_order() {
            SioOrder::Jump => Some(regs.address),
            SioOrder::JumpConditional if regs.aux.jump_met => Some(regs.address),
            _ => None,
        };
        let pointer = self.mpx_advance_program_pointer(cpu, id, jump_target, budget)?;
        regs.set_address(pointer);
        regs.aux.jump_met = false;
        Ok(StateOutcome::internal())
    }

    fn mpx_state_a(
        &mut self,
        cpu: &mut dyn Cpu,
        id: DeviceId,
        regs: &mut SlotRegisters,
        budget: &mut CycleBudget,
    ) -> Result<StateOutcome, AbortReason> {
        let iocw = read_word(
            cpu,
            AccessClass::AbsoluteMpx,
            PhysicalAddress::absolute(regs.address),
            budget,
            &self.timing,
        )?;
        // The fetch occupies the memory for two word times.
        budget.charge(self.timing.cycles_per_read);
        if is_illegal_chain(iocw) {
            return Err(AbortReason::IllegalOrder(iocw));
        }
        let previous = regs.sio_order();
        if previous.is_chained() && regs.aux.in_block {
            let previous_iocw = u16::from(regs.order) << 11;
            if !same_order_class(previous_iocw, iocw) {
                return Err(AbortReason::InvalidChainedOrder {
                    current: previous_iocw,
                    next: iocw,
                });
            }
        }
        regs.order = order_prefix(iocw);
        let order = regs.sio_order();
        if order != SioOrder::ReturnResidue {
            regs.counter = word_count(iocw);
        }
        regs.set_address(regs.address.wrapping_add(1));
        if order == SioOrder::Control {
            let response = self.devices.call(
                id,
                InboundSignal::PCMD1.into(),
                u16::from(regs.counter),
            );
            Ok(StateOutcome::from_device(&response))
        } else {
            Ok(StateOutcome::internal())
        }
    }

    fn mpx_state_b(
        &mut self,
        cpu: &mut dyn Cpu,
        id: DeviceId,
        regs: &mut SlotRegisters,
        budget: &mut CycleBudget,
    ) -> Result<StateOutcome, AbortReason> {
        let ioaw_address = PhysicalAddress::absolute(regs.address);
        let order = regs.sio_order();
        match order {
            SioOrder::Jump => {
                let target = read_word(cpu, AccessClass::AbsoluteMpx, ioaw_address, budget, &self.timing)?;
                regs.set_address(target);
                Ok(StateOutcome::internal())
            }
            SioOrder::JumpConditional => {
                let target = read_word(cpu, AccessClass::AbsoluteMpx, ioaw_address, budget, &self.timing)?;
                let response = self.devices.call(id, InboundSignal::SETJMP.into(), 0);
                regs.aux.jump_met = response.has(OutboundSignal::JMPMET);
                regs.set_address(target);
                Ok(StateOutcome::from_device(&response))
            }
            SioOrder::Interrupt => {
                let target = read_word(cpu, AccessClass::AbsoluteMpx, ioaw_address, budget, &self.timing)?;
                let response = self.devices.call(id, InboundSignal::SETINT.into(), 0);
                regs.set_address(target);
                Ok(StateOutcome::from_device(&response))
            }
            SioOrder::ReturnResidue => {
                write_word(
                    cpu,
                    AccessClass::AbsoluteMpx,
                    ioaw_address,
                    iocw_count(regs.counter),
                    budget,
                    &self.timing,
                )?;
                Ok(StateOutcome::internal())
            }
            SioOrder::End | SioOrder::EndWithInterrupt | SioOrder::Sense => {
                let signals = match order {
                    SioOrder::End => InboundSignal::PSTATSTB | InboundSignal::TOGGLESIOOK,
                    SioOrder::EndWithInterrupt => {
                        InboundSignal::PSTATSTB | InboundSignal::TOGGLESIOOK | InboundSignal::SETINT
                    }
                    _ => InboundSignal::PSTATSTB.into(),
                };
                let response = self.devices.call(id, signals, 0);
                write_word(
                    cpu,
                    AccessClass::AbsoluteMpx,
                    ioaw_address,
                    response.data,
                    budget,
                    &self.timing,
                )?;
                Ok(StateOutcome::from_device(&response))
            }
            SioOrder::Control => {
                let ioaw = read_word(cpu, AccessClass::AbsoluteMpx, ioaw_address, budget, &self.timing)?;
                let response = self
                    .devices
                    .call(id, InboundSignal::PCONTSTB.into(), ioaw);
                Ok(StateOutcome::from_device(&response))
            }
            SioOrder::Write | SioOrder::WriteChained | SioOrder::Read | SioOrder::ReadChained => {
                let ioaw = read_word(cpu, AccessClass::AbsoluteMpx, ioaw_address, budget, &self.timing)?;
                regs.set_address(ioaw);
                let starting = !regs.aux.in_block;
                regs.aux.in_block = true;
                regs.aux.terminal_count = false;
                if starting {
                    let toggle = if order.is_read() {
                        InboundSignal::TOGGLEINXFER
                    } else {
                        InboundSignal::TOGGLEOUTXFER
                    };
                    let response = self.devices.call(id, toggle.into(), 0);
                    Ok(StateOutcome::from_device(&response))
                } else {
                    Ok(StateOutcome::internal())
                }
            }
            SioOrder::SetBank => {
                // Set Bank goes from state A straight to state D.
                Ok(StateOutcome::internal())
            }
        }
    }

    fn mpx_state_d(
        &mut self,
        cpu: &mut dyn Cpu,
        id: DeviceId,
        regs: &mut SlotRegisters,
        budget: &mut CycleBudget,
    ) -> Result<StateOutcome, AbortReason> {
        let order = regs.sio_order();
        if order == SioOrder::SetBank {
            let ioaw = read_word(
                cpu,
                AccessClass::AbsoluteMpx,
                PhysicalAddress::absolute(regs.address),
                budget,
                &self.timing,
            )?;
            regs.aux.bank = ioaw_bank(ioaw);
            return Ok(StateOutcome::internal());
        }
        if !order.is_data_transfer() {
            event!(
                Level::ERROR,
                "slot in state D with order {order}; ending the program"
            );
            return Ok(StateOutcome {
                ended: true,
                ..StateOutcome::default()
            });
        }

        let last = regs.counter == WordCount::MAX;
        let strobe = strobe_signals(order, last);
        let response = if order.is_write() {
            let word = read_word(cpu, AccessClass::DmaMpx, regs.data_address(), budget, &self.timing)?;
            self.devices.call(id, strobe, word)
        } else {
            self.devices.call(id, strobe, 0)
        };

        if response.has(OutboundSignal::DEVEND) {
            self.mpx.device_end = true;
            let pointer = self.mpx_advance_program_pointer(cpu, id, None, budget)?;
            regs.set_address(pointer);
            if !order.is_chained() {
                regs.aux.in_block = false;
            }
            return Ok(StateOutcome {
                signals: response.signals,
                renew: true,
                ended: false,
            });
        }

        if order.is_read() {
            write_word(
                cpu,
                AccessClass::DmaMpx,
                regs.data_address(),
                response.data,
                budget,
                &self.timing,
            )?;
        }
        regs.set_address(regs.address.wrapping_add(1));
        let (counter, rolled_over) = regs.counter.overflowing_increment();
        regs.counter = counter;
        if rolled_over {
            self.mpx.rollover = true;
            regs.aux.terminal_count = true;
            if !order.is_chained() {
                regs.aux.in_block = false;
            }
            Ok(StateOutcome {
                signals: response.signals,
                renew: true,
                ended: false,
            })
        } else {
            Ok(StateOutcome::from_device(&response))
        }
    }

    pub fn mpx_slot_status(&self, srn: ServiceRequestNumber) -> SlotStatus {
        let regs = &self.mpx.ram[usize::from(srn)];
        SlotStatus {
            service_request_number: srn,
            state: MpxState::decode(regs.state),
            order: regs.sio_order(),
            counter: regs.counter,
            address: regs.address,
            bank: regs.aux.bank,
            in_block: regs.aux.in_block,
            terminal_count: regs.aux.terminal_count,
            requesting: self.mpx.request_set.is_raised(srn),
            device: self.mpx.dispatch[usize::from(srn)],
        }
    }

    pub fn mpx_status(&self) -> MultiplexerStatus {
        let slots = (0..SLOT_COUNT)
            .filter_map(|n| ServiceRequestNumber::try_from(n).ok())
            .map(|srn| self.mpx_slot_status(srn))
            .filter(|status| status.state != Some(MpxState::Idle))
            .collect();
        MultiplexerStatus {
            is_idle: self.mpx.is_idle,
            active_count: self.mpx.active_count,
            request_set: self.mpx.request_set.bits(),
            excess_cycles: self.mpx.excess_cycles,
            slots,
        }
    }
}
