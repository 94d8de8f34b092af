use base::iocw::{count_for_words, IOCW_DC};
use base::prelude::*;

use super::super::cpu::CpuState;
use super::super::device::{DeviceId, Dib};
use super::super::fault::AbortReason;
use super::super::testing::{calls_with, new_cpu, sel_handler, CallLog, ScriptedDevice};
use super::super::timing::ChannelTiming;
use super::super::IoSystem;
use super::SelState;

const DEVICE: DeviceNumber = u7!(0o26);
const DRT: u16 = 0o130;
const PROGRAM: u16 = 0o100;
const READ_DATA: u16 = 0o54321;
const STATUS: u16 = 0o1400;

fn iocw_for_words(order: SioOrder, words: u16) -> u16 {
    order.iocw(count_for_words(words).map(u16::from).unwrap_or(0))
}

fn word(cpu: &CpuState, offset: u16) -> u16 {
    cpu.mem
        .fetch(PhysicalAddress::absolute(offset))
        .expect("test addresses are mapped")
}

fn setup<F>(program: &[u16], handler: F) -> (IoSystem, CpuState, DeviceId, CallLog)
where
    F: FnMut(&mut Dib, InboundSet, u16) -> SignalsData + 'static,
{
    let mut system = IoSystem::new(ChannelTiming::default());
    let mut cpu = new_cpu();
    let (device, log) = ScriptedDevice::boxed("seldev", handler);
    let id = system.attach(
        Dib::new(DEVICE).with_interrupt_priority(u5!(12)),
        device,
    );
    cpu.mem.load(PROGRAM, program).expect("program fits in memory");
    cpu.mem.load(DRT, &[PROGRAM]).expect("DRT fits in memory");
    system.initialize(&mut cpu);
    (system, cpu, id, log)
}

fn start(system: &mut IoSystem, cpu: &mut CpuState) {
    system.iop_direct_io(cpu, u16::from(DEVICE), IoCommand::SIO, 0);
}

fn run_to_completion(system: &mut IoSystem, cpu: &mut CpuState) -> Vec<SelState> {
    let mut states = vec![];
    while system.sel_step(cpu) {
        states.push(system.selector_status().sequencer);
        assert!(states.len() < 100, "channel program did not finish");
    }
    states
}

/// A device which behaves like `sel_handler` except that it leaves
/// out `withheld` from every response.
fn withholding(
    withheld: OutboundSignal,
) -> impl FnMut(&mut Dib, InboundSet, u16) -> SignalsData {
    let mut inner = sel_handler(READ_DATA, STATUS);
    move |dib: &mut Dib, inbound: InboundSet, data: u16| {
        let mut response = inner(dib, inbound, data);
        response.signals.remove(withheld);
        response
    }
}

#[test]
fn read_transfer() {
    let program = [
        iocw_for_words(SioOrder::Read, 2),
        0o200,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, _, log) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    assert!(!system.sel_is_idle());
    assert_eq!(system.selector_status().sequencer, SelState::Fetch);

    let states = run_to_completion(&mut system, &mut cpu);
    use SelState::*;
    assert_eq!(
        states,
        vec![Execute, Transfer, Transfer, Reload, Fetch, Execute, Idle]
    );
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, 0o200), READ_DATA);
    assert_eq!(word(&cpu, 0o201), READ_DATA);
    assert_eq!(word(&cpu, 0o103), STATUS);
    assert_eq!(word(&cpu, DRT), 0o104);

    let strobes: Vec<InboundSet> = calls_with(&log, InboundSignal::PREADSTB)
        .into_iter()
        .map(|(inbound, _)| inbound)
        .collect();
    use InboundSignal::*;
    assert_eq!(
        strobes,
        vec![
            PREADSTB | READNEXTWD | CHANSO,
            PREADSTB | EOT | TOGGLEINXFER | CHANSO,
        ]
    );
}

#[test]
fn service_runs_the_program_within_its_budget() {
    let program = [
        iocw_for_words(SioOrder::Read, 2),
        0o200,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, _, _) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    // No time has passed, so nothing happens.
    system.sel_service(&mut cpu, 0);
    assert_eq!(system.selector_status().sequencer, SelState::Fetch);
    system.sel_service(&mut cpu, 1000);
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, 0o201), READ_DATA);
}

#[test]
fn write_transfer() {
    let program = [
        iocw_for_words(SioOrder::Write, 2),
        0o200,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, _, log) = setup(&program, sel_handler(READ_DATA, STATUS));
    cpu.mem.load(0o200, &[0o7, 0o70]).expect("mapped");
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    use InboundSignal::*;
    assert_eq!(
        calls_with(&log, PWRITESTB),
        vec![
            (PWRITESTB | CHANSO, 0o7),
            (PWRITESTB | EOT | TOGGLEOUTXFER | CHANSO, 0o70),
        ]
    );
    assert!(system.sel_is_idle());
}

#[test]
fn request_while_busy_ends_the_program() {
    let program = [
        iocw_for_words(SioOrder::Read, 2),
        0o200,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, id, _) = setup(&program, sel_handler(READ_DATA, STATUS));
    system.sel_assert_req(&mut cpu, id);
    assert!(!system.sel_is_idle());
    assert!(system.sel_step(&mut cpu));
    assert_eq!(system.selector_status().program_counter, 0o102);

    system.sel_assert_req(&mut cpu, id);
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, DRT), 0o102);
    assert_eq!(system.selector_status().last_abort, None);
}

#[test]
fn chained_reads() {
    let program = [
        iocw_for_words(SioOrder::ReadChained, 1),
        0o200,
        iocw_for_words(SioOrder::Read, 1),
        0o300,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, _, log) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    let states = run_to_completion(&mut system, &mut cpu);
    use SelState::*;
    assert_eq!(
        states,
        vec![Execute, Transfer, Reload, Transfer, Reload, Fetch, Execute, Idle]
    );
    assert_eq!(word(&cpu, 0o200), READ_DATA);
    assert_eq!(word(&cpu, 0o300), READ_DATA);
    assert_eq!(word(&cpu, DRT), 0o106);
    // The second order of the chain is not announced to the device.
    assert_eq!(
        calls_with(&log, InboundSignal::TOGGLEINXFER).len(),
        2,
        "one block start and one block end"
    );
}

#[test]
fn chain_into_a_different_order_aborts_without_loading_it() {
    let first = iocw_for_words(SioOrder::ReadChained, 1);
    let second = iocw_for_words(SioOrder::Write, 1);
    let program = [first, 0o200, second, 0o300, SioOrder::End.iocw(0), 0];
    // The device does not complete the abort by itself.
    let (mut system, mut cpu, id, log) = setup(&program, withholding(OutboundSignal::REQ));
    system.sel_assert_req(&mut cpu, id);
    run_to_completion(&mut system, &mut cpu);

    assert_eq!(calls_with(&log, InboundSignal::XFERERROR).len(), 1);
    let status = system.selector_status();
    assert!(!status.is_idle);
    assert_eq!(
        status.last_abort,
        Some(AbortReason::InvalidChainedOrder {
            current: first,
            next: second
        })
    );
    assert_eq!(status.order, Some(SioOrder::ReadChained));
    assert_eq!(status.address, 0o201);
    assert_eq!(status.program_counter, 0o102);

    system.sel_assert_req(&mut cpu, id);
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, DRT), 0o102);
}

#[test]
fn chain_flag_on_a_jump_is_an_illegal_order() {
    let jump = IOCW_DC | SioOrder::Jump.iocw(0);
    let program = [jump, 0o300];
    let (mut system, mut cpu, _, log) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    assert_eq!(calls_with(&log, InboundSignal::XFERERROR).len(), 1);
    assert!(system.sel_is_idle());
    assert_eq!(
        system.selector_status().last_abort,
        Some(AbortReason::IllegalOrder(jump))
    );
}

#[test]
fn missing_acknowledgement_ends_without_abort() {
    let program = [SioOrder::Sense.iocw(0), 0, SioOrder::End.iocw(0), 0];
    let (mut system, mut cpu, _, log) = setup(&program, withholding(OutboundSignal::CHANACK));
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    assert!(system.sel_is_idle());
    assert!(calls_with(&log, InboundSignal::XFERERROR).is_empty());
    assert_eq!(system.selector_status().last_abort, None);
    // The SENSE result was not stored.
    assert_eq!(word(&cpu, 0o101), 0);
    assert_eq!(word(&cpu, DRT), 0o102);
}

#[test]
fn device_which_never_requests_service_times_out() {
    let program = [iocw_for_words(SioOrder::Read, 1), 0o200];
    let (mut system, mut cpu, _, log) = setup(&program, withholding(OutboundSignal::CHANSR));
    start(&mut system, &mut cpu);
    assert!(system.sel_step(&mut cpu));
    assert!(system.sel_step(&mut cpu));
    // Waiting is shown as Transfer.
    assert_eq!(system.sel.sequencer, SelState::Wait);
    let status = system.selector_status();
    assert_eq!(status.sequencer, SelState::Transfer);
    assert_eq!(status.timer, Some(1000));
    assert!(!system.sel_step(&mut cpu));

    system.sel_service(&mut cpu, 999);
    assert!(!system.sel_is_idle());
    system.sel_service(&mut cpu, 1);
    assert!(system.sel_is_idle());
    assert_eq!(
        system.selector_status().last_abort,
        Some(AbortReason::ChansrTimeout)
    );
    assert_eq!(calls_with(&log, InboundSignal::XFERERROR).len(), 1);
}

#[test]
fn device_end_finishes_the_block_early() {
    let program = [
        iocw_for_words(SioOrder::Read, 3),
        0o200,
        SioOrder::ReturnResidue.iocw(0),
        0,
        SioOrder::End.iocw(0),
        0,
    ];
    let mut reads = 0;
    let mut inner = sel_handler(READ_DATA, STATUS);
    let handler = move |dib: &mut Dib, inbound: InboundSet, data: u16| {
        let mut response = inner(dib, inbound, data);
        if inbound.contains(InboundSignal::PREADSTB) {
            reads += 1;
            if reads == 2 {
                response.signals |= OutboundSignal::DEVEND;
                response.signals.remove(OutboundSignal::CHANSR);
            }
        }
        response
    };
    let (mut system, mut cpu, _, log) = setup(&program, handler);
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, 0o200), READ_DATA);
    assert_eq!(word(&cpu, 0o201), 0);
    assert_eq!(word(&cpu, 0o103), 0o177776);
    use InboundSignal::*;
    assert!(log
        .borrow()
        .contains(&(EOT | CHANSO | TOGGLEINXFER, 0)));
}

#[test]
fn control_order() {
    let program = [SioOrder::Control.iocw(0o1234), 0o5670, SioOrder::End.iocw(0), 0];
    let (mut system, mut cpu, _, log) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    use InboundSignal::*;
    assert_eq!(calls_with(&log, PCMD1), vec![(PCMD1 | CHANSO, 0o1234)]);
    assert_eq!(calls_with(&log, PCONTSTB), vec![(PCONTSTB | CHANSO, 0o5670)]);
    assert!(system.sel_is_idle());
}

#[test]
fn set_bank_and_conditional_jump() {
    let program = [
        SioOrder::SetBank.iocw(0),
        1,
        SioOrder::JumpConditional.iocw(0),
        0o300,
    ];
    let mut inner = sel_handler(READ_DATA, STATUS);
    let handler = move |dib: &mut Dib, inbound: InboundSet, data: u16| {
        let mut response = inner(dib, inbound, data);
        if inbound.contains(InboundSignal::SETJMP) {
            response.signals |= OutboundSignal::JMPMET;
        }
        response
    };
    let (mut system, mut cpu, _, _) = setup(&program, handler);
    cpu.mem
        .load(
            0o300,
            &[
                iocw_for_words(SioOrder::Read, 1),
                0o200,
                SioOrder::EndWithInterrupt.iocw(0),
                0,
            ],
        )
        .expect("mapped");
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    assert_eq!(
        cpu.mem.fetch(PhysicalAddress::new(u4!(1), 0o200)),
        Ok(READ_DATA)
    );
    assert_eq!(word(&cpu, 0o303), STATUS);
    assert_eq!(word(&cpu, DRT), 0o304);
    assert_eq!(system.interrupt_status().request_set, 1 << 12);
}

#[test]
fn unreadable_data_aborts_the_write() {
    // Bank 9 does not exist.
    let program = [
        SioOrder::SetBank.iocw(0),
        9,
        iocw_for_words(SioOrder::Write, 1),
        0,
    ];
    let (mut system, mut cpu, _, log) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    run_to_completion(&mut system, &mut cpu);
    assert!(system.sel_is_idle());
    assert!(matches!(
        system.selector_status().last_abort,
        Some(AbortReason::MemoryRead(_))
    ));
    assert_eq!(calls_with(&log, InboundSignal::XFERERROR).len(), 1);
    assert!(calls_with(&log, InboundSignal::PWRITESTB).is_empty());
}

#[test]
fn initialize_recovers_the_device_number() {
    let program = [iocw_for_words(SioOrder::Read, 1), 0o200];
    let handler = |_dib: &mut Dib, inbound: InboundSet, _data: u16| {
        if inbound.contains(InboundSignal::DEVNODB) {
            // This controller uses the DRT entry of device 0o40.
            SignalsData::new(OutboundSet::empty(), 0o40 * DRT_ENTRY_WORDS)
        } else {
            SignalsData::none()
        }
    };
    let (mut system, mut cpu, id, _) = setup(&program, handler);
    system.sel_assert_req(&mut cpu, id);
    system.sel_initialize();
    assert_eq!(
        system.selector_status().device_number,
        Some(u7!(0o40))
    );
}

#[test]
fn initialize_clears_a_channel_whose_device_is_gone() {
    let program = [iocw_for_words(SioOrder::Read, 1), 0o200];
    let (mut system, mut cpu, id, _) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    assert!(!system.sel_is_idle());
    system.set_enabled(id, false);
    system.initialize(&mut cpu);
    assert!(system.sel_is_idle());
}

#[test]
fn reset_clears_the_channel() {
    let program = [iocw_for_words(SioOrder::Read, 1), 0o200];
    let (mut system, mut cpu, id, _) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    system.sel_assert_chansr(id);
    system.sel_reset();
    assert!(system.sel_is_idle());
    assert_eq!(system.dib(id).map(|dib| dib.service_request), Some(false));
    assert!(!system.sel_step(&mut cpu));
}

#[test]
fn service_request_before_the_deadline_cancels_the_timeout() {
    let program = [
        iocw_for_words(SioOrder::Read, 1),
        0o200,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, id, log) = setup(&program, withholding(OutboundSignal::CHANSR));
    start(&mut system, &mut cpu);
    assert!(system.sel_step(&mut cpu));
    assert!(system.sel_step(&mut cpu));
    assert_eq!(system.sel.sequencer, SelState::Wait);
    system.sel_service(&mut cpu, 10);
    assert_eq!(system.selector_status().timer, Some(990));

    system.sel_assert_chansr(id);
    // This burst is longer than the time left on the timer.
    system.sel_service(&mut cpu, 2000);
    assert_eq!(system.selector_status().last_abort, None);
    assert!(calls_with(&log, InboundSignal::XFERERROR).is_empty());
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, 0o200), READ_DATA);
    assert_eq!(word(&cpu, 0o103), STATUS);
}

#[test]
fn last_word_rolls_over_and_prefetches_the_next_step() {
    let program = [
        iocw_for_words(SioOrder::Read, 1),
        0o200,
        SioOrder::End.iocw(0),
        0,
    ];
    let (mut system, mut cpu, _, _) = setup(&program, sel_handler(READ_DATA, STATUS));
    start(&mut system, &mut cpu);
    assert!(system.sel_step(&mut cpu));
    assert!(system.sel_step(&mut cpu));
    assert!(system.sel_step(&mut cpu));
    let status = system.selector_status();
    assert_eq!(status.sequencer, SelState::Reload);
    assert!(status.rollover);
    assert_eq!(status.word_count, WordCount::ZERO);
    // The device wants no more words, so the channel has read ahead.
    assert_eq!(system.sel.prefetch_control, Some(SioOrder::End.iocw(0)));

    // Fetch uses the word it already has.
    cpu.mem
        .load(0o102, &[SioOrder::Jump.iocw(0)])
        .expect("mapped");
    assert!(system.sel_step(&mut cpu));
    let status = system.selector_status();
    assert_eq!(status.sequencer, SelState::Fetch);
    assert!(!status.rollover);
    assert!(system.sel_step(&mut cpu));
    assert_eq!(system.selector_status().order, Some(SioOrder::End));
    assert_eq!(system.sel.prefetch_control, None);

    run_to_completion(&mut system, &mut cpu);
    assert!(system.sel_is_idle());
    assert_eq!(word(&cpu, 0o200), READ_DATA);
    assert_eq!(word(&cpu, 0o103), STATUS);
}
