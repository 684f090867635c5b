//! Engine lifecycle, faults, awaits, and snapshots on the test machine.

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

mod support;

use std::panic::{self, AssertUnwindSafe};

use support::{machine, rom, TestMachine, BEEP, GO, VERBOSE};
use vm_core::{
    Event, LoaderError, Phase, ProgramSource, RunState, StepOutcome, Vm, VmConfig, VmError,
    MAX_IMAGE_LEN,
};

#[test]
fn timers_tick_once_per_step_even_while_awaiting() {
    let mut vm = machine(&[0x6000, 0x0000]);
    assert_eq!(
        vm.step(),
        Ok(StepOutcome::Executed {
            address: 0,
            word: 0x6000,
        })
    );
    assert!(vm.is_awaiting());
    for _ in 0..3 {
        assert_eq!(vm.step(), Ok(StepOutcome::Awaiting { event: GO }));
    }
    assert_eq!(vm.arch().ticks, 4);
    assert_eq!(vm.tick_count(), 1);
    assert_eq!(vm.pc(), 2);

    vm.emit(Event::new(GO, 0x42));
    assert!(!vm.is_awaiting());
    assert_eq!(vm.arch().regs[0], 0x42);
    assert_eq!(vm.arch().latched, vec![0x42]);
    vm.step().expect("NOP executes");
    assert_eq!(vm.pc(), 4);
}

#[test]
fn unrelated_event_does_not_satisfy_await() {
    let mut vm = machine(&[0x6000]);
    vm.step().expect("WAIT executes");
    vm.emit(Event::new("stop", 1));
    assert_eq!(vm.awaiting_event(), Some(GO));
    assert_eq!(vm.arch().regs[0], 0);
}

#[test]
fn run_stops_when_awaiting() {
    let mut vm = machine(&[0x0000, 0x6000, 0x0000]);
    let outcome = vm.run(10).expect("runs");
    assert_eq!(outcome.steps, 3);
    assert_eq!(outcome.last, Some(StepOutcome::Awaiting { event: GO }));
}

#[test]
fn run_frame_spends_clock_budget() {
    let mut vm = Vm::with_config(
        TestMachine::default(),
        VmConfig {
            clock_speed_hz: 600,
            ..VmConfig::default()
        },
    )
    .expect("valid instruction set");
    vm.load_bytes(&rom(&[0x1000])).expect("program loads");
    let outcome = vm.run_frame(60).expect("loops");
    assert_eq!(outcome.steps, 10);
    assert_eq!(vm.tick_count(), 10);
    assert_eq!(vm.pc(), 0);

    vm.set_clock_speed(0);
    assert_eq!(vm.run_frame(60).map(|outcome| outcome.steps), Ok(1));
}

#[test]
fn double_await_is_a_usage_fault() {
    let mut vm = machine(&[0xA000]);
    assert_eq!(vm.step(), Err(VmError::AlreadyAwaiting { pending: GO }));
    assert_eq!(vm.pc(), 0);
}

#[test]
fn host_await_and_double_arm() {
    let mut vm = machine(&[0x0000]);
    vm.await_event(GO, |machine: &mut TestMachine, event: &Event| {
        machine.regs[1] = event.value.to_be_bytes()[1];
    })
    .expect("first await");
    assert_eq!(
        vm.await_event(GO, |_: &mut TestMachine, _: &Event| {}),
        Err(VmError::AlreadyAwaiting { pending: GO })
    );
    vm.emit(Event::new(GO, 9));
    assert_eq!(vm.arch().regs[1], 9);
}

#[test]
fn hops_move_whole_instructions() {
    let mut vm = machine(&[0x4300, 0x0000, 0x0000, 0x5200]);
    vm.step().expect("SKIP executes");
    assert_eq!(vm.pc(), 6);
    vm.step().expect("BACK executes");
    assert_eq!(vm.pc(), 2);

    vm.hop_forwards(1);
    assert_eq!(vm.pc(), 4);
    vm.hop_backwards(2);
    assert_eq!(vm.pc(), 0);
}

#[test]
fn overrun_past_image_end_faults_at_last_instruction() {
    let mut vm = machine(&[0x4200]);
    assert_eq!(
        vm.step(),
        Err(VmError::ProgramOverrun { pc: 4, len: 2 })
    );
    assert_eq!(vm.pc(), 0);
    assert!(vm.run_state().latched_fault().is_some());
}

#[test]
fn full_address_space_image_never_wraps_the_pc() {
    let mut vm = Vm::new(TestMachine::default()).expect("valid instruction set");
    vm.load_bytes(&vec![0; MAX_IMAGE_LEN]).expect("64 KiB image loads");

    vm.jump(0xFFFC);
    vm.step().expect("NOP executes");
    assert_eq!(vm.pc(), 0xFFFE);
    assert_eq!(
        vm.step(),
        Err(VmError::ProgramOverrun {
            pc: 0x1_0000,
            len: MAX_IMAGE_LEN,
        })
    );
    assert_eq!(vm.pc(), 0xFFFE);
    assert_eq!(vm.tick_count(), 1);
}

#[test]
fn jump_to_zero_from_the_last_slot_is_allowed() {
    let mut image = vec![0; MAX_IMAGE_LEN];
    image[0xFFFE..].copy_from_slice(&0x1000_u16.to_be_bytes());
    let mut vm = Vm::new(TestMachine::default()).expect("valid instruction set");
    vm.load_bytes(&image).expect("64 KiB image loads");

    vm.jump(0xFFFE);
    vm.step().expect("JMP executes");
    assert_eq!(vm.pc(), 0);
}

#[test]
fn images_past_the_address_space_are_refused() {
    let mut vm = Vm::new(TestMachine::default()).expect("valid instruction set");
    assert_eq!(
        vm.load_bytes(&vec![0; MAX_IMAGE_LEN + 1]),
        Err(VmError::Loader(LoaderError::TooLarge {
            len: MAX_IMAGE_LEN + 1,
            max: MAX_IMAGE_LEN,
        }))
    );
    assert_eq!(vm.run_state(), &RunState::Idle);
}

#[test]
fn running_off_the_end_faults_on_fetch() {
    let mut vm = machine(&[0x0000]);
    vm.step().expect("NOP executes");
    assert_eq!(vm.pc(), 2);
    assert_eq!(
        vm.step(),
        Err(VmError::FetchOutOfRange { address: 2, len: 2 })
    );
}

#[test]
fn unknown_opcode_latches_until_reset() {
    let mut vm = machine(&[0x3107, 0xBEEF]);
    vm.step().expect("SET executes");
    let fault = VmError::UnknownOpcode { word: 0xBEEF };
    assert_eq!(vm.step(), Err(fault.clone()));
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.run_state(), &RunState::Faulted(fault.clone()));
    assert_eq!(vm.step(), Err(fault));

    vm.reset();
    assert_eq!(vm.pc(), 0);
    assert_eq!(vm.tick_count(), 0);
    assert_eq!(vm.arch().regs, [0; 4]);
    vm.step().expect("SET executes again");
}

#[test]
fn instruction_memory_writes_persist_and_fault_out_of_range() {
    let mut vm = machine(&[0x3077, 0x9006, 0x0000, 0x0000, 0x9FFF]);
    vm.run(2).expect("SET then STORE");
    assert_eq!(&vm.memory()[6..8], &[0x77, 0x00]);

    vm.reset();
    assert_eq!(vm.memory()[6], 0x77);

    vm.jump(8);
    assert_eq!(
        vm.step(),
        Err(VmError::MemoryOutOfRange {
            address: 0xFFF,
            len: 10,
        })
    );
}

#[test]
fn panicking_instruction_leaves_step_guarded() {
    let mut vm = machine(&[0x8000]);
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| vm.step()));
    assert!(unwound.is_err());
    assert_eq!(vm.phase(), Phase::Executing);

    let ticks = vm.arch().ticks;
    assert_eq!(vm.step(), Err(VmError::ReentrantStep));
    assert_eq!(vm.arch().ticks, ticks);

    vm.reset();
    assert_eq!(vm.phase(), Phase::Idle);
}

#[test]
fn default_loader_rejects_hex_and_empty_sources() {
    let mut vm = Vm::new(TestMachine::default()).expect("valid instruction set");
    assert_eq!(
        vm.load(ProgramSource::Hex("3107")),
        Err(VmError::Loader(LoaderError::Unsupported {
            architecture: "test-machine",
            kind: "hex",
        }))
    );
    assert_eq!(
        vm.load_bytes(&[]),
        Err(VmError::Loader(LoaderError::Empty))
    );
    assert_eq!(vm.run_state(), &RunState::Idle);
    assert_eq!(vm.step(), Err(VmError::NoProgramLoaded));
}

#[test]
fn debug_options_survive_reset() {
    let mut vm = machine(&[0x0000]);
    vm.set_debug_option(VERBOSE, true).expect("known option");
    vm.arch_mut().verbose = false;
    vm.reset();
    assert_eq!(vm.debug_option(VERBOSE), Ok(true));
    assert_eq!(
        vm.debug_option("colour"),
        Err(VmError::UnknownDebugOption {
            name: "colour".to_owned(),
        })
    );
}

#[test]
fn guest_events_are_drained_in_order() {
    let mut vm = machine(&[0x3001, 0x7000, 0x3002, 0x7000, 0x7000]);
    vm.run(5).expect("runs");
    let events = vm.drain_events();
    assert_eq!(events, vec![Event::new(BEEP, 1), Event::new(BEEP, 2)]);
    assert!(vm.drain_events().is_empty());
}

#[test]
fn snapshot_round_trip_restores_state_and_clears_fault() {
    let mut vm = machine(&[0x3209, 0x3310, 0xBEEF]);
    vm.run(2).expect("two SETs");
    let snapshot = vm.snapshot().expect("loaded");
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.architecture, "test-machine");
    assert_eq!(snapshot.state.regs, [0, 0, 9, 0x10]);

    assert!(vm.step().is_err());
    vm.restore(&snapshot).expect("round trip");
    assert_eq!(vm.run_state(), &RunState::Loaded);
    assert_eq!(vm.pc(), 4);
    assert_eq!(vm.tick_count(), 2);
    assert_eq!(vm.arch().regs, [0, 0, 9, 0x10]);
    assert!(vm.cache().is_empty());
}

#[test]
fn bad_snapshots_leave_vm_untouched() {
    let mut vm = machine(&[0x3209, 0x0000]);
    vm.step().expect("SET executes");
    let good = vm.snapshot().expect("loaded");

    let mut wrong_version = good.clone();
    wrong_version.version = 7;
    let mut foreign = good.clone();
    foreign.architecture = "chip-8".to_owned();
    let mut pc_past_end = good.clone();
    pc_past_end.pc = 6;
    let mut oversized = good;
    oversized.image = vec![0; MAX_IMAGE_LEN + 2];

    vm.step().expect("NOP executes");
    let before = (vm.pc(), vm.tick_count(), vm.arch().clone(), vm.memory().to_vec());

    assert_eq!(
        vm.restore(&wrong_version),
        Err(VmError::VersionMismatch {
            found: 7,
            expected: 1,
        })
    );
    assert_eq!(
        vm.restore(&foreign),
        Err(VmError::ArchitectureMismatch {
            found: "chip-8".to_owned(),
            expected: "test-machine",
        })
    );
    assert!(matches!(
        vm.restore(&pc_past_end),
        Err(VmError::MalformedSnapshot { .. })
    ));
    assert!(matches!(
        vm.restore(&oversized),
        Err(VmError::MalformedSnapshot { .. })
    ));
    assert_eq!(
        (vm.pc(), vm.tick_count(), vm.arch().clone(), vm.memory().to_vec()),
        before
    );
}

#[test]
fn interpreted_config_never_caches() {
    let mut vm = Vm::with_config(TestMachine::default(), VmConfig::interpreted())
        .expect("valid instruction set");
    vm.load_bytes(&rom(&[0x3001, 0x1000])).expect("program loads");
    vm.run(4).expect("loops");
    assert!(vm.cache().is_empty());
    assert!(!vm.decode(0x3001).expect("decodes").is_compiled());
}
