//! End-to-end behaviour of the engine on small programs.

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

mod support;

use support::TestMachine;
use vm_core::chip8::Chip8;
use vm_core::{
    OpMask, OpTable, Operands, Operation, Program, ProgramStack, Vm, VmError,
};

fn chip8(rom: &[u8]) -> Vm<Chip8> {
    let mut vm = Vm::new(Chip8::default()).expect("valid instruction set");
    vm.load_bytes(rom).expect("rom loads");
    vm
}

#[test]
fn set_index_register_advances_pc() {
    let mut vm = chip8(&[0xA2, 0x2A]);
    vm.step().expect("LD I executes");
    assert_eq!(vm.arch().registers().i(), 0x22A);
    assert_eq!(vm.pc(), 2);
}

#[test]
fn in_step_jump_lands_exactly_on_target() {
    let mut vm = chip8(&[0x12, 0x00]);
    vm.step().expect("JP executes");
    assert_eq!(vm.pc(), 0x200);
}

#[test]
fn seventeenth_push_overflows() {
    let mut stack = ProgramStack::default();
    for n in 0..16 {
        stack.push(n * 2).expect("within capacity");
    }
    assert_eq!(
        stack.push(0x300),
        Err(VmError::StackOverflow { capacity: 16 })
    );
    assert_eq!(stack.pop(), Ok(30));
    assert_eq!(stack.push(0x300), Ok(()));
}

#[test]
fn fetch_needs_two_remaining_bytes() {
    let program = Program::from_image(vec![0x11, 0x22, 0x33, 0x44, 0x55]);
    assert_eq!(program.fetch(2), Ok(0x3344));
    assert_eq!(program.fetch(3), Ok(0x4455));
    assert_eq!(
        program.fetch(4),
        Err(VmError::FetchOutOfRange { address: 4, len: 5 })
    );
}

fn inert(_: &mut vm_core::Context<'_, TestMachine>, _: &Operands) -> Result<(), VmError> {
    Ok(())
}

#[test]
fn more_specific_mask_wins_and_misses_fault() {
    let wide = Operation::new(
        "WIDE",
        0xA000,
        OpMask::new(0xF000, &[0x0FFF]).expect("valid mask"),
        "WIDE {0}",
        inert,
    )
    .expect("opcode inside mask");
    let narrow = Operation::new(
        "NARROW",
        0xA200,
        OpMask::new(0xFF00, &[0x00FF]).expect("valid mask"),
        "NARROW {0}",
        inert,
    )
    .expect("opcode inside mask");
    let table = OpTable::new(vec![wide, narrow]);

    let (_, operation) = table.resolve(0xA200).expect("both match");
    assert_eq!(operation.mnemonic(), "NARROW");
    let (_, operation) = table.resolve(0xA300).expect("wide matches");
    assert_eq!(operation.mnemonic(), "WIDE");
    assert_eq!(
        table.resolve(0xB200).map(|(index, _)| index),
        Err(VmError::UnknownOpcode { word: 0xB200 })
    );
}

#[test]
fn snapshot_restores_into_fresh_vm_and_rejects_other_architectures() {
    let mut vm = chip8(&[0x60, 0x2A, 0xA3, 0x00, 0x20, 0x08, 0x00, 0x00, 0x71, 0x01, 0x10, 0x08]);
    vm.run(3).expect("program runs");
    assert_eq!(vm.pc(), 0x008);
    let snapshot = vm.snapshot().expect("loaded");

    let mut fresh = Vm::new(Chip8::default()).expect("valid instruction set");
    fresh.restore(&snapshot).expect("same architecture");
    assert_eq!(fresh.pc(), vm.pc());
    assert_eq!(fresh.tick_count(), vm.tick_count());
    assert_eq!(fresh.arch(), vm.arch());
    assert_eq!(fresh.memory(), vm.memory());

    fresh.step().expect("ADD executes");
    vm.step().expect("ADD executes");
    assert_eq!(fresh.arch(), vm.arch());

    let mut other = support::machine(&[0x3005]);
    other.step().expect("SET executes");
    let before = other.arch().clone();
    let foreign = snapshot.map_state(|_| TestMachine::default());
    assert_eq!(
        other.restore(&foreign),
        Err(VmError::ArchitectureMismatch {
            found: "chip-8".to_owned(),
            expected: "test-machine",
        })
    );
    assert_eq!(other.arch(), &before);
    assert_eq!(other.pc(), 2);
    assert_eq!(other.tick_count(), 1);
}
