//! Minimal architecture used to exercise the engine apart from CHIP-8.
#![allow(dead_code)]

use vm_core::{
    Architecture, Context, Event, MaskError, OpMask, OperandTag, Operands, Operation, Vm,
    VmError,
};

pub const GO: &str = "go";
pub const BEEP: &str = "beep";
pub const VERBOSE: &str = "verbose";

/// Four byte registers, a tick counter, and one debug switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestMachine {
    pub regs: [u8; 4],
    pub ticks: u64,
    pub verbose: bool,
    pub latched: Vec<u16>,
}

fn nop(_: &mut Context<'_, TestMachine>, _: &Operands) -> Result<(), VmError> {
    Ok(())
}

fn jmp(ctx: &mut Context<'_, TestMachine>, ops: &Operands) -> Result<(), VmError> {
    ctx.jump(ops.get(0));
    Ok(())
}

fn set(ctx: &mut Context<'_, TestMachine>, ops: &Operands) -> Result<(), VmError> {
    ctx.arch.regs[ops.reg(0) & 3] = ops.byte(1);
    Ok(())
}

fn skip(ctx: &mut Context<'_, TestMachine>, ops: &Operands) -> Result<(), VmError> {
    ctx.hop_forwards(ops.get(0));
    Ok(())
}

fn back(ctx: &mut Context<'_, TestMachine>, ops: &Operands) -> Result<(), VmError> {
    ctx.hop_backwards(ops.get(0));
    Ok(())
}

fn wait(ctx: &mut Context<'_, TestMachine>, _: &Operands) -> Result<(), VmError> {
    ctx.await_event(GO, |machine: &mut TestMachine, event: &Event| {
        machine.regs[0] = event.value.to_be_bytes()[1];
    })
}

fn wait_twice(ctx: &mut Context<'_, TestMachine>, _: &Operands) -> Result<(), VmError> {
    ctx.await_event(GO, |_: &mut TestMachine, _: &Event| {})?;
    ctx.await_event(GO, |_: &mut TestMachine, _: &Event| {})
}

fn beep(ctx: &mut Context<'_, TestMachine>, _: &Operands) -> Result<(), VmError> {
    let value = u16::from(ctx.arch.regs[0]);
    ctx.emit(Event::new(BEEP, value));
    Ok(())
}

fn store(ctx: &mut Context<'_, TestMachine>, ops: &Operands) -> Result<(), VmError> {
    let value = ctx.arch.regs[0];
    ctx.write_byte(usize::from(ops.get(0)), value)
}

fn explode(_: &mut Context<'_, TestMachine>, _: &Operands) -> Result<(), VmError> {
    panic!("instruction blew up mid-step");
}

impl Architecture for TestMachine {
    const NAME: &'static str = "test-machine";
    type State = Self;

    fn operations() -> Result<Vec<Operation<Self>>, MaskError> {
        Ok(vec![
            Operation::new("NOP", 0x0000, OpMask::new(0xFFFF, &[])?, "NOP", nop)?,
            Operation::new("JMP", 0x1000, OpMask::new(0xF000, &[0x0FFF])?, "JMP {0}", jmp)?,
            Operation::new(
                "SET",
                0x3000,
                OpMask::new(0xF000, &[0x0F00, 0x00FF])?,
                "SET {0}, {1}",
                set,
            )?
            .with_tags([Some(OperandTag::Destination), None, None]),
            Operation::new("SKIP", 0x4000, OpMask::new(0xF0FF, &[0x0F00])?, "SKIP {0}", skip)?,
            Operation::new("BACK", 0x5000, OpMask::new(0xF0FF, &[0x0F00])?, "BACK {0}", back)?,
            Operation::new("WAIT", 0x6000, OpMask::new(0xFFFF, &[])?, "WAIT", wait)?,
            Operation::new("BEEP", 0x7000, OpMask::new(0xFFFF, &[])?, "BEEP", beep)?,
            Operation::new("BOOM", 0x8000, OpMask::new(0xFFFF, &[])?, "BOOM", explode)?,
            Operation::new("STORE", 0x9000, OpMask::new(0xF000, &[0x0FFF])?, "STORE {0}", store)?,
            Operation::new("WAIT2", 0xA000, OpMask::new(0xFFFF, &[])?, "WAIT2", wait_twice)?,
        ])
    }

    fn reset(&mut self) {
        self.regs = [0; 4];
        self.ticks = 0;
        self.latched.clear();
    }

    fn tick(&mut self, _clock_speed_hz: u32) {
        self.ticks += 1;
    }

    fn debug_option(&mut self, name: &str, value: Option<bool>) -> Option<bool> {
        if name != VERBOSE {
            return None;
        }
        if let Some(value) = value {
            self.verbose = value;
        }
        Some(self.verbose)
    }

    fn on_event(&mut self, event: &Event) {
        self.latched.push(event.value);
    }

    fn save_state(&self) -> Self::State {
        self.clone()
    }

    fn restore_state(&self, state: &Self::State) -> Result<Self, VmError> {
        Ok(Self {
            latched: Vec::new(),
            ..state.clone()
        })
    }
}

/// Big-endian words to bytes.
pub fn rom(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

pub fn machine(words: &[u16]) -> Vm<TestMachine> {
    let mut vm = Vm::new(TestMachine::default()).expect("valid test instruction set");
    vm.load_bytes(&rom(words)).expect("program loads");
    vm
}
