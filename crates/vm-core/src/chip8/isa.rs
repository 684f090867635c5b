//! CHIP-8 instruction set.
//!
//! Each instruction body lives in one helper taking plain operand values.
//! `exec_*` adapts it to decoded operands, `compile_*` captures the values
//! once, so both paths share the same semantics.

use super::{key_wait_callback, Chip8, DISPLAY_EVENT, FONT_OFFSET, GLYPH_HEIGHT, KEYDOWN};
use crate::context::Context;
use crate::event::Event;
use crate::fault::{MaskError, VmError};
use crate::mask::OpMask;
use crate::operation::{compiled, CompiledFn, ExecuteFn, OperandTag, Operands, Operation};
use crate::program::INSTRUCTION_WIDTH;

const X: u32 = 0x0F00;
const Y: u32 = 0x00F0;
const N: u32 = 0x000F;
const NN: u32 = 0x00FF;
const NNN: u32 = 0x0FFF;

const DST: Option<OperandTag> = Some(OperandTag::Destination);
const REG: Option<OperandTag> = Some(OperandTag::ExactRegister);

type Ctx<'a, 'vm> = &'a mut Context<'vm, Chip8>;

fn op(
    mnemonic: &'static str,
    opcode: u16,
    match_mask: u32,
    operands: &[u32],
    template: &'static str,
    execute: ExecuteFn<Chip8>,
) -> Result<Operation<Chip8>, MaskError> {
    Operation::new(
        mnemonic,
        opcode,
        OpMask::new(match_mask, operands)?,
        template,
        execute,
    )
}

/// Full instruction set in registration order.
pub(super) fn operations() -> Result<Vec<Operation<Chip8>>, MaskError> {
    Ok(vec![
        op("CLS", 0x00E0, 0xFFFF, &[], "CLS", exec_cls)?,
        op("RET", 0x00EE, 0xFFFF, &[], "RET", exec_ret)?,
        op("SYS", 0x0000, 0xF000, &[NNN], "SYS {0}", exec_sys)?,
        op("JP", 0x1000, 0xF000, &[NNN], "JP {0}", exec_jp)?.with_compile(compile_jp),
        op("CALL", 0x2000, 0xF000, &[NNN], "CALL {0}", exec_call)?,
        op("SE", 0x3000, 0xF000, &[X, NN], "SE {0}, {1}", exec_se_byte)?
            .with_tags([REG, None, None])
            .with_compile(compile_se_byte),
        op("SNE", 0x4000, 0xF000, &[X, NN], "SNE {0}, {1}", exec_sne_byte)?
            .with_tags([REG, None, None])
            .with_compile(compile_sne_byte),
        op("SE", 0x5000, 0xF00F, &[X, Y], "SE {0}, {1}", exec_se_reg)?
            .with_tags([REG, REG, None])
            .with_compile(compile_se_reg),
        op("LD", 0x6000, 0xF000, &[X, NN], "LD {0}, {1}", exec_ld_byte)?
            .with_tags([DST, None, None])
            .with_compile(compile_ld_byte),
        op("ADD", 0x7000, 0xF000, &[X, NN], "ADD {0}, {1}", exec_add_byte)?
            .with_tags([DST, None, None])
            .with_compile(compile_add_byte),
        op("LD", 0x8000, 0xF00F, &[X, Y], "LD {0}, {1}", exec_ld_reg)?
            .with_tags([DST, REG, None])
            .with_compile(compile_ld_reg),
        op("OR", 0x8001, 0xF00F, &[X, Y], "OR {0}, {1}", exec_or)?.with_tags([DST, REG, None]),
        op("AND", 0x8002, 0xF00F, &[X, Y], "AND {0}, {1}", exec_and)?.with_tags([DST, REG, None]),
        op("XOR", 0x8003, 0xF00F, &[X, Y], "XOR {0}, {1}", exec_xor)?.with_tags([DST, REG, None]),
        op("ADD", 0x8004, 0xF00F, &[X, Y], "ADD {0}, {1}", exec_add_reg)?
            .with_tags([DST, REG, None])
            .with_compile(compile_add_reg),
        op("SUB", 0x8005, 0xF00F, &[X, Y], "SUB {0}, {1}", exec_sub)?.with_tags([DST, REG, None]),
        op("SHR", 0x8006, 0xF00F, &[X, Y], "SHR {0}, {1}", exec_shr)?.with_tags([DST, REG, None]),
        op("SUBN", 0x8007, 0xF00F, &[X, Y], "SUBN {0}, {1}", exec_subn)?
            .with_tags([DST, REG, None]),
        op("SHL", 0x800E, 0xF00F, &[X, Y], "SHL {0}, {1}", exec_shl)?.with_tags([DST, REG, None]),
        op("SNE", 0x9000, 0xF00F, &[X, Y], "SNE {0}, {1}", exec_sne_reg)?
            .with_tags([REG, REG, None])
            .with_compile(compile_sne_reg),
        op("LD", 0xA000, 0xF000, &[NNN], "LD I, {0}", exec_ld_i)?.with_compile(compile_ld_i),
        op("JP", 0xB000, 0xF000, &[NNN], "JP V0, {0}", exec_jp_offset)?,
        op("RND", 0xC000, 0xF000, &[X, NN], "RND {0}, {1}", exec_rnd)?.with_tags([DST, None, None]),
        op("DRW", 0xD000, 0xF000, &[X, Y, N], "DRW {0}, {1}, {2}", exec_drw)?
            .with_tags([REG, REG, None]),
        op("SKP", 0xE09E, 0xF0FF, &[X], "SKP {0}", exec_skp)?.with_tags([REG, None, None]),
        op("SKNP", 0xE0A1, 0xF0FF, &[X], "SKNP {0}", exec_sknp)?.with_tags([REG, None, None]),
        op("LD", 0xF007, 0xF0FF, &[X], "LD {0}, DT", exec_ld_vx_dt)?.with_tags([DST, None, None]),
        op("LD", 0xF00A, 0xF0FF, &[X], "LD {0}, K", exec_ld_vx_k)?.with_tags([DST, None, None]),
        op("LD", 0xF015, 0xF0FF, &[X], "LD DT, {0}", exec_ld_dt_vx)?.with_tags([REG, None, None]),
        op("LD", 0xF018, 0xF0FF, &[X], "LD ST, {0}", exec_ld_st_vx)?.with_tags([REG, None, None]),
        op("ADD", 0xF01E, 0xF0FF, &[X], "ADD I, {0}", exec_add_i)?
            .with_tags([REG, None, None])
            .with_compile(compile_add_i),
        op("LD", 0xF029, 0xF0FF, &[X], "LD F, {0}", exec_ld_f)?.with_tags([REG, None, None]),
        op("LD", 0xF033, 0xF0FF, &[X], "LD B, {0}", exec_ld_b)?.with_tags([REG, None, None]),
        op("LD", 0xF055, 0xF0FF, &[X], "LD [I], {0}", exec_store)?.with_tags([REG, None, None]),
        op("LD", 0xF065, 0xF0FF, &[X], "LD {0}, [I]", exec_load)?.with_tags([DST, None, None]),
    ])
}

fn v(ctx: &Context<'_, Chip8>, x: usize) -> u8 {
    ctx.arch.registers().v(x)
}

fn set_v(ctx: Ctx<'_, '_>, x: usize, value: u8) {
    ctx.arch.registers_mut().set_v(x, value);
}

fn set_flag(ctx: Ctx<'_, '_>, set: bool) {
    ctx.arch.registers_mut().set_flag(set);
}

fn skip_if(ctx: Ctx<'_, '_>, condition: bool) -> Result<(), VmError> {
    if condition {
        ctx.hop_forwards(2);
    }
    Ok(())
}

// Flow control.

fn exec_cls(ctx: Ctx<'_, '_>, _: &Operands) -> Result<(), VmError> {
    ctx.arch.display_mut().clear();
    ctx.emit(Event::new(DISPLAY_EVENT, 0));
    Ok(())
}

fn exec_ret(ctx: Ctx<'_, '_>, _: &Operands) -> Result<(), VmError> {
    let address = ctx.arch.stack_mut().pop()?;
    ctx.jump(address);
    Ok(())
}

fn exec_sys(_: Ctx<'_, '_>, _: &Operands) -> Result<(), VmError> {
    Ok(())
}

fn jp(ctx: Ctx<'_, '_>, nnn: u16) -> Result<(), VmError> {
    ctx.jump(nnn);
    Ok(())
}

fn exec_jp(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    jp(ctx, ops.get(0))
}

fn compile_jp(ops: &Operands) -> CompiledFn<Chip8> {
    let nnn = ops.get(0);
    compiled(move |ctx| jp(ctx, nnn))
}

fn exec_call(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let return_to = ctx.pc().wrapping_add(INSTRUCTION_WIDTH);
    ctx.arch.stack_mut().push(return_to)?;
    ctx.jump(ops.get(0));
    Ok(())
}

fn exec_jp_offset(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let nnn = ops.get(0);
    let base = if ctx.arch.quirks().jump_uses_vx {
        v(ctx, usize::from(nnn >> 8))
    } else {
        v(ctx, 0)
    };
    ctx.jump(nnn.wrapping_add(u16::from(base)));
    Ok(())
}

// Conditional skips.

fn se_byte(ctx: Ctx<'_, '_>, x: usize, nn: u8) -> Result<(), VmError> {
    let equal = v(ctx, x) == nn;
    skip_if(ctx, equal)
}

fn exec_se_byte(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    se_byte(ctx, ops.reg(0), ops.byte(1))
}

fn compile_se_byte(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, nn) = (ops.reg(0), ops.byte(1));
    compiled(move |ctx| se_byte(ctx, x, nn))
}

fn sne_byte(ctx: Ctx<'_, '_>, x: usize, nn: u8) -> Result<(), VmError> {
    let differ = v(ctx, x) != nn;
    skip_if(ctx, differ)
}

fn exec_sne_byte(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    sne_byte(ctx, ops.reg(0), ops.byte(1))
}

fn compile_sne_byte(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, nn) = (ops.reg(0), ops.byte(1));
    compiled(move |ctx| sne_byte(ctx, x, nn))
}

fn se_reg(ctx: Ctx<'_, '_>, x: usize, y: usize) -> Result<(), VmError> {
    let equal = v(ctx, x) == v(ctx, y);
    skip_if(ctx, equal)
}

fn exec_se_reg(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    se_reg(ctx, ops.reg(0), ops.reg(1))
}

fn compile_se_reg(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, y) = (ops.reg(0), ops.reg(1));
    compiled(move |ctx| se_reg(ctx, x, y))
}

fn sne_reg(ctx: Ctx<'_, '_>, x: usize, y: usize) -> Result<(), VmError> {
    let differ = v(ctx, x) != v(ctx, y);
    skip_if(ctx, differ)
}

fn exec_sne_reg(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    sne_reg(ctx, ops.reg(0), ops.reg(1))
}

fn compile_sne_reg(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, y) = (ops.reg(0), ops.reg(1));
    compiled(move |ctx| sne_reg(ctx, x, y))
}

fn key_down(ctx: &Context<'_, Chip8>, x: usize) -> bool {
    ctx.arch.keypad().is_down(v(ctx, x) & 0xF)
}

fn exec_skp(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let down = key_down(ctx, ops.reg(0));
    skip_if(ctx, down)
}

fn exec_sknp(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let down = key_down(ctx, ops.reg(0));
    skip_if(ctx, !down)
}

// Register loads and arithmetic.

fn ld_byte(ctx: Ctx<'_, '_>, x: usize, nn: u8) -> Result<(), VmError> {
    set_v(ctx, x, nn);
    Ok(())
}

fn exec_ld_byte(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    ld_byte(ctx, ops.reg(0), ops.byte(1))
}

fn compile_ld_byte(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, nn) = (ops.reg(0), ops.byte(1));
    compiled(move |ctx| ld_byte(ctx, x, nn))
}

fn add_byte(ctx: Ctx<'_, '_>, x: usize, nn: u8) -> Result<(), VmError> {
    let sum = v(ctx, x).wrapping_add(nn);
    set_v(ctx, x, sum);
    Ok(())
}

fn exec_add_byte(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    add_byte(ctx, ops.reg(0), ops.byte(1))
}

fn compile_add_byte(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, nn) = (ops.reg(0), ops.byte(1));
    compiled(move |ctx| add_byte(ctx, x, nn))
}

fn ld_reg(ctx: Ctx<'_, '_>, x: usize, y: usize) -> Result<(), VmError> {
    let value = v(ctx, y);
    set_v(ctx, x, value);
    Ok(())
}

fn exec_ld_reg(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    ld_reg(ctx, ops.reg(0), ops.reg(1))
}

fn compile_ld_reg(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, y) = (ops.reg(0), ops.reg(1));
    compiled(move |ctx| ld_reg(ctx, x, y))
}

fn logic(ctx: Ctx<'_, '_>, ops: &Operands, f: fn(u8, u8) -> u8) -> Result<(), VmError> {
    let (x, y) = (ops.reg(0), ops.reg(1));
    let result = f(v(ctx, x), v(ctx, y));
    set_v(ctx, x, result);
    if ctx.arch.quirks().logic_resets_vf {
        set_flag(ctx, false);
    }
    Ok(())
}

fn exec_or(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    logic(ctx, ops, |a, b| a | b)
}

fn exec_and(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    logic(ctx, ops, |a, b| a & b)
}

fn exec_xor(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    logic(ctx, ops, |a, b| a ^ b)
}

// VF is written last, so a flag result wins when X is F.

fn add_reg(ctx: Ctx<'_, '_>, x: usize, y: usize) -> Result<(), VmError> {
    let (sum, carry) = v(ctx, x).overflowing_add(v(ctx, y));
    set_v(ctx, x, sum);
    set_flag(ctx, carry);
    Ok(())
}

fn exec_add_reg(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    add_reg(ctx, ops.reg(0), ops.reg(1))
}

fn compile_add_reg(ops: &Operands) -> CompiledFn<Chip8> {
    let (x, y) = (ops.reg(0), ops.reg(1));
    compiled(move |ctx| add_reg(ctx, x, y))
}

fn exec_sub(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let x = ops.reg(0);
    let (diff, borrow) = v(ctx, x).overflowing_sub(v(ctx, ops.reg(1)));
    set_v(ctx, x, diff);
    set_flag(ctx, !borrow);
    Ok(())
}

fn exec_subn(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let x = ops.reg(0);
    let (diff, borrow) = v(ctx, ops.reg(1)).overflowing_sub(v(ctx, x));
    set_v(ctx, x, diff);
    set_flag(ctx, !borrow);
    Ok(())
}

fn shift_source(ctx: &Context<'_, Chip8>, ops: &Operands) -> u8 {
    if ctx.arch.quirks().shift_uses_vy {
        v(ctx, ops.reg(1))
    } else {
        v(ctx, ops.reg(0))
    }
}

fn exec_shr(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let source = shift_source(ctx, ops);
    set_v(ctx, ops.reg(0), source >> 1);
    set_flag(ctx, source & 0x01 != 0);
    Ok(())
}

fn exec_shl(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let source = shift_source(ctx, ops);
    set_v(ctx, ops.reg(0), source << 1);
    set_flag(ctx, source & 0x80 != 0);
    Ok(())
}

fn exec_rnd(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let random = ctx.arch.next_random();
    set_v(ctx, ops.reg(0), random & ops.byte(1));
    Ok(())
}

// Index register.

fn ld_i(ctx: Ctx<'_, '_>, nnn: u16) -> Result<(), VmError> {
    ctx.arch.registers_mut().set_i(nnn);
    Ok(())
}

fn exec_ld_i(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    ld_i(ctx, ops.get(0))
}

fn compile_ld_i(ops: &Operands) -> CompiledFn<Chip8> {
    let nnn = ops.get(0);
    compiled(move |ctx| ld_i(ctx, nnn))
}

fn add_i(ctx: Ctx<'_, '_>, x: usize) -> Result<(), VmError> {
    let i = ctx.arch.registers().i().wrapping_add(u16::from(v(ctx, x)));
    ctx.arch.registers_mut().set_i(i);
    Ok(())
}

fn exec_add_i(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    add_i(ctx, ops.reg(0))
}

fn compile_add_i(ops: &Operands) -> CompiledFn<Chip8> {
    let x = ops.reg(0);
    compiled(move |ctx| add_i(ctx, x))
}

fn exec_ld_f(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let glyph = u16::from(v(ctx, ops.reg(0)) & 0xF);
    ctx.arch
        .registers_mut()
        .set_i(FONT_OFFSET + glyph * GLYPH_HEIGHT);
    Ok(())
}

// Memory.

fn index(ctx: &Context<'_, Chip8>) -> usize {
    usize::from(ctx.arch.registers().i())
}

fn exec_ld_b(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let value = v(ctx, ops.reg(0));
    let i = index(ctx);
    ctx.write_byte(i + 2, value % 10)?;
    ctx.write_byte(i + 1, value / 10 % 10)?;
    ctx.write_byte(i, value / 100)
}

fn advance_index(ctx: Ctx<'_, '_>, count: u16) {
    if ctx.arch.quirks().load_store_increments_i {
        let i = ctx.arch.registers().i().wrapping_add(count);
        ctx.arch.registers_mut().set_i(i);
    }
}

fn exec_store(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let x = ops.reg(0);
    let i = index(ctx);
    for k in (0..=x).rev() {
        let value = v(ctx, k);
        ctx.write_byte(i + k, value)?;
    }
    advance_index(ctx, ops.get(0) + 1);
    Ok(())
}

fn exec_load(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let x = ops.reg(0);
    let i = index(ctx);
    let mut values = [0u8; 16];
    for (k, slot) in values.iter_mut().enumerate().take(x + 1) {
        *slot = ctx.read_byte(i + k)?;
    }
    for (k, value) in values.iter().enumerate().take(x + 1) {
        set_v(ctx, k, *value);
    }
    advance_index(ctx, ops.get(0) + 1);
    Ok(())
}

fn exec_drw(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let (x, y) = (v(ctx, ops.reg(0)), v(ctx, ops.reg(1)));
    let rows = usize::from(ops.get(2));
    let i = index(ctx);
    let mut sprite = [0u8; 15];
    for (k, line) in sprite.iter_mut().enumerate().take(rows) {
        *line = ctx.read_byte(i + k)?;
    }
    let collision = ctx.arch.display_mut().draw_sprite(x, y, &sprite[..rows]);
    set_flag(ctx, collision);
    ctx.emit(Event::new(DISPLAY_EVENT, 0));
    Ok(())
}

// Timers and input.

fn exec_ld_vx_dt(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let delay = ctx.arch.delay_timer();
    set_v(ctx, ops.reg(0), delay);
    Ok(())
}

fn exec_ld_vx_k(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let register = ops.byte(0) & 0xF;
    ctx.await_event(KEYDOWN, key_wait_callback(register))?;
    ctx.arch.begin_key_wait(register);
    Ok(())
}

fn exec_ld_dt_vx(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let value = v(ctx, ops.reg(0));
    ctx.arch.set_delay_timer(value);
    Ok(())
}

fn exec_ld_st_vx(ctx: Ctx<'_, '_>, ops: &Operands) -> Result<(), VmError> {
    let value = v(ctx, ops.reg(0));
    ctx.arch.set_sound_timer(value);
    Ok(())
}
