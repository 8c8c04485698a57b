//! AArch64 lowering rules: hand-written pattern matches with explicit
//! priorities, since this backend's rule set is small enough that a
//! decision-tree compiler is not yet warranted. Priorities and tie-
//! breaking still follow the same longest-match discipline a compiled
//! rule set would enforce, so swapping one in later is a drop-in.

use super::inst::{AMode, Cond, Inst, OperandSize};
use crate::ir::{InstructionData, IntCC, Opcode};
use crate::machinst::abi::ConventionRegs;
use crate::machinst::lower::{LowerBackend, LowerCtx};
use crate::machinst::vcode::VCodeBlock;
use crate::regs::{PReg, Reg, RegClass};
use crate::result::{CodegenError, CodegenResult};

/// Lowering rules plus the ABI register pools the function's calling
/// convention draws from, so call/return lowering can assign real PRegs
/// instead of hardcoding the integer bank.
pub struct AArch64Lower {
    int_args: &'static [PReg],
    float_args: &'static [PReg],
    int_rets: &'static [PReg],
    float_rets: &'static [PReg],
}

impl AArch64Lower {
    pub fn new(regs: &ConventionRegs) -> Self {
        Self {
            int_args: regs.int_args,
            float_args: regs.float_args,
            int_rets: regs.int_rets,
            float_rets: regs.float_rets,
        }
    }
}

/// Assign each value in `vals` the next free register from its type's pool
/// (int or float), pairing the value's own register with the ABI PReg it
/// is constrained to. Errors once a pool is exhausted — stack-passed
/// arguments/returns are not supported.
fn assign_abi_regs(
    ctx: &mut LowerCtx<'_, Inst>,
    vals: &[crate::ir::Value],
    int_pool: &[PReg],
    float_pool: &[PReg],
    call_conv: crate::ir::CallConv,
) -> CodegenResult<alloc::vec::Vec<(Reg, PReg)>> {
    let mut int_idx = 0;
    let mut float_idx = 0;
    let mut out = alloc::vec::Vec::with_capacity(vals.len());
    for &v in vals {
        let ty = ctx.func.dfg.value_type(v);
        let reg = ctx.value_regs(v).get(0);
        let preg = if ty.is_float() || ty.is_vector() {
            let p = *float_pool
                .get(float_idx)
                .ok_or(CodegenError::UnsupportedConvention { call_conv })?;
            float_idx += 1;
            p
        } else {
            let p = *int_pool.get(int_idx).ok_or(CodegenError::UnsupportedConvention { call_conv })?;
            int_idx += 1;
            p
        };
        out.push((reg, preg));
    }
    Ok(out)
}

/// Sequentialize a simultaneous register assignment (`dst <- src` for each
/// pair, all reading pre-assignment values) into an ordered move list,
/// breaking cycles with a scratch register reserved out of the allocator's
/// pool for exactly this purpose.
fn sequentialize_moves(
    mut moves: alloc::vec::Vec<(Reg, Reg, RegClass)>,
    scratch_int: PReg,
    scratch_float: PReg,
) -> alloc::vec::Vec<Inst> {
    moves.retain(|(d, s, _)| d != s);
    let mut out = alloc::vec::Vec::new();
    while !moves.is_empty() {
        let safe = moves.iter().position(|(d, _, _)| !moves.iter().any(|(_, s2, _)| s2 == d));
        if let Some(pos) = safe {
            let (d, s, class) = moves.remove(pos);
            out.push(Inst::gen_move(d, s, class));
        } else {
            let (d0, _, class0) = moves[0];
            let scratch = match class0 {
                RegClass::Int => scratch_int,
                RegClass::Float | RegClass::Vector => scratch_float,
            };
            let scratch_reg = Reg::from_physical(scratch);
            out.push(Inst::gen_move(scratch_reg, d0, class0));
            for (_, s, _) in moves.iter_mut() {
                if *s == d0 {
                    *s = scratch_reg;
                }
            }
        }
    }
    out
}

fn size_of(ty: crate::ir::Type) -> OperandSize {
    if ty.bits() > 32 {
        OperandSize::Size64
    } else {
        OperandSize::Size32
    }
}

/// Try to fold `value`'s producer as an immediate operand: a pure,
/// single-use `iconst` that fits a 12-bit unsigned immediate.
fn fold_imm12(ctx: &LowerCtx<'_, Inst>, value: crate::ir::Value) -> Option<u16> {
    let inst = ctx.producer(value)?;
    match ctx.data(inst) {
        InstructionData::UnaryImm { opcode: Opcode::Iconst, imm, .. } => {
            let v = imm.masked(32);
            u16::try_from(v & 0xfff).ok().filter(|_| (0..=0xfff).contains(&v))
        }
        _ => None,
    }
}

fn cond_from_intcc(cc: IntCC) -> Cond {
    match cc {
        IntCC::Equal => Cond::Eq,
        IntCC::NotEqual => Cond::Ne,
        IntCC::SignedLessThan => Cond::Lt,
        IntCC::SignedGreaterThanOrEqual => Cond::Ge,
        IntCC::SignedGreaterThan => Cond::Gt,
        IntCC::SignedLessThanOrEqual => Cond::Le,
        IntCC::UnsignedLessThan => Cond::Lo,
        IntCC::UnsignedGreaterThanOrEqual => Cond::Hs,
        IntCC::UnsignedGreaterThan => Cond::Hi,
        IntCC::UnsignedLessThanOrEqual => Cond::Ls,
    }
}

impl LowerBackend for AArch64Lower {
    type Inst = Inst;

    fn lower(&self, ctx: &mut LowerCtx<'_, Inst>, inst: crate::ir::Inst) -> CodegenResult<()> {
        let data = ctx.data(inst).clone();
        let opcode = data.opcode();
        match &data {
            InstructionData::UnaryImm { opcode: Opcode::Iconst, imm, .. } => {
                let result = ctx.func.dfg.inst_results(inst)[0];
                let rd = ctx.value_regs(result).get(0);
                let ty = ctx.func.dfg.value_type(result);
                emit_load_const(ctx, rd, imm.masked(ty.bits().min(64) as u32) as u64, size_of(ty));
                Ok(())
            }
            InstructionData::Binary { opcode: op, args } => {
                let result = ctx.func.dfg.inst_results(inst)[0];
                let rd = ctx.value_regs(result).get(0);
                let ty = ctx.func.dfg.value_type(result);
                let size = size_of(ty);
                let rn = ctx.value_regs(args[0]).get(0);

                if matches!(op, Opcode::Iadd | Opcode::Isub) {
                    if let Some(imm12) = fold_imm12(ctx, args[1]) {
                        let rm_inst = match op {
                            Opcode::Iadd => Inst::AddImm { size, rd, rn, imm12 },
                            _ => Inst::SubImm { size, rd, rn, imm12 },
                        };
                        ctx.emit(rm_inst);
                        return Ok(());
                    }
                }

                let rm = ctx.value_regs(args[1]).get(0);
                let built = match op {
                    Opcode::Iadd => Inst::AddRR { size, rd, rn, rm },
                    Opcode::Isub => Inst::SubRR { size, rd, rn, rm },
                    Opcode::Imul => Inst::MulRR { size, rd, rn, rm },
                    Opcode::Sdiv => Inst::SDivRR { size, rd, rn, rm },
                    Opcode::Udiv => Inst::UDivRR { size, rd, rn, rm },
                    Opcode::Band => Inst::AndRR { size, rd, rn, rm },
                    Opcode::Bor => Inst::OrrRR { size, rd, rn, rm },
                    Opcode::Bxor => Inst::EorRR { size, rd, rn, rm },
                    Opcode::Ishl => Inst::LslRR { size, rd, rn, rm },
                    Opcode::Ushr => Inst::LsrRR { size, rd, rn, rm },
                    Opcode::Sshr => Inst::AsrRR { size, rd, rn, rm },
                    Opcode::Fadd => Inst::FAddRR { rd, rn, rm, is_64: ty.bits() == 64 },
                    Opcode::Fsub => Inst::FSubRR { rd, rn, rm, is_64: ty.bits() == 64 },
                    Opcode::Fmul => Inst::FMulRR { rd, rn, rm, is_64: ty.bits() == 64 },
                    Opcode::Fdiv => Inst::FDivRR { rd, rn, rm, is_64: ty.bits() == 64 },
                    other => {
                        return Err(CodegenError::UnhandledInstruction {
                            opcode: *other,
                            location: Default::default(),
                        })
                    }
                };
                ctx.emit(built);
                Ok(())
            }
            InstructionData::Unary { opcode: op, arg } => {
                let result = ctx.func.dfg.inst_results(inst)[0];
                let rd = ctx.value_regs(result).get(0);
                let ty = ctx.func.dfg.value_type(result);
                let rn = ctx.value_regs(*arg).get(0);
                let size = size_of(ty);
                let built = match op {
                    Opcode::Ineg => Inst::NegRR { size, rd, rn },
                    Opcode::Bnot => Inst::MvnRR { size, rd, rn },
                    Opcode::Clz => Inst::ClzRR { size, rd, rn },
                    Opcode::Fneg => Inst::FNegRR { rd, rn, is_64: ty.bits() == 64 },
                    Opcode::Fabs => Inst::FAbsRR { rd, rn, is_64: ty.bits() == 64 },
                    Opcode::Sqrt => Inst::FSqrtRR { rd, rn, is_64: ty.bits() == 64 },
                    Opcode::Bitcast(_) => Inst::MovRR { size, rd, rn },
                    other => {
                        return Err(CodegenError::UnhandledInstruction {
                            opcode: *other,
                            location: Default::default(),
                        })
                    }
                };
                ctx.emit(built);
                Ok(())
            }
            InstructionData::Load { opcode: Opcode::Load, arg, offset, .. } => {
                let result = ctx.func.dfg.inst_results(inst)[0];
                let rd = ctx.value_regs(result).get(0);
                let ty = ctx.func.dfg.value_type(result);
                let base = ctx.value_regs(*arg).get(0);
                let mem = AMode::RegOffset { base, offset: offset.bytes() };
                ctx.emit(match ty.bits() {
                    64 => Inst::Ldr { size: OperandSize::Size64, rd, mem },
                    32 => Inst::Ldr { size: OperandSize::Size32, rd, mem },
                    16 => Inst::LdrH { rd, mem },
                    8 => Inst::LdrB { rd, mem },
                    _ => {
                        return Err(CodegenError::UnsupportedType { ty })
                    }
                });
                Ok(())
            }
            InstructionData::Store { opcode: Opcode::Store, args, offset, .. } => {
                let ty = ctx.func.dfg.value_type(args[0]);
                let rd = ctx.value_regs(args[0]).get(0);
                let base = ctx.value_regs(args[1]).get(0);
                let mem = AMode::RegOffset { base, offset: offset.bytes() };
                ctx.emit(match ty.bits() {
                    64 => Inst::Str { size: OperandSize::Size64, rd, mem },
                    32 => Inst::Str { size: OperandSize::Size32, rd, mem },
                    16 => Inst::StrH { rd, mem },
                    8 => Inst::StrB { rd, mem },
                    _ => return Err(CodegenError::UnsupportedType { ty }),
                });
                Ok(())
            }
            InstructionData::IntCompare { cond, args } => {
                let result = ctx.func.dfg.inst_results(inst)[0];
                let rd = ctx.value_regs(result).get(0);
                let ty = ctx.func.dfg.value_type(args[0]);
                let size = size_of(ty);
                let rn = ctx.value_regs(args[0]).get(0);
                let rm = ctx.value_regs(args[1]).get(0);
                ctx.emit(Inst::CmpRR { size, rn, rm });
                ctx.emit(Inst::CSet { size: OperandSize::Size32, rd, cond: cond_from_intcc(*cond) });
                Ok(())
            }
            InstructionData::Call { func_ref, args } => {
                let ext = ctx.func.dfg.ext_funcs[*func_ref].clone();
                let call_conv = ctx.func.dfg.signatures[ext.signature].call_conv;
                let args = args.clone();
                let uses = assign_abi_regs(ctx, &args, self.int_args, self.float_args, call_conv)?;
                let results = ctx.func.dfg.inst_results(inst).to_vec();
                let defs = assign_abi_regs(ctx, &results, self.int_rets, self.float_rets, call_conv)?;
                ctx.emit(Inst::Call { callee: ext.name, uses, defs, exception_successor: None });
                Ok(())
            }
            InstructionData::StackLoad { slot, offset } => {
                let result = ctx.func.dfg.inst_results(inst)[0];
                let rd = ctx.value_regs(result).get(0);
                let ty = ctx.func.dfg.value_type(result);
                let mem = AMode::StackSlot { slot: *slot, offset: offset.bytes() };
                ctx.emit(match ty.bits() {
                    64 => Inst::Ldr { size: OperandSize::Size64, rd, mem },
                    32 => Inst::Ldr { size: OperandSize::Size32, rd, mem },
                    16 => Inst::LdrH { rd, mem },
                    8 => Inst::LdrB { rd, mem },
                    _ => return Err(CodegenError::UnsupportedType { ty }),
                });
                Ok(())
            }
            InstructionData::StackStore { arg, slot, offset } => {
                let ty = ctx.func.dfg.value_type(*arg);
                let rd = ctx.value_regs(*arg).get(0);
                let mem = AMode::StackSlot { slot: *slot, offset: offset.bytes() };
                ctx.emit(match ty.bits() {
                    64 => Inst::Str { size: OperandSize::Size64, rd, mem },
                    32 => Inst::Str { size: OperandSize::Size32, rd, mem },
                    16 => Inst::StrH { rd, mem },
                    8 => Inst::StrB { rd, mem },
                    _ => return Err(CodegenError::UnsupportedType { ty }),
                });
                Ok(())
            }
            InstructionData::Trap { code } => {
                ctx.emit(Inst::Udf { code: *code });
                Ok(())
            }
            InstructionData::CondTrap { opcode: op, arg, code } => {
                let rn = ctx.value_regs(*arg).get(0);
                ctx.emit(Inst::CmpImm { size: OperandSize::Size64, rn, imm12: 0 });
                let cond = if matches!(op, Opcode::Trapz(_)) { Cond::Eq } else { Cond::Ne };
                ctx.emit(Inst::TrapIf { cond, code: *code });
                Ok(())
            }
            _ => Err(CodegenError::UnhandledInstruction {
                opcode,
                location: Default::default(),
            }),
        }
    }

    fn lower_branch(
        &self,
        ctx: &mut LowerCtx<'_, Inst>,
        inst: crate::ir::Inst,
        targets: &[VCodeBlock],
    ) -> CodegenResult<()> {
        let data = ctx.data(inst).clone();
        match &data {
            InstructionData::MultiAry { opcode: Opcode::Return, args } => {
                let mut int_idx = 0;
                let mut float_idx = 0;
                for &v in args.iter() {
                    let ty = ctx.func.dfg.value_type(v);
                    let reg = ctx.value_regs(v).get(0);
                    let (target, class) = if ty.is_float() || ty.is_vector() {
                        let p = *self
                            .float_rets
                            .get(float_idx)
                            .ok_or(CodegenError::TooManyReturns)?;
                        float_idx += 1;
                        (Reg::from_physical(p), RegClass::Float)
                    } else {
                        let p = *self
                            .int_rets
                            .get(int_idx)
                            .ok_or(CodegenError::TooManyReturns)?;
                        int_idx += 1;
                        (Reg::from_physical(p), RegClass::Int)
                    };
                    if reg != target {
                        ctx.emit(Inst::gen_move(target, reg, class));
                    }
                }
                ctx.emit(Inst::FrameDestroy);
                Ok(())
            }
            InstructionData::TryCall { func_ref, args, exception_table } => {
                let ext = ctx.func.dfg.ext_funcs[*func_ref].clone();
                let call_conv = ctx.func.dfg.signatures[ext.signature].call_conv;
                if !call_conv.supports_exceptions() {
                    return Err(CodegenError::UnsupportedConvention { call_conv });
                }
                let args = args.clone();
                let uses = assign_abi_regs(ctx, &args, self.int_args, self.float_args, call_conv)?;
                let results = ctx.func.dfg.inst_results(inst).to_vec();
                let defs = assign_abi_regs(ctx, &results, self.int_rets, self.float_rets, call_conv)?;
                ctx.emit(Inst::Call {
                    callee: ext.name,
                    uses,
                    defs,
                    exception_successor: Some(targets[1]),
                });

                // No branch to the exception successor is ever emitted —
                // the unwinder routes there via the LSDA entry the
                // emission pass records for this call. Only the normal
                // successor gets an explicit edge.
                let moves =
                    branch_arg_moves(ctx, exception_table.normal_successor, &exception_table.normal_args);
                for m in sequentialize_moves(moves, super::abi::SCRATCH_INT, super::abi::SCRATCH_FLOAT) {
                    ctx.emit(m);
                }
                ctx.emit(Inst::Jump { target: targets[0] });
                Ok(())
            }
            InstructionData::Jump { destination, args } => {
                let moves = branch_arg_moves(ctx, *destination, args);
                for m in sequentialize_moves(moves, super::abi::SCRATCH_INT, super::abi::SCRATCH_FLOAT) {
                    ctx.emit(m);
                }
                ctx.emit(Inst::Jump { target: targets[0] });
                Ok(())
            }
            InstructionData::Brif { arg, then_args, else_block, else_args, .. } => {
                if !then_args.is_empty() {
                    return Err(CodegenError::UnhandledInstruction {
                        opcode: Opcode::Brif,
                        location: Default::default(),
                    });
                }
                let rn = ctx.value_regs(*arg).get(0);
                ctx.emit(Inst::Cbnz { size: OperandSize::Size64, rn, target: targets[0] });
                let moves = branch_arg_moves(ctx, *else_block, else_args);
                for m in sequentialize_moves(moves, super::abi::SCRATCH_INT, super::abi::SCRATCH_FLOAT) {
                    ctx.emit(m);
                }
                ctx.emit(Inst::Jump { target: targets[1] });
                Ok(())
            }
            other => Err(CodegenError::UnhandledInstruction {
                opcode: other.opcode(),
                location: Default::default(),
            }),
        }
    }
}

/// Build the simultaneous-assignment move set binding a jump's argument
/// values to the destination block's parameter registers.
fn branch_arg_moves(
    ctx: &mut LowerCtx<'_, Inst>,
    destination: crate::ir::Block,
    args: &[crate::ir::Value],
) -> alloc::vec::Vec<(Reg, Reg, RegClass)> {
    let params = ctx.func.dfg.block_params(destination).to_vec();
    params
        .iter()
        .zip(args.iter())
        .map(|(&p, &a)| {
            let class = ctx.func.dfg.value_type(p).reg_class();
            let dst = ctx.value_regs(p).get(0);
            let src = ctx.value_regs(a).get(0);
            (dst, src, class)
        })
        .collect()
}

fn emit_load_const(ctx: &mut LowerCtx<'_, Inst>, rd: Reg, value: u64, size: OperandSize) {
    if value == 0 {
        ctx.emit(Inst::MovZ { size, rd, imm16: 0, shift: 0 });
        return;
    }
    let mut first = true;
    for shift in (0..4).map(|i| i * 16) {
        let chunk = ((value >> shift) & 0xffff) as u16;
        if chunk == 0 && !(first && shift == 0) {
            continue;
        }
        if first {
            ctx.emit(Inst::MovZ { size, rd, imm16: chunk, shift });
            first = false;
        } else if chunk != 0 {
            ctx.emit(Inst::MovK { size, rd, imm16: chunk, shift });
        }
    }
    let _ = RegClass::Int;
}
