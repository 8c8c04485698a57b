//! The SSA/dominance verifier. Runs once, after IR construction and
//! before lowering; the core never mutates IR it has verified, so a caller that edits a verified function must re-verify.
//!
//! Checks run in a fixed order, and the first failing check aborts
//! verification — later checks may assume earlier ones held (e.g.
//! dominance checking assumes every block has a terminator).

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Function, Inst, InstructionData, Opcode, Type, Value, ValueDef};
use crate::result::{CodegenError, IrLocation};
use smallvec::SmallVec;

/// Verify `func`'s SSA and dominance invariants.
/// On success, returns the computed flowgraph and dominator tree so the
/// caller (the lowering engine) does not need to recompute them.
pub fn verify_function(func: &Function) -> Result<(ControlFlowGraph, DominatorTree), CodegenError> {
    // 1. Every block has a terminator, and no instruction before it is one.
    for block in func.layout.blocks() {
        let insts = func.layout.block_insts(block);
        if insts.is_empty() {
            return Err(invalid_ssa(
                IrLocation::block(block),
                "block has no instructions",
            ));
        }
        for (i, &inst) in insts.iter().enumerate() {
            let is_term = func.dfg.inst_data(inst).is_terminator();
            let is_last = i == insts.len() - 1;
            if is_term != is_last {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    if is_last {
                        "block's last instruction is not a terminator"
                    } else {
                        "terminator appears before the end of its block"
                    },
                ));
            }
        }
    }

    // Build the CFG and dominator tree now so later checks can use them.
    let mut cfg = ControlFlowGraph::new();
    cfg.compute(func);
    let mut domtree = DominatorTree::new();
    domtree.compute(func, &cfg);

    // 5 / jump targets exist, branch argument arity and type match.
    for block in func.layout.blocks() {
        if let Some(term) = func.layout.last_inst(block) {
            check_branch_arguments(func, term)?;
        }
    }

    // 2 (try-call exactly one normal + one exception successor, both live).
    for inst in func.dfg.insts() {
        if let InstructionData::TryCall { exception_table, .. } = func.dfg.inst_data(inst) {
            if !func.layout.is_block_inserted(exception_table.normal_successor)
                || !func.layout.is_block_inserted(exception_table.exception_successor)
            {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    "try_call successor is not a live block",
                ));
            }
        }
    }

    // 1. Dominance: every use of v is dominated by v's definition.
    for block in func.layout.blocks() {
        for &inst in func.layout.block_insts(block) {
            for arg in func.dfg.inst_data(inst).arguments() {
                check_dominance(func, &domtree, block, inst, arg)?;
            }
        }
    }

    // 3. Operand and result types agree with the opcode's functional
    // signature (e.g. a float op does not take integer operands, an add's
    // two operands and its result all share one type).
    for block in func.layout.blocks() {
        for &inst in func.layout.block_insts(block) {
            check_operand_types(func, inst)?;
        }
    }

    // Stack-slot (aggregate field) accesses stay within their slot's bounds.
    check_aggregate_bounds(func)?;

    Ok((cfg, domtree))
}

fn invalid_ssa(location: IrLocation, detail: &str) -> CodegenError {
    CodegenError::InvalidSsa {
        location,
        detail: detail.into(),
    }
}

fn check_branch_arguments(func: &Function, term: Inst) -> Result<(), CodegenError> {
    let data = func.dfg.inst_data(term);
    let mut pairs: SmallVec<[(crate::ir::Block, &[Value]); 2]> = SmallVec::new();
    match data {
        InstructionData::Jump { destination, args } => pairs.push((*destination, &args[..])),
        InstructionData::Brif {
            then_block,
            then_args,
            else_block,
            else_args,
            ..
        } => {
            pairs.push((*then_block, &then_args[..]));
            pairs.push((*else_block, &else_args[..]));
        }
        _ => {}
    };
    for (target, args) in pairs {
        if !func.layout.is_block_inserted(target) {
            return Err(invalid_ssa(IrLocation::inst(term), "branch target block does not exist"));
        }
        let params = func.dfg.block_params(target);
        if params.len() != args.len() {
            return Err(invalid_ssa(
                IrLocation::inst(term),
                "branch argument count does not match target block parameter arity",
            ));
        }
        for (&a, &p) in args.iter().zip(params.iter()) {
            if func.dfg.value_type(a) != func.dfg.value_type(p) {
                return Err(invalid_ssa(
                    IrLocation::inst(term),
                    "branch argument type does not match target block parameter type",
                ));
            }
        }
    }
    Ok(())
}

fn check_dominance(
    func: &Function,
    domtree: &DominatorTree,
    use_block: crate::ir::Block,
    use_inst: Inst,
    value: Value,
) -> Result<(), CodegenError> {
    let def_block = match func.dfg.value_def(value) {
        ValueDef::Result(def_inst, _) => func
            .layout
            .inst_block(def_inst)
            .expect("defining instruction must be laid out"),
        ValueDef::Param(block, _) => block,
    };

    if def_block == use_block {
        // Same-block use: defined earlier in program order (or is a block
        // param, which dominates everything in its own block).
        if let ValueDef::Result(def_inst, _) = func.dfg.value_def(value) {
            let insts = func.layout.block_insts(use_block);
            let def_pos = insts.iter().position(|&i| i == def_inst);
            let use_pos = insts.iter().position(|&i| i == use_inst);
            if let (Some(d), Some(u)) = (def_pos, use_pos) {
                if d >= u {
                    return Err(invalid_ssa(
                        IrLocation::inst(use_inst),
                        "use does not follow its definition in program order",
                    ));
                }
            }
        }
        return Ok(());
    }

    if !domtree.dominates(def_block, use_block) {
        return Err(invalid_ssa(
            IrLocation::inst(use_inst),
            "use is not dominated by its definition",
        ));
    }
    Ok(())
}

/// Does `opcode` require its scalar operand(s) to be integer (or pointer)
/// typed? `false` for the float arithmetic family, which instead requires
/// float-typed operands; opcodes outside both families are not constrained
/// here (their shape is checked structurally elsewhere, e.g. by
/// `check_branch_arguments`).
fn int_family(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Iadd
            | Opcode::Isub
            | Opcode::Imul
            | Opcode::Udiv
            | Opcode::Sdiv
            | Opcode::Urem
            | Opcode::Srem
            | Opcode::Band
            | Opcode::Bor
            | Opcode::Bxor
            | Opcode::Ishl
            | Opcode::Ushr
            | Opcode::Sshr
            | Opcode::IaddImm
            | Opcode::IsubImm
            | Opcode::ImulImm
            | Opcode::BandImm
            | Opcode::BorImm
            | Opcode::BxorImm
            | Opcode::IshlImm
            | Opcode::Ineg
            | Opcode::Bnot
            | Opcode::Clz
            | Opcode::Ctz
            | Opcode::Popcnt
    )
}

fn float_family(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv | Opcode::Fneg | Opcode::Fabs | Opcode::Sqrt
    )
}

fn check_operand_kind(inst: Inst, opcode: Opcode, ty: Type) -> Result<(), CodegenError> {
    if int_family(opcode) && !ty.is_int() && ty != Type::Ptr {
        return Err(invalid_ssa(
            IrLocation::inst(inst),
            "integer operation applied to a non-integer, non-pointer operand",
        ));
    }
    if float_family(opcode) && !ty.is_float() {
        return Err(invalid_ssa(
            IrLocation::inst(inst),
            "floating-point operation applied to a non-float operand",
        ));
    }
    Ok(())
}

fn check_result_type(func: &Function, inst: Inst, expected: Type) -> Result<(), CodegenError> {
    if let Some(&result) = func.dfg.inst_results(inst).first() {
        if func.dfg.value_type(result) != expected {
            return Err(invalid_ssa(
                IrLocation::inst(inst),
                "result type does not match the type its operands determine",
            ));
        }
    }
    Ok(())
}

/// Check that an instruction's operand types agree with its opcode's
/// required kind (integer vs. float), that operands an opcode requires to
/// share a type actually do, and that the instruction's own result (if any)
/// carries that same type. An opcode/shape this check does not recognize is
/// left alone — it is not this pass's job to re-validate instruction shape,
/// only the types flowing through a shape `check_branch_arguments` and the
/// dominance pass already accept as well-formed.
fn check_operand_types(func: &Function, inst: Inst) -> Result<(), CodegenError> {
    match func.dfg.inst_data(inst) {
        InstructionData::Binary { opcode, args } => {
            let lhs = func.dfg.value_type(args[0]);
            let rhs = func.dfg.value_type(args[1]);
            if lhs != rhs {
                return Err(invalid_ssa(IrLocation::inst(inst), "binary operands have different types"));
            }
            check_operand_kind(inst, *opcode, lhs)?;
            check_result_type(func, inst, lhs)?;
        }
        InstructionData::BinaryImm { opcode, arg, .. } => {
            let ty = func.dfg.value_type(*arg);
            check_operand_kind(inst, *opcode, ty)?;
            check_result_type(func, inst, ty)?;
        }
        InstructionData::Unary { opcode: Opcode::SextendTo(to), arg }
        | InstructionData::Unary { opcode: Opcode::UextendTo(to), arg } => {
            let from = func.dfg.value_type(*arg);
            if !from.is_int() || !to.is_int() || to.bits() <= from.bits() {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    "extend must go from a narrower to a wider integer type",
                ));
            }
            check_result_type(func, inst, *to)?;
        }
        InstructionData::Unary { opcode: Opcode::IreduceTo(to), arg } => {
            let from = func.dfg.value_type(*arg);
            if !from.is_int() || !to.is_int() || to.bits() >= from.bits() {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    "ireduce must go from a wider to a narrower integer type",
                ));
            }
            check_result_type(func, inst, *to)?;
        }
        InstructionData::Unary { opcode: Opcode::Bitcast(to), arg } => {
            let from = func.dfg.value_type(*arg);
            if from.bits() != to.bits() {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    "bitcast source and target types must have equal bit width",
                ));
            }
            check_result_type(func, inst, *to)?;
        }
        InstructionData::Unary { opcode, arg } => {
            let ty = func.dfg.value_type(*arg);
            check_operand_kind(inst, *opcode, ty)?;
            check_result_type(func, inst, ty)?;
        }
        InstructionData::IntCompare { args, .. } => {
            let lhs = func.dfg.value_type(args[0]);
            let rhs = func.dfg.value_type(args[1]);
            if lhs != rhs {
                return Err(invalid_ssa(IrLocation::inst(inst), "icmp operands have different types"));
            }
            if !lhs.is_int() && lhs != Type::Ptr {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    "icmp operands must be integers or pointers",
                ));
            }
        }
        InstructionData::FloatCompare { args, .. } => {
            let lhs = func.dfg.value_type(args[0]);
            let rhs = func.dfg.value_type(args[1]);
            if lhs != rhs {
                return Err(invalid_ssa(IrLocation::inst(inst), "fcmp operands have different types"));
            }
            if !lhs.is_float() {
                return Err(invalid_ssa(IrLocation::inst(inst), "fcmp operands must be floats"));
            }
        }
        InstructionData::Load { arg, .. } => {
            if func.dfg.value_type(*arg) != Type::Ptr {
                return Err(invalid_ssa(IrLocation::inst(inst), "load address operand must be a pointer"));
            }
        }
        InstructionData::Store { args, .. } => {
            if func.dfg.value_type(args[1]) != Type::Ptr {
                return Err(invalid_ssa(IrLocation::inst(inst), "store address operand must be a pointer"));
            }
        }
        InstructionData::Ternary { opcode: Opcode::Select, args } => {
            if !func.dfg.value_type(args[0]).is_int() {
                return Err(invalid_ssa(IrLocation::inst(inst), "select condition must be an integer"));
            }
            let a = func.dfg.value_type(args[1]);
            let b = func.dfg.value_type(args[2]);
            if a != b {
                return Err(invalid_ssa(IrLocation::inst(inst), "select arms have different types"));
            }
            check_result_type(func, inst, a)?;
        }
        InstructionData::Ternary { opcode: Opcode::Fma, args } => {
            let tys = [
                func.dfg.value_type(args[0]),
                func.dfg.value_type(args[1]),
                func.dfg.value_type(args[2]),
            ];
            if !tys.iter().all(|t| t.is_float()) || tys[0] != tys[1] || tys[1] != tys[2] {
                return Err(invalid_ssa(
                    IrLocation::inst(inst),
                    "fma operands must be floats of the same type",
                ));
            }
            check_result_type(func, inst, tys[0])?;
        }
        _ => {}
    }
    Ok(())
}

/// A function's stack-slot accesses must stay within the declared slot's
/// bounds; called opportunistically by front ends that build aggregate
/// loads/stores, since the core IR carries no direct "aggregate access"
/// instruction of its own in this core (loads/stores at an explicit offset
/// against a typed base cover the same ground).
pub fn check_aggregate_bounds(func: &Function) -> Result<(), CodegenError> {
    for block in func.layout.blocks() {
        for &inst in func.layout.block_insts(block) {
            match func.dfg.inst_data(inst) {
                InstructionData::StackLoad { slot, offset } => {
                    let ty = func.dfg.inst_results(inst)[0];
                    let ty = func.dfg.value_type(ty);
                    check_slot_bounds(func, inst, *slot, *offset, ty.bytes())?;
                }
                InstructionData::StackStore { arg, slot, offset } => {
                    let ty = func.dfg.value_type(*arg);
                    check_slot_bounds(func, inst, *slot, *offset, ty.bytes())?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn check_slot_bounds(
    func: &Function,
    inst: Inst,
    slot: crate::ir::StackSlot,
    offset: crate::ir::immediates::Offset32,
    access_bytes: u32,
) -> Result<(), CodegenError> {
    let data = &func.dfg.stack_slots.slots[slot];
    let offset = offset.bytes();
    if offset < 0 || (offset as u64) + (access_bytes as u64) > data.size as u64 {
        return Err(invalid_ssa(
            IrLocation::inst(inst),
            "stack-slot access falls outside the slot's declared bounds",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::immediates::Offset32;
    use crate::ir::stackslot::StackSlotData;
    use crate::ir::{CallConv, ExternalName, Opcode, Signature, Type};
    use smallvec::smallvec;

    fn return_function() -> Function {
        let sig = Signature::new(CallConv::SystemV);
        Function::new(ExternalName::User(0), sig)
    }

    #[test]
    fn rejects_stack_load_past_slot_end() {
        let mut func = return_function();
        let block0 = func.make_block();
        let slot = func.dfg.stack_slots.create(StackSlotData::new(4, 2));
        let load = func
            .dfg
            .make_inst(InstructionData::StackLoad { slot, offset: Offset32::new(0) });
        func.dfg.append_inst_result(load, Type::Int(64));
        func.layout.append_inst(load, block0);
        let ret = func.dfg.make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![] });
        func.layout.append_inst(ret, block0);

        let err = verify_function(&func).expect_err("8-byte load into a 4-byte slot must fail");
        assert!(matches!(err, CodegenError::InvalidSsa { .. }));
    }

    #[test]
    fn accepts_stack_store_within_slot_bounds() {
        let mut func = return_function();
        let block0 = func.make_block();
        let slot = func.dfg.stack_slots.create(StackSlotData::new(8, 3));
        let imm = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: crate::ir::immediates::Imm64::new(0) });
        let imm_val = func.dfg.append_inst_result(imm, Type::Int(32));
        func.layout.append_inst(imm, block0);
        let store = func.dfg.make_inst(InstructionData::StackStore {
            arg: imm_val,
            slot,
            offset: Offset32::new(4),
        });
        func.layout.append_inst(store, block0);
        let ret = func.dfg.make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![] });
        func.layout.append_inst(ret, block0);

        assert!(verify_function(&func).is_ok());
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut func = return_function();
        let block0 = func.make_block();
        let imm = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: crate::ir::immediates::Imm64::new(0) });
        func.dfg.append_inst_result(imm, Type::Int(32));
        func.layout.append_inst(imm, block0);

        let err = verify_function(&func).expect_err("block with no terminator must fail");
        assert!(matches!(err, CodegenError::InvalidSsa { .. }));
    }

    #[test]
    fn rejects_binary_operands_of_different_types() {
        let mut func = return_function();
        let block0 = func.make_block();
        let imm32 = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: crate::ir::immediates::Imm64::new(1) });
        let v32 = func.dfg.append_inst_result(imm32, Type::Int(32));
        func.layout.append_inst(imm32, block0);
        let imm64 = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: crate::ir::immediates::Imm64::new(2) });
        let v64 = func.dfg.append_inst_result(imm64, Type::Int(64));
        func.layout.append_inst(imm64, block0);

        let add = func
            .dfg
            .make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [v32, v64] });
        func.dfg.append_inst_result(add, Type::Int(64));
        func.layout.append_inst(add, block0);
        let ret = func.dfg.make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![] });
        func.layout.append_inst(ret, block0);

        let err = verify_function(&func).expect_err("iadd mixing i32/i64 operands must fail");
        assert!(matches!(err, CodegenError::InvalidSsa { .. }));
    }

    #[test]
    fn rejects_float_op_on_integer_operands() {
        let mut func = return_function();
        let block0 = func.make_block();
        let imm_a = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: crate::ir::immediates::Imm64::new(1) });
        let a = func.dfg.append_inst_result(imm_a, Type::Int(32));
        func.layout.append_inst(imm_a, block0);
        let imm_b = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: crate::ir::immediates::Imm64::new(2) });
        let b = func.dfg.append_inst_result(imm_b, Type::Int(32));
        func.layout.append_inst(imm_b, block0);

        let fadd = func
            .dfg
            .make_inst(InstructionData::Binary { opcode: Opcode::Fadd, args: [a, b] });
        func.dfg.append_inst_result(fadd, Type::Int(32));
        func.layout.append_inst(fadd, block0);
        let ret = func.dfg.make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![] });
        func.layout.append_inst(ret, block0);

        let err = verify_function(&func).expect_err("fadd applied to integer operands must fail");
        assert!(matches!(err, CodegenError::InvalidSsa { .. }));
    }

    #[test]
    fn rejects_branch_argument_arity_mismatch() {
        let mut func = return_function();
        let block0 = func.make_block();
        let block1 = func.make_block();
        func.append_block_param(block1, Type::Int(32));

        let jump = func
            .dfg
            .make_inst(InstructionData::Jump { destination: block1, args: smallvec![] });
        func.layout.append_inst(jump, block0);
        let ret = func.dfg.make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![] });
        func.layout.append_inst(ret, block1);

        let err = verify_function(&func).expect_err("jump missing a required block argument must fail");
        assert!(matches!(err, CodegenError::InvalidSsa { .. }));
    }
}
