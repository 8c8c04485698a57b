//! ARM64 Instruction Set Architecture: the `TargetIsa` glue that drives
//! lowering, register allocation, frame resolution, and emission for one
//! function and assembles the result into a `CompiledCode`.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::stackslot::{StackSlotData, StackSlots};
use crate::ir::{Function, SourceLoc};
use crate::isa::{TargetConfig, TargetIsa};
use crate::machinst::abi::{resolve_signature, ABIArgSlot};
use crate::machinst::buffer::MachBuffer;
use crate::machinst::vcode::{VCode, VCodeBuilder};
use crate::machinst::{CompiledCode, MachInst, OperandKind};
use crate::regalloc::{self, AllocationResult, AllocatorEnv, FrameLayout, RegisterBank};
use crate::regs::{PReg, Reg, RegClass, NUM_REG_CLASSES};
use crate::result::CodegenResult;
use rustc_hash::FxHashMap;

mod abi;
mod emit;
pub mod inst;
mod lower;
pub mod unwind;

use self::inst::regs::{vreg, xreg, FP};
use self::inst::{AMode, Inst};
use self::lower::AArch64Lower;

/// The AArch64 backend: a `TargetConfig` plus the pipeline that turns a
/// verified `Function` into relocatable machine code for it.
pub struct AArch64Backend {
    config: TargetConfig,
}

impl AArch64Backend {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    /// Build the allocator's per-class register banks: every general
    /// register minus FP/LR/SP, the scratch set the fixup passes below
    /// reserve, and (on Apple platforms) X18 — plus, critically, every
    /// register this function's incoming arguments are bound to. Those
    /// must stay out of the free pool for the whole function: the
    /// allocator has no notion of "this physical register is still live
    /// with the caller's value", so handing one to an unrelated VReg
    /// before the entry preamble's argument moves run would clobber it.
    fn allocator_env(&self, abi_args: &[crate::machinst::abi::ABIArg]) -> AllocatorEnv {
        let mut reserved = abi::reserved_registers(self.config.apple);
        for arg in abi_args {
            for slot in &arg.slots {
                if let ABIArgSlot::Reg { reg, .. } = slot {
                    reserved.push(*reg);
                }
            }
        }

        let int_available: alloc::vec::Vec<PReg> =
            (0..29u8).map(xreg).filter(|p| !reserved.contains(p)).collect();
        let float_available: alloc::vec::Vec<PReg> =
            (0..32u8).map(vreg).filter(|p| !reserved.contains(p)).collect();

        let banks: [RegisterBank; NUM_REG_CLASSES] = [
            RegisterBank { class: RegClass::Int, available: int_available },
            RegisterBank { class: RegClass::Float, available: float_available },
            RegisterBank { class: RegClass::Vector, available: alloc::vec::Vec::new() },
        ];

        AllocatorEnv { banks, callee_saves: abi::CALLEE_SAVES_STANDARD.to_vec() }
    }
}

impl TargetIsa for AArch64Backend {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn config(&self) -> &TargetConfig {
        &self.config
    }

    fn compile_function(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
    ) -> CodegenResult<CompiledCode> {
        let conv_regs = abi::convention_regs(func.signature.call_conv, self.config.apple)?;
        let abi_sig = resolve_signature(func, &func.signature, &conv_regs)?;

        let backend = AArch64Lower::new(&conv_regs);
        let vcode = crate::machinst::lower::lower_function(func, cfg, domtree, &backend)?;
        let vcode = prepend_entry_preamble(vcode, func, &abi_sig);

        // Declared local stack slots are re-laid-out at 8-byte granularity,
        // since this core's load/store encoder only emits the scaled
        // unsigned-immediate form (no LDUR/STUR), which requires every
        // displacement it produces to be a multiple of 8.
        let mut stack_slots = StackSlots::default();
        for (_, data) in func.dfg.stack_slots.iter() {
            stack_slots.create(StackSlotData::new(data.size, data.align_log2.max(3)));
        }
        let locals_bytes = align_up(stack_slots.layout_offsets(), 8);

        let env = self.allocator_env(&abi_sig.args);
        let AllocationResult { vcode, frame } = regalloc::allocate(vcode, &env, locals_bytes)?;

        let mut vcode = expand_frame_and_spills(vcode, &frame);
        resolve_amodes(&mut vcode, &frame, &stack_slots);

        let mut buf = MachBuffer::new();
        let block_labels: alloc::vec::Vec<_> =
            (0..vcode.num_blocks()).map(|_| buf.get_label()).collect();
        let mut source_map = alloc::vec::Vec::new();
        let mut last_loc = SourceLoc::default();
        for b in vcode.blocks() {
            buf.bind_label(block_labels[b.0 as usize]);
            for (inst, &loc) in vcode.block_insts(b).iter().zip(vcode.block_srclocs(b)) {
                if !loc.is_default() && loc != last_loc {
                    source_map.push((loc, buf.cur_offset()));
                    last_loc = loc;
                }
                emit::emit_inst(inst, &mut buf, &block_labels);
            }
        }
        let finalized = buf.finalize()?;
        let code_len = finalized.data.len() as u64;

        #[cfg(feature = "unwind")]
        let unwind_info = Some(unwind::unwind_bytes(&frame, code_len, &finalized.call_sites));
        #[cfg(not(feature = "unwind"))]
        let unwind_info = None;

        Ok(CompiledCode {
            code: finalized.data,
            relocs: finalized.relocs,
            traps: finalized.traps,
            frame_size: frame.frame_size,
            unwind: unwind_info,
            source_map,
        })
    }
}

/// Rebuild `vcode` with a preamble prepended to its entry block: a
/// `FrameSetup` marker, followed by one move per incoming scalar argument
/// from its ABI register into the VReg the rest of the function already
/// references as that parameter. Aggregate/multi-slot arguments are left
/// to their first register, matching the block-parameter representation
/// the lowering engine itself already collapses multi-register values to.
///
/// `VCode` has no public mutator for inserting instructions into an
/// already-built block, so this walks every block through the public
/// `VCodeBuilder` API and re-records it verbatim, except for the entry
/// block, which gets the preamble pushed first.
fn prepend_entry_preamble(
    vcode: VCode<Inst>,
    func: &Function,
    abi_sig: &crate::machinst::abi::ABISignature,
) -> VCode<Inst> {
    let entry = vcode.entry_block();
    let entry_params = vcode.block_params(entry).to_vec();

    let mut preamble = alloc::vec![Inst::FrameSetup];
    for ((param_vreg, abi_arg), sig_param) in
        entry_params.iter().zip(abi_sig.args.iter()).zip(func.signature.params.iter())
    {
        if sig_param.value_type.reg_class() == RegClass::Vector {
            continue; // no lowering rule produces vector-class values yet
        }
        if let Some(ABIArgSlot::Reg { reg, .. }) = abi_arg.slots.first() {
            let class = sig_param.value_type.reg_class();
            preamble.push(Inst::gen_move(*param_vreg, Reg::from_physical(*reg), class));
        }
    }

    let mut builder = VCodeBuilder::new(false);
    for b in vcode.blocks() {
        if b == entry {
            for inst in &preamble {
                builder.push(inst.clone());
            }
        }
        for (inst, &loc) in vcode.block_insts(b).iter().zip(vcode.block_srclocs(b)) {
            builder.push_with_loc(inst.clone(), loc);
        }
        builder.end_block(vcode.block_params(b), vcode.block_succs(b));
    }
    builder.finish(entry)
}

/// Expand every `Inst::FrameSetup`/`Inst::FrameDestroy` marker into its
/// concrete prologue/epilogue sequence now that the frame layout is known,
/// and fix up any operand the allocator rewrote to a spill-slot reference:
/// this core's ALU and load/store encodings address only registers, so a
/// spilled operand needs an explicit reload before (and spill after) the
/// instruction that touches it, using one of the three scratch registers
/// reserved out of the allocator's pool for exactly this.
fn expand_frame_and_spills(vcode: VCode<Inst>, frame: &FrameLayout) -> VCode<Inst> {
    let entry = vcode.entry_block();
    let mut builder = VCodeBuilder::new(false);
    for b in vcode.blocks() {
        for (inst, &loc) in vcode.block_insts(b).iter().zip(vcode.block_srclocs(b)) {
            match inst {
                Inst::FrameSetup => {
                    builder_extend(&mut builder, abi::emit_prologue(frame), SourceLoc::default())
                }
                Inst::FrameDestroy => {
                    builder_extend(&mut builder, abi::emit_epilogue(frame), SourceLoc::default())
                }
                other => builder_extend(&mut builder, resolve_spills_one(other.clone()), loc),
            }
        }
        builder.end_block(vcode.block_params(b), vcode.block_succs(b));
    }
    builder.finish(entry)
}

/// `Inst::gen_move` is emitted unconditionally during lowering (ABI-edge
/// moves, φ-resolution, entry-preamble argument moves) before register
/// allocation has decided where anything actually lives; once allocation
/// assigns the same physical register to both sides, the move no longer
/// does anything and would otherwise show up as a dead `mov rX, rX` in the
/// final code.
fn is_redundant_move(inst: &Inst) -> bool {
    match *inst {
        Inst::MovRR { rd, rn, .. } => rd == rn,
        Inst::FMovRR { rd, rn, .. } => rd == rn,
        _ => false,
    }
}

fn builder_extend(builder: &mut VCodeBuilder<Inst>, insts: alloc::vec::Vec<Inst>, loc: SourceLoc) {
    for inst in insts {
        if is_redundant_move(&inst) {
            continue;
        }
        builder.push_with_loc(inst, loc);
    }
}

/// Which register class every operand of `inst` belongs to. Every
/// instruction variant in this set is monomorphic in class (ALU ops are
/// always integer, `Fxxx` ops always float, load/store ops always
/// integer — this core never loads/stores a float/vector register
/// directly), so one class per instruction is enough to pick the right
/// scratch pool.
fn spill_fix_class(inst: &Inst) -> RegClass {
    use Inst::*;
    match inst {
        FAddRR { .. } | FSubRR { .. } | FMulRR { .. } | FDivRR { .. } | FNegRR { .. }
        | FAbsRR { .. } | FSqrtRR { .. } | FCmpRR { .. } | FMovRR { .. } => RegClass::Float,
        _ => RegClass::Int,
    }
}

/// Materialize reload/spill instructions around `inst` for any operand the
/// allocator left as a spill-slot reference, rewriting the instruction's
/// own copy of that operand to the scratch register carrying the reloaded
/// value. An operand used and redefined by the same instruction (`MovK`'s
/// `rd`) gets exactly one reload and one spill, not two of either.
fn resolve_spills_one(mut inst: Inst) -> alloc::vec::Vec<Inst> {
    let mut ops = alloc::vec::Vec::new();
    inst.get_operands(&mut |reg, kind, _constraint| ops.push((reg, kind)));
    if !ops.iter().any(|(r, _)| r.is_spill()) {
        return alloc::vec![inst];
    }

    let class = spill_fix_class(&inst);
    let scratch_pool: &[PReg] =
        if class == RegClass::Int { &abi::SCRATCH_REGS } else { &abi::SCRATCH_FLOAT_REGS };

    let mut assign: FxHashMap<Reg, PReg> = FxHashMap::default();
    let mut needs_reload: alloc::vec::Vec<Reg> = alloc::vec::Vec::new();
    let mut needs_spill: alloc::vec::Vec<Reg> = alloc::vec::Vec::new();
    let mut next = 0usize;

    for &(reg, kind) in &ops {
        if !reg.is_spill() {
            continue;
        }
        assign.entry(reg).or_insert_with(|| {
            let p = scratch_pool[next];
            next += 1;
            p
        });
        match kind {
            OperandKind::Use => {
                if !needs_reload.contains(&reg) {
                    needs_reload.push(reg);
                }
            }
            OperandKind::Def => {
                if !needs_spill.contains(&reg) {
                    needs_spill.push(reg);
                }
            }
            OperandKind::Mod => {
                if !needs_reload.contains(&reg) {
                    needs_reload.push(reg);
                }
                if !needs_spill.contains(&reg) {
                    needs_spill.push(reg);
                }
            }
        }
    }

    inst.map_regs(&mut |r| match assign.get(&r) {
        Some(p) => Reg::from_physical(*p),
        None => r,
    });

    let mut out = alloc::vec::Vec::with_capacity(needs_reload.len() + 1 + needs_spill.len());
    for reg in &needs_reload {
        let slot = reg.as_spill().expect("checked above");
        out.push(Inst::gen_reload(Reg::from_physical(assign[reg]), slot, class));
    }
    out.push(inst);
    for reg in &needs_spill {
        let slot = reg.as_spill().expect("checked above");
        out.push(Inst::gen_spill(Reg::from_physical(assign[reg]), slot, class));
    }
    out
}

/// Resolve every remaining `AMode::SpillSlot`/`AMode::StackSlot` into a
/// `RegOffset` against the frame pointer, now that the frame layout (and
/// hence the base of the spill area and the locals area) is fixed. Layout
/// from FP: `[0, 16)` saved FP/LR, `[16, 16+callee_save_bytes)`
/// callee-saves, then the locals area, then the spill area.
fn resolve_amodes(vcode: &mut VCode<Inst>, frame: &FrameLayout, stack_slots: &StackSlots) {
    let locals_base = 16i32 + frame.callee_save_bytes as i32;
    let spill_base = locals_base + frame.locals_bytes as i32;
    for inst in vcode.insts_mut() {
        inst.map_amodes(&mut |mem| match *mem {
            AMode::StackSlot { slot, offset } => {
                *mem = AMode::RegOffset {
                    base: Reg::from_physical(FP),
                    offset: locals_base + stack_slots.offset(slot) + offset,
                };
            }
            AMode::SpillSlot { slot } => {
                *mem = AMode::RegOffset {
                    base: Reg::from_physical(FP),
                    offset: spill_base + (slot.index() as i32) * 8,
                };
            }
            _ => {}
        });
    }
}

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::ir::immediates::Imm64;
    use crate::ir::stackslot::StackSlotData as IrStackSlotData;
    use crate::ir::{AbiParam, CallConv, ExternalName, InstructionData, Offset32, Opcode, Signature, Type};
    use smallvec::smallvec;
    use target_lexicon::Triple;

    fn target() -> AArch64Backend {
        AArch64Backend::new(TargetConfig {
            triple: Triple::unknown(),
            default_call_conv: CallConv::SystemV,
            features: alloc::vec::Vec::new(),
            apple: false,
        })
    }

    /// Four integer arguments exhaust none of the eight-register AAPCS64
    /// integer argument pool, but exercise the entry preamble moving every
    /// one of them out of its ABI register before the body runs.
    #[test]
    fn compiles_function_with_several_arguments() {
        let mut sig = Signature::new(CallConv::SystemV);
        for _ in 0..4 {
            sig.params.push(AbiParam::new(Type::Int(32)));
        }
        sig.returns.push(AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(0), sig);

        let block0 = func.make_block();
        let a = func.append_block_param(block0, Type::Int(32));
        let b = func.append_block_param(block0, Type::Int(32));
        let c = func.append_block_param(block0, Type::Int(32));
        let d = func.append_block_param(block0, Type::Int(32));

        let add1 =
            func.dfg.make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [a, b] });
        let sum1 = func.dfg.append_inst_result(add1, Type::Int(32));
        func.layout.append_inst(add1, block0);

        let add2 =
            func.dfg.make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [c, d] });
        let sum2 = func.dfg.append_inst_result(add2, Type::Int(32));
        func.layout.append_inst(add2, block0);

        let add3 = func
            .dfg
            .make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [sum1, sum2] });
        let total = func.dfg.append_inst_result(add3, Type::Int(32));
        func.layout.append_inst(add3, block0);

        let ret = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![total] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.frame_size % 16, 0);
        assert!(!compiled.code.is_empty());
    }

    /// A stack-resident local written then read back, exercising
    /// `StackLoad`/`StackStore` lowering and the frame-relative `AMode`
    /// resolution pass together.
    #[test]
    fn compiles_function_with_stack_slot() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(Type::Int(64)));
        sig.returns.push(AbiParam::new(Type::Int(64)));
        let mut func = Function::new(ExternalName::User(1), sig);

        let block0 = func.make_block();
        let a = func.append_block_param(block0, Type::Int(64));
        let slot = func.dfg.stack_slots.create(IrStackSlotData::new(8, 3));

        let store = func.dfg.make_inst(InstructionData::StackStore {
            arg: a,
            slot,
            offset: Offset32::new(0),
        });
        func.layout.append_inst(store, block0);

        let load = func
            .dfg
            .make_inst(InstructionData::StackLoad { slot, offset: Offset32::new(0) });
        let loaded = func.dfg.append_inst_result(load, Type::Int(64));
        func.layout.append_inst(load, block0);

        let ret = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![loaded] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.frame_size % 16, 0);
        assert!(!compiled.code.is_empty());
    }

    /// A function with enough live integer values at once to force the
    /// allocator to spill, exercising the reload/spill fixup pass.
    #[test]
    fn compiles_function_that_spills() {
        let mut sig = Signature::new(CallConv::SystemV);
        for _ in 0..8 {
            sig.params.push(AbiParam::new(Type::Int(64)));
        }
        sig.returns.push(AbiParam::new(Type::Int(64)));
        let mut func = Function::new(ExternalName::User(2), sig);

        let block0 = func.make_block();
        let params: alloc::vec::Vec<_> =
            (0..8).map(|_| func.append_block_param(block0, Type::Int(64))).collect();

        // Keep every one of the eight arguments, plus the constants and
        // cross products below, simultaneously live by folding them all
        // into one final sum at the end rather than reducing pairwise.
        let mut partials = alloc::vec::Vec::new();
        for i in 0..8 {
            let imm = func.dfg.make_inst(InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: Imm64::new(i as i64 + 1),
            });
            let imm_val = func.dfg.append_inst_result(imm, Type::Int(64));
            func.layout.append_inst(imm, block0);

            let mul = func.dfg.make_inst(InstructionData::Binary {
                opcode: Opcode::Imul,
                args: [params[i], imm_val],
            });
            let mul_val = func.dfg.append_inst_result(mul, Type::Int(64));
            func.layout.append_inst(mul, block0);
            partials.push(mul_val);
        }

        let mut acc = partials[0];
        for &p in &partials[1..] {
            let add =
                func.dfg.make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [acc, p] });
            acc = func.dfg.append_inst_result(add, Type::Int(64));
            func.layout.append_inst(add, block0);
        }

        let ret =
            func.dfg.make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![acc] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.frame_size % 16, 0);
        assert!(!compiled.code.is_empty());
    }

    /// A `try_call` whose exception successor follows the normal one in
    /// layout order (S5): exercises exception-table verification, call
    /// lowering without an emitted branch to the landing pad, and LSDA
    /// generation from the recorded call site.
    #[test]
    fn compiles_function_with_try_call() {
        use crate::ir::exception_table::ExceptionTable;

        let callee_sig = Signature::new(CallConv::SystemV);
        let mut sig = Signature::new(CallConv::SystemV);
        sig.returns.push(AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(3), sig);

        let callee_sigref = func.dfg.signatures.push(callee_sig);
        let callee = func.dfg.ext_funcs.push(crate::ir::ExtFuncData {
            name: ExternalName::User(4),
            signature: callee_sigref,
            colocated: true,
        });

        let entry = func.make_block();
        let normal = func.make_block();
        let landing_pad = func.make_block();

        let try_call = func.dfg.make_inst(InstructionData::TryCall {
            func_ref: callee,
            args: smallvec![],
            exception_table: ExceptionTable {
                signature: callee_sigref,
                normal_successor: normal,
                normal_args: alloc::vec::Vec::new(),
                exception_successor: landing_pad,
                exception_args: alloc::vec::Vec::new(),
            },
        });
        func.layout.append_inst(try_call, entry);

        let zero = func.dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: Imm64::new(0),
        });
        let zero_val = func.dfg.append_inst_result(zero, Type::Int(32));
        func.layout.append_inst(zero, normal);
        let ret_normal = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![zero_val] });
        func.layout.append_inst(ret_normal, normal);

        let one = func.dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: Imm64::new(1),
        });
        let one_val = func.dfg.append_inst_result(one, Type::Int(32));
        func.layout.append_inst(one, landing_pad);
        let ret_lp = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![one_val] });
        func.layout.append_inst(ret_lp, landing_pad);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.frame_size % 16, 0);
        // The LSDA is appended after the CIE/FDE eh_frame bytes whenever a
        // try-call is present; a bare CIE+FDE for a tiny frameless-bodied
        // function would not reach this size.
        assert!(compiled.unwind.expect("unwind info present").len() > 40);
    }

    /// `fn ret42() -> i32 { return 42; }` (S2): no stack frame is needed, so
    /// the body is exactly `movz w0, #42; ret` with no prologue/epilogue.
    /// Expected bytes are derived directly from the MOVZ/RET bit layouts
    /// (sf=0, opc=10, imm16=42, hw=0, rd=0 for the first word; the
    /// standard `RET` encoding for the second) rather than copied from
    /// spec §8's S2 literal, whose stated bytes decode to an imm16 of 123,
    /// not 42.
    #[test]
    fn compiles_ret42_to_exact_bytes() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.returns.push(AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(5), sig);

        let block0 = func.make_block();
        let imm = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: Imm64::new(42) });
        let imm_val = func.dfg.append_inst_result(imm, Type::Int(32));
        func.layout.append_inst(imm, block0);
        let ret = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![imm_val] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.frame_size, 0);
        assert_eq!(compiled.code, alloc::vec![0x40, 0x05, 0x80, 0x52, 0xc0, 0x03, 0x5f, 0xd6]);
    }

    /// `fn add(a: i32, b: i32) -> i32 { return a + b; }` (S1 body shape):
    /// a single `add w0, w0, w1`. This backend elides the FP/LR save for a
    /// leaf function with no locals, spills, or callee-saves to preserve
    /// (frame_size 0 rather than S1's illustrative 16), still satisfying
    /// invariant 6's "multiple of 16" requirement; see DESIGN.md.
    #[test]
    fn compiles_add_with_minimal_frame() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(Type::Int(32)));
        sig.params.push(AbiParam::new(Type::Int(32)));
        sig.returns.push(AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(6), sig);

        let block0 = func.make_block();
        let a = func.append_block_param(block0, Type::Int(32));
        let b = func.append_block_param(block0, Type::Int(32));
        let add = func.dfg.make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [a, b] });
        let sum = func.dfg.append_inst_result(add, Type::Int(32));
        func.layout.append_inst(add, block0);
        let ret = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![sum] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.frame_size % 16, 0);
        assert!(!compiled.code.is_empty());
    }

    /// A function whose two `iconst`s carry distinct source locations:
    /// `source_map` must record one transition per location change, in
    /// ascending code-offset order, and stay empty when no instruction
    /// carries one (the common case, exercised by every other test above).
    #[test]
    fn records_source_map_transitions() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.returns.push(AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(7), sig);

        let block0 = func.make_block();
        let imm1 = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: Imm64::new(1) });
        let imm1_val = func.dfg.append_inst_result(imm1, Type::Int(32));
        func.layout.append_inst(imm1, block0);
        func.srclocs.set(imm1, crate::ir::SourceLoc::new(10));

        let imm2 = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: Imm64::new(2) });
        let imm2_val = func.dfg.append_inst_result(imm2, Type::Int(32));
        func.layout.append_inst(imm2, block0);

        let add = func.dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [imm1_val, imm2_val],
        });
        let sum = func.dfg.append_inst_result(add, Type::Int(32));
        func.layout.append_inst(add, block0);
        func.srclocs.set(add, crate::ir::SourceLoc::new(20));

        let ret = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![sum] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert_eq!(compiled.source_map.len(), 2);
        assert_eq!(compiled.source_map[0].0, crate::ir::SourceLoc::new(10));
        assert_eq!(compiled.source_map[1].0, crate::ir::SourceLoc::new(20));
        assert!(compiled.source_map[0].1 < compiled.source_map[1].1);
    }

    /// No instruction carries a source location: `source_map` stays empty.
    #[test]
    fn source_map_empty_without_locations() {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.returns.push(AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(8), sig);
        let block0 = func.make_block();
        let imm = func
            .dfg
            .make_inst(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm: Imm64::new(7) });
        let imm_val = func.dfg.append_inst_result(imm, Type::Int(32));
        func.layout.append_inst(imm, block0);
        let ret = func
            .dfg
            .make_inst(InstructionData::MultiAry { opcode: Opcode::Return, args: smallvec![imm_val] });
        func.layout.append_inst(ret, block0);

        let mut ctx = Context::new(func);
        let compiled = ctx.compile(&target()).expect("compiles");
        assert!(compiled.source_map.is_empty());
    }
}
