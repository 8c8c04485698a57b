//! The lowering engine: a target-independent driver that walks a
//! verified `Function` in reverse postorder, asks a `LowerBackend` to
//! translate each instruction, and assembles the result into a `VCode`.
//!
//! The driver owns use-counting, the IR-value-to-VReg map, and block
//! traversal order; the backend owns pattern matching and encoding choice.
//! This split is the one place a trait belongs in this pipeline.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function, Inst, Opcode, SourceLoc, Value};
use crate::machinst::vcode::{VCodeBlock, VCodeBuilder};
use crate::machinst::MachInst;
use crate::regs::{Reg, RegClass, ValueRegs, VReg};
use crate::result::{CodegenError, CodegenResult, IrLocation};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[cfg(feature = "trace-log")]
use log::trace;
#[cfg(not(feature = "trace-log"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// How many times a Value is used by other instructions still live at
/// lowering time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UseState {
    Unused,
    Once,
    Multiple,
}

/// Per-target lowering logic, dispatched once per IR instruction in
/// reverse program order within a reverse-postorder block walk.
///
/// A backend inspects `ctx.data(inst)`, optionally recurses into a
/// single-use producer via `ctx.use_state`/`ctx.producer`, emits zero or
/// more machine instructions through `ctx.emit`, and returns the
/// `ValueRegs` holding the instruction's results (already pre-allocated
/// by the driver — the backend records which VRegs it actually wrote, or
/// simply accepts the pre-allocated ones).
pub trait LowerBackend {
    type Inst: MachInst;

    /// Lower one non-terminator instruction. Returning `Ok(false)` means
    /// "no rule matched, try nothing else" — the driver turns this into
    /// `UnhandledInstruction`. A backend wanting priority fallback between
    /// its own rules handles that internally; the driver just needs a
    /// final yes/no.
    fn lower(&self, ctx: &mut LowerCtx<'_, Self::Inst>, inst: Inst) -> CodegenResult<()>;

    /// Lower a block terminator, given the VCode blocks its IR successors
    /// were assigned (already known, since blocks lower in reverse
    /// postorder).
    fn lower_branch(
        &self,
        ctx: &mut LowerCtx<'_, Self::Inst>,
        inst: Inst,
        targets: &[VCodeBlock],
    ) -> CodegenResult<()>;
}

/// The driver state a `LowerBackend` interacts with while lowering one
/// function: the value-to-VReg map, use-count table, and the builder for
/// the `VCode` under construction.
pub struct LowerCtx<'f, I: MachInst> {
    pub func: &'f Function,
    value_regs: FxHashMap<Value, ValueRegs>,
    use_state: FxHashMap<Value, UseState>,
    builder: VCodeBuilder<I>,
    next_vreg: FxHashMap<RegClass, u32>,
    cur_block: Option<Block>,
    /// The source location of the IR instruction currently being lowered
    /// (or of the most recent debug sequence point passed over it, in
    /// reverse program order), stamped onto every machine instruction
    /// `emit` pushes.
    cur_srcloc: SourceLoc,
}

impl<'f, I: MachInst> LowerCtx<'f, I> {
    /// Look up (or lazily allocate) the VReg(s) backing an SSA value.
    pub fn value_regs(&mut self, value: Value) -> ValueRegs {
        if let Some(r) = self.value_regs.get(&value) {
            return *r;
        }
        let ty = self.func.dfg.value_type(value);
        let regs = alloc_value_regs(ty, &mut self.next_vreg);
        self.value_regs.insert(value, regs);
        regs
    }

    pub fn use_state(&self, value: Value) -> UseState {
        *self.use_state.get(&value).unwrap_or(&UseState::Unused)
    }

    /// The defining instruction of `value`, if it is pure and used exactly
    /// once — the only case a backend may legally fold into a consumer.
    pub fn producer(&self, value: Value) -> Option<Inst> {
        if self.use_state(value) != UseState::Once {
            return None;
        }
        match self.func.dfg.value_def(value) {
            crate::ir::ValueDef::Result(inst, _) => {
                if self.func.dfg.inst_data(inst).has_side_effect() {
                    None
                } else {
                    Some(inst)
                }
            }
            crate::ir::ValueDef::Param(..) => None,
        }
    }

    pub fn data(&self, inst: Inst) -> &crate::ir::InstructionData {
        self.func.dfg.inst_data(inst)
    }

    pub fn emit(&mut self, inst: I) {
        self.builder.push_with_loc(inst, self.cur_srcloc);
    }
}

fn alloc_value_regs(ty: crate::ir::Type, next: &mut FxHashMap<RegClass, u32>) -> ValueRegs {
    let n = ty.register_count();
    let class = ty.reg_class();
    let mut regs: SmallVec<[Reg; 4]> = SmallVec::new();
    for _ in 0..n {
        let idx = next.entry(class).or_insert(0);
        let v = VReg::new(class, *idx);
        *idx += 1;
        regs.push(Reg::from_virtual(v));
    }
    ValueRegs::from_slice(&regs)
}

/// Run the lowering engine over `func`, producing a `VCode` of `backend`'s
/// instruction type. `func` must already have passed verification; `cfg`
/// and `domtree` are reused from that pass so traversal order is
/// consistent with the invariants the verifier checked.
pub fn lower_function<B: LowerBackend>(
    func: &Function,
    cfg: &ControlFlowGraph,
    domtree: &DominatorTree,
    backend: &B,
) -> CodegenResult<crate::machinst::vcode::VCode<B::Inst>> {
    let Some(entry) = func.entry_block() else {
        return Err(CodegenError::InternalInvariant("function has no entry block".into()));
    };

    let use_state = compute_use_states(func);

    let mut ctx = LowerCtx {
        func,
        value_regs: FxHashMap::default(),
        use_state,
        builder: VCodeBuilder::new(true),
        next_vreg: FxHashMap::default(),
        cur_block: None,
        cur_srcloc: SourceLoc::default(),
    };

    // Pre-allocate VRegs for block parameters so successor lowering can
    // reference a predecessor's not-yet-lowered parameters.
    for block in func.layout.blocks() {
        for &p in func.dfg.block_params(block) {
            ctx.value_regs(p);
        }
    }

    let rpo = domtree.cfg_postorder().to_vec();
    let block_index: FxHashMap<Block, VCodeBlock> = rpo
        .iter()
        .enumerate()
        .map(|(i, &b)| (b, VCodeBlock(i as u32)))
        .collect();

    for &block in &rpo {
        ctx.cur_block = Some(block);
        let insts = func.layout.block_insts(block);
        let (&term, body) = insts.split_last().expect("verified block is non-empty");

        // Reverse program order within the block.
        for &inst in body.iter().rev() {
            ctx.cur_srcloc = func.srclocs[inst];

            // A sequence point carries no operands or results and has no
            // lowering rule of its own; it exists purely to pin a source
            // location onto whatever machine code the driver emits next
            // (i.e., for the instructions preceding it in program order,
            // since the engine walks each block backward).
            if ctx.data(inst).opcode() == Opcode::SequencePoint {
                trace!("sequence point {inst:?} in {block:?}: {:?}", ctx.cur_srcloc);
                continue;
            }

            let results = ctx.func.dfg.inst_results(inst);
            let dead = !results.is_empty()
                && results.iter().all(|&v| ctx.use_state(v) == UseState::Unused)
                && !ctx.data(inst).has_side_effect();
            if dead {
                trace!("skipping dead instruction {inst:?} in {block:?}");
                continue;
            }
            trace!("lowering {inst:?} in {block:?}");
            backend.lower(&mut ctx, inst).map_err(|e| annotate(e, inst))?;
        }

        ctx.cur_srcloc = func.srclocs[term];
        let targets: SmallVec<[VCodeBlock; 2]> = ctx
            .data(term)
            .branch_destinations()
            .iter()
            .map(|b| block_index[b])
            .collect();
        backend
            .lower_branch(&mut ctx, term, &targets)
            .map_err(|e| annotate(e, term))?;

        let params: SmallVec<[Reg; 4]> = func
            .dfg
            .block_params(block)
            .iter()
            .map(|&v| ctx.value_regs(v).only_reg().unwrap_or_else(|| ctx.value_regs(v).get(0)))
            .collect();
        ctx.builder.end_block(&params, &targets);
    }

    let entry_vblock = block_index[&entry];
    let _ = cfg;
    Ok(ctx.builder.finish(entry_vblock))
}

fn annotate(err: CodegenError, inst: Inst) -> CodegenError {
    match err {
        CodegenError::UnhandledInstruction { opcode, .. } => CodegenError::UnhandledInstruction {
            opcode,
            location: IrLocation::inst(inst),
        },
        other => other,
    }
}

/// For every Value, count how many live instructions consume it.
/// A use inside a dead (unreachable) block does not count, since such
/// blocks are never visited by the driver above.
fn compute_use_states(func: &Function) -> FxHashMap<Value, UseState> {
    let mut counts: FxHashMap<Value, u32> = FxHashMap::default();
    for block in func.layout.blocks() {
        for &inst in func.layout.block_insts(block) {
            for arg in func.dfg.inst_data(inst).arguments() {
                *counts.entry(arg).or_insert(0) += 1;
            }
        }
    }
    counts
        .into_iter()
        .map(|(v, n)| {
            let state = match n {
                0 => UseState::Unused,
                1 => UseState::Once,
                _ => UseState::Multiple,
            };
            (v, state)
        })
        .collect()
}
