//! The dataflow graph: instructions, values, block parameters, and the
//! preamble tables (signatures, external functions, jump tables, constants,
//! global values) a function's instructions refer into.
//!
//! `DataFlowGraph` is deliberately layout-free:
//! it knows which instruction produced which value and which block a
//! parameter belongs to, but not the order blocks or instructions appear
//! in — that's `Layout`'s job, so a pass can reorder without touching SSA.

use crate::ir::constant::ConstantPool;
use crate::ir::entities::{Block, FuncRef, GlobalValue, Inst, JumpTable, SigRef, StackSlot, Value, ValueDef};
use crate::ir::extfunc::{ExtFuncData, Signature};
use crate::ir::globalvalue::GlobalValueData;
use crate::ir::instructions::InstructionData;
use crate::ir::jumptable::JumpTableData;
use crate::ir::types::Type;
use hoist_entity::{EntityRef, PrimaryMap};
use smallvec::SmallVec;

#[derive(Clone, Debug)]
struct ValueData {
    ty: Type,
    def: ValueDef,
}

#[derive(Clone, Debug, Default)]
struct BlockData {
    params: SmallVec<[Value; 4]>,
}

/// The dataflow graph owned by a [`Function`](super::Function).
#[derive(Clone, Debug, Default)]
pub struct DataFlowGraph {
    insts: PrimaryMap<Inst, InstructionData>,
    results: PrimaryMap<Inst, SmallVec<[Value; 2]>>,
    values: PrimaryMap<Value, ValueData>,
    blocks: PrimaryMap<Block, BlockData>,
    pub signatures: PrimaryMap<SigRef, Signature>,
    pub ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,
    pub jump_tables: PrimaryMap<JumpTable, JumpTableData>,
    pub global_values: PrimaryMap<GlobalValue, GlobalValueData>,
    pub constants: ConstantPool,
    pub stack_slots: crate::ir::stackslot::StackSlots,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // --- blocks -----------------------------------------------------

    /// Create a new, empty block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    /// Append a new parameter of type `ty` to `block`, returning its value.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let param_index = self.blocks[block].params.len();
        let value = self.values.push(ValueData {
            ty,
            def: ValueDef::Param(block, param_index),
        });
        self.blocks[block].params.push(value);
        value
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        &self.blocks[block].params
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    // --- instructions -------------------------------------------------

    /// Record a new instruction's data, returning its reference. The
    /// instruction is not yet part of any block's layout — `append_inst`
    /// (on `Layout`) does that.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.insts.push(data);
        let results = self.results.push(SmallVec::new());
        debug_assert_eq!(inst.index(), results.index());
        inst
    }

    /// Append a new result of type `ty` to `inst`, returning its value.
    pub fn append_inst_result(&mut self, inst: Inst, ty: Type) -> Value {
        let result_index = self.results[inst].len();
        let value = self.values.push(ValueData {
            ty,
            def: ValueDef::Result(inst, result_index),
        });
        self.results[inst].push(value);
        value
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        &self.results[inst]
    }

    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst][0]
    }

    pub fn inst_data(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    pub fn inst_data_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    pub fn replace_inst(&mut self, inst: Inst, data: InstructionData) {
        self.insts[inst] = data;
    }

    // --- values ---------------------------------------------------------

    pub fn value_type(&self, value: Value) -> Type {
        self.values[value].ty
    }

    pub fn value_def(&self, value: Value) -> ValueDef {
        self.values[value].def
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.values.keys()
    }

    pub fn insts(&self) -> impl Iterator<Item = Inst> + '_ {
        self.insts.keys()
    }

    /// Create a declared stack slot.
    pub fn create_stack_slot(&mut self, data: crate::ir::stackslot::StackSlotData) -> StackSlot {
        self.stack_slots.create(data)
    }
}
