//! The top-level IR container: a `Function` owns its dataflow graph,
//! layout, and signature, and is built once and verified.

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::{Block, Inst, Value};
use crate::ir::extfunc::Signature;
use crate::ir::extname::ExternalName;
use crate::ir::instructions::InstructionData;
use crate::ir::layout::Layout;
use crate::ir::sourceloc::SourceLoc;
use crate::ir::types::{AggregateLayout, Type};
use hoist_entity::SecondaryMap;

/// A function: name, signature, dataflow graph, and layout, plus any
/// aggregate type layouts its signature or instructions reference.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: ExternalName,
    pub signature: Signature,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub srclocs: SecondaryMap<Inst, SourceLoc>,
    aggregates: Vec<AggregateLayout>,
}

impl Function {
    pub fn new(name: ExternalName, signature: Signature) -> Self {
        Self {
            name,
            signature,
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            srclocs: SecondaryMap::new(),
            aggregates: Vec::new(),
        }
    }

    /// Register a new aggregate layout, returning the `Type::Aggregate`
    /// referencing it.
    pub fn declare_aggregate(&mut self, layout: AggregateLayout) -> Type {
        let idx = self.aggregates.len() as u32;
        self.aggregates.push(layout);
        Type::Aggregate(idx)
    }

    pub fn aggregate_layout(&self, ty: Type) -> &AggregateLayout {
        match ty {
            Type::Aggregate(idx) => &self.aggregates[idx as usize],
            _ => panic!("not an aggregate type"),
        }
    }

    // --- convenience builders for the dataflow-graph operation list ---

    pub fn make_block(&mut self) -> Block {
        let block = self.dfg.make_block();
        self.layout.append_block(block);
        block
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        self.dfg.append_block_param(block, ty)
    }

    /// Build and append an instruction with no results in one step; callers
    /// needing results call `make_inst`/`append_inst_result` directly so
    /// they can thread the fresh `Value`s into later operands.
    pub fn append_inst(&mut self, data: InstructionData, block: Block) -> Inst {
        let inst = self.dfg.make_inst(data);
        self.layout.append_inst(inst, block);
        inst
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        self.dfg.inst_results(inst)
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        self.dfg.block_params(block)
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.dfg.value_type(value)
    }

    /// The function's entry block: the first block in layout order.
    pub fn entry_block(&self) -> Option<Block> {
        self.layout.blocks().next()
    }
}
