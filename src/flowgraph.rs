//! The IR-level control flow graph: successors and predecessors of each
//! block, computed from the terminator of every block in the layout.
//!
//! Successors are the blocks a terminator can transfer control to;
//! predecessors are the `(block, inst)` pairs whose terminator can transfer
//! control into a given block. Predecessors are derived from successors by
//! inversion rather than tracked independently, so
//! `compute` is the only place the relation is built.

use crate::ir::{Block, Function, Inst};
use hoist_entity::SecondaryMap;

/// A predecessor edge: the block whose terminator (`inst`) transfers
/// control into the node this `BlockPredecessor` is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPredecessor {
    pub block: Block,
    pub inst: Inst,
}

impl BlockPredecessor {
    pub fn new(block: Block, inst: Inst) -> Self {
        Self { block, inst }
    }
}

#[derive(Clone, Default)]
struct CfgNode {
    predecessors: Vec<BlockPredecessor>,
    successors: Vec<Block>,
}

/// The control flow graph of an IR function.
#[derive(Default)]
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CfgNode>,
    valid: bool,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute predecessors and successors for every block from scratch.
    pub fn compute(&mut self, func: &Function) {
        self.clear();
        for block in func.layout.blocks() {
            if let Some(term) = func.layout.last_inst(block) {
                let data = func.dfg.inst_data(term);
                let mut dests = data.branch_destinations();
                if let crate::ir::InstructionData::BranchTable { table, .. } = data {
                    dests.extend(func.dfg.jump_tables[*table].iter().copied());
                }
                for dest in dests {
                    self.data[block].successors.push(dest);
                    self.data[dest]
                        .predecessors
                        .push(BlockPredecessor::new(block, term));
                }
            }
        }
        self.valid = true;
    }

    fn clear(&mut self) {
        self.data = SecondaryMap::new();
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn succ_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.data[block].successors.iter().copied()
    }

    pub fn pred_iter(&self, block: Block) -> impl Iterator<Item = BlockPredecessor> + '_ {
        self.data[block].predecessors.iter().copied()
    }

    pub fn successors(&self, block: Block) -> &[Block] {
        &self.data[block].successors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::immediates::Imm64;
    use crate::ir::{CallConv, ExternalName, InstructionData, Opcode, Signature, Type};
    use smallvec::smallvec;

    /// A diamond CFG (entry branches to `then`/`else`, both join at `exit`):
    /// recomputing the graph from scratch twice yields the identical
    /// predecessor order each time (spec §8's predecessor rebuild
    /// idempotence law).
    #[test]
    fn recompute_is_idempotent() {
        let sig = Signature::new(CallConv::SystemV);
        let mut func = Function::new(ExternalName::User(0), sig);

        let entry = func.make_block();
        let then_blk = func.make_block();
        let else_blk = func.make_block();
        let exit = func.make_block();

        let cond = func.dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: Imm64::new(1),
        });
        let cond_val = func.dfg.append_inst_result(cond, Type::Int(32));
        func.layout.append_inst(cond, entry);
        let brif = func.dfg.make_inst(InstructionData::Brif {
            arg: cond_val,
            then_block: then_blk,
            then_args: smallvec![],
            else_block: else_blk,
            else_args: smallvec![],
        });
        func.layout.append_inst(brif, entry);

        let jump_then = func
            .dfg
            .make_inst(InstructionData::Jump { destination: exit, args: smallvec![] });
        func.layout.append_inst(jump_then, then_blk);
        let jump_else = func
            .dfg
            .make_inst(InstructionData::Jump { destination: exit, args: smallvec![] });
        func.layout.append_inst(jump_else, else_blk);

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&func);
        let first: alloc::vec::Vec<_> = cfg.pred_iter(exit).collect();
        assert_eq!(first.len(), 2);

        cfg.compute(&func);
        let second: alloc::vec::Vec<_> = cfg.pred_iter(exit).collect();
        assert_eq!(first, second);

        assert_eq!(cfg.successors(entry), &[then_blk, else_blk]);
    }
}
