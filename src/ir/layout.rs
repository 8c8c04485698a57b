//! Function layout: block order and per-block instruction order, stored
//! independently of the dataflow graph so a pass can reorder blocks or
//! instructions without touching SSA def/use relationships.

use crate::ir::entities::{Block, Inst};
use hoist_entity::{PackedOption, SecondaryMap};

#[derive(Clone, Debug, Default)]
struct BlockNode {
    insts: Vec<Inst>,
}

/// The ordered placement of blocks and instructions. `Layout` never appears
/// without a matching `DataFlowGraph`, but the two are independent: this
/// type has no notion of operands or results, only "what comes after what".
#[derive(Clone, Debug, Default)]
pub struct Layout {
    block_order: Vec<Block>,
    blocks: SecondaryMap<Block, BlockNode>,
    inst_block: SecondaryMap<Inst, PackedOption<Block>>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `block` to the end of the layout order.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(!self.is_block_inserted(block));
        self.block_order.push(block);
        // Touch the secondary map so `blocks[block]` is valid even before
        // any instruction is appended.
        let _ = &self.blocks[block];
    }

    pub fn is_block_inserted(&self, block: Block) -> bool {
        self.block_order.contains(&block)
    }

    /// Append `inst` to the end of `block`'s instruction list.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].insts.push(inst);
        self.inst_block[inst] = Some(block).into();
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.block_order.iter().copied()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_order.len()
    }

    /// Instructions of `block` in layout order.
    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block].insts
    }

    /// The block `inst` is placed in, if laid out.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_block[inst].expand()
    }

    /// The last instruction of `block`, i.e. its terminator once the
    /// function has been built correctly.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].insts.last().copied()
    }

    /// Blocks in reverse postorder of `successors`, used by the lowering
    /// engine so a block's successors are always
    /// assigned labels before it is lowered.
    pub fn reverse_postorder(&self, entry: Block, successors: impl Fn(Block) -> Vec<Block>) -> Vec<Block> {
        let mut visited = hoist_entity::EntitySet::new();
        let mut postorder = Vec::with_capacity(self.block_order.len());
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);
        while let Some((block, next_succ)) = stack.pop() {
            let succs = successors(block);
            if next_succ < succs.len() {
                stack.push((block, next_succ + 1));
                let s = succs[next_succ];
                if visited.insert(s) {
                    stack.push((s, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        postorder
    }
}
