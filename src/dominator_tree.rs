//! Dominator tree computation over the IR control flow graph.
//!
//! Uses the Cooper/Harvey/Kennedy iterative "engineering a compiler"
//! algorithm: compute reverse postorder, then iterate immediate-dominator
//! assignment to a fixpoint by intersecting each block's predecessors'
//! already-resolved dominators. Simpler to get right than a Lengauer-Tarjan
//! implementation and fast enough at function-sized graphs.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function};
use hoist_entity::SecondaryMap;
use rustc_hash::FxHashMap;

/// The dominator tree of one function's control flow graph.
#[derive(Default)]
pub struct DominatorTree {
    idom: SecondaryMap<Block, hoist_entity::PackedOption<Block>>,
    rpo: Vec<Block>,
    rpo_number: FxHashMap<Block, u32>,
    valid: bool,
}

impl DominatorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// (Re)compute the dominator tree for `func` using `cfg` (expected to
    /// already be up to date).
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        self.idom = SecondaryMap::new();
        self.rpo.clear();
        self.rpo_number.clear();

        let Some(entry) = func.entry_block() else {
            self.valid = true;
            return;
        };

        self.rpo = func.layout.reverse_postorder(entry, |b| cfg.successors(b).to_vec());
        for (i, &b) in self.rpo.iter().enumerate() {
            self.rpo_number.insert(b, i as u32);
        }

        self.idom[entry] = Some(entry).into();

        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.rpo.iter().skip(1) {
                let mut new_idom: Option<Block> = None;
                for pred in cfg.pred_iter(block) {
                    if !self.rpo_number.contains_key(&pred.block) {
                        continue; // unreachable predecessor
                    }
                    if self.idom[pred.block].expand().is_none() && pred.block != entry {
                        continue; // not yet processed this round
                    }
                    new_idom = Some(match new_idom {
                        None => pred.block,
                        Some(cur) => self.intersect(cur, pred.block),
                    });
                }
                if let Some(computed) = new_idom {
                    if self.idom[block].expand() != Some(computed) {
                        self.idom[block] = Some(computed).into();
                        changed = true;
                    }
                }
            }
        }
        self.valid = true;
    }

    fn intersect(&self, mut a: Block, mut b: Block) -> Block {
        loop {
            match (self.rpo_number.get(&a), self.rpo_number.get(&b)) {
                (Some(&na), Some(&nb)) => {
                    if na == nb {
                        return a;
                    }
                    if na > nb {
                        a = self.idom[a].expand().unwrap();
                    } else {
                        b = self.idom[b].expand().unwrap();
                    }
                }
                _ => unreachable!("intersect over unreachable block"),
            }
        }
    }

    /// The immediate dominator of `block`, or `None` for the entry block.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom[block].expand().filter(|&d| d != block)
    }

    /// Does `a` dominate `b` (reflexively: every block dominates itself)?
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom(cur) {
                Some(next) => cur = next,
                None => return cur == a,
            }
        }
    }

    /// Blocks in reverse postorder, the order the lowering engine and
    /// liveness dataflow both want to visit them in.
    pub fn cfg_postorder(&self) -> &[Block] {
        &self.rpo
    }
}
