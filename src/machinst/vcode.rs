//! VCode: the lowered CFG — basic blocks of machine instructions over
//! virtual registers, built incrementally by a `VCodeBuilder` and consumed
//! by the register allocator and emission loop.

use crate::ir::SourceLoc;
use crate::machinst::MachInst;
use crate::regs::Reg;
use smallvec::SmallVec;

/// Index into a `VCode`'s shared instruction vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct InsnIndex(pub u32);

/// Index into a `VCode`'s block vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VCodeBlock(pub u32);

struct BlockInfo {
    start: u32,
    end: u32,
    params: SmallVec<[Reg; 4]>,
    succs: SmallVec<[VCodeBlock; 2]>,
    preds: Vec<VCodeBlock>,
}

/// A function's lowered form: one flat instruction vector sliced into
/// blocks, plus the successor/predecessor graph over those blocks.
pub struct VCode<I: MachInst> {
    insts: Vec<I>,
    /// One source location per entry of `insts`, in lockstep. Default
    /// (unknown) for every instruction the lowering engine synthesizes
    /// without a direct IR counterpart (ABI moves, spill/reload, prologue).
    srclocs: Vec<SourceLoc>,
    blocks: Vec<BlockInfo>,
    entry: VCodeBlock,
}

impl<I: MachInst> VCode<I> {
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn entry_block(&self) -> VCodeBlock {
        self.entry
    }

    pub fn block_insts(&self, block: VCodeBlock) -> &[I] {
        let info = &self.blocks[block.0 as usize];
        &self.insts[info.start as usize..info.end as usize]
    }

    pub fn block_insts_mut(&mut self, block: VCodeBlock) -> &mut [I] {
        let info = &self.blocks[block.0 as usize];
        let (start, end) = (info.start as usize, info.end as usize);
        &mut self.insts[start..end]
    }

    pub fn block_params(&self, block: VCodeBlock) -> &[Reg] {
        &self.blocks[block.0 as usize].params
    }

    pub fn block_succs(&self, block: VCodeBlock) -> &[VCodeBlock] {
        &self.blocks[block.0 as usize].succs
    }

    pub fn block_preds(&self, block: VCodeBlock) -> &[VCodeBlock] {
        &self.blocks[block.0 as usize].preds
    }

    pub fn blocks(&self) -> impl Iterator<Item = VCodeBlock> + '_ {
        (0..self.blocks.len() as u32).map(VCodeBlock)
    }

    /// All instructions in flat emission order, for the emission loop.
    pub fn insts(&self) -> &[I] {
        &self.insts
    }

    pub fn insts_mut(&mut self) -> &mut [I] {
        &mut self.insts
    }

    /// The source location recorded for each instruction in `block`, in
    /// the same order as `block_insts`.
    pub fn block_srclocs(&self, block: VCodeBlock) -> &[SourceLoc] {
        let info = &self.blocks[block.0 as usize];
        &self.srclocs[info.start as usize..info.end as usize]
    }

    /// The half-open range of `insts()` indices making up `block`, i.e.
    /// `block_insts(block).len() == block_range(block).1 - block_range(block).0`.
    pub fn block_range(&self, block: VCodeBlock) -> (u32, u32) {
        let info = &self.blocks[block.0 as usize];
        (info.start, info.end)
    }

    pub fn inst_block(&self, idx: InsnIndex) -> VCodeBlock {
        let i = idx.0;
        self.blocks
            .iter()
            .position(|b| i >= b.start && i < b.end)
            .map(|p| VCodeBlock(p as u32))
            .expect("instruction index out of range")
    }
}

/// Incremental builder for a `VCode`. Lowering appends blocks in reverse
/// postorder, and within each block appends instructions in reverse
/// program order; `finish()` reverses each block's buffer back
/// into forward order and derives predecessors from the recorded
/// successors.
pub struct VCodeBuilder<I: MachInst> {
    insts: Vec<I>,
    srclocs: Vec<SourceLoc>,
    cur_block_insts: Vec<I>,
    cur_block_srclocs: Vec<SourceLoc>,
    blocks: Vec<BlockInfo>,
    building_backward: bool,
}

impl<I: MachInst> VCodeBuilder<I> {
    pub fn new(backward: bool) -> Self {
        Self {
            insts: Vec::new(),
            srclocs: Vec::new(),
            cur_block_insts: Vec::new(),
            cur_block_srclocs: Vec::new(),
            blocks: Vec::new(),
            building_backward: backward,
        }
    }

    /// Push one machine instruction into the block currently being built,
    /// with no associated source location.
    pub fn push(&mut self, inst: I) {
        self.push_with_loc(inst, SourceLoc::default());
    }

    /// Push one machine instruction, recording the IR source location it
    /// was lowered from (or synthesized at, for allocator/ABI-inserted
    /// instructions that simply carry the location of their neighbor).
    pub fn push_with_loc(&mut self, inst: I, loc: SourceLoc) {
        self.cur_block_insts.push(inst);
        self.cur_block_srclocs.push(loc);
    }

    /// Close the block under construction, recording its parameter VRegs
    /// and successor list, and start a fresh one.
    pub fn end_block(&mut self, params: &[Reg], succs: &[VCodeBlock]) {
        if self.building_backward {
            self.cur_block_insts.reverse();
            self.cur_block_srclocs.reverse();
        }
        let start = self.insts.len() as u32;
        self.insts.extend(self.cur_block_insts.drain(..));
        self.srclocs.extend(self.cur_block_srclocs.drain(..));
        let end = self.insts.len() as u32;
        self.blocks.push(BlockInfo {
            start,
            end,
            params: SmallVec::from_slice(params),
            succs: SmallVec::from_slice(succs),
            preds: Vec::new(),
        });
    }

    /// Finalize the builder into an immutable `VCode`, computing the
    /// predecessor graph from the recorded successor edges.
    pub fn finish(mut self, entry: VCodeBlock) -> VCode<I> {
        for i in 0..self.blocks.len() {
            let succs = self.blocks[i].succs.clone();
            for s in succs {
                self.blocks[s.0 as usize].preds.push(VCodeBlock(i as u32));
            }
        }
        VCode {
            insts: self.insts,
            srclocs: self.srclocs,
            blocks: self.blocks,
            entry,
        }
    }
}
