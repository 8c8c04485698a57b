//! The target-independent half of code generation: the lowered
//! CFG representation, the lowering engine driver, the ABI resolver, and
//! the machine code buffer. A target backend (`crate::isa`) plugs in its
//! own instruction enum and pattern rules through the `MachInst` and
//! `LowerBackend` traits declared here.

pub mod abi;
pub mod buffer;
pub mod lower;
pub mod vcode;

pub use abi::{ABIArg, ABIArgSlot, ABISignature, AbiError};
pub use buffer::{CallSite, MachBuffer, MachLabel, RelocKind, Relocation, TrapSite};
pub use lower::{LowerBackend, LowerCtx, UseState};
pub use vcode::{InsnIndex, VCode, VCodeBlock, VCodeBuilder};

use crate::regs::Reg;

/// The artifact one function's compilation produces: relocatable code
/// bytes plus everything a caller needs to place and link them.
#[derive(Clone, Debug)]
pub struct CompiledCode {
    pub code: alloc::vec::Vec<u8>,
    pub relocs: alloc::vec::Vec<buffer::Relocation>,
    pub traps: alloc::vec::Vec<buffer::TrapSite>,
    pub frame_size: u32,
    /// System V CIE+FDE bytes for this function, present when the `unwind`
    /// feature is enabled and the target emits DWARF unwind info.
    pub unwind: Option<alloc::vec::Vec<u8>>,
    /// Code offsets where the active source location changed, in
    /// ascending offset order. Empty when the function carried no source
    /// locations at all (the common case for code whose front end never
    /// attached any). Not a full per-instruction map: only transitions are
    /// recorded, since consecutive instructions usually share one location.
    pub source_map: alloc::vec::Vec<(crate::ir::SourceLoc, u32)>,
}

/// The capability every target's machine-instruction type must provide so
/// the target-independent register allocator and emission loop can drive
/// it without knowing its concrete shape.
pub trait MachInst: Clone + core::fmt::Debug {
    /// Visit every register this instruction reads or writes, in a fixed
    /// order the allocator and this method agree on, tagging each with its
    /// use kind and location constraint so the allocator can rewrite VReg
    /// operands in place.
    fn get_operands(&self, collector: &mut dyn FnMut(Reg, OperandKind, OperandConstraint));

    /// Rewrite this instruction's registers using `f`, called once per
    /// operand in the same order `get_operands` visited them.
    fn map_regs(&mut self, f: &mut dyn FnMut(Reg) -> Reg);

    /// Successor blocks, for instructions that terminate a VCode block.
    fn is_term(&self) -> bool;

    /// A plain register-to-register move, used by the allocator to
    /// materialize spill reloads, callee-save restores, and edge moves.
    fn gen_move(dst: Reg, src: Reg, class: crate::regs::RegClass) -> Self;

    /// A store of `reg` to the stack slot at `slot`, used for spills.
    fn gen_spill(reg: Reg, slot: crate::regs::SpillSlot, class: crate::regs::RegClass) -> Self;

    /// A load of the stack slot at `slot` into `reg`, used for reloads.
    fn gen_reload(reg: Reg, slot: crate::regs::SpillSlot, class: crate::regs::RegClass) -> Self;
}

/// How an instruction uses one of its register operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    Use,
    Def,
    Mod,
}

/// Register-class/position constraint on one operand, read by the
/// allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandConstraint {
    Any,
    Fixed(crate::regs::PReg),
    Reuse(u16),
}
