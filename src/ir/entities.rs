//! Entity references used throughout the intermediate representation.
//!
//! Every cross-referenced object in a [`Function`](super::Function) is named
//! by one of the types below: a dense, type-distinguished `u32` index into a
//! [`PrimaryMap`](hoist_entity::PrimaryMap) owned by the function. The
//! types are deliberately not interchangeable — a `Value` cannot be passed
//! where an `Inst` is expected — even though both are newtype wrappers
//! around the same representation.

use core::fmt;
use hoist_entity::entity_impl;

/// A reference to a [basic block](super::Block).
///
/// The order blocks are allocated in is stable but arbitrary; it does not
/// necessarily match layout order (see [`Layout`](super::Layout)).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to an SSA value.
///
/// A `Value` is defined by exactly one of an instruction result or a block
/// parameter — never both, and never zero. See [`ValueDef`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// A reference to an instruction.
///
/// Most instructions also define one or more [`Value`]s (their results);
/// `Inst` itself is only needed to name the instruction as a unit, e.g. to
/// splice it into a [`Layout`](super::Layout) or attach a source location.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A reference to a [stack slot](super::StackSlotData).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A reference to an external [`Signature`](super::Signature), used at
/// indirect call sites where no `FuncRef` names a concrete callee.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A reference to an external function, bundling a `SigRef` with a name.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference to a [jump table](super::JumpTableData).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// A reference to a global value (e.g. a symbol address or a computed
/// base-plus-offset address used for globals).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalValue(u32);
entity_impl!(GlobalValue, "gv");

/// A reference to a pooled constant (the bytes of a vector or large
/// immediate too wide to fit inline in an instruction).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant(u32);
entity_impl!(Constant, "const");

/// What defines a [`Value`]: either the `n`th result of an instruction or
/// the `n`th parameter of a block. This is the SSA invariant made explicit —
/// every value traces back to exactly one of these two origins.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueDef {
    /// Defined as the `num`th result of `Inst`.
    Result(Inst, usize),
    /// Defined as the `num`th parameter (block argument) of `Block`.
    Param(Block, usize),
}

impl ValueDef {
    /// The defining instruction, if this value is an instruction result.
    pub fn result_inst(&self) -> Option<Inst> {
        match *self {
            ValueDef::Result(inst, _) => Some(inst),
            ValueDef::Param(..) => None,
        }
    }

    /// The owning block, if this value is a block parameter.
    pub fn param_block(&self) -> Option<Block> {
        match *self {
            ValueDef::Param(block, _) => Some(block),
            ValueDef::Result(..) => None,
        }
    }
}

impl fmt::Display for ValueDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValueDef::Result(inst, n) => write!(f, "{inst}.{n}"),
            ValueDef::Param(block, n) => write!(f, "{block}.{n}"),
        }
    }
}
