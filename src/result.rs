//! The error taxonomy: every fallible core operation returns one of
//! these kinds, plus the IR location that caused it where one is
//! meaningful. No operation recovers from a `CodegenError` except the two
//! documented local fallbacks — the lowering engine trying the next-lower
//! priority pattern, and the machine buffer inserting a veneer.

use crate::ir::{Block, Inst, Value};
use thiserror::Error;

/// A location within a function's IR, attached to an error so a caller can
/// report which block/instruction/value triggered it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IrLocation {
    pub block: Option<Block>,
    pub inst: Option<Inst>,
    pub value: Option<Value>,
}

impl IrLocation {
    pub fn inst(inst: Inst) -> Self {
        Self {
            inst: Some(inst),
            ..Default::default()
        }
    }

    pub fn block(block: Block) -> Self {
        Self {
            block: Some(block),
            ..Default::default()
        }
    }
}

/// The full error taxonomy a compilation can fail with. On any error
/// the caller receives this value and no partial `CompiledCode`; all
/// owned resources are released when the compilation's `Context` is
/// dropped.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("invalid SSA at {location:?}: {detail}")]
    InvalidSsa {
        location: IrLocation,
        detail: alloc::string::String,
    },

    #[error("no lowering pattern matched opcode {opcode:?} at {location:?}")]
    UnhandledInstruction {
        opcode: crate::ir::Opcode,
        location: IrLocation,
    },

    #[error("backend cannot represent type {ty:?}")]
    UnsupportedType { ty: crate::ir::Type },

    #[error("ABI cannot resolve calling convention {call_conv} for this target")]
    UnsupportedConvention { call_conv: crate::ir::CallConv },

    #[error("signature has more return values than the convention's return registers can hold")]
    TooManyReturns,

    #[error("register allocation hit an impossible fixed-register constraint at {location:?}")]
    ImpossibleConstraint { location: IrLocation },

    #[error("fix-up target out of range even after veneer insertion")]
    LabelOutOfRange,

    #[error("internal invariant violated: {0}")]
    InternalInvariant(alloc::string::String),
}

/// The result type every fallible core operation returns.
pub type CodegenResult<T> = Result<T, CodegenError>;
