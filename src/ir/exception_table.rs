//! Exception tables: the successor pair attached to a `try_call`.

use crate::ir::{Block, SigRef, Value};

/// The two successors of a `try_call`: where control resumes normally, and
/// where it resumes if the callee raised an exception. Invariant 7:
/// both must be live blocks in the CFG, and there is exactly one of each.
#[derive(Clone, Debug)]
pub struct ExceptionTable {
    pub signature: SigRef,
    pub normal_successor: Block,
    pub normal_args: Vec<Value>,
    pub exception_successor: Block,
    /// Arguments passed to the exception successor's block parameters —
    /// typically none, since the landing pad receives control from the
    /// runtime unwinder rather than from a register-passing branch.
    pub exception_args: Vec<Value>,
}
