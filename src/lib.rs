//! Hoist's code generator: builds an SSA function, lowers it to a
//! target-specific instruction list over virtual registers, allocates
//! physical registers, and emits machine code plus unwind metadata into a
//! relocatable buffer.
//!
//! The pipeline is linear and one-shot: build a
//! `Function`, hand it to a `Context`, get back a `CompiledCode` or a
//! `CodegenError`. Nothing here retains state across compilations except
//! the scratch buffers a `Context` reuses to avoid reallocating on every
//! call.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

pub mod bitset;
pub mod context;
pub mod dominator_tree;
pub mod flowgraph;
pub mod ir;
pub mod isa;
pub mod machinst;
pub mod regalloc;
pub mod regs;
pub mod result;
pub mod verifier;

pub use context::Context;
pub use result::{CodegenError, CodegenResult};
