//! Target configuration: the `TargetIsa` trait the rest of the core
//! compiles against, and the AArch64 implementation of it.
//!
//! This crate targets exactly one architecture, so unlike a
//! multi-architecture compiler's `isa` module there is no `lookup`
//! dispatching on `target_lexicon::Architecture` — callers build an
//! `aarch64::AArch64Backend` directly and hand it to `Context::compile`.

pub mod aarch64;

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{CallConv, Function};
use crate::machinst::CompiledCode;
use crate::result::CodegenResult;
use target_lexicon::Triple;

/// A feature bit a target configuration may turn on, each gating a small
/// extension to the instructions the lowering engine is allowed to emit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TargetFeature {
    /// Large System Extension atomics (`LDADD`/`SWP`/`CAS` instead of the
    /// load/exclusive-store retry loop).
    Lse,
    /// Pointer Authentication Code instructions on call/return.
    Pac,
    /// Branch Target Identification landing pads.
    Bti,
}

/// Target configuration: triple, default calling convention, and feature
/// flags a backend consults while lowering and emitting.
#[derive(Clone, Debug)]
pub struct TargetConfig {
    pub triple: Triple,
    pub default_call_conv: CallConv,
    pub features: alloc::vec::Vec<TargetFeature>,
    /// Whether the target is an Apple AArch64 platform (macOS/iOS), which
    /// reserves X18 and uses a slightly different stack argument
    /// alignment rule.
    pub apple: bool,
}

impl TargetConfig {
    pub fn has_feature(&self, f: TargetFeature) -> bool {
        self.features.contains(&f)
    }
}

/// Methods a target backend implements to let the core pipeline drive
/// compilation without knowing the concrete architecture.
pub trait TargetIsa: Send + Sync {
    /// The name of this backend, for diagnostics.
    fn name(&self) -> &'static str;

    /// The configuration this backend was built with.
    fn config(&self) -> &TargetConfig;

    /// Compile one already-verified function into machine code,
    /// relocations, traps, frame layout, and (if the `unwind` feature is
    /// enabled) System V unwind metadata. `cfg`/`domtree` are the ones the
    /// caller's verification pass already computed.
    fn compile_function(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
    ) -> CodegenResult<CompiledCode>;
}
