//! The compilation entry point: hands a verified [`Function`] to a
//! [`crate::isa::TargetIsa`] and returns the machine code artifact.
//!
//! A `Context` holds no state beyond the function it was built for; it
//! exists mainly so a caller compiling many functions back to back has a
//! single, obvious place to look for "how do I compile one of these".
//! Nothing here retains state across compilations — the core is stateless
//! across calls.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::Function;
use crate::isa::TargetIsa;
use crate::machinst::CompiledCode;
use crate::result::CodegenResult;
use crate::verifier::verify_function;

/// Drives one function through verification and lowering/regalloc/emission.
pub struct Context {
    pub func: Function,
    cfg: ControlFlowGraph,
    domtree: DominatorTree,
}

impl Context {
    pub fn new(func: Function) -> Self {
        Self {
            func,
            cfg: ControlFlowGraph::new(),
            domtree: DominatorTree::new(),
        }
    }

    /// Verify `self.func` and compile it for `isa`, returning the
    /// relocatable code artifact. On any error, no partial `CompiledCode`
    /// is produced and all scratch state the pipeline built up is dropped
    /// with this `Context` — the caller gets a single `CodegenError`.
    pub fn compile(&mut self, isa: &dyn TargetIsa) -> CodegenResult<CompiledCode> {
        let (cfg, domtree) = verify_function(&self.func)?;
        self.cfg = cfg;
        self.domtree = domtree;
        isa.compile_function(&self.func, &self.cfg, &self.domtree)
    }

    pub fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    pub fn domtree(&self) -> &DominatorTree {
        &self.domtree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, ExternalName, InstructionData, Opcode, Signature, Type};
    use crate::isa::aarch64::AArch64Backend;
    use crate::isa::TargetConfig;
    use target_lexicon::Triple;

    fn add_function() -> Function {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(crate::ir::AbiParam::new(Type::Int(32)));
        sig.params.push(crate::ir::AbiParam::new(Type::Int(32)));
        sig.returns.push(crate::ir::AbiParam::new(Type::Int(32)));
        let mut func = Function::new(ExternalName::User(0), sig);

        let block0 = func.make_block();
        let a = func.append_block_param(block0, Type::Int(32));
        let b = func.append_block_param(block0, Type::Int(32));

        let add = func.dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [a, b],
        });
        let sum = func.dfg.append_inst_result(add, Type::Int(32));
        func.layout.append_inst(add, block0);

        let ret = func.dfg.make_inst(InstructionData::MultiAry {
            opcode: Opcode::Return,
            args: smallvec::smallvec![sum],
        });
        func.layout.append_inst(ret, block0);

        func
    }

    fn aarch64_target() -> AArch64Backend {
        AArch64Backend::new(TargetConfig {
            triple: Triple::unknown(),
            default_call_conv: CallConv::SystemV,
            features: alloc::vec::Vec::new(),
            apple: false,
        })
    }

    #[test]
    fn compiles_add_function() {
        let mut ctx = Context::new(add_function());
        let isa = aarch64_target();
        let compiled = ctx.compile(&isa).expect("compiles");
        assert_eq!(compiled.frame_size % 16, 0);
        assert!(!compiled.code.is_empty());
    }
}
