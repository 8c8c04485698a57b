//! AArch64 ABI specifics:
//! the concrete register pools each `CallConv` draws from, and prologue/
//! epilogue generation once the register allocator has settled the frame.

use super::inst::regs::{vreg, xreg, FP, LR, SP, X18_PLATFORM};
use super::inst::{AMode, Inst, OperandSize};
use crate::ir::CallConv;
use crate::machinst::abi::ConventionRegs;
use crate::regalloc::FrameLayout;
use crate::regs::{PReg, Reg};
use crate::result::{CodegenError, CodegenResult};

const INT_ARGS_STANDARD: [PReg; 8] = [xreg(0), xreg(1), xreg(2), xreg(3), xreg(4), xreg(5), xreg(6), xreg(7)];
const FLOAT_ARGS_STANDARD: [PReg; 8] =
    [vreg(0), vreg(1), vreg(2), vreg(3), vreg(4), vreg(5), vreg(6), vreg(7)];
const INT_RETS_STANDARD: [PReg; 2] = [xreg(0), xreg(1)];
const FLOAT_RETS_STANDARD: [PReg; 4] = [vreg(0), vreg(1), vreg(2), vreg(3)];

const INT_ARGS_FAST: [PReg; 18] = [
    xreg(0), xreg(1), xreg(2), xreg(3), xreg(4), xreg(5), xreg(6), xreg(7), xreg(9), xreg(10), xreg(11),
    xreg(12), xreg(13), xreg(14), xreg(15), xreg(16), xreg(17), xreg(19),
];
const FLOAT_ARGS_FAST: [PReg; 16] = [
    vreg(0), vreg(1), vreg(2), vreg(3), vreg(4), vreg(5), vreg(6), vreg(7), vreg(8), vreg(9), vreg(10),
    vreg(11), vreg(12), vreg(13), vreg(14), vreg(15),
];

/// The standard AAPCS64 callee-save set: X19-X28, FP, LR, and the low 64
/// bits of V8-V15.
pub const CALLEE_SAVES_STANDARD: &[PReg] = &[
    xreg(19), xreg(20), xreg(21), xreg(22), xreg(23), xreg(24), xreg(25), xreg(26), xreg(27), xreg(28),
    vreg(8), vreg(9), vreg(10), vreg(11), vreg(12), vreg(13), vreg(14), vreg(15),
];

/// Build the register pools `conv` assigns to on AArch64.
/// `apple` reserves X18 from the integer argument/callee-save pools per
/// the platform-register reservation it requires. `windows-fastcall` is
/// enumerated (§4.6) but this core never resolves it: it is reserved for
/// an x86_64 backend this crate does not implement.
pub fn convention_regs(conv: CallConv, apple: bool) -> CodegenResult<ConventionRegs> {
    let (int_args, float_args): (&'static [PReg], &'static [PReg]) = match conv {
        CallConv::Fast => (&INT_ARGS_FAST, &FLOAT_ARGS_FAST),
        CallConv::WindowsFastcall => {
            return Err(CodegenError::UnsupportedConvention { call_conv: conv });
        }
        _ => (&INT_ARGS_STANDARD, &FLOAT_ARGS_STANDARD),
    };
    let _ = apple; // X18 exclusion is enforced in the allocator's bank, not here
    Ok(ConventionRegs {
        int_args,
        float_args,
        int_rets: &INT_RETS_STANDARD,
        float_rets: &FLOAT_RETS_STANDARD,
        indirect_ret_reg: xreg(8),
        indirect_arg_scratch: xreg(9),
    })
}

/// Scratch registers reserved out of the allocator's pool entirely: used by
/// the post-allocation fixup pass to materialize reloads/spills for
/// operands the instruction encoder cannot reference from the stack
/// directly, and by branch-argument move sequentialization to break
/// assignment cycles. X9, X16 (IP0) and X17 (IP1) are all caller-saved and
/// outside every convention's argument/return pools above, so three are
/// free for this without disturbing ABI-visible state — enough for the
/// densest operand list (`Stp`'s two data registers plus a base address).
pub const SCRATCH_REGS: [PReg; 3] = [xreg(9), xreg(16), xreg(17)];
pub const SCRATCH_FLOAT_REGS: [PReg; 3] = [vreg(9), vreg(16), vreg(17)];

/// The single scratch register move-sequentialization reaches for when
/// breaking a cycle in a simultaneous register assignment.
pub const SCRATCH_INT: PReg = SCRATCH_REGS[0];
pub const SCRATCH_FLOAT: PReg = SCRATCH_FLOAT_REGS[0];

/// Which callee-save registers a target should keep out of the
/// allocator's free pool entirely (beyond the ones actually used and
/// saved by the prologue): FP, LR, and SP are never allocatable; X18 is
/// excluded as well when targeting Apple platforms.
pub fn reserved_registers(apple: bool) -> alloc::vec::Vec<PReg> {
    let mut v = alloc::vec![FP, LR, SP];
    v.extend_from_slice(&SCRATCH_REGS);
    v.extend_from_slice(&SCRATCH_FLOAT_REGS);
    if apple {
        v.push(X18_PLATFORM);
    }
    v
}

/// Emit the prologue: save FP/LR and any callee-saves actually used,
/// establish the frame pointer, and allocate the frame. Emitted
/// after allocation, since it needs the final frame size.
pub fn emit_prologue(frame: &FrameLayout) -> alloc::vec::Vec<Inst> {
    let mut insts = alloc::vec::Vec::new();
    if frame.frame_size > 0 {
        insts.push(Inst::Stp {
            size: OperandSize::Size64,
            rt: Reg::from_physical(FP),
            rt2: Reg::from_physical(LR),
            mem: AMode::PreIndexed { base: Reg::from_physical(SP), offset: -(frame.frame_size as i32) },
        });
        insts.push(Inst::MovRR {
            size: OperandSize::Size64,
            rd: Reg::from_physical(FP),
            rn: Reg::from_physical(SP),
        });
        for (i, pair) in frame.used_callee_saves.chunks(2).enumerate() {
            let offset = 16 + (i as i32) * 16;
            match pair {
                [a, b] => insts.push(Inst::Stp {
                    size: OperandSize::Size64,
                    rt: Reg::from_physical(*a),
                    rt2: Reg::from_physical(*b),
                    mem: AMode::RegOffset { base: Reg::from_physical(FP), offset },
                }),
                [a] => insts.push(Inst::Str {
                    size: OperandSize::Size64,
                    rd: Reg::from_physical(*a),
                    mem: AMode::RegOffset { base: Reg::from_physical(FP), offset },
                }),
                _ => unreachable!(),
            }
        }
    }
    insts
}

/// Emit the epilogue: restore callee-saves in the exact reverse order,
/// restore FP/LR, deallocate the frame, and `RET`.
pub fn emit_epilogue(frame: &FrameLayout) -> alloc::vec::Vec<Inst> {
    let mut insts = alloc::vec::Vec::new();
    if frame.frame_size > 0 {
        for (i, pair) in frame.used_callee_saves.chunks(2).enumerate().rev() {
            let offset = 16 + (i as i32) * 16;
            match pair {
                [a, b] => insts.push(Inst::Ldp {
                    size: OperandSize::Size64,
                    rt: Reg::from_physical(*a),
                    rt2: Reg::from_physical(*b),
                    mem: AMode::RegOffset { base: Reg::from_physical(FP), offset },
                }),
                [a] => insts.push(Inst::Ldr {
                    size: OperandSize::Size64,
                    rd: Reg::from_physical(*a),
                    mem: AMode::RegOffset { base: Reg::from_physical(FP), offset },
                }),
                _ => unreachable!(),
            }
        }
        insts.push(Inst::Ldp {
            size: OperandSize::Size64,
            rt: Reg::from_physical(FP),
            rt2: Reg::from_physical(LR),
            mem: AMode::PostIndexed { base: Reg::from_physical(SP), offset: frame.frame_size as i32 },
        });
    }
    insts.push(Inst::Ret);
    insts
}
