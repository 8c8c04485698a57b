//! The AArch64 machine-instruction set: a discriminated
//! enumeration with narrow arms so encoding is a direct function of the
//! arm (`add_rr` and `add_imm` are distinct variants, not one `Add` arm
//! with an operand-mode tag).
//!
//! Covers the plain ALU/load-store/branch/call core plus the handful of
//! FP forms the lowering engine in [`super::lower`] emits. This is a
//! strict subset of the target instruction set: there are no shifted or
//! extended-register ALU arms, no bit-field ops, no `MADD`/`MSUB`/
//! `SMULH`/`UMULH`/`SMULL`/`UMULL`, no NEON, no atomic-exclusive or LSE
//! arms, no `DSB`/`ISB`, no `CSINC`/`CSNEG`/`CSINV`, no `TBZ`/`TBNZ`, no
//! `BTI`/`PAC*`/`AUT*`, and no `BranchTable` dispatch. Adding any of
//! those is a matter of new arms here plus matching encoders in
//! `super::emit`, not a structural change to this type.

use crate::machinst::{MachInst, OperandConstraint, OperandKind};
use crate::regs::{PReg, Reg, RegClass};

/// A condition code as AArch64 encodes it in `B.cond`/`CSEL`/friends (the
/// 4-bit field of ARMv8 condition codes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Hs,
    Lo,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Cond {
    pub fn bits(self) -> u32 {
        match self {
            Cond::Eq => 0b0000,
            Cond::Ne => 0b0001,
            Cond::Hs => 0b0010,
            Cond::Lo => 0b0011,
            Cond::Mi => 0b0100,
            Cond::Pl => 0b0101,
            Cond::Vs => 0b0110,
            Cond::Vc => 0b0111,
            Cond::Hi => 0b1000,
            Cond::Ls => 0b1001,
            Cond::Ge => 0b1010,
            Cond::Lt => 0b1011,
            Cond::Gt => 0b1100,
            Cond::Le => 0b1101,
            Cond::Al => 0b1110,
        }
    }

    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Al,
        }
    }
}

/// A load/store addressing mode.
#[derive(Clone, Copy, Debug)]
pub enum AMode {
    RegOffset { base: Reg, offset: i32 },
    RegReg { base: Reg, index: Reg },
    PreIndexed { base: Reg, offset: i32 },
    PostIndexed { base: Reg, offset: i32 },
    /// A frame-relative slot, resolved to `RegOffset` against FP once the
    /// frame layout is known (after register allocation).
    SpillSlot { slot: crate::regs::SpillSlot },
    /// A declared local stack slot, resolved the same way as `SpillSlot`.
    StackSlot { slot: crate::ir::StackSlot, offset: i32 },
}

/// The size a load/store or ALU op operates at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandSize {
    Size32,
    Size64,
}

impl OperandSize {
    pub fn sf_bit(self) -> u32 {
        match self {
            OperandSize::Size32 => 0,
            OperandSize::Size64 => 1,
        }
    }
}

/// One AArch64 machine instruction. Arms carry exactly the registers and
/// immediates their encoding needs; see `super::emit` for the 32-bit-word
/// encoders.
#[derive(Clone, Debug)]
pub enum Inst {
    AddRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    AddImm { size: OperandSize, rd: Reg, rn: Reg, imm12: u16 },
    SubRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    SubImm { size: OperandSize, rd: Reg, rn: Reg, imm12: u16 },
    MulRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    SDivRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    UDivRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    AndRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    OrrRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    EorRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    LslRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    LsrRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    AsrRR { size: OperandSize, rd: Reg, rn: Reg, rm: Reg },
    MvnRR { size: OperandSize, rd: Reg, rn: Reg },
    NegRR { size: OperandSize, rd: Reg, rn: Reg },
    ClzRR { size: OperandSize, rd: Reg, rn: Reg },
    RbitRR { size: OperandSize, rd: Reg, rn: Reg },

    MovZ { size: OperandSize, rd: Reg, imm16: u16, shift: u8 },
    MovN { size: OperandSize, rd: Reg, imm16: u16, shift: u8 },
    MovK { size: OperandSize, rd: Reg, imm16: u16, shift: u8 },
    MovRR { size: OperandSize, rd: Reg, rn: Reg },

    Ldr { size: OperandSize, rd: Reg, mem: AMode },
    LdrB { rd: Reg, mem: AMode },
    LdrH { rd: Reg, mem: AMode },
    LdrSB { size: OperandSize, rd: Reg, mem: AMode },
    LdrSH { size: OperandSize, rd: Reg, mem: AMode },
    LdrSW { rd: Reg, mem: AMode },
    Str { size: OperandSize, rd: Reg, mem: AMode },
    StrB { rd: Reg, mem: AMode },
    StrH { rd: Reg, mem: AMode },
    Ldp { size: OperandSize, rt: Reg, rt2: Reg, mem: AMode },
    Stp { size: OperandSize, rt: Reg, rt2: Reg, mem: AMode },

    FAddRR { rd: Reg, rn: Reg, rm: Reg, is_64: bool },
    FSubRR { rd: Reg, rn: Reg, rm: Reg, is_64: bool },
    FMulRR { rd: Reg, rn: Reg, rm: Reg, is_64: bool },
    FDivRR { rd: Reg, rn: Reg, rm: Reg, is_64: bool },
    FNegRR { rd: Reg, rn: Reg, is_64: bool },
    FAbsRR { rd: Reg, rn: Reg, is_64: bool },
    FSqrtRR { rd: Reg, rn: Reg, is_64: bool },
    FCmpRR { rn: Reg, rm: Reg, is_64: bool },
    FMovRR { rd: Reg, rn: Reg, is_64: bool },

    CmpRR { size: OperandSize, rn: Reg, rm: Reg },
    CmpImm { size: OperandSize, rn: Reg, imm12: u16 },
    CSel { size: OperandSize, rd: Reg, rn: Reg, rm: Reg, cond: Cond },
    CSet { size: OperandSize, rd: Reg, cond: Cond },

    /// An unconditional branch to a VCode block. The emission driver owns
    /// the block-to-`MachLabel` mapping and resolves this reference to a
    /// label use when it walks the block in program order.
    Jump { target: crate::machinst::vcode::VCodeBlock },
    /// A conditional branch: taken when `cond` holds, falls through
    /// otherwise (the lowering engine always emits the fallthrough
    /// explicitly as a second `Jump`, so every block ends with exactly
    /// one control-flow instruction in program order after assembly).
    CondBr { cond: Cond, target: crate::machinst::vcode::VCodeBlock },
    Cbz { size: OperandSize, rn: Reg, target: crate::machinst::vcode::VCodeBlock },
    Cbnz { size: OperandSize, rn: Reg, target: crate::machinst::vcode::VCodeBlock },

    /// A direct call. Each use/def pairs the value's register with the ABI
    /// register it is constrained to, since at lowering time the value is
    /// still a virtual register and cannot name its own physical encoding.
    Call {
        callee: crate::ir::ExternalName,
        uses: alloc::vec::Vec<(Reg, PReg)>,
        defs: alloc::vec::Vec<(Reg, PReg)>,
        /// Set for a lowered `try_call`: the VCode block its exception
        /// successor was assigned, recorded as an LSDA call-site entry at
        /// emission time rather than as a branch.
        exception_successor: Option<crate::machinst::vcode::VCodeBlock>,
    },
    CallIndirect {
        callee: Reg,
        uses: alloc::vec::Vec<(Reg, PReg)>,
        defs: alloc::vec::Vec<(Reg, PReg)>,
    },
    Ret,

    /// A trap instruction: `BRK #0`, tagged with the reported code.
    Udf { code: crate::ir::TrapCode },
    /// A conditional trap: branch over a `BRK` when `cond` does not hold.
    TrapIf { cond: Cond, code: crate::ir::TrapCode },

    Dmb,
    Nop,

    /// A virtual marker the prologue/epilogue pass expands once the frame
    /// size and callee-save set are known; never reaches `emit` directly.
    FrameSetup,
    FrameDestroy,
}

impl MachInst for Inst {
    fn get_operands(&self, c: &mut dyn FnMut(Reg, OperandKind, OperandConstraint)) {
        use Inst::*;
        let any = OperandConstraint::Any;
        match *self {
            AddRR { rd, rn, rm, .. }
            | SubRR { rd, rn, rm, .. }
            | MulRR { rd, rn, rm, .. }
            | SDivRR { rd, rn, rm, .. }
            | UDivRR { rd, rn, rm, .. }
            | AndRR { rd, rn, rm, .. }
            | OrrRR { rd, rn, rm, .. }
            | EorRR { rd, rn, rm, .. }
            | LslRR { rd, rn, rm, .. }
            | LsrRR { rd, rn, rm, .. }
            | AsrRR { rd, rn, rm, .. } => {
                c(rn, OperandKind::Use, any);
                c(rm, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            AddImm { rd, rn, .. } | SubImm { rd, rn, .. } => {
                c(rn, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            MvnRR { rd, rn, .. }
            | NegRR { rd, rn, .. }
            | ClzRR { rd, rn, .. }
            | RbitRR { rd, rn, .. }
            | MovRR { rd, rn, .. } => {
                c(rn, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            MovZ { rd, .. } | MovN { rd, .. } => c(rd, OperandKind::Def, any),
            MovK { rd, .. } => {
                c(rd, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            Ldr { rd, mem, .. }
            | LdrB { rd, mem }
            | LdrH { rd, mem }
            | LdrSB { rd, mem, .. }
            | LdrSH { rd, mem, .. }
            | LdrSW { rd, mem } => {
                amode_operands(&mem, c);
                c(rd, OperandKind::Def, any);
            }
            Str { rd, mem, .. } | StrB { rd, mem } | StrH { rd, mem } => {
                c(rd, OperandKind::Use, any);
                amode_operands(&mem, c);
            }
            Ldp { rt, rt2, mem, .. } => {
                amode_operands(&mem, c);
                c(rt, OperandKind::Def, any);
                c(rt2, OperandKind::Def, any);
            }
            Stp { rt, rt2, mem, .. } => {
                c(rt, OperandKind::Use, any);
                c(rt2, OperandKind::Use, any);
                amode_operands(&mem, c);
            }
            FAddRR { rd, rn, rm, .. }
            | FSubRR { rd, rn, rm, .. }
            | FMulRR { rd, rn, rm, .. }
            | FDivRR { rd, rn, rm, .. } => {
                c(rn, OperandKind::Use, any);
                c(rm, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            FNegRR { rd, rn, .. } | FAbsRR { rd, rn, .. } | FSqrtRR { rd, rn, .. } | FMovRR { rd, rn, .. } => {
                c(rn, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            FCmpRR { rn, rm, .. } => {
                c(rn, OperandKind::Use, any);
                c(rm, OperandKind::Use, any);
            }
            CmpRR { rn, rm, .. } => {
                c(rn, OperandKind::Use, any);
                c(rm, OperandKind::Use, any);
            }
            CmpImm { rn, .. } => c(rn, OperandKind::Use, any),
            CSel { rd, rn, rm, .. } => {
                c(rn, OperandKind::Use, any);
                c(rm, OperandKind::Use, any);
                c(rd, OperandKind::Def, any);
            }
            CSet { rd, .. } => c(rd, OperandKind::Def, any),
            Cbz { rn, .. } | Cbnz { rn, .. } => c(rn, OperandKind::Use, any),
            Call { ref uses, ref defs, .. } | CallIndirect { ref uses, ref defs, .. } => {
                for &(r, p) in uses {
                    c(r, OperandKind::Use, OperandConstraint::Fixed(p));
                }
                for &(r, p) in defs {
                    c(r, OperandKind::Def, OperandConstraint::Fixed(p));
                }
                if let CallIndirect { callee, .. } = *self {
                    c(callee, OperandKind::Use, any);
                }
            }
            TrapIf { .. } => {}
            Jump { .. } | CondBr { .. } | Ret | Udf { .. } | Dmb | Nop | FrameSetup | FrameDestroy => {}
        }
    }

    fn map_regs(&mut self, f: &mut dyn FnMut(Reg) -> Reg) {
        use Inst::*;
        match self {
            AddRR { rd, rn, rm, .. }
            | SubRR { rd, rn, rm, .. }
            | MulRR { rd, rn, rm, .. }
            | SDivRR { rd, rn, rm, .. }
            | UDivRR { rd, rn, rm, .. }
            | AndRR { rd, rn, rm, .. }
            | OrrRR { rd, rn, rm, .. }
            | EorRR { rd, rn, rm, .. }
            | LslRR { rd, rn, rm, .. }
            | LsrRR { rd, rn, rm, .. }
            | AsrRR { rd, rn, rm, .. } => {
                *rn = f(*rn);
                *rm = f(*rm);
                *rd = f(*rd);
            }
            AddImm { rd, rn, .. } | SubImm { rd, rn, .. } => {
                *rn = f(*rn);
                *rd = f(*rd);
            }
            MvnRR { rd, rn, .. }
            | NegRR { rd, rn, .. }
            | ClzRR { rd, rn, .. }
            | RbitRR { rd, rn, .. }
            | MovRR { rd, rn, .. } => {
                *rn = f(*rn);
                *rd = f(*rd);
            }
            MovZ { rd, .. } | MovN { rd, .. } | MovK { rd, .. } => *rd = f(*rd),
            Ldr { rd, mem, .. }
            | LdrB { rd, mem }
            | LdrH { rd, mem }
            | LdrSB { rd, mem, .. }
            | LdrSH { rd, mem, .. }
            | LdrSW { rd, mem } => {
                map_amode(mem, f);
                *rd = f(*rd);
            }
            Str { rd, mem, .. } | StrB { rd, mem } | StrH { rd, mem } => {
                *rd = f(*rd);
                map_amode(mem, f);
            }
            Ldp { rt, rt2, mem, .. } => {
                map_amode(mem, f);
                *rt = f(*rt);
                *rt2 = f(*rt2);
            }
            Stp { rt, rt2, mem, .. } => {
                *rt = f(*rt);
                *rt2 = f(*rt2);
                map_amode(mem, f);
            }
            FAddRR { rd, rn, rm, .. }
            | FSubRR { rd, rn, rm, .. }
            | FMulRR { rd, rn, rm, .. }
            | FDivRR { rd, rn, rm, .. } => {
                *rn = f(*rn);
                *rm = f(*rm);
                *rd = f(*rd);
            }
            FNegRR { rd, rn, .. } | FAbsRR { rd, rn, .. } | FSqrtRR { rd, rn, .. } | FMovRR { rd, rn, .. } => {
                *rn = f(*rn);
                *rd = f(*rd);
            }
            FCmpRR { rn, rm, .. } => {
                *rn = f(*rn);
                *rm = f(*rm);
            }
            CmpRR { rn, rm, .. } => {
                *rn = f(*rn);
                *rm = f(*rm);
            }
            CmpImm { rn, .. } => *rn = f(*rn),
            CSel { rd, rn, rm, .. } => {
                *rn = f(*rn);
                *rm = f(*rm);
                *rd = f(*rd);
            }
            CSet { rd, .. } => *rd = f(*rd),
            Cbz { rn, .. } | Cbnz { rn, .. } => *rn = f(*rn),
            Call { uses, defs, .. } => {
                for (r, _) in uses.iter_mut() {
                    *r = f(*r);
                }
                for (r, _) in defs.iter_mut() {
                    *r = f(*r);
                }
            }
            CallIndirect { callee, uses, defs } => {
                *callee = f(*callee);
                for (r, _) in uses.iter_mut() {
                    *r = f(*r);
                }
                for (r, _) in defs.iter_mut() {
                    *r = f(*r);
                }
            }
            Jump { .. } | CondBr { .. } | Ret | Udf { .. } | TrapIf { .. } | Dmb | Nop | FrameSetup
            | FrameDestroy => {}
        }
    }

    fn is_term(&self) -> bool {
        matches!(
            self,
            Inst::Jump { .. } | Inst::CondBr { .. } | Inst::Cbz { .. } | Inst::Cbnz { .. } | Inst::Ret
        )
    }

    fn gen_move(dst: Reg, src: Reg, class: RegClass) -> Self {
        match class {
            RegClass::Int => Inst::MovRR { size: OperandSize::Size64, rd: dst, rn: src },
            RegClass::Float | RegClass::Vector => Inst::FMovRR { rd: dst, rn: src, is_64: true },
        }
    }

    fn gen_spill(reg: Reg, slot: crate::regs::SpillSlot, _class: RegClass) -> Self {
        Inst::Str {
            size: OperandSize::Size64,
            rd: reg,
            mem: AMode::SpillSlot { slot },
        }
    }

    fn gen_reload(reg: Reg, slot: crate::regs::SpillSlot, _class: RegClass) -> Self {
        Inst::Ldr {
            size: OperandSize::Size64,
            rd: reg,
            mem: AMode::SpillSlot { slot },
        }
    }
}

impl Inst {
    /// Visit every memory operand's addressing mode, letting the caller
    /// rewrite it in place. The post-allocation frame-resolution pass uses
    /// this to turn `AMode::SpillSlot`/`AMode::StackSlot` into `RegOffset`
    /// against the frame pointer once the final layout is known.
    pub fn map_amodes(&mut self, f: &mut dyn FnMut(&mut AMode)) {
        use Inst::*;
        match self {
            Ldr { mem, .. }
            | LdrB { mem, .. }
            | LdrH { mem, .. }
            | LdrSB { mem, .. }
            | LdrSH { mem, .. }
            | LdrSW { mem, .. }
            | Str { mem, .. }
            | StrB { mem, .. }
            | StrH { mem, .. }
            | Ldp { mem, .. }
            | Stp { mem, .. } => f(mem),
            _ => {}
        }
    }
}

fn amode_operands(mem: &AMode, c: &mut dyn FnMut(Reg, OperandKind, OperandConstraint)) {
    match *mem {
        AMode::RegOffset { base, .. } | AMode::PreIndexed { base, .. } | AMode::PostIndexed { base, .. } => {
            c(base, OperandKind::Use, OperandConstraint::Any);
        }
        AMode::RegReg { base, index } => {
            c(base, OperandKind::Use, OperandConstraint::Any);
            c(index, OperandKind::Use, OperandConstraint::Any);
        }
        AMode::SpillSlot { .. } | AMode::StackSlot { .. } => {}
    }
}

fn map_amode(mem: &mut AMode, f: &mut dyn FnMut(Reg) -> Reg) {
    match mem {
        AMode::RegOffset { base, .. } | AMode::PreIndexed { base, .. } | AMode::PostIndexed { base, .. } => {
            *base = f(*base);
        }
        AMode::RegReg { base, index } => {
            *base = f(*base);
            *index = f(*index);
        }
        AMode::SpillSlot { .. } | AMode::StackSlot { .. } => {}
    }
}

/// The fixed set of AArch64 hardware registers, named the way the ABI and
/// prologue code reference them.
pub mod regs {
    use super::*;

    pub const fn xreg(n: u8) -> PReg {
        PReg::new(RegClass::Int, n)
    }
    pub const fn vreg(n: u8) -> PReg {
        PReg::new(RegClass::Float, n)
    }

    pub const FP: PReg = xreg(29);
    pub const LR: PReg = xreg(30);
    pub const SP: PReg = xreg(31);
    pub const X18_PLATFORM: PReg = xreg(18);
}
