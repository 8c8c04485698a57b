//! Instruction opcodes and the `InstructionData` payload shapes.
//!
//! `InstructionData` is a tagged union: each opcode family gets exactly the
//! fields its shape needs, so e.g. a `compare` carries a condition code that
//! a plain `binary` does not. The lowering engine matches on this
//! shape directly instead of going through virtual dispatch.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{Block, FuncRef, JumpTable, SigRef, StackSlot, Value};
use crate::ir::immediates::{Imm64, Offset32};
use crate::ir::memflags::MemFlags;
use crate::ir::trapcode::TrapCode;
use crate::ir::types::Type;
use smallvec::SmallVec;

/// An atomic read-modify-write operation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AtomicRmwOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Xchg,
}

/// The operation an instruction performs. The opcode alone, together with
/// `InstructionData`'s variant, fully determines the instruction's
/// functional signature (arity and result types) that the verifier checks.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    // Constants.
    Iconst,
    F32const,
    F64const,
    // Unary.
    Ineg,
    Bnot,
    Clz,
    Ctz,
    Popcnt,
    Fneg,
    Fabs,
    Sqrt,
    SextendTo(Type),
    UextendTo(Type),
    IreduceTo(Type),
    Bitcast(Type),
    // Binary.
    Iadd,
    Isub,
    Imul,
    Udiv,
    Sdiv,
    Urem,
    Srem,
    Band,
    Bor,
    Bxor,
    Ishl,
    Ushr,
    Sshr,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    // Binary-immediate (right-hand operand is an `Imm64`).
    IaddImm,
    IsubImm,
    ImulImm,
    BandImm,
    BorImm,
    BxorImm,
    IshlImm,
    // Ternary.
    Select,
    Fma,
    // Compare.
    Icmp(IntCC),
    Fcmp(FloatCC),
    // Memory.
    Load,
    Store,
    StackAddr,
    StackLoad,
    StackStore,
    AtomicRmw(AtomicRmwOp),
    AtomicCas,
    Fence,
    // Control flow.
    Jump,
    Brif,
    BrTable,
    Call,
    CallIndirect,
    TryCall,
    TryCallIndirect,
    Return,
    Trap(TrapCode),
    Trapz(TrapCode),
    Trapnz(TrapCode),
    // Debug.
    SequencePoint,
}

/// The operand/result shape an opcode is stored with. This is the sum type
/// ("An Inst holds an opcode tag and a payload
/// whose shape is determined by opcode family").
#[derive(Clone, Debug)]
pub enum InstructionData {
    UnaryImm {
        opcode: Opcode,
        imm: Imm64,
    },
    UnaryIeee32 {
        opcode: Opcode,
        imm: crate::ir::immediates::Ieee32,
    },
    UnaryIeee64 {
        opcode: Opcode,
        imm: crate::ir::immediates::Ieee64,
    },
    Unary {
        opcode: Opcode,
        arg: Value,
    },
    Binary {
        opcode: Opcode,
        args: [Value; 2],
    },
    BinaryImm {
        opcode: Opcode,
        arg: Value,
        imm: Imm64,
    },
    Ternary {
        opcode: Opcode,
        args: [Value; 3],
    },
    IntCompare {
        cond: IntCC,
        args: [Value; 2],
    },
    FloatCompare {
        cond: FloatCC,
        args: [Value; 2],
    },
    Load {
        opcode: Opcode,
        arg: Value,
        flags: MemFlags,
        offset: Offset32,
    },
    Store {
        opcode: Opcode,
        args: [Value; 2],
        flags: MemFlags,
        offset: Offset32,
    },
    StackLoad {
        slot: StackSlot,
        offset: Offset32,
    },
    StackStore {
        arg: Value,
        slot: StackSlot,
        offset: Offset32,
    },
    AtomicRmw {
        op: AtomicRmwOp,
        args: [Value; 2],
        flags: MemFlags,
    },
    AtomicCas {
        args: [Value; 3],
        flags: MemFlags,
    },
    NullAry {
        opcode: Opcode,
    },
    Jump {
        destination: Block,
        args: SmallVec<[Value; 4]>,
    },
    Brif {
        arg: Value,
        then_block: Block,
        then_args: SmallVec<[Value; 4]>,
        else_block: Block,
        else_args: SmallVec<[Value; 4]>,
    },
    BranchTable {
        arg: Value,
        table: JumpTable,
        default: Block,
    },
    Call {
        func_ref: FuncRef,
        args: SmallVec<[Value; 4]>,
    },
    CallIndirect {
        sig_ref: SigRef,
        callee: Value,
        args: SmallVec<[Value; 4]>,
    },
    TryCall {
        func_ref: FuncRef,
        args: SmallVec<[Value; 4]>,
        exception_table: crate::ir::exception_table::ExceptionTable,
    },
    MultiAry {
        opcode: Opcode,
        args: SmallVec<[Value; 4]>,
    },
    Trap {
        code: TrapCode,
    },
    CondTrap {
        opcode: Opcode,
        arg: Value,
        code: TrapCode,
    },
}

impl InstructionData {
    /// The opcode of this instruction (derivable from the variant shape in
    /// most cases, but stored or computed here so callers don't need to
    /// match on the shape just to ask "what is this").
    pub fn opcode(&self) -> Opcode {
        match self {
            InstructionData::UnaryImm { opcode, .. }
            | InstructionData::UnaryIeee32 { opcode, .. }
            | InstructionData::UnaryIeee64 { opcode, .. }
            | InstructionData::Unary { opcode, .. }
            | InstructionData::Binary { opcode, .. }
            | InstructionData::BinaryImm { opcode, .. }
            | InstructionData::Ternary { opcode, .. }
            | InstructionData::Load { opcode, .. }
            | InstructionData::Store { opcode, .. }
            | InstructionData::NullAry { opcode }
            | InstructionData::MultiAry { opcode, .. }
            | InstructionData::CondTrap { opcode, .. } => *opcode,
            InstructionData::IntCompare { cond, .. } => Opcode::Icmp(*cond),
            InstructionData::FloatCompare { cond, .. } => Opcode::Fcmp(*cond),
            InstructionData::StackLoad { .. } => Opcode::StackLoad,
            InstructionData::StackStore { .. } => Opcode::StackStore,
            InstructionData::AtomicRmw { op, .. } => Opcode::AtomicRmw(*op),
            InstructionData::AtomicCas { .. } => Opcode::AtomicCas,
            InstructionData::Jump { .. } => Opcode::Jump,
            InstructionData::Brif { .. } => Opcode::Brif,
            InstructionData::BranchTable { .. } => Opcode::BrTable,
            InstructionData::Call { .. } => Opcode::Call,
            InstructionData::CallIndirect { .. } => Opcode::CallIndirect,
            InstructionData::TryCall { .. } => Opcode::TryCall,
            InstructionData::Trap { code } => Opcode::Trap(*code),
        }
    }

    /// Operand values read by this instruction, in order. Branch-argument
    /// lists and call argument lists are included; block/jump-table targets
    /// are not (they are not `Value`s).
    pub fn arguments(&self) -> SmallVec<[Value; 4]> {
        match self {
            InstructionData::UnaryImm { .. }
            | InstructionData::UnaryIeee32 { .. }
            | InstructionData::UnaryIeee64 { .. }
            | InstructionData::NullAry { .. } => SmallVec::new(),
            InstructionData::Unary { arg, .. } => SmallVec::from_slice(&[*arg]),
            InstructionData::Binary { args, .. } => SmallVec::from_slice(args),
            InstructionData::BinaryImm { arg, .. } => SmallVec::from_slice(&[*arg]),
            InstructionData::Ternary { args, .. } => SmallVec::from_slice(args),
            InstructionData::IntCompare { args, .. } => SmallVec::from_slice(args),
            InstructionData::FloatCompare { args, .. } => SmallVec::from_slice(args),
            InstructionData::Load { arg, .. } => SmallVec::from_slice(&[*arg]),
            InstructionData::Store { args, .. } => SmallVec::from_slice(args),
            InstructionData::StackLoad { .. } => SmallVec::new(),
            InstructionData::StackStore { arg, .. } => SmallVec::from_slice(&[*arg]),
            InstructionData::AtomicRmw { args, .. } => SmallVec::from_slice(args),
            InstructionData::AtomicCas { args, .. } => SmallVec::from_slice(args),
            InstructionData::Jump { args, .. } => args.clone(),
            InstructionData::Brif {
                arg,
                then_args,
                else_args,
                ..
            } => {
                let mut v = SmallVec::new();
                v.push(*arg);
                v.extend(then_args.iter().copied());
                v.extend(else_args.iter().copied());
                v
            }
            InstructionData::BranchTable { arg, .. } => SmallVec::from_slice(&[*arg]),
            InstructionData::Call { args, .. } => args.clone(),
            InstructionData::CallIndirect { callee, args, .. } => {
                let mut v = SmallVec::new();
                v.push(*callee);
                v.extend(args.iter().copied());
                v
            }
            InstructionData::TryCall {
                args,
                exception_table,
                ..
            } => {
                let mut v = args.clone();
                v.extend(exception_table.normal_args.iter().copied());
                v.extend(exception_table.exception_args.iter().copied());
                v
            }
            InstructionData::MultiAry { args, .. } => args.clone(),
            InstructionData::Trap { .. } => SmallVec::new(),
            InstructionData::CondTrap { arg, .. } => SmallVec::from_slice(&[*arg]),
        }
    }

    /// Is this instruction a block terminator?
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionData::Jump { .. }
                | InstructionData::Brif { .. }
                | InstructionData::BranchTable { .. }
                | InstructionData::TryCall { .. }
                | InstructionData::MultiAry {
                    opcode: Opcode::Return,
                    ..
                }
        )
    }

    /// Is this instruction observably side-effecting (may not be sunk or
    /// reordered by the lowering engine's use-counting pass)?
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            InstructionData::Store { .. }
                | InstructionData::StackStore { .. }
                | InstructionData::AtomicRmw { .. }
                | InstructionData::AtomicCas { .. }
                | InstructionData::Call { .. }
                | InstructionData::CallIndirect { .. }
                | InstructionData::TryCall { .. }
                | InstructionData::Trap { .. }
                | InstructionData::CondTrap { .. }
        ) || matches!(self.opcode(), Opcode::Fence | Opcode::SequencePoint)
    }

    /// Successor blocks referenced by a terminator, in the order branch
    /// arguments are associated with them.
    pub fn branch_destinations(&self) -> SmallVec<[Block; 2]> {
        match self {
            InstructionData::Jump { destination, .. } => SmallVec::from_slice(&[*destination]),
            InstructionData::Brif {
                then_block,
                else_block,
                ..
            } => SmallVec::from_slice(&[*then_block, *else_block]),
            InstructionData::TryCall {
                exception_table, ..
            } => SmallVec::from_slice(&[
                exception_table.normal_successor,
                exception_table.exception_successor,
            ]),
            InstructionData::BranchTable { default, .. } => SmallVec::from_slice(&[*default]),
            _ => SmallVec::new(),
        }
    }
}
