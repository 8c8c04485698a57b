//! The intermediate representation: entities, types, dataflow graph, and
//! layout that together make up a verified SSA [`Function`].

pub mod condcodes;
pub mod constant;
pub mod dfg;
pub mod entities;
pub mod exception_table;
pub mod extfunc;
pub mod extname;
pub mod function;
pub mod globalvalue;
pub mod immediates;
pub mod instructions;
pub mod jumptable;
pub mod layout;
pub mod libcall;
pub mod memflags;
pub mod sourceloc;
pub mod stackslot;
pub mod trapcode;
pub mod types;

pub use condcodes::{FloatCC, IntCC};
pub use constant::{ConstantData, ConstantPool};
pub use dfg::DataFlowGraph;
pub use entities::{Block, Constant, FuncRef, GlobalValue, Inst, JumpTable, SigRef, StackSlot, Value, ValueDef};
pub use exception_table::ExceptionTable;
pub use extfunc::{AbiParam, ArgumentExtension, ArgumentPurpose, CallConv, ExtFuncData, Signature};
pub use extname::ExternalName;
pub use function::Function;
pub use globalvalue::GlobalValueData;
pub use immediates::{Ieee32, Ieee64, Imm64, Offset32};
pub use instructions::{AtomicRmwOp, InstructionData, Opcode};
pub use jumptable::JumpTableData;
pub use layout::Layout;
pub use libcall::LibCall;
pub use memflags::MemFlags;
pub use sourceloc::SourceLoc;
pub use stackslot::{StackSlotData, StackSlots};
pub use trapcode::TrapCode;
pub use types::{AggregateField, AggregateLayout, LaneKind, LaneScalar, Type, F32, F64, I128, I16, I32, I64, I8, R64};
