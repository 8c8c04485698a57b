//! The ABI / calling-convention resolver: maps a `Signature` to
//! argument and return locations for a chosen convention, classifying
//! aggregates as HFA, HVA, packed-integer, or indirect.
//!
//! This module is target-independent; `crate::isa::aarch64::abi` supplies
//! the concrete register lists each `CallConv` draws from on AArch64.

use crate::ir::{ArgumentExtension, CallConv, Function, Signature, Type};
use crate::regs::{PReg, RegClass};
use crate::result::CodegenError;
use smallvec::SmallVec;

/// One physical location an `ABIArg`'s value (or one register-sized chunk
/// of it) lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ABIArgSlot {
    Reg { reg: PReg, ty: Type, extension: ArgumentExtension },
    Stack { offset: i64, ty: Type, extension: ArgumentExtension },
}

/// The full location of one signature parameter or return value: one slot
/// per scalar/HFA-member/packed-chunk, or a single `Stack` slot holding a
/// pointer for an indirect aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ABIArg {
    pub slots: SmallVec<[ABIArgSlot; 2]>,
    /// True when this models an indirect aggregate: the single slot holds
    /// a pointer to caller-allocated storage, not the value itself.
    pub indirect: bool,
}

/// A fully resolved calling convention for one signature.
#[derive(Clone, Debug)]
pub struct ABISignature {
    pub args: Vec<ABIArg>,
    pub rets: Vec<ABIArg>,
    pub stack_arg_space: u32,
    pub stack_ret_space: u32,
    pub call_conv: CallConv,
}

pub type AbiError = CodegenError;

/// The per-convention register pools and limits a target exposes to this
/// resolver. A target backend builds one of these per
/// `CallConv` it supports and hands it to [`resolve_signature`].
pub struct ConventionRegs {
    pub int_args: &'static [PReg],
    pub float_args: &'static [PReg],
    pub int_rets: &'static [PReg],
    pub float_rets: &'static [PReg],
    /// Register used to pass the implicit return-slot pointer when a
    /// return value is too large for `int_rets`/`float_rets`.
    pub indirect_ret_reg: PReg,
    /// Register used to pass a caller-allocated stack copy of an
    /// oversized aggregate argument.
    pub indirect_arg_scratch: PReg,
}

struct Cursor<'a> {
    regs: &'a [PReg],
    next: usize,
}

impl<'a> Cursor<'a> {
    fn new(regs: &'a [PReg]) -> Self {
        Self { regs, next: 0 }
    }

    fn take(&mut self) -> Option<PReg> {
        let r = self.regs.get(self.next).copied();
        if r.is_some() {
            self.next += 1;
        }
        r
    }

    fn remaining(&self) -> usize {
        self.regs.len() - self.next
    }
}

/// Resolve `sig` under `conv`'s register pools, following the AArch64-
/// family rules. `func` supplies aggregate layouts for any
/// `Type::Aggregate` parameter or return.
pub fn resolve_signature(
    func: &Function,
    sig: &Signature,
    regs: &ConventionRegs,
) -> Result<ABISignature, AbiError> {
    let mut int_args = Cursor::new(regs.int_args);
    let mut float_args = Cursor::new(regs.float_args);
    let mut stack_arg_offset: i64 = 0;

    let mut args = Vec::with_capacity(sig.params.len());
    for param in &sig.params {
        let arg = classify_arg(
            func,
            param.value_type,
            param.extension,
            &mut int_args,
            &mut float_args,
            &mut stack_arg_offset,
            regs.indirect_arg_scratch,
        )?;
        args.push(arg);
    }

    let mut int_rets = Cursor::new(regs.int_rets);
    let mut float_rets = Cursor::new(regs.float_rets);
    let mut stack_ret_offset: i64 = 0;
    let mut rets = Vec::with_capacity(sig.returns.len());
    for ret in &sig.returns {
        let arg = classify_ret(
            func,
            ret.value_type,
            ret.extension,
            &mut int_rets,
            &mut float_rets,
            &mut stack_ret_offset,
            regs.indirect_ret_reg,
        )?;
        rets.push(arg);
    }

    Ok(ABISignature {
        args,
        rets,
        stack_arg_space: align_up(stack_arg_offset as u32, 16),
        stack_ret_space: align_up(stack_ret_offset as u32, 16),
        call_conv: sig.call_conv,
    })
}

fn classify_arg(
    func: &Function,
    ty: Type,
    extension: ArgumentExtension,
    int_args: &mut Cursor,
    float_args: &mut Cursor,
    stack_offset: &mut i64,
    indirect_scratch: PReg,
) -> Result<ABIArg, AbiError> {
    match ty {
        Type::Aggregate(idx) => {
            let layout = func.aggregate_layout(Type::Aggregate(idx));
            if layout.is_hfa() {
                if float_args.remaining() >= layout.fields.len() {
                    let slots = layout
                        .fields
                        .iter()
                        .map(|f| {
                            ABIArgSlot::Reg {
                                reg: float_args.take().unwrap(),
                                ty: f.ty,
                                extension: ArgumentExtension::None,
                            }
                        })
                        .collect();
                    return Ok(ABIArg { slots, indirect: false });
                }
                return Ok(spill_aggregate(layout.size, stack_offset, layout.align));
            }
            if layout.is_hva() {
                if float_args.remaining() >= layout.fields.len() {
                    let slots = layout
                        .fields
                        .iter()
                        .map(|f| ABIArgSlot::Reg {
                            reg: float_args.take().unwrap(),
                            ty: f.ty,
                            extension: ArgumentExtension::None,
                        })
                        .collect();
                    return Ok(ABIArg { slots, indirect: false });
                }
                return Ok(spill_aggregate(layout.size, stack_offset, layout.align));
            }
            if layout.size <= 16 {
                let chunks = (layout.size as usize + 7) / 8;
                if int_args.remaining() >= chunks {
                    let slots = (0..chunks)
                        .map(|_| ABIArgSlot::Reg {
                            reg: int_args.take().unwrap(),
                            ty: Type::Int(64),
                            extension: ArgumentExtension::None,
                        })
                        .collect();
                    return Ok(ABIArg { slots, indirect: false });
                }
                return Ok(spill_aggregate(layout.size, stack_offset, layout.align.max(8)));
            }
            // Oversized: caller allocates a stack copy, passes a pointer.
            let slot = if let Some(reg) = int_args.take() {
                ABIArgSlot::Reg { reg, ty: Type::Ptr, extension: ArgumentExtension::None }
            } else {
                let _ = indirect_scratch;
                let offset = *stack_offset;
                *stack_offset += 8;
                ABIArgSlot::Stack { offset, ty: Type::Ptr, extension: ArgumentExtension::None }
            };
            Ok(ABIArg { slots: SmallVec::from_slice(&[slot]), indirect: true })
        }
        t if t.is_float() || t.is_vector() => {
            let slot = if let Some(reg) = float_args.take() {
                ABIArgSlot::Reg { reg, ty: t, extension }
            } else {
                let offset = align_stack(stack_offset, 8);
                ABIArgSlot::Stack { offset, ty: t, extension }
            };
            Ok(ABIArg { slots: SmallVec::from_slice(&[slot]), indirect: false })
        }
        t => {
            let slot = if let Some(reg) = int_args.take() {
                ABIArgSlot::Reg { reg, ty: t, extension }
            } else {
                let offset = align_stack(stack_offset, 8);
                ABIArgSlot::Stack { offset, ty: t, extension }
            };
            Ok(ABIArg { slots: SmallVec::from_slice(&[slot]), indirect: false })
        }
    }
}

fn classify_ret(
    func: &Function,
    ty: Type,
    extension: ArgumentExtension,
    int_rets: &mut Cursor,
    float_rets: &mut Cursor,
    stack_offset: &mut i64,
    indirect_reg: PReg,
) -> Result<ABIArg, AbiError> {
    match ty {
        Type::Aggregate(idx) => {
            let layout = func.aggregate_layout(Type::Aggregate(idx));
            if (layout.is_hfa() || layout.is_hva()) && float_rets.remaining() >= layout.fields.len()
            {
                let slots = layout
                    .fields
                    .iter()
                    .map(|f| ABIArgSlot::Reg {
                        reg: float_rets.take().unwrap(),
                        ty: f.ty,
                        extension: ArgumentExtension::None,
                    })
                    .collect();
                return Ok(ABIArg { slots, indirect: false });
            }
            if layout.size <= 16 {
                let chunks = (layout.size as usize + 7) / 8;
                if int_rets.remaining() >= chunks {
                    let slots = (0..chunks)
                        .map(|_| ABIArgSlot::Reg {
                            reg: int_rets.take().unwrap(),
                            ty: Type::Int(64),
                            extension: ArgumentExtension::None,
                        })
                        .collect();
                    return Ok(ABIArg { slots, indirect: false });
                }
            }
            // Larger-than-register aggregate returns via the indirect
            // return-slot pointer register; the caller passed it in.
            Ok(ABIArg {
                slots: SmallVec::from_slice(&[ABIArgSlot::Reg {
                    reg: indirect_reg,
                    ty: Type::Ptr,
                    extension: ArgumentExtension::None,
                }]),
                indirect: true,
            })
        }
        t if t.is_float() || t.is_vector() => float_rets
            .take()
            .map(|reg| ABIArg {
                slots: SmallVec::from_slice(&[ABIArgSlot::Reg { reg, ty: t, extension }]),
                indirect: false,
            })
            .ok_or(CodegenError::TooManyReturns),
        t => {
            let _ = stack_offset;
            int_rets
                .take()
                .map(|reg| ABIArg {
                    slots: SmallVec::from_slice(&[ABIArgSlot::Reg { reg, ty: t, extension }]),
                    indirect: false,
                })
                .ok_or(CodegenError::TooManyReturns)
        }
    }
}

fn spill_aggregate(size: u32, stack_offset: &mut i64, align: u32) -> ABIArg {
    let offset = align_stack(stack_offset, align.max(8) as i64);
    *stack_offset = offset + size as i64;
    ABIArg {
        slots: SmallVec::from_slice(&[ABIArgSlot::Stack {
            offset,
            ty: Type::Int(64),
            extension: ArgumentExtension::None,
        }]),
        indirect: false,
    }
}

fn align_stack(offset: &mut i64, align: i64) -> i64 {
    let aligned = (*offset + align - 1) / align * align;
    *offset = aligned + 8;
    aligned
}

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

#[allow(unused)]
fn assert_reg_class(p: PReg, class: RegClass) {
    debug_assert_eq!(p.class(), class);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{AggregateField, AggregateLayout};
    use crate::ir::{CallConv, ExternalName, Signature};

    fn regs() -> ConventionRegs {
        static INT: [PReg; 8] = [
            PReg::new(RegClass::Int, 0),
            PReg::new(RegClass::Int, 1),
            PReg::new(RegClass::Int, 2),
            PReg::new(RegClass::Int, 3),
            PReg::new(RegClass::Int, 4),
            PReg::new(RegClass::Int, 5),
            PReg::new(RegClass::Int, 6),
            PReg::new(RegClass::Int, 7),
        ];
        static FLOAT: [PReg; 8] = [
            PReg::new(RegClass::Float, 0),
            PReg::new(RegClass::Float, 1),
            PReg::new(RegClass::Float, 2),
            PReg::new(RegClass::Float, 3),
            PReg::new(RegClass::Float, 4),
            PReg::new(RegClass::Float, 5),
            PReg::new(RegClass::Float, 6),
            PReg::new(RegClass::Float, 7),
        ];
        static INT_RETS: [PReg; 2] = [PReg::new(RegClass::Int, 0), PReg::new(RegClass::Int, 1)];
        static FLOAT_RETS: [PReg; 4] = [
            PReg::new(RegClass::Float, 0),
            PReg::new(RegClass::Float, 1),
            PReg::new(RegClass::Float, 2),
            PReg::new(RegClass::Float, 3),
        ];
        ConventionRegs {
            int_args: &INT,
            float_args: &FLOAT,
            int_rets: &INT_RETS,
            float_rets: &FLOAT_RETS,
            indirect_ret_reg: PReg::new(RegClass::Int, 8),
            indirect_arg_scratch: PReg::new(RegClass::Int, 9),
        }
    }

    /// S3: nine `i64` parameters under system-v — the first eight occupy
    /// the integer argument registers in order, the ninth spills to stack
    /// offset 0.
    #[test]
    fn nine_integer_params_spill_the_ninth_to_stack_offset_zero() {
        let mut sig = Signature::new(CallConv::SystemV);
        for _ in 0..9 {
            sig.params.push(crate::ir::AbiParam::new(Type::Int(64)));
        }
        let func = crate::ir::Function::new(ExternalName::User(0), sig.clone());
        let resolved = resolve_signature(&func, &sig, &regs()).expect("resolves");
        assert_eq!(resolved.args.len(), 9);
        for (i, arg) in resolved.args[0..8].iter().enumerate() {
            match arg.slots[0] {
                ABIArgSlot::Reg { reg, .. } => assert_eq!(reg, PReg::new(RegClass::Int, i as u8)),
                ABIArgSlot::Stack { .. } => panic!("param {i} should be in a register"),
            }
        }
        match resolved.args[8].slots[0] {
            ABIArgSlot::Stack { offset, .. } => assert_eq!(offset, 0),
            ABIArgSlot::Reg { .. } => panic!("ninth param should be on the stack"),
        }
        assert!(resolved.stack_arg_space > 0);
    }

    /// S4: a `{f32,f32,f32}` HFA parameter places its three fields in the
    /// first three float argument registers, one per field.
    #[test]
    fn hfa_param_fills_one_float_register_per_field() {
        let mut sig = Signature::new(CallConv::SystemV);
        let mut func = crate::ir::Function::new(ExternalName::User(0), sig.clone());
        let agg_ty = func.declare_aggregate(AggregateLayout::new(alloc::vec![
            AggregateField { ty: Type::Float(32), offset: 0 },
            AggregateField { ty: Type::Float(32), offset: 4 },
            AggregateField { ty: Type::Float(32), offset: 8 },
        ]));
        sig.params.push(crate::ir::AbiParam::new(agg_ty));
        func.signature = sig.clone();

        let resolved = resolve_signature(&func, &sig, &regs()).expect("resolves");
        assert_eq!(resolved.args.len(), 1);
        assert_eq!(resolved.args[0].slots.len(), 3);
        for (i, slot) in resolved.args[0].slots.iter().enumerate() {
            match *slot {
                ABIArgSlot::Reg { reg, ty, .. } => {
                    assert_eq!(reg, PReg::new(RegClass::Float, i as u8));
                    assert_eq!(ty, Type::Float(32));
                }
                ABIArgSlot::Stack { .. } => panic!("HFA field {i} should be in a register"),
            }
        }
    }

    /// A tenth and eleventh return value beyond the two integer return
    /// registers is `TooManyReturns` (no indirect return-slot path is
    /// declared for plain scalar over-returns).
    #[test]
    fn excess_scalar_returns_are_too_many_returns() {
        let mut sig = Signature::new(CallConv::SystemV);
        for _ in 0..3 {
            sig.returns.push(crate::ir::AbiParam::new(Type::Int(64)));
        }
        let func = crate::ir::Function::new(ExternalName::User(0), sig.clone());
        let err = resolve_signature(&func, &sig, &regs()).unwrap_err();
        assert!(matches!(err, CodegenError::TooManyReturns));
    }
}
