//! AArch64 encoders: one 32-bit little-endian word per
//! instruction arm, following the ARM Architecture Reference Manual bit
//! layouts for each form used by [`super::inst::Inst`].

use super::inst::{AMode, Cond, Inst, OperandSize};
use crate::machinst::buffer::{LabelUseKind, MachBuffer, MachLabel};
use crate::machinst::vcode::VCodeBlock;
use crate::regs::Reg;

fn enc_reg(r: Reg) -> u32 {
    r.as_physical().expect("operand must be a physical register at emission time").hw_enc() as u32
}

/// Emit one instruction's bytes (and any fix-ups/traps it records) into
/// `buf`. Branches target a `VCodeBlock`; `block_labels` is the label the
/// caller bound for each block (one `MachBuffer::get_label` per block,
/// allocated before emission starts) so a forward reference can still
/// record a fix-up before the target block's offset is known.
pub fn emit_inst(inst: &Inst, buf: &mut MachBuffer, block_labels: &[MachLabel]) {
    let label_for = |b: VCodeBlock| block_labels[b.0 as usize];
    match *inst {
        Inst::AddRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b0001011000, size, enc_reg(rm), 0, enc_reg(rn), enc_reg(rd)))
        }
        Inst::SubRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b1001011000, size, enc_reg(rm), 0, enc_reg(rn), enc_reg(rd)))
        }
        Inst::AddImm { size, rd, rn, imm12 } => {
            buf.put4(add_sub_imm(0, size, imm12, enc_reg(rn), enc_reg(rd)))
        }
        Inst::SubImm { size, rd, rn, imm12 } => {
            buf.put4(add_sub_imm(1, size, imm12, enc_reg(rn), enc_reg(rd)))
        }
        Inst::MulRR { size, rd, rn, rm } => {
            buf.put4(data_proc_3src(0b0011011000, size, enc_reg(rm), 0b11111, enc_reg(rn), enc_reg(rd)))
        }
        Inst::SDivRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b0001010110, size, enc_reg(rm), 0b000011, enc_reg(rn), enc_reg(rd)))
        }
        Inst::UDivRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b0001010110, size, enc_reg(rm), 0b000010, enc_reg(rn), enc_reg(rd)))
        }
        Inst::AndRR { size, rd, rn, rm } => {
            buf.put4(logical_shifted(0b00, size, enc_reg(rm), enc_reg(rn), enc_reg(rd)))
        }
        Inst::OrrRR { size, rd, rn, rm } => {
            buf.put4(logical_shifted(0b01, size, enc_reg(rm), enc_reg(rn), enc_reg(rd)))
        }
        Inst::EorRR { size, rd, rn, rm } => {
            buf.put4(logical_shifted(0b10, size, enc_reg(rm), enc_reg(rn), enc_reg(rd)))
        }
        Inst::LslRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b0001010110, size, enc_reg(rm), 0b001000, enc_reg(rn), enc_reg(rd)))
        }
        Inst::LsrRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b0001010110, size, enc_reg(rm), 0b001001, enc_reg(rn), enc_reg(rd)))
        }
        Inst::AsrRR { size, rd, rn, rm } => {
            buf.put4(data_proc_2src(0b0001010110, size, enc_reg(rm), 0b001010, enc_reg(rn), enc_reg(rd)))
        }
        Inst::MvnRR { size, rd, rn } => buf.put4(logical_shifted(0b01, size, enc_reg(rn), 0b11111, enc_reg(rd))),
        Inst::NegRR { size, rd, rn } => {
            buf.put4(data_proc_2src(0b1001011000, size, enc_reg(rn), 0, 0b11111, enc_reg(rd)))
        }
        Inst::ClzRR { size, rd, rn } => {
            let sf = size.sf_bit();
            buf.put4((sf << 31) | 0b1_0_0_11010110_00000_00010_0 << 10 | (enc_reg(rn) << 5) | enc_reg(rd))
        }
        Inst::RbitRR { size, rd, rn } => {
            let sf = size.sf_bit();
            buf.put4((sf << 31) | 0b1_0_0_11010110_00000_00000_0 << 10 | (enc_reg(rn) << 5) | enc_reg(rd))
        }
        Inst::MovRR { size, rd, rn } => {
            // `MOV Xd, Xn` is an alias for `ORR Xd, XZR, Xn`.
            buf.put4(logical_shifted(0b01, size, enc_reg(rn), 0b11111, enc_reg(rd)))
        }
        Inst::MovZ { size, rd, imm16, shift } => buf.put4(movewide(0b10, size, imm16, shift, enc_reg(rd))),
        Inst::MovN { size, rd, imm16, shift } => buf.put4(movewide(0b00, size, imm16, shift, enc_reg(rd))),
        Inst::MovK { size, rd, imm16, shift } => buf.put4(movewide(0b11, size, imm16, shift, enc_reg(rd))),

        Inst::Ldr { size, rd, mem } => emit_load_store(buf, 0b1, size_bits(size), &mem, enc_reg(rd)),
        Inst::Str { size, rd, mem } => emit_load_store(buf, 0b0, size_bits(size), &mem, enc_reg(rd)),
        Inst::LdrB { rd, mem } => emit_load_store(buf, 0b1, 0b00, &mem, enc_reg(rd)),
        Inst::StrB { rd, mem } => emit_load_store(buf, 0b0, 0b00, &mem, enc_reg(rd)),
        Inst::LdrH { rd, mem } => emit_load_store(buf, 0b1, 0b01, &mem, enc_reg(rd)),
        Inst::StrH { rd, mem } => emit_load_store(buf, 0b0, 0b01, &mem, enc_reg(rd)),
        Inst::LdrSB { size, rd, mem } => emit_load_store(buf, 0b11 - size.sf_bit(), 0b00, &mem, enc_reg(rd)),
        Inst::LdrSH { size, rd, mem } => emit_load_store(buf, 0b11 - size.sf_bit(), 0b01, &mem, enc_reg(rd)),
        Inst::LdrSW { rd, mem } => emit_load_store(buf, 0b10, 0b10, &mem, enc_reg(rd)),

        Inst::Ldp { size, rt, rt2, mem } => emit_load_store_pair(buf, 1, size, &mem, enc_reg(rt), enc_reg(rt2)),
        Inst::Stp { size, rt, rt2, mem } => emit_load_store_pair(buf, 0, size, &mem, enc_reg(rt), enc_reg(rt2)),

        Inst::FAddRR { rd, rn, rm, is_64 } => buf.put4(fp_2src(0b0010, is_64, enc_reg(rm), enc_reg(rn), enc_reg(rd))),
        Inst::FSubRR { rd, rn, rm, is_64 } => buf.put4(fp_2src(0b0011, is_64, enc_reg(rm), enc_reg(rn), enc_reg(rd))),
        Inst::FMulRR { rd, rn, rm, is_64 } => buf.put4(fp_2src(0b0000, is_64, enc_reg(rm), enc_reg(rn), enc_reg(rd))),
        Inst::FDivRR { rd, rn, rm, is_64 } => buf.put4(fp_2src(0b0001, is_64, enc_reg(rm), enc_reg(rn), enc_reg(rd))),
        Inst::FNegRR { rd, rn, is_64 } => buf.put4(fp_1src(0b000010, is_64, enc_reg(rn), enc_reg(rd))),
        Inst::FAbsRR { rd, rn, is_64 } => buf.put4(fp_1src(0b000001, is_64, enc_reg(rn), enc_reg(rd))),
        Inst::FSqrtRR { rd, rn, is_64 } => buf.put4(fp_1src(0b000011, is_64, enc_reg(rn), enc_reg(rd))),
        Inst::FMovRR { rd, rn, is_64 } => buf.put4(fp_1src(0b000000, is_64, enc_reg(rn), enc_reg(rd))),
        Inst::FCmpRR { rn, rm, is_64 } => buf.put4(fp_compare(is_64, enc_reg(rm), enc_reg(rn))),

        Inst::CmpRR { size, rn, rm } => buf.put4(data_proc_2src(0b1101011000, size, enc_reg(rm), 0, enc_reg(rn), 0b11111)),
        Inst::CmpImm { size, rn, imm12 } => buf.put4(add_sub_imm(1, size, imm12, enc_reg(rn), 0b11111) | (1 << 29)),
        Inst::CSel { size, rd, rn, rm, cond } => buf.put4(csel(0b00, size, enc_reg(rm), cond, enc_reg(rn), enc_reg(rd))),
        Inst::CSet { size, rd, cond } => {
            buf.put4(csel(0b00, size, 0b11111, cond.invert(), 0b11111, enc_reg(rd)) | (1 << 10))
        }

        Inst::Jump { target } => {
            let off = buf.cur_offset();
            buf.put4(0b0_00101_000000_0000000000000000000);
            buf.use_label_at_offset(off, label_for(target), LabelUseKind::Branch26);
        }
        Inst::CondBr { cond, target } => {
            let off = buf.cur_offset();
            buf.put4(0b0101010_0_0000000000000000000_0_0000 | cond.bits());
            buf.use_label_at_offset(off, label_for(target), LabelUseKind::Cond19);
        }
        Inst::Cbz { size, rn, target } => {
            let off = buf.cur_offset();
            buf.put4((size.sf_bit() << 31) | 0b011010_0 << 24 | enc_reg(rn));
            buf.use_label_at_offset(off, label_for(target), LabelUseKind::Cond19);
        }
        Inst::Cbnz { size, rn, target } => {
            let off = buf.cur_offset();
            buf.put4((size.sf_bit() << 31) | 0b011010_1 << 24 | enc_reg(rn));
            buf.use_label_at_offset(off, label_for(target), LabelUseKind::Cond19);
        }

        Inst::Call { ref callee, exception_successor, .. } => {
            let off = buf.cur_offset();
            buf.put4(0b100101_00000000000000000000000000);
            let name = match callee {
                crate::ir::ExternalName::Symbol(s) => s.clone(),
                crate::ir::ExternalName::User(n) => alloc::format!("user{n}"),
                crate::ir::ExternalName::LibCall(_) => alloc::string::String::from("libcall"),
            };
            buf.add_reloc(off, crate::machinst::buffer::RelocKind::Aarch64Call26, &name, 0);
            if let Some(landing_pad_block) = exception_successor {
                let ret_offset = buf.cur_offset();
                buf.add_call_site(ret_offset, label_for(landing_pad_block));
            }
        }
        Inst::CallIndirect { callee, .. } => {
            buf.put4(0b1101011_0_0_01_11111_0000_0_0 << 10 | (enc_reg(callee) << 5))
        }
        Inst::Ret => buf.put4(0b1101011_0_0_10_11111_0000_0_0 << 10 | (30 << 5)),

        Inst::Udf { code } => {
            let off = buf.cur_offset();
            buf.put4(0b00000000_00000000_00000000_00000000); // BRK #0
            buf.add_trap(off, code);
        }
        Inst::TrapIf { cond, code } => {
            // B.<inverted cond> over a BRK: traps only when `cond` holds.
            buf.put4(0b0101010_0 << 24 | (2 << 5) | cond.invert().bits());
            let off = buf.cur_offset();
            buf.put4(0);
            buf.add_trap(off, code);
        }

        Inst::Dmb => buf.put4(0b1101010100_00_0_011_0011_1111_101_11111),
        Inst::Nop => buf.put4(0b1101010100_0_00_011_0010_0000_000_11111),
        Inst::FrameSetup | Inst::FrameDestroy => {
            // Expanded by the prologue/epilogue pass before emission; a
            // leftover marker at this point is a pipeline bug.
            unreachable!("frame markers must be expanded before emission")
        }
    }
}

fn size_bits(size: OperandSize) -> u32 {
    match size {
        OperandSize::Size32 => 0b10,
        OperandSize::Size64 => 0b11,
    }
}

fn data_proc_2src(base: u32, size: OperandSize, rm: u32, extra: u32, rn: u32, rd: u32) -> u32 {
    (size.sf_bit() << 31) | (base << 21) | (rm << 16) | (extra << 10) | (rn << 5) | rd
}

fn data_proc_3src(base: u32, size: OperandSize, rm: u32, ra: u32, rn: u32, rd: u32) -> u32 {
    (size.sf_bit() << 31) | (base << 21) | (rm << 16) | (ra << 10) | (rn << 5) | rd
}

fn add_sub_imm(op: u32, size: OperandSize, imm12: u16, rn: u32, rd: u32) -> u32 {
    (size.sf_bit() << 31) | (op << 30) | (0b10001 << 24) | ((imm12 as u32 & 0xfff) << 10) | (rn << 5) | rd
}

fn logical_shifted(opc: u32, size: OperandSize, rm: u32, rn: u32, rd: u32) -> u32 {
    (size.sf_bit() << 31) | (opc << 29) | (0b01010 << 24) | (rm << 16) | (rn << 5) | rd
}

fn movewide(opc: u32, size: OperandSize, imm16: u16, shift: u8, rd: u32) -> u32 {
    let hw = (shift / 16) as u32 & 0b11;
    (size.sf_bit() << 31) | (opc << 29) | (0b100101 << 23) | (hw << 21) | ((imm16 as u32) << 5) | rd
}

fn csel(op: u32, size: OperandSize, rm: u32, cond: Cond, rn: u32, rd: u32) -> u32 {
    (size.sf_bit() << 31) | (op << 30) | (0b11010100 << 21) | (rm << 16) | (cond.bits() << 12) | (rn << 5) | rd
}

fn fp_2src(opc: u32, is_64: bool, rm: u32, rn: u32, rd: u32) -> u32 {
    let ty = if is_64 { 1 } else { 0 };
    (0b00011110 << 24) | (ty << 22) | (1 << 21) | (rm << 16) | (opc << 12) | (0b10 << 10) | (rn << 5) | rd
}

fn fp_1src(opc: u32, is_64: bool, rn: u32, rd: u32) -> u32 {
    let ty = if is_64 { 1 } else { 0 };
    (0b00011110 << 24) | (ty << 22) | (1 << 21) | (opc << 15) | (0b10000 << 10) | (rn << 5) | rd
}

fn fp_compare(is_64: bool, rm: u32, rn: u32) -> u32 {
    let ty = if is_64 { 1 } else { 0 };
    (0b00011110 << 24) | (ty << 22) | (1 << 21) | (rm << 16) | (0b001000 << 10) | (rn << 5)
}

fn emit_load_store(buf: &mut MachBuffer, l: u32, size: u32, mem: &AMode, rt: u32) {
    match *mem {
        AMode::RegOffset { base, offset } => {
            debug_assert_eq!(offset % 8, 0, "unscaled offsets need the LDUR/STUR form, not yet emitted here");
            let imm12 = (offset / 8) as u32 & 0xfff;
            buf.put4((size << 30) | (0b111_0_01 << 24) | (l << 22) | (imm12 << 10) | (enc_reg(base) << 5) | rt)
        }
        AMode::RegReg { base, index } => buf.put4(
            (size << 30) | (0b111_0_00 << 24) | (l << 22) | (1 << 21) | (enc_reg(index) << 16) | (0b011 << 13) | (1 << 12) | (0b10 << 10) | (enc_reg(base) << 5) | rt,
        ),
        AMode::PreIndexed { base, offset } => buf.put4(
            (size << 30) | (0b111_0_00 << 24) | (l << 22) | (((offset as u32) & 0x1ff) << 12) | (0b11 << 10) | (enc_reg(base) << 5) | rt,
        ),
        AMode::PostIndexed { base, offset } => buf.put4(
            (size << 30) | (0b111_0_00 << 24) | (l << 22) | (((offset as u32) & 0x1ff) << 12) | (0b01 << 10) | (enc_reg(base) << 5) | rt,
        ),
        AMode::SpillSlot { .. } | AMode::StackSlot { .. } => {
            unreachable!("frame-relative address modes are resolved to RegOffset(FP) before emission")
        }
    }
}

fn emit_load_store_pair(buf: &mut MachBuffer, l: u32, size: OperandSize, mem: &AMode, rt: u32, rt2: u32) {
    let opc = if matches!(size, OperandSize::Size64) { 0b10 } else { 0b00 };
    match *mem {
        AMode::RegOffset { base, offset } => {
            let scale = if matches!(size, OperandSize::Size64) { 8 } else { 4 };
            let imm7 = ((offset / scale) as u32) & 0x7f;
            buf.put4((opc << 30) | (0b101_0_010 << 23) | (l << 22) | (imm7 << 15) | (rt2 << 10) | (enc_reg(base) << 5) | rt)
        }
        AMode::PreIndexed { base, offset } => {
            let scale = if matches!(size, OperandSize::Size64) { 8 } else { 4 };
            let imm7 = ((offset / scale) as u32) & 0x7f;
            buf.put4((opc << 30) | (0b101_0_011 << 23) | (l << 22) | (imm7 << 15) | (rt2 << 10) | (enc_reg(base) << 5) | rt)
        }
        AMode::PostIndexed { base, offset } => {
            let scale = if matches!(size, OperandSize::Size64) { 8 } else { 4 };
            let imm7 = ((offset / scale) as u32) & 0x7f;
            buf.put4((opc << 30) | (0b101_0_001 << 23) | (l << 22) | (imm7 << 15) | (rt2 << 10) | (enc_reg(base) << 5) | rt)
        }
        _ => unreachable!("LDP/STP only use register-offset forms in this backend"),
    }
}
