//! AArch64 System V unwind metadata: a Common Information Entry shared by
//! every function this core compiles, plus one Frame Description Entry per
//! function describing how to recover the caller's PC/SP/FP from any PC in
//! the function's body.
//!
//! Register numbers follow the AArch64 DWARF mapping: X0-X30 are 0-30, SP
//! is 31, V0-V31 (as D registers) are 64-95. The canonical frame address is
//! always expressed relative to the frame pointer once the prologue has run,
//! since this backend always establishes one.

use crate::machinst::buffer::CallSite;
use crate::regalloc::FrameLayout;
use crate::regs::{PReg, RegClass};
use gimli::write::{
    Address, CallFrameInstruction, CommonInformationEntry, EndianVec, FrameDescriptionEntry, FrameTable,
};
use gimli::{AArch64, Encoding, Format, LittleEndian, Register};

const CODE_ALIGNMENT_FACTOR: u64 = 4;
const DATA_ALIGNMENT_FACTOR: i64 = -8;
const RETURN_ADDRESS_REGISTER: Register = AArch64::X30;

fn dwarf_register(p: PReg) -> Register {
    match p.class() {
        RegClass::Int => Register(p.hw_enc() as u16),
        RegClass::Float | RegClass::Vector => Register(64 + p.hw_enc() as u16),
    }
}

/// Build the single CIE every function's FDE in this core references.
pub fn common_information_entry() -> CommonInformationEntry {
    let encoding = Encoding {
        format: Format::Dwarf32,
        version: 1,
        address_size: 8,
    };
    let mut cie = CommonInformationEntry::new(
        encoding,
        CODE_ALIGNMENT_FACTOR as u8,
        DATA_ALIGNMENT_FACTOR,
        RETURN_ADDRESS_REGISTER,
    );
    // At function entry, before the prologue runs, CFA = SP + 0.
    cie.add_instruction(CallFrameInstruction::Cfa(AArch64::SP, 0));
    cie
}

/// Build the FDE describing `frame`'s prologue/epilogue for one function,
/// whose code starts at `address` and spans `code_len` bytes.
///
/// The prologue this core emits always runs as a single fixed sequence (no
/// dynamic stack probing or variable-sized allocas), so one set of CFI
/// directives at a fixed offset into the function covers the whole body
/// after the prologue completes.
pub fn frame_description_entry(
    cie: &CommonInformationEntry,
    frame: &FrameLayout,
    address: Address,
    code_len: u64,
) -> FrameDescriptionEntry {
    let mut fde = FrameDescriptionEntry::new(address, code_len);

    if frame.frame_size > 0 {
        // After `stp fp, lr, [sp, #-frame_size]!`: CFA = old SP = new SP + frame_size.
        fde.add_instruction(0, CallFrameInstruction::CfaOffset(frame.frame_size as i32));
        fde.add_instruction(
            CODE_ALIGNMENT_FACTOR as u32,
            CallFrameInstruction::Offset(AArch64::X29, -(frame.frame_size as i64)),
        );
        fde.add_instruction(
            CODE_ALIGNMENT_FACTOR as u32,
            CallFrameInstruction::Offset(RETURN_ADDRESS_REGISTER, -(frame.frame_size as i64) + 8),
        );
        // After `mov fp, sp`: CFA tracks FP directly, independent of further
        // stack adjustments for callee-saves or locals.
        fde.add_instruction(
            2 * CODE_ALIGNMENT_FACTOR as u32,
            CallFrameInstruction::CfaRegister(AArch64::X29),
        );

        for (loc, reg, cfa_offset) in callee_save_cfi_offsets(&frame.used_callee_saves, frame.frame_size) {
            fde.add_instruction(loc, CallFrameInstruction::Offset(dwarf_register(reg), cfa_offset));
        }
    }

    fde
}

/// For each callee-save register, the `{pc offset, register, CFA-relative
/// offset}` its `Offset` CFI directive needs.
///
/// `emit_prologue` (abi.rs) emits the two fixed instructions above
/// (`stp fp, lr`, `mov fp, sp`) and then exactly one `stp`/`str` per
/// `chunks(2)` pair of `used_callee_saves`, in the same order. Both
/// registers of a pair become visible at the PC right after that single
/// store instruction, so pair `i`'s location is `3 + i` instructions in —
/// a constant location for every pair would claim a register saved by a
/// later `stp` is already on the stack before its own store has run.
fn callee_save_cfi_offsets(used_callee_saves: &[PReg], frame_size: u32) -> alloc::vec::Vec<(u32, PReg, i64)> {
    let mut out = alloc::vec::Vec::new();
    let mut stack_offset = 16i64;
    for (i, pair) in used_callee_saves.chunks(2).enumerate() {
        let loc = (3 + i as u32) * CODE_ALIGNMENT_FACTOR as u32;
        for reg in pair {
            out.push((loc, *reg, -(frame_size as i64) + stack_offset));
            stack_offset += 8;
        }
    }
    out
}

/// Build the CIE+FDE for one function and serialize them to System V
/// `.eh_frame` bytes, followed by a language-specific data area when the
/// function contains at least one `try_call`. The function's own code
/// address is unknown until it is placed in an executable mapping, so the
/// FDE is built relative to offset 0 and a caller relocates it (or
/// re-derives the FDE against the real load address) before publishing the
/// unwind section.
///
/// Per §4.10, the LSDA is not referenced through CFI augmentation data (no
/// `L` in the CIE's augmentation string — it stays the fixed `"zR"` this
/// core always emits); it is instead appended to the same byte sequence,
/// and a caller that wants to walk it does so by offset, the same way it
/// already locates the CIE/FDE pair.
pub fn unwind_bytes(frame: &FrameLayout, code_len: u64, call_sites: &[CallSite]) -> alloc::vec::Vec<u8> {
    let cie = common_information_entry();
    let fde = frame_description_entry(&cie, frame, Address::Constant(0), code_len);
    let mut table = FrameTable::default();
    let cie_id = table.add_cie(cie);
    table.add_fde(cie_id, fde);
    let mut writer = EndianVec::new(LittleEndian);
    table
        .write_eh_frame(&mut writer)
        .expect("in-memory EndianVec write cannot fail");
    let mut bytes = writer.into_vec();
    if !call_sites.is_empty() {
        bytes.extend_from_slice(&encode_lsda(call_sites));
    }
    bytes
}

/// Encode a call-site table in the call-instruction's length (always 4,
/// since every try-call here lowers to a single `BL`) keyed on the call's
/// own start offset, not the return address `CallSite` records.
///
/// Format, modeled on the Itanium C++ ABI LSDA (GCC_except_table) but
/// simplified for this core's single-action (catch-all, no type table)
/// exception model: a 3-byte header of encoding bytes (`@LPStart`,
/// `@TType`, call-site-table encoding — all `DW_EH_PE_omit`/`udata4`),
/// a ULEB128 call-site-table length, then one fixed-width record per
/// try-call: `{start: u32, length: u32, landing_pad: u32, action: uleb128}`.
fn encode_lsda(call_sites: &[CallSite]) -> alloc::vec::Vec<u8> {
    const CALL_INSN_LEN: u32 = 4;
    const DW_EH_PE_OMIT: u8 = 0xff;
    const DW_EH_PE_UDATA4: u8 = 0x03;

    let mut table = alloc::vec::Vec::new();
    for cs in call_sites {
        let start = cs.ret_offset - CALL_INSN_LEN;
        table.extend_from_slice(&start.to_le_bytes());
        table.extend_from_slice(&CALL_INSN_LEN.to_le_bytes());
        table.extend_from_slice(&cs.landing_pad_offset.to_le_bytes());
        write_uleb128(&mut table, 0); // action: no cleanup/catch filtering
    }

    let mut out = alloc::vec::Vec::with_capacity(3 + 5 + table.len());
    out.push(DW_EH_PE_OMIT); // @LPStart encoding: omit, implying function start
    out.push(DW_EH_PE_OMIT); // @TType encoding: omit, no type table
    out.push(DW_EH_PE_UDATA4); // call-site table entry encoding
    write_uleb128(&mut out, table.len() as u64);
    out.extend_from_slice(&table);
    out
}

fn write_uleb128(out: &mut alloc::vec::Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::inst::regs::xreg;

    #[test]
    fn one_pair_uses_a_single_location() {
        let saves = [xreg(19), xreg(20)];
        let offsets = callee_save_cfi_offsets(&saves, 32);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0].0, 3 * CODE_ALIGNMENT_FACTOR as u32);
        assert_eq!(offsets[1].0, offsets[0].0, "both registers of one stp share its location");
        assert_eq!(offsets[0].2, -32 + 16);
        assert_eq!(offsets[1].2, -32 + 24);
    }

    #[test]
    fn second_pair_is_recorded_one_instruction_later() {
        // Four callee-saves: two `stp` pairs, so the second pair's save is
        // not visible until one more instruction than the first pair's.
        let saves = [xreg(19), xreg(20), xreg(21), xreg(22)];
        let offsets = callee_save_cfi_offsets(&saves, 48);

        let first_pair_loc = offsets[0].0;
        let second_pair_loc = offsets[2].0;
        assert_eq!(offsets[1].0, first_pair_loc);
        assert_eq!(offsets[3].0, second_pair_loc);
        assert_eq!(
            second_pair_loc,
            first_pair_loc + CODE_ALIGNMENT_FACTOR as u32,
            "the second stp is one instruction after the first, not at the same fixed location"
        );

        assert_eq!(offsets[2].2, -48 + 32);
        assert_eq!(offsets[3].2, -48 + 40);
    }

    #[test]
    fn odd_tail_register_gets_its_own_later_location() {
        let saves = [xreg(19), xreg(20), xreg(21)];
        let offsets = callee_save_cfi_offsets(&saves, 48);
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[2].0, offsets[0].0 + CODE_ALIGNMENT_FACTOR as u32);
    }
}
