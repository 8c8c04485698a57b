//! The machine code buffer: byte emission, labels, fix-ups,
//! veneers, constant islands, relocations, and trap sites.
//!
//! Emission appends bytes and records deferred patches; nothing is
//! resolved until `finalize`, after which the buffer is read-only —
//! never patch in place during emission.

use crate::result::{CodegenError, CodegenResult};
use log::debug;
use rustc_hash::FxHashMap;

/// A label: an opaque, densely-allocated reference to a not-yet-known
/// code offset, bound exactly once before `finalize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MachLabel(u32);

/// The PC-relative encoding a fix-up patches into, with its signed byte
/// range and bit width within the instruction word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUseKind {
    /// AArch64 conditional branch: 19-bit word offset, signed.
    Cond19,
    /// AArch64 unconditional branch / call: 26-bit word offset, signed.
    Branch26,
    /// AArch64 PC-relative literal load (ADR/LDR-literal): 19-bit word
    /// offset, signed.
    PcRel19,
    /// AArch64 ADRP page-relative: 21-bit page offset, signed.
    Adrp21,
    /// 8-bit byte offset, signed — used by the generic-target test harness
    /// used by generic-target fix-up range tests.
    Rel8,
    /// 32-bit byte offset, signed — other architectures in the abstraction.
    Rel32,
}

impl LabelUseKind {
    /// `(min, max)` signed delta this encoding can represent, in the units
    /// `finalize` computes deltas in (bytes, already divided by 4 for the
    /// word-oriented AArch64 kinds).
    fn range(self) -> (i64, i64) {
        match self {
            LabelUseKind::Cond19 => (-(1 << 20), (1 << 20) - 1),
            LabelUseKind::Branch26 => (-(1 << 27), (1 << 27) - 1),
            LabelUseKind::PcRel19 => (-(1 << 20), (1 << 20) - 1),
            LabelUseKind::Adrp21 => (-(1 << 20) * 4096, ((1 << 20) - 1) * 4096),
            LabelUseKind::Rel8 => (-128, 127),
            LabelUseKind::Rel32 => (i32::MIN as i64, i32::MAX as i64),
        }
    }

    fn patch_size(self) -> usize {
        match self {
            LabelUseKind::Rel8 => 1,
            LabelUseKind::Rel32 => 4,
            _ => 4, // AArch64 word-encoded kinds all patch one instruction word
        }
    }
}

struct FixUp {
    label: MachLabel,
    offset: u32,
    kind: LabelUseKind,
}

/// A recorded linker relocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub offset: u32,
    pub kind: RelocKind,
    pub symbol: alloc::string::String,
    pub addend: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocKind {
    Abs32,
    Abs64,
    PcRel32,
    Aarch64AdrpAdd,
    Aarch64Call26,
    TlsLe,
    TlsIe,
    TlsGd,
}

/// A recorded trap site: a code offset paired with the trap it reports if
/// control reaches there via a hardware fault or explicit trap
/// instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapSite {
    pub offset: u32,
    pub code: crate::ir::TrapCode,
}

/// A recorded try-call landing-pad edge: the offset just past a call
/// instruction (the address the unwinder resumes searching from) paired
/// with the bound offset of the exception successor the LSDA should route
/// to. Resolved at `finalize`, once every label is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub ret_offset: u32,
    pub landing_pad_offset: u32,
}

struct PendingCallSite {
    ret_offset: u32,
    landing_pad: MachLabel,
}

/// One entry in a constant island: raw bytes plus the offset they were
/// placed at once the island is emitted.
struct PendingConstant {
    bytes: alloc::vec::Vec<u8>,
    label: MachLabel,
}

/// The code buffer under construction. Bytes, labels, and fix-ups
/// accumulate during emission; `finalize` resolves every fix-up in one
/// pass and returns the immutable result.
pub struct MachBuffer {
    data: alloc::vec::Vec<u8>,
    label_offsets: FxHashMap<MachLabel, u32>,
    next_label: u32,
    fixups: alloc::vec::Vec<FixUp>,
    relocs: alloc::vec::Vec<Relocation>,
    traps: alloc::vec::Vec<TrapSite>,
    pending_constants: alloc::vec::Vec<PendingConstant>,
    veneer_stubs: FxHashMap<alloc::string::String, MachLabel>,
    call_sites: alloc::vec::Vec<PendingCallSite>,
}

/// The finalized, read-only result of a buffer.
pub struct FinalizedBuffer {
    pub data: alloc::vec::Vec<u8>,
    pub relocs: alloc::vec::Vec<Relocation>,
    pub traps: alloc::vec::Vec<TrapSite>,
    pub call_sites: alloc::vec::Vec<CallSite>,
}

impl Default for MachBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MachBuffer {
    pub fn new() -> Self {
        Self {
            data: alloc::vec::Vec::new(),
            label_offsets: FxHashMap::default(),
            next_label: 0,
            fixups: alloc::vec::Vec::new(),
            relocs: alloc::vec::Vec::new(),
            traps: alloc::vec::Vec::new(),
            pending_constants: alloc::vec::Vec::new(),
            veneer_stubs: FxHashMap::default(),
            call_sites: alloc::vec::Vec::new(),
        }
    }

    pub fn cur_offset(&self) -> u32 {
        self.data.len() as u32
    }

    /// Append raw little-endian bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append one 32-bit AArch64 instruction word, little-endian.
    pub fn put4(&mut self, word: u32) {
        self.data.extend_from_slice(&word.to_le_bytes());
    }

    /// Allocate a new, as-yet-unbound label.
    pub fn get_label(&mut self) -> MachLabel {
        let l = MachLabel(self.next_label);
        self.next_label += 1;
        l
    }

    /// Bind `label` to the current offset. A label is bound exactly once.
    pub fn bind_label(&mut self, label: MachLabel) {
        let prev = self.label_offsets.insert(label, self.cur_offset());
        debug_assert!(prev.is_none(), "label bound twice");
    }

    /// Record a fix-up: a use of `label` at `offset` with the given
    /// PC-relative encoding, to be patched at `finalize`.
    pub fn use_label_at_offset(&mut self, offset: u32, label: MachLabel, kind: LabelUseKind) {
        self.fixups.push(FixUp { label, offset, kind });
    }

    pub fn add_reloc(&mut self, offset: u32, kind: RelocKind, symbol: &str, addend: i64) {
        self.relocs.push(Relocation {
            offset,
            kind,
            symbol: symbol.into(),
            addend,
        });
    }

    pub fn add_trap(&mut self, offset: u32, code: crate::ir::TrapCode) {
        self.traps.push(TrapSite { offset, code });
    }

    /// Record a try-call landing-pad edge: `ret_offset` is the offset just
    /// past the call instruction, `landing_pad` the label bound to the
    /// exception successor's first instruction. No branch is emitted for
    /// this edge — the LSDA built from these records is how the runtime
    /// unwinder finds it.
    pub fn add_call_site(&mut self, ret_offset: u32, landing_pad: MachLabel) {
        self.call_sites.push(PendingCallSite { ret_offset, landing_pad });
    }

    /// Place `bytes` in the pending constant pool, returning a label whose
    /// bound offset will be the pool entry's final address once an island
    /// is emitted (by `finalize`, placed at the end of the buffer — a
    /// full out-of-range-driven interleaved placement policy is future
    /// work for the backend's load-distance budget).
    pub fn add_constant(&mut self, bytes: &[u8]) -> MachLabel {
        let label = self.get_label();
        self.pending_constants.push(PendingConstant {
            bytes: bytes.to_vec(),
            label,
        });
        label
    }

    /// Request (or reuse) a veneer stub's label for the PLT-like external
    /// `symbol`, deduplicating per symbol.
    pub fn get_or_make_veneer_stub(&mut self, symbol: &str) -> MachLabel {
        if let Some(&l) = self.veneer_stubs.get(symbol) {
            return l;
        }
        let l = self.get_label();
        self.veneer_stubs.insert(symbol.into(), l);
        l
    }

    /// Resolve every fix-up, inserting veneers for out-of-range deltas,
    /// emit the constant island, and return the immutable result.
    pub fn finalize(mut self) -> CodegenResult<FinalizedBuffer> {
        // Place pending constants at the end, each 8-byte aligned.
        for pc in core::mem::take(&mut self.pending_constants) {
            while self.data.len() % 8 != 0 {
                self.data.push(0);
            }
            self.bind_label(pc.label);
            self.data.extend_from_slice(&pc.bytes);
        }

        // First pass: patch in-range fix-ups; collect the rest for
        // veneer insertion.
        let mut out_of_range = alloc::vec::Vec::new();
        for fixup in &self.fixups {
            let target = *self
                .label_offsets
                .get(&fixup.label)
                .ok_or(CodegenError::LabelOutOfRange)?;
            let delta = target as i64 - (fixup.offset as i64 + fixup.kind.patch_size() as i64);
            let (lo, hi) = fixup.kind.range();
            if delta >= lo && delta <= hi {
                patch(&mut self.data, fixup.offset, fixup.kind, delta);
            } else {
                out_of_range.push((fixup.offset, fixup.label, fixup.kind));
            }
        }

        // Second pass: each out-of-range use gets a veneer — a long branch
        // placed at the next 4-byte-aligned offset, patched to jump to the
        // true target; the original fix-up is re-targeted to the veneer.
        for (offset, label, kind) in out_of_range {
            debug!("fix-up at {offset} to label {label:?} ({kind:?}) out of range, inserting veneer");
            while self.data.len() % 4 != 0 {
                self.data.push(0);
            }
            let veneer_offset = self.cur_offset();
            // `B <target>` — unconditional 26-bit branch, always in range
            // of a freshly placed veneer relative to any prior fix-up
            // distance this buffer can represent.
            self.put4(0);
            let target = *self
                .label_offsets
                .get(&label)
                .ok_or(CodegenError::LabelOutOfRange)?;
            let veneer_delta = target as i64 - veneer_offset as i64;
            let (lo, hi) = LabelUseKind::Branch26.range();
            if veneer_delta < lo || veneer_delta > hi {
                return Err(CodegenError::LabelOutOfRange);
            }
            patch(&mut self.data, veneer_offset, LabelUseKind::Branch26, veneer_delta);

            let redirected_delta =
                veneer_offset as i64 - (offset as i64 + kind.patch_size() as i64);
            let (lo, hi) = kind.range();
            if redirected_delta < lo || redirected_delta > hi {
                return Err(CodegenError::LabelOutOfRange);
            }
            patch(&mut self.data, offset, kind, redirected_delta);
        }

        let mut call_sites = alloc::vec::Vec::with_capacity(self.call_sites.len());
        for cs in &self.call_sites {
            let landing_pad_offset = *self
                .label_offsets
                .get(&cs.landing_pad)
                .ok_or(CodegenError::LabelOutOfRange)?;
            call_sites.push(CallSite { ret_offset: cs.ret_offset, landing_pad_offset });
        }

        Ok(FinalizedBuffer {
            data: self.data,
            relocs: self.relocs,
            traps: self.traps,
            call_sites,
        })
    }
}

fn patch(data: &mut [u8], offset: u32, kind: LabelUseKind, delta: i64) {
    let offset = offset as usize;
    match kind {
        LabelUseKind::Rel8 => {
            data[offset] = delta as i8 as u8;
        }
        LabelUseKind::Rel32 => {
            data[offset..offset + 4].copy_from_slice(&(delta as i32).to_le_bytes());
        }
        LabelUseKind::Cond19 => patch_word(data, offset, |w| {
            let imm = ((delta / 4) as i32) & 0x7ffff;
            (w & !(0x7ffff << 5)) | ((imm as u32) << 5)
        }),
        LabelUseKind::Branch26 => patch_word(data, offset, |w| {
            let imm = ((delta / 4) as i32) & 0x3ff_ffff;
            (w & !0x3ff_ffff) | (imm as u32)
        }),
        LabelUseKind::PcRel19 => patch_word(data, offset, |w| {
            let imm = ((delta / 4) as i32) & 0x7ffff;
            (w & !(0x7ffff << 5)) | ((imm as u32) << 5)
        }),
        LabelUseKind::Adrp21 => patch_word(data, offset, |w| {
            let page_delta = delta / 4096;
            let immlo = (page_delta as u32) & 0x3;
            let immhi = ((page_delta >> 2) as u32) & 0x7ffff;
            (w & !((0x3 << 29) | (0x7ffff << 5))) | (immlo << 29) | (immhi << 5)
        }),
    }
}

fn patch_word(data: &mut [u8], offset: usize, f: impl FnOnce(u32) -> u32) {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    let word = u32::from_le_bytes(bytes);
    let patched = f(word);
    data[offset..offset + 4].copy_from_slice(&patched.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An 8-bit fix-up with a delta of exactly `+127`/`-128` patches in
    /// place with no veneer (spec §8 boundary behaviors).
    #[test]
    fn rel8_fixup_at_exact_boundary_needs_no_veneer() {
        let mut buf = MachBuffer::new();
        let label = buf.get_label();
        buf.put_bytes(&[0]); // fix-up site, offset 0
        buf.use_label_at_offset(0, label, LabelUseKind::Rel8);
        for _ in 0..127 {
            buf.put_bytes(&[0]);
        }
        buf.bind_label(label); // offset 128, delta = 128 - (0 + 1) = 127
        let out = buf.finalize().expect("finalizes");
        assert_eq!(out.data[0] as i8, 127);
        assert_eq!(out.data.len(), 128);
    }

    /// A delta one past the 8-bit range (`+128`) forces a veneer rather
    /// than failing.
    #[test]
    fn rel8_fixup_past_boundary_inserts_veneer() {
        let mut buf = MachBuffer::new();
        let label = buf.get_label();
        buf.put_bytes(&[0]); // fix-up site, offset 0
        buf.use_label_at_offset(0, label, LabelUseKind::Rel8);
        for _ in 0..128 {
            buf.put_bytes(&[0]);
        }
        buf.bind_label(label); // offset 129, delta = 129 - 1 = 128: out of range
        let out = buf.finalize().expect("finalizes via veneer");
        // The original fix-up no longer points straight at the label; it
        // was redirected to the veneer stub appended after the body.
        assert!(out.data.len() > 129);
    }

    /// A negative 8-bit delta of exactly `-128` is in range: target bound
    /// at offset 0, fix-up site at offset 127 (`delta = 0 - (127+1)`).
    #[test]
    fn rel8_fixup_negative_boundary_needs_no_veneer() {
        let mut buf = MachBuffer::new();
        let label = buf.get_label();
        buf.bind_label(label); // offset 0
        for _ in 0..127 {
            buf.put_bytes(&[0]);
        }
        buf.put_bytes(&[0]); // fix-up site at offset 127
        buf.use_label_at_offset(127, label, LabelUseKind::Rel8);
        let out = buf.finalize().expect("finalizes");
        assert_eq!(out.data[127] as i8, -128);
    }

    #[test]
    fn branch26_fixup_resolves_forward_reference() {
        let mut buf = MachBuffer::new();
        let label = buf.get_label();
        buf.put4(0);
        buf.use_label_at_offset(0, label, LabelUseKind::Branch26);
        buf.put4(0);
        buf.put4(0);
        buf.bind_label(label);
        let out = buf.finalize().expect("finalizes");
        let word = u32::from_le_bytes(out.data[0..4].try_into().unwrap());
        assert_eq!(word & 0x3ff_ffff, 2); // two words ahead
    }

    #[test]
    fn call_site_resolves_to_bound_landing_pad_offset() {
        let mut buf = MachBuffer::new();
        buf.put4(0xdeadbeef); // call instruction
        let ret_offset = buf.cur_offset();
        let landing_pad = buf.get_label();
        buf.put4(0); // normal-path instruction
        buf.bind_label(landing_pad);
        buf.add_call_site(ret_offset, landing_pad);
        let out = buf.finalize().expect("finalizes");
        assert_eq!(out.call_sites.len(), 1);
        assert_eq!(out.call_sites[0].ret_offset, ret_offset);
        assert_eq!(out.call_sites[0].landing_pad_offset, 8);
    }

    #[test]
    fn unbound_label_use_is_an_error() {
        let mut buf = MachBuffer::new();
        let label = buf.get_label();
        buf.put4(0);
        buf.use_label_at_offset(0, label, LabelUseKind::Branch26);
        assert!(matches!(buf.finalize(), Err(CodegenError::LabelOutOfRange)));
    }
}
