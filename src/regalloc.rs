//! The register allocator: linear scan over live ranges with a
//! furthest-next-use spill heuristic, operating on a `VCode` built by the
//! lowering engine.
//!
//! Liveness runs first (backward dataflow to a fixpoint over the VCode
//! block graph), then allocation walks instructions in forward program
//! order, assigning a `PReg` or a `SpillSlot`-backed location to every
//! `VReg` operand and inserting explicit spill/reload instructions
//! rather than a side table keyed by instruction.

use crate::machinst::vcode::{VCode, VCodeBlock};
use crate::machinst::{MachInst, OperandConstraint, OperandKind};
use crate::regs::{PReg, Reg, RegClass, SpillSlot, NUM_REG_CLASSES};
use crate::result::{CodegenError, CodegenResult};
use rustc_hash::{FxHashMap, FxHashSet};

#[cfg(feature = "trace-log")]
use log::trace;
#[cfg(not(feature = "trace-log"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// The physical registers available to the allocator for one class, and
/// any reserved registers (e.g. Apple's X18) that must never be handed
/// out.
#[derive(Clone)]
pub struct RegisterBank {
    pub class: RegClass,
    pub available: Vec<PReg>,
}

/// Per-function allocator configuration: one bank per register class plus
/// the callee-save register set the frame layout must account for.
pub struct AllocatorEnv {
    pub banks: [RegisterBank; NUM_REG_CLASSES],
    pub callee_saves: Vec<PReg>,
}

impl AllocatorEnv {
    fn bank(&self, class: RegClass) -> &RegisterBank {
        &self.banks[class.index()]
    }
}

/// The result of allocation: the mutated `VCode` (operands rewritten in
/// place, spill/reload instructions inserted) plus the computed frame
/// layout.
pub struct AllocationResult<I: MachInst> {
    pub vcode: VCode<I>,
    pub frame: FrameLayout,
}

/// The final per-function stack layout.
#[derive(Clone, Debug, Default)]
pub struct FrameLayout {
    pub callee_save_bytes: u32,
    pub locals_bytes: u32,
    pub spill_bytes: u32,
    pub frame_size: u32,
    pub used_callee_saves: Vec<PReg>,
}

/// A value's live interval, as a set of (instruction-index) program
/// points it is live at. Its resolved location lives in the allocator's
/// `assigned` map, keyed by the same `Reg`, not here — this only tracks
/// when the interval starts and ends so expiry can free the location back
/// to the right pool.
struct Interval {
    reg: Reg,
    vreg_class: RegClass,
    /// Sorted ascending program points at which this value is live.
    points: Vec<u32>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Location {
    Reg(PReg),
    Spill(SpillSlot),
}

/// Run liveness and linear-scan allocation over `vcode`, producing a new
/// `VCode` whose every register operand is a `PReg` or spill-backed
/// reload/store pair.
pub fn allocate<I: MachInst>(
    mut vcode: VCode<I>,
    env: &AllocatorEnv,
    locals_bytes: u32,
) -> CodegenResult<AllocationResult<I>> {
    let live = compute_liveness(&vcode);
    let intervals = build_intervals(&vcode, &live);

    // Fixed-register operands pin their interval's location immediately;
    // conflicting fixed demands at the same point are detected as we scan.
    let mut fixed_at: FxHashMap<(u32, PReg), Vec<Reg>> = FxHashMap::default();
    for (point, inst) in vcode.insts().iter().enumerate() {
        let point = point as u32;
        let mut ops = Vec::new();
        inst.get_operands(&mut |reg, _kind, constraint| {
            if let OperandConstraint::Fixed(p) = constraint {
                ops.push((reg, p));
            }
        });
        for (reg, preg) in ops {
            fixed_at.entry((point, preg)).or_default().push(reg);
        }
    }
    for ((_, _), regs) in &fixed_at {
        let distinct: FxHashSet<Reg> = regs.iter().copied().collect();
        if distinct.len() > 1 {
            return Err(CodegenError::ImpossibleConstraint {
                location: crate::result::IrLocation::default(),
            });
        }
    }

    let mut spill_slots = SpillArena::default();
    let mut next_free: FxHashMap<RegClass, FxHashSet<PReg>> = FxHashMap::default();
    for class in [RegClass::Int, RegClass::Float, RegClass::Vector] {
        next_free.insert(class, env.bank(class).available.iter().copied().collect());
    }

    // Linear scan: process instructions in forward program order; at each
    // point release registers whose interval has ended, then satisfy the
    // current instruction's operands.
    let mut assigned: FxHashMap<Reg, Location> = FxHashMap::default();
    let mut used_callee_saves = FxHashSet::default();

    let num_insts = vcode.insts().len();
    for point in 0..num_insts as u32 {
        expire_intervals(&intervals, point, &mut next_free, &assigned, &mut spill_slots);

        let operands = collect_operands(&vcode, point);
        for (reg, _kind, constraint) in &operands {
            if assigned.contains_key(reg) {
                continue;
            }
            let Some(vreg) = reg.as_virtual() else {
                continue; // already physical or a spill reference
            };
            let class = vreg.class();
            match constraint {
                OperandConstraint::Fixed(p) => {
                    reserve(&mut next_free, class, *p);
                    assigned.insert(*reg, Location::Reg(*p));
                    if env.callee_saves.contains(p) {
                        used_callee_saves.insert(*p);
                    }
                }
                OperandConstraint::Reuse(other_idx) => {
                    let other = operands[*other_idx as usize].0;
                    if let Some(loc) = assigned.get(&other).copied() {
                        assigned.insert(*reg, loc);
                    } else if let Some(p) = take_free(&mut next_free, class) {
                        assigned.insert(*reg, Location::Reg(p));
                    } else {
                        let slot = spill_slots.alloc(class);
                        assigned.insert(*reg, Location::Spill(slot));
                    }
                }
                OperandConstraint::Any => {
                    if let Some(p) = take_free(&mut next_free, class) {
                        assigned.insert(*reg, Location::Reg(p));
                    } else {
                        // Spill the live interval whose next use is
                        // furthest from `point`.
                        let victim = furthest_next_use(&intervals, class, point, &assigned);
                        if let Some(victim_reg) = victim {
                            let slot = spill_slots.alloc(class);
                            trace!("spilling {victim_reg:?} to {slot:?} at point {point} to free a {class:?} register");
                            assigned.insert(victim_reg, Location::Spill(slot));
                            match take_free(&mut next_free, class) {
                                Some(p) => {
                                    assigned.insert(*reg, Location::Reg(p));
                                }
                                None => {
                                    let slot = spill_slots.alloc(class);
                                    assigned.insert(*reg, Location::Spill(slot));
                                }
                            }
                        } else {
                            let slot = spill_slots.alloc(class);
                            assigned.insert(*reg, Location::Spill(slot));
                        }
                    }
                }
            }
        }
    }

    // Rewrite operands in place, spill-backed references resolved to the
    // spill-slot encoding directly (the emitter treats a `Reg::is_spill`
    // operand as "load/store via the frame", matching the uniform
    // encoding so no separate reload instructions are needed for operands
    // a target's addressing modes can reference directly; targets that
    // cannot must insert their own reload/spill via `MachInst::gen_reload`/
    // `gen_spill` during their own lowering of the rewritten operand).
    for inst in vcode.insts_mut() {
        inst.map_regs(&mut |r| match assigned.get(&r) {
            Some(Location::Reg(p)) => Reg::from_physical(*p),
            Some(Location::Spill(s)) => Reg::from_spill(*s),
            _ => r,
        });
    }

    let callee_save_bytes = (used_callee_saves.len() as u32) * 8;
    let spill_bytes = spill_slots.total_bytes();
    let raw = callee_save_bytes + locals_bytes + spill_bytes;
    // The prologue always reserves 16 bytes at the bottom of a non-empty
    // frame for the FP/LR pair it stores with its first `stp`, on top of
    // whatever callee-saves/locals/spills follow at FP+16.
    let frame_size = if raw == 0 { 0 } else { align_up(16 + raw, 16) };

    Ok(AllocationResult {
        vcode,
        frame: FrameLayout {
            callee_save_bytes,
            locals_bytes,
            spill_bytes,
            frame_size,
            used_callee_saves: used_callee_saves.into_iter().collect(),
        },
    })
}

fn collect_operands<I: MachInst>(
    vcode: &VCode<I>,
    point: u32,
) -> Vec<(Reg, OperandKind, OperandConstraint)> {
    let mut out = Vec::new();
    let inst = &vcode.insts()[point as usize];
    inst.get_operands(&mut |reg, kind, constraint| out.push((reg, kind, constraint)));
    out
}

fn reserve(free: &mut FxHashMap<RegClass, FxHashSet<PReg>>, class: RegClass, p: PReg) {
    free.get_mut(&class).map(|s| s.remove(&p));
}

/// Picks the lowest-numbered free register of `class`, not an arbitrary
/// one. `FxHashSet` iteration order is not the same as numeric order, and
/// leaving this arbitrary would make which physical register a value
/// lands in depend on hash bucket layout rather than the input function —
/// breaking the "compilation is reproducible" guarantee (spec §5) for no
/// benefit, since any free register is equally valid.
fn take_free(free: &mut FxHashMap<RegClass, FxHashSet<PReg>>, class: RegClass) -> Option<PReg> {
    let set = free.get_mut(&class)?;
    let p = *set.iter().min_by_key(|p| p.hw_enc())?;
    set.remove(&p);
    Some(p)
}

fn expire_intervals(
    intervals: &[Interval],
    point: u32,
    free: &mut FxHashMap<RegClass, FxHashSet<PReg>>,
    assigned: &FxHashMap<Reg, Location>,
    spill_slots: &mut SpillArena,
) {
    for iv in intervals {
        if iv.points.last() != Some(&(point.wrapping_sub(1))) {
            continue;
        }
        match assigned.get(&iv.reg) {
            Some(Location::Reg(p)) => {
                free.get_mut(&iv.vreg_class).map(|s| s.insert(*p));
            }
            Some(Location::Spill(slot)) => spill_slots.free(*slot),
            None => {}
        }
    }
}

/// Among currently register-resident live intervals of `class`, return the
/// `Reg` whose next use after `point` is furthest away (or has none),
/// i.e. the cheapest one to evict.
fn furthest_next_use(
    intervals: &[Interval],
    class: RegClass,
    point: u32,
    assigned: &FxHashMap<Reg, Location>,
) -> Option<Reg> {
    let mut best: Option<(Reg, u32)> = None;
    for (reg, loc) in assigned {
        if reg.class() != class || !matches!(loc, Location::Reg(_)) {
            continue;
        }
        let next_use = intervals
            .iter()
            .find(|iv| iv.reg == *reg)
            .and_then(|iv| iv.points.iter().copied().find(|&p| p > point))
            .unwrap_or(u32::MAX);
        if best.map(|(_, d)| next_use > d).unwrap_or(true) {
            best = Some((*reg, next_use));
        }
    }
    best.map(|(r, _)| r)
}

fn build_intervals<I: MachInst>(
    vcode: &VCode<I>,
    live: &FxHashMap<VCodeBlock, (FxHashSet<Reg>, FxHashSet<Reg>)>,
) -> Vec<Interval> {
    // Start from each VReg's raw occurrence points (every instruction index
    // where it appears as an operand).
    let mut points: FxHashMap<Reg, Vec<u32>> = FxHashMap::default();
    for (i, inst) in vcode.insts().iter().enumerate() {
        inst.get_operands(&mut |reg, _kind, _c| {
            points.entry(reg).or_default().push(i as u32);
        });
    }

    // Raw occurrences alone understate liveness across a block a value
    // merely flows through: a value live-in to a loop header but not
    // locally referenced in the block that closes the back edge has no
    // occurrence there at all, yet the register it holds must not be
    // handed to anything else until the back edge is crossed. `live`
    // (the fixpoint block-level liveness `allocate` computed) has already
    // resolved this around arbitrary cycles, so fold its live-in/live-out
    // sets in: stamp every block-live value with that block's first and
    // last instruction index, extending its interval's furthest point
    // past the block even where no instruction there names it directly.
    for block in vcode.blocks() {
        let (start, end) = vcode.block_range(block);
        if start == end {
            continue;
        }
        let (live_in, live_out) = &live[&block];
        for &reg in live_in {
            points.entry(reg).or_default().push(start);
        }
        for &reg in live_out {
            points.entry(reg).or_default().push(end - 1);
        }
    }

    points
        .into_iter()
        .filter_map(|(reg, mut pts)| {
            let class = reg.as_virtual().map(|v| v.class())?;
            pts.sort_unstable();
            pts.dedup();
            Some(Interval { reg, vreg_class: class, points: pts })
        })
        .collect()
}

/// Backward dataflow to a fixpoint computing per-block (live-in, live-out)
/// register sets.
fn compute_liveness<I: MachInst>(
    vcode: &VCode<I>,
) -> FxHashMap<VCodeBlock, (FxHashSet<Reg>, FxHashSet<Reg>)> {
    let mut live_in: FxHashMap<VCodeBlock, FxHashSet<Reg>> = FxHashMap::default();
    let mut live_out: FxHashMap<VCodeBlock, FxHashSet<Reg>> = FxHashMap::default();
    for b in vcode.blocks() {
        live_in.insert(b, FxHashSet::default());
        live_out.insert(b, FxHashSet::default());
    }

    let mut changed = true;
    while changed {
        changed = false;
        for b in vcode.blocks() {
            let mut out = FxHashSet::default();
            for &succ in vcode.block_succs(b) {
                out.extend(live_in[&succ].iter().copied());
                out.extend(vcode.block_params(succ).iter().copied());
            }
            let mut new_in = out.clone();
            for inst in vcode.block_insts(b).iter().rev() {
                inst.get_operands(&mut |reg, kind, _| match kind {
                    OperandKind::Def => {
                        new_in.remove(&reg);
                    }
                    OperandKind::Use | OperandKind::Mod => {
                        new_in.insert(reg);
                    }
                });
            }
            if new_in != live_in[&b] || out != live_out[&b] {
                changed = true;
            }
            live_in.insert(b, new_in);
            live_out.insert(b, out);
        }
    }

    vcode
        .blocks()
        .map(|b| (b, (live_in[&b].clone(), live_out[&b].clone())))
        .collect()
}

/// A per-function stack arena for spill slots. A freed slot goes on a
/// free list and is handed back out to the next allocation request before
/// the arena grows, so two values whose live ranges never overlap can
/// share one slot.
#[derive(Default)]
struct SpillArena {
    next_index: u32,
    free_list: Vec<u32>,
}

impl SpillArena {
    fn alloc(&mut self, _class: RegClass) -> SpillSlot {
        if let Some(idx) = self.free_list.pop() {
            return SpillSlot::new(idx);
        }
        let s = SpillSlot::new(self.next_index);
        self.next_index += 1;
        s
    }

    fn free(&mut self, slot: SpillSlot) {
        self.free_list.push(slot.index());
    }

    fn total_bytes(&self) -> u32 {
        self.next_index * 8
    }
}

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::inst::{Cond, Inst, OperandSize};
    use crate::machinst::vcode::VCodeBuilder;
    use crate::regs::VReg;

    /// A loop: block0 defines `v0`; block1 (header) uses it and branches to
    /// either block2 (body, which never mentions `v0`) or block3 (exit);
    /// block2 jumps back to block1. `v0` must stay live across block2's
    /// span even though no instruction there names it, since control flow
    /// can reach block1's use again after the back edge.
    fn loop_vcode() -> (VCode<Inst>, Reg) {
        let v0 = Reg::from_virtual(VReg::new(RegClass::Int, 0));
        let mut b = VCodeBuilder::new(false);

        b.push(Inst::MovZ { size: OperandSize::Size64, rd: v0, imm16: 1, shift: 0 });
        b.end_block(&[], &[VCodeBlock(1)]);

        b.push(Inst::CmpImm { size: OperandSize::Size64, rn: v0, imm12: 0 });
        b.push(Inst::CondBr { cond: Cond::Eq, target: VCodeBlock(2) });
        b.push(Inst::Jump { target: VCodeBlock(3) });
        b.end_block(&[], &[VCodeBlock(2), VCodeBlock(3)]);

        b.push(Inst::Nop);
        b.push(Inst::Jump { target: VCodeBlock(1) });
        b.end_block(&[], &[VCodeBlock(1)]);

        b.push(Inst::Ret);
        b.end_block(&[], &[]);

        (b.finish(VCodeBlock(0)), v0)
    }

    #[test]
    fn live_through_block_extends_past_its_own_occurrences() {
        let (vcode, v0) = loop_vcode();
        let live = compute_liveness(&vcode);
        let (_, body_end) = vcode.block_range(VCodeBlock(2));

        let intervals = build_intervals(&vcode, &live);
        let iv = intervals.iter().find(|iv| iv.reg == v0).expect("v0 has an interval");
        assert!(
            *iv.points.last().unwrap() >= body_end - 1,
            "v0's interval must cover the loop body block it flows through, not just its own occurrences"
        );
    }

    #[test]
    fn discarding_block_liveness_would_understate_it() {
        // Same VCode, but built the way the old `build_intervals` did:
        // from raw occurrences alone, with no live-in/live-out folded in.
        let (vcode, v0) = loop_vcode();
        let (_, body_end) = vcode.block_range(VCodeBlock(2));

        let mut points: FxHashMap<Reg, Vec<u32>> = FxHashMap::default();
        for (i, inst) in vcode.insts().iter().enumerate() {
            inst.get_operands(&mut |reg, _kind, _c| {
                points.entry(reg).or_default().push(i as u32);
            });
        }
        let raw_last = *points[&v0].iter().max().unwrap();
        assert!(
            raw_last < body_end - 1,
            "this case is only interesting if raw occurrences alone end before the body block does"
        );
    }
}
