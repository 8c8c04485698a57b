//! Stack slot declarations.

use crate::ir::StackSlot;
use hoist_entity::PrimaryMap;

/// A declared local (not spill) stack slot: space the IR asked for
/// explicitly, e.g. for a `alloca`-like local whose address escapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackSlotData {
    pub size: u32,
    pub align_log2: u8,
}

impl StackSlotData {
    pub fn new(size: u32, align_log2: u8) -> Self {
        Self { size, align_log2 }
    }

    pub fn align(&self) -> u32 {
        1u32 << self.align_log2
    }
}

/// All stack slots declared by a function, laid out in declaration order
/// with alignment padding between them.
#[derive(Clone, Debug, Default)]
pub struct StackSlots {
    pub slots: PrimaryMap<StackSlot, StackSlotData>,
    /// Byte offset of each slot from the start of the locals area, filled
    /// in by `layout_offsets`.
    offsets: Vec<i32>,
    total_size: u32,
}

impl StackSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, data: StackSlotData) -> StackSlot {
        self.slots.push(data)
    }

    /// Assign each slot an offset from the start of the locals area, in
    /// declaration order, padding for alignment as needed. Returns the
    /// total locals-area size (unaligned to the final 16-byte frame
    /// boundary; the ABI layer adds that padding once callee-saves and
    /// spill slots are known).
    pub fn layout_offsets(&mut self) -> u32 {
        let mut cursor: u32 = 0;
        self.offsets.clear();
        for (_, data) in self.slots.iter() {
            let align = data.align();
            cursor = (cursor + align - 1) / align * align;
            self.offsets.push(cursor as i32);
            cursor += data.size;
        }
        self.total_size = cursor;
        cursor
    }

    pub fn offset(&self, slot: crate::ir::StackSlot) -> i32 {
        self.offsets[slot.index()]
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }
}

use hoist_entity::EntityRef;
