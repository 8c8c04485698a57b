//! The constant pool: bytes for constants too wide to inline on an
//! instruction (vector constants, large aggregate initializers).

use crate::ir::Constant;
use hoist_entity::PrimaryMap;
use rustc_hash::FxHashMap;

/// Raw little-endian bytes for one pooled constant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstantData(Vec<u8>);

impl ConstantData {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for ConstantData {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

/// The pool itself, deduplicating identical byte patterns so e.g. the same
/// all-zero vector constant used at ten call sites is stored once.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    handles: PrimaryMap<Constant, ConstantData>,
    dedup: FxHashMap<ConstantData, Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, data: ConstantData) -> Constant {
        if let Some(&c) = self.dedup.get(&data) {
            return c;
        }
        let c = self.handles.push(data.clone());
        self.dedup.insert(data, c);
        c
    }

    pub fn get(&self, c: Constant) -> &ConstantData {
        &self.handles[c]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Constant, &ConstantData)> {
        self.handles.iter()
    }
}
