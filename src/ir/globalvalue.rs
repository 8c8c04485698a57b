//! Global value declarations.

use crate::ir::extname::ExternalName;
use crate::ir::immediates::Offset32;
use crate::ir::types::Type;
use crate::ir::GlobalValue;

/// How a `GlobalValue`'s address is computed.
#[derive(Clone, Debug)]
pub enum GlobalValueData {
    /// The address of a named external symbol.
    Symbol {
        name: ExternalName,
        /// Offset added to the symbol's address.
        offset: Offset32,
        /// Whether the symbol may be resolved at load time to a colocated
        /// (same-object, no PLT indirection needed) address.
        colocated: bool,
    },
    /// `base + offset`, where `base` is another global value — used for
    /// struct-of-globals layouts and vtable-relative addressing.
    IAddImm {
        base: GlobalValue,
        offset: Offset32,
        global_type: Type,
    },
}
