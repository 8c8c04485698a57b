//! Names for externally-defined functions and globals.

use core::fmt;

/// How an external entity (function or global) is named to the linker or
/// runtime that will eventually resolve it.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ExternalName {
    /// A name understood by the embedding runtime's own symbol table,
    /// opaque to the core (e.g. a registered host function index).
    User(u32),
    /// A textual symbol name, resolved by a linker relocation.
    LibCall(super::libcall::LibCall),
    /// A plain linker symbol name.
    Symbol(alloc::string::String),
}

impl fmt::Display for ExternalName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExternalName::User(idx) => write!(f, "u{idx}"),
            ExternalName::LibCall(lc) => write!(f, "%{lc}"),
            ExternalName::Symbol(s) => write!(f, "{s}"),
        }
    }
}
