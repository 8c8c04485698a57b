//! Well-known runtime routines callable by name instead of by `FuncRef`.

use core::fmt;

/// A runtime helper that lowering may call directly when the target has no
/// single instruction for an operation (e.g. software float division on a
/// target lacking hardware support). AArch64 has hardware support for all
/// the operations the core needs, so the core currently never lowers to
/// one of these, but the enumeration is load-bearing for the
/// `ExternalName::LibCall` variant and for back ends that do need it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum LibCall {
    Memcpy,
    Memset,
    Memmove,
}

impl fmt::Display for LibCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            LibCall::Memcpy => "Memcpy",
            LibCall::Memset => "Memset",
            LibCall::Memmove => "Memmove",
        };
        f.write_str(s)
    }
}
