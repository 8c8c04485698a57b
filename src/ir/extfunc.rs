//! Function signatures and external-call declarations.

use crate::ir::extname::ExternalName;
use crate::ir::types::Type;
use crate::ir::SigRef;
use core::fmt;

/// The calling convention a `Signature` is resolved under. Closed set per
/// only the AArch64-applicable conventions are implemented by the ABI
/// resolver in this core, `windows-fastcall` is reserved but unused.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CallConv {
    Fast,
    Tail,
    SystemV,
    WindowsFastcall,
    AppleAarch64,
    PreserveAll,
}

impl CallConv {
    /// Does this convention support exceptions (try-call / LSDA)?
    pub fn supports_exceptions(self) -> bool {
        !matches!(self, CallConv::Fast)
    }

    /// Does this convention permit tail calls (callee-pops stack args)?
    pub fn is_tail_call(self) -> bool {
        matches!(self, CallConv::Tail)
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CallConv::Fast => "fast",
            CallConv::Tail => "tail",
            CallConv::SystemV => "system_v",
            CallConv::WindowsFastcall => "windows_fastcall",
            CallConv::AppleAarch64 => "apple_aarch64",
            CallConv::PreserveAll => "preserve_all",
        };
        f.write_str(s)
    }
}

/// A sign/zero extension requirement for sub-register-width values crossing
/// an ABI boundary.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum ArgumentExtension {
    #[default]
    None,
    Sign,
    Zero,
}

/// Purpose annotation for a parameter or return value, used by ABI
/// classification to recognize implicit parameters (e.g. the indirect
/// return-slot pointer, a struct-return pointer).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum ArgumentPurpose {
    #[default]
    Normal,
    /// Caller-allocated space for an indirectly-returned aggregate; passed
    /// as a hidden pointer argument.
    StructReturn,
    /// The frame pointer, passed for `preserve_all`-style continuation ABIs.
    FramePointer,
}

/// One parameter or return slot's declared type, extension, and purpose.
/// Distinct from an `ABIArg`, which additionally carries the
/// resolved physical location — a `Signature` is location-agnostic until
/// passed through the ABI resolver.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AbiParam {
    pub value_type: Type,
    pub extension: ArgumentExtension,
    pub purpose: ArgumentPurpose,
}

impl AbiParam {
    pub fn new(value_type: Type) -> Self {
        Self {
            value_type,
            extension: ArgumentExtension::None,
            purpose: ArgumentPurpose::Normal,
        }
    }

    pub fn sext(value_type: Type) -> Self {
        Self {
            extension: ArgumentExtension::Sign,
            ..Self::new(value_type)
        }
    }

    pub fn uext(value_type: Type) -> Self {
        Self {
            extension: ArgumentExtension::Zero,
            ..Self::new(value_type)
        }
    }
}

/// A function's type: parameter and return types plus the calling
/// convention they are resolved under.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    pub params: Vec<AbiParam>,
    pub returns: Vec<AbiParam>,
    pub call_conv: CallConv,
}

impl Signature {
    pub fn new(call_conv: CallConv) -> Self {
        Self {
            params: Vec::new(),
            returns: Vec::new(),
            call_conv,
        }
    }
}

/// A direct external-call declaration: a callee signature plus its name,
/// named by a `FuncRef` in the owning function's preamble.
#[derive(Clone, Debug)]
pub struct ExtFuncData {
    pub name: ExternalName,
    pub signature: SigRef,
    /// Whether the callee is known to be defined in the same object,
    /// permitting a direct (non-PLT) relocation.
    pub colocated: bool,
}
