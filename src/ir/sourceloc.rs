//! Source locations.
//!
//! Each instruction may carry an opaque `SourceLoc` forwarded from the front
//! end. The core does not interpret it beyond threading it through to the
//! emitted code-offset map.

use core::fmt;

/// An opaque source position. `default()` means "no source location known".
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceLoc(u32);

impl SourceLoc {
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn is_default(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_default() {
            write!(f, "-")
        } else {
            write!(f, "@{:#x}", self.0)
        }
    }
}
