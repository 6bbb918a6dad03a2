//! Per-call option bits.

use crate::error::{EngineError, EngineResult};
use std::fmt;
use std::ops::BitOr;

/// A bitmask of per-call options.
///
/// Bit values are part of the public contract and stable across releases.
/// Bits a given operation does not recognize, and bits outside the known
/// set, are rejected with a usage error rather than ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Options(u32);

impl Options {
    /// No options.
    pub const NONE: Options = Options(0);
    /// Limit reads to length retrieval; no value bytes are returned.
    pub const READ_LENGTHS: Options = Options(1 << 1);
    /// Force durable persistence before the write call returns.
    pub const WRITE_FLUSH: Options = Options(1 << 2);
    /// Track transactional reads for conflict detection at commit.
    pub const READ_TRACK: Options = Options(1 << 3);
    /// Pin a consistent snapshot for the lifetime of a transaction.
    pub const TXN_SNAPSHOT: Options = Options(1 << 4);

    const KNOWN: u32 = Self::READ_LENGTHS.0
        | Self::WRITE_FLUSH.0
        | Self::READ_TRACK.0
        | Self::TXN_SNAPSHOT.0;

    /// Builds options from raw bits, refusing unknown ones.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::KNOWN == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Returns the raw bit value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Checks whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }

    /// Rejects bits outside `allowed` for the named operation.
    pub(crate) fn ensure_allowed(self, allowed: Options, operation: &str) -> EngineResult<()> {
        let stray = self.0 & !allowed.0;
        if stray == 0 {
            Ok(())
        } else {
            Err(EngineError::usage(format!(
                "option bits {stray:#x} are not valid for {operation}"
            )))
        }
    }
}

impl BitOr for Options {
    type Output = Options;

    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "options:{:#x}", self.0)
    }
}
