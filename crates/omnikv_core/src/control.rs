//! Free-form control channel commands.
//!
//! The control channel is the operational side door: string in, string
//! out, no stability promises beyond the command names themselves.

use crate::error::{EngineError, EngineResult};

/// A recognized control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlCommand {
    /// Delete all data; preserve collection names.
    Clear,
    /// Delete all data and all named collections.
    Reset,
    /// Request background compaction. Advisory.
    Compact,
    /// Diagnostic string: version and backend.
    Info,
    /// Approximate sizes: keys, bytes, RAM, disk.
    Usage,
}

impl ControlCommand {
    pub(crate) fn parse(request: &str) -> EngineResult<Self> {
        match request.trim() {
            "clear" => Ok(Self::Clear),
            "reset" => Ok(Self::Reset),
            "compact" => Ok(Self::Compact),
            "info" => Ok(Self::Info),
            "usage" => Ok(Self::Usage),
            other => Err(EngineError::usage(format!(
                "unknown control command: {other:?}"
            ))),
        }
    }
}
