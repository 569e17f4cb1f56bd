//! Error types for the serial transport and the settings store.

/// Serial transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// S01: Instance already claimed
    ClaimConflict,
    /// S02: Instance is not claimable
    NotClaimable,
    /// S03: No instance with that index
    UnknownInstance,
    /// S04: Operation not supported by this instance
    Unsupported,
    /// S05: Baud rate out of range
    InvalidBaud,
    /// S06: Blocking callback aborted the write
    Refused,
    /// S07: Interrupt controller rejected the handler
    InterruptAttach,
}

impl SerialError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClaimConflict => "S01",
            Self::NotClaimable => "S02",
            Self::UnknownInstance => "S03",
            Self::Unsupported => "S04",
            Self::InvalidBaud => "S05",
            Self::Refused => "S06",
            Self::InterruptAttach => "S07",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::ClaimConflict => "already claimed",
            Self::NotClaimable => "not claimable",
            Self::UnknownInstance => "unknown instance",
            Self::Unsupported => "unsupported operation",
            Self::InvalidBaud => "invalid baud rate",
            Self::Refused => "write refused",
            Self::InterruptAttach => "interrupt attach failed",
        }
    }
}

impl core::fmt::Display for SerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Persistent settings store error.
///
/// Any of these means the caller must fall back to default settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// N01: No backing partition (never found, or dropped after a read failure)
    NoPartition,
    /// N02: Flash read failed
    ReadFailed,
    /// N03: Sector erase failed
    EraseFailed,
    /// N04: Flash program failed
    WriteFailed,
}

impl StoreError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPartition => "N01",
            Self::ReadFailed => "N02",
            Self::EraseFailed => "N03",
            Self::WriteFailed => "N04",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoPartition => "no settings partition",
            Self::ReadFailed => "flash read failed",
            Self::EraseFailed => "flash erase failed",
            Self::WriteFailed => "flash write failed",
        }
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}
