//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Incomplete option (need more bytes)
    #[error("incomplete option")]
    Incomplete,

    /// Option type is not the MPL option
    #[error("unknown option type {0:#04x}")]
    Type(u8),

    /// Option length field disagrees with the seed-length code
    #[error("invalid option length {0}")]
    Length(u8),

    /// Seed-length code not supported by this implementation
    #[error("seed length code unsupported: {0}")]
    SeedLength(u8),

    /// Version flag set (RFC 7731 requires such options to be dropped)
    #[error("version flag set")]
    Version,
}
