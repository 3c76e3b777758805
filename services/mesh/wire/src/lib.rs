//! MPL hop-by-hop option encoding/decoding and message option access for mesh.
//!
//! This crate provides the wire representation of the MPL option (RFC 7731)
//! carried in an IPv6 hop-by-hop header, together with a small reader
//! abstraction for pulling the option out of an inbound message without
//! taking ownership of it.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8 option_type       | 0x6D                       |
//! +----------------------+----------------------------+
//! | u8 option_len        | bytes that follow (2 or 4) |
//! +----------------------+----------------------------+
//! | u8 control           | S(2) M(1) V(1) rsv(4)      |
//! +----------------------+----------------------------+
//! | u8 sequence          | wrapping per-seed counter  |
//! +----------------------+----------------------------+
//! | u16 seed (opt)       | present iff S == 1         |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod mpl;
pub mod reader;

// Re-export main types
pub use error::WireError;
pub use mpl::{
    seed_from_address, MplFlags, MplOption, SeedLength, MPL_OPTION_HEADER_SIZE,
    MPL_OPTION_MAX_SIZE, MPL_OPTION_MIN_SIZE, MPL_OPTION_TYPE,
};
pub use reader::{read_option, MessageReader};
