//! MPL hop-by-hop option (RFC 7731) encoding and decoding.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Option Type  |  Opt Data Len | S |M|V|  rsv  |   sequence    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          seed-id (optional)   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Only the elided (`S = 0`) and 16-bit (`S = 1`) seed encodings are
//! supported. An elided seed is recovered from the low 16 bits of the
//! carrying packet's IPv6 source address.

use crate::WireError;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

/// IPv6 option type assigned to MPL
pub const MPL_OPTION_TYPE: u8 = 0x6D;

/// Option type + option data length
pub const MPL_OPTION_HEADER_SIZE: usize = 2;

/// Smallest valid option: header, control byte and sequence
pub const MPL_OPTION_MIN_SIZE: usize = MPL_OPTION_HEADER_SIZE + 2;

/// Largest option this implementation produces or accepts
pub const MPL_OPTION_MAX_SIZE: usize = MPL_OPTION_MIN_SIZE + 2;

const SEED_LENGTH_SHIFT: u8 = 6;
const SEED_LENGTH_MASK: u8 = 0b11 << SEED_LENGTH_SHIFT;

/// Encoding of the seed-id carried in the option
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedLength {
    /// Seed elided; derived from the IPv6 source address
    Elided = 0,
    /// Explicit 16-bit seed
    Short = 1,
}

impl SeedLength {
    /// Number of seed bytes on the wire
    pub fn bytes(self) -> usize {
        match self {
            SeedLength::Elided => 0,
            SeedLength::Short => 2,
        }
    }
}

impl TryFrom<u8> for SeedLength {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SeedLength::Elided),
            1 => Ok(SeedLength::Short),
            _ => Err(WireError::SeedLength(value)),
        }
    }
}

bitflags! {
    /// Control flags following the seed-length field
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MplFlags: u8 {
        /// Sequence is the largest known for this seed
        const MAX = 1 << 5;
        /// Reserved version bit, must be zero
        const VERSION = 1 << 4;
    }
}

/// Decoded MPL option; the seed encoding follows from whether `seed` is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MplOption {
    /// Control flags
    pub flags: MplFlags,
    /// Message sequence number
    pub sequence: u8,
    /// Explicit seed, `None` when elided
    pub seed: Option<u16>,
}

impl MplOption {
    /// Option with the seed elided
    pub fn elided(sequence: u8) -> Self {
        Self {
            flags: MplFlags::empty(),
            sequence,
            seed: None,
        }
    }

    /// Option carrying an explicit 16-bit seed
    pub fn explicit(sequence: u8, seed: u16) -> Self {
        Self {
            flags: MplFlags::empty(),
            sequence,
            seed: Some(seed),
        }
    }

    /// Seed encoding carried on the wire
    pub fn seed_length(&self) -> SeedLength {
        match self.seed {
            Some(_) => SeedLength::Short,
            None => SeedLength::Elided,
        }
    }

    /// Control byte (seed length + flags)
    pub fn control(&self) -> u8 {
        ((self.seed_length() as u8) << SEED_LENGTH_SHIFT) | self.flags.bits()
    }

    /// Value of the option data length field
    pub fn data_len(&self) -> u8 {
        (2 + self.seed_length().bytes()) as u8
    }

    /// Total encoded size including the option header
    pub fn encoded_len(&self) -> usize {
        MPL_OPTION_HEADER_SIZE + self.data_len() as usize
    }

    /// Resolve the seed, deriving it from `source` when elided
    pub fn seed_for(&self, source: &Ipv6Addr) -> u16 {
        self.seed.unwrap_or_else(|| seed_from_address(source))
    }

    /// Encode the option into `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(MPL_OPTION_TYPE);
        buf.put_u8(self.data_len());
        buf.put_u8(self.control());
        buf.put_u8(self.sequence);
        if let Some(seed) = self.seed {
            buf.put_u16(seed);
        }
    }

    /// Encode the option into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode an option starting at the first byte of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < MPL_OPTION_MIN_SIZE {
            return Err(WireError::Incomplete);
        }

        if buf[0] != MPL_OPTION_TYPE {
            return Err(WireError::Type(buf[0]));
        }

        let data_len = buf[1];
        let control = buf[2];
        let sequence = buf[3];

        let seed_length = SeedLength::try_from((control & SEED_LENGTH_MASK) >> SEED_LENGTH_SHIFT)?;
        let flags = MplFlags::from_bits_truncate(control);
        if flags.contains(MplFlags::VERSION) {
            return Err(WireError::Version);
        }

        if data_len as usize != 2 + seed_length.bytes() {
            return Err(WireError::Length(data_len));
        }

        if buf.len() < MPL_OPTION_HEADER_SIZE + data_len as usize {
            return Err(WireError::Incomplete);
        }

        let seed = match seed_length {
            SeedLength::Elided => None,
            SeedLength::Short => Some(u16::from_be_bytes([buf[4], buf[5]])),
        };

        Ok(Self {
            flags,
            sequence,
            seed,
        })
    }
}

/// Seed implied by an IPv6 address: its low 16 bits
pub fn seed_from_address(addr: &Ipv6Addr) -> u16 {
    addr.segments()[7]
}
