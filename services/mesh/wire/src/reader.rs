//! Read-only access to option bytes inside a carrying message.

use crate::mpl::{MplOption, MPL_OPTION_HEADER_SIZE, MPL_OPTION_MAX_SIZE};
use crate::WireError;
use bytes::Bytes;
use tracing::trace;

/// Byte-oriented view of an inbound message
pub trait MessageReader {
    /// Copy bytes starting at `offset` into `buf`, returning how many were copied
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> usize;
}

impl MessageReader for [u8] {
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.len() {
            return 0;
        }
        let n = buf.len().min(self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        n
    }
}

impl MessageReader for Bytes {
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.as_ref().read_bytes(offset, buf)
    }
}

/// Read and decode the MPL option located at `offset` in `message`
pub fn read_option<M: MessageReader + ?Sized>(
    message: &M,
    offset: usize,
) -> Result<MplOption, WireError> {
    let mut buf = [0u8; MPL_OPTION_MAX_SIZE];

    if message.read_bytes(offset, &mut buf[..MPL_OPTION_HEADER_SIZE]) < MPL_OPTION_HEADER_SIZE {
        return Err(WireError::Incomplete);
    }

    let total = (MPL_OPTION_HEADER_SIZE + buf[1] as usize).min(MPL_OPTION_MAX_SIZE);
    let read = MPL_OPTION_HEADER_SIZE
        + message.read_bytes(
            offset + MPL_OPTION_HEADER_SIZE,
            &mut buf[MPL_OPTION_HEADER_SIZE..total],
        );
    trace!("read {} option bytes at offset {}", read, offset);

    MplOption::decode(&buf[..read])
}
