// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The NDP wire header and the IPv4 protocol number it is framed under.

use core::fmt;
use s2n_codec::{zerocopy::U16, DecoderBuffer, DecoderError};
use zerocopy::{AsBytes, FromBytes, Unaligned};

/// IPv4 protocol number NDP is framed under.
pub const PROTOCOL_NUMBER: u8 = 0x99;

const RESERVED_LEN: usize = 17;

bitflags::bitflags! {
    /// The NDP header's 8-bit flag set. Flags are not mutually exclusive.
    #[derive(Clone, Copy, PartialEq, Eq, Default, FromBytes, AsBytes, Unaligned)]
    #[repr(transparent)]
    pub struct Flags: u8 {
        const DATA = 0b0000_0001;
        const ACK  = 0b0000_0010;
        const NACK = 0b0000_0100;
        const PULL = 0b0000_1000;
        const CHOP = 0b0001_0000;
        const F1   = 0b0010_0000;
        const F2   = 0b0100_0000;
        const F3   = 0b1000_0000;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

s2n_codec::zerocopy_value_codec!(Flags);

/// The fixed 24-field NDP header, laid out exactly as the wire format in
/// network byte order: `flags`, four message-addressing shorts, `pkt_offset`,
/// `pull_offset`, and a zero-filled reserved tail.
///
/// `reserved` is carried verbatim by every codec path; it is never
/// interpreted or validated (see the open question in the design notes about
/// `pkt_offset` on PULL packets — the same "carry, don't interpret" stance
/// applies here).
#[derive(Clone, Copy, PartialEq, Eq, Default, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct Header {
    flags: Flags,
    src_context: U16,
    dst_context: U16,
    tx_msg_id: U16,
    msg_len: U16,
    pkt_offset: U16,
    pull_offset: U16,
    reserved: [u8; RESERVED_LEN],
}

s2n_codec::zerocopy_value_codec!(Header);

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ndp::Header")
            .field("flags", &self.flags())
            .field("src_context", &self.src_context())
            .field("dst_context", &self.dst_context())
            .field("tx_msg_id", &self.tx_msg_id())
            .field("msg_len", &self.msg_len())
            .field("pkt_offset", &self.pkt_offset())
            .field("pull_offset", &self.pull_offset())
            .finish()
    }
}

#[allow(clippy::too_many_arguments)]
impl Header {
    #[inline]
    pub fn new(
        flags: Flags,
        src_context: u16,
        dst_context: u16,
        tx_msg_id: u16,
        msg_len: u16,
        pkt_offset: u16,
        pull_offset: u16,
    ) -> Self {
        Self {
            flags,
            src_context: src_context.into(),
            dst_context: dst_context.into(),
            tx_msg_id: tx_msg_id.into(),
            msg_len: msg_len.into(),
            pkt_offset: pkt_offset.into(),
            pull_offset: pull_offset.into(),
            reserved: [0; RESERVED_LEN],
        }
    }

    #[inline]
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    #[inline]
    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    #[inline]
    pub fn src_context(&self) -> u16 {
        self.src_context.get()
    }

    #[inline]
    pub fn dst_context(&self) -> u16 {
        self.dst_context.get()
    }

    #[inline]
    pub fn tx_msg_id(&self) -> u16 {
        self.tx_msg_id.get()
    }

    #[inline]
    pub fn msg_len(&self) -> u16 {
        self.msg_len.get()
    }

    #[inline]
    pub fn pkt_offset(&self) -> u16 {
        self.pkt_offset.get()
    }

    #[inline]
    pub fn pull_offset(&self) -> u16 {
        self.pull_offset.get()
    }

    /// Swaps source and destination context, as done when turning a data
    /// packet into the control packet that answers it.
    #[inline]
    pub fn swap_contexts(&mut self) {
        core::mem::swap(&mut self.src_context, &mut self.dst_context);
    }
}

/// Decodes a [`Header`] from the front of `bytes`, returning the header and
/// the remaining (payload) bytes.
#[inline]
pub fn decode(bytes: &[u8]) -> Result<(Header, &[u8]), DecodeError> {
    let buffer = DecoderBuffer::new(bytes);
    let (header, remaining) = buffer
        .decode::<Header>()
        .map_err(|_: DecoderError| DecodeError::TooShort)?;
    Ok((header, remaining.into_less_safe_slice()))
}

/// Encodes `header` followed by `payload` into a freshly allocated buffer.
#[inline]
pub fn encode_to_vec(header: &Header, payload: &[u8]) -> bytes::BytesMut {
    use s2n_codec::EncoderValue;

    let mut buffer = bytes::BytesMut::zeroed(header.encoding_size() + payload.len());
    {
        let mut encoder = s2n_codec::EncoderBuffer::new(&mut buffer);
        header.encode(&mut encoder);
        encoder.encode(&payload);
    }
    buffer
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer too short to contain an NDP header")]
    TooShort,
    #[error("unrecognized IP protocol number: {0:#x}")]
    UnrecognizedProtocol(u8),
}
