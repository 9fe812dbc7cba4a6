// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Metadata carried alongside payloads between the protocol engine and its
//! collaborators, as distinct from the wire [`Header`](crate::packet::Header).

use core::net::IpAddr;

/// Describes an item sitting in the arbiter queue, waiting for [`EgressPipe`](crate::egress::EgressPipe)
/// to frame and serialise it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EgressMeta {
    pub dst_ip: IpAddr,
    /// `None` for already-constructed control packets; `Some` carries the
    /// header fields `EgressPipe` must stamp onto a fresh data packet.
    pub data: Option<DataMeta>,
}

impl EgressMeta {
    #[inline]
    pub fn data(dst_ip: IpAddr, data: DataMeta) -> Self {
        Self {
            dst_ip,
            data: Some(data),
        }
    }

    #[inline]
    pub fn control(dst_ip: IpAddr) -> Self {
        Self { dst_ip, data: None }
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        self.data.is_some()
    }
}

/// Header fields `EgressPipe` stamps onto a fresh `DATA` packet it is
/// framing from a bare payload handed over by the transmit collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataMeta {
    pub src_context: u16,
    pub dst_context: u16,
    pub tx_msg_id: u16,
    pub msg_len: u16,
    pub pkt_offset: u16,
}

/// What `IngressPipe` hands the assembler collaborator for every
/// successfully-received (non-chopped) data packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReassembleMeta {
    pub rx_msg_id: u32,
    pub src_ip: IpAddr,
    pub src_context: u16,
    pub tx_msg_id: u16,
    pub msg_len: u16,
    pub pkt_offset: u16,
}
