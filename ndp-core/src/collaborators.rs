// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The four externs `IngressPipe` and `PktGen` are wired to at construction
//! (§4.1 "Wiring (externs)", §6 "Collaborator interfaces").
//!
//! These traits are the seam between the protocol engine in this crate and
//! everything out of scope per §1: message assembly, transmit scheduling,
//! and retransmission policy. `ndp-sim` provides bare-bones implementations
//! (`RxMessageTable`, `TxBook`) to close the loop end-to-end; this crate
//! never assumes anything about their internals beyond this interface.

use core::net::IpAddr;

/// The receiver's answer about a just-arrived data packet, computed
/// *before* the packet is integrated into the reassembly state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RxMsgInfo {
    pub rx_msg_id: u32,
    /// The lowest unfilled offset in the reassembly bitmap, prior to this packet.
    pub ack_no: u16,
    pub is_new_msg: bool,
    pub is_new_pkt: bool,
}

/// Whether the read-modify-write in [`CreditSink::credit_to_btx_event`]
/// should write unconditionally or only if a comparison against the stored
/// value holds. §4.1 and §9 ("Read-modify-write extern") only ever exercise
/// `Write` with `Greater`, but the comparator is exposed as a value per the
/// switch-ASIC-register analogy in the design notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Write,
}

/// The comparison applied between `new_value` and the value currently
/// stored before `op` is allowed to take effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelOp {
    Greater,
}

impl RelOp {
    #[inline]
    pub fn holds(self, new_value: u16, stored_value: u16) -> bool {
        match self {
            RelOp::Greater => new_value > stored_value,
        }
    }
}

/// Pure lookup from the receiver's reassembly state. MUST NOT mutate
/// observable state (§6).
pub trait RxMsgInfoSource {
    fn get_rx_msg_info(
        &self,
        src_ip: IpAddr,
        src_context: u16,
        tx_msg_id: u16,
        msg_len: u16,
        pkt_offset: u16,
    ) -> RxMsgInfo;
}

/// Informs the transmit collaborator that a packet, or an interval of
/// packets, has been acknowledged.
pub trait DeliveredSink {
    fn delivered_event(&self, tx_msg_id: u16, pkt_offset: u16, is_interval: bool, msg_len: u16);
}

/// Informs the transmit collaborator of a retransmit mark and/or a credit
/// update via the read-modify-write primitive of §4.1/§9.
pub trait CreditSink {
    #[allow(clippy::too_many_arguments)]
    fn credit_to_btx_event(
        &self,
        tx_msg_id: u16,
        rtx_pkt: Option<u16>,
        new_credit: Option<u16>,
        op_code: OpCode,
        comp_val: u16,
        rel_op: RelOp,
    );
}

/// Asks `PktGen` to emit the specified control packet(s) for a just-arrived
/// data packet. Source/destination fields are already swapped relative to
/// the incoming packet by the time this is invoked (§4.1 step 5).
pub trait CtrlPktSink {
    #[allow(clippy::too_many_arguments)]
    fn ctrl_pkt_event(
        &self,
        gen_ack: bool,
        gen_nack: bool,
        gen_pull: bool,
        dst_ip: IpAddr,
        dst_context: u16,
        src_context: u16,
        tx_msg_id: u16,
        msg_len: u16,
        pkt_offset: u16,
        pull_offset: u16,
    );
}
