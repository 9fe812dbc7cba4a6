// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `IngressPipe`: classifies arriving packets, maintains per-message receive
//! credit, and fires the right combination of control-plane events (§4.1).

use crate::{
    collaborators::{CreditSink, CtrlPktSink, DeliveredSink, OpCode, RelOp, RxMsgInfoSource},
    credit::CreditMap,
    metadata::ReassembleMeta,
    packet::{Flags, Header},
};
use core::net::IpAddr;
use tracing::{debug, trace};

/// What `IngressPipe` hands the assembler for a successfully-received
/// (non-chopped) data packet.
pub struct Delivery {
    pub meta: ReassembleMeta,
    pub payload: Vec<u8>,
}

/// Classifies incoming packets and drives the four collaborator externs.
///
/// `rtt_pkts` is the initial credit granted per new message (§6).
pub struct IngressPipe<R, D, C, P> {
    rtt_pkts: u16,
    credit: CreditMap,
    rx_msg_info: R,
    delivered: D,
    credit_sink: C,
    ctrl_pkt: P,
}

impl<R, D, C, P> IngressPipe<R, D, C, P>
where
    R: RxMsgInfoSource,
    D: DeliveredSink,
    C: CreditSink,
    P: CtrlPktSink,
{
    pub fn new(rtt_pkts: u16, rx_msg_info: R, delivered: D, credit_sink: C, ctrl_pkt: P) -> Self {
        Self {
            rtt_pkts,
            credit: CreditMap::new(),
            rx_msg_info,
            delivered,
            credit_sink,
            ctrl_pkt,
        }
    }

    #[inline]
    pub fn credit(&self, rx_msg_id: u32) -> Option<u16> {
        self.credit.get(rx_msg_id)
    }

    /// Processes one arrived packet, returning the payload to forward to
    /// the assembler, if any (§4.1's data path, step 3).
    pub fn receive(&mut self, src_ip: IpAddr, header: &Header, payload: &[u8]) -> Option<Delivery> {
        let flags = header.flags();
        trace!(?flags, tx_msg_id = header.tx_msg_id(), pkt_offset = header.pkt_offset(), "ingress: packet received");

        if flags.contains(Flags::DATA) {
            self.receive_data(src_ip, header, payload, flags)
        } else {
            self.receive_control(header, flags);
            None
        }
    }

    fn receive_data(
        &mut self,
        src_ip: IpAddr,
        header: &Header,
        payload: &[u8],
        flags: Flags,
    ) -> Option<Delivery> {
        let info = self.rx_msg_info.get_rx_msg_info(
            src_ip,
            header.src_context(),
            header.tx_msg_id(),
            header.msg_len(),
            header.pkt_offset(),
        );

        let chopped = flags.contains(Flags::CHOP);
        let (gen_ack, gen_nack, pull_offset_diff, delivery) = if chopped {
            (false, true, 0u16, None)
        } else {
            let meta = ReassembleMeta {
                rx_msg_id: info.rx_msg_id,
                src_ip,
                src_context: header.src_context(),
                tx_msg_id: header.tx_msg_id(),
                msg_len: header.msg_len(),
                pkt_offset: header.pkt_offset(),
            };
            (
                true,
                false,
                1u16,
                Some(Delivery {
                    meta,
                    payload: payload.to_vec(),
                }),
            )
        };

        let pull_offset = if info.is_new_msg {
            self.credit.init(info.rx_msg_id, self.rtt_pkts, pull_offset_diff)
        } else {
            self.credit.advance(info.rx_msg_id, pull_offset_diff)
        };

        debug!(
            rx_msg_id = info.rx_msg_id,
            chopped,
            pull_offset,
            "ingress: credit updated"
        );

        // Control source/destination fields are swapped relative to the
        // incoming packet (§4.1 step 5).
        self.ctrl_pkt.ctrl_pkt_event(
            gen_ack,
            gen_nack,
            true,
            src_ip,
            header.src_context(),
            header.dst_context(),
            header.tx_msg_id(),
            header.msg_len(),
            header.pkt_offset(),
            pull_offset,
        );

        delivery
    }

    fn receive_control(&self, header: &Header, flags: Flags) {
        if flags.contains(Flags::ACK) {
            self.delivered.delivered_event(header.tx_msg_id(), header.pkt_offset(), false, header.msg_len());
        }

        if flags.contains(Flags::PULL) || flags.contains(Flags::NACK) {
            let rtx_pkt = flags.contains(Flags::NACK).then_some(header.pkt_offset());
            let new_credit = flags.contains(Flags::PULL).then_some(header.pull_offset());
            let comp_val = new_credit.unwrap_or(0);
            self.credit_sink.credit_to_btx_event(
                header.tx_msg_id(),
                rtx_pkt,
                new_credit,
                OpCode::Write,
                comp_val,
                RelOp::Greater,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCollaborators, RxMsgInfoScript};
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    fn pipe(
        script: RxMsgInfoScript,
    ) -> (
        IngressPipe<RxMsgInfoScript, FakeCollaborators, FakeCollaborators, FakeCollaborators>,
        FakeCollaborators,
    ) {
        let shared = FakeCollaborators::default();
        let ingress = IngressPipe::new(5, script, shared.clone(), shared.clone(), shared.clone());
        (ingress, shared)
    }

    #[test]
    fn scenario_1_fresh_data_packet() {
        let script = RxMsgInfoScript::always(crate::collaborators::RxMsgInfo {
            rx_msg_id: 7,
            ack_no: 0,
            is_new_msg: true,
            is_new_pkt: true,
        });
        let (mut ingress, shared) = pipe(script);

        let header = Header::new(Flags::DATA, 0, 0, 1, 10, 0, 0);
        let delivery = ingress.receive(ip(), &header, b"payload").unwrap();
        assert_eq!(delivery.meta.rx_msg_id, 7);
        assert_eq!(delivery.payload, b"payload");
        assert_eq!(ingress.credit(7), Some(6));

        let calls = shared.ctrl_pkt_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].gen_ack);
        assert!(!calls[0].gen_nack);
        assert!(calls[0].gen_pull);
        assert_eq!(calls[0].pull_offset, 6);
    }

    #[test]
    fn scenario_2_subsequent_data_packet() {
        let script = RxMsgInfoScript::always(crate::collaborators::RxMsgInfo {
            rx_msg_id: 7,
            ack_no: 1,
            is_new_msg: false,
            is_new_pkt: true,
        });
        let (mut ingress, _shared) = pipe(script);
        ingress.credit.init(7, 5, 1);

        let header = Header::new(Flags::DATA, 0, 0, 1, 10, 1, 0);
        ingress.receive(ip(), &header, b"x").unwrap();
        assert_eq!(ingress.credit(7), Some(7));
    }

    #[test]
    fn scenario_3_trimmed_packet_withholds_payload_and_credit() {
        let script = RxMsgInfoScript::always(crate::collaborators::RxMsgInfo {
            rx_msg_id: 7,
            ack_no: 2,
            is_new_msg: false,
            is_new_pkt: true,
        });
        let (mut ingress, shared) = pipe(script);
        ingress.credit.init(7, 5, 1);
        ingress.credit.advance(7, 1);

        let header = Header::new(Flags::DATA | Flags::CHOP, 0, 0, 1, 10, 2, 0);
        let delivery = ingress.receive(ip(), &header, b"ignored");
        assert!(delivery.is_none());
        assert_eq!(ingress.credit(7), Some(7));

        let calls = shared.ctrl_pkt_calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].gen_ack);
        assert!(calls[0].gen_nack);
        assert!(calls[0].gen_pull);
        assert_eq!(calls[0].pull_offset, 7);
    }

    #[test]
    fn scenario_4_ack_reception_fires_delivered_event_only() {
        let script = RxMsgInfoScript::always(crate::collaborators::RxMsgInfo {
            rx_msg_id: 0,
            ack_no: 0,
            is_new_msg: false,
            is_new_pkt: false,
        });
        let (mut ingress, shared) = pipe(script);

        let header = Header::new(Flags::ACK, 0, 0, 42, 10, 3, 0);
        let delivery = ingress.receive(ip(), &header, &[]);
        assert!(delivery.is_none());

        let delivered = shared.delivered_calls();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], (42, 3, false, 10));
        assert!(shared.ctrl_pkt_calls().is_empty());
    }

    #[test]
    fn scenario_5_combined_pull_and_nack_reception() {
        let script = RxMsgInfoScript::always(crate::collaborators::RxMsgInfo {
            rx_msg_id: 0,
            ack_no: 0,
            is_new_msg: false,
            is_new_pkt: false,
        });
        let (mut ingress, shared) = pipe(script);

        let header = Header::new(Flags::PULL | Flags::NACK, 0, 0, 42, 10, 4, 11);
        ingress.receive(ip(), &header, &[]);

        let calls = shared.credit_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tx_msg_id, 42);
        assert_eq!(calls[0].rtx_pkt, Some(4));
        assert_eq!(calls[0].new_credit, Some(11));
        assert_eq!(calls[0].comp_val, 11);
    }
}
