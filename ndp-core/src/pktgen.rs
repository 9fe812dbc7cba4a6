// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `PktGen`: emits ACK/NACK/PULL control packets on request, coalescing
//! them when legal, and pacing PULLs so at most one leaves per
//! serialisation time of a max-sized data packet on the incoming link
//! (§4.3).

use crate::{
    collaborators::{CreditSink, CtrlPktSink, DeliveredSink, OpCode, RelOp},
    egress::Payload,
    metadata::EgressMeta,
    packet::{encode_to_vec, Flags, Header},
    time::Clock,
};
use core::{net::IpAddr, time::Duration};
use std::{sync::Mutex, time::Instant};
use tokio::sync::mpsc;
use tracing::{trace, warn};

struct PacerState {
    last_tx_time: Option<Instant>,
}

/// What a `ctrlPktEvent` call for one incoming data packet needs in order
/// to build the outgoing control header(s). All other `CtrlPktSink` fields
/// are passed straight through from the call.
struct CtrlFields {
    dst_context: u16,
    src_context: u16,
    tx_msg_id: u16,
    msg_len: u16,
    pkt_offset: u16,
    pull_offset: u16,
}

/// Emits and paces the control-plane half of the protocol.
///
/// `inter_packet_time` and `arbiter_tx`'s capacity are configuration; see
/// §6 for how `inter_packet_time` is derived from `max_pkt_len` and
/// `rx_link_rate`.
pub struct PktGen<C> {
    state: Mutex<PacerState>,
    inter_packet_time: Duration,
    clock: C,
    pacer_tx: mpsc::UnboundedSender<(EgressMeta, Header, Instant)>,
    arbiter_tx: mpsc::Sender<(EgressMeta, Payload)>,
}

impl<C> PktGen<C>
where
    C: Clock + Clone,
{
    /// Spawns the pacer task and returns a handle wired to `arbiter_tx`.
    ///
    /// The pacer queue itself is unbounded: it is a pure timing buffer
    /// whose single consumer drains it at the paced rate by construction,
    /// and `ctrlPktEvent` (§5) must not suspend on it — a bounded channel
    /// here would either block the extern or require a fallible push with
    /// nowhere useful to report the failure.
    pub fn spawn(inter_packet_time: Duration, clock: C, arbiter_tx: mpsc::Sender<(EgressMeta, Payload)>) -> Self {
        let (pacer_tx, mut pacer_rx) = mpsc::unbounded_channel::<(EgressMeta, Header, Instant)>();
        let arbiter_for_pacer = arbiter_tx.clone();
        let clock_for_pacer = clock.clone();

        tokio::spawn(async move {
            while let Some((meta, header, tx_time)) = pacer_rx.recv().await {
                // Computed relative to dequeue time, not call time: items
                // enqueued back-to-back must not compound each other's
                // wait by sleeping a stale duration (§4.3's pacing
                // invariant is about release time, not queue residency).
                let remaining = tx_time.saturating_duration_since(clock_for_pacer.now());
                clock_for_pacer.sleep(remaining).await;
                let bytes = encode_to_vec(&header, &[]).freeze();
                trace!(pull_offset = header.pull_offset(), "pktgen: pull released from pacer");
                if arbiter_for_pacer
                    .send((meta, Payload::Control(bytes)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            state: Mutex::new(PacerState { last_tx_time: None }),
            inter_packet_time,
            clock,
            pacer_tx,
            arbiter_tx,
        }
    }

    /// `inter_packet_time := (max_pkt_len + header_len) * 8 / rx_link_rate` (§4.3).
    pub fn inter_packet_time(max_pkt_len: usize, header_len: usize, rx_link_rate_bits_per_ns: f64) -> Duration {
        let bits = ((max_pkt_len + header_len) * 8) as f64;
        Duration::from_nanos((bits / rx_link_rate_bits_per_ns).round() as u64)
    }

    /// Applies the pacing invariant and returns `(delay, release_time)` for
    /// this PULL, updating `pacer_lastTxTime` as a side effect. `delay` is
    /// `Duration::ZERO` iff this PULL is unpaced, which is what governs
    /// ACK/NACK coalescing; `release_time` is the absolute instant the
    /// pacer task should release it at.
    fn pace_pull(&self, now: Instant) -> (Duration, Instant) {
        let mut state = self.state.lock().unwrap();
        let tx_time = match state.last_tx_time {
            Some(last) => last + self.inter_packet_time,
            // "initialised to -inter_packet_time so the first PULL is unpaced" (§4.3):
            // any `now` is already >= an unset target, so the first call always
            // takes the zero-delay branch below.
            None => now,
        };

        if now < tx_time {
            state.last_tx_time = Some(tx_time);
            (tx_time - now, tx_time)
        } else {
            state.last_tx_time = Some(now);
            (Duration::ZERO, now)
        }
    }

    fn enqueue_pull(&self, meta: EgressMeta, header: Header, release_time: Instant) {
        if self.pacer_tx.send((meta, header, release_time)).is_err() {
            warn!("pktgen: pacer task is gone, dropping PULL");
        }
    }

    fn emit_now(&self, meta: EgressMeta, header: Header) {
        let bytes = encode_to_vec(&header, &[]).freeze();
        if self.arbiter_tx.try_send((meta, Payload::Control(bytes))).is_err() {
            warn!("pktgen: arbiter queue full, dropping control packet");
        }
    }

    fn ack_header(&self, f: &CtrlFields) -> Header {
        Header::new(Flags::ACK, f.src_context, f.dst_context, f.tx_msg_id, f.msg_len, f.pkt_offset, 0)
    }

    fn nack_header(&self, f: &CtrlFields) -> Header {
        Header::new(Flags::NACK, f.src_context, f.dst_context, f.tx_msg_id, f.msg_len, f.pkt_offset, 0)
    }
}

impl<C> CtrlPktSink for PktGen<C>
where
    C: Clock + Clone,
{
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
    ) {
        let fields = CtrlFields {
            dst_context,
            src_context,
            tx_msg_id,
            msg_len,
            pkt_offset,
            pull_offset,
        };
        let meta = EgressMeta::control(dst_ip);

        if !gen_pull {
            if gen_ack {
                self.emit_now(meta, self.ack_header(&fields));
            }
            if gen_nack {
                self.emit_now(meta, self.nack_header(&fields));
            }
            return;
        }

        let now = self.clock.now();
        let (delay, release_time) = self.pace_pull(now);

        let mut flags = Flags::PULL;
        let fold_ack = delay.is_zero() && gen_ack;
        let fold_nack = delay.is_zero() && gen_nack;
        if fold_ack {
            flags |= Flags::ACK;
        }
        if fold_nack {
            flags |= Flags::NACK;
        }

        let header = Header::new(
            flags,
            fields.src_context,
            fields.dst_context,
            fields.tx_msg_id,
            fields.msg_len,
            fields.pkt_offset,
            fields.pull_offset,
        );
        trace!(?delay, pull_offset, fold_ack, fold_nack, "pktgen: pull scheduled");
        self.enqueue_pull(meta, header, release_time);

        if gen_ack && !fold_ack {
            self.emit_now(meta, self.ack_header(&fields));
        }
        if gen_nack && !fold_nack {
            self.emit_now(meta, self.nack_header(&fields));
        }
    }
}

/// `PktGen` only ever plays the `CtrlPktSink` role; `IngressPipe` is
/// generic over all four collaborator traits independently, so these
/// blanket impls are never required by production wiring (`ndp-sim` wires
/// a distinct `TxBook` for `DeliveredSink`/`CreditSink`) and exist only to
/// keep this module self-contained for the doc example above.
impl<C> DeliveredSink for PktGen<C> {
    fn delivered_event(&self, _tx_msg_id: u16, _pkt_offset: u16, _is_interval: bool, _msg_len: u16) {
        unreachable!("PktGen does not implement the transmit collaborator; wire a TxBook instead")
    }
}

impl<C> CreditSink for PktGen<C> {
    fn credit_to_btx_event(
        &self,
        _tx_msg_id: u16,
        _rtx_pkt: Option<u16>,
        _new_credit: Option<u16>,
        _op_code: OpCode,
        _comp_val: u16,
        _rel_op: RelOp,
    ) {
        unreachable!("PktGen does not implement the transmit collaborator; wire a TxBook instead")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3))
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_ack_into_an_unpaced_pull() {
        let (arbiter_tx, mut arbiter_rx) = mpsc::channel(8);
        let pktgen = PktGen::spawn(Duration::from_nanos(1246), crate::time::PausedClock, arbiter_tx);

        pktgen.ctrl_pkt_event(true, false, true, ip(), 1, 2, 42, 10, 0, 6);

        let (_meta, payload) = arbiter_rx.recv().await.unwrap();
        let Payload::Control(bytes) = payload else {
            panic!("expected a control packet")
        };
        let (header, _) = crate::packet::decode(&bytes).unwrap();
        assert!(header.flags().contains(Flags::PULL));
        assert!(header.flags().contains(Flags::ACK));
        assert_eq!(header.pull_offset(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_coalesce_when_the_pull_must_wait() {
        let (arbiter_tx, mut arbiter_rx) = mpsc::channel(8);
        let pktgen = PktGen::spawn(Duration::from_nanos(1246), crate::time::PausedClock, arbiter_tx);

        // First PULL is unpaced and consumes the pacer slot.
        pktgen.ctrl_pkt_event(false, false, true, ip(), 1, 2, 42, 10, 0, 1);
        let (_meta, first) = arbiter_rx.recv().await.unwrap();
        let Payload::Control(first_bytes) = first else {
            panic!()
        };
        let (first_header, _) = crate::packet::decode(&first_bytes).unwrap();
        assert!(!first_header.flags().contains(Flags::ACK));

        // Second, immediately following, must be paced -> ACK emitted standalone.
        pktgen.ctrl_pkt_event(true, false, true, ip(), 1, 2, 42, 10, 1, 2);

        let (_meta, standalone) = arbiter_rx.recv().await.unwrap();
        let Payload::Control(standalone_bytes) = standalone else {
            panic!()
        };
        let (standalone_header, _) = crate::packet::decode(&standalone_bytes).unwrap();
        assert!(standalone_header.flags().contains(Flags::ACK));
        assert!(!standalone_header.flags().contains(Flags::PULL));

        tokio::time::advance(Duration::from_nanos(1246)).await;
        let (_meta, paced) = arbiter_rx.recv().await.unwrap();
        let Payload::Control(paced_bytes) = paced else {
            panic!()
        };
        let (paced_header, _) = crate::packet::decode(&paced_bytes).unwrap();
        assert!(paced_header.flags().contains(Flags::PULL));
        assert!(!paced_header.flags().contains(Flags::ACK));
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_6_three_back_to_back_pulls_are_separated_by_inter_packet_time() {
        let (arbiter_tx, mut arbiter_rx) = mpsc::channel(8);
        let inter_packet_time = PktGen::<crate::time::PausedClock>::inter_packet_time(1500, 58, 10.0);
        assert_eq!(inter_packet_time, Duration::from_nanos(1246));

        let pktgen = PktGen::spawn(inter_packet_time, crate::time::PausedClock, arbiter_tx);
        for pkt_offset in 0..3u16 {
            pktgen.ctrl_pkt_event(false, false, true, ip(), 1, 2, 42, 10, pkt_offset, pkt_offset + 1);
        }

        for expected_pull_offset in 1..=3u16 {
            tokio::time::advance(inter_packet_time).await;
            let (_meta, payload) = arbiter_rx.recv().await.unwrap();
            let Payload::Control(bytes) = payload else {
                panic!()
            };
            let (header, _) = crate::packet::decode(&bytes).unwrap();
            assert!(header.flags().contains(Flags::PULL));
            assert_eq!(header.pull_offset(), expected_pull_offset);
        }
    }
}
