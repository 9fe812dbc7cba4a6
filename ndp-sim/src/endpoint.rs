// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wires one simulated endpoint's `IngressPipe` / `EgressPipe` / `PktGen`
//! together with its `RxMessageTable` / `TxBook` collaborator stand-ins, and
//! drives a minimal credit-driven send loop so a submitted message actually
//! flows out across an `ndp_net::Network` hop (§10.1).

use crate::{assembler::RxMessageTable, txbook::TxBook};
use bytes::Bytes;
use ndp_core::{
    egress::{EgressPipe, Frame, Payload},
    ingress::{Delivery, IngressPipe},
    metadata::{DataMeta, EgressMeta},
    packet,
    pktgen::PktGen,
    time::{Clock, TokioClock},
};
use std::{
    net::IpAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// How often the send loop re-checks `TxBook` credit for sendable offsets.
/// Coarser than `inter_packet_time` on purpose: this is a scheduling
/// stand-in (§10.6), not the paced control path itself.
const SEND_POLL_INTERVAL: Duration = Duration::from_nanos(100);

/// A running endpoint. Its tasks live as long as the channels wired into
/// [`Endpoint::spawn`] stay open; dropping this handle does not stop them.
pub struct Endpoint {
    pub tx_book: TxBook,
    pub rx_table: RxMessageTable,
    active: Arc<Mutex<Vec<u16>>>,
    delivered_rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Endpoint {
    /// Spawns the ingress, egress, and send-loop tasks for one endpoint.
    ///
    /// `net_ingress_rx` carries frames arriving from the network;
    /// `net_egress_tx` is where framed, paced outbound packets are handed to
    /// it. `peer_ip` is the single peer this demo endpoint talks to; the
    /// per-flow `src_context`/`dst_context` for each outbound message are
    /// supplied later, at [`Endpoint::submit_message`].
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        peer_ip: IpAddr,
        rtt_pkts: u16,
        tx_link_rate_bits_per_ns: f64,
        inter_packet_time: Duration,
        net_ingress_rx: mpsc::Receiver<Frame>,
        net_egress_tx: mpsc::Sender<Frame>,
    ) -> Self {
        let clock = TokioClock;
        let rx_table = RxMessageTable::new();
        let tx_book = TxBook::new();
        let active = Arc::new(Mutex::new(Vec::new()));

        let (arbiter_tx, mut arbiter_rx) = mpsc::channel::<(EgressMeta, Payload)>(1024);
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel::<Delivery>();

        let pktgen = PktGen::spawn(inter_packet_time, clock, arbiter_tx.clone());
        let mut ingress = IngressPipe::new(rtt_pkts, rx_table.clone(), tx_book.clone(), tx_book.clone(), pktgen);

        let mut ingress_rx = net_ingress_rx;
        tokio::spawn(async move {
            while let Some(frame) = ingress_rx.recv().await {
                let (header, payload) = match packet::decode(&frame.bytes) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(%err, "endpoint: dropping unparseable frame");
                        continue;
                    }
                };
                if let Some(delivery) = ingress.receive(peer_ip, &header, payload) {
                    trace!(
                        rx_msg_id = delivery.meta.rx_msg_id,
                        pkt_offset = delivery.meta.pkt_offset,
                        "endpoint: delivered to assembler"
                    );
                    if delivered_tx.send(delivery).is_err() {
                        break;
                    }
                }
            }
        });

        let egress = EgressPipe::new(tx_link_rate_bits_per_ns, clock);
        tokio::spawn(async move {
            while let Some((meta, payload)) = arbiter_rx.recv().await {
                let frame = egress.send(meta, payload).await;
                if net_egress_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let send_tx_book = tx_book.clone();
        let send_active = active.clone();
        let send_arbiter_tx = arbiter_tx;
        tokio::spawn(async move {
            loop {
                clock.sleep(SEND_POLL_INTERVAL).await;

                let msg_ids: Vec<u16> = send_active.lock().unwrap().clone();
                for tx_msg_id in msg_ids {
                    let Some((msg_len, src_context, dst_context)) = send_tx_book.header_fields(tx_msg_id) else {
                        continue;
                    };
                    let Some(pkt_offset) = send_tx_book.next_sendable_offset(tx_msg_id) else {
                        continue;
                    };

                    let meta = EgressMeta::data(
                        peer_ip,
                        DataMeta {
                            src_context,
                            dst_context,
                            tx_msg_id,
                            msg_len,
                            pkt_offset,
                        },
                    );
                    let payload = Payload::Data(Bytes::from(pkt_offset.to_be_bytes().to_vec()));
                    if send_arbiter_tx.try_send((meta, payload)).is_err() {
                        warn!(tx_msg_id, pkt_offset, "endpoint: arbiter queue full, retrying next poll");
                    }
                }

                send_active.lock().unwrap().retain(|id| !send_tx_book.is_fully_delivered(*id));
            }
        });

        Self {
            tx_book,
            rx_table,
            active,
            delivered_rx,
        }
    }

    /// Submits a new outbound message of `msg_len` packets. `src_context`/
    /// `dst_context` identify the flow to the peer and are stamped on every
    /// `DATA` packet the send loop frames for it.
    pub fn submit_message(&self, tx_msg_id: u16, msg_len: u16, src_context: u16, dst_context: u16) {
        self.tx_book.register(tx_msg_id, msg_len, src_context, dst_context);
        self.active.lock().unwrap().push(tx_msg_id);
    }

    pub fn is_fully_delivered(&self, tx_msg_id: u16) -> bool {
        self.tx_book.is_fully_delivered(tx_msg_id)
    }

    /// Waits for and returns the next successfully-received (non-chopped)
    /// data packet delivered to this endpoint's assembler stand-in.
    pub async fn recv_delivery(&mut self) -> Option<Delivery> {
        self.delivered_rx.recv().await
    }
}
