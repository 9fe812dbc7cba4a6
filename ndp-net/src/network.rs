// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `Network`: a single top-of-rack hop between two endpoints. Adds jitter,
//! deterministically trims data packets under configured congestion, and
//! delivers to the receiver's ingress with strict priority for control
//! traffic (§4.4).

use crate::queue::{NetworkPkt, TorQueue};
use ndp_core::{
    egress::Frame,
    packet::{self, Flags},
    time::Clock,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use crate::dist::DistGenerator;

/// Runtime knobs for a single TOR hop (§6).
#[derive(Clone, Copy, Debug)]
pub struct NetworkConfig {
    /// Deterministic 1-in-N trim rate; `0.0` disables trimming.
    pub data_pkt_trim_prob: f64,
    /// bits/ns on the link between the TOR and the receiving endpoint.
    pub rx_link_rate_bits_per_ns: f64,
}

/// A running TOR hop. Dropping this does not stop the spawned tasks;
/// closing the input channel passed to [`Network::spawn`] does.
pub struct Network {
    queue: Arc<Mutex<TorQueue>>,
}

impl Network {
    /// Spawns the `start_rx` and `start_tx` cooperative tasks (§5) that
    /// together implement this hop, reading framed packets from
    /// `egress_rx` and forwarding (possibly trimmed, jittered,
    /// priority-ordered) packets to `ingress_tx`.
    pub fn spawn<C>(
        config: NetworkConfig,
        data_pkt_delay: Box<dyn DistGenerator>,
        ctrl_pkt_delay: Box<dyn DistGenerator>,
        clock: C,
        mut egress_rx: mpsc::Receiver<Frame>,
        ingress_tx: mpsc::Sender<Frame>,
    ) -> Self
    where
        C: Clock + Clone,
    {
        let queue = Arc::new(Mutex::new(TorQueue::new()));
        let notify = Arc::new(Notify::new());
        let data_pkt_counter = Arc::new(AtomicU64::new(0));

        let rx_queue = queue.clone();
        let rx_notify = notify.clone();
        let rx_clock = clock.clone();
        tokio::spawn(async move {
            while let Some(frame) = egress_rx.recv().await {
                let is_data = packet::decode(&frame.bytes)
                    .map(|(header, _)| header.flags().contains(Flags::DATA))
                    .unwrap_or(false);

                let (delay, priority, frame) = if is_data {
                    let n = data_pkt_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if should_trim(n, config.data_pkt_trim_prob) {
                        trace!(n, "network: trimming data packet");
                        (ctrl_pkt_delay.sample(), 0u8, trim(frame))
                    } else {
                        (data_pkt_delay.sample(), 1u8, frame)
                    }
                } else {
                    (ctrl_pkt_delay.sample(), 0u8, frame)
                };

                // Each packet's jitter runs as its own concurrent delay, not
                // serialized behind whichever packet arrived first: a
                // control packet queued after a slower, already-delaying
                // data packet must still be able to reach the TOR queue
                // first.
                let queue = rx_queue.clone();
                let notify = rx_notify.clone();
                let clock = rx_clock.clone();
                tokio::spawn(async move {
                    clock.sleep(delay).await;
                    queue.lock().unwrap().push(NetworkPkt { frame, priority });
                    notify.notify_one();
                });
            }
            debug!("network: start_rx exiting, egress channel closed");
        });

        let tx_queue = queue.clone();
        let tx_notify = notify.clone();
        let tx_clock = clock;
        tokio::spawn(async move {
            loop {
                let pkt = loop {
                    if let Some(pkt) = tx_queue.lock().unwrap().pop() {
                        break pkt;
                    }
                    tx_notify.notified().await;
                };

                let delay = serialization_delay(pkt.frame.bytes.len(), config.rx_link_rate_bits_per_ns);
                tx_clock.sleep(delay).await;

                if ingress_tx.send(pkt.frame).await.is_err() {
                    break;
                }
            }
            debug!("network: start_tx exiting, ingress channel closed");
        });

        Self { queue }
    }

    /// Number of packets currently buffered in the TOR queue.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

fn should_trim(data_pkt_counter: u64, trim_prob: f64) -> bool {
    if trim_prob <= 0.0 {
        return false;
    }
    let n = (1.0 / trim_prob).floor() as u64;
    n > 0 && data_pkt_counter % n == 0
}

fn trim(frame: Frame) -> Frame {
    let (mut header, _payload) =
        packet::decode(&frame.bytes).expect("network only forwards NDP-framed packets");
    *header.flags_mut() |= Flags::CHOP;
    let bytes = packet::encode_to_vec(&header, &[]).freeze();
    Frame {
        dst_ip: frame.dst_ip,
        bytes,
    }
}

fn serialization_delay(len_bytes: usize, link_rate_bits_per_ns: f64) -> core::time::Duration {
    let bits = (len_bytes * 8) as f64;
    core::time::Duration::from_nanos((bits / link_rate_bits_per_ns).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::Fixed;
    use ndp_core::{packet::Header, time::PausedClock};
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))
    }

    fn data_frame(pkt_offset: u16) -> Frame {
        let header = Header::new(Flags::DATA, 1, 2, 42, 10, pkt_offset, 0);
        Frame {
            dst_ip: ip(),
            bytes: packet::encode_to_vec(&header, b"payload").freeze(),
        }
    }

    #[test]
    fn should_trim_every_third_packet_at_one_third_probability() {
        let calls: Vec<bool> = (1..=6).map(|n| should_trim(n, 1.0 / 3.0)).collect();
        assert_eq!(calls, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn zero_probability_never_trims() {
        for n in 1..=10 {
            assert!(!should_trim(n, 0.0));
        }
    }

    #[test]
    fn trimming_sets_chop_and_drops_the_payload() {
        let frame = data_frame(5);
        let trimmed = trim(frame);
        let (header, payload) = packet::decode(&trimmed.bytes).unwrap();
        assert!(header.flags().contains(Flags::CHOP));
        assert!(header.flags().contains(Flags::DATA));
        assert!(payload.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn control_overtakes_an_earlier_data_packet_in_the_tor_queue() {
        let (egress_tx, egress_rx) = mpsc::channel(16);
        let (ingress_tx, mut ingress_rx) = mpsc::channel(16);

        let config = NetworkConfig {
            data_pkt_trim_prob: 0.0,
            rx_link_rate_bits_per_ns: 10.0,
        };
        let _net = Network::spawn(
            config,
            Box::new(Fixed(core::time::Duration::from_nanos(100))),
            Box::new(Fixed(core::time::Duration::ZERO)),
            PausedClock,
            egress_rx,
            ingress_tx,
        );

        egress_tx.send(data_frame(0)).await.unwrap();
        let ack_header = Header::new(Flags::ACK, 1, 2, 42, 10, 0, 0);
        egress_tx
            .send(Frame {
                dst_ip: ip(),
                bytes: packet::encode_to_vec(&ack_header, &[]).freeze(),
            })
            .await
            .unwrap();

        tokio::time::advance(core::time::Duration::from_millis(1)).await;

        let first = ingress_rx.recv().await.unwrap();
        let (first_header, _) = packet::decode(&first.bytes).unwrap();
        assert!(first_header.flags().contains(Flags::ACK));
    }
}
