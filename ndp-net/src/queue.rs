// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The TOR's internal priority queue: strict priority between control and
//! data traffic, FIFO within each class (§4.4, §9 "Priority queue
//! stability").

use ndp_core::egress::Frame;
use std::{cmp::Ordering, collections::BinaryHeap};

/// `0` = control, `1` = data; lower value sorts first (§3 "Network packet
/// wrapper").
pub type Priority = u8;

/// A packet in flight through the TOR, tagged with its priority class.
#[derive(Clone, Debug)]
pub struct NetworkPkt {
    pub frame: Frame,
    pub priority: Priority,
}

/// Wraps a [`NetworkPkt`] with a strictly increasing insertion sequence so
/// the backing `BinaryHeap` breaks priority ties in arrival order, per the
/// spec's explicit stability requirement.
struct Entry {
    pkt: NetworkPkt,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.pkt.priority == other.pkt.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert priority so lower values (more
        // urgent) and earlier sequence numbers compare greater.
        other
            .pkt
            .priority
            .cmp(&self.pkt.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A stable priority queue: pops the lowest-`priority` packet first,
/// breaking ties by insertion order.
#[derive(Default)]
pub struct TorQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl TorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pkt: NetworkPkt) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { pkt, seq });
    }

    pub fn pop(&mut self) -> Option<NetworkPkt> {
        self.heap.pop().map(|entry| entry.pkt)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn frame(tag: u8) -> Frame {
        Frame {
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, tag)),
            bytes: bytes::Bytes::from(vec![tag]),
        }
    }

    #[test]
    fn control_always_precedes_data() {
        let mut q = TorQueue::new();
        q.push(NetworkPkt { frame: frame(1), priority: 1 });
        q.push(NetworkPkt { frame: frame(2), priority: 0 });

        assert_eq!(q.pop().unwrap().priority, 0);
        assert_eq!(q.pop().unwrap().priority, 1);
    }

    #[test]
    fn same_priority_preserves_fifo_order() {
        let mut q = TorQueue::new();
        for tag in 0..5u8 {
            q.push(NetworkPkt { frame: frame(tag), priority: 1 });
        }
        for tag in 0..5u8 {
            let popped = q.pop().unwrap();
            assert_eq!(popped.frame.dst_ip, frame(tag).dst_ip);
        }
    }
}
