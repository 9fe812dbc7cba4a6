// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `RxMessageTable`: the minimal `getRxMsgInfo` stand-in described in §10.6.
//! Assigns `rx_msg_id` sequentially per `(src_ip, src_context, tx_msg_id)`
//! and tracks a received-packet bitmap per message to compute `ack_no`.
//!
//! This is not a specification of message assembly (§1, §10.6): it exists
//! solely to close the loop in this binary and its integration test.

use ndp_core::collaborators::{RxMsgInfo, RxMsgInfoSource};
use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex},
};

type Key = (IpAddr, u16, u16);

struct MsgState {
    rx_msg_id: u32,
    received: Vec<bool>,
}

impl MsgState {
    fn new(rx_msg_id: u32, msg_len: u16) -> Self {
        Self {
            rx_msg_id,
            received: vec![false; msg_len as usize],
        }
    }

    /// The lowest offset not yet marked received.
    fn ack_no(&self) -> u16 {
        self.received.iter().position(|seen| !seen).map_or(self.received.len() as u16, |idx| idx as u16)
    }
}

#[derive(Default)]
struct Inner {
    messages: HashMap<Key, MsgState>,
    next_rx_msg_id: u32,
}

/// Assigns receive-message identities and answers `getRxMsgInfo` lookups.
///
/// Cheaply `Clone`-able: every clone shares the same underlying state, so it
/// can be wired into `IngressPipe` while the receiving side of the demo
/// traffic loop still asks it whether a message is fully received.
#[derive(Clone)]
pub struct RxMessageTable {
    inner: Arc<Mutex<Inner>>,
}

impl Default for RxMessageTable {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }
}

impl RxMessageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every offset of `rx_msg_id` has been observed. Used to
    /// decide when a receive message's credit entry may be retired.
    pub fn is_fully_received(&self, rx_msg_id: u32) -> bool {
        self.inner
            .lock()
            .unwrap()
            .messages
            .values()
            .find(|state| state.rx_msg_id == rx_msg_id)
            .is_some_and(|state| state.received.iter().all(|seen| *seen))
    }
}

impl RxMsgInfoSource for RxMessageTable {
    fn get_rx_msg_info(
        &self,
        src_ip: IpAddr,
        src_context: u16,
        tx_msg_id: u16,
        msg_len: u16,
        pkt_offset: u16,
    ) -> RxMsgInfo {
        let mut inner = self.inner.lock().unwrap();
        let key = (src_ip, src_context, tx_msg_id);

        let is_new_msg = !inner.messages.contains_key(&key);
        if is_new_msg {
            let rx_msg_id = inner.next_rx_msg_id;
            inner.next_rx_msg_id += 1;
            inner.messages.insert(key, MsgState::new(rx_msg_id, msg_len));
        }

        let state = inner.messages.get_mut(&key).expect("just inserted above");
        let ack_no = state.ack_no();

        let offset = pkt_offset as usize;
        let is_new_pkt = offset >= state.received.len() || !state.received[offset];
        if offset < state.received.len() {
            state.received[offset] = true;
        }

        RxMsgInfo {
            rx_msg_id: state.rx_msg_id,
            ack_no,
            is_new_msg,
            is_new_pkt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    #[test]
    fn assigns_sequential_rx_msg_ids_per_flow() {
        let table = RxMessageTable::new();
        let a = table.get_rx_msg_info(ip(), 1, 100, 10, 0);
        let b = table.get_rx_msg_info(ip(), 1, 200, 10, 0);
        assert_ne!(a.rx_msg_id, b.rx_msg_id);
        assert!(a.is_new_msg);
        assert!(b.is_new_msg);
    }

    #[test]
    fn ack_no_tracks_the_lowest_unfilled_offset() {
        let table = RxMessageTable::new();
        table.get_rx_msg_info(ip(), 1, 100, 10, 0);
        let info = table.get_rx_msg_info(ip(), 1, 100, 10, 1);
        assert_eq!(info.ack_no, 1);
        assert!(!info.is_new_msg);
    }

    #[test]
    fn reobserving_an_offset_is_not_a_new_packet() {
        let table = RxMessageTable::new();
        table.get_rx_msg_info(ip(), 1, 100, 10, 2);
        let info = table.get_rx_msg_info(ip(), 1, 100, 10, 2);
        assert!(!info.is_new_pkt);
    }
}
