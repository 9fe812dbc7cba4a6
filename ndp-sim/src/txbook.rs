// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `TxBook`: the minimal transmit-collaborator stand-in described in
//! §10.6. Records delivered offsets and the latest credit/retransmit marks
//! per outbound message, and drives a trivial send-window scheduler for
//! this binary's demo traffic generator.
//!
//! Not a specification of retransmission scheduling (§1, §10.6).

use ndp_core::collaborators::{CreditSink, DeliveredSink, OpCode, RelOp};
use std::{
    collections::HashMap,
    collections::HashSet,
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct OutboundMsg {
    msg_len: u16,
    src_context: u16,
    dst_context: u16,
    delivered: HashSet<u16>,
    retransmit: HashSet<u16>,
    /// Offsets already handed out by `next_sendable_offset` that are
    /// neither delivered nor marked for retransmission yet -- kept so the
    /// send loop doesn't hand the same fresh offset out again every time it
    /// polls, only to have a NACK (if one arrives) move it into
    /// `retransmit` instead.
    outstanding: HashSet<u16>,
    credit: u16,
}

/// Cheaply `Clone`-able: every clone shares the same underlying state, so a
/// single `TxBook` can be wired into `IngressPipe` (as `DeliveredSink` and
/// `CreditSink`) and into the sender loop that reads `next_sendable_offset`.
#[derive(Clone, Default)]
pub struct TxBook {
    messages: Arc<Mutex<HashMap<u16, OutboundMsg>>>,
}

impl TxBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly-submitted outbound message so its credit and
    /// delivery state can be tracked from the first response onward.
    /// `src_context`/`dst_context` are stamped onto every `DATA` packet the
    /// send loop frames for this message.
    pub fn register(&self, tx_msg_id: u16, msg_len: u16, src_context: u16, dst_context: u16) {
        self.messages.lock().unwrap().entry(tx_msg_id).or_insert_with(|| OutboundMsg {
            msg_len,
            src_context,
            dst_context,
            ..Default::default()
        });
    }

    /// `(msg_len, src_context, dst_context)` for a registered message.
    pub fn header_fields(&self, tx_msg_id: u16) -> Option<(u16, u16, u16)> {
        self.messages
            .lock()
            .unwrap()
            .get(&tx_msg_id)
            .map(|m| (m.msg_len, m.src_context, m.dst_context))
    }

    pub fn is_fully_delivered(&self, tx_msg_id: u16) -> bool {
        let messages = self.messages.lock().unwrap();
        messages
            .get(&tx_msg_id)
            .is_some_and(|m| m.delivered.len() as u16 == m.msg_len)
    }

    pub fn credit(&self, tx_msg_id: u16) -> u16 {
        self.messages.lock().unwrap().get(&tx_msg_id).map_or(0, |m| m.credit)
    }

    /// The next offset that is within credit, not yet delivered, and not
    /// already outstanding -- a retransmit mark is served first if one is
    /// pending, ahead of fresh data.
    pub fn next_sendable_offset(&self, tx_msg_id: u16) -> Option<u16> {
        let mut messages = self.messages.lock().unwrap();
        let msg = messages.get_mut(&tx_msg_id)?;

        if let Some(&offset) = msg.retransmit.iter().min() {
            msg.retransmit.remove(&offset);
            msg.outstanding.insert(offset);
            return Some(offset);
        }

        let offset = (0..msg.credit).find(|offset| !msg.delivered.contains(offset) && !msg.outstanding.contains(offset))?;
        msg.outstanding.insert(offset);
        Some(offset)
    }
}

impl DeliveredSink for TxBook {
    fn delivered_event(&self, tx_msg_id: u16, pkt_offset: u16, is_interval: bool, msg_len: u16) {
        let mut messages = self.messages.lock().unwrap();
        let msg = messages.entry(tx_msg_id).or_insert_with(|| OutboundMsg {
            msg_len,
            ..Default::default()
        });

        if is_interval {
            for offset in 0..=pkt_offset {
                msg.delivered.insert(offset);
                msg.outstanding.remove(&offset);
            }
        } else {
            msg.delivered.insert(pkt_offset);
            msg.outstanding.remove(&pkt_offset);
        }
        msg.retransmit.remove(&pkt_offset);
    }
}

impl CreditSink for TxBook {
    fn credit_to_btx_event(
        &self,
        tx_msg_id: u16,
        rtx_pkt: Option<u16>,
        new_credit: Option<u16>,
        op_code: OpCode,
        comp_val: u16,
        rel_op: RelOp,
    ) {
        let mut messages = self.messages.lock().unwrap();
        let msg = messages.entry(tx_msg_id).or_insert_with(OutboundMsg::default);

        if let Some(rtx_pkt) = rtx_pkt {
            if !msg.delivered.contains(&rtx_pkt) {
                msg.retransmit.insert(rtx_pkt);
                msg.outstanding.remove(&rtx_pkt);
            }
        }

        if let Some(new_credit) = new_credit {
            let OpCode::Write = op_code;
            if rel_op.holds(comp_val, msg.credit) {
                msg.credit = new_credit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_only_advances_when_the_comparator_holds() {
        let book = TxBook::new();
        book.credit_to_btx_event(1, None, Some(5), OpCode::Write, 5, RelOp::Greater);
        assert_eq!(book.credit(1), 5);

        // A stale, lower credit value must not regress the stored credit.
        book.credit_to_btx_event(1, None, Some(3), OpCode::Write, 3, RelOp::Greater);
        assert_eq!(book.credit(1), 5);

        book.credit_to_btx_event(1, None, Some(6), OpCode::Write, 6, RelOp::Greater);
        assert_eq!(book.credit(1), 6);
    }

    #[test]
    fn nack_marks_a_pending_retransmit() {
        let book = TxBook::new();
        book.register(1, 10, 1, 2);
        book.credit_to_btx_event(1, Some(4), Some(6), OpCode::Write, 6, RelOp::Greater);
        assert_eq!(book.next_sendable_offset(1), Some(4));
    }

    #[test]
    fn delivered_event_clears_any_pending_retransmit_for_that_offset() {
        let book = TxBook::new();
        book.register(1, 10, 1, 2);
        book.credit_to_btx_event(1, Some(4), Some(6), OpCode::Write, 6, RelOp::Greater);
        book.delivered_event(1, 4, false, 10);
        assert_ne!(book.next_sendable_offset(1), Some(4));
    }

    #[test]
    fn an_outstanding_offset_is_not_handed_out_again_until_acked_or_nacked() {
        let book = TxBook::new();
        book.register(1, 10, 1, 2);
        book.credit_to_btx_event(1, None, Some(3), OpCode::Write, 3, RelOp::Greater);

        assert_eq!(book.next_sendable_offset(1), Some(0));
        assert_eq!(book.next_sendable_offset(1), Some(1));
        assert_eq!(book.next_sendable_offset(1), Some(2));
        assert_eq!(book.next_sendable_offset(1), None);

        book.delivered_event(1, 1, false, 10);
        assert_eq!(book.next_sendable_offset(1), Some(1));
    }

    #[test]
    fn fully_delivered_once_every_offset_is_acked() {
        let book = TxBook::new();
        book.register(1, 2, 1, 2);
        assert!(!book.is_fully_delivered(1));
        book.delivered_event(1, 0, false, 2);
        book.delivered_event(1, 1, false, 2);
        assert!(book.is_fully_delivered(1));
    }
}
