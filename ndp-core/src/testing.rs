// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fake collaborator implementations used by this crate's own scenario
//! tests (§8 "Concrete scenarios"). These record every call made to them so
//! assertions can inspect exactly which events fired, in order.
//!
//! Not a specification of assembler/transmit-collaborator behavior (§1,
//! §10.6) — `ndp-sim` carries its own, separate, traffic-driving stand-ins.

use crate::collaborators::{
    CreditSink, CtrlPktSink, DeliveredSink, OpCode, RelOp, RxMsgInfo, RxMsgInfoSource,
};
use core::net::IpAddr;
use std::{cell::RefCell, rc::Rc};

/// A [`RxMsgInfoSource`] that always returns the same canned answer,
/// regardless of input. Sufficient for the single-packet scenarios in §8.
#[derive(Clone)]
pub struct RxMsgInfoScript {
    answer: RxMsgInfo,
}

impl RxMsgInfoScript {
    pub fn always(answer: RxMsgInfo) -> Self {
        Self { answer }
    }
}

impl RxMsgInfoSource for RxMsgInfoScript {
    fn get_rx_msg_info(
        &self,
        _src_ip: IpAddr,
        _src_context: u16,
        _tx_msg_id: u16,
        _msg_len: u16,
        _pkt_offset: u16,
    ) -> RxMsgInfo {
        self.answer
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtrlPktCall {
    pub gen_ack: bool,
    pub gen_nack: bool,
    pub gen_pull: bool,
    pub dst_ip: IpAddr,
    pub dst_context: u16,
    pub src_context: u16,
    pub tx_msg_id: u16,
    pub msg_len: u16,
    pub pkt_offset: u16,
    pub pull_offset: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditCall {
    pub tx_msg_id: u16,
    pub rtx_pkt: Option<u16>,
    pub new_credit: Option<u16>,
    pub op_code: OpCode,
    pub comp_val: u16,
    pub rel_op: RelOp,
}

/// A shared, `Clone`-able recorder of `deliveredEvent`, `creditToBtxEvent`,
/// and `ctrlPktEvent` calls. Implements all three sink traits so a single
/// instance can be wired to `IngressPipe` for every role at once.
#[derive(Clone, Default)]
pub struct FakeCollaborators {
    delivered: Rc<RefCell<Vec<(u16, u16, bool, u16)>>>,
    credit: Rc<RefCell<Vec<CreditCall>>>,
    ctrl_pkt: Rc<RefCell<Vec<CtrlPktCall>>>,
}

impl FakeCollaborators {
    pub fn delivered_calls(&self) -> Vec<(u16, u16, bool, u16)> {
        self.delivered.borrow().clone()
    }

    pub fn credit_calls(&self) -> Vec<CreditCall> {
        self.credit.borrow().clone()
    }

    pub fn ctrl_pkt_calls(&self) -> Vec<CtrlPktCall> {
        self.ctrl_pkt.borrow().clone()
    }
}

impl DeliveredSink for FakeCollaborators {
    fn delivered_event(&self, tx_msg_id: u16, pkt_offset: u16, is_interval: bool, msg_len: u16) {
        self.delivered
            .borrow_mut()
            .push((tx_msg_id, pkt_offset, is_interval, msg_len));
    }
}

impl CreditSink for FakeCollaborators {
    fn credit_to_btx_event(
        &self,
        tx_msg_id: u16,
        rtx_pkt: Option<u16>,
        new_credit: Option<u16>,
        op_code: OpCode,
        comp_val: u16,
        rel_op: RelOp,
    ) {
        self.credit.borrow_mut().push(CreditCall {
            tx_msg_id,
            rtx_pkt,
            new_credit,
            op_code,
            comp_val,
            rel_op,
        });
    }
}

impl CtrlPktSink for FakeCollaborators {
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
        self.ctrl_pkt.borrow_mut().push(CtrlPktCall {
            gen_ack,
            gen_nack,
            gen_pull,
            dst_ip,
            dst_context,
            src_context,
            tx_msg_id,
            msg_len,
            pkt_offset,
            pull_offset,
        });
    }
}
