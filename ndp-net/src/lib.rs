// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The single top-of-rack network model NDP endpoints ride on: a stable
//! priority queue, pluggable jitter, and deterministic trimming under
//! configured congestion (§4.4).

pub mod dist;
pub mod network;
pub mod queue;

pub use dist::DistGenerator;
pub use network::{Network, NetworkConfig};
pub use queue::{NetworkPkt, TorQueue};
