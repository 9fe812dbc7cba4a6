// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use ndp_core::{
    egress::{ETHERNET_HEADER_LEN, IPV4_HEADER_LEN},
    packet::Header,
    pktgen::PktGen,
    time::TokioClock,
};
use ndp_net::{dist::Fixed, Network, NetworkConfig};
use ndp_sim::{config::{Opt, SimConfig}, endpoint::Endpoint};
use rayon::prelude::*;
use std::{net::IpAddr, time::Duration};
use structopt::StructOpt;
use tokio::sync::mpsc;
use tracing::info;

const CHANNEL_CAPACITY: usize = 1024;
const PKTS_PER_MESSAGE: u16 = 10;

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_tracing();

    let cfg = SimConfig::resolve(&opt)?;
    info!(?cfg, trials = opt.trials, messages = opt.messages, "ndp-sim: starting");

    let pb = ProgressBar::new(opt.trials as u64);
    pb.set_style(ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} trials ({eta})"));

    let results: Vec<TrialResult> = (0..opt.trials)
        .into_par_iter()
        .progress_with(pb)
        .map(|_| run_trial_blocking(cfg, opt.messages))
        .collect::<Result<Vec<_>>>()?;

    let summary = Summary::from_trials(&results);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .with_env_var("NDP_LOG")
        .from_env()
        .expect("NDP_LOG must contain a valid filter directive");

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[derive(Debug, serde::Serialize)]
struct TrialResult {
    messages_submitted: usize,
    messages_delivered: usize,
}

#[derive(Debug, serde::Serialize)]
struct Summary {
    trials: usize,
    messages_submitted: usize,
    messages_delivered: usize,
    delivery_ratio: f64,
}

impl Summary {
    fn from_trials(results: &[TrialResult]) -> Self {
        let messages_submitted: usize = results.iter().map(|r| r.messages_submitted).sum();
        let messages_delivered: usize = results.iter().map(|r| r.messages_delivered).sum();
        Self {
            trials: results.len(),
            messages_submitted,
            messages_delivered,
            delivery_ratio: if messages_submitted == 0 {
                1.0
            } else {
                messages_delivered as f64 / messages_submitted as f64
            },
        }
    }
}

/// Runs one trial to completion on a dedicated current-thread runtime, so
/// `rayon`'s worker threads each drive an independent simulation (§10.4).
fn run_trial_blocking(cfg: SimConfig, messages: usize) -> Result<TrialResult> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(rt.block_on(run_trial(cfg, messages)))
}

async fn run_trial(cfg: SimConfig, messages: usize) -> TrialResult {
    let frame_header_len = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + std::mem::size_of::<Header>();
    let inter_packet_time = PktGen::<TokioClock>::inter_packet_time(
        cfg.max_pkt_len,
        frame_header_len,
        cfg.rx_link_rate_bits_per_ns,
    );

    let (a_egress_tx, a_egress_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (a_ingress_tx, a_ingress_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_egress_tx, b_egress_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_ingress_tx, b_ingress_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let net_cfg = NetworkConfig {
        data_pkt_trim_prob: cfg.data_pkt_drop_prob,
        rx_link_rate_bits_per_ns: cfg.rx_link_rate_bits_per_ns,
    };
    // Two independent one-way top-of-rack hops: A -> B and B -> A.
    let _net_ab = Network::spawn(
        net_cfg,
        Box::new(Fixed(cfg.data_pkt_delay)),
        Box::new(Fixed(cfg.ctrl_pkt_delay)),
        TokioClock,
        a_egress_rx,
        b_ingress_tx,
    );
    let _net_ba = Network::spawn(
        net_cfg,
        Box::new(Fixed(cfg.data_pkt_delay)),
        Box::new(Fixed(cfg.ctrl_pkt_delay)),
        TokioClock,
        b_egress_rx,
        a_ingress_tx,
    );

    let ip_a: IpAddr = "10.0.0.1".parse().unwrap();
    let ip_b: IpAddr = "10.0.0.2".parse().unwrap();

    let endpoint_a = Endpoint::spawn(
        ip_b,
        cfg.rtt_pkts,
        cfg.tx_link_rate_bits_per_ns,
        inter_packet_time,
        a_ingress_rx,
        a_egress_tx,
    );
    let mut endpoint_b = Endpoint::spawn(
        ip_a,
        cfg.rtt_pkts,
        cfg.tx_link_rate_bits_per_ns,
        inter_packet_time,
        b_ingress_rx,
        b_egress_tx,
    );

    for tx_msg_id in 0..messages as u16 {
        endpoint_a.submit_message(tx_msg_id, PKTS_PER_MESSAGE, 1, 2);
    }

    let mut delivered_offsets = std::collections::HashMap::<u16, usize>::new();
    let mut fully_delivered = 0usize;
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    loop {
        if fully_delivered == messages {
            break;
        }
        tokio::select! {
            delivery = endpoint_b.recv_delivery() => {
                match delivery {
                    Some(delivery) => {
                        let count = delivered_offsets.entry(delivery.meta.tx_msg_id).or_default();
                        *count += 1;
                        if *count as u16 == delivery.meta.msg_len {
                            fully_delivered += 1;
                        }
                    }
                    None => break,
                }
            }
            _ = &mut deadline => {
                info!("ndp-sim: trial deadline reached before all messages were delivered");
                break;
            }
        }
    }

    TrialResult {
        messages_submitted: messages,
        messages_delivered: fully_delivered,
    }
}
