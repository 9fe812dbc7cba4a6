// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Simulation configuration: the §6 knobs, loadable from a TOML file with
//! CLI overrides and sensible defaults when neither is given (§10.4).

use anyhow::Context;
use std::{path::PathBuf, time::Duration};
use structopt::StructOpt;

/// CLI entrypoint for a one-off simulation run.
#[derive(Debug, StructOpt)]
#[structopt(name = "ndp-sim", about = "Simulation harness for the NDP transport")]
pub struct Opt {
    /// Path to a TOML config file providing any of the knobs below.
    #[structopt(long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// How many independent simulation trials to run in parallel.
    #[structopt(long, default_value = "1")]
    pub trials: usize,

    /// How many demo messages each trial's sender submits.
    #[structopt(long, default_value = "32")]
    pub messages: usize,

    #[structopt(long)]
    pub rtt_pkts: Option<u16>,
    #[structopt(long)]
    pub tx_link_rate_bits_per_ns: Option<f64>,
    #[structopt(long)]
    pub rx_link_rate_bits_per_ns: Option<f64>,
    #[structopt(long)]
    pub max_pkt_len: Option<usize>,
    #[structopt(long)]
    pub data_pkt_drop_prob: Option<f64>,
    /// e.g. "100ns", "1us" (humantime syntax).
    #[structopt(long)]
    pub data_pkt_delay: Option<String>,
    #[structopt(long)]
    pub ctrl_pkt_delay: Option<String>,
}

/// The on-disk / serializable form: durations stay as human-readable
/// strings until resolved, so the file can be hand-edited.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub rtt_pkts: u16,
    pub tx_link_rate_bits_per_ns: f64,
    pub rx_link_rate_bits_per_ns: f64,
    pub max_pkt_len: usize,
    pub data_pkt_drop_prob: f64,
    pub data_pkt_delay: String,
    pub ctrl_pkt_delay: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            rtt_pkts: 5,
            tx_link_rate_bits_per_ns: 10.0,
            rx_link_rate_bits_per_ns: 10.0,
            max_pkt_len: 1500,
            data_pkt_drop_prob: 0.0,
            data_pkt_delay: "100ns".to_string(),
            ctrl_pkt_delay: "50ns".to_string(),
        }
    }
}

/// The fully-resolved configuration an endpoint/network pair is built from.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub rtt_pkts: u16,
    pub tx_link_rate_bits_per_ns: f64,
    pub rx_link_rate_bits_per_ns: f64,
    pub max_pkt_len: usize,
    pub data_pkt_drop_prob: f64,
    pub data_pkt_delay: Duration,
    pub ctrl_pkt_delay: Duration,
}

impl SimConfig {
    /// Loads `opt.config` (if given), then applies any CLI overrides on
    /// top, falling back to [`FileConfig::default`] throughout.
    pub fn resolve(opt: &Opt) -> anyhow::Result<Self> {
        let mut file = match &opt.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => FileConfig::default(),
        };

        if let Some(v) = opt.rtt_pkts {
            file.rtt_pkts = v;
        }
        if let Some(v) = opt.tx_link_rate_bits_per_ns {
            file.tx_link_rate_bits_per_ns = v;
        }
        if let Some(v) = opt.rx_link_rate_bits_per_ns {
            file.rx_link_rate_bits_per_ns = v;
        }
        if let Some(v) = opt.max_pkt_len {
            file.max_pkt_len = v;
        }
        if let Some(v) = opt.data_pkt_drop_prob {
            file.data_pkt_drop_prob = v;
        }
        if let Some(v) = &opt.data_pkt_delay {
            file.data_pkt_delay = v.clone();
        }
        if let Some(v) = &opt.ctrl_pkt_delay {
            file.ctrl_pkt_delay = v.clone();
        }

        Ok(Self {
            rtt_pkts: file.rtt_pkts,
            tx_link_rate_bits_per_ns: file.tx_link_rate_bits_per_ns,
            rx_link_rate_bits_per_ns: file.rx_link_rate_bits_per_ns,
            max_pkt_len: file.max_pkt_len,
            data_pkt_drop_prob: file.data_pkt_drop_prob,
            data_pkt_delay: humantime::parse_duration(&file.data_pkt_delay)
                .context("parsing data_pkt_delay")?,
            ctrl_pkt_delay: humantime::parse_duration(&file.ctrl_pkt_delay)
                .context("parsing ctrl_pkt_delay")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_opt() -> Opt {
        Opt {
            config: None,
            trials: 1,
            messages: 1,
            rtt_pkts: None,
            tx_link_rate_bits_per_ns: None,
            rx_link_rate_bits_per_ns: None,
            max_pkt_len: None,
            data_pkt_drop_prob: None,
            data_pkt_delay: None,
            ctrl_pkt_delay: None,
        }
    }

    #[test]
    fn defaults_resolve_without_a_config_file() {
        let cfg = SimConfig::resolve(&empty_opt()).unwrap();
        assert_eq!(cfg.rtt_pkts, 5);
        assert_eq!(cfg.data_pkt_delay, Duration::from_nanos(100));
    }

    #[test]
    fn cli_overrides_take_precedence_over_defaults() {
        let mut opt = empty_opt();
        opt.rtt_pkts = Some(9);
        opt.data_pkt_delay = Some("2us".to_string());
        let cfg = SimConfig::resolve(&opt).unwrap();
        assert_eq!(cfg.rtt_pkts, 9);
        assert_eq!(cfg.data_pkt_delay, Duration::from_micros(2));
    }
}
