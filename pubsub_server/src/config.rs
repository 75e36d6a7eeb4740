// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::str::FromStr;

use fabric_core::infra::{GrpcConfig, InfraConfig};
use serde::Deserialize;

fn default_probe_interval_secs() -> u64 {
    5
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    /// IP address on which to listen for `PubSub`/`Health` RPCs.
    pub listen_address: String,

    /// Interval on which the Connection Manager probes backend health.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    pub infra: Option<InfraConfig>,

    pub grpc: Option<GrpcConfig>,
}

impl FromStr for Config {
    type Err = String;

    fn from_str(raw_config: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(raw_config).map_err(|err| format!("config parse error: {err}"))
    }
}
