// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::str::FromStr;

use fabric_core::backend::BackendConfig;
use fabric_core::infra::{GrpcConfig, InfraConfig};
use serde::Deserialize;

fn default_probe_interval_secs() -> u64 {
    5
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    /// IP address on which to listen for `KeyValue`/`Health` RPCs.
    pub listen_address: String,

    /// `ADDRESS:PORT` of the Redis endpoint this Adapter fronts.
    pub redis_address: String,

    /// Interval on which the Connection Manager (C3) probes backend health.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// The `pubsub` Adapter this Adapter best-effort publishes domain events to (C8).
    /// Absent disables event publication.
    pub events_backend: Option<BackendConfig>,

    /// Admin endpoints configuration.
    pub infra: Option<InfraConfig>,

    /// gRPC listener tuning.
    pub grpc: Option<GrpcConfig>,
}

impl FromStr for Config {
    type Err = String;

    fn from_str(raw_config: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(raw_config).map_err(|err| format!("config parse error: {err}"))
    }
}
