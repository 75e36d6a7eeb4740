// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The Discovery & Health Reporter (C7, spec §4.7): registers this Adapter with an external,
//! HTTP-reachable service-discovery registry on startup, pushes health on an interval, and
//! deregisters on graceful shutdown. Runs on its own dedicated thread so registration/health
//! traffic never competes with request handling or the admin metrics thread.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Builder;
use tokio::sync::watch;

use crate::connection::HealthSnapshot;

/// `DISCOVERY_ENABLED` / `DISCOVERY_ADDRESS` and the static facts about this Adapter's API
/// surface the registry needs to hand to the gateway (spec §4.7/§6).
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub address: String,
    pub service_name: String,
    pub instance_id: String,
    pub network_address: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub api_path: String,
    #[serde(default)]
    pub auth_required: bool,
    pub methods: Vec<String>,
    pub version: String,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_heartbeat_interval_secs() -> u64 {
    15
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    service_name: &'a str,
    instance_id: &'a str,
    network_address: &'a str,
    tags: &'a [String],
    metadata: RegistrationMetadata<'a>,
}

#[derive(Serialize)]
struct RegistrationMetadata<'a> {
    api_path: &'a str,
    auth_required: bool,
    methods: &'a [String],
    version: &'a str,
}

#[derive(Serialize)]
struct HeartbeatBody<'a> {
    instance_id: &'a str,
    healthy: bool,
    status: &'a str,
    details: HashMap<&'static str, String>,
}

/// Spawns the registration/heartbeat/deregistration loop on a dedicated single-thread
/// runtime. `health_source` is polled once per heartbeat interval (typically
/// `ConnectionManager::health_snapshot`); `shutdown` is the same `watch::Receiver` every
/// other admin endpoint uses to learn about graceful shutdown.
pub fn spawn_discovery_reporter(
    config: DiscoveryConfig,
    health_source: impl Fn() -> HealthSnapshot + Send + Sync + 'static,
    mut shutdown: watch::Receiver<()>,
) {
    if !config.enabled {
        log::info!("service discovery disabled, skipping registration");
        return;
    }

    std::thread::spawn(move || {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("discovery")
            .build()
            .expect("initialize discovery event loop");

        runtime.block_on(async move {
            let client = reqwest::Client::new();

            if let Err(err) = register(&client, &config).await {
                log::error!("service discovery registration failed: {err}");
            }

            let heartbeat_interval = Duration::from_secs(config.heartbeat_interval_secs);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(heartbeat_interval) => {
                        let snapshot = health_source();
                        if let Err(err) = heartbeat(&client, &config, &snapshot).await {
                            log::warn!("service discovery heartbeat failed: {err}");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            if let Err(err) = deregister(&client, &config).await {
                                log::warn!("service discovery deregistration failed: {err}");
                            }
                            return;
                        }
                    }
                }
            }
        });
    });
}

async fn register(client: &reqwest::Client, config: &DiscoveryConfig) -> Result<(), String> {
    let body = RegistrationBody {
        service_name: &config.service_name,
        instance_id: &config.instance_id,
        network_address: &config.network_address,
        tags: &config.tags,
        metadata: RegistrationMetadata {
            api_path: &config.api_path,
            auth_required: config.auth_required,
            methods: &config.methods,
            version: &config.version,
        },
    };

    client
        .post(format!("{}/register", config.address))
        .json(&body)
        .send()
        .await
        .map_err(|err| err.to_string())?
        .error_for_status()
        .map_err(|err| err.to_string())?;

    Ok(())
}

async fn heartbeat(
    client: &reqwest::Client,
    config: &DiscoveryConfig,
    snapshot: &HealthSnapshot,
) -> Result<(), String> {
    let body = HeartbeatBody {
        instance_id: &config.instance_id,
        healthy: snapshot.healthy,
        status: match snapshot.state {
            crate::connection::ConnectionState::Ready => "ready",
            crate::connection::ConnectionState::Degraded => "degraded",
            crate::connection::ConnectionState::Closed => "closed",
            crate::connection::ConnectionState::Initializing => "initializing",
        },
        details: HashMap::new(),
    };

    client
        .post(format!("{}/heartbeat", config.address))
        .json(&body)
        .send()
        .await
        .map_err(|err| err.to_string())?
        .error_for_status()
        .map_err(|err| err.to_string())?;

    Ok(())
}

async fn deregister(client: &reqwest::Client, config: &DiscoveryConfig) -> Result<(), String> {
    client
        .post(format!("{}/deregister", config.address))
        .json(&serde_json::json!({ "instance_id": config.instance_id }))
        .send()
        .await
        .map_err(|err| err.to_string())?
        .error_for_status()
        .map_err(|err| err.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_does_not_require_address() {
        let config = DiscoveryConfig {
            enabled: false,
            address: String::new(),
            service_name: "kv".to_owned(),
            instance_id: "kv-0".to_owned(),
            network_address: "10.0.0.1:50055".to_owned(),
            tags: vec![],
            api_path: "/kv".to_owned(),
            auth_required: false,
            methods: vec!["Set".to_owned(), "Get".to_owned()],
            version: "0.0.1".to_owned(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        };
        let (_tx, rx) = watch::channel(());
        spawn_discovery_reporter(
            config,
            || HealthSnapshot {
                state: crate::connection::ConnectionState::Ready,
                healthy: true,
                last_health_at: None,
            },
            rx,
        );
    }
}
