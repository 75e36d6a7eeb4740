// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Arg, Command};
use fabric_core::discovery::spawn_discovery_reporter;
use fabric_core::hyper::AddrIncomingWithStream;
use fabric_core::infra::setup_infra_endpoints;
use fabric_core::logging::setup_logging;
use fabric_core::sentry::setup_sentry;
use fabric_proto::fabric::v1::common::health_server::HealthServer;
use fabric_proto::fabric::v1::pubsub::pub_sub_server::PubSubServer;
use hyper::server::conn::AddrIncoming;
use pubsub::{PubSubBackend, PubSubHealthService, PubSubService};
use tonic::transport::Server as TonicServer;
use tower::ServiceBuilder;
use tower_http::metrics::in_flight_requests::InFlightRequestsCounter;
use tower_http::metrics::InFlightRequestsLayer;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;

use crate::config::Config;

mod config;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("pubsub_server")
        .arg(
            Arg::new("config")
                .short('c')
                .required(true)
                .value_name("FILE"),
        )
        .get_matches();

    let config_filename = matches.get_one::<String>("config").unwrap();
    let config_str = tokio::fs::read_to_string(config_filename).await?;
    let config: Config = config_str.parse().map_err(|err: String| err)?;

    setup_logging(config.infra.as_ref(), "pubsub_server");
    log::info!("pubsub_server config: {config:?}");
    let _sentry_guard = setup_sentry(config.infra.as_ref(), "pubsub_server");

    let backend = PubSubBackend::new();
    let connections = fabric_core::connection::ConnectionManager::spawn(
        backend,
        Duration::from_secs(config.probe_interval_secs),
    );

    let pubsub_service = PubSubServer::new(PubSubService::new(connections.clone()));
    let health_service = HealthServer::new(PubSubHealthService::new(connections.clone()));

    let address: SocketAddr = config.listen_address.parse().unwrap();
    let incoming = AddrIncoming::bind(&address).expect("failed to bind port");
    log::info!("Serving pubsub on {address}");

    let in_flight_requests_counter = InFlightRequestsCounter::new();
    let in_flight_requests_counter_2 = in_flight_requests_counter.clone();
    let health_for_discovery = connections.clone();

    let mut shutdown_receiver =
        setup_infra_endpoints(config.infra.clone().unwrap_or_default(), move || {
            let count = in_flight_requests_counter_2.get();
            metrics::gauge!("fabric_grpc_inflight_requests", count as f64, "service" => "pubsub_server");
        })
        .expect("setup infra endpoints");

    if let Some(discovery) = config.infra.as_ref().and_then(|i| i.discovery.clone()) {
        spawn_discovery_reporter(
            discovery,
            move || health_for_discovery.health_snapshot(),
            shutdown_receiver.clone(),
        );
    }

    let mut server = TonicServer::builder();
    if let Some(grpc_config) = config.grpc.as_ref() {
        server = grpc_config.apply_to_server(server);
    }

    let in_flight_requests_layer = InFlightRequestsLayer::new(in_flight_requests_counter);
    let auth_header_sensitive_layer =
        SetSensitiveHeadersLayer::new(vec![http::header::AUTHORIZATION]);
    let layer = ServiceBuilder::new()
        .layer(in_flight_requests_layer)
        .layer(auth_header_sensitive_layer)
        .into_inner();

    let router = server
        .layer(layer)
        .add_service(fabric_core::services::GrpcMetrics::new(pubsub_service))
        .add_service(fabric_core::services::GrpcMetrics::new(health_service));

    router
        .serve_with_incoming_shutdown(AddrIncomingWithStream(incoming), async move {
            while shutdown_receiver.changed().await.is_ok() {}
        })
        .await?;

    Ok(())
}
