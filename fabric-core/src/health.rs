// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The standard `HealthCheck` RPC every Adapter exposes (spec §4.4/§6), implemented once
//! here against [`crate::connection::ConnectionManager::health_snapshot`] rather than by
//! each `<name>_server` reimplementing the mapping from connection state to response.

use std::collections::HashMap;

use fabric_proto::fabric::v1::common::HealthCheckResponse;

use crate::connection::{ConnectionState, HealthSnapshot};

/// Builds the standard `HealthCheckResponse` from a connection health snapshot.
/// `healthy=true` iff `state == Ready` and the last probe is recent (I6); `details` is the
/// caller-supplied map of backend-specific facts (spec §4.4: "must not expose credentials or
/// raw backend errors").
pub fn health_check_response(
    snapshot: &HealthSnapshot,
    details: HashMap<String, String>,
) -> HealthCheckResponse {
    let status = match snapshot.state {
        ConnectionState::Ready => "ready",
        ConnectionState::Degraded => "degraded",
        ConnectionState::Closed => "closed",
        ConnectionState::Initializing => "initializing",
    };

    HealthCheckResponse {
        healthy: snapshot.healthy,
        status: status.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        details,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn ready_state_reports_healthy() {
        let snapshot = HealthSnapshot {
            state: ConnectionState::Ready,
            healthy: true,
            last_health_at: Some(Instant::now()),
        };
        let response = health_check_response(&snapshot, HashMap::new());
        assert!(response.healthy);
        assert_eq!(response.status, "ready");
    }

    #[test]
    fn degraded_state_reports_unhealthy() {
        let snapshot = HealthSnapshot {
            state: ConnectionState::Degraded,
            healthy: false,
            last_health_at: Some(Instant::now()),
        };
        let response = health_check_response(&snapshot, HashMap::new());
        assert!(!response.healthy);
        assert_eq!(response.status, "degraded");
    }

    #[test]
    fn details_never_include_credential_looking_keys_by_contract() {
        // This is a documentation-level guard: callers must not pass secrets in `details`.
        // We can only verify the map is passed through unchanged, not that callers behave.
        let mut details = HashMap::new();
        details.insert("read_replica_lag_ms".to_owned(), "12".to_owned());
        let snapshot = HealthSnapshot {
            state: ConnectionState::Ready,
            healthy: true,
            last_health_at: None,
        };
        let response = health_check_response(&snapshot, details.clone());
        assert_eq!(response.details, details);
    }
}
