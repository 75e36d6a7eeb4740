// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fabric_proto::fabric::v1::common::Envelope;

use crate::errors::FabricError;

/// Bound on `user_id`/`organization_id` length. Generous for any real identifier scheme,
/// tight enough to keep a malformed envelope from being used as a memory-exhaustion vector.
const MAX_IDENTIFIER_LEN: usize = 256;

/// Default per-verb deadline used when the caller's envelope does not set one (spec §4.4).
pub const DEFAULT_UNARY_DEADLINE: Duration = Duration::from_secs(20);

/// An `Envelope` that has passed validation: non-empty, bounded-length identifiers and a
/// resolved deadline. Handlers only ever see this type, never the raw proto message.
#[derive(Clone, Debug)]
pub struct ValidatedEnvelope {
    pub user_id: String,
    pub organization_id: String,
    pub trace_id: Option<String>,
    pub deadline: Deadline,
}

/// The resolved deadline for a call: either the caller's, or the Adapter's per-verb default.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: SystemTime,
}

impl Deadline {
    fn from_unix_millis(millis: i64) -> Self {
        Deadline {
            at: UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64),
        }
    }

    fn default_from_now(default: Duration) -> Self {
        Deadline {
            at: SystemTime::now() + default,
        }
    }

    pub fn has_elapsed(&self) -> bool {
        SystemTime::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}

/// Validates an inbound envelope per spec §4.1/§4.4: non-empty, bounded identifiers; rejects
/// before any backend I/O. `default_deadline` is the verb's documented default (spec §4.4
/// says this is typically 10-30s for unary calls, unbounded for streaming).
pub fn validate_envelope(
    envelope: Option<&Envelope>,
    default_deadline: Duration,
) -> Result<ValidatedEnvelope, FabricError> {
    let envelope = envelope.ok_or_else(|| {
        FabricError::Unauthenticated("request is missing its envelope".to_owned())
    })?;

    if envelope.user_id.is_empty() || envelope.organization_id.is_empty() {
        return Err(FabricError::Unauthenticated(
            "envelope is missing user_id or organization_id".to_owned(),
        ));
    }

    if !is_bounded_ascii_identifier(&envelope.user_id)
        || !is_bounded_ascii_identifier(&envelope.organization_id)
    {
        return Err(FabricError::InvalidArgument(
            "user_id/organization_id must be non-empty, bounded ASCII identifiers".to_owned(),
        ));
    }

    let deadline = if envelope.deadline_unix_millis > 0 {
        Deadline::from_unix_millis(envelope.deadline_unix_millis)
    } else {
        Deadline::default_from_now(default_deadline)
    };

    Ok(ValidatedEnvelope {
        user_id: envelope.user_id.clone(),
        organization_id: envelope.organization_id.clone(),
        trace_id: (!envelope.trace_id.is_empty()).then(|| envelope.trace_id.clone()),
        deadline,
    })
}

fn is_bounded_ascii_identifier(value: &str) -> bool {
    !value.is_empty() && value.len() <= MAX_IDENTIFIER_LEN && value.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(user_id: &str, organization_id: &str) -> Envelope {
        Envelope {
            user_id: user_id.to_owned(),
            organization_id: organization_id.to_owned(),
            trace_id: String::new(),
            deadline_unix_millis: 0,
        }
    }

    #[test]
    fn missing_envelope_is_unauthenticated() {
        let err = validate_envelope(None, DEFAULT_UNARY_DEADLINE).unwrap_err();
        assert!(matches!(err, FabricError::Unauthenticated(_)));
    }

    #[test]
    fn missing_user_id_is_unauthenticated() {
        let err = validate_envelope(Some(&envelope("", "acme")), DEFAULT_UNARY_DEADLINE)
            .unwrap_err();
        assert!(matches!(err, FabricError::Unauthenticated(_)));
    }

    #[test]
    fn missing_organization_id_is_unauthenticated() {
        let err = validate_envelope(Some(&envelope("u1", "")), DEFAULT_UNARY_DEADLINE)
            .unwrap_err();
        assert!(matches!(err, FabricError::Unauthenticated(_)));
    }

    #[test]
    fn oversized_identifier_is_invalid_argument() {
        let huge = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        let err = validate_envelope(Some(&envelope(&huge, "acme")), DEFAULT_UNARY_DEADLINE)
            .unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn valid_envelope_resolves_default_deadline() {
        let validated =
            validate_envelope(Some(&envelope("u1", "acme")), DEFAULT_UNARY_DEADLINE).unwrap();
        assert_eq!(validated.user_id, "u1");
        assert_eq!(validated.organization_id, "acme");
        assert!(!validated.deadline.has_elapsed());
    }

    #[test]
    fn caller_deadline_takes_precedence_over_default() {
        let past_millis = (SystemTime::now() - Duration::from_secs(5))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let mut e = envelope("u1", "acme");
        e.deadline_unix_millis = past_millis;
        let validated = validate_envelope(Some(&e), DEFAULT_UNARY_DEADLINE).unwrap();
        assert!(validated.deadline.has_elapsed());
    }
}
