// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Parses rotatable backend credentials (database passwords, API keys) mounted by the
//! surrounding secret-management system. Out of scope for this fabric is *how* the secret
//! gets onto disk (that's the deployment tooling's job, spec §1); this module only decodes
//! the on-disk shape once it's there.

use serde::{Deserialize, Serialize};

#[derive(Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct Transition {
    pub timestamp: u64,
    pub from_label: Option<String>,
    pub to_label: Option<String>,
}

/// A single secret value and its state transitions.
#[derive(Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct Secret {
    pub value: String,
    pub transitions: Option<Vec<Transition>>,
}

/// A set of "rotatable secrets". Only the `current` secret is decoded; the other supported
/// states ("previous", "proposed", "removable", "removed") are ignored by serde.
#[derive(Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct RotatableSecret {
    pub current: Option<Vec<Secret>>,
    pub previous: Option<Vec<Secret>>,
    pub proposed: Option<Vec<Secret>>,
    pub removable: Option<Vec<Secret>>,
    pub removed: Option<Vec<Secret>>,
}

/// Decodes the `current` credential value out of a rotatable-secret JSON document.
pub fn parse_secret(buffer: impl AsRef<[u8]>) -> Result<String, String> {
    let rotatable_secret: RotatableSecret = serde_json::from_slice(buffer.as_ref())
        .map_err(|err| format!("Failed to parse rotatable secret: {err}"))?;

    match rotatable_secret.current.unwrap_or_default().as_slice() {
        [secret] => Ok(secret.value.clone()),
        [] => Err("Failed to parse rotatable secret: No current secret found".to_owned()),
        _ => Err("Failed to parse rotatable secret: Multiple current secrets found".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_secret;

    #[test]
    fn decodes_current_secret() {
        let data = "
        {
            \"CURRENT\": [
                {
                    \"VALUE\": \"value1\",
                    \"TRANSITIONS\": [
                        {\"TIMESTAMP\": 1, \"FROM_LABEL\": null, \"TO_LABEL\": \"PROPOSED\"},
                        {\"TIMESTAMP\": 2, \"FROM_LABEL\": \"PROPOSED\", \"TO_LABEL\": \"CURRENT\"}
                    ]
                }
            ]
        }
        ";

        let secret = parse_secret(data).unwrap();
        assert_eq!(secret, "value1");
    }

    #[test]
    fn fails_with_multiple_current_secrets() {
        let data = "
        {
            \"CURRENT\": [
                {\"VALUE\": \"value1\"},
                {\"VALUE\": \"value2\"}
            ]
        }
        ";

        let err = parse_secret(data).unwrap_err();
        assert!(err.contains("Multiple current secrets found"));
    }

    #[test]
    fn fails_with_no_current_secret() {
        let data = "{ \"CURRENT\": [] }";

        let err = parse_secret(data).unwrap_err();
        assert!(err.contains("No current secret found"));
    }
}
