// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crate::errors::FabricError;

/// The Tenant Rewriter's output (spec §3 `TenantHandle`). Derived purely from the envelope
/// plus the logical name: no I/O, no randomness, no clock. Constructed per request, never
/// stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantHandle {
    pub physical_namespace: String,
    pub physical_name: String,
    pub tenant_tag: String,
}

/// One function per backend kind (spec §4.2's table). Each is pure and injective in
/// `(organization_id, logical_name)`: no two distinct tenants can collide on the physical
/// name it produces, and the same inputs always produce the same handle (I1, I4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    KeyValue,
    ObjectStore,
    Relational,
    GraphStore,
    Analytical,
    VectorStore,
    PubSub,
    DeviceMessaging,
    LogStore,
}

/// Rewrites a logical name into a physical `TenantHandle` for the given backend kind.
/// Rejects with `InvalidArgument` before any I/O if the logical name is empty or would
/// violate the backend's own naming constraints (spec §4.2). `user_id` is only consulted by
/// `BackendKind::KeyValue`, whose physical key must be scoped per-user as well as per-org
/// (spec §4.2: `organization_id ":" user_id ":" logical_key`); every other backend kind
/// ignores it and scopes by organization alone.
pub fn rewrite(
    kind: BackendKind,
    organization_id: &str,
    user_id: &str,
    logical_name: &str,
) -> Result<TenantHandle, FabricError> {
    if logical_name.is_empty() {
        return Err(FabricError::InvalidArgument(
            "logical name must not be empty".to_owned(),
        ));
    }

    let tenant_tag = organization_id.to_owned();

    match kind {
        BackendKind::KeyValue => {
            // physical key = organization_id ":" user_id ":" logical_key, so two users in the
            // same organization can never collide on the same logical_key either (spec §4.2).
            Ok(TenantHandle {
                physical_namespace: organization_id.to_owned(),
                physical_name: format!("{organization_id}:{user_id}:{logical_name}"),
                tenant_tag,
            })
        }
        BackendKind::ObjectStore => {
            if logical_name.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(FabricError::InvalidArgument(
                    "object-store bucket names must not contain uppercase characters"
                        .to_owned(),
                ));
            }
            Ok(TenantHandle {
                physical_namespace: format!("{organization_id}-{logical_name}"),
                physical_name: logical_name.to_owned(),
                tenant_tag,
            })
        }
        BackendKind::Relational => Ok(TenantHandle {
            physical_namespace: schema_name(organization_id),
            physical_name: logical_name.to_owned(),
            tenant_tag,
        }),
        BackendKind::GraphStore => Ok(TenantHandle {
            physical_namespace: format!("org_{}", sanitize_label(organization_id)),
            physical_name: logical_name.to_owned(),
            tenant_tag,
        }),
        BackendKind::Analytical => Ok(TenantHandle {
            physical_namespace: schema_name(organization_id),
            physical_name: logical_name.to_owned(),
            tenant_tag,
        }),
        BackendKind::VectorStore => Ok(TenantHandle {
            physical_namespace: organization_id.to_owned(),
            physical_name: format!("{organization_id}__{logical_name}"),
            tenant_tag,
        }),
        BackendKind::PubSub => {
            if logical_name.contains(['*', '>']) {
                return Err(FabricError::InvalidArgument(
                    "wildcard characters are not permitted in a publish subject".to_owned(),
                ));
            }
            Ok(TenantHandle {
                physical_namespace: organization_id.to_owned(),
                physical_name: format!("{organization_id}.{logical_name}"),
                tenant_tag,
            })
        }
        BackendKind::DeviceMessaging => {
            if logical_name.contains(['+', '#']) {
                return Err(FabricError::InvalidArgument(
                    "wildcard characters are not permitted in a publish topic".to_owned(),
                ));
            }
            Ok(TenantHandle {
                physical_namespace: organization_id.to_owned(),
                physical_name: format!("{organization_id}/{logical_name}"),
                tenant_tag,
            })
        }
        BackendKind::LogStore => Ok(TenantHandle {
            physical_namespace: organization_id.to_owned(),
            physical_name: logical_name.to_owned(),
            tenant_tag,
        }),
    }
}

/// Rewrites a publish/subscribe subject that is allowed to carry a wildcard (e.g. a
/// Subscribe verb's filter, as opposed to a Publish verb's concrete subject). Still rejects
/// an empty subject and still scopes by organization.
pub fn rewrite_subscription_filter(
    kind: BackendKind,
    organization_id: &str,
    logical_filter: &str,
) -> Result<TenantHandle, FabricError> {
    if logical_filter.is_empty() {
        return Err(FabricError::InvalidArgument(
            "subscription filter must not be empty".to_owned(),
        ));
    }
    let separator = match kind {
        BackendKind::PubSub => ".",
        BackendKind::DeviceMessaging => "/",
        _ => {
            return Err(FabricError::InvalidArgument(
                "subscription filters only apply to pub/sub style backends".to_owned(),
            ))
        }
    };
    Ok(TenantHandle {
        physical_namespace: organization_id.to_owned(),
        physical_name: format!("{organization_id}{separator}{logical_filter}"),
        tenant_tag: organization_id.to_owned(),
    })
}

fn schema_name(organization_id: &str) -> String {
    format!("tenant_{}", sanitize_label(organization_id))
}

/// Lowercases and replaces any character outside `[a-z0-9_]` with `_`, so the resulting
/// label/schema name is always a legal identifier for the backends that require one,
/// regardless of what characters the organization_id happens to contain.
fn sanitize_label(organization_id: &str) -> String {
    organization_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewriter_is_pure_and_deterministic() {
        let a = rewrite(BackendKind::KeyValue, "acme", "alice", "profile").unwrap();
        let b = rewrite(BackendKind::KeyValue, "acme", "alice", "profile").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_organizations_never_collide() {
        let a = rewrite(BackendKind::KeyValue, "acme", "alice", "profile").unwrap();
        let b = rewrite(BackendKind::KeyValue, "globex", "alice", "profile").unwrap();
        assert_ne!(a.physical_name, b.physical_name);
        assert_ne!(a.physical_namespace, b.physical_namespace);
    }

    #[test]
    fn distinct_users_in_the_same_organization_never_collide() {
        let a = rewrite(BackendKind::KeyValue, "acme", "alice", "profile").unwrap();
        let b = rewrite(BackendKind::KeyValue, "acme", "bob", "profile").unwrap();
        assert_ne!(a.physical_name, b.physical_name);
    }

    #[test]
    fn empty_logical_name_rejected() {
        let err = rewrite(BackendKind::KeyValue, "acme", "alice", "").unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn object_store_rejects_uppercase_bucket() {
        let err = rewrite(BackendKind::ObjectStore, "acme", "alice", "Reports").unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn pubsub_rejects_wildcard_on_publish() {
        let err = rewrite(BackendKind::PubSub, "acme", "alice", "events.*").unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn pubsub_subscription_filter_allows_wildcard() {
        let handle =
            rewrite_subscription_filter(BackendKind::PubSub, "acme", "events.*").unwrap();
        assert_eq!(handle.physical_name, "acme.events.*");
    }

    #[test]
    fn devicemsg_rejects_wildcard_on_publish() {
        let err =
            rewrite(BackendKind::DeviceMessaging, "acme", "alice", "sensors/+").unwrap_err();
        assert!(matches!(err, FabricError::InvalidArgument(_)));
    }

    #[test]
    fn relational_and_analytical_share_schema_naming_scheme() {
        let rel = rewrite(BackendKind::Relational, "acme-corp", "alice", "users").unwrap();
        let ana = rewrite(BackendKind::Analytical, "acme-corp", "alice", "users").unwrap();
        assert_eq!(rel.physical_namespace, ana.physical_namespace);
        assert_eq!(rel.physical_namespace, "tenant_acme_corp");
    }
}
