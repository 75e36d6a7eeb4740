// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectStoreError {
    InvalidArgument(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl std::error::Error for ObjectStoreError {}

impl fmt::Display for ObjectStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectStoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ObjectStoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            ObjectStoreError::Unavailable(msg) | ObjectStoreError::Internal(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl From<std::io::Error> for ObjectStoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ObjectStoreError::NotFound(err.to_string()),
            _ => ObjectStoreError::Internal(format!("io error: {err}")),
        }
    }
}

impl From<ObjectStoreError> for FabricError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            ObjectStoreError::NotFound(msg) => FabricError::NotFound(msg),
            ObjectStoreError::Unavailable(msg) => FabricError::Unavailable(msg),
            ObjectStoreError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<ObjectStoreError> for tonic::Status {
    fn from(err: ObjectStoreError) -> Self {
        FabricError::from(err).into()
    }
}
