// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum VectorStoreError {
    InvalidArgument(String),
    NotFound(String),
    Internal(String),
}

impl std::error::Error for VectorStoreError {}

impl fmt::Display for VectorStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorStoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            VectorStoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            VectorStoreError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<VectorStoreError> for FabricError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            VectorStoreError::NotFound(msg) => FabricError::NotFound(msg),
            VectorStoreError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<VectorStoreError> for tonic::Status {
    fn from(err: VectorStoreError) -> Self {
        FabricError::from(err).into()
    }
}
