// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum GraphStoreError {
    InvalidArgument(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl std::error::Error for GraphStoreError {}

impl fmt::Display for GraphStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphStoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            GraphStoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            GraphStoreError::Unavailable(msg) | GraphStoreError::Internal(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl From<sqlx::Error> for GraphStoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => GraphStoreError::NotFound("row not found".to_owned()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                GraphStoreError::Unavailable(format!("database unreachable: {err}"))
            }
            _ => GraphStoreError::Internal(format!("database error: {err}")),
        }
    }
}

impl From<GraphStoreError> for FabricError {
    fn from(err: GraphStoreError) -> Self {
        match err {
            GraphStoreError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            GraphStoreError::NotFound(msg) => FabricError::NotFound(msg),
            GraphStoreError::Unavailable(msg) => FabricError::Unavailable(msg),
            GraphStoreError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<GraphStoreError> for tonic::Status {
    fn from(err: GraphStoreError) -> Self {
        FabricError::from(err).into()
    }
}
