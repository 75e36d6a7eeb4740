// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum RelationalError {
    InvalidArgument(String),
    AlreadyExists(String),
    Unavailable(String),
    Internal(String),
}

impl std::error::Error for RelationalError {}

impl fmt::Display for RelationalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationalError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            RelationalError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            RelationalError::Unavailable(msg) | RelationalError::Internal(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl From<sqlx::Error> for RelationalError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RelationalError::AlreadyExists(format!("unique constraint violated: {db_err}"))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                RelationalError::Unavailable(format!("database unreachable: {err}"))
            }
            _ => RelationalError::Internal(format!("database error: {err}")),
        }
    }
}

impl From<RelationalError> for FabricError {
    fn from(err: RelationalError) -> Self {
        match err {
            RelationalError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            RelationalError::AlreadyExists(msg) => FabricError::AlreadyExists(msg),
            RelationalError::Unavailable(msg) => FabricError::Unavailable(msg),
            RelationalError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<RelationalError> for tonic::Status {
    fn from(err: RelationalError) -> Self {
        FabricError::from(err).into()
    }
}
