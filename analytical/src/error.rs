// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum AnalyticalError {
    InvalidArgument(String),
    Unavailable(String),
    Internal(String),
}

impl std::error::Error for AnalyticalError {}

impl fmt::Display for AnalyticalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticalError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            AnalyticalError::Unavailable(msg) | AnalyticalError::Internal(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl From<sqlx::Error> for AnalyticalError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                AnalyticalError::Unavailable(format!("database unreachable: {err}"))
            }
            _ => AnalyticalError::Internal(format!("database error: {err}")),
        }
    }
}

impl From<AnalyticalError> for FabricError {
    fn from(err: AnalyticalError) -> Self {
        match err {
            AnalyticalError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            AnalyticalError::Unavailable(msg) => FabricError::Unavailable(msg),
            AnalyticalError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<AnalyticalError> for tonic::Status {
    fn from(err: AnalyticalError) -> Self {
        FabricError::from(err).into()
    }
}
