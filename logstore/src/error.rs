// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum LogStoreError {
    InvalidArgument(String),
    Internal(String),
}

impl std::error::Error for LogStoreError {}

impl fmt::Display for LogStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            LogStoreError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<LogStoreError> for FabricError {
    fn from(err: LogStoreError) -> Self {
        match err {
            LogStoreError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            LogStoreError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<LogStoreError> for tonic::Status {
    fn from(err: LogStoreError) -> Self {
        FabricError::from(err).into()
    }
}
