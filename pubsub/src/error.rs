// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum PubSubError {
    InvalidArgument(String),
    Internal(String),
}

impl std::error::Error for PubSubError {}

impl fmt::Display for PubSubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PubSubError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            PubSubError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<PubSubError> for FabricError {
    fn from(err: PubSubError) -> Self {
        match err {
            PubSubError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            PubSubError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<PubSubError> for tonic::Status {
    fn from(err: PubSubError) -> Self {
        FabricError::from(err).into()
    }
}
