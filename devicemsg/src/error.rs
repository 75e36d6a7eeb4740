// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;

#[derive(Debug)]
pub enum DeviceMessagingError {
    InvalidArgument(String),
    Internal(String),
}

impl std::error::Error for DeviceMessagingError {}

impl fmt::Display for DeviceMessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMessagingError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            DeviceMessagingError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<DeviceMessagingError> for FabricError {
    fn from(err: DeviceMessagingError) -> Self {
        match err {
            DeviceMessagingError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            DeviceMessagingError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<DeviceMessagingError> for tonic::Status {
    fn from(err: DeviceMessagingError) -> Self {
        FabricError::from(err).into()
    }
}
