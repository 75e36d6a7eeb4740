// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use fabric_core::errors::FabricError;
use redis::RedisError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvError {
    InvalidArgument(String),
    Unavailable(String),
    Internal(String),
}

impl std::error::Error for KvError {}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            KvError::Unavailable(msg) | KvError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<RedisError> for KvError {
    fn from(err: RedisError) -> Self {
        let err_str = format!("redis error: {err}");
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            KvError::Unavailable(err_str)
        } else {
            KvError::Internal(err_str)
        }
    }
}

impl From<KvError> for FabricError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::InvalidArgument(msg) => FabricError::InvalidArgument(msg),
            KvError::Unavailable(msg) => FabricError::Unavailable(msg),
            KvError::Internal(msg) => FabricError::Internal(msg),
        }
    }
}

impl From<KvError> for tonic::Status {
    fn from(err: KvError) -> Self {
        FabricError::from(err).into()
    }
}
