// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The key-value Adapter driver: a Redis-backed `ManagedBackend`, a `KvConnection` trait
//! with a real and an in-memory implementation, and the tonic service wiring the Adapter
//! Skeleton (C1-C4, C8) on top of them.

pub mod backend;
pub mod driver;
pub mod error;
pub mod service;

pub use backend::RedisKvBackend;
pub use driver::{KvConnection, MemoryKvConnection, RedisKvConnection};
pub use error::KvError;
pub use service::{KvHealthService, KvService};
