// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The object-store Adapter driver: a filesystem-backed `ManagedBackend` (mirroring
//! `storage::driver::FileBackedStorage`'s one-blob-one-file layout), a `ObjectStoreConnection`
//! trait with a real and an in-memory implementation, and the tonic service wiring the
//! Adapter Skeleton on top of them.

pub mod backend;
pub mod driver;
pub mod error;
pub mod service;

pub use backend::FileObjectStoreBackend;
pub use driver::{FileBackedObjectStoreConnection, MemoryObjectStoreConnection, ObjectStoreConnection};
pub use error::ObjectStoreError;
pub use service::{ObjectStoreHealthService, ObjectStoreService};
