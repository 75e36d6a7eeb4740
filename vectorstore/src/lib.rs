// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

pub mod backend;
pub mod driver;
pub mod error;
pub mod service;

pub use backend::VectorStoreBackend;
pub use driver::{InMemoryVectorStoreConnection, ScoredPoint, StoredPoint, VectorStoreConnection};
pub use error::VectorStoreError;
pub use service::{VectorStoreHealthService, VectorStoreService};
