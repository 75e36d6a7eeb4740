// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

pub mod backend;
pub mod driver;
pub mod error;
pub mod service;

pub use backend::GraphStoreBackend;
pub use driver::{GraphConnection, PropertyMap, QueryOutcome, ScalarValue, SqlGraphConnection};
pub use error::GraphStoreError;
pub use service::{GraphStoreHealthService, GraphStoreService};
