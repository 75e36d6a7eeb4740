// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod backend;
mod driver;
mod error;
mod service;

pub use backend::LogStoreBackend;
pub use driver::{labels_match, InMemoryLogStoreConnection, LogLine, LogStoreConnection};
pub use error::LogStoreError;
pub use service::{LogStoreHealthService, LogStoreService};
