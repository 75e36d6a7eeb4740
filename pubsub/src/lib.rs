// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

pub mod backend;
pub mod driver;
pub mod error;
pub mod service;

pub use backend::PubSubBackend;
pub use driver::{subject_matches, InMemoryPubSubConnection, PubSubConnection, PublishedMessage};
pub use error::PubSubError;
pub use service::{PubSubHealthService, PubSubService};
