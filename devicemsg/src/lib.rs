// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod backend;
mod driver;
mod error;
mod service;

pub use backend::DeviceMessagingBackend;
pub use driver::{
    topic_matches, DeviceMessagingConnection, InMemoryDeviceMessagingConnection, PublishedMessage,
};
pub use error::DeviceMessagingError;
pub use service::{DeviceMessagingHealthService, DeviceMessagingService};
