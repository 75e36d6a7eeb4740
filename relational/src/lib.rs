// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

pub mod backend;
pub mod driver;
pub mod error;
pub mod service;

pub use backend::RelationalBackend;
pub use driver::{
    AnyRelationalConnection, QueryOutcome, RelationalConnection, RelationalRow,
    ScalarValue, SqliteRelationalConnection,
};
pub use error::RelationalError;
pub use service::{RelationalHealthService, RelationalService};
