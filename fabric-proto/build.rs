// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = prost_build::Config::new();
    config.bytes(["."]);
    config.disable_comments(["."]);

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_with_config(
            config,
            &[
                "proto/fabric/v1/common.proto",
                "proto/fabric/v1/kv.proto",
                "proto/fabric/v1/objectstore.proto",
                "proto/fabric/v1/relational.proto",
                "proto/fabric/v1/graphstore.proto",
                "proto/fabric/v1/analytical.proto",
                "proto/fabric/v1/vectorstore.proto",
                "proto/fabric/v1/pubsub.proto",
                "proto/fabric/v1/devicemsg.proto",
                "proto/fabric/v1/logstore.proto",
            ],
            &["proto"],
        )?;

    Ok(())
}
