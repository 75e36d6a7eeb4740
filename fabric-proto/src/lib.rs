// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Generated gRPC/protobuf bindings for every Adapter in the fabric, plus
//! the shared envelope/response/health types in `fabric::v1::common`.

pub mod fabric {
    pub mod v1 {
        pub mod common {
            tonic::include_proto!("fabric.v1.common");
        }
        pub mod kv {
            tonic::include_proto!("fabric.v1.kv");
        }
        pub mod objectstore {
            tonic::include_proto!("fabric.v1.objectstore");
        }
        pub mod relational {
            tonic::include_proto!("fabric.v1.relational");
        }
        pub mod graphstore {
            tonic::include_proto!("fabric.v1.graphstore");
        }
        pub mod analytical {
            tonic::include_proto!("fabric.v1.analytical");
        }
        pub mod vectorstore {
            tonic::include_proto!("fabric.v1.vectorstore");
        }
        pub mod pubsub {
            tonic::include_proto!("fabric.v1.pubsub");
        }
        pub mod devicemsg {
            tonic::include_proto!("fabric.v1.devicemsg");
        }
        pub mod logstore {
            tonic::include_proto!("fabric.v1.logstore");
        }
    }
}
