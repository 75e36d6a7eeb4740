// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use hyper::server::accept::Accept;
use hyper::server::conn::{AddrIncoming, AddrStream};

/// Adapts a bound `hyper::server::conn::AddrIncoming` into the `Stream` shape that
/// `tonic::transport::Server::serve_with_incoming_shutdown` expects. `AddrIncoming` only
/// implements hyper's `Accept`; wrapping it here is what lets every `_server` binary bind a
/// socket up front (so it can log the resolved address/port before serving) instead of
/// handing tonic a bare address to bind itself.
pub struct AddrIncomingWithStream(pub AddrIncoming);

impl Stream for AddrIncomingWithStream {
    type Item = std::io::Result<AddrStream>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0).poll_accept(cx)
    }
}
