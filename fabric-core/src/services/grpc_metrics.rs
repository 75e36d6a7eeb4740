// Copyright 2021 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::borrow::Cow;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use http_body::SizeHint;
use hyper::body::HttpBody;
use hyper::header::HeaderValue;
use hyper::{Body, HeaderMap, Request as HyperRequest, Response as HyperResponse};
use metrics::{histogram, increment_counter};
use percent_encoding::percent_decode;
use pin_project::{pin_project, pinned_drop};
use tonic::{body::BoxBody, transport::NamedService, Status};
use tower::{Service, ServiceExt};

const GRPC_STATUS_HEADER_CODE: &str = "grpc-status";
const GRPC_STATUS_MESSAGE_HEADER: &str = "grpc-message";

/// Callbacks for RPC events. One instance is shared by every service a `_server` binary
/// hosts, so a single Prometheus series covers the whole Adapter.
pub trait GrpcMetricReporter {
    fn report_rpc_start(&self, service_name: &'static str, service_method: String);

    fn report_rpc_complete(
        &self,
        service_name: &'static str,
        service_method: String,
        code: &'static str,
        elapsed: Duration,
    );
}

/// Logs RPC start/end as time-series metrics, named after the equivalent counters in
/// https://github.com/grpc-ecosystem/go-grpc-prometheus/blob/master/server_metrics.go.
#[derive(Clone, Default)]
pub struct DefaultGrpcMetricsReporter;

impl GrpcMetricReporter for DefaultGrpcMetricsReporter {
    fn report_rpc_start(&self, service_name: &'static str, service_method: String) {
        increment_counter!(
            "grpc_server_started_total",
            "grpc_service" => service_name,
            "grpc_method" => service_method,
        );
    }

    fn report_rpc_complete(
        &self,
        service_name: &'static str,
        service_method: String,
        code: &'static str,
        elapsed: Duration,
    ) {
        histogram!(
            "grpc_server_handling_seconds",
            elapsed,
            "grpc_service" => service_name,
            "grpc_method" => service_method.clone(),
        );

        increment_counter!(
            "grpc_server_handled_total",
            "grpc_service" => service_name,
            "grpc_method" => service_method,
            "grpc_code" => code,
        );
    }
}

/// A `tower::Service` that reports the start and end of RPCs passing through it to an
/// underlying gRPC service. Wraps every Adapter service the same way
/// `storage::api::mod::Server` wraps `CasService`/`ByteStreamService`.
#[derive(Debug, Clone)]
pub struct GrpcMetrics<S, R> {
    inner: S,
    reporter: R,
}

impl<S> GrpcMetrics<S, DefaultGrpcMetricsReporter> {
    pub fn new(service: S) -> Self {
        Self::with_reporter(service, DefaultGrpcMetricsReporter)
    }
}

impl<S, R> GrpcMetrics<S, R> {
    pub fn with_reporter(service: S, reporter: R) -> Self {
        GrpcMetrics {
            inner: service,
            reporter,
        }
    }

    /// Returns the message to report to Sentry for the given code/message, or `None` if the
    /// code is an expected part of normal operation.
    /// See https://grpc.github.io/grpc/core/md_doc_statuscodes.html.
    fn report_to_sentry<'h>(code: &str, message: Option<&'h HeaderValue>) -> Option<Cow<'h, str>> {
        match code {
            "OK" | "Aborted" | "DeadlineExceeded" | "NotFound" | "AlreadyExists"
            | "PermissionDenied" | "FailedPrecondition" | "OutOfRange" | "Unauthenticated"
            | "Canceled" | "Unavailable" => return None,
            _ => {}
        };
        let message_value = message.map(|m| percent_decode(m.as_bytes()).decode_utf8_lossy());
        Some(message_value.unwrap_or_else(|| "".into()))
    }
}

impl<S, R> Service<HyperRequest<Body>> for GrpcMetrics<S, R>
where
    S: Service<HyperRequest<Body>, Response = HyperResponse<BoxBody>>
        + NamedService
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    R: GrpcMetricReporter + Send + Sync + Clone + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: HyperRequest<Body>) -> Self::Future {
        let svc = self.inner.clone();
        let reporter = self.reporter.clone();

        Box::pin(async move {
            let service_method = match request
                .uri()
                .path()
                .split('/')
                .collect::<Vec<_>>()
                .as_slice()
            {
                ["", service, method] if *service == <S as NamedService>::NAME => {
                    (*method).to_owned()
                }
                _ => {
                    log::error!("grpc_metrics: unable to decode URI: {:?}", request.uri());
                    let mut response = HyperResponse::new(tonic::body::empty_body());
                    *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                    return Ok(response);
                }
            };

            reporter.report_rpc_start(<S as NamedService>::NAME, service_method.clone());

            let start_time = Instant::now();

            let service_method2 = service_method.clone();
            let reporter2 = reporter.clone();
            let mut svc = svc.map_response(move |r| {
                let (parts, body) = r.into_parts();
                HyperResponse::from_parts(
                    parts,
                    BoxBody::new(OutboundBody::new(
                        body,
                        <S as NamedService>::NAME,
                        service_method2,
                        start_time,
                        reporter2,
                    )),
                )
            });

            let response = match svc.call(request).await {
                Ok(response) => {
                    if let Some(hv) = response.headers().get(GRPC_STATUS_HEADER_CODE) {
                        let code = parse_status_code(hv);
                        let message = response.headers().get(GRPC_STATUS_MESSAGE_HEADER);
                        let call_duration = start_time.elapsed();
                        reporter.report_rpc_complete(
                            <S as NamedService>::NAME,
                            service_method.clone(),
                            code,
                            call_duration,
                        );

                        if let Some(grpc_message) = Self::report_to_sentry(code, message) {
                            use sentry::protocol::{Event, Level};
                            use sentry::types::Uuid;

                            let event = Event {
                                event_id: Uuid::new_v4(),
                                level: Level::Error,
                                message: Some(format!(
                                    "{}/{}: {}: {}",
                                    <S as NamedService>::NAME,
                                    service_method,
                                    code,
                                    grpc_message
                                )),
                                ..Event::default()
                            };

                            sentry::capture_event(event);
                        }
                    }
                    response
                }
                Err(_) => {
                    log::debug!("illegal state - service should have only returned a response");
                    let mut response = HyperResponse::new(tonic::body::empty_body());
                    *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;

                    let call_duration = start_time.elapsed();
                    reporter.report_rpc_complete(
                        <S as NamedService>::NAME,
                        service_method.clone(),
                        "Internal",
                        call_duration,
                    );

                    return Ok(response);
                }
            };

            Ok(response)
        })
    }
}

impl<S: NamedService, R> NamedService for GrpcMetrics<S, R> {
    const NAME: &'static str = S::NAME;
}

/// Wraps the response `BoxBody` so `GrpcMetrics` can observe when the RPC completes.
#[pin_project(PinnedDrop)]
struct OutboundBody<R: GrpcMetricReporter> {
    #[pin]
    inner: BoxBody,
    service_name: &'static str,
    service_method: String,
    start_time: Instant,
    status: Option<Status>,
    reporter: R,
    complete: bool,
}

impl<R: GrpcMetricReporter> OutboundBody<R> {
    pub fn new(
        inner: BoxBody,
        service_name: &'static str,
        service_method: String,
        start_time: Instant,
        reporter: R,
    ) -> Self {
        OutboundBody {
            inner,
            service_name,
            service_method,
            start_time,
            status: None,
            reporter,
            complete: false,
        }
    }
}

impl<R> HttpBody for OutboundBody<R>
where
    R: GrpcMetricReporter + Clone,
{
    type Data = <BoxBody as HttpBody>::Data;
    type Error = <BoxBody as HttpBody>::Error;

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.project();
        this.inner.poll_data(cx)
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap<HeaderValue>>, Self::Error>> {
        let this = self.project();

        let trailers_opt = match futures::ready!(this.inner.poll_trailers(cx)) {
            Ok(t) => t,
            Err(err) => return Poll::Ready(Err(err)),
        };

        let code_opt = trailers_opt
            .as_ref()
            .and_then(|t| t.get(GRPC_STATUS_HEADER_CODE))
            .map(parse_status_code);
        if let Some(code) = code_opt {
            let call_duration = this.start_time.elapsed();
            *this.complete = true;
            this.reporter.report_rpc_complete(
                this.service_name,
                (*this.service_method).clone(),
                code,
                call_duration,
            );
        }

        Poll::Ready(Ok(trailers_opt))
    }
}

#[pinned_drop]
impl<R: GrpcMetricReporter> PinnedDrop for OutboundBody<R> {
    fn drop(self: Pin<&mut Self>) {
        if !self.complete {
            let call_duration = self.start_time.elapsed();
            self.reporter.report_rpc_complete(
                self.service_name,
                self.service_method.clone(),
                "Canceled",
                call_duration,
            );
        }
    }
}

pub fn convert_status_code(code: u16) -> &'static str {
    match code {
        0 => "OK",
        1 => "Canceled",
        2 => "Unknown",
        3 => "InvalidArgument",
        4 => "DeadlineExceeded",
        5 => "NotFound",
        6 => "AlreadyExists",
        7 => "PermissionDenied",
        8 => "ResourceExhausted",
        9 => "FailedPrecondition",
        10 => "Aborted",
        11 => "OutOfRange",
        12 => "Unimplemented",
        13 => "Internal",
        14 => "Unavailable",
        15 => "DataLoss",
        16 => "Unauthenticated",
        _ => "--INVALID--",
    }
}

/// Parse the gRPC status from headers.
/// Note: this should be replaced with the Tonic version once it is made public:
/// https://github.com/hyperium/tonic/blob/61555ff2b5b76e4e3172717354aed1e6f31d6611/tonic/src/status.rs#L383.
fn parse_status_code(value: &HeaderValue) -> &'static str {
    let value_as_str: Result<&str, _> = value.to_str().map_err(|_| "--INVALID--");
    value_as_str
        .and_then(|x| {
            x.parse::<u16>()
                .map(convert_status_code)
                .map_err(|_| "--INVALID--")
        })
        .unwrap_or("--INVALID--")
}

#[cfg(test)]
mod tests {
    use std::mem;
    use std::sync::Arc;

    use bytes::{BufMut, BytesMut};
    use fabric_proto::fabric::v1::common::{
        health_server::{Health, HealthServer},
        HealthCheckRequest, HealthCheckResponse,
    };
    use http_body::Body as HttpBody;
    use hyper::body::Body;
    use hyper::header::HeaderValue;
    use hyper::Request as HyperRequest;
    use hyper::{Method, StatusCode, Uri};
    use parking_lot::Mutex;
    use prost::Message;
    use std::time::Duration;
    use tonic::{Request, Response, Status};
    use tower::Service;

    use super::{parse_status_code, GrpcMetrics};
    use crate::services::grpc_metrics::GrpcMetricReporter;

    #[derive(Clone)]
    struct AlwaysHealthy;

    #[tonic::async_trait]
    impl Health for AlwaysHealthy {
        async fn health_check(
            &self,
            _request: Request<HealthCheckRequest>,
        ) -> Result<Response<HealthCheckResponse>, Status> {
            Ok(Response::new(HealthCheckResponse {
                healthy: true,
                status: "ready".to_owned(),
                version: "0.0.1".to_owned(),
                details: Default::default(),
            }))
        }
    }

    #[derive(Clone)]
    struct TestGrpcMetricsReporter {
        starts: Arc<Mutex<Vec<String>>>,
        completions: Arc<Mutex<Vec<String>>>,
    }

    impl TestGrpcMetricsReporter {
        pub fn new() -> Self {
            TestGrpcMetricsReporter {
                starts: Arc::new(Mutex::new(Vec::new())),
                completions: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl GrpcMetricReporter for TestGrpcMetricsReporter {
        fn report_rpc_start(&self, service_name: &'static str, service_method: String) {
            let mut starts = self.starts.lock();
            starts.push(format!("{service_name}-{service_method}"));
        }

        fn report_rpc_complete(
            &self,
            service_name: &'static str,
            service_method: String,
            code: &'static str,
            _elapsed: Duration,
        ) {
            let mut completions = self.completions.lock();
            completions.push(format!("{service_name}-{service_method}-{code}"));
        }
    }

    #[tokio::test]
    async fn collects_grpc_metrics_successfully() {
        let reporter = TestGrpcMetricsReporter::new();
        let mut service =
            GrpcMetrics::with_reporter(HealthServer::new(AlwaysHealthy), reporter.clone());

        let request = HealthCheckRequest { deep: false };
        let request_bytes = {
            let mut buf = BytesMut::with_capacity(
                mem::size_of::<u8>() + mem::size_of::<u32>() + request.encoded_len(),
            );
            buf.put_u8(0);
            buf.put_u32(request.encoded_len() as u32);
            request.encode(&mut buf).unwrap();
            buf.freeze()
        };
        let mut request = HyperRequest::new(Body::from(request_bytes));
        *request.method_mut() = Method::GET;
        *request.uri_mut() =
            Uri::from_static("http://example.com/fabric.v1.common.Health/HealthCheck");

        let response = service.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body();
        while let Some(_) = body.data().await {}
        let _ = body.trailers().await;

        {
            let starts = reporter.starts.lock();
            assert_eq!(
                *starts,
                vec!["fabric.v1.common.Health-HealthCheck".to_owned()]
            );
        }
        {
            let completions = reporter.completions.lock();
            assert_eq!(
                *completions,
                vec!["fabric.v1.common.Health-HealthCheck-OK".to_owned()]
            );
        }
    }

    #[test]
    fn parses_status_from_headers_successfully() {
        let status_table = vec![
            (0, "OK"),
            (1, "Canceled"),
            (2, "Unknown"),
            (3, "InvalidArgument"),
            (4, "DeadlineExceeded"),
            (5, "NotFound"),
            (6, "AlreadyExists"),
            (7, "PermissionDenied"),
            (8, "ResourceExhausted"),
            (9, "FailedPrecondition"),
            (10, "Aborted"),
            (11, "OutOfRange"),
            (12, "Unimplemented"),
            (13, "Internal"),
            (14, "Unavailable"),
            (15, "DataLoss"),
            (16, "Unauthenticated"),
        ];

        for (code, expected_msg) in status_table {
            let actual_msg = parse_status_code(&HeaderValue::from(code));
            assert_eq!(expected_msg, actual_msg);
        }
    }

    #[test]
    fn handles_invalid_status() {
        let status_table = ["17", "-1", "xyzzy"];

        for status in &status_table {
            let actual_msg = parse_status_code(&HeaderValue::from_static(status));
            assert_eq!("--INVALID--", actual_msg);
        }
    }
}
