// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use fabric_core::connection::ConnectionManager;
use fabric_core::envelope::{validate_envelope, DEFAULT_UNARY_DEADLINE};
use fabric_core::errors::FabricError;
use fabric_core::events::{DomainEvent, DomainEventPublisher};
use fabric_core::health::health_check_response;
use fabric_core::retry::retry_idempotent;
use fabric_core::tenant::{rewrite, BackendKind};
use fabric_proto::fabric::v1::common::{Health, HealthCheckRequest, HealthCheckResponse};
use fabric_proto::fabric::v1::objectstore::object_store_server::ObjectStore;
use fabric_proto::fabric::v1::objectstore::{
    CreateBucketRequest, CreateBucketResponse, DeleteObjectRequest, DeleteObjectResponse,
    GetObjectChunk, GetObjectRequest, GetPresignedUrlRequest, GetPresignedUrlResponse,
    ListObjectsRequest, ListObjectsResponse, ObjectSummary as WireObjectSummary, PresignedMethod,
    PutObjectChunk, PutObjectResponse,
};
use futures::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::backend::FileObjectStoreBackend;
use crate::driver::PresignedMethod as DriverPresignedMethod;

const MAX_PUT_OBJECT_SIZE_BYTES: u64 = 512 * 1024 * 1024;
const GET_OBJECT_CHUNK_SIZE: usize = 256 * 1024;

fn response_metadata(trace_id: Option<String>) -> fabric_proto::fabric::v1::common::ResponseMetadata {
    fabric_proto::fabric::v1::common::ResponseMetadata {
        success: true,
        message: String::new(),
        error_code: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        trace_id: trace_id.unwrap_or_default(),
    }
}

pub struct ObjectStoreService {
    connections: ConnectionManager<FileObjectStoreBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl ObjectStoreService {
    pub fn new(
        connections: ConnectionManager<FileObjectStoreBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        ObjectStoreService {
            connections,
            events,
        }
    }

    fn physical_bucket(
        &self,
        organization_id: &str,
        user_id: &str,
        bucket: &str,
    ) -> Result<String, FabricError> {
        Ok(rewrite(BackendKind::ObjectStore, organization_id, user_id, bucket)?.physical_namespace)
    }

    async fn publish_write_event(&self, organization_id: &str, event_type: &str, subject: &str) {
        self.events
            .publish(DomainEvent::new(
                "objectstore",
                event_type,
                subject.to_owned(),
                serde_json::json!({ "organization_id": organization_id }),
            ))
            .await;
    }
}

#[tonic::async_trait]
impl ObjectStore for ObjectStoreService {
    async fn create_bucket(
        &self,
        request: Request<CreateBucketRequest>,
    ) -> Result<Response<CreateBucketResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let bucket =
            self.physical_bucket(&validated.organization_id, &validated.user_id, &request.bucket)?;
        let conn = self.connections.acquire()?;
        conn.create_bucket(&bucket).await?;
        Ok(Response::new(CreateBucketResponse {
            metadata: Some(response_metadata(validated.trace_id)),
        }))
    }

    async fn get_presigned_url(
        &self,
        request: Request<GetPresignedUrlRequest>,
    ) -> Result<Response<GetPresignedUrlResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let bucket =
            self.physical_bucket(&validated.organization_id, &validated.user_id, &request.bucket)?;
        let conn = self.connections.acquire()?;
        let method = match PresignedMethod::from_i32(request.method) {
            Some(PresignedMethod::PresignedMethodPut) => DriverPresignedMethod::Put,
            Some(PresignedMethod::PresignedMethodGet) | None => DriverPresignedMethod::Get,
            Some(PresignedMethod::PresignedMethodUnspecified) => {
                return Err(FabricError::InvalidArgument(
                    "presigned method must be specified".to_owned(),
                )
                .into())
            }
        };
        let (url, expires_at) = conn
            .presigned_url(&bucket, &request.key, method, request.expiry_seconds)
            .await?;
        Ok(Response::new(GetPresignedUrlResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            url,
            expires_at,
        }))
    }

    async fn put_object(
        &self,
        request: Request<Streaming<PutObjectChunk>>,
    ) -> Result<Response<PutObjectResponse>, Status> {
        let mut stream = request.into_inner();

        let first = match stream.next().await {
            Some(chunk) => chunk?,
            None => return Err(Status::cancelled("client disconnected before first chunk")),
        };

        let validated = validate_envelope(first.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        if first.total_size > MAX_PUT_OBJECT_SIZE_BYTES {
            return Err(FabricError::ResourceExhausted(format!(
                "object of {} bytes exceeds the {} byte ceiling",
                first.total_size, MAX_PUT_OBJECT_SIZE_BYTES
            ))
            .into());
        }
        let bucket =
            self.physical_bucket(&validated.organization_id, &validated.user_id, &first.bucket)?;
        let key = first.key.clone();

        let mut buffer = Vec::with_capacity(first.total_size.min(MAX_PUT_OBJECT_SIZE_BYTES) as usize);
        buffer.extend_from_slice(&first.data);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buffer.len() as u64 + chunk.data.len() as u64 > MAX_PUT_OBJECT_SIZE_BYTES {
                return Err(FabricError::ResourceExhausted(
                    "object exceeds the per-object size ceiling".to_owned(),
                )
                .into());
            }
            buffer.extend_from_slice(&chunk.data);
        }

        let conn = self.connections.acquire()?;
        let (object_id, size_bytes) = conn.put_object(&bucket, &key, &buffer).await?;
        self.publish_write_event(
            &validated.organization_id,
            "objectstore.put_object",
            &format!("{}/{}", first.bucket, key),
        )
        .await;

        Ok(Response::new(PutObjectResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            object_id,
            size_bytes,
        }))
    }

    type GetObjectStream = Pin<Box<dyn Stream<Item = Result<GetObjectChunk, Status>> + Send>>;

    async fn get_object(
        &self,
        request: Request<GetObjectRequest>,
    ) -> Result<Response<Self::GetObjectStream>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let bucket =
            self.physical_bucket(&validated.organization_id, &validated.user_id, &request.bucket)?;
        let conn = self.connections.acquire()?;

        let data = retry_idempotent(|| conn.get_object(&bucket, &request.key))
            .await?
            .ok_or_else(|| FabricError::NotFound(format!("object {} not found", request.key)))?;

        let trace_id = validated.trace_id;
        let chunks: Vec<Result<GetObjectChunk, Status>> = data
            .chunks(GET_OBJECT_CHUNK_SIZE)
            .enumerate()
            .map(|(index, chunk)| {
                Ok(GetObjectChunk {
                    metadata: (index == 0).then(|| response_metadata(trace_id.clone())),
                    data: chunk.to_vec(),
                })
            })
            .collect();

        Ok(Response::new(Box::pin(futures::stream::iter(chunks))))
    }

    async fn delete_object(
        &self,
        request: Request<DeleteObjectRequest>,
    ) -> Result<Response<DeleteObjectResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let bucket =
            self.physical_bucket(&validated.organization_id, &validated.user_id, &request.bucket)?;
        let conn = self.connections.acquire()?;
        let existed = conn.delete_object(&bucket, &request.key).await?;
        if existed {
            self.publish_write_event(
                &validated.organization_id,
                "objectstore.delete_object",
                &format!("{}/{}", request.bucket, request.key),
            )
            .await;
        }
        Ok(Response::new(DeleteObjectResponse {
            metadata: Some(response_metadata(validated.trace_id)),
        }))
    }

    async fn list_objects(
        &self,
        request: Request<ListObjectsRequest>,
    ) -> Result<Response<ListObjectsResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let bucket =
            self.physical_bucket(&validated.organization_id, &validated.user_id, &request.bucket)?;
        let conn = self.connections.acquire()?;
        let page = retry_idempotent(|| {
            conn.list_objects(
                &bucket,
                &request.prefix,
                request.page_size,
                &request.continuation_token,
            )
        })
        .await?;

        Ok(Response::new(ListObjectsResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            items: page
                .items
                .into_iter()
                .map(|item| WireObjectSummary {
                    key: item.key,
                    size_bytes: item.size_bytes,
                })
                .collect(),
            total: page.total,
            has_next: page.has_next,
            continuation_token: page.continuation_token,
        }))
    }
}

pub struct ObjectStoreHealthService {
    connections: ConnectionManager<FileObjectStoreBackend>,
}

impl ObjectStoreHealthService {
    pub fn new(connections: ConnectionManager<FileObjectStoreBackend>) -> Self {
        ObjectStoreHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for ObjectStoreHealthService {
    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let snapshot = self.connections.health_snapshot();
        Ok(Response::new(health_check_response(
            &snapshot,
            HashMap::new(),
        )))
    }
}
