// RPC payload handlers with idempotent execution
// A handler wrapped in IdempotentHandler answers retries of a request carrying
// the idempotency metadata header from the memoized response

use std::sync::Arc;

use async_trait::async_trait;
use oncely_common::DEFAULT_RPC_METADATA_KEY;
use oncely_core::{ExecContext, Idempotency, IdempotencyError};
use prost::Message;
use serde::{Deserialize, Serialize};
use tonic::Status;

use crate::codec::base64_bytes;
use crate::grpc::Payload;

// Trait for handling gRPC payload messages
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn handle(&self, payload: &Payload) -> Result<Payload, Status> {
        Err(Status::unimplemented(format!(
            "Unknown message type '{}'",
            payload.message_type()
        )))
    }

    fn can_handle(&self) -> &'static str {
        ""
    }
}

/// prost-encoded response stored as the memoized result
#[derive(Serialize, Deserialize)]
struct EncodedPayload {
    #[serde(with = "base64_bytes")]
    payload: Vec<u8>,
}

enum HandlerError {
    Idempotency(IdempotencyError),
    Status(Status),
    Uncached(Payload),
}

impl From<IdempotencyError> for HandlerError {
    fn from(e: IdempotencyError) -> Self {
        HandlerError::Idempotency(e)
    }
}

pub fn idempotency_error_status(err: &IdempotencyError) -> Status {
    let message = err.to_string();
    match err {
        IdempotencyError::ConcurrencyTimeout { .. } => Status::aborted(message),
        IdempotencyError::InvalidKey(_) => Status::invalid_argument(message),
        IdempotencyError::Store(_) => Status::unavailable(message),
        IdempotencyError::Deserialization { .. }
        | IdempotencyError::Serialization { .. }
        | IdempotencyError::ConfigError(_) => Status::internal(message),
    }
}

/// Idempotent wrapper around another `PayloadHandler`
pub struct IdempotentHandler<H> {
    inner: H,
    idempotency: Arc<Idempotency>,
    metadata_key: String,
}

impl<H: PayloadHandler> IdempotentHandler<H> {
    pub fn new(inner: H, idempotency: Arc<Idempotency>) -> Self {
        Self {
            inner,
            idempotency,
            metadata_key: DEFAULT_RPC_METADATA_KEY.to_string(),
        }
    }

    /// Read the key from metadata header `key` instead of `idempotency-key`
    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = key.into();
        self
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: PayloadHandler> PayloadHandler for IdempotentHandler<H> {
    async fn handle(&self, payload: &Payload) -> Result<Payload, Status> {
        let key = payload
            .header(&self.metadata_key)
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let Some(key) = key else {
            return self.inner.handle(payload).await;
        };

        let outcome = self
            .idempotency
            .execute(&ExecContext::new(), key, move |_| async move {
                let response = self
                    .inner
                    .handle(payload)
                    .await
                    .map_err(HandlerError::Status)?;
                if response.has_typed_body() {
                    Ok(EncodedPayload {
                        payload: response.encode_to_vec(),
                    })
                } else {
                    Err(HandlerError::Uncached(response))
                }
            })
            .await;

        match outcome {
            Ok(encoded) => Payload::decode(encoded.payload.as_slice()).map_err(|e| {
                tracing::warn!(key, error = %e, "Memoized payload could not be decoded");
                Status::internal(format!("memoized payload could not be decoded: {}", e))
            }),
            Err(HandlerError::Uncached(response)) => {
                tracing::debug!(key, "Response without a typed body was not memoized");
                Ok(response)
            }
            Err(HandlerError::Status(status)) => Err(status),
            Err(HandlerError::Idempotency(e)) => {
                tracing::warn!(key, error = %e, "Idempotent RPC rejected");
                Err(idempotency_error_status(&e))
            }
        }
    }

    fn can_handle(&self) -> &'static str {
        self.inner.can_handle()
    }
}
