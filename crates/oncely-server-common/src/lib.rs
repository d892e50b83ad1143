// Transport adapters for Oncely
//
// This crate wires the idempotent execution orchestrator into the two request
// surfaces a service usually exposes.
//
// Provides:
// - IdempotencyGuard (actix-web middleware keyed by an HTTP header)
// - IdempotentHandler (wrapper over an RPC PayloadHandler keyed by metadata)
// - Payload / Metadata (the RPC envelope as prost messages)
// - Response types shared by the HTTP surface

mod codec; // Base64 helpers for JSON envelopes
pub mod grpc; // RPC envelope messages
pub mod http; // actix-web middleware
pub mod model; // Response types
pub mod rpc; // Payload handler trait and idempotent wrapper

pub use http::{IdempotencyGuard, REPLAYED_HEADER};
pub use grpc::{Metadata, Payload};
pub use rpc::{IdempotentHandler, PayloadHandler};
