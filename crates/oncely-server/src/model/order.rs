// Order domain served behind the idempotency guard

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub sku: String,
    pub quantity: u32,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_id.trim().is_empty() {
            return Err("customerId is required".to_string());
        }
        if self.sku.trim().is_empty() {
            return Err("sku is required".to_string());
        }
        if self.quantity == 0 {
            return Err("quantity must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub customer_id: String,
    pub sku: String,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

/// Issues order ids; every call creates a new order
#[derive(Debug, Default)]
pub struct OrderBook {
    next_id: AtomicU64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, request: CreateOrderRequest) -> Order {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        Order {
            id,
            customer_id: request.customer_id,
            sku: request.sku,
            quantity: request.quantity,
            created_at: Utc::now(),
        }
    }

    /// Number of orders created so far
    pub fn created(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}
