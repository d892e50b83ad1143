use actix_web::{HttpResponse, Scope, post, web};
use oncely_common::error::PARAMETER_VALIDATE_ERROR;
use oncely_server_common::model::response::Result;
use tracing::info;

use crate::model::{common::AppState, order::CreateOrderRequest};

/// Create an order.
///
/// Mounted behind the idempotency guard: a retry carrying the same
/// `Idempotency-Key` gets the first response back instead of a second order.
/// Validation failures are 400 and therefore never memoized.
#[post("")]
async fn create_order(
    data: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    if let Err(message) = request.validate() {
        return Result::<String>::http_response(
            400,
            PARAMETER_VALIDATE_ERROR.code,
            message,
            String::new(),
        );
    }

    let order = data.orders.create(request);
    info!(order_id = order.id, sku = %order.sku, "Order created");

    HttpResponse::Created().json(Result::success(order))
}

pub fn routes() -> Scope {
    web::scope("/v1/orders").service(create_order)
}
