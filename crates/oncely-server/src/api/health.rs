use actix_web::{HttpResponse, Responder, Scope, get, web};
use oncely_core::Store;
use serde::Serialize;

use oncely_server_common::model::response::Result;

use crate::model::common::AppState;

/// Key read by the readiness probe; never written
const PROBE_KEY: &str = "oncely:health-probe";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub store: ComponentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub status: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

async fn check_store(store: &dyn Store) -> ComponentStatus {
    let (status, message) = match store.get_result(PROBE_KEY).await {
        Ok(_) => ("UP", None),
        Err(e) => ("DOWN", Some(e.to_string())),
    };

    ComponentStatus {
        status: status.to_string(),
        kind: store.kind().to_string(),
        message,
    }
}

#[get("")]
async fn health(data: web::Data<AppState>) -> impl Responder {
    let store = check_store(data.store().as_ref()).await;
    let up = store.status == "UP";

    let health_status = HealthStatus {
        status: store.status.clone(),
        store,
    };

    if up {
        HttpResponse::Ok().json(Result::success(health_status))
    } else {
        HttpResponse::ServiceUnavailable().json(Result::new(
            503,
            "store unavailable".to_string(),
            health_status,
        ))
    }
}

#[get("/liveness")]
async fn liveness() -> web::Json<Result<String>> {
    web::Json(Result::<String>::success("ok".to_string()))
}

pub fn routes() -> Scope {
    web::scope("/health").service(health).service(liveness)
}
