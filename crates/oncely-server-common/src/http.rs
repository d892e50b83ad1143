// Idempotency middleware for actix-web
// Requests carrying an idempotency header run at most once; successful
// responses are memoized and replayed verbatim to retries

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse,
    body::{EitherBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        StatusCode,
        header::{CONTENT_LENGTH, HeaderName, TRANSFER_ENCODING},
    },
};
use oncely_core::{ExecContext, Idempotency, IdempotencyError};
use serde::{Deserialize, Serialize};

use crate::codec::base64_bytes;
use crate::model::response;

/// Header set on responses served from the memoized result
pub const REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// Response snapshot stored as the memoized result
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CapturedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    #[serde(with = "base64_bytes")]
    body: Vec<u8>,
}

impl CapturedResponse {
    async fn capture<B>(res: ServiceResponse<B>) -> Result<Self, Error>
    where
        B: MessageBody,
    {
        let status = res.status().as_u16();
        let headers = res
            .headers()
            .iter()
            .filter(|(name, _)| **name != CONTENT_LENGTH && **name != TRANSFER_ENCODING)
            .filter_map(|(name, value)| match value.to_str() {
                Ok(value) => Some((name.as_str().to_string(), value.to_string())),
                Err(_) => {
                    tracing::debug!(header = %name, "Skipping non-text header in captured response");
                    None
                }
            })
            .collect();

        let body = actix_web::body::to_bytes(res.into_body())
            .await
            .map_err(|e| {
                let e: Box<dyn std::error::Error> = e.into();
                actix_web::error::ErrorInternalServerError(e.to_string())
            })?;

        Ok(Self {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn into_response(self, replayed: bool) -> HttpResponse {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = HttpResponse::build(status);
        for (name, value) in self.headers {
            builder.append_header((name, value));
        }
        if replayed {
            builder.insert_header((REPLAYED_HEADER, "true"));
        }
        builder.body(self.body)
    }
}

/// Outcome of the guarded handler that must not be memoized
enum GuardError {
    Idempotency(IdempotencyError),
    Service(Error),
    Uncached(CapturedResponse),
}

impl From<IdempotencyError> for GuardError {
    fn from(e: IdempotencyError) -> Self {
        GuardError::Idempotency(e)
    }
}

fn idempotency_error_response(err: &IdempotencyError) -> HttpResponse {
    let status = match err {
        IdempotencyError::ConcurrencyTimeout { .. } => StatusCode::CONFLICT,
        IdempotencyError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let code = err.error_code();
    response::Result::<String>::http_response(
        status.as_u16(),
        code.code,
        err.to_string(),
        String::new(),
    )
}

/// Idempotency middleware factory
#[derive(Clone)]
pub struct IdempotencyGuard {
    idempotency: Arc<Idempotency>,
    header: HeaderName,
}

impl IdempotencyGuard {
    pub fn new(idempotency: Arc<Idempotency>) -> Self {
        Self {
            idempotency,
            // Lowercase form of DEFAULT_HTTP_HEADER
            header: HeaderName::from_static("idempotency-key"),
        }
    }

    /// Read the key from `header` instead of `Idempotency-Key`
    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdempotencyGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = IdempotencyGuardMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdempotencyGuardMiddleware {
            service: Rc::new(service),
            idempotency: self.idempotency.clone(),
            header: self.header.clone(),
        }))
    }
}

pub struct IdempotencyGuardMiddleware<S> {
    service: Rc<S>,
    idempotency: Arc<Idempotency>,
    header: HeaderName,
}

impl<S, B> Service<ServiceRequest> for IdempotencyGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let key = req
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        // Without a key the request is not idempotent
        let Some(key) = key else {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        };

        let service = self.service.clone();
        let idempotency = self.idempotency.clone();

        Box::pin(async move {
            let http_req = req.request().clone();

            let mut executed = false;
            let ran = &mut executed;
            let outcome = idempotency
                .execute(&ExecContext::new(), &key, move |_| async move {
                    *ran = true;
                    let res = service.call(req).await.map_err(GuardError::Service)?;
                    let captured = CapturedResponse::capture(res)
                        .await
                        .map_err(GuardError::Service)?;
                    if captured.is_success() {
                        Ok(captured)
                    } else {
                        Err(GuardError::Uncached(captured))
                    }
                })
                .await;
            let replayed = !executed;

            let response = match outcome {
                Ok(captured) => {
                    if replayed {
                        tracing::debug!(key = %key, "Replaying memoized HTTP response");
                    }
                    captured.into_response(replayed)
                }
                Err(GuardError::Uncached(captured)) => captured.into_response(false),
                Err(GuardError::Service(e)) => return Err(e),
                Err(GuardError::Idempotency(e)) => {
                    tracing::warn!(key = %key, error = %e, "Idempotent request rejected");
                    idempotency_error_response(&e)
                }
            };

            Ok(ServiceResponse::new(http_req, response).map_into_right_body())
        })
    }
}
