// Response envelope returned by the HTTP surface

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Generic result wrapper for API responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Result<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> Result<T> {
    pub fn new(code: i32, message: String, data: T) -> Self {
        Result::<T> {
            code,
            message,
            data,
        }
    }

    pub fn success(data: T) -> Result<T> {
        Result::<T> {
            code: 0,
            message: "success".to_string(),
            data,
        }
    }

    pub fn http_response(
        status: u16,
        code: i32,
        message: String,
        data: impl Serialize,
    ) -> HttpResponse {
        HttpResponseBuilder::new(StatusCode::from_u16(status).unwrap_or_default())
            .json(Result::new(code, message, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let result = Result::success("ok");
        assert_eq!(result.code, 0);
        assert_eq!(result.message, "success");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["data"], "ok");
    }

    #[test]
    fn test_http_response_status() {
        let response = Result::<String>::http_response(409, 30002, "busy".to_string(), String::new());
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let fallback = Result::<()>::http_response(1000, 1, String::new(), ());
        assert_eq!(fallback.status(), StatusCode::OK);
    }
}
