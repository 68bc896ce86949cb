use actix_web::{
    Error,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue},
    middleware::Next,
};
use tracing::debug;

use crate::api::endpoints::get_trace_id;

const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/**
 * Middleware timing requests and propagating the trace id.
 *
 * A generated trace id is written into the request headers, so handlers log the same id
 * that is echoed in the `X-Trace-ID` response header.
 */
pub async fn timing_middleware(mut request: ServiceRequest, next: Next<impl MessageBody>) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start_time = std::time::Instant::now();
    let path = request.path().to_owned();
    let method = request.method().to_owned();
    let trace_id = get_trace_id(request.request());
    let header_value = HeaderValue::from_str(&trace_id).ok();
    if let Some(header_value) = &header_value {
        request.headers_mut().insert(TRACE_ID_HEADER, header_value.clone());
    }
    let response = next.call(request).await.map(|mut service_response| {
        if let Some(header_value) = header_value {
            service_response.headers_mut().insert(TRACE_ID_HEADER, header_value);
        }
        service_response
    });
    let response_code = match &response {
        Ok(service_response) => service_response.status().as_u16(),
        Err(_) => 500,
    };
    debug!(target: "performance", "Request {} for {} {} with status {} processed in {}ms", trace_id, method, path, response_code, start_time.elapsed().as_millis());
    response
}

#[cfg(test)]
mod test {
    use actix_web::{App, HttpRequest, HttpResponse, middleware::from_fn, test, web};

    use super::*;
    use crate::model::apperror::{ApplicationError, ErrorType};

    async fn echo_trace_id(http_request: HttpRequest) -> HttpResponse {
        HttpResponse::Ok().body(get_trace_id(&http_request))
    }

    async fn failing_handler() -> Result<HttpResponse, ApplicationError> {
        Err(ApplicationError::new(ErrorType::NotFound, "Unknown report: x".to_string()))
    }

    fn header(response: &ServiceResponse<impl MessageBody>) -> Option<String> {
        response.headers().get("x-trace-id").and_then(|value| value.to_str().ok()).map(ToString::to_string)
    }

    #[actix_web::test]
    async fn test_trace_id_is_echoed() {
        let app = test::init_service(App::new().wrap(from_fn(timing_middleware)).route("/", web::get().to(echo_trace_id))).await;
        let request = test::TestRequest::get().uri("/").insert_header(("X-Trace-ID", "abc-123")).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(header(&response).as_deref(), Some("abc-123"));
        assert_eq!(test::read_body(response).await, "abc-123");
    }

    #[actix_web::test]
    async fn test_generated_trace_id_is_seen_by_handler() {
        let app = test::init_service(App::new().wrap(from_fn(timing_middleware)).route("/", web::get().to(echo_trace_id))).await;
        let response = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let echoed = header(&response).unwrap();
        let body = test::read_body(response).await;
        assert!(!echoed.is_empty());
        assert_eq!(body, echoed.as_bytes());
    }

    #[actix_web::test]
    async fn test_trace_id_on_failed_request() {
        let app = test::init_service(App::new().wrap(from_fn(timing_middleware)).route("/", web::get().to(failing_handler))).await;
        let request = test::TestRequest::get().uri("/").insert_header(("X-Trace-ID", "failed-1")).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(header(&response).as_deref(), Some("failed-1"));
    }
}
